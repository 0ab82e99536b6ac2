// Integration tests for keel

pub mod cli;
pub mod engine;
pub mod helpers;
