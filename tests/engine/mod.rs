//! Engine tests against the in-memory database.

pub mod baseline;
pub mod clean;
pub mod concurrency;
pub mod info;
pub mod migrate;
pub mod recovery;
