//! keel: versioned SQL migrations with an auditable schema history.
//!
//! The [`engine::CommandEngine`] runs migrate, validate, info, repair,
//! baseline and clean against any [`db::Database`]. Migrations are found by
//! a [`resolver::MigrationResolver`] over pluggable sources, split into
//! statements by [`parser`], and recorded in the history table through
//! [`history::SchemaHistory`] while a [`lock::LockCoordinator`] keeps
//! concurrent runs apart.

pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod lock;
pub mod output;
pub mod parser;
pub mod progress;
pub mod resolver;
pub mod version;

pub use engine::CommandEngine;
pub use error::{KeelError, Result};
