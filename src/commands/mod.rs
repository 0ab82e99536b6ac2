pub mod baseline;
pub mod clean;
pub mod info;
pub mod migrate;
pub mod repair;
pub mod validate;

pub use baseline::cmd_baseline;
pub use clean::cmd_clean;
pub use info::cmd_info;
pub use migrate::cmd_migrate;
pub use repair::cmd_repair;
pub use validate::cmd_validate;

use crate::config::Config;
use crate::db::connection::{connect, mask_url_password};
use crate::engine::CommandEngine;
use crate::output::OutputFormat;
use crate::progress::MigrationReporter;
use crate::resolver::SourceRegistry;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Connect and build the engine every command runs on. Progress lines are
/// only printed for human output so JSON stays parseable.
pub(crate) async fn open_engine(
    config: &Config,
    root_dir: &Path,
    format: OutputFormat,
    verbose: bool,
) -> Result<CommandEngine> {
    if let Some(url) = &config.database.url {
        info!("Connecting to {}", mask_url_password(url));
    }
    let db = connect(&config.database).await?;
    let sources = SourceRegistry::from_locations(&config.locations, root_dir);
    let engine = CommandEngine::new(db, config.clone(), sources)?;
    Ok(match format {
        OutputFormat::Human => engine.with_listener(Arc::new(MigrationReporter::new(verbose))),
        OutputFormat::Json => engine,
    })
}
