use super::open_engine;
use crate::config::Config;
use crate::output::{OutputFormat, render_migrate};
use anyhow::Result;
use std::path::Path;

pub async fn cmd_migrate(
    config: &Config,
    root_dir: &Path,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let engine = open_engine(config, root_dir, format, verbose).await?;
    if format == OutputFormat::Human {
        println!("🚀 Migrating schema {}...", config.schemas.default_schema());
    }
    let result = engine.migrate().await?;
    println!("{}", render_migrate(&result, format)?);
    Ok(())
}
