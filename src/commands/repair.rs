use super::open_engine;
use crate::config::Config;
use crate::output::{OutputFormat, render_repair};
use anyhow::Result;
use std::path::Path;

pub async fn cmd_repair(config: &Config, root_dir: &Path, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root_dir, format, false).await?;
    let result = engine.repair().await?;
    println!("{}", render_repair(&result, format)?);
    Ok(())
}
