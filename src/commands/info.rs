use super::open_engine;
use crate::config::Config;
use crate::output::{OutputFormat, render_info};
use anyhow::Result;
use std::path::Path;

pub async fn cmd_info(config: &Config, root_dir: &Path, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root_dir, format, false).await?;
    let result = engine.info().await?;
    println!("{}", render_info(&result, format)?);
    Ok(())
}
