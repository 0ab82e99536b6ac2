use super::open_engine;
use crate::config::Config;
use crate::output::{OutputFormat, render_baseline};
use anyhow::Result;
use std::path::Path;

pub async fn cmd_baseline(config: &Config, root_dir: &Path, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root_dir, format, false).await?;
    let result = engine.baseline().await?;
    println!("{}", render_baseline(&result, format)?);
    Ok(())
}
