use super::open_engine;
use crate::config::Config;
use crate::error::KeelError;
use crate::output::{OutputFormat, render_validation};
use anyhow::{Result, bail};
use std::path::Path;

/// Exits non-zero when any problem is found, so CI can gate on it.
pub async fn cmd_validate(config: &Config, root_dir: &Path, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root_dir, format, false).await?;
    match engine.validate().await {
        Ok(report) => {
            println!("{}", render_validation(&report, format)?);
            Ok(())
        }
        Err(KeelError::Validation(report)) => {
            println!("{}", render_validation(&report, format)?);
            bail!("Validation failed: {} problem(s) found", report.issues.len())
        }
        Err(e) => Err(e.into()),
    }
}
