use super::open_engine;
use crate::config::Config;
use crate::output::{OutputFormat, render_clean};
use anyhow::{Result, bail};
use console::style;
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::Path;

/// Drop everything in the managed schemas. Asks first unless `force` is set;
/// without a terminal to ask on, `force` is required.
pub async fn cmd_clean(
    config: &Config,
    root_dir: &Path,
    force: bool,
    format: OutputFormat,
) -> Result<()> {
    if config.behavior.clean_disabled {
        bail!("Clean is disabled. Set behavior.clean_disabled: false in the config to allow it");
    }

    if !force {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to clean without confirmation. Pass --force in non-interactive mode");
        }
        println!(
            "{} This drops every object in: {}",
            style("⚠").yellow(),
            config.schemas.names.join(", ")
        );
        let confirmed = Confirm::new()
            .with_prompt("Continue?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Clean cancelled");
            return Ok(());
        }
    }

    let engine = open_engine(config, root_dir, format, false).await?;
    let result = engine.clean().await?;
    println!("{}", render_clean(&result, format)?);
    Ok(())
}
