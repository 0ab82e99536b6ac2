pub mod builder;
pub mod defaults;
pub mod merge;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::ConfigBuilder;
pub use merge::Merge;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Read the config file if present. Returns the parsed input and the
/// directory relative migration locations are resolved against.
pub fn load_config(config_file: &str) -> Result<(ConfigInput, std::path::PathBuf)> {
    let config_dir = Path::new(config_file)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config_input = if Path::new(config_file).exists() {
        let contents = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file {}", config_file))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_file))?
    } else {
        ConfigInput::default()
    };

    Ok((config_input, config_dir))
}
