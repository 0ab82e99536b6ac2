//! Migration file name conventions: `V<version>__<description><suffix>` and
//! `R__<description><suffix>`, with configurable prefixes, separator and
//! suffixes.

use crate::config::Naming;
use crate::version::MigrationVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedName {
    Versioned {
        version: MigrationVersion,
        description: String,
    },
    Repeatable {
        description: String,
    },
}

impl ParsedName {
    pub fn version(&self) -> Option<&MigrationVersion> {
        match self {
            ParsedName::Versioned { version, .. } => Some(version),
            ParsedName::Repeatable { .. } => None,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ParsedName::Versioned { description, .. } | ParsedName::Repeatable { description } => {
                description
            }
        }
    }
}

/// Parse a file name. `Ok(None)` means the file is not a migration candidate
/// at all (wrong suffix); `Err` explains why a candidate is malformed.
pub fn parse_migration_name(file_name: &str, naming: &Naming) -> Result<Option<ParsedName>, String> {
    let Some(stem) = naming
        .suffixes
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix.as_str()))
    else {
        return Ok(None);
    };

    if let Some(rest) = stem.strip_prefix(naming.repeatable_prefix.as_str())
        && let Some(description) = rest.strip_prefix(naming.separator.as_str())
    {
        if description.trim().is_empty() {
            return Err("repeatable migration has no description".to_string());
        }
        return Ok(Some(ParsedName::Repeatable {
            description: to_description(description),
        }));
    }

    let Some(rest) = stem.strip_prefix(naming.versioned_prefix.as_str()) else {
        return Err(format!(
            "name must start with '{}' (versioned) or '{}{}' (repeatable)",
            naming.versioned_prefix, naming.repeatable_prefix, naming.separator
        ));
    };

    let Some((raw_version, description)) = rest.split_once(naming.separator.as_str()) else {
        return Err(format!(
            "missing '{}' between version and description",
            naming.separator
        ));
    };

    if raw_version.is_empty() {
        return Err("version is empty".to_string());
    }
    let version = MigrationVersion::parse(raw_version).map_err(|e| e.to_string())?;
    if version.is_latest() {
        return Err("'latest' is not a valid migration version".to_string());
    }

    Ok(Some(ParsedName::Versioned {
        version,
        description: to_description(description),
    }))
}

fn to_description(raw: &str) -> String {
    raw.replace('_', " ").trim().to_string()
}
