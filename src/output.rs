//! Human and JSON rendering of command results.

use crate::engine::{
    BaselineResult, CleanResult, InfoResult, MigrateResult, MigrationInfo, MigrationState,
    RepairResult, ValidationReport,
};
use anyhow::Result;
use console::style;
use serde::Serialize;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Human,
    /// JSON for CI and scripting
    Json,
}

fn json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn render_migrate(result: &MigrateResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(result);
    }
    let mut out = String::new();
    for schema in &result.schemas_created {
        out.push_str(&format!("Created schema {}\n", schema));
    }
    if let Some(version) = &result.baseline {
        out.push_str(&format!("Baselined at version {}\n", version));
    }
    if result.migrations.is_empty() {
        out.push_str(&format!(
            "{} Schema is up to date{}",
            style("✓").green(),
            result
                .initial_version
                .as_ref()
                .map(|v| format!(" (version {})", v))
                .unwrap_or_default()
        ));
    } else {
        out.push_str(&format!(
            "{} Applied {} migration(s){}",
            style("✓").green(),
            result.migrations.len(),
            result
                .target_version
                .as_ref()
                .map(|v| format!(", now at version {}", v))
                .unwrap_or_default()
        ));
    }
    Ok(out)
}

#[derive(Serialize)]
struct InfoRow<'a> {
    category: &'static str,
    version: Option<String>,
    description: &'a str,
    #[serde(rename = "type")]
    migration_type: Option<&'static str>,
    installed_on: Option<String>,
    state: MigrationState,
    script: &'a str,
}

#[derive(Serialize)]
struct InfoJson<'a> {
    current_version: Option<String>,
    history_exists: bool,
    pending: usize,
    migrations: Vec<InfoRow<'a>>,
}

fn category(info: &MigrationInfo) -> &'static str {
    match info.state {
        MigrationState::Schema => "Schema",
        MigrationState::Baseline => "Baseline",
        _ if info.is_repeatable() => "Repeatable",
        _ => "Versioned",
    }
}

fn info_rows(result: &InfoResult) -> Vec<InfoRow<'_>> {
    result
        .migrations
        .iter()
        .map(|info| InfoRow {
            category: category(info),
            version: info.version().map(ToString::to_string),
            description: info.description(),
            migration_type: info.migration_type().map(|t| t.as_str()),
            installed_on: info
                .applied
                .as_ref()
                .map(|a| a.installed_on.format("%Y-%m-%d %H:%M:%S").to_string()),
            state: info.state,
            script: info.script(),
        })
        .collect()
}

pub fn render_info(result: &InfoResult, format: OutputFormat) -> Result<String> {
    let rows = info_rows(result);
    if format == OutputFormat::Json {
        return json(&InfoJson {
            current_version: result.current_version.as_ref().map(ToString::to_string),
            history_exists: result.history_exists,
            pending: result.pending_count(),
            migrations: rows,
        });
    }

    let mut out = format!(
        "Schema version: {}\n",
        result
            .current_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<< Empty Schema >>".to_string())
    );
    if rows.is_empty() {
        out.push_str("No migrations found");
        return Ok(out);
    }

    let headers = ["Category", "Version", "Description", "Type", "Installed On", "State"];
    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|row| {
            [
                row.category.to_string(),
                row.version.clone().unwrap_or_default(),
                row.description.to_string(),
                row.migration_type.unwrap_or_default().to_string(),
                row.installed_on.clone().unwrap_or_default(),
                row.state.label().to_string(),
            ]
        })
        .collect();
    let mut widths = headers.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(widths.iter())
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    out.push_str(&line(&headers.map(String::from)[..]));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &cells {
        out.push('\n');
        out.push_str(line(&row[..]).trim_end());
    }
    Ok(out)
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    status: &'static str,
    #[serde(flatten)]
    report: &'a ValidationReport,
}

pub fn render_validation(report: &ValidationReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(&ValidationJson {
            status: if report.is_valid() { "success" } else { "failed" },
            report,
        });
    }
    if report.is_valid() {
        return Ok(format!(
            "{} Successfully validated {} migration(s)",
            style("✓").green(),
            report.validated
        ));
    }
    let mut out = format!("{} Validation failed:", style("✗").red());
    for issue in &report.issues {
        out.push_str(&format!("\n  - {}", issue));
    }
    Ok(out)
}

pub fn render_repair(result: &RepairResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(result);
    }
    if !result.changed() {
        return Ok(format!("{} Schema history needs no repair", style("✓").green()));
    }
    let mut out = format!("{} Repaired schema history", style("✓").green());
    for row in &result.removed {
        out.push_str(&format!("\n  Removed failed entry {}", row.script));
    }
    for row in &result.realigned {
        out.push_str(&format!("\n  Realigned {}", row.script));
    }
    Ok(out)
}

pub fn render_baseline(result: &BaselineResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(result);
    }
    if result.already_baselined {
        return Ok(format!("Already baselined at version {}", result.version));
    }
    Ok(format!(
        "{} Baselined schema at version {} ({})",
        style("✓").green(),
        result.version,
        result.description
    ))
}

pub fn render_clean(result: &CleanResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return json(result);
    }
    let mut out = format!(
        "{} Dropped {} object(s)",
        style("✓").green(),
        result.objects_dropped.len()
    );
    if !result.schemas_dropped.is_empty() {
        out.push_str(&format!(
            "\n  Dropped schemas: {}",
            result.schemas_dropped.join(", ")
        ));
    }
    if !result.schemas_cleaned.is_empty() {
        out.push_str(&format!(
            "\n  Cleaned schemas: {}",
            result.schemas_cleaned.join(", ")
        ));
    }
    for warning in &result.warnings {
        out.push_str(&format!("\n  {} {}", style("⚠").yellow(), warning));
    }
    Ok(out)
}
