use super::format_duration;
use crate::engine::{EngineState, ProgressListener};
use crate::error::KeelError;
use crate::resolver::ResolvedMigration;
use console::style;
use std::time::Duration;

/// Prints one line per migration as migrate runs.
pub struct MigrationReporter {
    verbose: bool,
}

impl MigrationReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

fn name(migration: &ResolvedMigration) -> String {
    match &migration.version {
        Some(version) => format!("{} - {}", version, migration.description),
        None => format!("R - {}", migration.description),
    }
}

impl ProgressListener for MigrationReporter {
    fn state_changed(&self, state: EngineState) {
        if self.verbose && state == EngineState::Locking {
            println!("  {}", style("Acquiring lock...").dim());
        }
    }

    fn migration_started(&self, migration: &ResolvedMigration, index: usize, total: usize) {
        if total > 1 {
            println!("  [{}/{}] {}", index, total, name(migration));
        } else {
            println!("  {}", name(migration));
        }
    }

    fn migration_succeeded(&self, migration: &ResolvedMigration, elapsed: Duration) {
        if self.verbose {
            println!(
                "    {} {} ({})",
                style("✓").green(),
                migration.script,
                style(format_duration(elapsed)).dim()
            );
        }
    }

    fn migration_failed(&self, migration: &ResolvedMigration, _error: &KeelError) {
        println!(
            "    {} {}",
            style("✗").red(),
            style(format!("{} failed", migration.script)).red()
        );
    }

    fn warning(&self, message: &str) {
        println!("  {} {}", style("⚠").yellow(), message);
    }
}
