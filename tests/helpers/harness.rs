use keel::CommandEngine;
use keel::config::Config;
use keel::db::Database;
use keel::db::memory::MemoryDatabase;
use keel::history::{HistoryRow, TableRef};
use keel::resolver::{SourceRegistry, StaticSource};
use std::sync::Arc;
use std::time::Duration;

/// Defaults with a lock that retries quickly, so contended tests finish fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.lock.retry_interval = Duration::from_millis(5);
    config.lock.retry_count = 400;
    config
}

pub fn registry(scripts: &[(&str, &str)]) -> SourceRegistry {
    let source = scripts
        .iter()
        .fold(StaticSource::new("test"), |source, (name, content)| {
            source.with_script(name, content)
        });
    let mut registry = SourceRegistry::new();
    registry.add_source(source);
    registry
}

pub fn engine(db: &MemoryDatabase, config: Config, scripts: &[(&str, &str)]) -> CommandEngine {
    engine_with(db, config, registry(scripts))
}

pub fn engine_with(db: &MemoryDatabase, config: Config, sources: SourceRegistry) -> CommandEngine {
    let db: Arc<dyn Database> = Arc::new(db.clone());
    CommandEngine::new(db, config, sources).expect("engine should build")
}

/// History rows without lock rows, by rank.
pub fn history(db: &MemoryDatabase, config: &Config) -> Vec<HistoryRow> {
    let table = TableRef::new(&config.history.schema, &config.history.table);
    let mut rows: Vec<HistoryRow> = db
        .history_rows(&table)
        .into_iter()
        .filter(|row| row.installed_rank >= 0)
        .collect();
    rows.sort_by_key(|row| row.installed_rank);
    rows
}

pub fn versions(rows: &[HistoryRow]) -> Vec<Option<String>> {
    rows.iter().map(|row| row.version.clone()).collect()
}
