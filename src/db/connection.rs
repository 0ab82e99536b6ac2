use crate::config::Database as DatabaseConfig;
use crate::db::Database;
use crate::db::postgres::PostgresDatabase;
use anyhow::{Result, anyhow, bail};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Mask password in database URL for display
pub fn mask_url_password(url: &str) -> String {
    let Some((protocol, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    // Check if there's user info (user:pass@host or user@host)
    if let Some(at_pos) = rest.rfind('@') {
        let user_info = &rest[..at_pos];
        let host_and_path = &rest[at_pos + 1..];

        if let Some((username, _)) = user_info.split_once(':') {
            return format!("{}://{}:***@{}", protocol, username, host_and_path);
        }
    }

    url.to_string()
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum number of retries for database connections
    pub max_retries: u32,
    /// Delay between connection retries
    pub retry_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::CONNECT_RETRIES,
            retry_delay: crate::constants::CONNECT_RETRY_DELAY,
        }
    }
}

impl From<&DatabaseConfig> for ConnectionConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.connect_retries,
            retry_delay: config.connect_retry_delay,
        }
    }
}

/// Open the backend matching the URL scheme.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Database>> {
    let url = config.url.as_deref().ok_or_else(|| {
        anyhow!("No database URL configured. Pass --url, set KEEL_DATABASE_URL or database.url in keel.yaml")
    })?;
    let scheme = url.split("://").next().unwrap_or_default();

    match scheme {
        "postgres" | "postgresql" => {
            let pool = connect_with_retry_config(url, &ConnectionConfig::from(config)).await?;
            Ok(Arc::new(PostgresDatabase::new(pool)))
        }
        other => bail!(
            "Unsupported database URL scheme '{}' in {}",
            other,
            mask_url_password(url)
        ),
    }
}

/// Connect to database with retry logic
///
/// Handles container startup timing, network blips and other transient
/// connection problems. The pool holds a single long-lived connection so
/// session-scoped locks stay with it.
pub async fn connect_with_retry_config(url: &str, config: &ConnectionConfig) -> Result<PgPool> {
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let result = PgPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await;

        match result {
            Ok(pool) => {
                if attempt > 0 {
                    info!(
                        "Connected to database (after {} retr{})",
                        attempt,
                        if attempt == 1 { "y" } else { "ies" }
                    );
                } else {
                    debug!("Connected to database {}", mask_url_password(url));
                }
                return Ok(pool);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < config.max_retries {
                    if attempt == 0 {
                        info!("Database not ready, retrying...");
                    }
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    Err(anyhow!(
        "Failed to connect to database at {} after {} attempts: {}",
        mask_url_password(url),
        config.max_retries + 1,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string())
    ))
}
