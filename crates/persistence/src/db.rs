//! Invitation store connection pool and schema setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Pool settings for the invitation store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// The connection URL with any credentials masked, for logs.
    pub fn redacted_url(&self) -> String {
        let Some(scheme_end) = self.url.find("://") else {
            return self.url.clone();
        };
        let rest = &self.url[scheme_end + 3..];
        match rest.rfind('@') {
            Some(at) => format!("{}://***@{}", &self.url[..scheme_end], &rest[at + 1..]),
            None => self.url.clone(),
        }
    }
}

/// Pool options for the invitation store.
///
/// Acquire waits are bounded by `connect_timeout_secs`; a pool timeout
/// surfaces to the engine as a store timeout.
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
}

/// Connects the invitation store pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = pool_options(config).connect(&config.url).await?;
    info!(
        url = %config.redacted_url(),
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Invitation store pool connected"
    );
    Ok(pool)
}

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    crate::MIGRATOR.run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: 4,
            min_connections: 8,
            connect_timeout_secs: 3,
            idle_timeout_secs: 60,
        }
    }

    #[test]
    fn test_redacted_url_masks_credentials() {
        assert_eq!(
            config("postgres://invite:s3cret@db:5432/invites").redacted_url(),
            "postgres://***@db:5432/invites"
        );
        assert_eq!(
            config("postgres://db:5432/invites").redacted_url(),
            "postgres://db:5432/invites"
        );
        assert_eq!(config("not a url").redacted_url(), "not a url");
    }

    #[test]
    fn test_pool_options_clamp_min_to_max() {
        let options = pool_options(&config("postgres://db/invites"));
        assert_eq!(options.get_max_connections(), 4);
        assert_eq!(options.get_min_connections(), 4);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(3));
    }
}
