//! Store configuration loaded from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `USE_PERSISTENT_STORES` | `true`/`1` selects Postgres | in-memory |
//! | `DATABASE_URL` | Postgres connection string | required when persistent |
//! | `DATABASE_MAX_CONNECTIONS` | pool size | `5` |

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::store::{EntityStore, InMemoryEntityStore, PostgresEntityStore, StoreError};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::InMemory,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let persistent = match lookup("USE_PERSISTENT_STORES") {
            None => false,
            Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                value,
            })?,
        };
        if !persistent {
            return Ok(Self::in_memory());
        }

        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_MAX_CONNECTIONS",
                        value,
                    });
                }
            },
        };

        Ok(Self {
            backend: StoreBackend::Postgres {
                database_url,
                max_connections,
            },
        })
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Postgres { .. })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Open the configured store.
#[instrument(skip(config), fields(persistent = config.is_persistent()))]
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn EntityStore>, ConfigError> {
    match &config.backend {
        StoreBackend::InMemory => {
            info!("using in-memory entity store");
            Ok(Arc::new(InMemoryEntityStore::new()))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresEntityStore::connect(database_url, *max_connections).await?;
            info!(max_connections, "connected to postgres entity store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_in_memory() {
        assert_eq!(config(&[]).unwrap(), StoreConfig::in_memory());
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "false")]).unwrap(),
            StoreConfig::in_memory()
        );
    }

    #[test]
    fn persistent_requires_database_url() {
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn persistent_reads_pool_size() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://localhost/orderlink"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(
            cfg.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/orderlink".into(),
                max_connections: 12,
            }
        );
    }

    #[test]
    fn rejects_garbage_values() {
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. })
        ));
        assert!(matches!(
            config(&[
                ("USE_PERSISTENT_STORES", "true"),
                ("DATABASE_URL", "postgres://localhost/orderlink"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ]),
            Err(ConfigError::Invalid { name: "DATABASE_MAX_CONNECTIONS", .. })
        ));
    }

    #[tokio::test]
    async fn connect_in_memory() {
        let store = connect(&StoreConfig::in_memory()).await.unwrap();
        let tx = store.begin_read_only().await.unwrap();
        tx.commit().await.unwrap();
    }
}
