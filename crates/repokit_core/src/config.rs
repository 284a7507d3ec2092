//! Static adapter selection.
//!
//! # Responsibility
//! - Describe which adapter backs the repositories of a process.
//! - Build that adapter once at startup for injection into repositories.
//!
//! # Invariants
//! - Selection happens once; repositories never choose adapters per call.

use crate::adapter::sqlite::DEFAULT_BUSY_TIMEOUT;
use crate::adapter::{Adapter, DeletePolicy, MemoryAdapter, SqliteAdapter};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// SQLite adapter options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub delete_policy: DeletePolicy,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            delete_policy: DeletePolicy::default(),
        }
    }
}

/// Adapter variant chosen at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    Memory {
        #[serde(default)]
        delete_policy: DeletePolicy,
    },
    Sqlite(SqliteConfig),
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::Memory {
            delete_policy: DeletePolicy::default(),
        }
    }
}

impl AdapterConfig {
    /// Opens the configured adapter.
    ///
    /// # Errors
    /// - `InvalidConfig` for an empty SQLite path or zero busy timeout.
    /// - `Sqlite` when the database cannot be opened.
    pub fn build(&self) -> ModelResult<Arc<dyn Adapter>> {
        match self {
            Self::Memory { delete_policy } => {
                Ok(Arc::new(MemoryAdapter::with_delete_policy(*delete_policy)))
            }
            Self::Sqlite(config) => {
                if config
                    .path
                    .as_ref()
                    .is_some_and(|path| path.as_os_str().is_empty())
                {
                    return Err(ModelError::InvalidConfig(
                        "sqlite path cannot be empty".to_string(),
                    ));
                }
                if config.busy_timeout_ms == 0 {
                    return Err(ModelError::InvalidConfig(
                        "busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }

                let adapter = SqliteAdapter::open_with(
                    config.path.as_deref(),
                    Duration::from_millis(config.busy_timeout_ms),
                )?
                .with_delete_policy(config.delete_policy);
                Ok(Arc::new(adapter))
            }
        }
    }
}
