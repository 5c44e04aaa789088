//! Service data model

use std::path::PathBuf;
use std::str::FromStr;

use color_eyre::Result;

pub mod session;
pub mod users;
pub mod windows;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use crate::config;
use crate::model::session::Session;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid SQLite path: {path}")]
    InvalidSQLitePath { path: PathBuf },
}

/// Database access shared by all the handlers
#[derive(Clone)]
pub struct Model {
    /// Database access
    db: sqlx::SqlitePool,
}

impl Model {
    /// Model for testing purposes - using the in-memory SQLite database
    pub async fn test() -> Result<Self> {
        Self::with_config(config::Database::Memory).await
    }

    /// Model from configuration
    ///
    /// If the database is created in-memory, the migrations are being executed automatically. If database is
    /// file based migrations would be executed only if requested by configuration.
    pub async fn with_config(config: config::Database) -> Result<Self> {
        use config::Database::*;

        let db = match config {
            Memory => {
                // Every connection opens its own in-memory database, so the pool keeps exactly
                // one and never recycles it.
                let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_lazy_with(opts);

                sqlx::migrate!("model/migrations").run(&pool).await?;
                pool
            }

            SqLite {
                path,
                max_connections,
                migrate,
            } => {
                let path = path
                    .as_path()
                    .to_str()
                    .ok_or_else(|| Error::InvalidSQLitePath { path: path.clone() })?;

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);

                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_lazy_with(opts);

                if migrate {
                    sqlx::migrate!("model/migrations").run(&pool).await?;
                }

                pool
            }
        };

        Ok(Self { db })
    }

    /// Accesses the DB pool
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.db
    }

    /// Performs cleanup on the model, returning the number of expired sessions removed
    pub async fn cleanup(&self) -> Result<u64> {
        Session::cleanup(&self.db).await
    }
}
