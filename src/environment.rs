use std::error::Error;
use std::sync::Arc;

use log::{info, Logger};
use sqlx::postgres::PgPool;

use crate::config::{BlobStoreBackend, DatabaseBackend, Settings};
use crate::db::{Db, MemoryDb, PgDb};
use crate::errors::ConfigError;
use crate::store::{MemoryStore, PgStore, S3Store, Store};
use crate::urls::Urls;

pub type SafeDb = dyn Db + Send + Sync;

#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<SafeDb>,
    pub store: Arc<dyn Store>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<SafeDb>,
        store: Arc<dyn Store>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            store,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub(crate) max_resume_size: usize,
}

impl Config {
    pub fn new(max_resume_size: usize) -> Self {
        Self { max_resume_size }
    }
}

/// Connects to the record store and blob store named in `settings`.
/// PostgreSQL backends share one pool.
pub async fn connect(
    logger: &Logger,
    settings: &Settings,
) -> Result<(Arc<SafeDb>, Arc<dyn Store>), Box<dyn Error>> {
    let pool = match &settings.db_connection_string {
        Some(connection_string)
            if settings.database == DatabaseBackend::Postgres
                || settings.blob_store == BlobStoreBackend::Postgres =>
        {
            info!(logger, "Creating database pool...");
            Some(PgPool::connect(connection_string).await?)
        }
        _ => None,
    };

    let missing_pool = || ConfigError::Missing("BACKEND_DB_CONNECTION_STRING");

    let db: Arc<SafeDb> = match settings.database {
        DatabaseBackend::Postgres => Arc::new(PgDb::new(pool.clone().ok_or_else(missing_pool)?)),
        DatabaseBackend::Memory => Arc::new(MemoryDb::new()),
    };

    let store: Arc<dyn Store> = match settings.blob_store {
        BlobStoreBackend::Postgres => Arc::new(PgStore::new(
            pool.ok_or_else(missing_pool)?,
            settings.chunk_size,
        )),
        BlobStoreBackend::S3 => Arc::new(S3Store::from_env()?),
        BlobStoreBackend::Memory => Arc::new(MemoryStore::new(settings.chunk_size)),
    };

    info!(logger, "Backends ready"; "database" => ?settings.database, "blob_store" => ?settings.blob_store);

    Ok((db, store))
}
