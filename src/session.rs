//! Scoped acquisition of a configured `DocumentStore`.

use crate::config::{BackendKind, BookstoreConfig};
use crate::db::connection::{DocumentStore, StoreError};
use crate::db::MemoryDbConnection;
use crate::runner::BookQueries;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the store handle for one unit of work. The handle is released
/// when the session is dropped.
#[derive(Debug)]
pub struct StoreSession {
    store: Arc<dyn DocumentStore>,
    database: String,
    collection: String,
}

impl StoreSession {
    /// Open the backend named by `config`. For ArangoDB the database is
    /// created first if it does not exist.
    pub async fn open(config: &BookstoreConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryDbConnection::new()),
            BackendKind::Arango => Self::open_arango(config).await?,
        };
        info!(
            "[session] opened {} store for '{}.{}'",
            config.backend, config.database, config.collection
        );
        Ok(Self {
            store,
            database: config.database.clone(),
            collection: config.collection.clone(),
        })
    }

    #[cfg(feature = "arango")]
    async fn open_arango(config: &BookstoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
        use crate::db::ArangoDbConnection;
        let arango = config.arango_connection_config();
        ArangoDbConnection::ensure_database(&arango).await?;
        Ok(Arc::new(ArangoDbConnection::connect(arango).await?))
    }

    #[cfg(not(feature = "arango"))]
    async fn open_arango(_config: &BookstoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Err(StoreError::validation(
            "the arango backend requires the 'arango' feature",
        ))
    }

    /// Wrap an already connected store.
    pub fn with_store(
        store: Arc<dyn DocumentStore>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// A query runner bound to this session's collection.
    pub fn queries(&self) -> BookQueries {
        BookQueries::new(self.store(), self.collection.clone())
    }

    /// Open a session, hand its runner to `f`, and release the store once
    /// the returned future completes (successfully or not).
    pub async fn run<F, Fut, T>(config: &BookstoreConfig, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(BookQueries) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let session = Self::open(config).await?;
        let result = f(session.queries()).await;
        drop(session);
        result
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        debug!(
            "[session] releasing store for '{}.{}' ({} other handles)",
            self.database,
            self.collection,
            Arc::strong_count(&self.store) - 1
        );
    }
}
