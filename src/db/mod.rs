#[cfg(feature = "arango")]
mod arango_connection;
pub mod connection;
mod memory_connection;
pub(crate) mod shared;

pub use connection::{
    DeleteOutcome, DocumentStore, ExplainTarget, IndexOutcome, StoreError, UpdateOutcome,
    DOCUMENT_KEY_FIELD,
};

#[cfg(feature = "arango")]
pub use arango_connection::{ArangoAuthRefresh, ArangoConnectionConfig, ArangoDbConnection};
pub use memory_connection::MemoryDbConnection;

pub use connection::MockDocumentStore;
