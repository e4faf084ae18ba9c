//! Typed query builder and runner for the `plp_bookstore` document database.

// modules
pub mod config;
pub mod db;
pub mod model;
pub mod query;
pub mod runner;
pub mod session;

// Public API
pub use config::{ArangoAuthMode, BackendKind, BookstoreConfig};
pub use db::MockDocumentStore;
#[cfg(feature = "arango")]
pub use db::{ArangoAuthRefresh, ArangoConnectionConfig, ArangoDbConnection};
pub use db::{
    DeleteOutcome, DocumentStore, ExplainTarget, IndexOutcome, MemoryDbConnection, StoreError,
    UpdateOutcome, DOCUMENT_KEY_FIELD,
};
pub use model::{Book, BookField};
pub use runner::BookQueries;
pub use session::StoreSession;

// Convenient prelude for users
pub mod prelude {
    pub use crate::{
        ArangoAuthMode, Book, BookField, BookQueries, BookstoreConfig, DocumentStore,
        ExplainTarget, MemoryDbConnection, StoreError, StoreSession,
        query::{
            Accumulator, Comparator, FieldCriterion, FilterExpression, FindSpecification,
            IndexSpecification, Pipeline, ProjectionExpression, SortDirection,
            UpdateSpecification,
        },
    };

    #[cfg(feature = "arango")]
    pub use crate::{ArangoAuthRefresh, ArangoConnectionConfig, ArangoDbConnection};
}
