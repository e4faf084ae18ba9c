//! Defines the abstract `DocumentStore` trait.

use crate::query::find_specification::FindSpecification;
use crate::query::filter_expression::FilterExpression;
use crate::query::index_specification::IndexSpecification;
use crate::query::pipeline::Pipeline;
use crate::query::update_specification::UpdateSpecification;
use futures::future::BoxFuture;
use mockall::automock;
use serde_json::Value;

/// The field name under which every backend reports the document key.
pub const DOCUMENT_KEY_FIELD: &str = "_key";

/// An error type for store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// An update targeted zero documents.
    #[error("{operation} on '{collection}' matched no documents")]
    NotFound {
        collection: String,
        operation: &'static str,
    },
    /// The request was rejected before it reached the store.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Any other failure reported by the store, passed through verbatim.
    #[error("Store error: {0}")]
    Store(String),
    /// A returned document could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        StoreError::Store(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Result of a single-document delete. `deleted` is 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    pub deleted: u64,
}

/// Result of an index declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    pub name: String,
    pub newly_created: bool,
}

/// The operation whose execution plan should be reported.
#[derive(Debug, Clone)]
pub enum ExplainTarget {
    Find(FindSpecification),
    Aggregate(Pipeline),
}

/// Abstracts store operations via async returns but remains object-safe.
#[automock]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Returns the name of the field used as the primary key for documents.
    fn document_key_field(&self) -> &'static str {
        DOCUMENT_KEY_FIELD
    }

    /// Create the collection; succeeds if it already exists.
    fn create_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Names of the user collections in the database, sorted.
    fn list_collections(&self) -> BoxFuture<'static, Result<Vec<String>, StoreError>>;

    /// Insert documents and return their keys in input order.
    fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<String>, StoreError>>;

    /// Execute a find and return full (or projected) documents.
    fn find(
        &self,
        collection: &str,
        spec: &FindSpecification,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>>;

    /// Count documents matching a filter without fetching them.
    fn count(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<u64, StoreError>>;

    /// Apply `update` to at most one document matching `filter`.
    fn update_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
        update: &UpdateSpecification,
    ) -> BoxFuture<'static, Result<UpdateOutcome, StoreError>>;

    /// Remove at most one document matching `filter`.
    fn delete_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<DeleteOutcome, StoreError>>;

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>>;

    fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpecification,
    ) -> BoxFuture<'static, Result<IndexOutcome, StoreError>>;

    /// Store-reported execution plan and statistics; shape is backend defined.
    fn explain(
        &self,
        collection: &str,
        target: &ExplainTarget,
    ) -> BoxFuture<'static, Result<Value, StoreError>>;

    /// Remove every document from the collection, keeping the collection.
    fn clear_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>>;
}
