use futures::future::BoxFuture;
use plp_bookstore::query::{
    FilterExpression, FindSpecification, IndexSpecification, Pipeline, UpdateSpecification,
};
use plp_bookstore::{
    DeleteOutcome, DocumentStore, ExplainTarget, IndexOutcome, StoreError, UpdateOutcome,
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Wrapper that counts every store call and forwards to a real backend.
#[derive(Debug)]
pub struct CountingStore {
    pub inner: Arc<dyn DocumentStore>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl DocumentStore for CountingStore {
    fn document_key_field(&self) -> &'static str {
        self.inner.document_key_field()
    }

    fn create_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        self.tick();
        self.inner.create_collection(collection)
    }

    fn list_collections(&self) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        self.tick();
        self.inner.list_collections()
    }

    fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        self.tick();
        self.inner.insert_documents(collection, documents)
    }

    fn find(
        &self,
        collection: &str,
        spec: &FindSpecification,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        self.tick();
        self.inner.find(collection, spec)
    }

    fn count(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<u64, StoreError>> {
        self.tick();
        self.inner.count(collection, filter)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
        update: &UpdateSpecification,
    ) -> BoxFuture<'static, Result<UpdateOutcome, StoreError>> {
        self.tick();
        self.inner.update_one(collection, filter, update)
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<DeleteOutcome, StoreError>> {
        self.tick();
        self.inner.delete_one(collection, filter)
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        self.tick();
        self.inner.aggregate(collection, pipeline)
    }

    fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpecification,
    ) -> BoxFuture<'static, Result<IndexOutcome, StoreError>> {
        self.tick();
        self.inner.create_index(collection, spec)
    }

    fn explain(
        &self,
        collection: &str,
        target: &ExplainTarget,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        self.tick();
        self.inner.explain(collection, target)
    }

    fn clear_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        self.tick();
        self.inner.clear_collection(collection)
    }
}
