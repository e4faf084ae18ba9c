//! `BookQueries`: builds bookstore payloads, validates them against the book
//! schema and submits each one to a `DocumentStore`.
//!
//! Validation always happens before the store is touched, so a rejected
//! request never produces a partial side effect.

use crate::db::connection::{
    DeleteOutcome, DocumentStore, ExplainTarget, IndexOutcome, StoreError, UpdateOutcome,
};
use crate::model::book::{Book, BookField};
use crate::query::filter_expression::{FieldCriterion, FilterExpression};
use crate::query::find_specification::{FindSpecification, SortDirection};
use crate::query::index_specification::IndexSpecification;
use crate::query::pipeline::{Accumulator, Pipeline, ProjectionExpression, GROUP_KEY_FIELD};
use crate::query::update_specification::UpdateSpecification;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Query runner bound to one collection of one store.
#[derive(Debug, Clone)]
pub struct BookQueries {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl BookQueries {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn decode(documents: Vec<Value>) -> Result<Vec<Book>, StoreError> {
        documents.into_iter().map(Book::from_document).collect()
    }

    /// Idempotent.
    pub async fn create_collection(&self) -> Result<(), StoreError> {
        self.store.create_collection(&self.collection).await
    }

    /// User collections present in the database, sorted by name.
    pub async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_collections().await
    }

    /// Remove every book, keeping the collection and its indexes.
    pub async fn clear_collection(&self) -> Result<(), StoreError> {
        self.store.clear_collection(&self.collection).await
    }

    /// Seed books; returns the store keys in input order.
    pub async fn insert_books(&self, books: &[Book]) -> Result<Vec<String>, StoreError> {
        let documents = books
            .iter()
            .map(Book::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        for doc in &documents {
            for (name, value) in doc.as_object().into_iter().flatten() {
                BookField::parse(name)?.check_value(value)?;
            }
        }
        debug!("[queries] inserting {} books into '{}'", documents.len(), self.collection);
        self.store.insert_documents(&self.collection, documents).await
    }

    /// Books whose `field` satisfies `criterion`.
    pub async fn find_by_field(
        &self,
        field: BookField,
        criterion: FieldCriterion,
    ) -> Result<Vec<Book>, StoreError> {
        self.find(FilterExpression::from_criterion(field, criterion)).await
    }

    /// Same as [`Self::find_by_field`] with the field given by name.
    pub async fn find_by_field_name(
        &self,
        field: &str,
        criterion: FieldCriterion,
    ) -> Result<Vec<Book>, StoreError> {
        let field = BookField::parse(field)?;
        self.find_by_field(field, criterion).await
    }

    /// Books matching an arbitrary composed filter.
    pub async fn find(&self, filter: FilterExpression) -> Result<Vec<Book>, StoreError> {
        let spec = FindSpecification::new(filter);
        spec.validate()?;
        debug!("[queries] find on '{}': {:?}", self.collection, spec.filter);
        let documents = self.store.find(&self.collection, &spec).await?;
        Self::decode(documents)
    }

    pub async fn count(&self, filter: FilterExpression) -> Result<u64, StoreError> {
        filter.validate()?;
        self.store.count(&self.collection, &filter).await
    }

    /// Set `field` to `value` on the first book matching `filter`.
    /// Fails with `StoreError::NotFound` when nothing matches.
    pub async fn update_one_field(
        &self,
        filter: FilterExpression,
        field: BookField,
        value: impl Into<Value>,
    ) -> Result<UpdateOutcome, StoreError> {
        let update = UpdateSpecification::set(field, value);
        self.update_one(filter, update).await
    }

    pub async fn update_one(
        &self,
        filter: FilterExpression,
        update: UpdateSpecification,
    ) -> Result<UpdateOutcome, StoreError> {
        filter.validate()?;
        update.validate()?;
        debug!(
            "[queries] update_one on '{}': {:?} set {}",
            self.collection,
            filter,
            update.to_patch()
        );
        let outcome = self
            .store
            .update_one(&self.collection, &filter, &update)
            .await?;
        if outcome.matched == 0 {
            return Err(StoreError::NotFound {
                collection: self.collection.clone(),
                operation: "update_one",
            });
        }
        Ok(outcome)
    }

    /// Remove the first book matching `filter`. No match is not an error:
    /// the outcome reports `deleted == 0`.
    pub async fn delete_one(&self, filter: FilterExpression) -> Result<DeleteOutcome, StoreError> {
        filter.validate()?;
        debug!("[queries] delete_one on '{}': {:?}", self.collection, filter);
        self.store.delete_one(&self.collection, &filter).await
    }

    /// Matching books restricted to `fields`, without the store key.
    pub async fn project(
        &self,
        filter: FilterExpression,
        fields: &[BookField],
    ) -> Result<Vec<Value>, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::validation("projection needs at least one field"));
        }
        let spec = FindSpecification::new(filter).project(fields.iter().copied());
        spec.validate()?;
        self.store.find(&self.collection, &spec).await
    }

    /// Page `page_index` (zero-based) of the filtered result set sorted by
    /// `sort_field`. Ties are ordered by store key.
    pub async fn sort_and_paginate(
        &self,
        filter: FilterExpression,
        sort_field: BookField,
        direction: SortDirection,
        page_size: usize,
        page_index: usize,
    ) -> Result<Vec<Book>, StoreError> {
        let spec = FindSpecification::new(filter)
            .sort_by(sort_field, direction)
            .paginate(page_size, page_index);
        spec.validate()?;
        debug!(
            "[queries] page {} (size {}) of '{}' by {} {:?}",
            page_index, page_size, self.collection, sort_field, direction
        );
        let documents = self.store.find(&self.collection, &spec).await?;
        Self::decode(documents)
    }

    /// Every matching book sorted by `sort_field`.
    pub async fn sorted(
        &self,
        filter: FilterExpression,
        sort_field: BookField,
        direction: SortDirection,
    ) -> Result<Vec<Book>, StoreError> {
        let spec = FindSpecification::new(filter).sort_by(sort_field, direction);
        spec.validate()?;
        let documents = self.store.find(&self.collection, &spec).await?;
        Self::decode(documents)
    }

    pub async fn aggregate(&self, pipeline: Pipeline) -> Result<Vec<Value>, StoreError> {
        pipeline.validate()?;
        debug!(
            "[queries] aggregate on '{}' with {} stages",
            self.collection,
            pipeline.stages.len()
        );
        self.store.aggregate(&self.collection, &pipeline).await
    }

    /// Declare an index. Declaring the same index twice is not an error.
    pub async fn create_index(&self, spec: IndexSpecification) -> Result<IndexOutcome, StoreError> {
        spec.validate()?;
        debug!("[queries] create_index '{}' on '{}'", spec.index_name(), self.collection);
        self.store.create_index(&self.collection, &spec).await
    }

    /// Store-reported execution plan and statistics for `target`.
    pub async fn explain(&self, target: ExplainTarget) -> Result<Value, StoreError> {
        match &target {
            ExplainTarget::Find(spec) => spec.validate()?,
            ExplainTarget::Aggregate(pipeline) => pipeline.validate()?,
        }
        self.store.explain(&self.collection, &target).await
    }

    pub fn average_price_by_genre_pipeline() -> Pipeline {
        Pipeline::new()
            .group(
                Some(ProjectionExpression::book(BookField::Genre)),
                vec![(
                    "average_price",
                    Accumulator::Avg(ProjectionExpression::book(BookField::Price)),
                )],
            )
            .sort(vec![(GROUP_KEY_FIELD, SortDirection::Ascending)])
    }

    pub fn most_prolific_author_pipeline() -> Pipeline {
        Pipeline::new()
            .group(
                Some(ProjectionExpression::book(BookField::Author)),
                vec![("book_count", Accumulator::Count)],
            )
            .sort(vec![
                ("book_count", SortDirection::Descending),
                (GROUP_KEY_FIELD, SortDirection::Ascending),
            ])
            .limit(1)
    }

    /// Decade labels like `"1940s"`: the first three digits of the year plus `"0s"`.
    pub fn books_by_decade_pipeline() -> Pipeline {
        Pipeline::new()
            .project(vec![(
                "decade",
                ProjectionExpression::concat(vec![
                    ProjectionExpression::book(BookField::PublishedYear)
                        .to_string_expr()
                        .substr(0, 3),
                    ProjectionExpression::literal("0s"),
                ]),
            )])
            .group(
                Some(ProjectionExpression::field("decade")),
                vec![("count", Accumulator::Count)],
            )
            .sort(vec![(GROUP_KEY_FIELD, SortDirection::Ascending)])
    }

    /// `{_id: genre, average_price}` per genre.
    pub async fn average_price_by_genre(&self) -> Result<Vec<Value>, StoreError> {
        self.aggregate(Self::average_price_by_genre_pipeline()).await
    }

    /// `{_id: author, book_count}` for the author with the most books, if any.
    pub async fn most_prolific_author(&self) -> Result<Option<Value>, StoreError> {
        let mut top = self.aggregate(Self::most_prolific_author_pipeline()).await?;
        Ok(if top.is_empty() { None } else { Some(top.remove(0)) })
    }

    /// `{_id: decade, count}` ordered by decade.
    pub async fn books_by_decade(&self) -> Result<Vec<Value>, StoreError> {
        self.aggregate(Self::books_by_decade_pipeline()).await
    }

    pub async fn title_index(&self) -> Result<IndexOutcome, StoreError> {
        self.create_index(IndexSpecification::on(BookField::Title, SortDirection::Ascending))
            .await
    }

    pub async fn author_year_index(&self) -> Result<IndexOutcome, StoreError> {
        self.create_index(
            IndexSpecification::on(BookField::Author, SortDirection::Ascending)
                .then(BookField::PublishedYear, SortDirection::Descending),
        )
        .await
    }
}
