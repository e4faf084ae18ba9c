use crate::db::connection::StoreError;
use crate::model::book::BookField;
use crate::query::filter_expression::FilterExpression;
use serde::{Deserialize, Serialize};

/// Sort direction, serialised the way document stores spell it (1 / -1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    pub fn as_aql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl Serialize for SortDirection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i32::deserialize(deserializer)? {
            1 => Ok(SortDirection::Ascending),
            -1 => Ok(SortDirection::Descending),
            other => Err(serde::de::Error::custom(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

/// Pagination configuration for store queries. `page_number` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub page_number: usize,
}

impl PaginationConfig {
    pub fn skip(&self) -> usize {
        self.page_size.saturating_mul(self.page_number)
    }
}

/// Specification for a find: filter, projection, sort and pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct FindSpecification {
    pub filter: FilterExpression,
    /// Empty means the full document (including the store key).
    pub projection: Vec<BookField>,
    pub sort: Vec<(BookField, SortDirection)>,
    pub pagination: Option<PaginationConfig>,
}

impl Default for FindSpecification {
    fn default() -> Self {
        Self {
            filter: FilterExpression::all(),
            projection: Vec::new(),
            sort: Vec::new(),
            pagination: None,
        }
    }
}

impl FindSpecification {
    pub fn new(filter: FilterExpression) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn project(mut self, fields: impl IntoIterator<Item = BookField>) -> Self {
        self.projection = fields.into_iter().collect();
        self
    }

    pub fn sort_by(mut self, field: BookField, direction: SortDirection) -> Self {
        self.sort.push((field, direction));
        self
    }

    pub fn paginate(mut self, page_size: usize, page_number: usize) -> Self {
        self.pagination = Some(PaginationConfig {
            page_size,
            page_number,
        });
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.filter.validate()?;
        if let Some(p) = &self.pagination {
            if p.page_size == 0 {
                return Err(StoreError::validation("page size must be at least 1"));
            }
        }
        Ok(())
    }
}
