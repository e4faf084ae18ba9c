//! The book record and its schema.

use crate::db::connection::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A book document. Every field is optional at the storage layer; queries
/// only ever name the fields listed in [`BookField`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Store key; populated on documents read back from the store.
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

impl Book {
    /// A fully populated book, as the seeding scripts insert them.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        genre: impl Into<String>,
        published_year: i64,
        price: f64,
        in_stock: bool,
    ) -> Self {
        Self {
            key: None,
            title: Some(title.into()),
            author: Some(author.into()),
            genre: Some(genre.into()),
            published_year: Some(published_year),
            price: Some(price),
            in_stock: Some(in_stock),
        }
    }

    /// Serialise for insertion. The store key is never written.
    ///
    /// A non-finite price is rejected: JSON has no NaN or infinity and
    /// `serde_json` would silently write `null`.
    pub fn to_document(&self) -> Result<serde_json::Value, StoreError> {
        if let Some(price) = self.price.filter(|p| !p.is_finite()) {
            return Err(StoreError::validation(format!(
                "price must be a finite number, got {}",
                price
            )));
        }
        let mut doc = serde_json::to_value(self)?;
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("_key");
        }
        Ok(doc)
    }

    pub fn from_document(doc: serde_json::Value) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(doc)?)
    }
}

/// The recognised book attributes. Filters, updates, sorts, projections and
/// indexes are validated against this set before anything reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookField {
    Title,
    Author,
    Genre,
    PublishedYear,
    Price,
    InStock,
}

impl BookField {
    pub const ALL: [BookField; 6] = [
        BookField::Title,
        BookField::Author,
        BookField::Genre,
        BookField::PublishedYear,
        BookField::Price,
        BookField::InStock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookField::Title => "title",
            BookField::Author => "author",
            BookField::Genre => "genre",
            BookField::PublishedYear => "published_year",
            BookField::Price => "price",
            BookField::InStock => "in_stock",
        }
    }

    /// Resolve a field name, rejecting anything outside the schema.
    pub fn parse(name: &str) -> Result<Self, StoreError> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| StoreError::validation(format!("unknown book field '{}'", name)))
    }

    /// Check that `value` has the JSON type this field stores.
    /// `null` is accepted for every field.
    pub fn check_value(&self, value: &serde_json::Value) -> Result<(), StoreError> {
        use serde_json::Value;
        let ok = match (self, value) {
            (_, Value::Null) => true,
            (BookField::Title | BookField::Author | BookField::Genre, Value::String(_)) => true,
            (BookField::PublishedYear, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (BookField::Price, Value::Number(n)) => n.as_f64().map(|p| p >= 0.0).unwrap_or(false),
            (BookField::InStock, Value::Bool(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::validation(format!(
                "value {} is not valid for field '{}'",
                value, self
            )))
        }
    }
}

impl fmt::Display for BookField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookField::parse(s)
    }
}
