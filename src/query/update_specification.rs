use crate::db::connection::StoreError;
use crate::model::book::BookField;
use serde_json::{Map, Value};

/// Fields to `$set` on the matched document, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpecification {
    pub set: Vec<(BookField, Value)>,
}

impl UpdateSpecification {
    pub fn set(field: BookField, value: impl Into<Value>) -> Self {
        Self {
            set: vec![(field, value.into())],
        }
    }

    pub fn and_set(mut self, field: BookField, value: impl Into<Value>) -> Self {
        self.set.push((field, value.into()));
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.set.is_empty() {
            return Err(StoreError::validation("update must set at least one field"));
        }
        self.set.iter().try_for_each(|(f, v)| f.check_value(v))
    }

    /// The patch object merged into the document. Later entries win.
    pub fn to_patch(&self) -> Value {
        let mut obj = Map::new();
        for (field, value) in &self.set {
            obj.insert(field.as_str().to_string(), value.clone());
        }
        Value::Object(obj)
    }
}
