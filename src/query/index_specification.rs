use crate::db::connection::StoreError;
use crate::model::book::BookField;
use crate::query::find_specification::SortDirection;

/// Declares a single-field or compound index. Key order is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpecification {
    pub keys: Vec<(BookField, SortDirection)>,
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexSpecification {
    pub fn on(field: BookField, direction: SortDirection) -> Self {
        Self {
            keys: vec![(field, direction)],
            name: None,
            unique: false,
        }
    }

    pub fn then(mut self, field: BookField, direction: SortDirection) -> Self {
        self.keys.push((field, direction));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Explicit name, or `field_dir[_field_dir...]` as document stores name them.
    pub fn index_name(&self) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => self
                .keys
                .iter()
                .map(|(f, d)| format!("{}_{}", f.as_str(), d.as_i32()))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.keys.iter().map(|(f, _)| f.as_str().to_string()).collect()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.keys.is_empty() {
            return Err(StoreError::validation("index must declare at least one field"));
        }
        for (i, (field, _)) in self.keys.iter().enumerate() {
            if self.keys[..i].iter().any(|(f, _)| f == field) {
                return Err(StoreError::validation(format!(
                    "field '{}' appears twice in index",
                    field
                )));
            }
        }
        Ok(())
    }
}
