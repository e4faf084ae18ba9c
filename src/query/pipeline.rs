//! Aggregation pipelines: an ordered list of match/group/sort/skip/limit/project stages.

use crate::db::connection::{StoreError, DOCUMENT_KEY_FIELD};
use crate::model::book::BookField;
use crate::query::filter_expression::FilterExpression;
use crate::query::find_specification::SortDirection;
use serde_json::Value;

/// Output field holding the grouping key.
pub const GROUP_KEY_FIELD: &str = "_id";

/// A computed value inside a group or project stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionExpression {
    /// Value of a field on the stage's input document.
    Field(String),
    Literal(Value),
    Concat(Vec<ProjectionExpression>),
    /// Character substring; out-of-range bounds yield a shorter (possibly empty) string.
    Substr {
        expr: Box<ProjectionExpression>,
        start: usize,
        length: usize,
    },
    ToString(Box<ProjectionExpression>),
}

impl ProjectionExpression {
    pub fn field(name: impl Into<String>) -> Self {
        ProjectionExpression::Field(name.into())
    }

    pub fn book(field: BookField) -> Self {
        ProjectionExpression::Field(field.as_str().to_string())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ProjectionExpression::Literal(value.into())
    }

    pub fn concat(parts: Vec<ProjectionExpression>) -> Self {
        ProjectionExpression::Concat(parts)
    }

    pub fn substr(self, start: usize, length: usize) -> Self {
        ProjectionExpression::Substr {
            expr: Box::new(self),
            start,
            length,
        }
    }

    pub fn to_string_expr(self) -> Self {
        ProjectionExpression::ToString(Box::new(self))
    }

    fn referenced_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ProjectionExpression::Field(f) => out.push(f),
            ProjectionExpression::Literal(_) => {}
            ProjectionExpression::Concat(parts) => {
                parts.iter().for_each(|p| p.referenced_fields(out))
            }
            ProjectionExpression::Substr { expr, .. } | ProjectionExpression::ToString(expr) => {
                expr.referenced_fields(out)
            }
        }
    }
}

/// Group accumulators. Missing and non-numeric values are ignored by the
/// numeric accumulators.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(ProjectionExpression),
    Avg(ProjectionExpression),
    Min(ProjectionExpression),
    Max(ProjectionExpression),
    /// Number of documents in the group (`$sum: 1`).
    Count,
}

impl Accumulator {
    fn expression(&self) -> Option<&ProjectionExpression> {
        match self {
            Accumulator::Sum(e) | Accumulator::Avg(e) | Accumulator::Min(e) | Accumulator::Max(e) => {
                Some(e)
            }
            Accumulator::Count => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Match(FilterExpression),
    Group {
        /// `None` groups every document together under a `null` key.
        key: Option<ProjectionExpression>,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortDirection)>),
    Skip(usize),
    Limit(usize),
    Project(Vec<(String, ProjectionExpression)>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
}

/// Names visible to a stage: the book schema, or the output of the last
/// group/project stage.
#[derive(Debug, Clone)]
enum Shape {
    Book,
    Reshaped(Vec<String>),
}

impl Shape {
    fn has(&self, name: &str) -> bool {
        match self {
            Shape::Book => name == DOCUMENT_KEY_FIELD || BookField::parse(name).is_ok(),
            Shape::Reshaped(names) => names.iter().any(|n| n == name),
        }
    }

    fn has_group_key(&self) -> bool {
        matches!(self, Shape::Reshaped(names) if names.iter().any(|n| n == GROUP_KEY_FIELD))
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_(mut self, filter: FilterExpression) -> Self {
        self.stages.push(PipelineStage::Match(filter));
        self
    }

    pub fn group(
        mut self,
        key: Option<ProjectionExpression>,
        accumulators: Vec<(&str, Accumulator)>,
    ) -> Self {
        self.stages.push(PipelineStage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(n, a)| (n.to_string(), a))
                .collect(),
        });
        self
    }

    pub fn sort(mut self, keys: Vec<(&str, SortDirection)>) -> Self {
        self.stages.push(PipelineStage::Sort(
            keys.into_iter().map(|(n, d)| (n.to_string(), d)).collect(),
        ));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.stages.push(PipelineStage::Skip(n));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(PipelineStage::Limit(n));
        self
    }

    pub fn project(mut self, fields: Vec<(&str, ProjectionExpression)>) -> Self {
        self.stages.push(PipelineStage::Project(
            fields.into_iter().map(|(n, e)| (n.to_string(), e)).collect(),
        ));
        self
    }

    /// Whether a project stage carries the group key forward.
    /// Tracked statically so every backend shapes output the same way.
    pub fn project_keeps_group_key(&self, stage_index: usize) -> bool {
        let mut shape = Shape::Book;
        for stage in self.stages.iter().take(stage_index) {
            shape = Self::next_shape(&shape, stage);
        }
        shape.has_group_key()
    }

    fn next_shape(shape: &Shape, stage: &PipelineStage) -> Shape {
        match stage {
            PipelineStage::Group { accumulators, .. } => {
                let mut names = vec![GROUP_KEY_FIELD.to_string()];
                names.extend(accumulators.iter().map(|(n, _)| n.clone()));
                Shape::Reshaped(names)
            }
            PipelineStage::Project(fields) => {
                let mut names: Vec<String> = Vec::new();
                if shape.has_group_key() {
                    names.push(GROUP_KEY_FIELD.to_string());
                }
                names.extend(fields.iter().map(|(n, _)| n.clone()));
                Shape::Reshaped(names)
            }
            _ => shape.clone(),
        }
    }

    /// Reject references to fields the stage's input cannot have.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut shape = Shape::Book;
        for (i, stage) in self.stages.iter().enumerate() {
            let check = |name: &str| -> Result<(), StoreError> {
                if shape.has(name) {
                    Ok(())
                } else {
                    Err(StoreError::validation(format!(
                        "stage {} references unknown field '{}'",
                        i, name
                    )))
                }
            };
            match stage {
                PipelineStage::Match(filter) => {
                    filter.validate()?;
                    for f in filter.fields() {
                        check(f.as_str())?;
                    }
                }
                PipelineStage::Group { key, accumulators } => {
                    let mut refs = Vec::new();
                    if let Some(k) = key {
                        k.referenced_fields(&mut refs);
                    }
                    for (name, acc) in accumulators {
                        if name == GROUP_KEY_FIELD || name.is_empty() {
                            return Err(StoreError::validation(format!(
                                "invalid accumulator name '{}'",
                                name
                            )));
                        }
                        if let Some(e) = acc.expression() {
                            e.referenced_fields(&mut refs);
                        }
                    }
                    refs.into_iter().try_for_each(check)?;
                    Self::check_unique(accumulators.iter().map(|(n, _)| n.as_str()))?;
                }
                PipelineStage::Sort(keys) => {
                    if keys.is_empty() {
                        return Err(StoreError::validation("sort stage needs at least one key"));
                    }
                    keys.iter().try_for_each(|(n, _)| check(n))?;
                }
                PipelineStage::Skip(_) => {}
                PipelineStage::Limit(n) => {
                    if *n == 0 {
                        return Err(StoreError::validation("limit must be positive"));
                    }
                }
                PipelineStage::Project(fields) => {
                    if fields.is_empty() {
                        return Err(StoreError::validation(
                            "project stage needs at least one field",
                        ));
                    }
                    let mut refs = Vec::new();
                    for (name, expr) in fields {
                        if name == GROUP_KEY_FIELD || name.is_empty() {
                            return Err(StoreError::validation(format!(
                                "invalid projected name '{}'",
                                name
                            )));
                        }
                        expr.referenced_fields(&mut refs);
                    }
                    refs.into_iter().try_for_each(check)?;
                    Self::check_unique(fields.iter().map(|(n, _)| n.as_str()))?;
                }
            }
            shape = Self::next_shape(&shape, stage);
        }
        Ok(())
    }

    fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), StoreError> {
        let mut seen: Vec<&str> = Vec::new();
        for n in names {
            if seen.contains(&n) {
                return Err(StoreError::validation(format!("duplicate output name '{}'", n)));
            }
            seen.push(n);
        }
        Ok(())
    }
}
