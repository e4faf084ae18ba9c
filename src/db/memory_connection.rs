//! In-process backend: implements `DocumentStore` over plain JSON documents.
//! Used by the test matrix and the demo when no ArangoDB endpoint is configured.

use crate::db::connection::{
    DocumentStore, DeleteOutcome, ExplainTarget, IndexOutcome, StoreError, UpdateOutcome,
    DOCUMENT_KEY_FIELD,
};
use crate::db::shared::{
    comparable, compare_values, field_value, is_truthy, number_value, value_to_string,
    values_equal,
};
use crate::query::filter_expression::{BinaryOperator, FilterExpression};
use crate::query::find_specification::{FindSpecification, SortDirection};
use crate::query::index_specification::IndexSpecification;
use crate::query::pipeline::{
    Accumulator, Pipeline, PipelineStage, ProjectionExpression, GROUP_KEY_FIELD,
};
use crate::query::update_specification::UpdateSpecification;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Collection {
    /// Insertion order is the natural order.
    documents: Vec<Value>,
    next_key: u64,
    indexes: Vec<IndexSpecification>,
}

impl Collection {
    fn unique_violation(&self, candidate: &Value, skip: Option<usize>) -> Option<String> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let clash = self.documents.iter().enumerate().any(|(pos, doc)| {
                Some(pos) != skip
                    && index.keys.iter().all(|(f, _)| {
                        values_equal(field_value(doc, f.as_str()), field_value(candidate, f.as_str()))
                    })
            });
            if clash {
                return Some(index.index_name());
            }
        }
        None
    }
}

/// A `DocumentStore` that keeps every collection in memory.
#[derive(Debug, Clone)]
pub struct MemoryDbConnection {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryDbConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned() -> StoreError {
    StoreError::store("memory store lock poisoned")
}

fn matches(expr: &FilterExpression, doc: &Value) -> bool {
    match expr {
        FilterExpression::BinaryOperator { op, lhs, rhs } => match op {
            BinaryOperator::And => matches(lhs, doc) && matches(rhs, doc),
            BinaryOperator::Or => matches(lhs, doc) || matches(rhs, doc),
            BinaryOperator::Eq => values_equal(&operand(lhs, doc), &operand(rhs, doc)),
            BinaryOperator::Ne => !values_equal(&operand(lhs, doc), &operand(rhs, doc)),
            BinaryOperator::In => {
                let l = operand(lhs, doc);
                match operand(rhs, doc) {
                    Value::Array(items) => items.iter().any(|v| values_equal(&l, v)),
                    _ => false,
                }
            }
            BinaryOperator::Gt | BinaryOperator::Gte | BinaryOperator::Lt | BinaryOperator::Lte => {
                let l = operand(lhs, doc);
                let r = operand(rhs, doc);
                if !comparable(&l, &r) {
                    return false;
                }
                let o = compare_values(&l, &r);
                match op {
                    BinaryOperator::Gt => o == Ordering::Greater,
                    BinaryOperator::Gte => o != Ordering::Less,
                    BinaryOperator::Lt => o == Ordering::Less,
                    _ => o != Ordering::Greater,
                }
            }
        },
        other => is_truthy(&operand(other, doc)),
    }
}

fn operand(expr: &FilterExpression, doc: &Value) -> Value {
    match expr {
        FilterExpression::Literal(v) => v.clone(),
        FilterExpression::Field(f) => field_value(doc, f.as_str()).clone(),
        FilterExpression::DocumentKey => field_value(doc, DOCUMENT_KEY_FIELD).clone(),
        FilterExpression::BinaryOperator { .. } => Value::Bool(matches(expr, doc)),
    }
}

fn sort_documents(docs: &mut [Value], keys: &[(String, SortDirection)]) {
    // stable: ties keep their incoming order
    docs.sort_by(|a, b| {
        for (field, dir) in keys {
            let o = compare_values(field_value(a, field), field_value(b, field));
            let o = match dir {
                SortDirection::Ascending => o,
                SortDirection::Descending => o.reverse(),
            };
            if o != Ordering::Equal {
                return o;
            }
        }
        Ordering::Equal
    });
}

fn evaluate(expr: &ProjectionExpression, doc: &Value) -> Result<Option<Value>, StoreError> {
    Ok(match expr {
        ProjectionExpression::Field(name) => doc.get(name).cloned(),
        ProjectionExpression::Literal(v) => Some(v.clone()),
        ProjectionExpression::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match evaluate(part, doc)? {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(other) => {
                        return Err(StoreError::store(format!(
                            "concat only supports strings, got {}",
                            other
                        )))
                    }
                }
            }
            Some(Value::String(out))
        }
        ProjectionExpression::Substr {
            expr,
            start,
            length,
        } => {
            let s = match evaluate(expr, doc)?.map(|v| value_to_string(&v)) {
                Some(Value::String(s)) => s,
                _ => String::new(),
            };
            Some(Value::String(s.chars().skip(*start).take(*length).collect()))
        }
        ProjectionExpression::ToString(expr) => {
            Some(evaluate(expr, doc)?.map(|v| value_to_string(&v)).unwrap_or(Value::Null))
        }
    })
}

fn accumulate(acc: &Accumulator, docs: &[&Value]) -> Result<Value, StoreError> {
    let numbers = |expr: &ProjectionExpression| -> Result<Vec<Value>, StoreError> {
        let mut out = Vec::new();
        for doc in docs {
            if let Some(v @ Value::Number(_)) = evaluate(expr, doc)? {
                out.push(v);
            }
        }
        Ok(out)
    };
    Ok(match acc {
        Accumulator::Count => Value::from(docs.len() as u64),
        Accumulator::Sum(expr) => {
            let values = numbers(expr)?;
            let exact = values
                .iter()
                .map(Value::as_i64)
                .try_fold(0i64, |total, v| total.checked_add(v?));
            match exact {
                Some(total) => Value::from(total),
                // mixed types or i64 overflow promote to double
                None => number_value(values.iter().filter_map(Value::as_f64).sum::<f64>()),
            }
        }
        Accumulator::Avg(expr) => {
            let values = numbers(expr)?;
            if values.is_empty() {
                Value::Null
            } else {
                let total: f64 = values.iter().filter_map(Value::as_f64).sum();
                serde_json::Number::from_f64(total / values.len() as f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Accumulator::Min(expr) | Accumulator::Max(expr) => {
            let mut best: Option<Value> = None;
            for doc in docs {
                let v = match evaluate(expr, doc)? {
                    Some(v) if !v.is_null() => v,
                    _ => continue,
                };
                let replace = match &best {
                    None => true,
                    Some(b) => {
                        let o = compare_values(&v, b);
                        if matches!(acc, Accumulator::Min(_)) {
                            o == Ordering::Less
                        } else {
                            o == Ordering::Greater
                        }
                    }
                };
                if replace {
                    best = Some(v);
                }
            }
            best.unwrap_or(Value::Null)
        }
    })
}

fn group(
    docs: Vec<Value>,
    key: Option<&ProjectionExpression>,
    accumulators: &[(String, Accumulator)],
) -> Result<Vec<Value>, StoreError> {
    // first-seen key order
    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for doc in &docs {
        let k = match key {
            Some(expr) => evaluate(expr, doc)?.unwrap_or(Value::Null),
            None => Value::Null,
        };
        match groups.iter().position(|(g, _)| values_equal(g, &k)) {
            Some(i) => groups[i].1.push(doc),
            None => groups.push((k, vec![doc])),
        }
    }
    let mut out = Vec::with_capacity(groups.len());
    for (k, members) in groups {
        let mut obj = Map::new();
        obj.insert(GROUP_KEY_FIELD.to_string(), k);
        for (name, acc) in accumulators {
            obj.insert(name.clone(), accumulate(acc, &members)?);
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

fn project(
    docs: Vec<Value>,
    fields: &[(String, ProjectionExpression)],
    keep_group_key: bool,
) -> Result<Vec<Value>, StoreError> {
    docs.iter()
        .map(|doc| -> Result<Value, StoreError> {
            let mut obj = Map::new();
            if keep_group_key {
                obj.insert(
                    GROUP_KEY_FIELD.to_string(),
                    field_value(doc, GROUP_KEY_FIELD).clone(),
                );
            }
            for (name, expr) in fields {
                if let Some(v) = evaluate(expr, doc)? {
                    obj.insert(name.clone(), v);
                }
            }
            Ok(Value::Object(obj))
        })
        .collect()
}

fn run_pipeline(mut docs: Vec<Value>, pipeline: &Pipeline) -> Result<Vec<Value>, StoreError> {
    for (i, stage) in pipeline.stages.iter().enumerate() {
        docs = match stage {
            PipelineStage::Match(filter) => docs.into_iter().filter(|d| matches(filter, d)).collect(),
            PipelineStage::Group { key, accumulators } => group(docs, key.as_ref(), accumulators)?,
            PipelineStage::Sort(keys) => {
                sort_documents(&mut docs, keys);
                docs
            }
            PipelineStage::Skip(n) => docs.into_iter().skip(*n).collect(),
            PipelineStage::Limit(n) => docs.into_iter().take(*n).collect(),
            PipelineStage::Project(fields) => {
                project(docs, fields, pipeline.project_keeps_group_key(i))?
            }
        };
    }
    Ok(docs)
}

fn run_find(documents: &[Value], spec: &FindSpecification) -> Vec<Value> {
    let mut docs: Vec<Value> = documents
        .iter()
        .filter(|d| matches(&spec.filter, d))
        .cloned()
        .collect();
    if !spec.sort.is_empty() {
        let keys: Vec<(String, SortDirection)> = spec
            .sort
            .iter()
            .map(|(f, d)| (f.as_str().to_string(), *d))
            .collect();
        sort_documents(&mut docs, &keys);
    }
    if let Some(p) = &spec.pagination {
        docs = docs.into_iter().skip(p.skip()).take(p.page_size).collect();
    }
    if spec.projection.is_empty() {
        return docs;
    }
    docs.into_iter()
        .map(|doc| {
            let mut obj = Map::new();
            for field in &spec.projection {
                if let Some(v) = doc.get(field.as_str()) {
                    obj.insert(field.as_str().to_string(), v.clone());
                }
            }
            Value::Object(obj)
        })
        .collect()
}

/// Pick the index whose leading keys are covered by equality constraints.
fn choose_index<'a>(
    indexes: &'a [IndexSpecification],
    filter: &FilterExpression,
) -> Option<(&'a IndexSpecification, usize)> {
    let constraints = filter.equality_constraints();
    indexes
        .iter()
        .map(|index| {
            let prefix = index
                .keys
                .iter()
                .take_while(|(f, _)| constraints.iter().any(|(c, _)| c == f))
                .count();
            (index, prefix)
        })
        .filter(|(_, prefix)| *prefix > 0)
        .max_by_key(|(_, prefix)| *prefix)
}

impl MemoryDbConnection {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }

    fn read<T>(
        &self,
        collection: &str,
        op: impl FnOnce(Option<&Collection>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.ensure_available()?;
        let guard = self.collections.read().map_err(|_| lock_poisoned())?;
        op(guard.get(collection))
    }

    fn write<T>(
        &self,
        collection: &str,
        op: impl FnOnce(&mut Collection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.ensure_available()?;
        let mut guard = self.collections.write().map_err(|_| lock_poisoned())?;
        op(guard.entry(collection.to_string()).or_default())
    }

    fn explain_now(&self, collection: &str, target: &ExplainTarget) -> Result<Value, StoreError> {
        self.read(collection, |col| {
            let (documents, indexes): (&[Value], &[IndexSpecification]) = match col {
                Some(c) => (c.documents.as_slice(), c.indexes.as_slice()),
                None => (&[], &[]),
            };
            let (filter, returned) = match target {
                ExplainTarget::Find(spec) => (spec.filter.clone(), run_find(documents, spec).len()),
                ExplainTarget::Aggregate(pipeline) => {
                    let filter = match pipeline.stages.first() {
                        Some(PipelineStage::Match(f)) => f.clone(),
                        _ => FilterExpression::all(),
                    };
                    (filter, run_pipeline(documents.to_vec(), pipeline)?.len())
                }
            };
            let (stage, index_name, examined) = match choose_index(indexes, &filter) {
                Some((index, prefix)) => {
                    let constraints = filter.equality_constraints();
                    let leading = &index.keys[..prefix];
                    let examined = documents
                        .iter()
                        .filter(|doc| {
                            leading.iter().all(|(f, _)| {
                                constraints
                                    .iter()
                                    .filter(|(c, _)| c == f)
                                    .all(|(_, v)| values_equal(field_value(doc, f.as_str()), v))
                            })
                        })
                        .count();
                    ("IXSCAN", Value::String(index.index_name()), examined)
                }
                None => ("COLLSCAN", Value::Null, documents.len()),
            };
            let keys_examined = if stage == "IXSCAN" { examined } else { 0 };
            Ok(json!({
                "collection": collection,
                "queryPlanner": {
                    "winningPlan": { "stage": stage, "indexName": index_name }
                },
                "executionStats": {
                    "nReturned": returned,
                    "totalDocsExamined": examined,
                    "totalKeysExamined": keys_examined,
                }
            }))
        })
    }
}

impl DocumentStore for MemoryDbConnection {
    fn create_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        let res = self.write(collection, |_| Ok(()));
        if res.is_ok() {
            info!("[memory] collection '{}' ready", collection);
        }
        future::ready(res).boxed()
    }

    fn list_collections(&self) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        let res = self.ensure_available().and_then(|_| {
            let guard = self.collections.read().map_err(|_| lock_poisoned())?;
            let mut names: Vec<String> = guard.keys().cloned().collect();
            names.sort();
            Ok(names)
        });
        future::ready(res).boxed()
    }

    fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        let res = self.write(collection, |col| {
            let mut keys = Vec::with_capacity(documents.len());
            for doc in documents {
                let mut obj = match doc {
                    Value::Object(obj) => obj,
                    other => {
                        return Err(StoreError::store(format!(
                            "documents must be objects, got {}",
                            other
                        )))
                    }
                };
                col.next_key += 1;
                let key = col.next_key.to_string();
                obj.insert(DOCUMENT_KEY_FIELD.to_string(), Value::String(key.clone()));
                let doc = Value::Object(obj);
                if let Some(index) = col.unique_violation(&doc, None) {
                    return Err(StoreError::store(format!(
                        "unique constraint violated on index '{}'",
                        index
                    )));
                }
                col.documents.push(doc);
                keys.push(key);
            }
            Ok(keys)
        });
        future::ready(res).boxed()
    }

    fn find(
        &self,
        collection: &str,
        spec: &FindSpecification,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        debug!("[memory] find on '{}': {:?}", collection, spec);
        let res = self.read(collection, |col| {
            Ok(col.map(|c| run_find(&c.documents, spec)).unwrap_or_default())
        });
        future::ready(res).boxed()
    }

    fn count(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<u64, StoreError>> {
        let res = self.read(collection, |col| {
            Ok(col
                .map(|c| c.documents.iter().filter(|d| matches(filter, d)).count() as u64)
                .unwrap_or(0))
        });
        future::ready(res).boxed()
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
        update: &UpdateSpecification,
    ) -> BoxFuture<'static, Result<UpdateOutcome, StoreError>> {
        let patch = update.to_patch();
        let res = self.write(collection, |col| {
            let Some(pos) = col.documents.iter().position(|d| matches(filter, d)) else {
                return Ok(UpdateOutcome::default());
            };
            let mut updated = col.documents[pos].clone();
            if let (Some(target), Some(changes)) = (updated.as_object_mut(), patch.as_object()) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            if let Some(index) = col.unique_violation(&updated, Some(pos)) {
                return Err(StoreError::store(format!(
                    "unique constraint violated on index '{}'",
                    index
                )));
            }
            let modified = u64::from(updated != col.documents[pos]);
            col.documents[pos] = updated;
            Ok(UpdateOutcome {
                matched: 1,
                modified,
            })
        });
        future::ready(res).boxed()
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<DeleteOutcome, StoreError>> {
        let res = self.write(collection, |col| {
            match col.documents.iter().position(|d| matches(filter, d)) {
                Some(pos) => {
                    col.documents.remove(pos);
                    Ok(DeleteOutcome { deleted: 1 })
                }
                None => Ok(DeleteOutcome { deleted: 0 }),
            }
        });
        future::ready(res).boxed()
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        debug!("[memory] aggregate on '{}': {} stages", collection, pipeline.stages.len());
        let res = self.read(collection, |col| {
            let docs = col.map(|c| c.documents.clone()).unwrap_or_default();
            run_pipeline(docs, pipeline)
        });
        future::ready(res).boxed()
    }

    fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpecification,
    ) -> BoxFuture<'static, Result<IndexOutcome, StoreError>> {
        let name = spec.index_name();
        let res = self.write(collection, |col| {
            if let Some(existing) = col.indexes.iter().find(|i| i.index_name() == name) {
                if existing.keys == spec.keys && existing.unique == spec.unique {
                    return Ok(IndexOutcome {
                        name: name.clone(),
                        newly_created: false,
                    });
                }
                return Err(StoreError::store(format!(
                    "an index named '{}' already exists with a different definition",
                    name
                )));
            }
            if spec.unique {
                for (pos, doc) in col.documents.iter().enumerate() {
                    let clash = col.documents[..pos].iter().any(|other| {
                        spec.keys.iter().all(|(f, _)| {
                            values_equal(field_value(doc, f.as_str()), field_value(other, f.as_str()))
                        })
                    });
                    if clash {
                        return Err(StoreError::store(format!(
                            "cannot build unique index '{}': duplicate keys",
                            name
                        )));
                    }
                }
            }
            col.indexes.push(spec.clone());
            Ok(IndexOutcome {
                name: name.clone(),
                newly_created: true,
            })
        });
        if let Ok(outcome) = &res {
            if outcome.newly_created {
                info!("[memory] created index '{}' on '{}'", outcome.name, collection);
            }
        }
        future::ready(res).boxed()
    }

    fn explain(
        &self,
        collection: &str,
        target: &ExplainTarget,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        future::ready(self.explain_now(collection, target)).boxed()
    }

    fn clear_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        let res = self.write(collection, |col| {
            col.documents.clear();
            Ok(())
        });
        future::ready(res).boxed()
    }
}
