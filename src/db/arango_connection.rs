//! Real ArangoDB backend: implements `DocumentStore` using `arangors`.
//! Every payload is translated into AQL with bind variables; index creation
//! and explain go through the REST endpoints arangors does not wrap.

use crate::config::ArangoAuthMode;
use crate::db::connection::{
    DeleteOutcome, DocumentStore, ExplainTarget, IndexOutcome, StoreError, UpdateOutcome,
    DOCUMENT_KEY_FIELD,
};
use crate::query::filter_expression::{BinaryOperator, FilterExpression};
use crate::query::find_specification::FindSpecification;
use crate::query::index_specification::IndexSpecification;
use crate::query::pipeline::{Accumulator, Pipeline, PipelineStage, ProjectionExpression, GROUP_KEY_FIELD};
use crate::query::update_specification::UpdateSpecification;
use arangors::{client::reqwest::ReqwestClient, AqlQuery, ClientError, Connection, Database};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

// Local constants to avoid magic strings
const AQL_BIND_COLLECTION: &str = "collection";
const AQL_BIND_DOCS: &str = "docs";
const AQL_BIND_PATCH: &str = "patch";

/// Refresh policy for authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ArangoAuthRefresh {
    /// Do not refresh automatically.
    Never,
    /// Reconnect and retry once when the server responds with an auth error.
    #[default]
    OnAuthError,
}

/// Configuration for establishing an Arango connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ArangoConnectionConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub auth_mode: ArangoAuthMode,
    pub refresh: ArangoAuthRefresh,
}

impl fmt::Debug for ArangoConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArangoConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("auth_mode", &self.auth_mode)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl ArangoConnectionConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            database: database.into(),
            auth_mode: ArangoAuthMode::Jwt,
            refresh: ArangoAuthRefresh::OnAuthError,
        }
    }

    fn database_url(&self, path: &str) -> String {
        format!(
            "{}/_db/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.database,
            path.trim_start_matches('/')
        )
    }
}

/// An authenticated POST against a database-scoped REST endpoint.
fn rest_request(
    http: &reqwest::Client,
    config: &ArangoConnectionConfig,
    path: &str,
) -> reqwest::RequestBuilder {
    http.post(config.database_url(path))
        .basic_auth(&config.username, Some(&config.password))
}

fn map_client_error(e: ClientError) -> StoreError {
    match e {
        ClientError::HttpClient(msg) => StoreError::Unavailable(msg),
        other => StoreError::Store(other.to_string()),
    }
}

/// Error 1207: a database or collection with this name already exists.
fn is_duplicate_name(e: &ClientError) -> bool {
    matches!(e, ClientError::Arango(arango_error) if arango_error.error_num() == 1207)
}

fn map_http_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Store(e.to_string())
    }
}

/// Accumulates bind variables while rendering AQL fragments.
#[derive(Debug, Default)]
struct AqlBuilder {
    bind_vars: HashMap<String, Value>,
}

impl AqlBuilder {
    fn for_collection(collection: &str) -> Self {
        let mut bind_vars = HashMap::new();
        bind_vars.insert(
            format!("@{}", AQL_BIND_COLLECTION),
            Value::String(collection.to_string()),
        );
        Self { bind_vars }
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("v{}", self.bind_vars.len());
        self.bind_vars.insert(name.clone(), value);
        format!("@{}", name)
    }

    fn filter(&mut self, expr: &FilterExpression) -> String {
        match expr {
            FilterExpression::Literal(v) => self.bind(v.clone()),
            FilterExpression::Field(field) => format!("doc.`{}`", field.as_str()),
            FilterExpression::DocumentKey => format!("doc.{}", DOCUMENT_KEY_FIELD),
            FilterExpression::BinaryOperator { op, lhs, rhs } => {
                let l = self.filter(lhs);
                let r = self.filter(rhs);
                match op {
                    // ranges only hold between values of the same type, so a
                    // missing field never satisfies `<`
                    BinaryOperator::Gt
                    | BinaryOperator::Gte
                    | BinaryOperator::Lt
                    | BinaryOperator::Lte => {
                        let op_str = match op {
                            BinaryOperator::Gt => ">",
                            BinaryOperator::Gte => ">=",
                            BinaryOperator::Lt => "<",
                            _ => "<=",
                        };
                        format!(
                            "(TYPENAME({l}) == TYPENAME({r}) AND {l} != null AND {l} {op} {r})",
                            l = l,
                            r = r,
                            op = op_str
                        )
                    }
                    _ => {
                        let op_str = match op {
                            BinaryOperator::Eq => "==",
                            BinaryOperator::Ne => "!=",
                            BinaryOperator::And => "AND",
                            BinaryOperator::Or => "OR",
                            _ => "IN",
                        };
                        format!("({} {} {})", l, op_str, r)
                    }
                }
            }
        }
    }

    fn expression(&mut self, expr: &ProjectionExpression) -> String {
        match expr {
            ProjectionExpression::Field(name) => {
                let b = self.bind(Value::String(name.clone()));
                format!("doc[{}]", b)
            }
            ProjectionExpression::Literal(v) => self.bind(v.clone()),
            ProjectionExpression::Concat(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| self.expression(p)).collect();
                format!("CONCAT({})", parts.join(", "))
            }
            ProjectionExpression::Substr {
                expr,
                start,
                length,
            } => {
                let inner = self.expression(expr);
                format!("SUBSTRING(TO_STRING({}), {}, {})", inner, start, length)
            }
            ProjectionExpression::ToString(expr) => {
                format!("TO_STRING({})", self.expression(expr))
            }
        }
    }

    fn find(&mut self, spec: &FindSpecification) -> String {
        let mut aql = format!("FOR doc IN @@{}\n", AQL_BIND_COLLECTION);
        aql.push_str(&format!("  FILTER {}\n", self.filter(&spec.filter)));
        if !spec.sort.is_empty() {
            let mut keys: Vec<String> = spec
                .sort
                .iter()
                .map(|(f, d)| format!("doc.`{}` {}", f.as_str(), d.as_aql()))
                .collect();
            keys.push(format!("doc.{} ASC", DOCUMENT_KEY_FIELD));
            aql.push_str(&format!("  SORT {}\n", keys.join(", ")));
        }
        if let Some(p) = &spec.pagination {
            let offset = self.bind(json!(p.skip()));
            let count = self.bind(json!(p.page_size));
            aql.push_str(&format!("  LIMIT {}, {}\n", offset, count));
        }
        if spec.projection.is_empty() {
            aql.push_str("  RETURN UNSET(doc, \"_id\", \"_rev\")");
        } else {
            let names: Vec<Value> = spec
                .projection
                .iter()
                .map(|f| Value::String(f.as_str().to_string()))
                .collect();
            let b = self.bind(Value::Array(names));
            aql.push_str(&format!("  RETURN KEEP(doc, {})", b));
        }
        aql
    }

    fn count(&mut self, filter: &FilterExpression) -> String {
        format!(
            "RETURN LENGTH(\n  FOR doc IN @@{}\n  FILTER {}\n  RETURN 1\n)",
            AQL_BIND_COLLECTION,
            self.filter(filter)
        )
    }

    fn update_one(&mut self, filter: &FilterExpression, update: &UpdateSpecification) -> String {
        let f = self.filter(filter);
        self.bind_vars.insert(AQL_BIND_PATCH.into(), update.to_patch());
        format!(
            "FOR doc IN @@{col}\n  FILTER {f}\n  LIMIT 1\n  UPDATE doc WITH @{patch} IN @@{col}\n  RETURN UNSET(OLD, \"_rev\") != UNSET(NEW, \"_rev\")",
            col = AQL_BIND_COLLECTION,
            f = f,
            patch = AQL_BIND_PATCH
        )
    }

    fn delete_one(&mut self, filter: &FilterExpression) -> String {
        format!(
            "FOR doc IN @@{col}\n  FILTER {f}\n  LIMIT 1\n  REMOVE doc IN @@{col}\n  RETURN OLD.{key}",
            col = AQL_BIND_COLLECTION,
            f = self.filter(filter),
            key = DOCUMENT_KEY_FIELD
        )
    }

    fn accumulator(&mut self, acc: &Accumulator) -> String {
        let numeric = |b: &mut Self, e: &ProjectionExpression| {
            let x = b.expression(e);
            format!("IS_NUMBER({x}) ? {x} : null", x = x)
        };
        match acc {
            Accumulator::Count => "COUNT(1)".to_string(),
            Accumulator::Sum(e) => format!("SUM({})", numeric(self, e)),
            Accumulator::Avg(e) => format!("AVERAGE({})", numeric(self, e)),
            Accumulator::Min(e) => format!("MIN({})", self.expression(e)),
            Accumulator::Max(e) => format!("MAX({})", self.expression(e)),
        }
    }

    /// Each stage reads the previous stage's array: `LET s<n+1> = (FOR doc IN s<n> ...)`.
    fn aggregate(&mut self, pipeline: &Pipeline) -> String {
        let mut aql = format!(
            "LET s0 = (FOR doc IN @@{} RETURN UNSET(doc, \"_id\", \"_rev\"))\n",
            AQL_BIND_COLLECTION
        );
        for (i, stage) in pipeline.stages.iter().enumerate() {
            let input = format!("s{}", i);
            let body = match stage {
                PipelineStage::Match(filter) => {
                    format!("(FOR doc IN {} FILTER {} RETURN doc)", input, self.filter(filter))
                }
                PipelineStage::Group { key, accumulators } => {
                    let key_expr = match key {
                        Some(k) => self.expression(k),
                        None => "null".to_string(),
                    };
                    let mut aggregates = Vec::new();
                    let mut fields = vec![format!("\"{}\": k", GROUP_KEY_FIELD)];
                    for (n, (name, acc)) in accumulators.iter().enumerate() {
                        aggregates.push(format!("a{} = {}", n, self.accumulator(acc)));
                        let b = self.bind(Value::String(name.clone()));
                        fields.push(format!("[{}]: a{}", b, n));
                    }
                    let aggregate_clause = if aggregates.is_empty() {
                        String::new()
                    } else {
                        format!(" AGGREGATE {}", aggregates.join(", "))
                    };
                    format!(
                        "(FOR doc IN {} COLLECT k = {}{} RETURN {{ {} }})",
                        input,
                        key_expr,
                        aggregate_clause,
                        fields.join(", ")
                    )
                }
                PipelineStage::Sort(keys) => {
                    let keys: Vec<String> = keys
                        .iter()
                        .map(|(name, dir)| {
                            let b = self.bind(Value::String(name.clone()));
                            format!("doc[{}] {}", b, dir.as_aql())
                        })
                        .collect();
                    format!("(FOR doc IN {} SORT {} RETURN doc)", input, keys.join(", "))
                }
                PipelineStage::Skip(n) => format!("SLICE({}, {})", input, n),
                PipelineStage::Limit(n) => format!("SLICE({}, 0, {})", input, n),
                PipelineStage::Project(projected) => {
                    let mut fields = Vec::new();
                    if pipeline.project_keeps_group_key(i) {
                        fields.push(format!("\"{k}\": doc.`{k}`", k = GROUP_KEY_FIELD));
                    }
                    for (name, expr) in projected {
                        let b = self.bind(Value::String(name.clone()));
                        let e = self.expression(expr);
                        fields.push(format!("[{}]: {}", b, e));
                    }
                    format!("(FOR doc IN {} RETURN {{ {} }})", input, fields.join(", "))
                }
            };
            aql.push_str(&format!("LET s{} = {}\n", i + 1, body));
        }
        aql.push_str(&format!("FOR doc IN s{} RETURN doc", pipeline.stages.len()));
        aql
    }

    fn explain(&mut self, target: &ExplainTarget) -> String {
        match target {
            ExplainTarget::Find(spec) => self.find(spec),
            ExplainTarget::Aggregate(pipeline) => self.aggregate(pipeline),
        }
    }
}

/// A real ArangoDB backend for `DocumentStore`.
pub struct ArangoDbConnection {
    db: Arc<RwLock<Database<ReqwestClient>>>,
    config: ArangoConnectionConfig,
    http: reqwest::Client,
}

impl fmt::Debug for ArangoDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArangoDbConnection")
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl ArangoDbConnection {
    fn is_auth_error(err: &StoreError) -> bool {
        match err {
            StoreError::Store(msg) => {
                let lower = msg.to_ascii_lowercase();
                lower.contains("not authorized")
                    || lower.contains("unauthorized")
                    || lower.contains("status code 401")
                    || lower.contains("error code 401")
            }
            _ => false,
        }
    }

    async fn open(config: &ArangoConnectionConfig) -> Result<Connection, StoreError> {
        let conn = match config.auth_mode {
            ArangoAuthMode::Jwt => {
                Connection::establish_jwt(&config.endpoint, &config.username, &config.password).await
            }
            ArangoAuthMode::Basic => {
                Connection::establish_basic_auth(&config.endpoint, &config.username, &config.password)
                    .await
            }
        };
        conn.map_err(map_client_error)
    }

    async fn establish(config: &ArangoConnectionConfig) -> Result<Database<ReqwestClient>, StoreError> {
        let conn = Self::open(config).await?;
        conn.db(&config.database).await.map_err(map_client_error)
    }

    fn with_reauth<T, Fut, F>(&self, op: F) -> BoxFuture<'static, Result<T, StoreError>>
    where
        T: Send + 'static,
        Fut: std::future::Future<Output = Result<T, StoreError>> + Send + 'static,
        F: Fn(Database<ReqwestClient>) -> Fut + Send + Sync + 'static,
    {
        let config = self.config.clone();
        let db_lock = Arc::clone(&self.db);

        async move {
            let mut attempt = 0;
            loop {
                let db = db_lock
                    .read()
                    .map(|guard| guard.clone())
                    .map_err(|_| StoreError::store("failed to acquire read lock for db"))?;

                match op(db).await {
                    Ok(v) => return Ok(v),
                    Err(err)
                        if config.refresh == ArangoAuthRefresh::OnAuthError
                            && attempt == 0
                            && ArangoDbConnection::is_auth_error(&err) =>
                    {
                        warn!("[arango] auth rejected, re-establishing session");
                        let new_db = ArangoDbConnection::establish(&config).await?;
                        db_lock
                            .write()
                            .map(|mut guard| *guard = new_db)
                            .map_err(|_| StoreError::store("failed to acquire write lock for db refresh"))?;
                        attempt += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        .boxed()
    }

    /// External hook to proactively refresh credentials.
    pub async fn refresh_auth(&self) -> Result<(), StoreError> {
        let db = Self::establish(&self.config).await?;
        let mut guard = self
            .db
            .write()
            .map_err(|_| StoreError::store("failed to acquire write lock for db refresh"))?;
        *guard = db;
        Ok(())
    }

    /// Connect using a supplied configuration.
    pub async fn connect(config: ArangoConnectionConfig) -> Result<Self, StoreError> {
        let db = ArangoDbConnection::establish(&config).await?;
        info!("[arango] connected to database '{}'", config.database);
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
            http: reqwest::Client::new(),
        })
    }

    /// Ensure a database exists using the supplied configuration.
    pub async fn ensure_database(config: &ArangoConnectionConfig) -> Result<(), StoreError> {
        let conn = Self::open(config).await?;
        match conn.create_database(&config.database).await {
            Ok(_) => {
                info!("[arango] database '{}' created", config.database);
                Ok(())
            }
            Err(ref e) if is_duplicate_name(e) => Ok(()),
            Err(e) => Err(StoreError::Store(format!(
                "Failed to ensure database '{}': {}",
                config.database, e
            ))),
        }
    }

    async fn ensure_collection(db: &Database<ReqwestClient>, name: &str) -> Result<(), StoreError> {
        match db.create_collection(name).await {
            Ok(_) => {
                info!("[arango] collection '{}' created", name);
                Ok(())
            }
            Err(ref e) if is_duplicate_name(e) => Ok(()),
            Err(e) => Err(map_client_error(e)),
        }
    }

    async fn run_aql<T: DeserializeOwned>(
        db: &Database<ReqwestClient>,
        aql: &str,
        bind_vars: &HashMap<String, Value>,
    ) -> Result<Vec<T>, StoreError> {
        let query = AqlQuery::builder()
            .query(aql)
            .bind_vars(
                bind_vars
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.clone()))
                    .collect(),
            )
            .build();
        db.aql_query(query).await.map_err(map_client_error)
    }

    /// Run one AQL statement against `collection`, creating it first if needed.
    fn query<T>(&self, collection: &str, builder: AqlBuilder, aql: String) -> BoxFuture<'static, Result<Vec<T>, StoreError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        debug!("[arango] AQL: {}", aql);
        let collection = collection.to_string();
        let bind_vars = builder.bind_vars;
        self.with_reauth(move |db| {
            let collection = collection.clone();
            let aql = aql.clone();
            let bind_vars = bind_vars.clone();
            async move {
                ArangoDbConnection::ensure_collection(&db, &collection).await?;
                ArangoDbConnection::run_aql(&db, &aql, &bind_vars).await
            }
        })
    }

    /// Send a prepared REST request with a JSON body.
    fn post_json(
        request: reqwest::RequestBuilder,
        body: Value,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        let request = request.json(&body);
        async move {
            let response = request.send().await.map_err(map_http_error)?;
            let status = response.status();
            let payload: Value = response.json().await.map_err(map_http_error)?;
            if status.is_success() {
                Ok(payload)
            } else {
                Err(StoreError::Store(format!("HTTP {}: {}", status, payload)))
            }
        }
        .boxed()
    }
}

impl DocumentStore for ArangoDbConnection {
    fn create_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        let name = collection.to_string();
        self.with_reauth(move |db| {
            let name = name.clone();
            async move { ArangoDbConnection::ensure_collection(&db, &name).await }
        })
    }

    fn list_collections(&self) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        self.with_reauth(|db| async move {
            let infos = db.accessible_collections().await.map_err(map_client_error)?;
            let mut names: Vec<String> = infos
                .into_iter()
                .filter(|info| !info.is_system)
                .map(|info| info.name)
                .collect();
            names.sort();
            Ok(names)
        })
    }

    fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<String>, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        builder
            .bind_vars
            .insert(AQL_BIND_DOCS.into(), Value::Array(documents));
        let aql = format!(
            "FOR d IN @{docs} INSERT d INTO @@{col} RETURN NEW.{key}",
            docs = AQL_BIND_DOCS,
            col = AQL_BIND_COLLECTION,
            key = DOCUMENT_KEY_FIELD
        );
        self.query(collection, builder, aql)
    }

    fn find(
        &self,
        collection: &str,
        spec: &FindSpecification,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.find(spec);
        self.query(collection, builder, aql)
    }

    fn count(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<u64, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.count(filter);
        self.query::<u64>(collection, builder, aql)
            .map(|res| res.map(|counts| counts.first().copied().unwrap_or(0)))
            .boxed()
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
        update: &UpdateSpecification,
    ) -> BoxFuture<'static, Result<UpdateOutcome, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.update_one(filter, update);
        self.query::<bool>(collection, builder, aql)
            .map(|res| {
                res.map(|changed| UpdateOutcome {
                    matched: changed.len() as u64,
                    modified: changed.iter().filter(|c| **c).count() as u64,
                })
            })
            .boxed()
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &FilterExpression,
    ) -> BoxFuture<'static, Result<DeleteOutcome, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.delete_one(filter);
        self.query::<String>(collection, builder, aql)
            .map(|res| {
                res.map(|keys| DeleteOutcome {
                    deleted: keys.len() as u64,
                })
            })
            .boxed()
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> BoxFuture<'static, Result<Vec<Value>, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.aggregate(pipeline);
        self.query(collection, builder, aql)
    }

    fn create_index(
        &self,
        collection: &str,
        spec: &IndexSpecification,
    ) -> BoxFuture<'static, Result<IndexOutcome, StoreError>> {
        // persistent indexes serve both sort directions; the direction only
        // shows up in the index name
        let body = json!({
            "type": "persistent",
            "name": spec.index_name(),
            "fields": spec.field_names(),
            "unique": spec.unique,
        });
        let request = rest_request(&self.http, &self.config, "_api/index")
            .query(&[("collection", collection)]);
        let create = self.create_collection(collection);
        let post = Self::post_json(request, body);
        async move {
            create.await?;
            let payload = post.await?;
            let outcome = IndexOutcome {
                name: payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                newly_created: payload
                    .get("isNewlyCreated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            };
            if outcome.newly_created {
                info!("[arango] created index '{}'", outcome.name);
            }
            Ok(outcome)
        }
        .boxed()
    }

    fn explain(
        &self,
        collection: &str,
        target: &ExplainTarget,
    ) -> BoxFuture<'static, Result<Value, StoreError>> {
        let mut builder = AqlBuilder::for_collection(collection);
        let aql = builder.explain(target);
        debug!("[arango] explain AQL: {}", aql);
        Self::post_json(
            rest_request(&self.http, &self.config, "_api/explain"),
            json!({ "query": aql, "bindVars": builder.bind_vars }),
        )
    }

    fn clear_collection(&self, collection: &str) -> BoxFuture<'static, Result<(), StoreError>> {
        let name = collection.to_string();
        self.with_reauth(move |db| {
            let name = name.clone();
            async move {
                ArangoDbConnection::ensure_collection(&db, &name).await?;
                let col = db.collection(&name).await.map_err(map_client_error)?;
                col.truncate().await.map(|_| ()).map_err(map_client_error)
            }
        })
    }
}
