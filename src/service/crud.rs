//! Generic CRUD execution against any table, driven by introspected descriptors.

use super::codec::{coerce, parse_record};
use super::context::{Action, CallerContext};
use crate::config::{AbstractType, FieldDescriptor, TableDescriptor};
use crate::error::AppError;
use crate::response::{not_found_marker, RecordMeta, RecordOutcome, RecordSet};
use crate::sql::{
    bind_all, count_where, delete_by_id, insert, parse_order, select_by_ids, select_ids_where, select_where,
    update_by_id, BindValue, Filter, OrderBy, QueryBuf,
};
use crate::state::EngineState;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use sqlx::any::{AnyQueryResult, AnyRow};
use sqlx::{AnyConnection, Column, Row};
use std::collections::HashMap;

/// Which records an operation addresses.
#[derive(Clone, Debug)]
pub enum Target {
    /// Full records; for update/delete each carries its primary key.
    Records(Vec<Map<String, Value>>),
    Ids(Vec<Value>),
    Filter(String),
}

impl Target {
    /// `"1,2,3"` → `Ids`.
    pub fn ids_from_str(s: &str) -> Target {
        Target::Ids(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| Value::String(p.to_string()))
                .collect(),
        )
    }
}

/// Accepts `"a,b"` or `["a", "b"]`.
fn field_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::One(s)) => s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect(),
        Some(Raw::Many(v)) => v,
    })
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WriteOptions {
    #[serde(default)]
    pub rollback: bool,
    /// When non-empty, affected rows are read back with these fields (primary key always included).
    #[serde(default, deserialize_with = "field_list")]
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RetrieveOptions {
    #[serde(default, deserialize_with = "field_list")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub include_count: bool,
    #[serde(default)]
    pub include_schema: bool,
}

enum WriteAction {
    Create,
    Update(Option<Map<String, Value>>),
    Delete,
}

enum WriteOp {
    Create(Map<String, Value>),
    Update(Value, Map<String, Value>),
    Delete(Value),
}

pub struct CrudService;

impl CrudService {
    /// Insert each record. Returns `{pk: id}` per record, or the re-read row when `fields` is set.
    pub async fn create(
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        records: Vec<Map<String, Value>>,
        opts: &WriteOptions,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        state.authorizer.check(ctx, table, Action::Create).await?;
        Self::run_writes(state, ctx, table, WriteAction::Create, Target::Records(records), opts).await
    }

    /// Update addressed records; `payload` is applied to every id of an `Ids`/`Filter` target.
    pub async fn update(
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        target: Target,
        payload: Option<Map<String, Value>>,
        opts: &WriteOptions,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        state.authorizer.check(ctx, table, Action::Update).await?;
        Self::run_writes(state, ctx, table, WriteAction::Update(payload), target, opts).await
    }

    pub async fn delete(
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        target: Target,
        opts: &WriteOptions,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        state.authorizer.check(ctx, table, Action::Delete).await?;
        Self::run_writes(state, ctx, table, WriteAction::Delete, target, opts).await
    }

    /// Read by id list (order preserved, not-found markers for misses) or by filter/none with paging.
    pub async fn retrieve(
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        target: Option<Target>,
        opts: &RetrieveOptions,
    ) -> Result<RecordSet, AppError> {
        state.authorizer.check(ctx, table, Action::Retrieve).await?;
        let d = state.rules();
        let mut conn = state.pool.acquire().await?;
        let desc = state.introspector.describe_table(&mut conn, table).await?;
        let projection = projection(&desc, &opts.fields)?;

        let (data, count) = match target {
            Some(Target::Ids(ids)) => {
                let data = Self::read_ids(&mut conn, state, &desc, &projection, &ids).await?;
                let found = data.iter().filter(|o| o.is_ok()).count() as u64;
                (data, found)
            }
            Some(Target::Records(records)) => {
                let ids = records
                    .iter()
                    .map(|r| record_id(&desc, r))
                    .collect::<Result<Vec<_>, _>>()?;
                let data = Self::read_ids(&mut conn, state, &desc, &projection, &ids).await?;
                let found = data.iter().filter(|o| o.is_ok()).count() as u64;
                (data, found)
            }
            other => {
                let filter = match other {
                    Some(Target::Filter(expr)) if !expr.trim().is_empty() => Some(Filter::parse(&expr)?),
                    _ => None,
                };
                let order = resolve_order(&desc, opts.order.as_deref())?;
                let settings = &state.settings;
                let limit = opts.limit.unwrap_or(settings.default_limit).min(settings.max_limit);
                let q = select_where(d, &desc, &projection, filter.as_ref(), &order, Some(limit), opts.offset)?;
                let rows = fetch_rows(&mut conn, &q).await?;
                let data: Vec<RecordOutcome> = rows.iter().map(|r| RecordOutcome::Ok(row_to_json(r, &desc))).collect();
                let count = if opts.include_count {
                    let q = count_where(d, &desc, filter.as_ref())?;
                    let row = fetch_rows(&mut conn, &q).await?;
                    row.first().and_then(|r| r.try_get::<i64, _>(0).ok()).unwrap_or(0) as u64
                } else {
                    data.len() as u64
                };
                (data, count)
            }
        };

        let meta = (opts.include_count || opts.include_schema).then(|| RecordMeta {
            count: opts.include_count.then_some(count),
            schema: opts.include_schema.then(|| desc.clone()),
        });
        Ok(RecordSet { data, meta })
    }

    async fn run_writes(
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        action: WriteAction,
        target: Target,
        opts: &WriteOptions,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        if opts.rollback {
            let mut tx = state.pool.begin().await?;
            match Self::run_on(&mut tx, state, ctx, table, action, target, opts).await {
                Ok(out) => {
                    tx.commit().await?;
                    Ok(out)
                }
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        tracing::warn!(table = %table, error = %rb, "rollback failed");
                    }
                    tracing::debug!(table = %table, error = %e, "batch rolled back");
                    Err(e)
                }
            }
        } else {
            let mut conn = state.pool.acquire().await?;
            Self::run_on(&mut conn, state, ctx, table, action, target, opts).await
        }
    }

    /// Execute every op on `conn`. With `opts.rollback` the first failure is returned as the error.
    async fn run_on(
        conn: &mut AnyConnection,
        state: &EngineState,
        ctx: &CallerContext,
        table: &str,
        action: WriteAction,
        target: Target,
        opts: &WriteOptions,
    ) -> Result<Vec<RecordOutcome>, AppError> {
        let desc = state.introspector.describe_table(conn, table).await?;
        let ops = Self::plan_ops(conn, state, &desc, action, target).await?;
        if ops.len() > state.settings.max_batch {
            return Err(AppError::Validation(format!(
                "batch of {} records exceeds the limit of {}",
                ops.len(),
                state.settings.max_batch
            )));
        }
        let projection = if opts.fields.is_empty() {
            Vec::new()
        } else {
            projection(&desc, &opts.fields)?
        };
        let mut out = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                Ok(op) => Self::write_one(conn, state, ctx, &desc, op, &projection).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(v) => out.push(RecordOutcome::Ok(v)),
                Err(e) if opts.rollback => return Err(e),
                Err(e) => out.push(RecordOutcome::Err(e.to_body())),
            }
        }
        Ok(out)
    }

    async fn plan_ops(
        conn: &mut AnyConnection,
        state: &EngineState,
        desc: &TableDescriptor,
        action: WriteAction,
        target: Target,
    ) -> Result<Vec<Result<WriteOp, AppError>>, AppError> {
        let ids = match target {
            Target::Records(records) => {
                return Ok(records
                    .into_iter()
                    .map(|rec| -> Result<WriteOp, AppError> {
                        match &action {
                        WriteAction::Create => Ok(WriteOp::Create(rec)),
                        WriteAction::Update(_) => {
                            let id = record_id(desc, &rec)?;
                            Ok(WriteOp::Update(id, strip_primary_key(desc, rec)))
                        }
                        WriteAction::Delete => Ok(WriteOp::Delete(record_id(desc, &rec)?)),
                        }
                    })
                    .collect());
            }
            Target::Ids(ids) => ids,
            Target::Filter(expr) => {
                let filter = Filter::parse(&expr)?;
                let q = select_ids_where(state.rules(), desc, &filter)?;
                fetch_rows(conn, &q).await?.iter().map(|r| cell_to_value(r, 0)).collect()
            }
        };
        match action {
            WriteAction::Create => Err(AppError::Validation("create requires records".into())),
            WriteAction::Update(payload) => {
                let payload = payload.ok_or_else(|| AppError::Validation("update by id requires a payload".into()))?;
                let payload = strip_primary_key(desc, payload);
                Ok(ids.into_iter().map(|id| Ok(WriteOp::Update(id, payload.clone()))).collect())
            }
            WriteAction::Delete => Ok(ids.into_iter().map(|id| Ok(WriteOp::Delete(id))).collect()),
        }
    }

    async fn write_one(
        conn: &mut AnyConnection,
        state: &EngineState,
        ctx: &CallerContext,
        desc: &TableDescriptor,
        op: WriteOp,
        projection: &[&FieldDescriptor],
    ) -> Result<Value, AppError> {
        let d = state.rules();
        let audit = &state.settings.audit;
        match op {
            WriteOp::Create(rec) => {
                let parsed = parse_record(&rec, desc, false, ctx, d, audit)?;
                let q = insert(d, desc, &parsed);
                let Ok(pk) = desc.primary_key_field() else {
                    execute(conn, &q).await?;
                    return Ok(Value::Object(Map::new()));
                };
                let generated = if d.uses_returning() {
                    fetch_rows(conn, &q).await?.first().map(|r| cell_to_value(r, 0))
                } else {
                    execute(conn, &q).await?.last_insert_id().map(Value::from)
                };
                let id = match generated.filter(|v| !v.is_null()) {
                    Some(id) => id,
                    None if pk.auto_increment => {
                        return Err(AppError::Driver(sqlx::Error::Protocol(format!(
                            "insert into '{}' reported no generated '{}'",
                            desc.name, pk.name
                        ))))
                    }
                    None => record_id(desc, &rec)?,
                };
                Self::result_row(conn, state, desc, projection, &id).await
            }
            WriteOp::Update(id, payload) => {
                let pk = desc.primary_key_field()?;
                let key = coerce(pk, &id)?;
                let parsed = parse_record(&payload, desc, true, ctx, d, audit)?;
                if parsed.is_empty() {
                    // nothing to write; the record only has to exist
                    Self::read_one(conn, state, desc, &[pk], &key)
                        .await?
                        .ok_or_else(|| not_found(desc, &id))?;
                    return Self::result_row(conn, state, desc, projection, &id).await;
                }
                let q = update_by_id(d, desc, &parsed, &key)?;
                if execute(conn, &q).await?.rows_affected() == 0 {
                    return Err(not_found(desc, &id));
                }
                Self::result_row(conn, state, desc, projection, &id).await
            }
            WriteOp::Delete(id) => {
                let pk = desc.primary_key_field()?;
                let key = coerce(pk, &id)?;
                let before = if projection.is_empty() {
                    json!({ pk.name.clone(): id })
                } else {
                    Self::read_one(conn, state, desc, projection, &key).await?.ok_or_else(|| not_found(desc, &id))?
                };
                let q = delete_by_id(d, desc, &key)?;
                if execute(conn, &q).await?.rows_affected() == 0 {
                    return Err(not_found(desc, &id));
                }
                Ok(before)
            }
        }
    }

    /// `{pk: id}`, or the row re-read with `projection`.
    async fn result_row(
        conn: &mut AnyConnection,
        state: &EngineState,
        desc: &TableDescriptor,
        projection: &[&FieldDescriptor],
        id: &Value,
    ) -> Result<Value, AppError> {
        let pk = desc.primary_key_field()?;
        if projection.is_empty() {
            return Ok(json!({ pk.name.clone(): id }));
        }
        let key = coerce(pk, id)?;
        Self::read_one(conn, state, desc, projection, &key)
            .await?
            .ok_or_else(|| not_found(desc, id))
    }

    async fn read_one(
        conn: &mut AnyConnection,
        state: &EngineState,
        desc: &TableDescriptor,
        projection: &[&FieldDescriptor],
        key: &BindValue,
    ) -> Result<Option<Value>, AppError> {
        let q = select_by_ids(state.rules(), desc, projection, std::slice::from_ref(key))?;
        Ok(fetch_rows(conn, &q).await?.first().map(|r| row_to_json(r, desc)))
    }

    async fn read_ids(
        conn: &mut AnyConnection,
        state: &EngineState,
        desc: &TableDescriptor,
        projection: &[&FieldDescriptor],
        ids: &[Value],
    ) -> Result<Vec<RecordOutcome>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > state.settings.max_batch {
            return Err(AppError::Validation(format!(
                "{} ids exceed the limit of {}",
                ids.len(),
                state.settings.max_batch
            )));
        }
        let pk = desc.primary_key_field()?;
        // an id that cannot be a key value matches nothing
        let keys: Vec<Option<BindValue>> = ids.iter().map(|id| coerce(pk, id).ok()).collect();
        let valid: Vec<BindValue> = keys.iter().flatten().cloned().collect();
        let mut by_key: HashMap<String, Value> = HashMap::new();
        if !valid.is_empty() {
            let q = select_by_ids(state.rules(), desc, projection, &valid)?;
            for row in fetch_rows(conn, &q).await? {
                let v = row_to_json(&row, desc);
                if let Some(k) = v.get(&pk.name) {
                    by_key.insert(value_key(k), v.clone());
                }
            }
        }
        Ok(ids
            .iter()
            .zip(&keys)
            .map(|(id, key)| match key.as_ref().and_then(|k| by_key.get(&bind_key(k))) {
                Some(row) => RecordOutcome::Ok(row.clone()),
                None => not_found_marker(&desc.name, id),
            })
            .collect())
    }
}

fn not_found(desc: &TableDescriptor, id: &Value) -> AppError {
    AppError::NotFound(format!("record {} not found in table '{}'", id, desc.name))
}

/// Requested fields resolved against the descriptor (all fields when empty or `*`); the primary key is always included.
fn projection<'a>(desc: &'a TableDescriptor, fields: &[String]) -> Result<Vec<&'a FieldDescriptor>, AppError> {
    if fields.is_empty() || fields.iter().any(|f| f.trim() == "*") {
        return Ok(desc.field.iter().collect());
    }
    let mut out: Vec<&FieldDescriptor> = Vec::with_capacity(fields.len() + 1);
    if let Some(pk) = desc.primary_key.as_deref().and_then(|pk| desc.field(pk)) {
        out.push(pk);
    }
    for name in fields {
        let f = desc.resolve_field(name)?;
        if !out.iter().any(|o| o.name == f.name) {
            out.push(f);
        }
    }
    Ok(out)
}

fn resolve_order<'a>(desc: &'a TableDescriptor, order: Option<&str>) -> Result<OrderBy<'a>, AppError> {
    let Some(spec) = order else {
        return Ok(Vec::new());
    };
    parse_order(spec)?
        .into_iter()
        .map(|(name, descending)| -> Result<_, AppError> { Ok((desc.resolve_field(&name)?, descending)) })
        .collect()
}

fn record_id(desc: &TableDescriptor, rec: &Map<String, Value>) -> Result<Value, AppError> {
    let pk = desc.primary_key_field()?;
    rec.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(&pk.name))
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::Validation(format!("record has no '{}' value", pk.name)))
}

fn strip_primary_key(desc: &TableDescriptor, mut rec: Map<String, Value>) -> Map<String, Value> {
    if let Some(pk) = desc.primary_key.as_deref() {
        rec.retain(|k, _| !k.eq_ignore_ascii_case(pk));
    }
    rec
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bind_key(b: &BindValue) -> String {
    match b {
        BindValue::I64(n) => n.to_string(),
        BindValue::F64(n) => n.to_string(),
        BindValue::Text(s) => s.clone(),
        BindValue::Bool(b) => b.to_string(),
        BindValue::Null => "null".into(),
        BindValue::Bytes(b) => hex(b),
    }
}

async fn fetch_rows(conn: &mut AnyConnection, q: &QueryBuf) -> Result<Vec<AnyRow>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    Ok(bind_all(sqlx::query(&q.sql), &q.params).fetch_all(&mut *conn).await?)
}

async fn execute(conn: &mut AnyConnection, q: &QueryBuf) -> Result<AnyQueryResult, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    Ok(bind_all(sqlx::query(&q.sql), &q.params).execute(&mut *conn).await?)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn row_to_json(row: &AnyRow, desc: &TableDescriptor) -> Value {
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let name = col.name();
        let mut v = cell_to_value(row, i);
        if let Some(f) = desc.field(name) {
            if f.abstract_type == AbstractType::Boolean {
                v = match v {
                    Value::Number(n) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
                    Value::String(s) => Value::Bool(matches!(s.as_str(), "t" | "true" | "1")),
                    other => other,
                };
            }
        }
        map.insert(name.to_string(), v);
    }
    Value::Object(map)
}

fn cell_to_value(row: &AnyRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|b| Value::String(hex(&b))).unwrap_or(Value::Null);
    }
    Value::Null
}
