//! Schema builder: abstract table definitions → dialect DDL.
//!
//! Foreign keys and label metadata are collected while tables are created or altered and applied only
//! once every table of a batch exists, so definitions may reference each other in any order.

mod column;

pub use column::{build_column_type, column_definition};

use crate::config::{field_abstract_type, is_reserved_table, validate_table_schema, AbstractType, TableSchema};
use crate::dialect::SqlDialect;
use crate::error::AppError;
use crate::introspect::Introspector;
use crate::response::RecordOutcome;
use crate::store;
use serde::Serialize;
use serde_json::json;
use sqlx::{AnyConnection, AnyPool};
use std::collections::HashMap;

/// Deferred foreign key emitted for a `reference` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRequest {
    pub constraint_name: String,
    pub owner_table: String,
    pub owner_column: String,
    pub ref_table: String,
    pub ref_fields: String,
}

/// Display metadata for a table (`field == None`) or one of its fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LabelEntry {
    pub table: String,
    pub field: Option<String>,
    pub label: Option<String>,
    pub plural: Option<String>,
    pub picklist: Vec<String>,
    pub multi: bool,
}

/// Work left over after a table's DDL ran.
#[derive(Clone, Debug, Default)]
pub struct TablePlan {
    pub foreign_keys: Vec<ForeignKeyRequest>,
    pub labels: Vec<LabelEntry>,
}

impl TablePlan {
    fn extend(&mut self, other: TablePlan) {
        self.foreign_keys.extend(other.foreign_keys);
        self.labels.extend(other.labels);
    }
}

fn table_label(def: &TableSchema) -> Option<LabelEntry> {
    if def.label.is_none() && def.plural.is_none() {
        return None;
    }
    Some(LabelEntry {
        table: def.name.clone(),
        field: None,
        label: def.label.clone(),
        plural: def.plural.clone(),
        picklist: Vec::new(),
        multi: false,
    })
}

fn collect_field_plan(def: &TableSchema, only: &[usize]) -> Result<TablePlan, AppError> {
    let mut plan = TablePlan::default();
    plan.labels.extend(table_label(def));
    for &i in only {
        let f = &def.field[i];
        let kind = if f.db_type.is_some() { None } else { field_abstract_type(f)? };
        if kind == Some(AbstractType::Reference) {
            if let Some(target) = f.ref_table.as_deref() {
                plan.foreign_keys.push(ForeignKeyRequest {
                    constraint_name: format!("fk_{}_{}", def.name, f.name),
                    owner_table: def.name.clone(),
                    owner_column: f.name.clone(),
                    ref_table: target.to_string(),
                    ref_fields: f.ref_fields.clone().unwrap_or_else(|| "id".into()),
                });
            }
        }
        let is_picklist = matches!(kind, Some(AbstractType::Picklist | AbstractType::MultiPicklist));
        if f.label.is_some() || is_picklist || !f.value.is_empty() {
            plan.labels.push(LabelEntry {
                table: def.name.clone(),
                field: Some(f.name.clone()),
                label: f.label.clone(),
                plural: None,
                picklist: f.value.clone(),
                multi: kind == Some(AbstractType::MultiPicklist),
            });
        }
    }
    Ok(plan)
}

/// CREATE TABLE statement and the deferred work for `def`. Pure; nothing is executed.
pub fn create_table_sql(d: &dyn SqlDialect, def: &TableSchema) -> Result<(String, TablePlan), AppError> {
    let mut timestamp_used = false;
    let mut cols = Vec::with_capacity(def.field.len());
    for f in &def.field {
        cols.push(column_definition(d, f, &mut timestamp_used)?);
    }
    let sql = format!("CREATE TABLE {} (\n  {}\n)", d.quote_ident(&def.name), cols.join(",\n  "));
    let all: Vec<usize> = (0..def.field.len()).collect();
    Ok((sql, collect_field_plan(def, &all)?))
}

async fn execute_ddl(conn: &mut AnyConnection, sql: &str) -> Result<(), AppError> {
    tracing::debug!(sql = %sql, "ddl");
    sqlx::query(sql).execute(&mut *conn).await?;
    Ok(())
}

/// Create a new table. `Conflict` if it already exists.
pub async fn create_table(conn: &mut AnyConnection, intro: &Introspector, def: &TableSchema) -> Result<TablePlan, AppError> {
    validate_table_schema(def, true, false)?;
    if let Some(existing) = intro.table_exists(conn, &def.name).await? {
        return Err(AppError::Conflict(format!("table '{}' already exists", existing)));
    }
    let (sql, plan) = create_table_sql(intro.rules(), def)?;
    execute_ddl(conn, &sql).await?;
    intro.invalidate(&def.name);
    tracing::info!(table = %def.name, "table created");
    Ok(plan)
}

/// Add the definition's new columns to an existing table. Existing columns are never altered.
pub async fn update_table(conn: &mut AnyConnection, intro: &Introspector, def: &TableSchema) -> Result<TablePlan, AppError> {
    validate_table_schema(def, false, false)?;
    let real = intro
        .table_exists(conn, &def.name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("table '{}' does not exist", def.name)))?;
    let current = intro.describe_uncached(conn, &real).await?;
    let d = intro.rules();
    let mut timestamp_used = false;
    let mut added = Vec::new();
    for (i, f) in def.field.iter().enumerate() {
        if current.has_field(&f.name) {
            tracing::debug!(table = %real, column = %f.name, "column exists; type changes are not applied");
            continue;
        }
        let col = column_definition(d, f, &mut timestamp_used)?;
        execute_ddl(conn, &d.add_column(&d.quote_ident(&real), &col)).await?;
        added.push(i);
    }
    intro.invalidate(&real);
    tracing::info!(table = %real, added = added.len(), "table altered");

    let mut renamed = def.clone();
    renamed.name = real;
    // Label edits on existing columns are metadata only and still apply.
    let touched: Vec<usize> = (0..def.field.len())
        .filter(|i| added.contains(i) || def.field[*i].label.is_some() || !def.field[*i].value.is_empty())
        .collect();
    let mut plan = collect_field_plan(&renamed, &touched)?;
    plan.foreign_keys.retain(|fk| {
        added
            .iter()
            .any(|&i| def.field[i].name.eq_ignore_ascii_case(&fk.owner_column))
    });
    Ok(plan)
}

/// Apply one deferred foreign key: `ALTER TABLE ... ADD CONSTRAINT` where supported, always recorded.
pub async fn apply_foreign_key(conn: &mut AnyConnection, intro: &Introspector, fk: &ForeignKeyRequest) -> Result<(), AppError> {
    let d = intro.rules();
    if intro.table_exists(conn, &fk.ref_table).await?.is_none() {
        return Err(AppError::Validation(format!(
            "field '{}' references unknown table '{}'",
            fk.owner_column, fk.ref_table
        )));
    }
    if d.supports_foreign_key_alter() {
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            d.quote_ident(&fk.owner_table),
            d.quote_ident(&fk.constraint_name),
            d.quote_ident(&fk.owner_column),
            d.quote_ident(&fk.ref_table),
            fk.ref_fields
                .split(',')
                .map(|c| d.quote_ident(c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        execute_ddl(conn, &sql).await?;
    }
    store::insert_relation(conn, d, fk).await?;
    intro.invalidate(&fk.owner_table);
    intro.invalidate(&fk.ref_table);
    Ok(())
}

pub async fn apply_labels(conn: &mut AnyConnection, intro: &Introspector, labels: &[LabelEntry]) -> Result<(), AppError> {
    for l in labels {
        store::upsert_label(conn, intro.rules(), l).await?;
        intro.invalidate(&l.table);
    }
    Ok(())
}

async fn create_or_merge(
    conn: &mut AnyConnection,
    intro: &Introspector,
    def: &TableSchema,
    allow_merge: bool,
) -> Result<TablePlan, AppError> {
    if allow_merge && intro.table_exists(conn, &def.name).await?.is_some() {
        update_table(conn, intro, def).await
    } else {
        create_table(conn, intro, def).await
    }
}

/// Create (or, with `allow_merge`, extend) several tables, then apply their foreign keys and labels.
///
/// With `rollback` the whole batch runs in one transaction and the first failure is returned as the error.
/// Without it each position reports `{name}` or its own error; a failing foreign key is reported at its
/// owner table's position.
pub async fn create_tables(
    pool: &AnyPool,
    intro: &Introspector,
    defs: &[TableSchema],
    allow_merge: bool,
    rollback: bool,
) -> Result<Vec<RecordOutcome>, AppError> {
    if rollback {
        let mut tx = pool.begin().await?;
        let result = async {
            let mut plan = TablePlan::default();
            for def in defs {
                plan.extend(create_or_merge(&mut *tx, intro, def, allow_merge).await?);
            }
            for fk in &plan.foreign_keys {
                apply_foreign_key(&mut *tx, intro, fk).await?;
            }
            apply_labels(&mut *tx, intro, &plan.labels).await?;
            Ok::<_, AppError>(())
        }
        .await;
        return match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(defs.iter().map(|d| RecordOutcome::Ok(json!({ "name": d.name }))).collect())
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = %rb, "rollback failed");
                }
                intro.invalidate_all();
                tracing::warn!(error = %e, "table batch rolled back");
                Err(e)
            }
        };
    }

    let mut conn = pool.acquire().await?;
    let mut outcomes = Vec::with_capacity(defs.len());
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut plan = TablePlan::default();
    for (i, def) in defs.iter().enumerate() {
        position.insert(def.name.to_lowercase(), i);
        match create_or_merge(&mut *conn, intro, def, allow_merge).await {
            Ok(p) => {
                plan.extend(p);
                outcomes.push(RecordOutcome::Ok(json!({ "name": def.name })));
            }
            Err(e) => outcomes.push(RecordOutcome::Err(e.to_body())),
        }
    }
    for fk in &plan.foreign_keys {
        if let Err(e) = apply_foreign_key(&mut *conn, intro, fk).await {
            tracing::warn!(constraint = %fk.constraint_name, error = %e, "foreign key not applied");
            if let Some(&i) = position.get(&fk.owner_table.to_lowercase()) {
                outcomes[i] = RecordOutcome::Err(e.to_body());
            }
        }
    }
    for l in &plan.labels {
        if let Err(e) = apply_labels(&mut *conn, intro, std::slice::from_ref(l)).await {
            tracing::warn!(table = %l.table, error = %e, "label not stored");
        }
    }
    Ok(outcomes)
}

/// Drop a table and its bookkeeping rows, including recorded references from child tables.
///
/// Engines holding real foreign-key constraints refuse the DROP while children reference the table.
pub async fn drop_table(conn: &mut AnyConnection, intro: &Introspector, name: &str) -> Result<(), AppError> {
    if is_reserved_table(name) {
        return Err(AppError::Validation(format!("table '{}' is reserved", name)));
    }
    let real = intro
        .table_exists(conn, name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("table '{}' does not exist", name)))?;
    let d = intro.rules();
    let parents = store::relations_from(conn, d, &real).await?;
    let children = store::relations_to(conn, d, &real).await?;
    execute_ddl(conn, &format!("DROP TABLE {}", d.quote_ident(&real))).await?;
    store::delete_labels(conn, d, &real).await?;
    store::delete_relations_of(conn, d, &real).await?;
    intro.invalidate(&real);
    for rel in &parents {
        intro.invalidate(&rel.ref_table);
    }
    for rel in &children {
        tracing::warn!(table = %rel.owner_table, column = %rel.owner_column, "reference to dropped table forgotten");
        intro.invalidate(&rel.owner_table);
    }
    tracing::info!(table = %real, "table dropped");
    Ok(())
}
