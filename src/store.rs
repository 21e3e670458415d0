//! `_sys_*` bookkeeping tables: display labels/picklists and recorded foreign-key relations.
//! Both are created through the schema builder at engine start and read by the introspector.

use crate::config::{FieldSchema, TableSchema};
use crate::dialect::SqlDialect;
use crate::error::AppError;
use crate::introspect::catalog;
use crate::migration::{create_table_sql, ForeignKeyRequest, LabelEntry};
use sqlx::{AnyConnection, Row};

pub const LABELS_TABLE: &str = "_sys_labels";
pub const RELATIONS_TABLE: &str = "_sys_relations";

fn sys_table_schemas() -> Vec<TableSchema> {
    let text = |name: &str| FieldSchema::new(name, "text");
    let name = |name: &str| FieldSchema::new(name, "string").sized(64);
    vec![
        TableSchema {
            name: LABELS_TABLE.into(),
            label: None,
            plural: None,
            field: vec![
                FieldSchema::new("id", "id"),
                name("table_name").not_null(),
                name("field_name").not_null(),
                FieldSchema::new("label", "string"),
                FieldSchema::new("plural", "string"),
                text("picklist"),
                FieldSchema::new("multi", "integer"),
            ],
        },
        TableSchema {
            name: RELATIONS_TABLE.into(),
            label: None,
            plural: None,
            field: vec![
                FieldSchema::new("id", "id"),
                FieldSchema::new("constraint_name", "string").sized(128).not_null(),
                name("owner_table").not_null(),
                name("owner_column").not_null(),
                name("ref_table").not_null(),
                name("ref_fields").not_null(),
            ],
        },
    ]
}

/// Create the bookkeeping tables that are missing.
pub async fn ensure_sys_tables(conn: &mut AnyConnection, d: &dyn SqlDialect) -> Result<(), AppError> {
    for def in sys_table_schemas() {
        if catalog::find_table(conn, d, &def.name).await?.is_some() {
            continue;
        }
        let (sql, _) = create_table_sql(d, &def)?;
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(&mut *conn).await?;
        tracing::info!(table = %def.name, "bookkeeping table created");
    }
    Ok(())
}

/// Replace the label row for `(table, field)`; table-level labels use an empty field name.
pub async fn upsert_label(conn: &mut AnyConnection, d: &dyn SqlDialect, entry: &LabelEntry) -> Result<(), AppError> {
    let t = d.quote_ident(LABELS_TABLE);
    let field = entry.field.clone().unwrap_or_default();
    let del = format!(
        "DELETE FROM {} WHERE LOWER(table_name) = LOWER({}) AND LOWER(field_name) = LOWER({})",
        t,
        d.placeholder(1),
        d.placeholder(2)
    );
    sqlx::query(&del)
        .bind(entry.table.clone())
        .bind(field.clone())
        .execute(&mut *conn)
        .await?;
    let picklist = if entry.picklist.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.picklist).map_err(|e| AppError::Validation(e.to_string()))?)
    };
    let ins = format!(
        "INSERT INTO {} (table_name, field_name, label, plural, picklist, multi) VALUES ({}, {}, {}, {}, {}, {})",
        t,
        d.placeholder(1),
        d.placeholder(2),
        d.placeholder(3),
        d.placeholder(4),
        d.placeholder(5),
        d.placeholder(6)
    );
    tracing::debug!(sql = %ins, table = %entry.table, field = %field, "label");
    sqlx::query(&ins)
        .bind(entry.table.clone())
        .bind(field)
        .bind(entry.label.clone())
        .bind(entry.plural.clone())
        .bind(picklist)
        .bind(i64::from(entry.multi))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn read_labels(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<Vec<LabelEntry>, AppError> {
    let sql = format!(
        "SELECT table_name, field_name, label, plural, picklist, multi FROM {} WHERE LOWER(table_name) = LOWER({})",
        d.quote_ident(LABELS_TABLE),
        d.placeholder(1)
    );
    let rows = sqlx::query(&sql).bind(table.to_string()).fetch_all(&mut *conn).await?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let field: String = r.try_get::<Option<String>, _>(1)?.unwrap_or_default();
        let picklist = match r.try_get::<Option<String>, _>(4)? {
            Some(raw) if !raw.is_empty() => serde_json::from_str(&raw).unwrap_or_default(),
            _ => Vec::new(),
        };
        out.push(LabelEntry {
            table: r.try_get(0)?,
            field: if field.is_empty() { None } else { Some(field) },
            label: r.try_get(2)?,
            plural: r.try_get(3)?,
            picklist,
            multi: r.try_get::<Option<i64>, _>(5)?.unwrap_or(0) != 0,
        });
    }
    Ok(out)
}

pub async fn delete_labels(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<(), AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE LOWER(table_name) = LOWER({})",
        d.quote_ident(LABELS_TABLE),
        d.placeholder(1)
    );
    sqlx::query(&sql).bind(table.to_string()).execute(&mut *conn).await?;
    Ok(())
}

/// Record a relation, replacing any earlier row with the same constraint name.
pub async fn insert_relation(conn: &mut AnyConnection, d: &dyn SqlDialect, fk: &ForeignKeyRequest) -> Result<(), AppError> {
    let t = d.quote_ident(RELATIONS_TABLE);
    let del = format!("DELETE FROM {} WHERE constraint_name = {}", t, d.placeholder(1));
    sqlx::query(&del).bind(fk.constraint_name.clone()).execute(&mut *conn).await?;
    let ins = format!(
        "INSERT INTO {} (constraint_name, owner_table, owner_column, ref_table, ref_fields) VALUES ({}, {}, {}, {}, {})",
        t,
        d.placeholder(1),
        d.placeholder(2),
        d.placeholder(3),
        d.placeholder(4),
        d.placeholder(5)
    );
    tracing::debug!(sql = %ins, constraint = %fk.constraint_name, "relation");
    sqlx::query(&ins)
        .bind(fk.constraint_name.clone())
        .bind(fk.owner_table.clone())
        .bind(fk.owner_column.clone())
        .bind(fk.ref_table.clone())
        .bind(fk.ref_fields.clone())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn relations_where(
    conn: &mut AnyConnection,
    d: &dyn SqlDialect,
    column: &str,
    table: &str,
) -> Result<Vec<ForeignKeyRequest>, AppError> {
    let sql = format!(
        "SELECT constraint_name, owner_table, owner_column, ref_table, ref_fields FROM {} \
         WHERE LOWER({}) = LOWER({}) ORDER BY owner_table, owner_column",
        d.quote_ident(RELATIONS_TABLE),
        column,
        d.placeholder(1)
    );
    let rows = sqlx::query(&sql).bind(table.to_string()).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|r| -> Result<ForeignKeyRequest, AppError> {
            Ok(ForeignKeyRequest {
                constraint_name: r.try_get(0)?,
                owner_table: r.try_get(1)?,
                owner_column: r.try_get(2)?,
                ref_table: r.try_get(3)?,
                ref_fields: r.try_get(4)?,
            })
        })
        .collect()
}

/// Relations owned by `table` (its reference columns).
pub async fn relations_from(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<Vec<ForeignKeyRequest>, AppError> {
    relations_where(conn, d, "owner_table", table).await
}

/// Relations pointing at `table`.
pub async fn relations_to(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<Vec<ForeignKeyRequest>, AppError> {
    relations_where(conn, d, "ref_table", table).await
}

/// Forget every relation `table` owns or is referenced by.
pub async fn delete_relations_of(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<(), AppError> {
    let sql = format!(
        "DELETE FROM {} WHERE LOWER(owner_table) = LOWER({}) OR LOWER(ref_table) = LOWER({})",
        d.quote_ident(RELATIONS_TABLE),
        d.placeholder(1),
        d.placeholder(2)
    );
    sqlx::query(&sql)
        .bind(table.to_string())
        .bind(table.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
