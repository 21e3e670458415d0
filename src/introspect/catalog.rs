//! Raw catalog reads. Every dialect's catalog query returns the same positional shape.

use crate::dialect::SqlDialect;
use crate::error::AppError;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Row};

#[derive(Clone, Debug)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub primary_key: bool,
    pub auto_increment: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

fn opt_string(row: &AnyRow, idx: usize) -> Option<String> {
    row.try_get::<Option<String>, _>(idx).ok().flatten()
}

fn opt_i64(row: &AnyRow, idx: usize) -> Option<i64> {
    row.try_get::<Option<i64>, _>(idx)
        .ok()
        .flatten()
        .or_else(|| opt_string(row, idx).and_then(|s| s.trim().parse().ok()))
}

pub async fn table_names(conn: &mut AnyConnection, d: &dyn SqlDialect) -> Result<Vec<String>, AppError> {
    let sql = d.list_tables_sql();
    tracing::debug!(sql = %sql, "catalog");
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().filter_map(|r| opt_string(r, 0)).collect())
}

/// Catalog spelling of `name`: exact match first, then case-insensitive.
pub async fn find_table(conn: &mut AnyConnection, d: &dyn SqlDialect, name: &str) -> Result<Option<String>, AppError> {
    let names = table_names(conn, d).await?;
    if let Some(exact) = names.iter().find(|n| n.as_str() == name) {
        return Ok(Some(exact.clone()));
    }
    Ok(names.into_iter().find(|n| n.eq_ignore_ascii_case(name)))
}

pub async fn columns(conn: &mut AnyConnection, d: &dyn SqlDialect, table: &str) -> Result<Vec<CatalogColumn>, AppError> {
    let sql = d.columns_sql();
    tracing::debug!(sql = %sql, table = %table, "catalog");
    let rows = sqlx::query(&sql).bind(table.to_string()).fetch_all(&mut *conn).await?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            let name = opt_string(r, 0)?;
            Some(CatalogColumn {
                name,
                data_type: opt_string(r, 1).unwrap_or_default(),
                nullable: opt_string(r, 2).map(|s| s.eq_ignore_ascii_case("YES")).unwrap_or(true),
                default: opt_string(r, 3),
                max_length: opt_i64(r, 4),
                precision: opt_i64(r, 5),
                scale: opt_i64(r, 6),
                primary_key: opt_i64(r, 7).unwrap_or(0) != 0,
                auto_increment: opt_i64(r, 8).unwrap_or(0) != 0,
            })
        })
        .collect())
}

pub async fn foreign_keys(
    conn: &mut AnyConnection,
    d: &dyn SqlDialect,
    table: &str,
) -> Result<Vec<CatalogForeignKey>, AppError> {
    let sql = d.foreign_keys_sql();
    tracing::debug!(sql = %sql, table = %table, "catalog");
    let rows = sqlx::query(&sql).bind(table.to_string()).fetch_all(&mut *conn).await?;
    Ok(rows
        .iter()
        .filter_map(|r| {
            Some(CatalogForeignKey {
                column: opt_string(r, 0)?,
                ref_table: opt_string(r, 1)?,
                ref_column: opt_string(r, 2).unwrap_or_else(|| "id".into()),
            })
        })
        .collect())
}
