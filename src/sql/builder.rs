//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a table descriptor.
//! Identifiers come from the catalog only; values are always parameters.

use super::{BindValue, ColumnValue, Filter};
use crate::config::{FieldDescriptor, TableDescriptor};
use crate::dialect::SqlDialect;
use crate::error::AppError;

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    /// Append a parameter and return its 1-based position.
    pub fn push_param(&mut self, v: BindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Ordering resolved against the descriptor: `(field, descending)`.
pub type OrderBy<'a> = Vec<(&'a FieldDescriptor, bool)>;

fn select_column_list(d: &dyn SqlDialect, fields: &[&FieldDescriptor]) -> String {
    fields.iter().map(|f| d.select_expr(f)).collect::<Vec<_>>().join(", ")
}

fn order_clause(d: &dyn SqlDialect, table: &TableDescriptor, order: &OrderBy<'_>) -> Result<String, AppError> {
    if order.is_empty() {
        return Ok(match table.primary_key.as_deref() {
            Some(pk) => format!(" ORDER BY {}", d.quote_ident(pk)),
            None => d.unkeyed_order().to_string(),
        });
    }
    let parts: Vec<String> = order
        .iter()
        .map(|(f, desc)| format!("{}{}", d.quote_ident(&f.name), if *desc { " DESC" } else { " ASC" }))
        .collect();
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

/// INSERT of already-validated columns. On dialects with RETURNING the generated key is selected back.
pub fn insert(d: &dyn SqlDialect, table: &TableDescriptor, values: &[(String, ColumnValue)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let t = d.quote_ident(&table.name);
    let pk = table.primary_key.as_deref().map(|pk| d.quote_ident(pk));
    if values.is_empty() {
        q.sql = d.empty_insert(&t, pk.as_deref());
    } else {
        let mut cols = Vec::with_capacity(values.len());
        let mut vals = Vec::with_capacity(values.len());
        for (name, value) in values {
            cols.push(d.quote_ident(name));
            vals.push(match value {
                ColumnValue::ServerExpr(expr) => expr.to_string(),
                ColumnValue::Bind(v) => {
                    let n = q.push_param(v.clone());
                    d.bind_placeholder(n, table.field(name))
                }
            });
        }
        q.sql = format!("INSERT INTO {} ({}) VALUES ({})", t, cols.join(", "), vals.join(", "));
    }
    if d.uses_returning() {
        if let Some(pk) = pk {
            q.sql.push_str(&format!(" RETURNING {}", pk));
        }
    }
    q
}

/// SELECT rows whose primary key is in `ids`; row order is not guaranteed.
pub fn select_by_ids(
    d: &dyn SqlDialect,
    table: &TableDescriptor,
    fields: &[&FieldDescriptor],
    ids: &[BindValue],
) -> Result<QueryBuf, AppError> {
    let pk = table.primary_key_field()?;
    let mut q = QueryBuf::new();
    let phs: Vec<String> = ids
        .iter()
        .map(|id| {
            let n = q.push_param(id.clone());
            d.bind_placeholder(n, Some(pk))
        })
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        select_column_list(d, fields),
        d.quote_ident(&table.name),
        d.quote_ident(&pk.name),
        phs.join(", ")
    );
    Ok(q)
}

fn where_clause(
    d: &dyn SqlDialect,
    table: &TableDescriptor,
    filter: Option<&Filter>,
    q: &mut QueryBuf,
) -> Result<String, AppError> {
    match filter {
        Some(f) => Ok(format!(" WHERE {}", f.render(d, table, q)?)),
        None => Ok(String::new()),
    }
}

/// SELECT list with optional filter, ordering (primary key when none given) and pagination.
pub fn select_where(
    d: &dyn SqlDialect,
    table: &TableDescriptor,
    fields: &[&FieldDescriptor],
    filter: Option<&Filter>,
    order: &OrderBy<'_>,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(d, table, filter, &mut q)?;
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(d, fields),
        d.quote_ident(&table.name),
        where_sql,
        order_clause(d, table, order)?,
        d.paginate(limit, offset)
    );
    Ok(q)
}

pub fn count_where(d: &dyn SqlDialect, table: &TableDescriptor, filter: Option<&Filter>) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(d, table, filter, &mut q)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", d.quote_ident(&table.name), where_sql);
    Ok(q)
}

/// Primary keys of the rows matching `filter`, in key order.
pub fn select_ids_where(d: &dyn SqlDialect, table: &TableDescriptor, filter: &Filter) -> Result<QueryBuf, AppError> {
    let pk = table.primary_key_field()?;
    let mut q = QueryBuf::new();
    let where_sql = where_clause(d, table, Some(filter), &mut q)?;
    let pk_q = d.quote_ident(&pk.name);
    q.sql = format!("SELECT {} FROM {}{} ORDER BY {}", pk_q, d.quote_ident(&table.name), where_sql, pk_q);
    Ok(q)
}

pub fn update_by_id(
    d: &dyn SqlDialect,
    table: &TableDescriptor,
    values: &[(String, ColumnValue)],
    id: &BindValue,
) -> Result<QueryBuf, AppError> {
    if values.is_empty() {
        return Err(AppError::Validation("no fields to update".into()));
    }
    let pk = table.primary_key_field()?;
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(values.len());
    for (name, value) in values {
        let rhs = match value {
            ColumnValue::ServerExpr(expr) => expr.to_string(),
            ColumnValue::Bind(v) => {
                let n = q.push_param(v.clone());
                d.bind_placeholder(n, table.field(name))
            }
        };
        sets.push(format!("{} = {}", d.quote_ident(name), rhs));
    }
    let n = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        d.quote_ident(&table.name),
        sets.join(", "),
        d.quote_ident(&pk.name),
        d.bind_placeholder(n, Some(pk))
    );
    Ok(q)
}

pub fn delete_by_id(d: &dyn SqlDialect, table: &TableDescriptor, id: &BindValue) -> Result<QueryBuf, AppError> {
    let pk = table.primary_key_field()?;
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        d.quote_ident(&table.name),
        d.quote_ident(&pk.name),
        d.bind_placeholder(n, Some(pk))
    );
    Ok(q)
}
