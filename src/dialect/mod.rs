//! Dialect resolution and per-engine SQL rules.
//!
//! [`Dialect`] is the closed set of supported engine families; [`Dialect::rules`]
//! hands out the one [`SqlDialect`] implementation that owns every engine-specific
//! decision (quoting, placeholders, type names and ceilings, catalog queries), so
//! no caller needs to branch on the engine itself.

mod generic;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use generic::GenericDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::config::{AbstractType, FieldDescriptor};
use crate::error::AppError;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Generic,
    MySql,
    SqlServer,
    Sqlite,
    Postgres,
    Oracle,
}

impl Dialect {
    /// Map a driver identifier (driver name, URL scheme or backend name) to a dialect.
    /// Total: anything unrecognized is `Generic`.
    pub fn resolve(driver: &str) -> Dialect {
        let lower = driver.trim().to_lowercase();
        let scheme = lower.split(':').next().unwrap_or("");
        match scheme {
            "mysql" | "mariadb" => Dialect::MySql,
            "sqlsrv" | "mssql" | "dblib" | "sqlserver" | "microsoft sql server" => Dialect::SqlServer,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "pgsql" | "postgres" | "postgresql" => Dialect::Postgres,
            "oci" | "oci8" | "oracle" => Dialect::Oracle,
            _ => Dialect::Generic,
        }
    }

    pub fn rules(self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Generic => &GenericDialect,
            Dialect::MySql => &MysqlDialect,
            Dialect::SqlServer => &SqlServerDialect,
            Dialect::Sqlite => &SqliteDialect,
            Dialect::Postgres => &PostgresDialect,
            Dialect::Oracle => &OracleDialect,
        }
    }

    pub fn name(self) -> &'static str {
        self.rules().name()
    }
}

/// Normalized column type request handed to [`SqlDialect::native_type`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSpec {
    pub kind: AbstractType,
    pub size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub fixed_length: bool,
    pub multi_byte: bool,
}

impl TypeSpec {
    pub fn of(kind: AbstractType) -> Self {
        TypeSpec {
            kind,
            size: None,
            precision: None,
            scale: None,
            fixed_length: false,
            multi_byte: false,
        }
    }

    pub fn sized(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }
}

/// Engine-specific SQL rules. One implementation per [`Dialect`].
///
/// Catalog queries take the table name as their only parameter and return
/// positional columns:
/// - columns: `column_name, data_type, is_nullable ('YES'/'NO'), column_default,
///   max_length, num_precision, num_scale, is_primary_key (0/1), auto_increment (0/1)`
/// - foreign keys: `column_name, ref_table, ref_column`
/// - tables (no parameter): `table_name`
pub trait SqlDialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Placeholder for the n-th (1-based) parameter.
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Placeholder for a value bound to `field`; dialects with strict parameter typing add a cast.
    fn bind_placeholder(&self, n: usize, _field: Option<&FieldDescriptor>) -> String {
        self.placeholder(n)
    }

    fn max_string_len(&self) -> u32;

    fn max_nstring_len(&self) -> u32 {
        self.max_string_len()
    }

    fn max_decimal_precision(&self) -> u32;

    fn max_decimal_scale(&self) -> u32 {
        self.max_decimal_precision()
    }

    /// Auto-increment primary key column clause.
    fn pk_shorthand(&self) -> &'static str;

    /// Native column type for an abstract type request, enforcing this dialect's ceilings.
    fn native_type(&self, spec: &TypeSpec) -> Result<String, AppError>;

    /// Server-side current timestamp.
    fn now_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "1"
        } else {
            "0"
        }
    }

    /// Pagination suffix placed after ORDER BY.
    fn paginate(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut s = String::new();
        if let Some(n) = limit {
            s.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset.filter(|n| *n > 0) {
            s.push_str(&format!(" OFFSET {}", n));
        }
        s
    }

    /// ORDER BY used when a keyless table is read with no explicit order.
    fn unkeyed_order(&self) -> &'static str {
        ""
    }

    fn add_column(&self, table: &str, column_def: &str) -> String {
        format!("ALTER TABLE {} ADD COLUMN {}", table, column_def)
    }

    /// Whether `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` is available.
    fn supports_foreign_key_alter(&self) -> bool {
        true
    }

    /// Whether inserts report the generated key through `RETURNING` instead of the driver's last-insert id.
    fn uses_returning(&self) -> bool {
        false
    }

    fn empty_insert(&self, table: &str, _pk: Option<&str>) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    }

    /// Select-list expression for a column, aliased back to its own name.
    fn select_expr(&self, field: &FieldDescriptor) -> String {
        self.quote_ident(&field.name)
    }

    /// General category of a native type as reported by the catalog.
    fn classify(&self, native: &str, _precision: Option<u32>, _scale: Option<u32>) -> AbstractType {
        classify_native(native)
    }

    fn list_tables_sql(&self) -> String;

    fn columns_sql(&self) -> String;

    fn foreign_keys_sql(&self) -> String;
}

/// Validated string length: default 255, bounded by the dialect ceiling.
pub(crate) fn string_len(d: &dyn SqlDialect, spec: &TypeSpec) -> Result<u32, AppError> {
    let len = spec.size.unwrap_or(255);
    let max = if spec.multi_byte { d.max_nstring_len() } else { d.max_string_len() };
    if len == 0 {
        return Err(AppError::Validation("string length must be positive".into()));
    }
    if len > max {
        return Err(AppError::Validation(format!(
            "string length {} exceeds {} maximum of {}",
            len,
            d.name(),
            max
        )));
    }
    Ok(len)
}

/// Validated (precision, scale): defaults (10, 2), bounded by the dialect ceilings.
pub(crate) fn decimal_params(d: &dyn SqlDialect, spec: &TypeSpec) -> Result<(u32, u32), AppError> {
    let precision = spec.precision.or(spec.size).unwrap_or(10);
    let scale = spec.scale.unwrap_or(2);
    if precision == 0 || precision > d.max_decimal_precision() {
        return Err(AppError::Validation(format!(
            "decimal precision {} outside {} range 1..={}",
            precision,
            d.name(),
            d.max_decimal_precision()
        )));
    }
    if scale > precision || scale > d.max_decimal_scale() {
        return Err(AppError::Validation(format!(
            "decimal scale {} invalid for precision {} on {}",
            scale,
            precision,
            d.name()
        )));
    }
    Ok((precision, scale))
}

/// Dialect-neutral classification by native type name.
pub fn classify_native(native: &str) -> AbstractType {
    let t = native.trim().to_lowercase();
    let base = t.split('(').next().unwrap_or("").trim();
    if base == "bit" || base.starts_with("bool") {
        AbstractType::Boolean
    } else if t.contains("timestamp") || t.contains("datetime") {
        AbstractType::Datetime
    } else if base == "date" {
        AbstractType::Date
    } else if base.starts_with("time") {
        AbstractType::Time
    } else if t.contains("interval") || t.contains("point") {
        AbstractType::String
    } else if t.contains("float") || t.contains("doub") || base == "real" {
        if t.contains("doub") || t.contains("float8") {
            AbstractType::Double
        } else {
            AbstractType::Float
        }
    } else if t.contains("money") {
        AbstractType::Money
    } else if t.contains("numeric") || t.contains("decimal") || base == "number" {
        AbstractType::Decimal
    } else if t.contains("bigint") || base == "int8" || base == "bigserial" {
        AbstractType::BigInt
    } else if t.contains("smallint") || base == "int2" || base == "smallserial" {
        AbstractType::SmallInt
    } else if t.contains("tinyint") {
        AbstractType::TinyInt
    } else if t.contains("int") || t.contains("serial") {
        AbstractType::Integer
    } else if t.contains("text") || t.contains("clob") || t.contains("json") {
        AbstractType::Text
    } else if t.contains("char") || t.contains("string") || t.contains("uuid") {
        AbstractType::String
    } else if t.contains("blob") || t.contains("binary") || t.contains("bytea") || t.contains("image") || base == "raw" {
        AbstractType::Binary
    } else {
        AbstractType::String
    }
}

/// Parameters of a native type string, e.g. `varchar(255)` → `(Some(255), None)`.
pub fn parse_type_params(native: &str) -> (Option<u32>, Option<u32>) {
    let Some(open) = native.find('(') else {
        return (None, None);
    };
    let Some(close) = native[open..].find(')') else {
        return (None, None);
    };
    let inner = &native[open + 1..open + close];
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u32>().ok());
    let first = parts.next().flatten();
    let second = parts.next().flatten();
    (first, second)
}
