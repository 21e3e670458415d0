use super::{decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::{AbstractType, FieldDescriptor};
use crate::error::AppError;

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn max_string_len(&self) -> u32 {
        1_000_000_000
    }

    fn max_decimal_precision(&self) -> u32 {
        15
    }

    fn pk_shorthand(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn native_type(&self, spec: &TypeSpec) -> Result<String, AppError> {
        Ok(match spec.kind {
            AbstractType::Id => self.pk_shorthand().to_string(),
            AbstractType::String | AbstractType::Picklist | AbstractType::MultiPicklist => {
                let n = string_len(self, spec)?;
                if spec.fixed_length {
                    format!("CHAR({})", n)
                } else {
                    format!("VARCHAR({})", n)
                }
            }
            AbstractType::Text => "TEXT".into(),
            AbstractType::Integer | AbstractType::Reference => "INTEGER".into(),
            AbstractType::BigInt => "BIGINT".into(),
            AbstractType::SmallInt => "SMALLINT".into(),
            AbstractType::TinyInt => "TINYINT".into(),
            AbstractType::Decimal => {
                let (p, s) = decimal_params(self, spec)?;
                format!("DECIMAL({},{})", p, s)
            }
            AbstractType::Float => "REAL".into(),
            AbstractType::Double => "DOUBLE".into(),
            AbstractType::Money => "DECIMAL(15,4)".into(),
            AbstractType::Boolean => "BOOLEAN".into(),
            AbstractType::Datetime => "DATETIME".into(),
            AbstractType::Timestamp => "TIMESTAMP".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => "TIME".into(),
            AbstractType::Binary => "BLOB".into(),
        })
    }

    fn supports_foreign_key_alter(&self) -> bool {
        false
    }

    /// The Any driver reports no last-insert id for SQLite; `RETURNING` needs SQLite 3.35+.
    fn uses_returning(&self) -> bool {
        true
    }

    /// Declared types the Any driver cannot decode are cast to a storage class it can.
    fn select_expr(&self, field: &FieldDescriptor) -> String {
        let q = self.quote_ident(&field.name);
        match field.abstract_type {
            AbstractType::Boolean => format!("CAST({} AS INTEGER) AS {}", q, q),
            AbstractType::Decimal | AbstractType::Money => format!("CAST({} AS REAL) AS {}", q, q),
            t if t.is_temporal() => format!("CAST({} AS TEXT) AS {}", q, q),
            _ => q,
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT name AS table_name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            .into()
    }

    fn columns_sql(&self) -> String {
        "SELECT name AS column_name, type AS data_type, \
                CASE WHEN \"notnull\" = 0 AND pk = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
                dflt_value AS column_default, \
                NULL AS max_length, NULL AS num_precision, NULL AS num_scale, \
                CASE WHEN pk > 0 THEN 1 ELSE 0 END AS is_primary_key, \
                CASE WHEN pk = 1 AND upper(type) = 'INTEGER' THEN 1 ELSE 0 END AS auto_increment \
         FROM pragma_table_info(?) ORDER BY cid"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT \"from\" AS column_name, \"table\" AS ref_table, COALESCE(\"to\", 'id') AS ref_column \
         FROM pragma_foreign_key_list(?)"
            .into()
    }
}
