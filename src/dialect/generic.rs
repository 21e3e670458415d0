use super::{decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::AbstractType;
use crate::error::AppError;

/// ANSI-flavoured fallback for unrecognized drivers.
pub struct GenericDialect;

impl SqlDialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn max_string_len(&self) -> u32 {
        255
    }

    fn max_decimal_precision(&self) -> u32 {
        38
    }

    fn pk_shorthand(&self) -> &'static str {
        "INTEGER PRIMARY KEY"
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
            AbstractType::SmallInt | AbstractType::TinyInt => "SMALLINT".into(),
            AbstractType::Decimal => {
                let (p, s) = decimal_params(self, spec)?;
                format!("DECIMAL({},{})", p, s)
            }
            AbstractType::Float => "REAL".into(),
            AbstractType::Double => "DOUBLE PRECISION".into(),
            AbstractType::Money => "DECIMAL(19,4)".into(),
            AbstractType::Boolean => "BOOLEAN".into(),
            AbstractType::Datetime | AbstractType::Timestamp => "TIMESTAMP".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => "TIME".into(),
            AbstractType::Binary => "BLOB".into(),
        })
    }

    fn list_tables_sql(&self) -> String {
        "SELECT table_name FROM information_schema.tables WHERE table_type = 'BASE TABLE'".into()
    }

    fn columns_sql(&self) -> String {
        "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                c.character_maximum_length AS max_length, \
                c.numeric_precision AS num_precision, c.numeric_scale AS num_scale, \
                CASE WHEN EXISTS ( \
                    SELECT 1 FROM information_schema.table_constraints tc \
                    JOIN information_schema.key_column_usage k ON k.constraint_name = tc.constraint_name \
                    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = c.table_name \
                      AND k.column_name = c.column_name \
                ) THEN 1 ELSE 0 END AS is_primary_key, \
                0 AS auto_increment \
         FROM information_schema.columns c WHERE c.table_name = ? \
         ORDER BY c.ordinal_position"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT kcu.column_name, ccu.table_name AS ref_table, ccu.column_name AS ref_column \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu ON kcu.constraint_name = tc.constraint_name \
         JOIN information_schema.constraint_column_usage ccu ON ccu.constraint_name = tc.constraint_name \
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = ?"
            .into()
    }
}
