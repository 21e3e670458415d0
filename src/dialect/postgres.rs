use super::{classify_native, decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::{AbstractType, FieldDescriptor};
use crate::error::AppError;

/// Native types the Any driver decodes directly; everything else is selected as text.
const DECODABLE: &[&str] = &[
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "real",
    "double precision",
    "text",
    "character varying",
    "bytea",
];

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }

    fn bind_placeholder(&self, n: usize, field: Option<&FieldDescriptor>) -> String {
        // Parameters arrive as int8/float8/text/bool; cast to the column type so comparisons and
        // assignments type-check.
        match field {
            Some(f) if castable(&f.db_type) => format!("${}::{}", n, f.db_type),
            _ => self.placeholder(n),
        }
    }

    fn max_string_len(&self) -> u32 {
        10_485_760
    }

    fn max_decimal_precision(&self) -> u32 {
        1000
    }

    fn pk_shorthand(&self) -> &'static str {
        "SERIAL PRIMARY KEY"
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
                format!("NUMERIC({},{})", p, s)
            }
            AbstractType::Float => "REAL".into(),
            AbstractType::Double => "DOUBLE PRECISION".into(),
            AbstractType::Money => "MONEY".into(),
            AbstractType::Boolean => "BOOLEAN".into(),
            AbstractType::Datetime => "TIMESTAMP".into(),
            AbstractType::Timestamp => "TIMESTAMPTZ".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => "TIME".into(),
            AbstractType::Binary => "BYTEA".into(),
        })
    }

    fn now_expr(&self) -> &'static str {
        "NOW()"
    }

    fn bool_literal(&self, b: bool) -> &'static str {
        if b {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn uses_returning(&self) -> bool {
        true
    }

    fn select_expr(&self, field: &FieldDescriptor) -> String {
        let q = self.quote_ident(&field.name);
        if DECODABLE.contains(&field.db_type.to_lowercase().as_str()) {
            q
        } else {
            format!("CAST({} AS TEXT) AS {}", q, q)
        }
    }

    fn classify(&self, native: &str, _precision: Option<u32>, _scale: Option<u32>) -> AbstractType {
        match native.to_lowercase().as_str() {
            "user-defined" | "array" | "uuid" => AbstractType::String,
            other => classify_native(other),
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT CAST(table_name AS TEXT) AS table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
            .into()
    }

    fn columns_sql(&self) -> String {
        "SELECT CAST(c.column_name AS TEXT) AS column_name, \
                CAST(c.data_type AS TEXT) AS data_type, \
                CAST(c.is_nullable AS TEXT) AS is_nullable, \
                CAST(c.column_default AS TEXT) AS column_default, \
                CAST(c.character_maximum_length AS BIGINT) AS max_length, \
                CAST(c.numeric_precision AS BIGINT) AS num_precision, \
                CAST(c.numeric_scale AS BIGINT) AS num_scale, \
                CAST(CASE WHEN EXISTS ( \
                    SELECT 1 FROM information_schema.table_constraints tc \
                    JOIN information_schema.key_column_usage k \
                      ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema \
                    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
                      AND tc.table_name = c.table_name AND k.column_name = c.column_name \
                ) THEN 1 ELSE 0 END AS BIGINT) AS is_primary_key, \
                CAST(CASE WHEN c.column_default LIKE 'nextval(%' OR c.is_identity = 'YES' \
                     THEN 1 ELSE 0 END AS BIGINT) AS auto_increment \
         FROM information_schema.columns c \
         WHERE c.table_schema = current_schema() AND c.table_name = $1 \
         ORDER BY c.ordinal_position"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT CAST(kcu.column_name AS TEXT) AS column_name, \
                CAST(ccu.table_name AS TEXT) AS ref_table, \
                CAST(ccu.column_name AS TEXT) AS ref_column \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema \
         JOIN information_schema.constraint_column_usage ccu \
           ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema() \
           AND tc.table_name = $1"
            .into()
    }
}

fn castable(db_type: &str) -> bool {
    let t = db_type.trim();
    !t.is_empty()
        && !t.eq_ignore_ascii_case("USER-DEFINED")
        && !t.eq_ignore_ascii_case("ARRAY")
        && t.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '(' || c == ')' || c == ',')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, db_type: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            label: name.into(),
            size: None,
            precision: None,
            scale: None,
            default: None,
            required: false,
            allow_null: true,
            abstract_type: AbstractType::String,
            db_type: db_type.into(),
            auto_increment: false,
            is_primary_key: false,
            is_foreign_key: false,
            ref_table: None,
            ref_fields: None,
            supports_multibyte: false,
            picklist: Vec::new(),
        }
    }

    #[test]
    fn placeholders_cast_to_column_type() {
        let d = PostgresDialect;
        assert_eq!(d.placeholder(3), "$3");
        assert_eq!(d.bind_placeholder(1, Some(&field("price", "numeric"))), "$1::numeric");
        assert_eq!(d.bind_placeholder(2, Some(&field("tags", "ARRAY"))), "$2");
        assert_eq!(d.bind_placeholder(2, None), "$2");
    }

    #[test]
    fn non_decodable_columns_selected_as_text() {
        let d = PostgresDialect;
        assert_eq!(d.select_expr(&field("n", "integer")), "\"n\"");
        assert_eq!(
            d.select_expr(&field("at", "timestamp without time zone")),
            "CAST(\"at\" AS TEXT) AS \"at\""
        );
    }

    #[test]
    fn maps_types() {
        let d = PostgresDialect;
        assert_eq!(d.native_type(&TypeSpec::of(AbstractType::Timestamp)).unwrap(), "TIMESTAMPTZ");
        assert_eq!(d.native_type(&TypeSpec::of(AbstractType::Decimal)).unwrap(), "NUMERIC(10,2)");
        assert_eq!(d.classify("timestamp with time zone", None, None), AbstractType::Datetime);
        assert_eq!(d.classify("USER-DEFINED", None, None), AbstractType::String);
    }
}
