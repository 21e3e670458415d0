use super::{classify_native, decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::AbstractType;
use crate::error::AppError;

pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, n: usize) -> String {
        format!("@P{}", n)
    }

    fn max_string_len(&self) -> u32 {
        8000
    }

    fn max_nstring_len(&self) -> u32 {
        4000
    }

    fn max_decimal_precision(&self) -> u32 {
        38
    }

    fn pk_shorthand(&self) -> &'static str {
        "INT IDENTITY(1,1) PRIMARY KEY"
    }

    fn native_type(&self, spec: &TypeSpec) -> Result<String, AppError> {
        Ok(match spec.kind {
            AbstractType::Id => self.pk_shorthand().to_string(),
            AbstractType::String | AbstractType::Picklist | AbstractType::MultiPicklist => {
                let n = string_len(self, spec)?;
                let base = match (spec.multi_byte, spec.fixed_length) {
                    (true, true) => "NCHAR",
                    (true, false) => "NVARCHAR",
                    (false, true) => "CHAR",
                    (false, false) => "VARCHAR",
                };
                format!("{}({})", base, n)
            }
            AbstractType::Text => {
                if spec.multi_byte {
                    "NVARCHAR(MAX)".into()
                } else {
                    "VARCHAR(MAX)".into()
                }
            }
            AbstractType::Integer | AbstractType::Reference => "INT".into(),
            AbstractType::BigInt => "BIGINT".into(),
            AbstractType::SmallInt => "SMALLINT".into(),
            AbstractType::TinyInt => "TINYINT".into(),
            AbstractType::Decimal => {
                let (p, s) = decimal_params(self, spec)?;
                format!("DECIMAL({},{})", p, s)
            }
            AbstractType::Float => "REAL".into(),
            AbstractType::Double => "FLOAT".into(),
            AbstractType::Money => "MONEY".into(),
            AbstractType::Boolean => "BIT".into(),
            AbstractType::Datetime => "DATETIME2".into(),
            AbstractType::Timestamp => "DATETIMEOFFSET".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => "TIME".into(),
            AbstractType::Binary => "VARBINARY(MAX)".into(),
        })
    }

    fn now_expr(&self) -> &'static str {
        "SYSDATETIMEOFFSET()"
    }

    fn paginate(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut s = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(n) = limit {
            s.push_str(&format!(" FETCH NEXT {} ROWS ONLY", n));
        }
        s
    }

    /// OFFSET ... FETCH is only valid after an ORDER BY.
    fn unkeyed_order(&self) -> &'static str {
        " ORDER BY (SELECT NULL)"
    }

    fn add_column(&self, table: &str, column_def: &str) -> String {
        format!("ALTER TABLE {} ADD {}", table, column_def)
    }

    fn classify(&self, native: &str, _precision: Option<u32>, _scale: Option<u32>) -> AbstractType {
        match native.trim().to_lowercase().as_str() {
            "uniqueidentifier" | "xml" | "sql_variant" => AbstractType::String,
            "ntext" => AbstractType::Text,
            "smallmoney" => AbstractType::Money,
            "float" => AbstractType::Double,
            other => classify_native(other),
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT TABLE_NAME AS table_name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_TYPE = 'BASE TABLE'"
            .into()
    }

    fn columns_sql(&self) -> String {
        "SELECT c.COLUMN_NAME AS column_name, c.DATA_TYPE AS data_type, \
                c.IS_NULLABLE AS is_nullable, c.COLUMN_DEFAULT AS column_default, \
                CAST(c.CHARACTER_MAXIMUM_LENGTH AS BIGINT) AS max_length, \
                CAST(c.NUMERIC_PRECISION AS BIGINT) AS num_precision, \
                CAST(c.NUMERIC_SCALE AS BIGINT) AS num_scale, \
                CAST(CASE WHEN EXISTS ( \
                    SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
                      ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
                    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA \
                      AND tc.TABLE_NAME = c.TABLE_NAME AND k.COLUMN_NAME = c.COLUMN_NAME \
                ) THEN 1 ELSE 0 END AS BIGINT) AS is_primary_key, \
                CAST(COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity') \
                     AS BIGINT) AS auto_increment \
         FROM INFORMATION_SCHEMA.COLUMNS c \
         WHERE c.TABLE_SCHEMA = SCHEMA_NAME() AND c.TABLE_NAME = @P1 \
         ORDER BY c.ORDINAL_POSITION"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name, \
                OBJECT_NAME(fkc.referenced_object_id) AS ref_table, \
                COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS ref_column \
         FROM sys.foreign_key_columns fkc \
         WHERE OBJECT_NAME(fkc.parent_object_id) = @P1"
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multibyte_strings_use_national_types() {
        let mut spec = TypeSpec::of(AbstractType::String).sized(4000);
        spec.multi_byte = true;
        assert_eq!(SqlServerDialect.native_type(&spec).unwrap(), "NVARCHAR(4000)");
        spec.size = Some(4001);
        assert!(SqlServerDialect.native_type(&spec).is_err());
        spec.multi_byte = false;
        assert_eq!(SqlServerDialect.native_type(&spec).unwrap(), "VARCHAR(4001)");
    }

    #[test]
    fn paginates_with_offset_fetch() {
        assert_eq!(
            SqlServerDialect.paginate(Some(10), Some(20)),
            " OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(SqlServerDialect.placeholder(2), "@P2");
        assert_eq!(SqlServerDialect.quote_ident("a]b"), "[a]]b]");
    }

    #[test]
    fn offset_datetime_is_datetime() {
        assert_eq!(SqlServerDialect.classify("datetimeoffset", None, None), AbstractType::Datetime);
        assert_eq!(SqlServerDialect.classify("bit", None, None), AbstractType::Boolean);
    }
}
