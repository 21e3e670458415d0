use super::{classify_native, decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::{AbstractType, FieldDescriptor};
use crate::error::AppError;

pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn max_string_len(&self) -> u32 {
        65_535
    }

    fn max_decimal_precision(&self) -> u32 {
        65
    }

    fn max_decimal_scale(&self) -> u32 {
        30
    }

    fn pk_shorthand(&self) -> &'static str {
        "INT NOT NULL AUTO_INCREMENT PRIMARY KEY"
    }

    fn native_type(&self, spec: &TypeSpec) -> Result<String, AppError> {
        Ok(match spec.kind {
            AbstractType::Id => self.pk_shorthand().to_string(),
            AbstractType::String | AbstractType::Picklist | AbstractType::MultiPicklist => {
                let n = string_len(self, spec)?;
                if spec.fixed_length {
                    if n > 255 {
                        return Err(AppError::Validation(format!(
                            "fixed length {} exceeds mysql CHAR maximum of 255",
                            n
                        )));
                    }
                    format!("CHAR({})", n)
                } else {
                    format!("VARCHAR({})", n)
                }
            }
            AbstractType::Text => match spec.size.unwrap_or(0) {
                n if n > 16_777_215 => "LONGTEXT".into(),
                n if n > 65_535 => "MEDIUMTEXT".into(),
                _ => "TEXT".into(),
            },
            AbstractType::Integer | AbstractType::Reference => "INT".into(),
            AbstractType::BigInt => "BIGINT".into(),
            AbstractType::SmallInt => "SMALLINT".into(),
            AbstractType::TinyInt => "TINYINT".into(),
            AbstractType::Decimal => {
                let (p, s) = decimal_params(self, spec)?;
                format!("DECIMAL({},{})", p, s)
            }
            AbstractType::Float => "FLOAT".into(),
            AbstractType::Double => "DOUBLE".into(),
            AbstractType::Money => "DECIMAL(19,4)".into(),
            AbstractType::Boolean => "TINYINT(1)".into(),
            AbstractType::Datetime => "DATETIME".into(),
            AbstractType::Timestamp => "TIMESTAMP".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => "TIME".into(),
            AbstractType::Binary => {
                if spec.size.unwrap_or(0) > 65_535 {
                    "LONGBLOB".into()
                } else {
                    "BLOB".into()
                }
            }
        })
    }

    fn now_expr(&self) -> &'static str {
        "NOW()"
    }

    fn empty_insert(&self, table: &str, _pk: Option<&str>) -> String {
        format!("INSERT INTO {} () VALUES ()", table)
    }

    fn select_expr(&self, field: &FieldDescriptor) -> String {
        let q = self.quote_ident(&field.name);
        match field.abstract_type {
            AbstractType::Decimal | AbstractType::Money => format!("CAST({} AS CHAR) AS {}", q, q),
            t if t.is_temporal() => format!("CAST({} AS CHAR) AS {}", q, q),
            _ => q,
        }
    }

    fn classify(&self, native: &str, _precision: Option<u32>, _scale: Option<u32>) -> AbstractType {
        let t = native.trim().to_lowercase();
        if t.starts_with("tinyint(1)") {
            AbstractType::Boolean
        } else if t.starts_with("timestamp") {
            AbstractType::Timestamp
        } else if t.starts_with("enum") || t.starts_with("set") {
            AbstractType::String
        } else {
            classify_native(&t)
        }
    }

    fn list_tables_sql(&self) -> String {
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'"
            .into()
    }

    fn columns_sql(&self) -> String {
        "SELECT CAST(c.COLUMN_NAME AS CHAR) AS column_name, \
                CAST(c.COLUMN_TYPE AS CHAR) AS data_type, \
                CAST(c.IS_NULLABLE AS CHAR) AS is_nullable, \
                CAST(c.COLUMN_DEFAULT AS CHAR) AS column_default, \
                CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length, \
                CAST(c.NUMERIC_PRECISION AS SIGNED) AS num_precision, \
                CAST(c.NUMERIC_SCALE AS SIGNED) AS num_scale, \
                CAST(CASE WHEN c.COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END AS SIGNED) AS is_primary_key, \
                CAST(CASE WHEN c.EXTRA LIKE '%auto_increment%' THEN 1 ELSE 0 END AS SIGNED) AS auto_increment \
         FROM information_schema.COLUMNS c \
         WHERE c.TABLE_SCHEMA = DATABASE() AND c.TABLE_NAME = ? \
         ORDER BY c.ORDINAL_POSITION"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
                CAST(REFERENCED_TABLE_NAME AS CHAR) AS ref_table, \
                CAST(REFERENCED_COLUMN_NAME AS CHAR) AS ref_column \
         FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL"
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_backticks() {
        assert_eq!(MysqlDialect.quote_ident("order"), "`order`");
        assert_eq!(MysqlDialect.quote_ident("a`b"), "`a``b`");
    }

    #[test]
    fn tinyint_one_is_boolean() {
        assert_eq!(MysqlDialect.classify("tinyint(1)", None, None), AbstractType::Boolean);
        assert_eq!(MysqlDialect.classify("tinyint(4)", None, None), AbstractType::TinyInt);
        assert_eq!(MysqlDialect.classify("timestamp", None, None), AbstractType::Timestamp);
        assert_eq!(MysqlDialect.classify("int(11)", None, None), AbstractType::Integer);
    }

    #[test]
    fn decimal_scale_ceiling() {
        let mut spec = TypeSpec::of(AbstractType::Decimal);
        spec.precision = Some(60);
        spec.scale = Some(31);
        assert!(MysqlDialect.native_type(&spec).is_err());
        spec.scale = Some(30);
        assert_eq!(MysqlDialect.native_type(&spec).unwrap(), "DECIMAL(60,30)");
    }

    #[test]
    fn empty_insert_uses_empty_value_list() {
        assert_eq!(MysqlDialect.empty_insert("`t`", Some("`id`")), "INSERT INTO `t` () VALUES ()");
    }
}
