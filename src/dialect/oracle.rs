use super::{classify_native, decimal_params, string_len, SqlDialect, TypeSpec};
use crate::config::AbstractType;
use crate::error::AppError;

pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn placeholder(&self, n: usize) -> String {
        format!(":{}", n)
    }

    fn max_string_len(&self) -> u32 {
        4000
    }

    fn max_nstring_len(&self) -> u32 {
        2000
    }

    fn max_decimal_precision(&self) -> u32 {
        38
    }

    fn pk_shorthand(&self) -> &'static str {
        "NUMBER(10) GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
    }

    fn native_type(&self, spec: &TypeSpec) -> Result<String, AppError> {
        Ok(match spec.kind {
            AbstractType::Id => self.pk_shorthand().to_string(),
            AbstractType::String | AbstractType::Picklist | AbstractType::MultiPicklist => {
                let n = string_len(self, spec)?;
                if spec.fixed_length && n > 2000 {
                    return Err(AppError::Validation(format!(
                        "fixed length {} exceeds oracle CHAR maximum of 2000",
                        n
                    )));
                }
                let base = match (spec.multi_byte, spec.fixed_length) {
                    (true, true) => "NCHAR",
                    (true, false) => "NVARCHAR2",
                    (false, true) => "CHAR",
                    (false, false) => "VARCHAR2",
                };
                format!("{}({})", base, n)
            }
            AbstractType::Text => {
                if spec.multi_byte {
                    "NCLOB".into()
                } else {
                    "CLOB".into()
                }
            }
            AbstractType::Integer | AbstractType::Reference => "NUMBER(10)".into(),
            AbstractType::BigInt => "NUMBER(19)".into(),
            AbstractType::SmallInt => "NUMBER(5)".into(),
            AbstractType::TinyInt => "NUMBER(3)".into(),
            AbstractType::Decimal => {
                let (p, s) = decimal_params(self, spec)?;
                format!("NUMBER({},{})", p, s)
            }
            AbstractType::Float => "BINARY_FLOAT".into(),
            AbstractType::Double => "BINARY_DOUBLE".into(),
            AbstractType::Money => "NUMBER(19,4)".into(),
            AbstractType::Boolean => "NUMBER(1)".into(),
            AbstractType::Datetime => "TIMESTAMP".into(),
            AbstractType::Timestamp => "TIMESTAMP WITH TIME ZONE".into(),
            AbstractType::Date => "DATE".into(),
            AbstractType::Time => {
                return Err(AppError::Validation("oracle has no TIME column type; use datetime".into()))
            }
            AbstractType::Binary => "BLOB".into(),
        })
    }

    fn now_expr(&self) -> &'static str {
        "SYSTIMESTAMP"
    }

    fn paginate(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut s = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(n) = limit {
            s.push_str(&format!(" FETCH NEXT {} ROWS ONLY", n));
        }
        s
    }

    fn add_column(&self, table: &str, column_def: &str) -> String {
        format!("ALTER TABLE {} ADD ({})", table, column_def)
    }

    fn empty_insert(&self, table: &str, pk: Option<&str>) -> String {
        match pk {
            Some(pk) => format!("INSERT INTO {} ({}) VALUES (DEFAULT)", table, pk),
            None => format!("INSERT INTO {} VALUES (DEFAULT)", table),
        }
    }

    /// NUMBER is classified by precision: (1) boolean, ≤10 integer, ≤19 bigint, otherwise decimal.
    fn classify(&self, native: &str, precision: Option<u32>, scale: Option<u32>) -> AbstractType {
        let t = native.trim().to_uppercase();
        if t == "NUMBER" && scale.unwrap_or(0) == 0 {
            return match precision {
                Some(1) => AbstractType::Boolean,
                Some(p) if p <= 10 => AbstractType::Integer,
                Some(p) if p <= 19 => AbstractType::BigInt,
                _ => AbstractType::Decimal,
            };
        }
        classify_native(&t)
    }

    fn list_tables_sql(&self) -> String {
        "SELECT TABLE_NAME AS table_name FROM USER_TABLES".into()
    }

    fn columns_sql(&self) -> String {
        "SELECT c.COLUMN_NAME AS column_name, c.DATA_TYPE AS data_type, \
                CASE WHEN c.NULLABLE = 'Y' THEN 'YES' ELSE 'NO' END AS is_nullable, \
                CAST(NULL AS VARCHAR2(1)) AS column_default, \
                c.CHAR_LENGTH AS max_length, c.DATA_PRECISION AS num_precision, c.DATA_SCALE AS num_scale, \
                CASE WHEN EXISTS ( \
                    SELECT 1 FROM USER_CONSTRAINTS uc \
                    JOIN USER_CONS_COLUMNS ucc ON ucc.CONSTRAINT_NAME = uc.CONSTRAINT_NAME \
                    WHERE uc.CONSTRAINT_TYPE = 'P' AND uc.TABLE_NAME = c.TABLE_NAME \
                      AND ucc.COLUMN_NAME = c.COLUMN_NAME \
                ) THEN 1 ELSE 0 END AS is_primary_key, \
                CASE WHEN c.IDENTITY_COLUMN = 'YES' THEN 1 ELSE 0 END AS auto_increment \
         FROM USER_TAB_COLUMNS c WHERE c.TABLE_NAME = :1 ORDER BY c.COLUMN_ID"
            .into()
    }

    fn foreign_keys_sql(&self) -> String {
        "SELECT a.COLUMN_NAME AS column_name, pk.TABLE_NAME AS ref_table, b.COLUMN_NAME AS ref_column \
         FROM USER_CONS_COLUMNS a \
         JOIN USER_CONSTRAINTS c ON a.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
         JOIN USER_CONSTRAINTS pk ON c.R_CONSTRAINT_NAME = pk.CONSTRAINT_NAME \
         JOIN USER_CONS_COLUMNS b ON b.CONSTRAINT_NAME = pk.CONSTRAINT_NAME AND b.POSITION = a.POSITION \
         WHERE c.CONSTRAINT_TYPE = 'R' AND a.TABLE_NAME = :1"
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_classified_by_precision() {
        let d = OracleDialect;
        assert_eq!(d.classify("NUMBER", Some(1), Some(0)), AbstractType::Boolean);
        assert_eq!(d.classify("NUMBER", Some(10), Some(0)), AbstractType::Integer);
        assert_eq!(d.classify("NUMBER", Some(19), None), AbstractType::BigInt);
        assert_eq!(d.classify("NUMBER", Some(12), Some(2)), AbstractType::Decimal);
        assert_eq!(d.classify("VARCHAR2", None, None), AbstractType::String);
    }

    #[test]
    fn nvarchar_ceiling_is_two_thousand() {
        let mut spec = TypeSpec::of(AbstractType::String).sized(2001);
        spec.multi_byte = true;
        assert!(OracleDialect.native_type(&spec).is_err());
        spec.multi_byte = false;
        assert_eq!(OracleDialect.native_type(&spec).unwrap(), "VARCHAR2(2001)");
    }

    #[test]
    fn placeholders_are_positional() {
        assert_eq!(OracleDialect.placeholder(4), ":4");
        assert_eq!(OracleDialect.paginate(Some(3), None), " OFFSET 0 ROWS FETCH NEXT 3 ROWS ONLY");
    }
}
