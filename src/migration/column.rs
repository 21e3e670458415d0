//! Column clause construction: abstract field definition → dialect column type and suffix.

use crate::config::{field_abstract_type, AbstractType, DefaultValue, FieldSchema};
use crate::dialect::{SqlDialect, TypeSpec};
use crate::error::AppError;
use serde_json::Value;

/// Column type clause for `field`, without the column name.
///
/// A raw `db_type` is returned unchanged. `timestamp_used` tracks the single timestamp column allowed
/// per build pass; later `timestamp` fields are emitted as the dialect's datetime type.
pub fn build_column_type(d: &dyn SqlDialect, field: &FieldSchema, timestamp_used: &mut bool) -> Result<String, AppError> {
    if let Some(raw) = field.db_type.as_deref().filter(|s| !s.trim().is_empty()) {
        return Ok(raw.trim().to_string());
    }
    let mut kind = match field_abstract_type(field)? {
        Some(k) => k,
        None => return Err(AppError::Validation(format!("field '{}' has no type", field.name))),
    };
    if kind == AbstractType::Id {
        return Ok(d.pk_shorthand().to_string());
    }
    if kind == AbstractType::Timestamp {
        if *timestamp_used {
            kind = AbstractType::Datetime;
        } else {
            *timestamp_used = true;
        }
    }
    let spec = TypeSpec {
        kind,
        size: field.size,
        precision: field.precision,
        scale: field.scale,
        fixed_length: field.fixed_length,
        multi_byte: field.supports_multibyte,
    };
    let mut clause = d.native_type(&spec)?;
    if !field.allow_null {
        clause.push_str(" NOT NULL");
    } else if let Some(default) = &field.default {
        clause.push_str(" DEFAULT ");
        clause.push_str(&default_sql(d, default)?);
    } else if field.is_primary_key {
        clause.push_str(" PRIMARY KEY");
    }
    Ok(clause)
}

/// `"name" <type clause>`.
pub fn column_definition(d: &dyn SqlDialect, field: &FieldSchema, timestamp_used: &mut bool) -> Result<String, AppError> {
    Ok(format!("{} {}", d.quote_ident(&field.name), build_column_type(d, field, timestamp_used)?))
}

fn default_sql(d: &dyn SqlDialect, default: &DefaultValue) -> Result<String, AppError> {
    Ok(match default {
        DefaultValue::Expression { expression } => expression.clone(),
        DefaultValue::Literal(Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
        DefaultValue::Literal(Value::Number(n)) => n.to_string(),
        DefaultValue::Literal(Value::Bool(b)) => d.bool_literal(*b).to_string(),
        DefaultValue::Literal(Value::Null) => "NULL".into(),
        DefaultValue::Literal(other) => {
            return Err(AppError::Validation(format!("unsupported default value {}", other)))
        }
    })
}
