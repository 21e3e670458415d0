//! Schema definition validation: identifiers, duplicate fields, reference targets.

use crate::config::{AbstractType, FieldSchema, TableSchema};
use crate::error::AppError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Prefix reserved for the engine's own metadata tables.
pub const RESERVED_PREFIX: &str = "_sys_";

const MAX_IDENTIFIER_LEN: usize = 64;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier pattern"))
}

pub fn validate_identifier(kind: &str, name: &str) -> Result<(), AppError> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "{} name '{}' exceeds {} characters",
            kind, name, MAX_IDENTIFIER_LEN
        )));
    }
    if !identifier_re().is_match(name) {
        return Err(AppError::Validation(format!("invalid {} name '{}'", kind, name)));
    }
    Ok(())
}

pub fn is_reserved_table(name: &str) -> bool {
    name.to_lowercase().starts_with(RESERVED_PREFIX)
}

/// Abstract type of a submitted field. A bare `id` field with no type is the primary key.
pub fn field_abstract_type(field: &FieldSchema) -> Result<Option<AbstractType>, AppError> {
    match field.type_.as_deref() {
        Some(t) if !t.trim().is_empty() => t.parse().map(Some),
        _ if field.db_type.is_some() => Ok(None),
        _ if field.name.eq_ignore_ascii_case("id") => Ok(Some(AbstractType::Id)),
        _ => Err(AppError::Validation(format!(
            "field '{}' requires a type or db_type",
            field.name
        ))),
    }
}

/// Validate a definition. `creating` requires at least one field; `internal` permits the reserved prefix.
pub fn validate_table_schema(def: &TableSchema, creating: bool, internal: bool) -> Result<(), AppError> {
    validate_identifier("table", &def.name)?;
    if !internal && is_reserved_table(&def.name) {
        return Err(AppError::Validation(format!(
            "table name '{}' uses the reserved prefix '{}'",
            def.name, RESERVED_PREFIX
        )));
    }
    if creating && def.field.is_empty() {
        return Err(AppError::Validation(format!("table '{}' has no fields", def.name)));
    }
    let mut seen = HashSet::new();
    for f in &def.field {
        validate_identifier("field", &f.name)?;
        if !seen.insert(f.name.to_lowercase()) {
            return Err(AppError::Validation(format!(
                "duplicate field '{}' in table '{}'",
                f.name, def.name
            )));
        }
        if field_abstract_type(f)? == Some(AbstractType::Reference) {
            let target = f.ref_table.as_deref().unwrap_or("");
            if target.is_empty() {
                return Err(AppError::Validation(format!(
                    "reference field '{}' requires ref_table",
                    f.name
                )));
            }
            validate_identifier("table", target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, fields: Vec<FieldSchema>) -> TableSchema {
        TableSchema { name: name.into(), label: None, plural: None, field: fields }
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(validate_identifier("table", "orders").is_ok());
        assert!(validate_identifier("table", "1orders").is_err());
        assert!(validate_identifier("table", "drop table;").is_err());
        assert!(validate_identifier("table", &"a".repeat(65)).is_err());
    }

    #[test]
    fn rejects_reserved_and_duplicates() {
        let t = table("_sys_labels", vec![FieldSchema::new("id", "id")]);
        assert!(validate_table_schema(&t, true, false).is_err());
        assert!(validate_table_schema(&t, true, true).is_ok());

        let t = table("t", vec![FieldSchema::new("Name", "string"), FieldSchema::new("name", "text")]);
        assert!(matches!(validate_table_schema(&t, true, false), Err(AppError::Validation(_))));
    }

    #[test]
    fn reference_requires_target() {
        let t = table("t", vec![FieldSchema::new("owner_id", "reference")]);
        assert!(validate_table_schema(&t, true, false).is_err());
        let t = table("t", vec![FieldSchema::new("owner_id", "reference").references("owner")]);
        assert!(validate_table_schema(&t, true, false).is_ok());
    }

    #[test]
    fn untyped_id_is_primary_key() {
        let mut f = FieldSchema::new("id", "id");
        f.type_ = None;
        assert_eq!(field_abstract_type(&f).unwrap(), Some(AbstractType::Id));
        let mut g = FieldSchema::new("other", "id");
        g.type_ = None;
        assert!(field_abstract_type(&g).is_err());
    }

    #[test]
    fn empty_create_is_rejected_but_empty_update_is_not() {
        let t = table("t", vec![]);
        assert!(validate_table_schema(&t, true, false).is_err());
        assert!(validate_table_schema(&t, false, false).is_ok());
    }
}
