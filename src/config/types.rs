//! Abstract schema definitions as submitted by callers (`{name, label, plural, field: [...]}`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default, alias = "fields")]
    pub field: Vec<FieldSchema>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    /// Raw native column definition; bypasses type mapping entirely.
    #[serde(default, alias = "sql_type")]
    pub db_type: Option<String>,
    #[serde(default, alias = "length")]
    pub size: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default = "default_true")]
    pub allow_null: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub fixed_length: bool,
    #[serde(default)]
    pub supports_multibyte: bool,
    #[serde(default)]
    pub ref_table: Option<String>,
    #[serde(default)]
    pub ref_fields: Option<String>,
    /// Picklist values; kept as label metadata only.
    #[serde(default, alias = "values", deserialize_with = "picklist_values")]
    pub value: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl FieldSchema {
    /// Minimal field with only a name and abstract type; everything else defaulted.
    pub fn new(name: &str, type_: &str) -> Self {
        FieldSchema {
            name: name.to_string(),
            label: None,
            type_: Some(type_.to_string()),
            db_type: None,
            size: None,
            precision: None,
            scale: None,
            default: None,
            allow_null: true,
            is_primary_key: false,
            fixed_length: false,
            supports_multibyte: false,
            ref_table: None,
            ref_fields: None,
            value: Vec::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn sized(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn references(mut self, table: &str) -> Self {
        self.ref_table = Some(table.to_string());
        self
    }
}

/// Column default: a literal value, or a raw SQL expression (`{ "expression": "..." }`).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for DefaultValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        match v {
            Value::Object(mut obj) => {
                if let Some(Value::String(s)) = obj.remove("expression") {
                    return Ok(DefaultValue::Expression { expression: s });
                }
                if let Some(lit) = obj.remove("value").or_else(|| obj.remove("literal")) {
                    if !lit.is_object() && !lit.is_array() {
                        return Ok(DefaultValue::Literal(lit));
                    }
                }
                Err(serde::de::Error::custom(format!(
                    "field default must be a scalar, {{ \"expression\": \"...\" }}, or {{ \"value\": ... }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            Value::Array(_) => Err(serde::de::Error::custom("field default must not be an array")),
            scalar => Ok(DefaultValue::Literal(scalar)),
        }
    }
}

fn picklist_values<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_field_with_aliases() {
        let f: FieldSchema = serde_json::from_value(json!({
            "name": "status",
            "type": "picklist",
            "length": 20,
            "allow_null": false,
            "default": "open",
            "values": ["open", "closed", 3]
        }))
        .unwrap();
        assert_eq!(f.size, Some(20));
        assert!(!f.allow_null);
        assert_eq!(f.default, Some(DefaultValue::Literal(json!("open"))));
        assert_eq!(f.value, vec!["open", "closed", "3"]);
    }

    #[test]
    fn default_expression_object() {
        let d: DefaultValue = serde_json::from_value(json!({"expression": "CURRENT_TIMESTAMP"})).unwrap();
        assert_eq!(d, DefaultValue::Expression { expression: "CURRENT_TIMESTAMP".into() });
        assert!(serde_json::from_value::<DefaultValue>(json!({"foo": 1})).is_err());
    }

    #[test]
    fn table_accepts_fields_alias() {
        let t: TableSchema = serde_json::from_value(json!({
            "name": "todo",
            "fields": [{"name": "id", "type": "id"}]
        }))
        .unwrap();
        assert_eq!(t.field.len(), 1);
        assert!(t.field[0].allow_null);
    }
}
