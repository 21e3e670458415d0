//! Resolved table model: catalog columns classified into dialect-independent descriptors.

use crate::error::AppError;
use serde::Serialize;
use std::str::FromStr;

/// Dialect-independent column classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbstractType {
    Id,
    Reference,
    String,
    Text,
    Integer,
    BigInt,
    SmallInt,
    TinyInt,
    Decimal,
    Float,
    Double,
    Money,
    Boolean,
    Datetime,
    Timestamp,
    Date,
    Time,
    Picklist,
    MultiPicklist,
    Binary,
}

impl AbstractType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            AbstractType::Id
                | AbstractType::Reference
                | AbstractType::Integer
                | AbstractType::BigInt
                | AbstractType::SmallInt
                | AbstractType::TinyInt
        )
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            AbstractType::String | AbstractType::Text | AbstractType::Picklist | AbstractType::MultiPicklist
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            AbstractType::Datetime | AbstractType::Timestamp | AbstractType::Date | AbstractType::Time
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AbstractType::Id => "id",
            AbstractType::Reference => "reference",
            AbstractType::String => "string",
            AbstractType::Text => "text",
            AbstractType::Integer => "integer",
            AbstractType::BigInt => "bigint",
            AbstractType::SmallInt => "smallint",
            AbstractType::TinyInt => "tinyint",
            AbstractType::Decimal => "decimal",
            AbstractType::Float => "float",
            AbstractType::Double => "double",
            AbstractType::Money => "money",
            AbstractType::Boolean => "boolean",
            AbstractType::Datetime => "datetime",
            AbstractType::Timestamp => "timestamp",
            AbstractType::Date => "date",
            AbstractType::Time => "time",
            AbstractType::Picklist => "picklist",
            AbstractType::MultiPicklist => "multipicklist",
            AbstractType::Binary => "binary",
        }
    }
}

impl FromStr for AbstractType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "id" | "pk" => AbstractType::Id,
            "reference" | "ref" | "fk" => AbstractType::Reference,
            "string" | "varchar" | "char" => AbstractType::String,
            "text" => AbstractType::Text,
            "integer" | "int" => AbstractType::Integer,
            "bigint" => AbstractType::BigInt,
            "smallint" => AbstractType::SmallInt,
            "tinyint" => AbstractType::TinyInt,
            "decimal" | "numeric" => AbstractType::Decimal,
            "float" | "real" => AbstractType::Float,
            "double" => AbstractType::Double,
            "money" => AbstractType::Money,
            "boolean" | "bool" => AbstractType::Boolean,
            "datetime" => AbstractType::Datetime,
            "timestamp" => AbstractType::Timestamp,
            "date" => AbstractType::Date,
            "time" => AbstractType::Time,
            "picklist" => AbstractType::Picklist,
            "multipicklist" => AbstractType::MultiPicklist,
            "binary" | "blob" => AbstractType::Binary,
            other => return Err(AppError::Validation(format!("unknown field type '{}'", other))),
        })
    }
}

/// One column of a live table.
#[derive(Clone, Debug, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    pub default: Option<String>,
    pub required: bool,
    pub allow_null: bool,
    #[serde(rename = "type")]
    pub abstract_type: AbstractType,
    pub db_type: String,
    pub auto_increment: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_fields: Option<String>,
    pub supports_multibyte: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub picklist: Vec<String>,
}

impl FieldDescriptor {
    /// `required` is never stored; it follows from nullability, default and auto-increment.
    pub fn derive_required(&mut self) {
        self.required = !self.allow_null && self.default.is_none() && !self.auto_increment;
    }
}

/// A table whose foreign key references the described table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChildRelation {
    pub table: String,
    pub field: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub label: String,
    pub plural: String,
    pub primary_key: Option<String>,
    pub field: Vec<FieldDescriptor>,
    pub children: Vec<ChildRelation>,
}

impl TableDescriptor {
    /// Case-insensitive field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.field.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn primary_key_field(&self) -> Result<&FieldDescriptor, AppError> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.field(pk))
            .ok_or_else(|| AppError::Validation(format!("table '{}' has no primary key", self.name)))
    }

    /// Resolves a caller-given field name to the catalog's spelling; unknown names are rejected.
    pub fn resolve_field(&self, name: &str) -> Result<&FieldDescriptor, AppError> {
        self.field(name.trim()).ok_or_else(|| {
            AppError::Validation(format!("field '{}' not found in table '{}'", name.trim(), self.name))
        })
    }
}
