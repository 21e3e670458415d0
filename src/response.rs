//! Result envelopes for batch operations and retrievals.

use crate::config::TableDescriptor;
use crate::error::{AppError, ErrorBody, ErrorDetail};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// One position of a batch result: the record (or `{name}` for DDL) or its error envelope.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RecordOutcome {
    Ok(Value),
    Err(ErrorBody),
}

impl RecordOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RecordOutcome::Ok(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            RecordOutcome::Ok(v) => Some(v),
            RecordOutcome::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            RecordOutcome::Ok(_) => None,
            RecordOutcome::Err(e) => Some(e),
        }
    }
}

impl From<Result<Value, AppError>> for RecordOutcome {
    fn from(r: Result<Value, AppError>) -> Self {
        match r {
            Ok(v) => RecordOutcome::Ok(v),
            Err(e) => RecordOutcome::Err(e.to_body()),
        }
    }
}

/// Marker placed at the position of an id that matched no row.
pub fn not_found_marker(table: &str, id: &Value) -> RecordOutcome {
    RecordOutcome::Err(ErrorBody {
        error: ErrorDetail {
            code: "not_found".into(),
            message: format!("record {} not found in table '{}'", id, table),
            details: None,
        },
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct RecordMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Arc<TableDescriptor>>,
}

/// Retrieval result; `meta` present only when count or schema were requested.
#[derive(Clone, Debug, Serialize)]
pub struct RecordSet {
    pub data: Vec<RecordOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RecordMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcomes_serialize_untagged() {
        let ok = RecordOutcome::Ok(json!({"id": 1}));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"id": 1}));
        let err: RecordOutcome = Err(AppError::NotFound("x".into())).into();
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"]["code"], "not_found");
    }

    #[test]
    fn marker_names_table_and_id() {
        let m = not_found_marker("todo", &json!(9));
        let body = m.error().unwrap();
        assert_eq!(body.error.code, "not_found");
        assert!(body.error.message.contains("todo"));
    }
}
