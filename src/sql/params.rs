//! Driver-neutral bind values for sqlx's `Any` backend.

use crate::error::AppError;
use serde_json::Value;
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

pub type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// A value that can be bound to any supported backend. Converts from serde_json::Value.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl BindValue {
    /// Scalar JSON to bind value; arrays and objects are rejected.
    pub fn from_json(v: &Value) -> Result<Self, AppError> {
        Ok(match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    BindValue::F64(f)
                } else {
                    BindValue::Text(n.to_string())
                }
            }
            Value::String(s) => BindValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::Validation(format!("cannot bind non-scalar value {}", v)))
            }
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    pub fn bind<'q>(&self, q: AnyQuery<'q>) -> AnyQuery<'q> {
        match self {
            BindValue::Null => q.bind(None::<String>),
            BindValue::Bool(b) => q.bind(*b),
            BindValue::I64(n) => q.bind(*n),
            BindValue::F64(n) => q.bind(*n),
            BindValue::Text(s) => q.bind(s.clone()),
            BindValue::Bytes(b) => q.bind(b.clone()),
        }
    }
}

/// One column of an INSERT/UPDATE: a bound value or a server-side expression such as the dialect's "now".
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    Bind(BindValue),
    ServerExpr(&'static str),
}

/// Bind every parameter in order.
pub fn bind_all<'q>(mut q: AnyQuery<'q>, params: &[BindValue]) -> AnyQuery<'q> {
    for p in params {
        q = p.bind(q);
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_scalars() {
        assert_eq!(BindValue::from_json(&json!(null)).unwrap(), BindValue::Null);
        assert_eq!(BindValue::from_json(&json!(7)).unwrap(), BindValue::I64(7));
        assert_eq!(BindValue::from_json(&json!(1.5)).unwrap(), BindValue::F64(1.5));
        assert_eq!(BindValue::from_json(&json!("x")).unwrap(), BindValue::Text("x".into()));
        assert!(BindValue::from_json(&json!([1])).is_err());
    }
}
