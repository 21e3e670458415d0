//! Record codec: caller-supplied JSON object → validated column values for one table.

use super::context::CallerContext;
use crate::config::{AbstractType, AuditFields, FieldDescriptor, TableDescriptor};
use crate::dialect::SqlDialect;
use crate::error::AppError;
use crate::sql::{BindValue, ColumnValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

/// Columns to write, in table order.
pub type ParsedRecord = Vec<(String, ColumnValue)>;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

fn lookup<'a>(raw: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    raw.get(name)
        .or_else(|| raw.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
}

/// Validate and normalize `raw` against `table`.
///
/// Keys matching no field are ignored, auto-increment columns are never written, and the audit fields
/// are filled from `ctx` and the server clock rather than from input.
pub fn parse_record(
    raw: &Map<String, Value>,
    table: &TableDescriptor,
    for_update: bool,
    ctx: &CallerContext,
    d: &dyn SqlDialect,
    audit: &AuditFields,
) -> Result<ParsedRecord, AppError> {
    let mut out = Vec::new();
    for field in &table.field {
        if field.auto_increment || (for_update && field.is_primary_key) {
            continue;
        }
        let name = field.name.as_str();
        if name.eq_ignore_ascii_case(&audit.created_date) {
            if !for_update {
                out.push((field.name.clone(), ColumnValue::ServerExpr(d.now_expr())));
            }
            continue;
        }
        if name.eq_ignore_ascii_case(&audit.last_modified_date) {
            out.push((field.name.clone(), ColumnValue::ServerExpr(d.now_expr())));
            continue;
        }
        if name.eq_ignore_ascii_case(&audit.created_by_id) {
            if let (false, Some(uid)) = (for_update, ctx.user_id) {
                out.push((field.name.clone(), ColumnValue::Bind(BindValue::I64(uid))));
            }
            continue;
        }
        if name.eq_ignore_ascii_case(&audit.last_modified_by_id) {
            if let Some(uid) = ctx.user_id {
                out.push((field.name.clone(), ColumnValue::Bind(BindValue::I64(uid))));
            }
            continue;
        }

        match lookup(raw, name) {
            None => {
                if !for_update && field.required {
                    return Err(AppError::Validation(format!("field '{}' is required", name)));
                }
            }
            Some(Value::Null) => {
                if !field.allow_null {
                    return Err(AppError::Validation(format!("field '{}' cannot be null", name)));
                }
                if for_update || field.default.is_none() {
                    out.push((field.name.clone(), ColumnValue::Bind(BindValue::Null)));
                }
            }
            Some(v) => out.push((field.name.clone(), ColumnValue::Bind(coerce(field, v)?))),
        }
    }
    Ok(out)
}

fn type_error(field: &FieldDescriptor, v: &Value) -> AppError {
    AppError::Validation(format!(
        "field '{}' expects {}, got {}",
        field.name,
        field.abstract_type.as_str(),
        v
    ))
}

/// Coerce one non-null value to the field's abstract type.
pub fn coerce(field: &FieldDescriptor, v: &Value) -> Result<BindValue, AppError> {
    let t = field.abstract_type;
    if t.is_integer() {
        return coerce_integer(field, v).map(BindValue::I64);
    }
    match t {
        AbstractType::Decimal | AbstractType::Money => match v {
            Value::Number(n) => Ok(BindValue::Text(n.to_string())),
            Value::String(s) if parse_finite(s).is_some() => Ok(BindValue::Text(s.trim().to_string())),
            _ => Err(type_error(field, v)),
        },
        AbstractType::Float | AbstractType::Double => match v {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(BindValue::F64).ok_or_else(|| type_error(field, v)),
            Value::String(s) => parse_finite(s).map(BindValue::F64).ok_or_else(|| type_error(field, v)),
            _ => Err(type_error(field, v)),
        },
        AbstractType::Boolean => coerce_bool(v).map(BindValue::Bool).ok_or_else(|| type_error(field, v)),
        AbstractType::Datetime | AbstractType::Timestamp => coerce_datetime(v)
            .map(|dt| BindValue::Text(dt.format(DATETIME_FMT).to_string()))
            .ok_or_else(|| type_error(field, v)),
        AbstractType::Date => coerce_date(v)
            .map(|dt| BindValue::Text(dt.format(DATE_FMT).to_string()))
            .ok_or_else(|| type_error(field, v)),
        AbstractType::Time => coerce_time(v)
            .map(|t| BindValue::Text(t.format(TIME_FMT).to_string()))
            .ok_or_else(|| type_error(field, v)),
        AbstractType::Binary => match v {
            Value::String(s) => Ok(BindValue::Bytes(s.clone().into_bytes())),
            Value::Array(items) => items
                .iter()
                .map(|i| i.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(BindValue::Bytes)
                .ok_or_else(|| type_error(field, v)),
            _ => Err(type_error(field, v)),
        },
        AbstractType::MultiPicklist => {
            let joined = match v {
                Value::Array(items) => items.iter().map(scalar_string).collect::<Option<Vec<_>>>().map(|p| p.join(",")),
                other => scalar_string(other),
            };
            let s = joined.ok_or_else(|| type_error(field, v))?;
            check_length(field, s).map(BindValue::Text)
        }
        _ => {
            let s = scalar_string(v).ok_or_else(|| type_error(field, v))?;
            check_length(field, s).map(BindValue::Text)
        }
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn check_length(field: &FieldDescriptor, s: String) -> Result<String, AppError> {
    match field.size {
        Some(max) if s.chars().count() > max as usize => Err(AppError::Validation(format!(
            "field '{}' exceeds maximum length {}",
            field.name, max
        ))),
        _ => Ok(s),
    }
}

/// `NaN` and the infinities parse as `f64` but no engine stores them.
fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn coerce_integer(field: &FieldDescriptor, v: &Value) -> Result<i64, AppError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64).map(|f| f as i64))
            .ok_or_else(|| type_error(field, v)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| type_error(field, v)),
        _ => Err(type_error(field, v)),
    }
}

fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_datetime(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)).map(|dt| dt.naive_utc()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_utc());
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt);
                }
            }
            NaiveDate::parse_from_str(s, DATE_FMT).ok().and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        _ => None,
    }
}

fn coerce_date(v: &Value) -> Option<NaiveDate> {
    if let Value::String(s) = v {
        if let Ok(d) = NaiveDate::parse_from_str(s.trim(), DATE_FMT) {
            return Some(d);
        }
    }
    coerce_datetime(v).map(|dt| dt.date())
}

fn coerce_time(v: &Value) -> Option<NaiveTime> {
    let Value::String(s) = v else {
        return None;
    };
    let s = s.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use serde_json::json;

    fn field(name: &str, t: AbstractType) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            label: name.into(),
            size: None,
            precision: None,
            scale: None,
            default: None,
            required: false,
            allow_null: true,
            abstract_type: t,
            db_type: String::new(),
            auto_increment: false,
            is_primary_key: false,
            is_foreign_key: false,
            ref_table: None,
            ref_fields: None,
            supports_multibyte: false,
            picklist: Vec::new(),
        }
    }

    fn table() -> TableDescriptor {
        let mut id = field("id", AbstractType::Id);
        id.auto_increment = true;
        id.is_primary_key = true;
        id.allow_null = false;
        let mut name = field("name", AbstractType::String);
        name.allow_null = false;
        name.size = Some(5);
        name.derive_required();
        let mut status = field("status", AbstractType::String);
        status.default = Some("'open'".into());
        TableDescriptor {
            name: "todo".into(),
            label: "Todo".into(),
            plural: "Todos".into(),
            primary_key: Some("id".into()),
            field: vec![
                id,
                name,
                status,
                field("done", AbstractType::Boolean),
                field("created_date", AbstractType::Datetime),
                field("last_modified_date", AbstractType::Datetime),
                field("created_by_id", AbstractType::Integer),
                field("last_modified_by_id", AbstractType::Integer),
            ],
            children: Vec::new(),
        }
    }

    fn parse(raw: Value, for_update: bool, ctx: CallerContext) -> Result<ParsedRecord, AppError> {
        let map = raw.as_object().cloned().unwrap();
        parse_record(&map, &table(), for_update, &ctx, Dialect::Sqlite.rules(), &AuditFields::default())
    }

    fn names(r: &ParsedRecord) -> Vec<&str> {
        r.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn create_fills_audit_fields_and_drops_auto_increment() {
        let r = parse(json!({"ID": 9, "Name": "a", "junk": 1}), false, CallerContext::user(7)).unwrap();
        assert_eq!(
            names(&r),
            vec!["name", "created_date", "last_modified_date", "created_by_id", "last_modified_by_id"]
        );
        assert_eq!(r[1].1, ColumnValue::ServerExpr("CURRENT_TIMESTAMP"));
        assert_eq!(r[3].1, ColumnValue::Bind(BindValue::I64(7)));
    }

    #[test]
    fn update_skips_created_fields_and_missing_required() {
        let r = parse(json!({"done": "yes", "created_by_id": 3}), true, CallerContext::user(7)).unwrap();
        assert_eq!(names(&r), vec!["done", "last_modified_date", "last_modified_by_id"]);
        assert_eq!(r[0].1, ColumnValue::Bind(BindValue::Bool(true)));
    }

    #[test]
    fn anonymous_caller_skips_user_fields() {
        let r = parse(json!({"name": "a"}), false, CallerContext::anonymous()).unwrap();
        assert_eq!(names(&r), vec!["name", "created_date", "last_modified_date"]);
    }

    #[test]
    fn required_and_null_rules() {
        assert!(parse(json!({}), false, CallerContext::anonymous()).is_err());
        assert!(parse(json!({"name": null}), true, CallerContext::anonymous()).is_err());
        let r = parse(json!({"name": "a", "status": null}), false, CallerContext::anonymous()).unwrap();
        assert!(!names(&r).contains(&"status"));
        let r = parse(json!({"status": null}), true, CallerContext::anonymous()).unwrap();
        assert_eq!(r[0], ("status".to_string(), ColumnValue::Bind(BindValue::Null)));
    }

    #[test]
    fn string_length_checked() {
        let err = parse(json!({"name": "toolong"}), false, CallerContext::anonymous()).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("maximum length")));
    }

    #[test]
    fn integer_coercion_is_strict() {
        let f = field("n", AbstractType::Integer);
        assert_eq!(coerce(&f, &json!("42")).unwrap(), BindValue::I64(42));
        assert_eq!(coerce(&f, &json!(3.0)).unwrap(), BindValue::I64(3));
        assert!(coerce(&f, &json!(3.5)).is_err());
        assert!(coerce(&f, &json!("4x")).is_err());
        assert!(coerce(&f, &json!(true)).is_err());
    }

    #[test]
    fn temporal_values_normalized() {
        let dt = field("at", AbstractType::Datetime);
        assert_eq!(
            coerce(&dt, &json!("2024-03-01T10:20:30Z")).unwrap(),
            BindValue::Text("2024-03-01 10:20:30".into())
        );
        assert_eq!(coerce(&dt, &json!("2024-03-01")).unwrap(), BindValue::Text("2024-03-01 00:00:00".into()));
        assert!(coerce(&dt, &json!("yesterday")).is_err());
        let d = field("on", AbstractType::Date);
        assert_eq!(coerce(&d, &json!("2024-03-01 10:00:00")).unwrap(), BindValue::Text("2024-03-01".into()));
        let t = field("t", AbstractType::Time);
        assert_eq!(coerce(&t, &json!("07:05")).unwrap(), BindValue::Text("07:05:00".into()));
    }

    #[test]
    fn decimals_kept_verbatim_and_multipicklist_joined() {
        let f = field("price", AbstractType::Decimal);
        assert_eq!(coerce(&f, &json!("12.50")).unwrap(), BindValue::Text("12.50".into()));
        assert!(coerce(&f, &json!({"a": 1})).is_err());
        let m = field("tags", AbstractType::MultiPicklist);
        assert_eq!(coerce(&m, &json!(["a", "b"])).unwrap(), BindValue::Text("a,b".into()));
        let s = field("s", AbstractType::String);
        assert!(coerce(&s, &json!(["a"])).is_err());
        assert_eq!(coerce(&s, &json!(12)).unwrap(), BindValue::Text("12".into()));
    }

    #[test]
    fn non_finite_numbers_rejected() {
        let dec = field("price", AbstractType::Decimal);
        let flt = field("ratio", AbstractType::Double);
        for bad in ["NaN", "inf", "-infinity", " Infinity "] {
            assert!(coerce(&dec, &json!(bad)).is_err(), "decimal accepted {bad}");
            assert!(coerce(&flt, &json!(bad)).is_err(), "double accepted {bad}");
        }
        assert_eq!(coerce(&flt, &json!("1.5")).unwrap(), BindValue::F64(1.5));
        assert_eq!(coerce(&dec, &json!(" 2.25 ")).unwrap(), BindValue::Text("2.25".into()));
    }
}
