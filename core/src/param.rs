//! Parameter schemas and value coercion.
//!
//! # Design
//! Parameter values are `serde_json::Value`s. [`coerce`] turns whatever the
//! caller (or a matched path segment) supplies into the schema's type using
//! loose scalar conversions: non-numeric text becomes `0`, empty text and
//! `"0"` are false. Only range and enum constraints reject a value. The same
//! function is applied to outbound values and to values read back from a
//! URI, so a value survives a set/get cycle in its coerced form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    #[serde(alias = "number")]
    Float,
    Boolean,
    Array,
}

/// Where a parameter ends up in the outgoing request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// A regex capture in the route path.
    Uri,
    /// The query string. Only meaningful for non-GET methods; GET requests
    /// send all their parameters in the query string anyway.
    Query,
    /// Request body (or query string for GET).
    #[default]
    Body,
    /// A `{placeholder}` in the structure's base URI.
    Base,
}

/// Element schema for array parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsSchema {
    #[serde(rename = "type")]
    pub item_type: ParamType,
}

/// Schema of a single parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSchema {
    pub required: bool,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub default: Option<Value>,
    /// Allowed values; only enforced for string parameters, and only when
    /// non-empty.
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub items: Option<ItemsSchema>,
    pub location: ParamLocation,
    /// Internal parameters are never reported as missing.
    pub internal: bool,
}

/// Ordered parameter table, keyed by parameter name.
pub type ParamMap = IndexMap<String, ParamSchema>;

impl ParamSchema {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, minimum: Option<i64>, maximum: Option<i64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_items(mut self, item_type: ParamType) -> Self {
        self.items = Some(ItemsSchema { item_type });
        self
    }

    pub fn at(mut self, location: ParamLocation) -> Self {
        self.location = location;
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn items_type(&self) -> Option<ParamType> {
        self.items.map(|items| items.item_type)
    }

    pub fn is_primary(&self) -> bool {
        self.location == ParamLocation::Uri
    }

    /// The declared default, with an explicit JSON `null` treated as unset.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref().filter(|value| !value.is_null())
    }
}

/// Coerces `value` into the type declared by `schema`.
///
/// Fails only on range violations (integers), enum violations (strings),
/// or a list/map given for a string parameter.
pub fn coerce(name: &str, value: Value, schema: &ParamSchema) -> Result<Value, ValidationError> {
    match schema.param_type {
        ParamType::Boolean => Ok(Value::Bool(to_bool(&value))),
        ParamType::Float => Ok(float_value(to_float(&value))),
        ParamType::Integer => {
            let number = to_int(&value);
            if let Some(minimum) = schema.minimum {
                if number < minimum {
                    return Err(ValidationError::BelowMinimum {
                        param: name.to_string(),
                        value: number,
                        minimum,
                    });
                }
            }
            if let Some(maximum) = schema.maximum {
                if number > maximum {
                    return Err(ValidationError::AboveMaximum {
                        param: name.to_string(),
                        value: number,
                        maximum,
                    });
                }
            }
            Ok(Value::from(number))
        }
        ParamType::String => {
            let text = to_string(name, &value)?;
            if !schema.enum_values.is_empty() && !schema.enum_values.contains(&text) {
                return Err(ValidationError::NotInEnum {
                    param: name.to_string(),
                    value: text,
                    allowed: schema.enum_values.clone(),
                });
            }
            Ok(Value::String(text))
        }
        ParamType::Array => {
            let items = to_array(value);
            let items = match schema.items_type() {
                Some(item_type) => items
                    .into_iter()
                    .map(|item| coerce_scalar(name, item, item_type))
                    .collect::<Result<Vec<_>, _>>()?,
                None => items,
            };
            Ok(Value::Array(items))
        }
    }
}

/// Element conversion for arrays: type only, no enum or range checks.
fn coerce_scalar(name: &str, value: Value, item_type: ParamType) -> Result<Value, ValidationError> {
    Ok(match item_type {
        ParamType::Boolean => Value::Bool(to_bool(&value)),
        ParamType::Float => float_value(to_float(&value)),
        ParamType::Integer => Value::from(to_int(&value)),
        ParamType::String => Value::String(to_string(name, &value)?),
        ParamType::Array => Value::Array(to_array(value)),
    })
}

pub(crate) fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn to_float(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => numeric_prefix(s).parse().unwrap_or(0.0),
        Value::Array(items) => f64::from(u8::from(!items.is_empty())),
        Value::Object(map) => f64::from(u8::from(!map.is_empty())),
    }
}

pub(crate) fn to_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => n.as_f64().map_or(0, |f| f.trunc() as i64),
        },
        Value::String(s) => {
            let prefix = numeric_prefix(s);
            if prefix.contains(['.', 'e', 'E']) {
                prefix.parse::<f64>().map_or(0, |f| f.trunc() as i64)
            } else {
                prefix
                    .parse::<i64>()
                    .or_else(|_| prefix.parse::<f64>().map(|f| f as i64))
                    .unwrap_or(0)
            }
        }
        other => to_float(other) as i64,
    }
}

fn to_string(name: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(ValidationError::NotScalar {
            param: name.to_string(),
        }),
        scalar => Ok(scalar_to_string(scalar)),
    }
}

fn to_array(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        scalar => vec![scalar],
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or_else(|| Value::from(0), Value::Number)
}

/// Text form of a scalar: `true` is `"1"`, `false` and `null` are empty,
/// whole floats drop their fraction. Lists and maps render as JSON.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            }
        }
        other => other.to_string(),
    }
}

/// Leading numeric part of `s` (after whitespace), or `"0"` if there is none.
fn numeric_prefix(s: &str) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        return "0";
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn int_schema(minimum: Option<i64>, maximum: Option<i64>) -> ParamSchema {
        ParamSchema::new(ParamType::Integer).with_range(minimum, maximum)
    }

    #[test]
    fn integer_within_bounds_coerces() {
        let schema = int_schema(Some(1), Some(100));
        assert_eq!(coerce("n", json!("42"), &schema).unwrap(), json!(42));
        assert_eq!(coerce("n", json!(7.9), &schema).unwrap(), json!(7));
        assert_eq!(coerce("n", json!(1), &schema).unwrap(), json!(1));
        assert_eq!(coerce("n", json!(100), &schema).unwrap(), json!(100));
    }

    #[test]
    fn integer_outside_bounds_fails() {
        let schema = int_schema(Some(1), Some(100));
        let err = coerce("n", json!(0), &schema).unwrap_err();
        assert!(matches!(err, ValidationError::BelowMinimum { value: 0, minimum: 1, .. }));
        let err = coerce("n", json!("101"), &schema).unwrap_err();
        assert!(matches!(err, ValidationError::AboveMaximum { value: 101, maximum: 100, .. }));
        assert!(err.is_range_error());
    }

    #[test]
    fn integer_without_bounds_accepts_anything() {
        let schema = int_schema(None, None);
        assert_eq!(coerce("n", json!(-5000), &schema).unwrap(), json!(-5000));
        assert_eq!(coerce("n", json!("abc"), &schema).unwrap(), json!(0));
        assert_eq!(coerce("n", json!("12abc"), &schema).unwrap(), json!(12));
        assert_eq!(coerce("n", json!(true), &schema).unwrap(), json!(1));
    }

    #[test]
    fn string_enum_membership_is_strict() {
        let schema = ParamSchema::new(ParamType::String).with_enum(["a", "b"]);
        assert_eq!(coerce("name", json!("a"), &schema).unwrap(), json!("a"));
        let err = coerce("name", json!("c"), &schema).unwrap_err();
        assert!(err.is_enum_error());
        assert!(coerce("name", json!("A"), &schema).is_err());
    }

    #[test]
    fn empty_enum_does_not_constrain() {
        let schema = ParamSchema::new(ParamType::String);
        assert_eq!(coerce("s", json!(12), &schema).unwrap(), json!("12"));
        assert_eq!(coerce("s", json!(true), &schema).unwrap(), json!("1"));
        assert_eq!(coerce("s", json!(false), &schema).unwrap(), json!(""));
        assert_eq!(coerce("s", json!(2.5), &schema).unwrap(), json!("2.5"));
    }

    #[test]
    fn string_rejects_lists() {
        let schema = ParamSchema::new(ParamType::String);
        let err = coerce("s", json!(["x"]), &schema).unwrap_err();
        assert_eq!(err, ValidationError::NotScalar { param: "s".to_string() });
    }

    #[test]
    fn boolean_uses_truthiness() {
        let schema = ParamSchema::new(ParamType::Boolean);
        for (raw, expected) in [
            (json!(""), false),
            (json!("0"), false),
            (json!("false"), true),
            (json!(0), false),
            (json!(2), true),
            (json!(null), false),
            (json!([]), false),
            (json!([0]), true),
        ] {
            assert_eq!(coerce("b", raw.clone(), &schema).unwrap(), json!(expected), "{raw}");
        }
    }

    #[test]
    fn float_falls_back_to_zero() {
        let schema = ParamSchema::new(ParamType::Float);
        assert_eq!(coerce("f", json!("1.5"), &schema).unwrap(), json!(1.5));
        assert_eq!(coerce("f", json!("nope"), &schema).unwrap(), json!(0.0));
        assert_eq!(coerce("f", json!(" 2e2x"), &schema).unwrap(), json!(200.0));
    }

    #[test]
    fn array_maps_items_without_constraints() {
        let schema = ParamSchema::new(ParamType::Array).with_items(ParamType::Integer);
        assert_eq!(coerce("ids", json!(["1", "2", 3.7]), &schema).unwrap(), json!([1, 2, 3]));
        assert_eq!(coerce("ids", json!("5"), &schema).unwrap(), json!([5]));
        assert_eq!(coerce("ids", json!(null), &schema).unwrap(), json!([]));

        let untyped = ParamSchema::new(ParamType::Array);
        assert_eq!(coerce("x", json!({"a": 1, "b": "c"}), &untyped).unwrap(), json!([1, "c"]));
    }

    #[test]
    fn coercion_is_idempotent() {
        let schema = int_schema(Some(0), Some(10));
        let once = coerce("n", json!("3"), &schema).unwrap();
        let twice = coerce("n", once.clone(), &schema).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn schema_deserializes_with_defaults() {
        let schema: ParamSchema = serde_json::from_value(json!({
            "type": "number",
            "location": "query",
            "items": {"type": "string"}
        }))
        .unwrap();
        assert_eq!(schema.param_type, ParamType::Float);
        assert_eq!(schema.location, ParamLocation::Query);
        assert_eq!(schema.items_type(), Some(ParamType::String));
        assert!(!schema.required);
        assert!(schema.enum_values.is_empty());
        assert!(schema.default_value().is_none());
    }

    #[test]
    fn scalar_text_forms() {
        assert_eq!(scalar_to_string(&json!(3.0)), "3");
        assert_eq!(scalar_to_string(&json!(-7)), "-7");
        assert_eq!(scalar_to_string(&json!(null)), "");
        assert_eq!(scalar_to_string(&json!(["a"])), r#"["a"]"#);
    }
}
