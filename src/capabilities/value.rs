//! Typed argument values and the value types a capability schema declares.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// The type of a parameter or a return value in a capability schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

/// Smallest `f64` that converts to `i64` without saturating.
const I64_MIN_F64: f64 = -9_223_372_036_854_775_808.0;
/// First `f64` above `i64::MAX`; the range is exclusive at the top.
const I64_END_F64: f64 = 9_223_372_036_854_775_808.0;

impl ValueType {
    /// JSON schema `type` keyword for this value type.
    pub fn json_schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether a raw JSON value produced by a capability matches this type.
    pub fn matches_json(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// Coerce a loosely typed argument into this type.
    ///
    /// Models frequently send `"2"` for an integer or `"true"` for a boolean,
    /// so those are accepted. Returns `None` when no lossless coercion exists.
    pub fn coerce(&self, value: &ArgValue) -> Option<ArgValue> {
        match (self, value) {
            (Self::String, ArgValue::String(_)) => Some(value.clone()),

            (Self::Integer, ArgValue::Integer(_)) => Some(value.clone()),
            (Self::Integer, ArgValue::Float(f)) => float_to_i64(*f).map(ArgValue::Integer),
            (Self::Integer, ArgValue::String(s)) => {
                s.trim().parse::<i64>().ok().map(ArgValue::Integer)
            }

            (Self::Number, ArgValue::Float(f)) if f.is_finite() => Some(value.clone()),
            (Self::Number, ArgValue::Integer(i)) => Some(ArgValue::Float(*i as f64)),
            (Self::Number, ArgValue::Structured(Value::Number(n))) => {
                n.as_f64().filter(|f| f.is_finite()).map(ArgValue::Float)
            }
            (Self::Number, ArgValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(ArgValue::Float),

            (Self::Boolean, ArgValue::Boolean(_)) => Some(value.clone()),
            (Self::Boolean, ArgValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(ArgValue::Boolean(true)),
                "false" => Some(ArgValue::Boolean(false)),
                _ => None,
            },

            (Self::Object, ArgValue::Structured(v)) if v.is_object() => Some(value.clone()),
            (Self::Array, ArgValue::Structured(v)) if v.is_array() => Some(value.clone()),
            _ => None,
        }
    }
}

/// Integral floats inside the `i64` range only.
fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (I64_MIN_F64..I64_END_F64).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_schema_type())
    }
}

// ---------------------------------------------------------------------------
// ArgValue
// ---------------------------------------------------------------------------

/// A single argument bound by the model in a capability call request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Structured(Value),
}

impl ArgValue {
    /// Convert a JSON value into the matching variant.
    ///
    /// `null` becomes `Structured(Value::Null)`. Integers beyond the `i64`
    /// range stay raw JSON numbers so they never pass as an `Integer`.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match (n.as_i64(), n.is_f64(), n.as_f64()) {
                (Some(i), _, _) => Self::Integer(i),
                (None, true, Some(f)) => Self::Float(f),
                _ => Self::Structured(Value::Number(n)),
            },
            Value::String(s) => Self::String(s),
            other => Self::Structured(other),
        }
    }

    /// Convert back into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    /// Name of the variant's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Structured(Value::Null) => "null",
            Self::Structured(Value::Number(_)) => "out-of-range number",
            Self::Structured(Value::Array(_)) => "array",
            Self::Structured(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Structured(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Named argument bindings for one call.
pub type Arguments = BTreeMap<String, ArgValue>;

/// Convert a JSON object into [`Arguments`].
///
/// Returns `None` when the value is neither an object nor `null`.
pub fn arguments_from_json(value: Value) -> Option<Arguments> {
    match value {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| (k, ArgValue::from_json(v)))
                .collect(),
        ),
        Value::Null => Some(Arguments::new()),
        _ => None,
    }
}

/// Convert [`Arguments`] into a JSON object.
pub fn arguments_to_json(args: &Arguments) -> Value {
    Value::Object(
        args.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_variants() {
        assert_eq!(ArgValue::from_json(json!(true)), ArgValue::Boolean(true));
        assert_eq!(ArgValue::from_json(json!(3)), ArgValue::Integer(3));
        assert_eq!(ArgValue::from_json(json!(1.5)), ArgValue::Float(1.5));
        assert_eq!(ArgValue::from_json(json!("x")), ArgValue::String("x".into()));
        assert_eq!(
            ArgValue::from_json(json!({"a": 1})),
            ArgValue::Structured(json!({"a": 1}))
        );
    }

    #[test]
    fn test_coerce_integer() {
        let t = ValueType::Integer;
        assert_eq!(t.coerce(&ArgValue::Integer(2)), Some(ArgValue::Integer(2)));
        assert_eq!(t.coerce(&ArgValue::String(" 2 ".into())), Some(ArgValue::Integer(2)));
        assert_eq!(t.coerce(&ArgValue::Float(2.0)), Some(ArgValue::Integer(2)));
        assert_eq!(t.coerce(&ArgValue::Float(2.5)), None);
        assert_eq!(t.coerce(&ArgValue::Boolean(true)), None);
        assert_eq!(t.coerce(&ArgValue::String("two".into())), None);
    }

    #[test]
    fn test_coerce_boolean() {
        let t = ValueType::Boolean;
        assert_eq!(t.coerce(&ArgValue::String("TRUE".into())), Some(ArgValue::Boolean(true)));
        assert_eq!(t.coerce(&ArgValue::String("false".into())), Some(ArgValue::Boolean(false)));
        assert_eq!(t.coerce(&ArgValue::Integer(1)), None);
    }

    #[test]
    fn test_coerce_string_is_strict() {
        assert_eq!(ValueType::String.coerce(&ArgValue::Integer(1)), None);
    }

    #[test]
    fn test_coerce_integer_out_of_range() {
        let t = ValueType::Integer;
        assert_eq!(t.coerce(&ArgValue::Float(1e20)), None);
        assert_eq!(t.coerce(&ArgValue::Float(-1e20)), None);
        assert_eq!(t.coerce(&ArgValue::Float(9_223_372_036_854_775_808.0)), None);
        assert_eq!(
            t.coerce(&ArgValue::Float(-9_223_372_036_854_775_808.0)),
            Some(ArgValue::Integer(i64::MIN))
        );

        let huge = ArgValue::from_json(json!(u64::MAX));
        assert_eq!(huge, ArgValue::Structured(json!(u64::MAX)));
        assert_eq!(t.coerce(&huge), None);
        assert_eq!(huge.type_name(), "out-of-range number");
        // Still usable where a plain number is expected.
        assert_eq!(
            ValueType::Number.coerce(&huge),
            Some(ArgValue::Float(u64::MAX as f64))
        );
    }

    #[test]
    fn test_coerce_number_rejects_non_finite() {
        let t = ValueType::Number;
        assert_eq!(t.coerce(&ArgValue::String("NaN".into())), None);
        assert_eq!(t.coerce(&ArgValue::String("inf".into())), None);
        assert_eq!(t.coerce(&ArgValue::String("-infinity".into())), None);
        assert_eq!(t.coerce(&ArgValue::Float(f64::NAN)), None);
        assert_eq!(t.coerce(&ArgValue::String(" 2.5 ".into())), Some(ArgValue::Float(2.5)));
    }

    #[test]
    fn test_coerce_object_and_array_are_distinct() {
        let object = ArgValue::Structured(json!({"a": 1}));
        let array = ArgValue::Structured(json!([1]));
        assert_eq!(ValueType::Object.coerce(&object), Some(object.clone()));
        assert_eq!(ValueType::Object.coerce(&array), None);
        assert_eq!(ValueType::Array.coerce(&array), Some(array.clone()));
        assert_eq!(ValueType::Array.coerce(&object), None);
        assert_eq!(ValueType::Object.coerce(&ArgValue::Structured(json!(null))), None);
    }

    #[test]
    fn test_matches_json() {
        assert!(ValueType::Array.matches_json(&json!([1, 2])));
        assert!(!ValueType::Object.matches_json(&json!([1, 2])));
        assert!(ValueType::Object.matches_json(&json!({})));
        assert!(!ValueType::Array.matches_json(&json!({})));
        assert!(!ValueType::Object.matches_json(&json!(null)));
        assert!(ValueType::Integer.matches_json(&json!(7)));
        assert!(!ValueType::Integer.matches_json(&json!(7.5)));
        assert!(ValueType::Number.matches_json(&json!(7)));
    }

    #[test]
    fn test_arguments_from_json() {
        let args = arguments_from_json(json!({"id": 1, "is_on": true})).unwrap();
        assert_eq!(args["id"], ArgValue::Integer(1));
        assert_eq!(args["is_on"], ArgValue::Boolean(true));

        assert!(arguments_from_json(json!(null)).unwrap().is_empty());
        assert!(arguments_from_json(json!([1])).is_none());
    }
}
