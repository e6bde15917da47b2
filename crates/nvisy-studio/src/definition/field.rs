//! Typed node fields and string-value coercion.
//!
//! The graph editor stores every configured value as a string. Coercion turns
//! those strings back into typed scalars according to the field's declared
//! [`FieldType`], keeping "unset" distinct from zero or false.

use std::collections::{BTreeMap, HashMap, HashSet};

use derive_more::{Deref, DerefMut, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use crate::error::{Error, Result};

/// Declared type of a node field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
pub enum FieldType {
    /// Signed integer.
    #[serde(rename = "int")]
    #[strum(to_string = "int")]
    Int,
    /// Floating point number.
    #[serde(rename = "float")]
    #[strum(to_string = "float")]
    Float,
    /// Boolean flag.
    #[serde(rename = "bool")]
    #[strum(to_string = "bool")]
    Bool,
    /// Free text.
    #[serde(rename = "str")]
    #[strum(to_string = "str")]
    Str,
    /// Image reference (URL or data URI).
    #[serde(rename = "image")]
    #[strum(to_string = "image")]
    Image,
    /// List of strings.
    #[serde(rename = "list[str]")]
    #[strum(to_string = "list[str]")]
    ListStr,
    /// List of floats.
    #[serde(rename = "list[float]")]
    #[strum(to_string = "list[float]")]
    ListFloat,
    /// List of integers.
    #[serde(rename = "list[int]")]
    #[strum(to_string = "list[int]")]
    ListInt,
    /// List of booleans.
    #[serde(rename = "list[bool]")]
    #[strum(to_string = "list[bool]")]
    ListBool,
    /// Arbitrary JSON object.
    #[serde(rename = "dict")]
    #[strum(to_string = "dict")]
    Dict,
    /// Language model configuration.
    #[serde(rename = "llm")]
    #[strum(to_string = "llm")]
    Llm,
    /// Dataset reference.
    #[serde(rename = "dataset")]
    #[strum(to_string = "dataset")]
    Dataset,
}

/// A typed scalar produced by coercing a string-encoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value, also used for non-scalar types passed through raw.
    Str(String),
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Int(i) => Value::from(i),
            FieldValue::Float(f) => Value::from(f),
            FieldValue::Str(s) => Value::String(s),
        }
    }
}

/// A typed input, output or parameter slot of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Identifier, unique within the owning field list.
    pub identifier: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field may be left empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// String-encoded default value.
    #[serde(
        rename = "defaultValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<String>,
    /// Runtime value set by the editor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Field {
    /// Creates a field with no default value.
    pub fn new(identifier: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            identifier: identifier.into(),
            field_type,
            optional: None,
            desc: None,
            default_value: None,
            value: None,
        }
    }

    /// Sets the string-encoded default value.
    #[must_use]
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Returns the default value if it is present and non-empty.
    pub fn raw_default(&self) -> Option<&str> {
        self.default_value.as_deref().filter(|v| !v.is_empty())
    }

    /// Coerces the default value into a typed scalar.
    ///
    /// Returns `Ok(None)` when no default is set or it is empty.
    pub fn coerce(&self) -> Result<Option<FieldValue>> {
        coerce_raw(
            &self.identifier,
            self.field_type,
            self.default_value.as_deref(),
        )
    }
}

/// Coerces a string-encoded value according to a declared field type.
pub fn coerce_raw(
    identifier: &str,
    field_type: FieldType,
    raw: Option<&str>,
) -> Result<Option<FieldValue>> {
    let Some(raw) = raw.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let value = match field_type {
        FieldType::Int => raw
            .trim()
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| Error::parse(identifier, field_type, raw, e))?,
        FieldType::Float => {
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|e| Error::parse(identifier, field_type, raw, e))?;
            if !value.is_finite() {
                return Err(Error::parse(identifier, field_type, raw, "expected a finite number"));
            }
            FieldValue::Float(value)
        }
        FieldType::Bool => parse_bool(raw)
            .map(FieldValue::Bool)
            .ok_or_else(|| Error::parse(identifier, field_type, raw, "expected true or false"))?,
        _ => FieldValue::Str(raw.to_owned()),
    };

    Ok(Some(value))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Collects the raw defaults of every field that has a non-empty one.
pub fn parse_fields(fields: &[Field]) -> BTreeMap<String, String> {
    fields
        .iter()
        .filter_map(|f| Some((f.identifier.clone(), f.raw_default()?.to_owned())))
        .collect()
}

/// Collects the typed defaults of every field that has a non-empty one.
///
/// Identifiers must be unique within `fields`.
pub fn coerce_fields(fields: &[Field]) -> Result<Settings> {
    let mut seen = HashSet::with_capacity(fields.len());
    if let Some(duplicate) = fields
        .iter()
        .find(|f| !seen.insert(f.identifier.as_str()))
    {
        return Err(Error::configuration(format!(
            "duplicate parameter field '{}'",
            duplicate.identifier
        )));
    }

    let mut settings = Settings::default();
    for field in fields.iter().filter(|f| f.raw_default().is_some()) {
        if let Some(value) = field.coerce()? {
            settings.insert(field.identifier.clone(), value.into());
        }
    }
    Ok(settings)
}

/// Coerces raw client inputs against the declared input fields.
///
/// Inputs that are not declared are dropped; declared fields without a
/// non-empty input value are omitted.
pub fn autoparse_fields(
    fields: &[Field],
    inputs: &HashMap<String, String>,
) -> Result<Map<String, Value>> {
    let mut parsed = Map::new();
    for field in fields {
        let raw = inputs.get(&field.identifier).map(String::as_str);
        if let Some(value) = coerce_raw(&field.identifier, field.field_type, raw)? {
            parsed.insert(field.identifier.clone(), value.into());
        }
    }
    Ok(parsed)
}

/// Keyword configuration assembled from a node's parameter fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[derive(Deref, DerefMut, From, Into)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    /// Returns a string setting.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a non-negative integer setting.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
    }

    /// Returns a boolean setting.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(ty: FieldType, raw: &str) -> Field {
        Field::new("x", ty).with_default(raw)
    }

    #[test]
    fn test_absent_and_empty_are_none() {
        for ty in [FieldType::Int, FieldType::Float, FieldType::Bool, FieldType::Str] {
            assert_eq!(Field::new("x", ty).coerce().unwrap(), None);
            assert_eq!(field(ty, "").coerce().unwrap(), None);
        }
    }

    #[test]
    fn test_scalar_round_trip() {
        for i in [0_i64, -7, 42, i64::MAX] {
            let value = field(FieldType::Int, &i.to_string()).coerce().unwrap();
            assert_eq!(value, Some(FieldValue::Int(i)));
        }
        for f in [0.0_f64, -1.5, 3.25, 1e-9] {
            let value = field(FieldType::Float, &f.to_string()).coerce().unwrap();
            assert_eq!(value, Some(FieldValue::Float(f)));
        }
        for b in [true, false] {
            let value = field(FieldType::Bool, &b.to_string()).coerce().unwrap();
            assert_eq!(value, Some(FieldValue::Bool(b)));
        }
    }

    #[test]
    fn test_invalid_int_is_parse_error() {
        let err = field(FieldType::Int, "abc").coerce().unwrap_err();
        assert!(matches!(
            err,
            Error::Parse { ref field, field_type: FieldType::Int, ref value, .. }
                if field == "x" && value == "abc"
        ));
    }

    #[test]
    fn test_non_finite_float_is_parse_error() {
        for raw in ["NaN", "inf", "-infinity"] {
            let err = field(FieldType::Float, raw).coerce().unwrap_err();
            assert!(matches!(err, Error::Parse { field_type: FieldType::Float, .. }));
        }

        let inputs = HashMap::from([("x".to_owned(), "NaN".to_owned())]);
        assert!(autoparse_fields(&[Field::new("x", FieldType::Float)], &inputs).is_err());
    }

    #[test]
    fn test_duplicate_parameters_are_rejected() {
        let fields = vec![
            Field::new("k", FieldType::Int).with_default("5"),
            Field::new("k", FieldType::Int).with_default("7"),
        ];

        let err = coerce_fields(&fields).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_str_is_identity() {
        let value = field(FieldType::Str, "abc").coerce().unwrap();
        assert_eq!(value, Some(FieldValue::Str("abc".into())));
    }

    #[test]
    fn test_non_scalar_passes_through_raw() {
        let value = field(FieldType::ListStr, "[\"a\"]").coerce().unwrap();
        assert_eq!(value, Some(FieldValue::Str("[\"a\"]".into())));
    }

    #[test]
    fn test_bool_rejects_garbage() {
        assert!(field(FieldType::Bool, "maybe").coerce().is_err());
        assert_eq!(
            field(FieldType::Bool, " TRUE ").coerce().unwrap(),
            Some(FieldValue::Bool(true))
        );
    }

    #[test]
    fn test_parse_fields_skips_missing_defaults() {
        let fields = vec![
            Field::new("k", FieldType::Int).with_default("5"),
            Field::new("empty", FieldType::Str).with_default(""),
            Field::new("unset", FieldType::Str),
        ];

        let raw = parse_fields(&fields);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.get("k").map(String::as_str), Some("5"));

        let settings = coerce_fields(&fields).unwrap();
        assert_eq!(settings.get_usize("k"), Some(5));
        assert!(!settings.contains_key("empty"));
    }

    #[test]
    fn test_autoparse_uses_declared_fields_only() {
        let fields = vec![
            Field::new("question", FieldType::Str),
            Field::new("top", FieldType::Int),
            Field::new("missing", FieldType::Str),
        ];
        let inputs = HashMap::from([
            ("question".to_owned(), "why?".to_owned()),
            ("top".to_owned(), "3".to_owned()),
            ("extra".to_owned(), "ignored".to_owned()),
        ]);

        let parsed = autoparse_fields(&fields, &inputs).unwrap();
        assert_eq!(parsed.get("question"), Some(&Value::from("why?")));
        assert_eq!(parsed.get("top"), Some(&Value::from(3)));
        assert!(!parsed.contains_key("extra"));
        assert!(!parsed.contains_key("missing"));
    }

    #[test]
    fn test_field_wire_format() {
        let field: Field = serde_json::from_value(serde_json::json!({
            "identifier": "temperature",
            "type": "float",
            "defaultValue": "0.7"
        }))
        .unwrap();
        assert_eq!(field.field_type, FieldType::Float);
        assert_eq!(field.coerce().unwrap(), Some(FieldValue::Float(0.7)));
    }
}
