//! Values carried in request and response bodies.
//!
//! [`Value`] mirrors the hessian2 data model closely enough that anything a
//! Java provider returns can be represented, and anything a caller builds
//! can be encoded without loss. [`Argument`] pairs a value with the JVM
//! descriptor the provider uses to select the overloaded method.

use crate::protocol::error::{Result, ZoorpcError};

/// A hessian2 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch
    Date(i64),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// A serialized Java object: class name plus its fields in declaration order
    Object {
        class: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a field of an object, or a string key of a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object { fields, .. } => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Class name of a serialized object.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Value::Object { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Converts the value into JSON for display.
    ///
    /// Objects become JSON objects with an extra `$class` member. Map keys
    /// that are not strings are rendered through their JSON text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Long(l) => Json::from(*l),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Binary(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::Date(ms) => Json::from(*ms),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, value) in entries {
                    let key = match key {
                        Value::String(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    object.insert(key, value.to_json());
                }
                Json::Object(object)
            }
            Value::Object { class, fields } => {
                let mut object = serde_json::Map::new();
                object.insert("$class".to_string(), Json::String(class.clone()));
                for (name, value) in fields {
                    object.insert(name.clone(), value.to_json());
                }
                Json::Object(object)
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::Long(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// One positional argument of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// JVM descriptor of the parameter type, e.g. `Ljava/lang/String;` or `I`
    pub descriptor: String,
    pub value: Value,
}

impl Argument {
    /// Creates an argument whose parameter type is inferred from the value.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        Argument {
            descriptor: infer_descriptor(&value),
            value,
        }
    }

    /// Creates an argument with an explicit Java parameter type.
    ///
    /// `java_type` may be a Java source name (`java.lang.Long`, `int`,
    /// `byte[]`) or a descriptor (`Ljava/lang/Long;`, `[B`).
    pub fn typed(java_type: &str, value: impl Into<Value>) -> Self {
        Argument {
            descriptor: java_descriptor(java_type),
            value: value.into(),
        }
    }

    /// Builds an argument from JSON.
    ///
    /// An object of the form `{"$class": "java.lang.Long", "$": 5}` selects
    /// the parameter type explicitly and coerces the number to match it.
    /// Anything else is converted structurally with an inferred type.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        if let serde_json::Value::Object(object) = &json {
            if let (Some(class), Some(inner)) = (object.get("$class"), object.get("$")) {
                let class = class.as_str().ok_or_else(|| {
                    ZoorpcError::InvalidRequest("$class must be a string".to_string())
                })?;
                let descriptor = java_descriptor(class);
                let value = coerce(&descriptor, Value::from(inner.clone()));
                return Ok(Argument { descriptor, value });
            }
        }

        Ok(Argument::new(Value::from(json)))
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::new(value)
    }
}

fn coerce(descriptor: &str, value: Value) -> Value {
    match (descriptor, value) {
        ("J" | "Ljava/lang/Long;", Value::Int(i)) => Value::Long(i64::from(i)),
        ("D" | "Ljava/lang/Double;" | "F" | "Ljava/lang/Float;", Value::Int(i)) => {
            Value::Double(f64::from(i))
        }
        ("D" | "Ljava/lang/Double;" | "F" | "Ljava/lang/Float;", Value::Long(l)) => {
            Value::Double(l as f64)
        }
        ("Ljava/util/Date;", Value::Int(i)) => Value::Date(i64::from(i)),
        ("Ljava/util/Date;", Value::Long(l)) => Value::Date(l),
        (_, value) => value,
    }
}

/// Infers the JVM descriptor a provider would declare for a value.
pub fn infer_descriptor(value: &Value) -> String {
    match value {
        Value::Null => "Ljava/lang/Object;".to_string(),
        Value::Bool(_) => "Z".to_string(),
        Value::Int(_) => "I".to_string(),
        Value::Long(_) => "J".to_string(),
        Value::Double(_) => "D".to_string(),
        Value::String(_) => "Ljava/lang/String;".to_string(),
        Value::Binary(_) => "[B".to_string(),
        Value::Date(_) => "Ljava/util/Date;".to_string(),
        Value::List(_) => "Ljava/util/List;".to_string(),
        Value::Map(_) => "Ljava/util/Map;".to_string(),
        Value::Object { class, .. } => java_descriptor(class),
    }
}

/// Converts a Java type name into a JVM descriptor.
///
/// Names that already look like descriptors (`[I`, `Lcom/foo/Bar;`) are
/// returned unchanged.
pub fn java_descriptor(java_type: &str) -> String {
    let java_type = java_type.trim();
    if java_type.starts_with('[') || (java_type.starts_with('L') && java_type.ends_with(';')) {
        return java_type.to_string();
    }

    let mut base = java_type;
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dims += 1;
    }

    let element = match base {
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        "void" => "V".to_string(),
        class => format!("L{};", class.replace('.', "/")),
    };

    format!("{}{}", "[".repeat(dims), element)
}

/// Splits a concatenated parameter descriptor string into one entry per
/// parameter.
pub fn split_descriptors(descriptors: &str) -> Result<Vec<String>> {
    let bytes = descriptors.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                i += 1;
                continue;
            }
            b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | b'V' => {
                i += 1;
            }
            b'L' => {
                let end = descriptors[i..].find(';').ok_or_else(|| {
                    ZoorpcError::Serialization(format!(
                        "unterminated class descriptor in '{}'",
                        descriptors
                    ))
                })?;
                i += end + 1;
            }
            other => {
                return Err(ZoorpcError::Serialization(format!(
                    "invalid descriptor character '{}' in '{}'",
                    other as char, descriptors
                )));
            }
        }
        out.push(descriptors[start..i].to_string());
        start = i;
    }

    if start != bytes.len() {
        return Err(ZoorpcError::Serialization(format!(
            "dangling array marker in '{}'",
            descriptors
        )));
    }

    Ok(out)
}
