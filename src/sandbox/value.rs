//! Script values and their JSON bridge.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::model::ImageBlob;

/// A host function exposed to scripts. Scripts can call these but never
/// construct new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Notify,
    LoadImage,
    CaptureVisibleTab,
    CopyToClipboard,
    CreateAndDownloadFile,
    Pangu,
    Ocr,
    UploadImage,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::Notify => "notify",
            Capability::LoadImage => "loadImage",
            Capability::CaptureVisibleTab => "captureVisibleTab",
            Capability::CopyToClipboard => "copyToClipboard",
            Capability::CreateAndDownloadFile => "createAndDownloadFile",
            Capability::Pangu => "pangu",
            Capability::Ocr => "ocr",
            Capability::UploadImage => "upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Image(ImageBlob),
    Function(Capability),
}

impl Value {
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON form for clip data. Functions become `null`; NaN and
    /// infinities become `null` like `JSON.stringify`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null | Value::Function(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Image(image) => serde_json::to_value(image).unwrap_or(Json::Null),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Image(_) => "image",
            Value::Function(_) => "function",
        }
    }

    /// Numeric coercion. Non-numeric values become NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) if s.trim().is_empty() => 0.0,
            Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Text used for concatenation and notifications.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object Object]".to_string(),
            Value::Image(image) => format!("[image {}]", image.mime_type),
            Value::Function(cap) => format!("function {}()", cap.name()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_bridge_keeps_integers() {
        let json = json!({"title": "t", "count": 3, "ratio": 0.5, "tags": ["a"], "none": null});
        assert_eq!(Value::from_json(&json).to_json(), json);
    }

    #[test]
    fn functions_serialize_as_null() {
        assert_eq!(Value::Function(Capability::Pangu).to_json(), Json::Null);
        assert_eq!(Value::Number(f64::NAN).to_json(), Json::Null);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::String(String::new()).truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(Value::List(vec![]).truthy());
        assert!(Value::String("0".into()).truthy());
    }

    #[test]
    fn display_formats_numbers_like_scripts() {
        assert_eq!(Value::Number(3.0).display(), "3");
        assert_eq!(Value::Number(2.5).display(), "2.5");
        assert_eq!(
            Value::List(vec![Value::Number(1.0), Value::String("a".into())]).display(),
            "1,a"
        );
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::String(" 42 ".into()).to_number(), 42.0);
        assert!(Value::String("abc".into()).to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
    }
}
