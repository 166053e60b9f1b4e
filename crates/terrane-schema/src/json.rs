//! Conversion between [`Value`] and JSON, guided by a structural [`Type`].
//!
//! Encoding rejects unknown values and anything that does not conform to the
//! type. Both directions reject undeclared object attributes and fill missing
//! ones with null, so a decoded object always carries every declared
//! attribute. Set elements are deduplicated and sorted by their JSON text on
//! encode so equal sets always produce identical bytes.

use crate::value::{Type, Value};
use crate::SchemaError;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Encode a value to JSON according to `ty`.
pub fn to_json(value: &Value, ty: &Type) -> Result<Json, SchemaError> {
    let mut path = String::new();
    encode(value, ty, &mut path)
}

/// Decode JSON into a value according to `ty`.
pub fn from_json(json: &Json, ty: &Type) -> Result<Value, SchemaError> {
    let mut path = String::new();
    decode(json, ty, &mut path)
}

fn nonconforming(path: &str, message: String) -> SchemaError {
    SchemaError::Nonconforming {
        path: display_path(path),
        message,
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "value".to_owned()
    } else {
        path.to_owned()
    }
}

fn with_segment<T>(
    path: &mut String,
    segment: &str,
    f: impl FnOnce(&mut String) -> Result<T, SchemaError>,
) -> Result<T, SchemaError> {
    let len = path.len();
    path.push_str(segment);
    let result = f(path);
    path.truncate(len);
    result
}

fn key_segment(key: &str) -> String {
    format!("[{}]", Json::String(key.to_owned()))
}

fn encode(value: &Value, ty: &Type, path: &mut String) -> Result<Json, SchemaError> {
    match (value, ty) {
        (Value::Unknown, _) => Err(SchemaError::UnknownValue {
            path: display_path(path),
        }),
        (Value::Null, _) => Ok(Json::Null),
        (_, Type::Dynamic) => encode_dynamic(value, path),
        (Value::Bool(b), Type::Bool) => Ok(Json::Bool(*b)),
        (Value::Number(n), Type::Number) => Ok(Json::Number(n.clone())),
        (Value::String(s), Type::String) => Ok(Json::String(s.clone())),
        (Value::List(items), Type::List(elem)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(with_segment(path, &format!("[{i}]"), |p| {
                    encode(item, elem, p)
                })?);
            }
            Ok(Json::Array(out))
        }
        (Value::Set(items), Type::Set(elem)) => {
            let mut encoded = BTreeMap::new();
            for item in items {
                let json = with_segment(path, "[*]", |p| encode(item, elem, p))?;
                encoded.insert(json.to_string(), json);
            }
            Ok(Json::Array(encoded.into_values().collect()))
        }
        (Value::Map(items), Type::Map(elem)) => {
            let mut out = serde_json::Map::new();
            for (k, v) in items {
                let json = with_segment(path, &key_segment(k), |p| encode(v, elem, p))?;
                out.insert(k.clone(), json);
            }
            Ok(Json::Object(out))
        }
        (Value::Object(vals), Type::Object(attrs)) => {
            if let Some(extra) = vals.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(nonconforming(
                    path,
                    format!("unsupported attribute \"{extra}\""),
                ));
            }
            let mut out = serde_json::Map::new();
            for (name, attr_ty) in attrs {
                let v = vals.get(name).unwrap_or(&Value::Null);
                let json = with_segment(path, &format!(".{name}"), |p| encode(v, attr_ty, p))?;
                out.insert(name.clone(), json);
            }
            Ok(Json::Object(out))
        }
        (_, expected) => Err(nonconforming(
            path,
            format!("{} required", expected.friendly_name()),
        )),
    }
}

fn encode_dynamic(value: &Value, path: &mut String) -> Result<Json, SchemaError> {
    match value {
        Value::Unknown => Err(SchemaError::UnknownValue {
            path: display_path(path),
        }),
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Number(n) => Ok(Json::Number(n.clone())),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::List(items) | Value::Set(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(with_segment(path, &format!("[{i}]"), |p| {
                    encode_dynamic(item, p)
                })?);
            }
            Ok(Json::Array(out))
        }
        Value::Map(items) | Value::Object(items) => {
            let mut out = serde_json::Map::new();
            for (k, v) in items {
                let json = with_segment(path, &key_segment(k), |p| encode_dynamic(v, p))?;
                out.insert(k.clone(), json);
            }
            Ok(Json::Object(out))
        }
    }
}

fn decode(json: &Json, ty: &Type, path: &mut String) -> Result<Value, SchemaError> {
    match (json, ty) {
        (Json::Null, _) => Ok(Value::Null),
        (_, Type::Dynamic) => Ok(decode_dynamic(json)),
        (Json::Bool(b), Type::Bool) => Ok(Value::Bool(*b)),
        (Json::Number(n), Type::Number) => Ok(Value::Number(n.clone())),
        (Json::String(s), Type::String) => Ok(Value::String(s.clone())),
        (Json::Array(items), Type::List(elem)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(with_segment(path, &format!("[{i}]"), |p| {
                    decode(item, elem, p)
                })?);
            }
            Ok(Value::List(out))
        }
        (Json::Array(items), Type::Set(elem)) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                let v = with_segment(path, "[*]", |p| decode(item, elem, p))?;
                if !out.contains(&v) {
                    out.push(v);
                }
            }
            Ok(Value::Set(out))
        }
        (Json::Object(items), Type::Map(elem)) => {
            let mut out = BTreeMap::new();
            for (k, v) in items {
                let value = with_segment(path, &key_segment(k), |p| decode(v, elem, p))?;
                out.insert(k.clone(), value);
            }
            Ok(Value::Map(out))
        }
        (Json::Object(items), Type::Object(attrs)) => {
            if let Some(extra) = items.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(nonconforming(
                    path,
                    format!("unsupported attribute \"{extra}\""),
                ));
            }
            let mut out = BTreeMap::new();
            for (name, attr_ty) in attrs {
                let value = match items.get(name) {
                    Some(v) => with_segment(path, &format!(".{name}"), |p| decode(v, attr_ty, p))?,
                    None => Value::Null,
                };
                out.insert(name.clone(), value);
            }
            Ok(Value::Object(out))
        }
        (_, expected) => Err(nonconforming(
            path,
            format!("{} required", expected.friendly_name()),
        )),
    }
}

fn decode_dynamic(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.clone()),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(decode_dynamic).collect()),
        Json::Object(items) => Value::Object(
            items
                .iter()
                .map(|(k, v)| (k.clone(), decode_dynamic(v)))
                .collect(),
        ),
    }
}
