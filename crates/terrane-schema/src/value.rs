//! Structural types and the dynamic values that conform to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural type descriptor implied by a provider schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
    /// Any type; the concrete shape is decided by the value itself.
    Dynamic,
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn set(element: Type) -> Self {
        Type::Set(Box::new(element))
    }

    pub fn map(element: Type) -> Self {
        Type::Map(Box::new(element))
    }

    pub fn object<'a>(attrs: impl IntoIterator<Item = (&'a str, Type)>) -> Self {
        Type::Object(
            attrs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }

    pub fn friendly_name(&self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::Number => "number",
            Type::String => "string",
            Type::List(_) => "list",
            Type::Set(_) => "set",
            Type::Map(_) => "map",
            Type::Object(_) => "object",
            Type::Dynamic => "dynamic",
        }
    }
}

/// A dynamic value. `Unknown` stands for a value that will only be known
/// after apply and can never be written to state.
///
/// Equality treats `Set` elements as unordered and ignores duplicates.
#[derive(Debug, Clone, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Unknown,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unknown, Value::Unknown) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y))
            }
            (Value::Map(a), Value::Map(b)) | (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn number(n: impl Into<serde_json::Number>) -> Self {
        Value::Number(n.into())
    }

    pub fn object<'a>(attrs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Value::Object(
            attrs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up an attribute of an object value.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(attrs) => attrs.get(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_equality_ignores_order_and_duplicates() {
        let a = Value::Set(vec![Value::string("b"), Value::string("a")]);
        let b = Value::Set(vec![Value::string("a"), Value::string("b"), Value::string("a")]);
        assert_eq!(a, b);
        assert_ne!(a, Value::Set(vec![Value::string("a")]));
        assert_ne!(
            Value::List(vec![Value::string("b"), Value::string("a")]),
            Value::List(vec![Value::string("a"), Value::string("b")])
        );

        let nested = |items| Value::object([("groups", Value::Set(items))]);
        assert_eq!(
            nested(vec![Value::number(2), Value::number(1)]),
            nested(vec![Value::number(1), Value::number(2)])
        );
    }

    #[test]
    fn attr_lookup() {
        let v = Value::object([("id", Value::string("abc"))]);
        assert_eq!(v.attr("id").and_then(Value::as_str), Some("abc"));
        assert!(v.attr("missing").is_none());
        assert!(Value::Null.attr("id").is_none());
    }

    #[test]
    fn type_serde_roundtrip() {
        let t = Type::object([("id", Type::String), ("ports", Type::list(Type::Number))]);
        let json = serde_json::to_string(&t).unwrap();
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
