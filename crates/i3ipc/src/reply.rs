//! Generic reply document
//!
//! i3 answers every request and emits every event as JSON. `Reply` keeps that
//! JSON as an immutable tree so callers can navigate any reply shape without a
//! predefined schema. Field-maps keep the key order of the source text.
//!
//! # Example
//!
//! ```ignore
//! let reply = Reply::parse(r#"{"name": "LVDS1", "rect": {"width": 1280}}"#)?;
//! assert_eq!(reply.get("name")?.as_str(), Some("LVDS1"));
//! assert_eq!(reply["rect"]["width"].as_u64(), Some(1280));
//! ```

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::{FieldError, I3Error};

/// Field-map of a `Reply` object, in source order
pub type Fields = IndexMap<String, Reply>;

static NULL: Reply = Reply::Null;

/// A parsed JSON reply from i3
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Reply {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Reply>),
    Object(Fields),
}

/// The variant of a `Reply`, for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplyKind::Null => "a null",
            ReplyKind::Bool => "a boolean",
            ReplyKind::Number => "a number",
            ReplyKind::String => "a string",
            ReplyKind::Array => "an array",
            ReplyKind::Object => "an object",
        })
    }
}

impl Reply {
    /// Parse a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::ParseError` if the text is not well-formed JSON.
    pub fn parse(text: impl AsRef<[u8]>) -> Result<Self, I3Error> {
        serde_json::from_slice(text.as_ref()).map_err(I3Error::ParseError)
    }

    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Null => ReplyKind::Null,
            Reply::Bool(_) => ReplyKind::Bool,
            Reply::Number(_) => ReplyKind::Number,
            Reply::String(_) => ReplyKind::String,
            Reply::Array(_) => ReplyKind::Array,
            Reply::Object(_) => ReplyKind::Object,
        }
    }

    /// Whether this is a field-map containing `key`
    pub fn has(&self, key: &str) -> bool {
        self.as_object().is_some_and(|fields| fields.contains_key(key))
    }

    /// Look up a field by name.
    ///
    /// # Errors
    ///
    /// Returns `FieldError::NotFound` if the field-map has no such key.
    /// Returns `FieldError::NotAnObject` if this reply is not a field-map.
    pub fn get(&self, key: &str) -> Result<&Reply, FieldError> {
        match self {
            Reply::Object(fields) => fields.get(key).ok_or_else(|| FieldError::NotFound {
                key: key.to_string(),
            }),
            other => Err(FieldError::NotAnObject {
                key: key.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// Look up a field, returning `None` when it is absent
    pub fn field(&self, key: &str) -> Option<&Reply> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Look up a sequence element.
    pub fn at(&self, index: usize) -> Result<&Reply, FieldError> {
        match self {
            Reply::Array(items) => items.get(index).ok_or(FieldError::IndexOutOfRange {
                index,
                len: items.len(),
            }),
            other => Err(FieldError::NotAnArray {
                index,
                kind: other.kind(),
            }),
        }
    }

    /// Whether a command-style reply succeeded.
    ///
    /// A reply fails exactly when it is a field-map exposing an `error` field.
    pub fn is_successful(&self) -> bool {
        !self.has("error")
    }

    /// The `error` field of a failed reply, when it is text
    pub fn error_message(&self) -> Option<&str> {
        self.field("error").and_then(Reply::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Reply::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Reply::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Reply::Number(number) => number.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reply::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Reply::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Number of elements or fields; zero for scalars
    pub fn len(&self) -> usize {
        match self {
            Reply::Array(items) => items.len(),
            Reply::Object(fields) => fields.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render as indented JSON
    pub fn to_json_pretty(&self) -> String {
        format!("{:#}", self)
    }

    /// Convert into a caller-defined type.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::SerializeFailed` if the reply does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, I3Error> {
        let value = serde_json::to_value(self).map_err(I3Error::SerializeFailed)?;
        serde_json::from_value(value).map_err(I3Error::SerializeFailed)
    }
}

impl FromStr for Reply {
    type Err = I3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compact JSON by default, indented JSON with `{:#}`
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = if f.alternate() {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
        .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Index<&str> for Reply {
    type Output = Reply;

    fn index(&self, key: &str) -> &Reply {
        self.field(key).unwrap_or(&NULL)
    }
}

impl Index<usize> for Reply {
    type Output = Reply;

    fn index(&self, index: usize) -> &Reply {
        self.as_array()
            .and_then(|items| items.get(index))
            .unwrap_or(&NULL)
    }
}

impl PartialEq<str> for Reply {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl PartialEq<&str> for Reply {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<bool> for Reply {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reply::Null => serializer.serialize_unit(),
            Reply::Bool(value) => serializer.serialize_bool(*value),
            Reply::Number(number) => number.serialize(serializer),
            Reply::String(value) => serializer.serialize_str(value),
            Reply::Array(items) => items.serialize(serializer),
            Reply::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Reply {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ReplyVisitor)
    }
}

struct ReplyVisitor;

impl<'de> Visitor<'de> for ReplyVisitor {
    type Value = Reply;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any valid JSON value")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Reply, E> {
        Ok(Reply::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Reply, E> {
        Ok(Reply::Number(value.into()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Reply, E> {
        Ok(Reply::Number(value.into()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Reply, E> {
        Ok(Number::from_f64(value).map_or(Reply::Null, Reply::Number))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Reply, E> {
        Ok(Reply::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Reply, E> {
        Ok(Reply::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Reply, E> {
        Ok(Reply::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Reply, E> {
        Ok(Reply::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Reply, D::Error> {
        Reply::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Reply, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Reply::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Reply, A::Error> {
        let mut fields = Fields::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Reply>()? {
            fields.insert(key, value);
        }
        Ok(Reply::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_boolean_fields() {
        assert_eq!(Reply::parse(r#"{"success": true}"#).unwrap()["success"], true);
        assert_eq!(Reply::parse(r#"{"success": false}"#).unwrap()["success"], false);
    }

    #[test]
    fn test_parses_numeric_fields() {
        let reply = Reply::parse(r#"{ "int": 2, "float": 4.2, "neg": -7 }"#).unwrap();
        assert_eq!(reply["int"].as_i64(), Some(2));
        assert_eq!(reply["int"].as_u64(), Some(2));
        assert_eq!(reply["float"].as_f64(), Some(4.2));
        assert_eq!(reply["float"].as_i64(), None);
        assert_eq!(reply["neg"].as_i64(), Some(-7));
        assert_eq!(reply["neg"].as_u64(), None);
    }

    #[test]
    fn test_parses_string_and_null_fields() {
        let reply = Reply::parse(r#"{"output": "LVDS1", "urgent": null}"#).unwrap();
        assert_eq!(reply.get("output").unwrap().as_str(), Some("LVDS1"));
        assert!(reply.get("urgent").unwrap().is_null());
        assert!(reply.has("urgent"));
    }

    #[test]
    fn test_parses_array_of_objects() {
        let reply = Reply::parse(r#"{ "data": [{"key1": true}, {"key2": false}] }"#).unwrap();
        let data = reply.get("data").unwrap();
        assert_eq!(data.at(0).unwrap().get("key1").unwrap(), &Reply::Bool(true));
        assert_eq!(data.at(1).unwrap().get("key2").unwrap(), &Reply::Bool(false));
    }

    #[test]
    fn test_parses_nested_objects() {
        let reply = Reply::parse(r#"{ "data": { "key1": "val1", "key2": "val2" } }"#).unwrap();
        assert_eq!(reply["data"]["key1"], "val1");
        assert_eq!(reply["data"]["key2"], "val2");
    }

    #[test]
    fn test_parses_nested_arrays() {
        let reply = Reply::parse(r#"{ "data": [[1, 2]] }"#).unwrap();
        let inner = reply["data"].at(0).unwrap().as_array().unwrap();
        let values: Vec<_> = inner.iter().filter_map(Reply::as_i64).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_parses_empty_array() {
        let reply = Reply::parse(r#"{"ar" : []}"#).unwrap();
        let ar = reply.get("ar").unwrap();
        assert_eq!(ar.kind(), ReplyKind::Array);
        assert!(ar.is_empty());
    }

    #[test]
    fn test_parses_empty_object() {
        let reply = Reply::parse(r#"{"ha": {}}"#).unwrap();
        assert_eq!(reply["ha"].kind(), ReplyKind::Object);
        assert_eq!(reply["ha"].to_string(), "{}");
        assert_eq!(reply["ha"].to_json_pretty(), "{}");

        let root = Reply::parse("{}").unwrap();
        assert_eq!(root, Reply::Object(Fields::new()));
        assert_eq!(root.to_string(), "{}");
    }

    #[test]
    fn test_top_level_array_reply() {
        let reply = Reply::parse(r#"[{"name": "1"}, {"name": "2: web"}]"#).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply[1]["name"], "2: web");
        assert!(reply.is_successful());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = Reply::parse(r#"{"data": }"#).unwrap_err();
        assert!(matches!(err, I3Error::ParseError(_)), "got: {:?}", err);

        assert!(matches!(
            "".parse::<Reply>(),
            Err(I3Error::ParseError(_))
        ));
    }

    #[test]
    fn test_serializes_compact_json_in_source_order() {
        let reply = Reply::parse(r#"{"two": "two", "one": "one"}"#).unwrap();
        assert_eq!(reply.to_string(), r#"{"two":"two","one":"one"}"#);
    }

    #[test]
    fn test_serialization_round_trips() {
        let source = r#"{"data":[{"key1":true},{"key2":false}],"nested":[[1,2],[]],"rect":{"x":0,"w":1280.5},"n":null}"#;
        let reply = Reply::parse(source).unwrap();
        assert_eq!(reply.to_string(), source);

        let pretty = reply.to_json_pretty();
        assert!(pretty.contains('\n'));
        assert_eq!(Reply::parse(&pretty).unwrap(), reply);
    }

    #[test]
    fn test_get_distinguishes_missing_field_from_wrong_kind() {
        let reply = Reply::parse(r#"{"meth": "val"}"#).unwrap();

        assert_eq!(reply.get("meth").unwrap(), "val");
        assert_eq!(
            reply.get("no_such_field"),
            Err(FieldError::NotFound {
                key: "no_such_field".to_string()
            })
        );
        assert_eq!(
            reply["meth"].get("inner"),
            Err(FieldError::NotAnObject {
                key: "inner".to_string(),
                kind: ReplyKind::String
            })
        );
    }

    #[test]
    fn test_has_reports_existence_only() {
        let reply = Reply::parse(r#"{"meth": "val"}"#).unwrap();
        assert!(reply.has("meth"));
        assert!(!reply.has("no_such_field"));
        assert!(!Reply::Array(vec![]).has("meth"));
    }

    #[test]
    fn test_at_errors() {
        let reply = Reply::parse("[1]").unwrap();
        assert_eq!(
            reply.at(3),
            Err(FieldError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(
            reply[0].at(0),
            Err(FieldError::NotAnArray {
                index: 0,
                kind: ReplyKind::Number
            })
        );
    }

    #[test]
    fn test_index_missing_entries_yield_null() {
        let reply = Reply::parse(r#"{"a": [1]}"#).unwrap();
        assert!(reply["missing"].is_null());
        assert!(reply["a"][5].is_null());
        assert!(reply["a"][0]["x"].is_null());
    }

    #[test]
    fn test_successful_reply() {
        let reply = Reply::parse(r#"{"success": true}"#).unwrap();
        assert!(reply.is_successful());
        assert_eq!(reply.error_message(), None);
    }

    #[test]
    fn test_failed_reply_exposes_error() {
        let reply = Reply::parse(r#"{"success": false, "error": "wrong command"}"#).unwrap();
        assert!(!reply.is_successful());
        assert_eq!(reply.error_message(), Some("wrong command"));
        assert_eq!(reply.get("error").unwrap(), "wrong command");
    }

    #[test]
    fn test_duplicate_keys_keep_last_value() {
        let reply = Reply::parse(r#"{"k": 1, "other": 2, "k": 3}"#).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply["k"].as_i64(), Some(3));
    }

    #[test]
    fn test_decode_into_typed_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Version {
            major: u32,
            minor: u32,
            human_readable: String,
        }

        let reply = Reply::parse(
            r#"{"major": 4, "minor": 22, "patch": 0, "human_readable": "4.22 (2023-01-02)"}"#,
        )
        .unwrap();
        let version: Version = reply.decode().unwrap();
        assert_eq!(
            version,
            Version {
                major: 4,
                minor: 22,
                human_readable: "4.22 (2023-01-02)".to_string(),
            }
        );

        let err = Reply::parse("[]").unwrap().decode::<Version>().unwrap_err();
        assert!(matches!(err, I3Error::SerializeFailed(_)));
    }
}
