//! Report metadata attached to every indexed vector.

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{Error, Result};

pub const COMPANY: &str = "company";
pub const REPORT_DATE: &str = "report_date";
pub const REPORT_TYPE: &str = "report_type";
pub const SOURCE_ID: &str = "source_id";

/// A single metadata value, mirroring the JSON data model.
///
/// Externally tagged so it survives the binary index format; use
/// [`MetadataValue::to_json`] for plain JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Null,
    Text(String),
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
    Map(IndexMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Null => serde_json::Value::Null,
            MetadataValue::Text(s) => serde_json::Value::String(s.clone()),
            MetadataValue::Integer(i) => serde_json::Value::from(*i),
            MetadataValue::Unsigned(u) => serde_json::Value::from(*u),
            MetadataValue::Float(f) => serde_json::Value::from(*f),
            MetadataValue::Bool(b) => serde_json::Value::Bool(*b),
            MetadataValue::List(items) => {
                serde_json::Value::Array(items.iter().map(MetadataValue::to_json).collect())
            }
            MetadataValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MetadataValue::Null,
            serde_json::Value::String(s) => MetadataValue::Text(s),
            serde_json::Value::Bool(b) => MetadataValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetadataValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    MetadataValue::Unsigned(u)
                } else {
                    MetadataValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::Array(items) => {
                MetadataValue::List(items.into_iter().map(MetadataValue::from_json).collect())
            }
            serde_json::Value::Object(map) => MetadataValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, MetadataValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => write!(f, "{}", s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Unsigned(u) => write!(f, "{}", u),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Bool(b) => write!(f, "{}", b),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<u64> for MetadataValue {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(MetadataValue::Unsigned(u), MetadataValue::Integer)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(items: Vec<T>) -> Self {
        MetadataValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Metadata for one archived report: company, period, report type, source.
///
/// Keys keep the order they were inserted in, including through JSON and the
/// index file. Equality ignores key order.
///
/// Human-readable formats such as JSON see a plain object; binary formats
/// keep the tagged [`MetadataValue`] encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    fields: IndexMap<String, MetadataValue>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    pub fn company(&self) -> Option<&str> {
        self.get_str(COMPANY)
    }

    pub fn report_date(&self) -> Option<&str> {
        self.get_str(REPORT_DATE)
    }

    pub fn report_type(&self) -> Option<&str> {
        self.get_str(REPORT_TYPE)
    }

    pub fn source_id(&self) -> Option<&str> {
        self.get_str(SOURCE_ID)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from a JSON object. `null` yields empty metadata.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(k, v)| (k, MetadataValue::from_json(v)))
                    .collect(),
            }),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(Error::Serialization(format!(
                "metadata must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_json().serialize(serializer)
        } else {
            self.fields.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let value = serde_json::Value::deserialize(deserializer)?;
            Metadata::from_json(value).map_err(de::Error::custom)
        } else {
            Ok(Self {
                fields: IndexMap::deserialize(deserializer)?,
            })
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<MetadataValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
