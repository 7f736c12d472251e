use chrono::NaiveDateTime;
use indexmap::map::Iter;
use indexmap::IndexMap;

use crate::params::Value;

/// Date formats instrument software writes into free-text header fields
const DATETIME_FORMATS: &[&str] = &[
    "%d-%b-%y, %H:%M:%S",
    "%d %b %y %I:%M %p",
    "%d-%b-%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y%m%d%H%M%S",
];

/**
An ordered mapping from header field name to decoded value.

Field order is the order the fields were declared or encountered in.
A wrapper around [`indexmap::IndexMap`].
*/
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeaderRecord {
    /// The numeric version of the format the header was decoded with
    pub format_id: u32,
    #[cfg_attr(feature = "serde", serde(with = "indexmap::map::serde_seq"))]
    pub fields: IndexMap<Box<str>, Value>,
}

impl HeaderRecord {
    pub fn new(format_id: u32) -> Self {
        Self {
            format_id,
            fields: IndexMap::new(),
        }
    }

    #[inline]
    pub fn insert<K: Into<Box<str>>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// True when the field was declared but could not be read, or was never declared
    pub fn is_absent(&self, key: &str) -> bool {
        self.get(key).map_or(true, Value::is_absent)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Iterate over the names of fields that were declared but not read
    pub fn absent_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_absent())
            .map(|(k, _)| k.as_ref())
    }

    pub fn iter(&self) -> Iter<'_, Box<str>, Value> {
        self.fields.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse the `datetime` field, if present, using the date layouts known
    /// to be written by instrument software
    pub fn acquired_at(&self) -> Option<NaiveDateTime> {
        let text = self.get_str("datetime")?.trim();
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    }
}
