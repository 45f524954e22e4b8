//! Typed attribute storage and span projection
//!
//! An [`AttributeBag`] maps dot-namespaced keys to scalar
//! [`AttributeValue`]s. Writes are last-write-wins per key. The bag is only
//! ever consumed whole, through [`AttributeBag::to_projection`], which
//! produces an immutable [`Projection`] ready to be attached to a span.

use crate::utils::masking::{self, MaskKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Value of a span attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
}

impl AttributeValue {
    /// Borrow the string payload, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload, if this is a float value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<&String> for AttributeValue {
    fn from(s: &String) -> Self {
        AttributeValue::String(s.clone())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Int(i as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(i: u32) -> Self {
        AttributeValue::Int(i as i64)
    }
}

impl From<u64> for AttributeValue {
    fn from(i: u64) -> Self {
        AttributeValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AttributeValue {
    fn from(i: usize) -> Self {
        AttributeValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<f32> for AttributeValue {
    fn from(f: f32) -> Self {
        AttributeValue::Float(f as f64)
    }
}

/// One projected key/value pair
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

/// Immutable, typed list of attributes ready for span attachment
///
/// Cloning is cheap (shared slice). Entries are sorted by key so that two
/// projections of equal bags compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection(Arc<[Attribute]>);

impl Projection {
    /// Empty projection
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Iterate over the projected pairs
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    /// Look up a projected value by key
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0
            .binary_search_by(|attr| attr.key.as_str().cmp(key))
            .ok()
            .map(|idx| &self.0[idx].value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> IntoIterator for &'a Projection {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Typed key/value container for business attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    entries: HashMap<String, AttributeValue>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, overwriting any previous value for `key`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Owned variant of [`set`](Self::set) for chaining
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Mask `raw` per `kind`; call before [`set`](Self::set)
    pub fn mask(kind: MaskKind, raw: &str) -> String {
        masking::mask(kind, raw)
    }

    /// Mask `raw` and store the masked value under `key`
    pub fn set_masked(&mut self, key: impl Into<String>, kind: MaskKind, raw: &str) {
        self.set(key, Self::mask(kind, raw));
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    /// Copy all entries of `other` into this bag; `other` wins on collision
    pub fn merge(&mut self, other: &AttributeBag) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Snapshot the bag as an immutable projection
    pub fn to_projection(&self) -> Projection {
        let mut attrs: Vec<Attribute> = self
            .entries
            .iter()
            .map(|(key, value)| Attribute {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        attrs.sort_by(|a, b| a.key.cmp(&b.key));
        Projection(Arc::from(attrs))
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeBag {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
