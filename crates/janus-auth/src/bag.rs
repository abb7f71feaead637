//! Typed key/value bag for journey data and step configuration.
//!
//! Journeys and step handlers exchange loosely-structured data. Instead of a
//! stringly-typed dictionary with unchecked casts, the bag stores a small
//! closed set of value shapes and exposes accessors that fail closed: a
//! lookup with the wrong expected type returns `None` rather than panicking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known bag key: unix timestamp set by authenticating step handlers.
pub const KEY_AUTHENTICATED_AT: &str = "authenticated_at";

/// Well-known bag key: authentication method set by authenticating handlers.
pub const KEY_AUTH_METHOD: &str = "auth_method";

/// A value stored in a [`DataBag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BagValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value (timestamps, counters).
    Number(i64),
    /// Free-form string.
    String(String),
    /// List of strings (repeatable claims such as `amr`).
    List(Vec<String>),
}

impl From<&str> for BagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for BagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for BagValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for BagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for BagValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Ordered key/value store carried through a journey's lifetime.
///
/// Iteration order is deterministic (sorted by key) so that serialized
/// journey state is stable across invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBag {
    #[serde(flatten)]
    entries: BTreeMap<String, BagValue>,
}

impl DataBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any existing entry for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<BagValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes an entry, returning the previous value if present.
    pub fn remove(&mut self, key: &str) -> Option<BagValue> {
        self.entries.remove(key)
    }

    /// Returns `true` if the key is present with any value type.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the raw value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BagValue> {
        self.entries.get(key)
    }

    /// Returns the string value for a key, or `None` if absent or not a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(BagValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the integer value for a key, or `None` if absent or not a number.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(BagValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value for a key; absent or mismatched entries
    /// yield `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(BagValue::Bool(true)))
    }

    /// Returns the list value for a key, or `None` if absent or not a list.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.entries.get(key) {
            Some(BagValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Appends to a list entry, promoting an existing string value to a list.
    ///
    /// Duplicate items are not appended. A non-string, non-list entry is
    /// replaced by a single-element list.
    pub fn push_list(&mut self, key: impl Into<String>, item: impl Into<String>) {
        let key = key.into();
        let item = item.into();
        match self.entries.get_mut(&key) {
            Some(BagValue::List(items)) => {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            Some(BagValue::String(existing)) => {
                let existing = existing.clone();
                let items = if existing == item {
                    vec![existing]
                } else {
                    vec![existing, item]
                };
                self.entries.insert(key, BagValue::List(items));
            }
            _ => {
                self.entries.insert(key, BagValue::List(vec![item]));
            }
        }
    }

    /// Merges another bag into this one; entries from `other` win on conflict.
    pub fn merge(&mut self, other: &DataBag) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bag holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut bag = DataBag::new();
        bag.set("name", "alice");
        bag.set("age", 42);
        bag.set("active", true);
        bag.set("roles", vec!["admin".to_string(), "editor".to_string()]);

        assert_eq!(bag.get_str("name"), Some("alice"));
        assert_eq!(bag.get_i64("age"), Some(42));
        assert!(bag.get_bool("active"));
        assert_eq!(bag.get_list("roles").unwrap().len(), 2);
    }

    #[test]
    fn test_accessors_fail_closed_on_type_mismatch() {
        let mut bag = DataBag::new();
        bag.set("age", 42);

        // Wrong expected type returns None/false instead of panicking.
        assert_eq!(bag.get_str("age"), None);
        assert!(!bag.get_bool("age"));
        assert_eq!(bag.get_list("age"), None);

        // Absent key behaves the same.
        assert_eq!(bag.get_i64("missing"), None);
        assert!(!bag.get_bool("missing"));
    }

    #[test]
    fn test_push_list_promotes_and_dedupes() {
        let mut bag = DataBag::new();

        bag.push_list("amr", "pwd");
        assert_eq!(bag.get_list("amr"), Some(["pwd".to_string()].as_slice()));

        bag.push_list("amr", "mfa");
        assert_eq!(bag.get_list("amr").unwrap(), &["pwd", "mfa"]);

        // Duplicate append is a no-op.
        bag.push_list("amr", "pwd");
        assert_eq!(bag.get_list("amr").unwrap().len(), 2);

        // Existing string entry is promoted to a list.
        bag.set("method", "otp");
        bag.push_list("method", "webauthn");
        assert_eq!(bag.get_list("method").unwrap(), &["otp", "webauthn"]);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut base = DataBag::new();
        base.set("a", "one");
        base.set("b", "two");

        let mut overlay = DataBag::new();
        overlay.set("b", "override");
        overlay.set("c", "three");

        base.merge(&overlay);

        assert_eq!(base.get_str("a"), Some("one"));
        assert_eq!(base.get_str("b"), Some("override"));
        assert_eq!(base.get_str("c"), Some("three"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut bag = DataBag::new();
        bag.set("name", "alice");
        bag.set("age", 42);
        bag.set("amr", vec!["pwd".to_string()]);

        let json = serde_json::to_string(&bag).unwrap();
        let parsed: DataBag = serde_json::from_str(&json).unwrap();

        assert_eq!(bag, parsed);
        assert_eq!(parsed.get_i64("age"), Some(42));
    }
}
