//! Ordered header map carried alongside every payload.
//!
//! Keys are unique and case-sensitive. Insertion order is preserved all the
//! way to the wire and back, so a handler observes headers exactly as the
//! caller set them (no reordering, no case folding).

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered string-to-string map with unique keys.
///
/// Backed by a `Vec` of pairs: header maps are small (a handful of entries),
/// so linear lookup beats a hash map and keeps ordering for free. Replacing
/// an existing key keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets a header, replacing any existing value for the same key.
    ///
    /// A replaced key keeps its original position in the iteration order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Looks up a header value by exact (case-sensitive) key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Removes a header, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges all entries from `other` into `self`, overwriting on key clash.
    pub fn extend(&mut self, other: &Headers) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Serde (ordered MsgPack map)
// ---------------------------------------------------------------------------

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string-to-string map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    // Duplicate keys on the wire collapse to the last value,
                    // preserving the unique-key invariant.
                    headers.insert(key, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut h = Headers::new();
        h.insert("X-User-ID", "12345");
        assert_eq!(h.get("X-User-ID"), Some("12345"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut h = Headers::new();
        h.insert("X-User-ID", "12345");
        assert_eq!(h.get("x-user-id"), None);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut h = Headers::new();
        h.insert("a", "1");
        h.insert("b", "2");
        h.insert("a", "3");

        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let h: Headers = [("z", "1"), ("a", "2"), ("m", "3")].into_iter().collect();
        let keys: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn remove_returns_value() {
        let mut h = Headers::new();
        h.insert("a", "1");
        assert_eq!(h.remove("a"), Some("1".to_string()));
        assert_eq!(h.remove("a"), None);
        assert!(h.is_empty());
    }

    #[test]
    fn extend_overwrites_on_clash() {
        let mut h: Headers = [("a", "1"), ("b", "2")].into_iter().collect();
        let other: Headers = [("b", "9"), ("c", "3")].into_iter().collect();
        h.extend(&other);

        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "9"), ("c", "3")]);
    }

    #[test]
    fn msgpack_roundtrip_preserves_order() {
        let h: Headers = [("X-Trace-Id", "t-1"), ("X-Client-Version", "1.0.0")]
            .into_iter()
            .collect();
        let bytes = rmp_serde::to_vec_named(&h).unwrap();
        let decoded: Headers = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, h);

        let keys: Vec<_> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["X-Trace-Id", "X-Client-Version"]);
    }

    #[test]
    fn empty_map_roundtrip() {
        let h = Headers::new();
        let bytes = rmp_serde::to_vec_named(&h).unwrap();
        let decoded: Headers = rmp_serde::from_slice(&bytes).unwrap();
        assert!(decoded.is_empty());
    }
}
