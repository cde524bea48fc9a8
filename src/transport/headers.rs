//! Application headers attached to requests and responses.

use std::collections::BTreeMap;

/// Case-insensitive header map.
///
/// Keys are normalized to lowercase on insert and lookup. Iteration order is
/// the sorted key order, so framing is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    items: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a header, replacing any previous value for the same key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.items
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let headers = Headers::new().with("Content-Type", "raw");
        assert_eq!(headers.get("content-type"), Some("raw"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("raw"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut headers = Headers::new();
        headers.insert("k", "1");
        headers.insert("K", "2");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("k"), Some("2"));
    }

    #[test]
    fn test_iteration_is_sorted() {
        let headers = Headers::new().with("b", "2").with("a", "1");
        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
