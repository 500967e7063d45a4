//! Case-insensitive header bag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered header map with lowercase keys.
///
/// Keys are normalized on insert, so `Traceparent` and `traceparent` name the
/// same entry and a later insert overwrites an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct HeaderBag {
    entries: BTreeMap<String, String>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries
            .insert(key.as_ref().trim().to_ascii_lowercase(), value.into())
    }

    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every entry of `other` into this bag; `other` wins on conflicts
    pub fn overlay(&mut self, other: &HeaderBag) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// Keep only the named keys
    pub fn retain_keys(&self, keys: &[&str]) -> HeaderBag {
        self.entries
            .iter()
            .filter(|(k, _)| keys.iter().any(|key| key.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The token of an `Authorization: Bearer <token>` header
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.get("authorization")?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = HeaderBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

impl From<BTreeMap<String, String>> for HeaderBag {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HeaderBag> for BTreeMap<String, String> {
    fn from(bag: HeaderBag) -> Self {
        bag.entries
    }
}

/// Non-UTF-8 header values are skipped
impl From<&axum::http::HeaderMap> for HeaderBag {
    fn from(headers: &axum::http::HeaderMap) -> Self {
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut bag = HeaderBag::new();
        bag.insert("TraceParent", "a");
        bag.insert("traceparent", "b");

        assert_eq!(bag.len(), 1);
        assert_eq!(bag.get("TRACEPARENT"), Some("b"));
    }

    #[test]
    fn test_overlay_other_wins() {
        let mut base = HeaderBag::new().with("x-tenant", "acme").with("traceparent", "stale");
        let trace = HeaderBag::new().with("Traceparent", "fresh");
        base.overlay(&trace);

        assert_eq!(base.get("traceparent"), Some("fresh"));
        assert_eq!(base.get("x-tenant"), Some("acme"));
    }

    #[test]
    fn test_bearer_token() {
        let bag = HeaderBag::new().with("Authorization", "Bearer abc.def.ghi");
        assert_eq!(bag.bearer_token(), Some("abc.def.ghi"));

        let bag = HeaderBag::new().with("authorization", "bearer   tok ");
        assert_eq!(bag.bearer_token(), Some("tok"));

        let bag = HeaderBag::new().with("authorization", "Basic dXNlcjpwYXNz");
        assert_eq!(bag.bearer_token(), None);

        let bag = HeaderBag::new().with("authorization", "Bearer ");
        assert_eq!(bag.bearer_token(), None);

        assert_eq!(HeaderBag::new().bearer_token(), None);
    }

    #[test]
    fn test_retain_keys() {
        let bag = HeaderBag::new()
            .with("traceparent", "tp")
            .with("user-agent", "curl");
        let filtered = bag.retain_keys(&["traceparent", "tracestate"]);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("traceparent"));
    }

    #[test]
    fn test_from_header_map() {
        let mut map = axum::http::HeaderMap::new();
        map.insert("traceparent", "tp".parse().unwrap());
        map.insert("x-request-id", "r1".parse().unwrap());

        let bag = HeaderBag::from(&map);
        assert_eq!(bag.get("traceparent"), Some("tp"));
        assert_eq!(bag.get("X-Request-Id"), Some("r1"));
    }

    #[test]
    fn test_serde_as_plain_map() {
        let bag = HeaderBag::new().with("Traceparent", "tp");
        let json = serde_json::to_string(&bag).unwrap();
        assert_eq!(json, r#"{"traceparent":"tp"}"#);

        let back: HeaderBag = serde_json::from_str(r#"{"TraceParent":"tp"}"#).unwrap();
        assert_eq!(back, bag);
    }
}
