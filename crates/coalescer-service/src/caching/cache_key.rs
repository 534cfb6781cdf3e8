use std::fmt;
use std::sync::Arc;

/// The key under which a value is stored in the cache and coalesced in the registry.
///
/// A key is derived from a namespace tag and a logical identifier and rendered as
/// `{namespace}:{logical_id}`. The identifier is escaped so it never contains a `:`, which makes
/// the last `:` of a key an unambiguous separator: two distinct `(namespace, logical_id)` pairs
/// never produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    key: Arc<str>,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl CacheKey {
    /// Derives the key for `logical_id` within `namespace`.
    pub fn new(logical_id: &str, namespace: &str) -> Self {
        let mut key = String::with_capacity(namespace.len() + logical_id.len() + 1);
        key.push_str(namespace);
        key.push(':');
        escape_into(&mut key, logical_id);
        Self { key: key.into() }
    }

    /// Returns the rendered key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    #[cfg(test)]
    pub fn for_testing(key: impl Into<String>) -> Self {
        Self {
            key: key.into().into(),
        }
    }
}

/// Percent-encodes the separator and the escape character itself.
fn escape_into(buf: &mut String, segment: &str) {
    for c in segment.chars() {
        match c {
            '%' => buf.push_str("%25"),
            ':' => buf.push_str("%3A"),
            c => buf.push(c),
        }
    }
}
