/// A value that can be kept in a [`CacheStore`](super::CacheStore).
///
/// `encode` and `decode` must round-trip: decoding an encoded value yields an equal value.
/// Payloads that do not decode are treated as a cache miss, never as an error.
pub trait CacheValue: Clone + Send + Sync + 'static {
    /// Serializes the value into the payload written to the store.
    fn encode(&self) -> String;

    /// Parses a payload read from the store, returning `None` if it is malformed.
    fn decode(raw: &str) -> Option<Self>;
}

impl CacheValue for String {
    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(raw: &str) -> Option<Self> {
        Some(raw.to_owned())
    }
}
