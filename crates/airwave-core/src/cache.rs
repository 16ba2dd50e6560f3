/// A value valid until a stored expiry timestamp. Reads younger than the
/// TTL are used as-is; expired or absent entries force a provider fetch.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub expires_at_ms: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl_ms: i64, now_ms: i64) -> Self {
        Self {
            data,
            expires_at_ms: now_ms + ttl_ms,
        }
    }

    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Fresh-entry read helper: returns a clone of the data only when the entry
/// exists and has not expired.
pub fn fresh_value<T: Clone>(entry: &Option<CacheEntry<T>>, now_ms: i64) -> Option<T> {
    entry
        .as_ref()
        .filter(|e| e.is_fresh(now_ms))
        .map(|e| e.data.clone())
}
