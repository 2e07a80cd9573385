use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CachePayload;

/// Entrada de caché: payload + momento de escritura + TTL.
///
/// Un `ttl_secs` de `0` o negativo significa que la entrada nunca expira.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachePayload,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: i64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: CachePayload, ttl_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: now,
            ttl_secs,
        }
    }

    /// `None` cuando la entrada no expira.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl_secs <= 0 {
            return None;
        }
        // Un TTL absurdo que desborda el calendario equivale a "nunca".
        Duration::try_seconds(self.ttl_secs).and_then(|ttl| self.created_at.checked_add_signed(ttl))
    }

    /// Viva si no tiene TTL o si `now` es estrictamente anterior a la expiración.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_live(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(ttl_secs: i64, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new("k", CachePayload::Object(json!({"a": 1})), ttl_secs, now)
    }

    #[test]
    fn test_expires_exactly_at_deadline() {
        let now = Utc::now();
        let e = entry(10, now);
        assert!(e.is_live(now + Duration::seconds(9)));
        assert!(e.is_live(now + Duration::milliseconds(9_999)));
        assert!(e.is_expired(now + Duration::seconds(10)));
        assert!(e.is_expired(now + Duration::seconds(11)));
    }

    #[test]
    fn test_non_positive_ttl_never_expires() {
        let now = Utc::now();
        for ttl in [0, -1, i64::MIN] {
            let e = entry(ttl, now);
            assert_eq!(e.expires_at(), None);
            assert!(e.is_live(now + Duration::days(365 * 100)));
        }
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let now = Utc::now();
        let e = entry(i64::MAX, now);
        assert!(e.is_live(now + Duration::days(365 * 1000)));
    }
}
