use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::entry::CacheEntry;

/// Tabla en memoria clave → entrada.
///
/// Cada escritura reemplaza la entrada completa, así que un lector nunca
/// observa una entrada a medio escribir; ante escrituras concurrentes gana
/// la última.
#[derive(Debug, Default)]
pub struct EntryStore {
    data: DashMap<String, CacheEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CacheEntry) -> Option<CacheEntry> {
        self.data.insert(entry.key.clone(), entry)
    }

    /// Inserta solo si la clave no existe todavía.
    pub fn insert_if_absent(&self, entry: CacheEntry) -> bool {
        match self.data.entry(entry.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Devuelve la entrada si está viva; si está expirada la elimina.
    pub fn get_live(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.data.get(key)?;
        if entry.is_live(now) {
            return Some(entry.clone());
        }
        drop(entry);

        if self.remove_if_expired(key, now) {
            debug!("⏰ Entrada expirada removida: {}", key);
        }
        None
    }

    /// Borra `key` solo si sigue expirada en `now`: un `put` concurrente pudo
    /// reemplazarla entre la lectura y el borrado.
    fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.data.remove_if(key, |_, e| e.is_expired(now)).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.data.remove(key).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let keys_to_remove: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys_to_remove {
            if self.remove_if_expired(&key, now) {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    /// Snapshot de las claves presentes (vivas o no).
    pub fn keys(&self) -> Vec<String> {
        self.data.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot de las claves vivas en `now`.
    pub fn live_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.data
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Marcas de tiempo de la entrada más antigua y la más reciente.
    pub fn timestamp_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.data.iter().fold(None, |bounds, entry| {
            let ts = entry.value().created_at;
            Some(match bounds {
                Some((oldest, newest)) => (oldest.min(ts), newest.max(ts)),
                None => (ts, ts),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePayload;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn entry(key: &str, ttl: i64, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(key, CachePayload::Object(json!(key)), ttl, now)
    }

    #[test]
    fn test_get_live_removes_expired() {
        let store = EntryStore::new();
        let now = Utc::now();
        store.insert(entry("a", 5, now));

        assert!(store.get_live("a", now).is_some());
        assert!(store.get_live("a", now + Duration::seconds(5)).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_replaced_entry_survives_expiry_removal() {
        let store = EntryStore::new();
        let now = Utc::now();
        store.insert(entry("a", 5, now));

        // Otro escritor reemplaza la entrada antes del borrado
        let later = now + Duration::seconds(10);
        store.insert(entry("a", 60, later));
        assert!(!store.remove_if_expired("a", later));
        assert!(store.get_live("a", later).is_some());

        assert!(!store.remove_if_expired("missing", later));
        assert!(store.remove_if_expired("a", later + Duration::seconds(60)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_only_touches_expired() {
        let store = EntryStore::new();
        let now = Utc::now();
        store.insert(entry("short", 1, now));
        store.insert(entry("long", 100, now));
        store.insert(entry("forever", 0, now));

        let later = now + Duration::seconds(50);
        assert_eq!(store.cleanup_expired(later), 1);
        assert_eq!(store.cleanup_expired(later), 0);

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["forever".to_string(), "long".to_string()]);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let store = EntryStore::new();
        let now = Utc::now();
        assert!(store.insert_if_absent(entry("a", 0, now)));
        assert!(!store.insert_if_absent(entry("a", 0, now + Duration::seconds(1))));
        assert_eq!(store.get_live("a", now).unwrap().created_at, now);
    }

    #[test]
    fn test_timestamp_bounds() {
        let store = EntryStore::new();
        assert!(store.timestamp_bounds().is_none());

        let now = Utc::now();
        store.insert(entry("a", 0, now));
        store.insert(entry("b", 0, now + Duration::seconds(30)));
        store.insert(entry("c", 0, now - Duration::seconds(30)));

        assert_eq!(
            store.timestamp_bounds(),
            Some((now - Duration::seconds(30), now + Duration::seconds(30)))
        );
    }

    #[test]
    fn test_concurrent_writers_last_write_wins() {
        let store = Arc::new(EntryStore::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.insert(CacheEntry::new("shared", CachePayload::Object(json!(i)), 60, now));
                        let seen = store.get_live("shared", now).expect("entry present");
                        assert_eq!(seen.key, "shared");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
