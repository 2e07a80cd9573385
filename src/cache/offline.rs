use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Result;

/// Prefijo de las claves de metadata offline: `offline_<trackId>`.
pub const OFFLINE_PREFIX: &str = "offline_";

pub fn offline_key(track_id: &str) -> String {
    format!("{}{}", OFFLINE_PREFIX, track_id)
}

pub fn track_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(OFFLINE_PREFIX).filter(|id| !id.is_empty())
}

/// Colaborador que entrega los bytes de audio de una pista.
#[cfg_attr(test, mockall::automock)]
pub trait AudioSource: Send + Sync {
    fn fetch_audio(&self, track_id: &str) -> Result<Vec<u8>>;
}

/// Fuente por defecto: escribe un marcador en lugar del audio real.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderAudioSource;

impl AudioSource for PlaceholderAudioSource {
    fn fetch_audio(&self, track_id: &str) -> Result<Vec<u8>> {
        Ok(format!("Offline audio placeholder for: {}", track_id).into_bytes())
    }
}

/// Metadata del llamador enriquecida con `trackId`, `cachedAt` y `filePath`.
///
/// Si la metadata no es un objeto JSON queda anidada bajo `metadata`.
pub fn enrich_metadata(metadata: Value, track_id: &str, cached_at: DateTime<Utc>, file_path: &Path) -> Value {
    let mut object = match metadata {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            let mut object = Map::new();
            object.insert("metadata".to_string(), other);
            object
        }
    };

    object.insert("trackId".to_string(), Value::from(track_id));
    object.insert("cachedAt".to_string(), Value::from(cached_at.to_rfc3339()));
    object.insert("filePath".to_string(), Value::from(file_path.display().to_string()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_offline_key_roundtrip() {
        assert_eq!(offline_key("track42"), "offline_track42");
        assert_eq!(track_id_from_key("offline_track42"), Some("track42"));
        assert_eq!(track_id_from_key("offline_"), None);
        assert_eq!(track_id_from_key("search_rock"), None);
    }

    #[test]
    fn test_enrich_keeps_caller_fields() {
        let at = Utc::now();
        let enriched = enrich_metadata(json!({"title": "X"}), "t1", at, Path::new("/c/audio/t1.mp3"));
        assert_eq!(
            enriched,
            json!({
                "title": "X",
                "trackId": "t1",
                "cachedAt": at.to_rfc3339(),
                "filePath": "/c/audio/t1.mp3",
            })
        );
    }

    #[test]
    fn test_enrich_wraps_scalars() {
        let enriched = enrich_metadata(json!("raw"), "t1", Utc::now(), Path::new("a.mp3"));
        assert_eq!(enriched["metadata"], json!("raw"));
        assert_eq!(enriched["trackId"], json!("t1"));
    }

    #[test]
    fn test_placeholder_mentions_track() {
        let bytes = PlaceholderAudioSource.fetch_audio("t9").unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Offline audio placeholder for: t9");
    }
}
