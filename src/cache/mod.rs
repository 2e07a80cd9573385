//! # Cache Module
//!
//! Disk-backed content cache for the music and podcast backend.
//!
//! The cache stores external API responses (search results, listings) and
//! offline-track descriptors in memory, mirrors every entry to disk on a
//! best-effort basis, and keeps the on-disk footprint bounded.
//!
//! ## Features
//!
//! - **TTL Support**: per-entry time-to-live, `0` or negative never expires
//! - **Lazy + Sweep Expiry**: expired entries vanish on read and on every maintenance pass
//! - **Disk Hygiene**: files older than the retention window are removed
//! - **Size Bounded**: oldest artifacts are deleted down to 80% of the ceiling
//! - **Thread Safety**: concurrent access from any number of request handlers
//! - **Never Throws**: disk failures degrade to memory-only caching
//!
//! ## Disk Layout
//!
//! - `audio/<trackId>.<ext>`: offline audio
//! - `images/`: artwork
//! - `metadata/`
//! - `items/<key>.cache`: generic entries
//!
//! ## Configuration
//!
//! ```env
//! CACHE_STORAGE_PATH=./cache      # Cache root
//! CACHE_ENABLED=true              # false turns every operation into a no-op
//! CACHE_MAX_SIZE_MB=1024          # Disk ceiling, 0 or negative = no limit
//! CACHE_DISK_RETENTION_SECS=604800
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use music_cache::cache::MusicCache;
//! use music_cache::config::CacheConfig;
//! use serde_json::json;
//!
//! # fn example() {
//! let cache = MusicCache::new(CacheConfig::with_storage_path("./cache"));
//!
//! let results = vec![json!({"title": "Song A"}).as_object().unwrap().clone()];
//! cache.put("search_rock", results, 3600);
//!
//! if let Some(cached) = cache.get("search_rock") {
//!     println!("Found {} cached results", cached.len());
//! }
//!
//! cache.save_offline("track42", json!({"title": "X"}));
//! println!("{:?}", cache.get_offline_path("track42"));
//! # }
//! ```

pub mod disk;
pub mod entry;
pub mod janitor;
pub mod offline;
pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use entry::CacheEntry;
pub use janitor::JanitorReport;
pub use offline::{AudioSource, PlaceholderAudioSource};
pub use service::{CacheStats, MaintenanceReport, MusicCache};

/// Un registro genérico (mapa clave → valor JSON).
pub type Record = Map<String, Value>;

/// Contenido de una entrada: exactamente una de las dos formas.
///
/// Quien lee debe saber qué forma guardó: [`MusicCache::get`] solo devuelve
/// listas y [`MusicCache::get_object`] solo objetos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    /// Resultados de búsqueda o listados
    Records(Vec<Record>),
    /// Metadata estructurada (p. ej. descriptores de pistas offline)
    Object(Value),
}
