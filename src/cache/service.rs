use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::disk::{file_stem_for, ArtifactKind, DiskMirror};
use super::entry::CacheEntry;
use super::janitor::{self, JanitorReport};
use super::offline::{self, AudioSource, PlaceholderAudioSource};
use super::store::EntryStore;
use super::{CachePayload, Record};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, DEFAULT_MAINTENANCE_INTERVAL_SECS};

/// Caché de contenido con espejo en disco.
///
/// La memoria es la fuente de verdad para las lecturas; el disco es un
/// respaldo best-effort. Ningún método público devuelve errores: los fallos
/// de I/O se registran y se degradan a miss, `false` o resultado vacío.
///
/// Con `enabled = false` todas las operaciones son no-ops y no se toca el disco.
pub struct MusicCache {
    config: CacheConfig,
    store: EntryStore,
    disk: DiskMirror,
    clock: Arc<dyn Clock>,
    audio_source: Arc<dyn AudioSource>,
    maintenance_running: AtomicBool,
}

impl std::fmt::Debug for MusicCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicCache")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Resultado de una pasada de mantenimiento.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Entradas expiradas eliminadas de memoria.
    pub expired_entries: usize,
    /// Archivos eliminados por antigüedad.
    pub stale_files_removed: usize,
    pub stale_bytes_freed: u64,
    pub janitor: JanitorReport,
}

/// Estadísticas de la caché
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub entry_count: usize,
    pub total_disk_bytes: u64,
    pub total_size_mb: u64,
    pub max_disk_mb: i64,
    pub offline_track_count: usize,
    pub oldest_entry_timestamp: Option<DateTime<Utc>>,
    pub newest_entry_timestamp: Option<DateTime<Utc>>,
    pub storage_path: PathBuf,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.enabled {
            return write!(f, "📊 Cache Stats: disabled");
        }
        write!(
            f,
            "📊 Cache Stats:\n\
             📁 Storage Path: {}\n\
             📝 Entries: {} in memory\n\
             🎵 Offline Tracks: {}\n\
             📦 Disk Usage: {} bytes ({} MB of {})",
            self.storage_path.display(),
            self.entry_count.to_formatted_string(&Locale::en),
            self.offline_track_count.to_formatted_string(&Locale::en),
            self.total_disk_bytes.to_formatted_string(&Locale::en),
            self.total_size_mb,
            if self.max_disk_mb > 0 {
                format!("{} MB", self.max_disk_mb)
            } else {
                "unlimited".to_string()
            }
        )
    }
}

/// Libera la marca de mantenimiento aunque la pasada haga panic.
struct MaintenanceGuard<'a>(&'a AtomicBool);

impl Drop for MaintenanceGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MusicCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(PlaceholderAudioSource))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(config, clock, Arc::new(PlaceholderAudioSource))
    }

    /// Construye la caché y prepara el directorio raíz (idempotente).
    pub fn with_parts(config: CacheConfig, clock: Arc<dyn Clock>, audio_source: Arc<dyn AudioSource>) -> Self {
        let disk = DiskMirror::new(&config.storage_path);

        if config.enabled {
            match disk.init() {
                Ok(()) => info!("🗄️ Caché iniciada en: {}", config.storage_path.display()),
                Err(e) => warn!("Error inicializando directorio de caché, solo memoria: {}", e),
            }
        } else {
            info!("🗄️ Caché deshabilitada por configuración");
        }

        Self {
            config,
            store: EntryStore::new(),
            disk,
            clock,
            audio_source,
            maintenance_running: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Guarda una lista de registros (resultados de búsqueda, listados).
    pub fn put(&self, key: &str, records: Vec<Record>, ttl_secs: i64) {
        self.put_payload(key, CachePayload::Records(records), ttl_secs);
    }

    /// Guarda resultados de búsqueda con el TTL de búsqueda configurado.
    pub fn put_search(&self, key: &str, records: Vec<Record>) {
        self.put(key, records, self.config.search_ttl_secs);
    }

    /// Guarda un objeto único. Devuelve `false` solo si la caché está deshabilitada.
    pub fn put_object(&self, key: &str, value: Value, ttl_secs: i64) -> bool {
        self.put_payload(key, CachePayload::Object(value), ttl_secs)
    }

    /// Escribe en memoria, luego en disco (best-effort) y dispara mantenimiento.
    pub fn put_payload(&self, key: &str, payload: CachePayload, ttl_secs: i64) -> bool {
        if !self.config.enabled {
            return false;
        }

        let entry = CacheEntry::new(key, payload, ttl_secs, self.clock.now());
        self.store.insert(entry.clone());

        match self.disk.write_item(&entry) {
            Ok(path) => debug!("💾 Entrada persistida: {}", path.display()),
            Err(e) => warn!("Error persistiendo entrada {:?} en disco: {}", key, e),
        }

        self.run_maintenance();
        true
    }

    /// Registros guardados bajo `key`, si la entrada existe, está viva y es una lista.
    pub fn get(&self, key: &str) -> Option<Vec<Record>> {
        match self.get_payload(key)? {
            CachePayload::Records(records) => Some(records),
            CachePayload::Object(_) => {
                debug!("Entrada {:?} no es una lista de registros", key);
                None
            }
        }
    }

    /// Objeto guardado bajo `key`, si la entrada existe, está viva y es un objeto.
    pub fn get_object(&self, key: &str) -> Option<Value> {
        match self.get_payload(key)? {
            CachePayload::Object(value) => Some(value),
            CachePayload::Records(_) => {
                debug!("Entrada {:?} no es un objeto", key);
                None
            }
        }
    }

    pub fn get_payload(&self, key: &str) -> Option<CachePayload> {
        if !self.config.enabled {
            return None;
        }
        self.store.get_live(key, self.clock.now()).map(|entry| entry.payload)
    }

    /// Guarda una pista para reproducción offline.
    ///
    /// Materializa el audio en `audio/<trackId>.<ext>` (si aún no existe) y
    /// registra la metadata bajo `offline_<trackId>` con el TTL offline.
    pub fn save_offline(&self, track_id: &str, metadata: Value) -> bool {
        if !self.config.enabled {
            return false;
        }

        let path = match self.disk.audio_path(track_id, &self.config.audio_extension) {
            Ok(path) => path,
            Err(e) => {
                warn!("No se puede guardar offline: {}", e);
                return false;
            }
        };

        if path.is_file() {
            debug!("Audio ya en caché: {}", track_id);
        } else {
            let bytes = match self.audio_source.fetch_audio(track_id) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Error obteniendo audio para {}: {}", track_id, e);
                    return false;
                }
            };
            if let Err(e) = self.disk.write_atomic(&path, &bytes) {
                warn!("Error guardando audio offline para {}: {}", track_id, e);
                return false;
            }
        }

        let metadata = offline::enrich_metadata(metadata, track_id, self.clock.now(), &absolute(&path));
        let stored = self.put_object(&offline::offline_key(track_id), metadata, self.config.offline_ttl_secs);
        if stored {
            info!("🎵 Pista guardada para offline: {}", track_id);
        }
        stored
    }

    /// Ruta absoluta del audio offline, comprobada directamente en disco.
    pub fn get_offline_path(&self, track_id: &str) -> Option<PathBuf> {
        if !self.config.enabled {
            return None;
        }
        self.disk
            .find_audio(track_id, &self.config.audio_extension)
            .map(|path| absolute(&path))
    }

    pub fn is_offline_available(&self, track_id: &str) -> bool {
        self.get_offline_path(track_id).is_some()
    }

    /// Ids de pistas offline: claves `offline_*` vivas en memoria más audios en disco.
    pub fn list_offline_keys(&self) -> Vec<String> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let from_memory = self
            .store
            .live_keys(self.clock.now())
            .into_iter()
            .filter_map(|key| offline::track_id_from_key(&key).map(str::to_string));

        let from_disk = match self.disk.audio_track_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Error listando audio offline: {}", e);
                Vec::new()
            }
        };

        for track_id in from_memory.chain(from_disk) {
            if seen.insert(track_id.clone()) {
                keys.push(track_id);
            }
        }
        keys
    }

    pub fn stats(&self) -> CacheStats {
        if !self.config.enabled {
            return CacheStats {
                enabled: false,
                entry_count: 0,
                total_disk_bytes: 0,
                total_size_mb: 0,
                max_disk_mb: self.config.max_size_mb,
                offline_track_count: 0,
                oldest_entry_timestamp: None,
                newest_entry_timestamp: None,
                storage_path: self.config.storage_path.clone(),
            };
        }

        let total_disk_bytes = self.disk.total_size();
        let bounds = self.store.timestamp_bounds();
        CacheStats {
            enabled: true,
            entry_count: self.store.len(),
            total_disk_bytes,
            total_size_mb: total_disk_bytes / (1024 * 1024),
            max_disk_mb: self.config.max_size_mb,
            offline_track_count: self.list_offline_keys().len(),
            oldest_entry_timestamp: bounds.map(|(oldest, _)| oldest),
            newest_entry_timestamp: bounds.map(|(_, newest)| newest),
            storage_path: self.config.storage_path.clone(),
        }
    }

    /// Vacía la memoria y recrea el directorio raíz.
    pub fn clear_all(&self) {
        if !self.config.enabled {
            return;
        }

        self.store.clear();
        match self.disk.reset() {
            Ok(()) => info!("🧹 Caché limpiada correctamente"),
            Err(e) => warn!("Error limpiando caché en disco: {}", e),
        }
    }

    /// Recarga en memoria las entradas vivas de `items/*.cache`.
    ///
    /// Los archivos expirados o ilegibles se eliminan. Una entrada ya presente
    /// en memoria no se reemplaza. Retorna cuántas entradas se cargaron.
    pub fn restore_from_disk(&self) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let files = match self.disk.item_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Error cargando caché persistente: {}", e);
                return 0;
            }
        };

        let now = self.clock.now();
        let mut loaded = 0;
        for path in files {
            match self.disk.read_item(&path) {
                Ok(entry) if entry.is_live(now) => {
                    if self.store.insert_if_absent(entry) {
                        loaded += 1;
                    }
                }
                Ok(_) => self.discard_file(&path),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Entrada de caché ilegible, eliminando: {}", e);
                    self.discard_file(&path);
                }
            }
        }

        if loaded > 0 {
            info!("📂 Cargadas {} entradas de caché desde disco", loaded);
        }
        loaded
    }

    /// Limpieza por TTL, por antigüedad en disco y por capacidad.
    ///
    /// Devuelve `None` si la caché está deshabilitada o si ya hay otra pasada
    /// en curso.
    pub fn run_maintenance(&self) -> Option<MaintenanceReport> {
        if !self.config.enabled {
            return None;
        }
        if self.maintenance_running.swap(true, Ordering::AcqRel) {
            debug!("Mantenimiento ya en curso, omitiendo");
            return None;
        }
        let _guard = MaintenanceGuard(&self.maintenance_running);

        let now = self.clock.now();
        let expired_entries = self.store.cleanup_expired(now);

        let protected: HashSet<String> = if self.config.protect_live_entries {
            self.store
                .live_keys(now)
                .iter()
                .filter_map(|key| file_stem_for(key).ok())
                .collect()
        } else {
            HashSet::new()
        };
        let sweep = self.disk.sweep_stale(now, self.config.disk_retention, |artifact| {
            match &artifact.kind {
                ArtifactKind::Item { stem } => protected.contains(stem),
                ArtifactKind::Audio { track_id } => protected.contains(&offline::offline_key(track_id)),
                _ => false,
            }
        });

        let janitor = janitor::enforce_ceiling(&self.disk, self.config.max_size_bytes());
        for track_id in &janitor.removed_tracks {
            // Sin audio la entrada offline ya no describe nada reproducible
            let key = offline::offline_key(track_id);
            if self.store.remove(&key).is_some() {
                debug!("Entrada offline descartada tras borrar su audio: {}", key);
            }
            if let Ok(path) = self.disk.item_path(&key) {
                self.discard_file(&path);
            }
        }

        Some(MaintenanceReport {
            expired_entries,
            stale_files_removed: sweep.files_removed,
            stale_bytes_freed: sweep.bytes_freed,
            janitor,
        })
    }

    /// Lanza el mantenimiento periódico en el runtime de tokio.
    ///
    /// El primer tick se ejecuta de inmediato. Cada pasada corre en el pool
    /// bloqueante porque recorre el disco. Un intervalo cero se reemplaza por
    /// el configurado (o el de por defecto si ese también es cero).
    pub fn spawn_maintenance(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let every = if !every.is_zero() {
            every
        } else if !self.config.maintenance_interval.is_zero() {
            warn!("Intervalo de mantenimiento cero, usando el configurado");
            self.config.maintenance_interval
        } else {
            warn!("Intervalo de mantenimiento cero, usando el de por defecto");
            Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS)
        };

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let pass = Arc::clone(&cache);
                match tokio::task::spawn_blocking(move || pass.run_maintenance()).await {
                    Ok(Some(report)) => debug!("Mantenimiento de caché completado: {:?}", report),
                    Ok(None) => {}
                    Err(e) => warn!("Error en mantenimiento automático de la caché: {}", e),
                }
            }
        })
    }

    fn discard_file(&self, path: &Path) {
        if let Err(e) = self.disk.remove_file(path) {
            warn!("Error eliminando archivo de caché: {}", e);
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
