//! Espejo en disco de la caché.
//!
//! Layout bajo la raíz:
//!
//! ```text
//! <root>/audio/<trackId>.<ext>   audio offline
//! <root>/images/                 artwork
//! <root>/metadata/
//! <root>/items/<key>.cache       entradas genéricas serializadas en JSON
//! ```
//!
//! Todas las escrituras pasan por un archivo temporal oculto en el mismo
//! directorio seguido de `rename`, de modo que nadie observa un archivo a
//! medio escribir.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::entry::CacheEntry;
use crate::error::{CacheError, Result};

pub const AUDIO_DIR: &str = "audio";
pub const IMAGES_DIR: &str = "images";
pub const METADATA_DIR: &str = "metadata";
pub const ITEMS_DIR: &str = "items";
pub const ITEM_EXTENSION: &str = "cache";

const SUBDIRS: [&str; 4] = [AUDIO_DIR, IMAGES_DIR, METADATA_DIR, ITEMS_DIR];

/// Clase de un archivo encontrado bajo la raíz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `items/<stem>.cache`
    Item { stem: String },
    /// `audio/<trackId>.<ext>`
    Audio { track_id: String },
    Image,
    Metadata,
    /// Escritura temporal en curso o abandonada.
    Temp,
    Other,
}

impl ArtifactKind {
    /// Archivos que el janitor puede borrar por capacidad.
    pub fn is_eviction_candidate(&self) -> bool {
        matches!(self, Self::Item { .. } | Self::Audio { .. } | Self::Image)
    }
}

#[derive(Debug, Clone)]
pub struct DiskArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub kind: ArtifactKind,
}

/// Resultado de la limpieza por antigüedad.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

/// Convierte una clave o id de pista en un nombre de archivo seguro.
///
/// Separadores de ruta y NUL se reemplazan por `_`, igual que un punto inicial
/// (los nombres ocultos quedan reservados para temporales).
pub fn file_stem_for(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(CacheError::InvalidKey(raw.to_string()));
    }

    let mut stem: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if stem.starts_with('.') {
        stem.replace_range(..1, "_");
    }
    Ok(stem)
}

#[derive(Debug)]
pub struct DiskMirror {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Crea la raíz y los subdirectorios. Idempotente.
    pub fn init(&self) -> Result<()> {
        for sub in SUBDIRS {
            let dir = self.root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| CacheError::io("create_dir", &dir, e))?;
        }
        debug!("📁 Directorio de caché listo en: {}", self.root.display());
        Ok(())
    }

    pub fn item_path(&self, key: &str) -> Result<PathBuf> {
        let stem = file_stem_for(key)?;
        Ok(self.root.join(ITEMS_DIR).join(format!("{}.{}", stem, ITEM_EXTENSION)))
    }

    pub fn audio_path(&self, track_id: &str, extension: &str) -> Result<PathBuf> {
        let stem = file_stem_for(track_id)?;
        Ok(self.root.join(AUDIO_DIR).join(format!("{}.{}", stem, extension)))
    }

    /// Escribe `bytes` en `path` de forma atómica (temporal + rename).
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| CacheError::InvalidKey(path.display().to_string()))?;
        fs::create_dir_all(parent).map_err(|e| CacheError::io("create_dir", parent, e))?;

        // El nombre temporal no depende del destino para no exceder el
        // límite de longitud de nombre del sistema de archivos.
        let tmp = parent.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io("write", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io("rename", path, e));
        }
        Ok(())
    }

    /// Persiste una entrada en `items/<key>.cache`.
    pub fn write_item(&self, entry: &CacheEntry) -> Result<PathBuf> {
        let path = self.item_path(&entry.key)?;
        let content = serde_json::to_vec_pretty(entry).map_err(|e| CacheError::serialization(&path, e))?;
        self.write_atomic(&path, &content)?;
        Ok(path)
    }

    pub fn read_item(&self, path: &Path) -> Result<CacheEntry> {
        let content = fs::read(path).map_err(|e| CacheError::io("read", path, e))?;
        serde_json::from_slice(&content).map_err(|e| CacheError::serialization(path, e))
    }

    /// Rutas de todos los `items/*.cache` visibles.
    pub fn item_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(ITEMS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io("read_dir", &dir, e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                !is_hidden(path) && path.extension().is_some_and(|ext| ext == ITEM_EXTENSION)
            })
            .collect())
    }

    /// Borra un archivo; que ya no exista no es un error.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("remove", path, e)),
        }
    }

    /// Snapshot de todos los archivos regulares bajo la raíz.
    ///
    /// Archivos que desaparecen durante el recorrido simplemente se omiten.
    pub fn scan(&self) -> Vec<DiskArtifact> {
        if !self.root.exists() {
            return Vec::new();
        }

        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let metadata = e.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                Some(DiskArtifact {
                    kind: self.classify(e.path()),
                    path: e.into_path(),
                    size: metadata.len(),
                    modified: DateTime::<Utc>::from(modified),
                })
            })
            .collect()
    }

    /// Suma de los tamaños de todos los archivos bajo la raíz.
    pub fn total_size(&self) -> u64 {
        self.scan().iter().map(|a| a.size).sum()
    }

    /// Borra los archivos cuya antigüedad supera `retention`, salvo los
    /// que `is_protected` indique.
    pub fn sweep_stale<F>(&self, now: DateTime<Utc>, retention: Duration, is_protected: F) -> SweepOutcome
    where
        F: Fn(&DiskArtifact) -> bool,
    {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return SweepOutcome::default();
        };

        let mut outcome = SweepOutcome::default();
        for artifact in self.scan() {
            if now - artifact.modified <= retention || is_protected(&artifact) {
                continue;
            }
            match self.remove_file(&artifact.path) {
                Ok(()) => {
                    outcome.files_removed += 1;
                    outcome.bytes_freed += artifact.size;
                    debug!("🗑️ Archivo antiguo eliminado: {}", artifact.path.display());
                }
                Err(e) => warn!("Error limpiando archivo de caché: {}", e),
            }
        }

        if outcome.files_removed > 0 {
            info!(
                "🧹 Limpieza de disco: {} archivos antiguos eliminados ({} bytes)",
                outcome.files_removed, outcome.bytes_freed
            );
        }
        outcome
    }

    /// Busca el audio de una pista: primero con la extensión preferida y
    /// luego con cualquier otra.
    pub fn find_audio(&self, track_id: &str, preferred_extension: &str) -> Option<PathBuf> {
        let preferred = self.audio_path(track_id, preferred_extension).ok()?;
        if preferred.is_file() {
            return Some(preferred);
        }

        let stem = file_stem_for(track_id).ok()?;
        fs::read_dir(self.root.join(AUDIO_DIR))
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file() && !is_hidden(path) && path.file_stem().is_some_and(|s| s == stem.as_str())
            })
    }

    /// Ids de pista con audio en disco (nombre de archivo sin extensión).
    pub fn audio_track_ids(&self) -> Result<Vec<String>> {
        let dir = self.root.join(AUDIO_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io("read_dir", &dir, e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && !is_hidden(path))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    /// Borra la raíz completa y la vuelve a crear.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io("remove_dir_all", &self.root, e)),
        }
        self.init()
    }

    fn classify(&self, path: &Path) -> ArtifactKind {
        if is_hidden(path) {
            return ArtifactKind::Temp;
        }

        let Ok(relative) = path.strip_prefix(&self.root) else {
            return ArtifactKind::Other;
        };
        let mut components = relative.components();
        let area = components.next().and_then(|c| c.as_os_str().to_str());
        // Solo archivos directamente dentro del subárea
        let nested = components.count() != 1;
        let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);

        match (area, nested, stem) {
            (Some(ITEMS_DIR), false, Some(stem))
                if path.extension().is_some_and(|ext| ext == ITEM_EXTENSION) =>
            {
                ArtifactKind::Item { stem }
            }
            (Some(AUDIO_DIR), false, Some(track_id)) => ArtifactKind::Audio { track_id },
            (Some(IMAGES_DIR), _, _) => ArtifactKind::Image,
            (Some(METADATA_DIR), _, _) => ArtifactKind::Metadata,
            _ => ArtifactKind::Other,
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
