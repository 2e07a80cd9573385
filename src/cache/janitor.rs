//! Control del tamaño total en disco.
//!
//! Cuando la huella supera el techo configurado, se borran los artefactos
//! más antiguos (por fecha de modificación) hasta bajar al 80% del techo.
//! Cada borrado es de un archivo completo, así que abortar a mitad de pasada
//! deja una caché más pequeña pero nunca un archivo corrupto.

use std::path::Path;
use tracing::{debug, info, warn};

use super::disk::{ArtifactKind, DiskArtifact, DiskMirror};
use crate::error::Result;

/// Porcentaje del techo al que baja una pasada.
const TARGET_PERCENT: u128 = 80;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JanitorReport {
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub files_removed: usize,
    pub bytes_freed: u64,
    /// Archivos que no se pudieron borrar (se saltan, la pasada continúa).
    pub failures: usize,
    /// Ids de pista cuyo audio fue eliminado.
    pub removed_tracks: Vec<String>,
}

/// Nivel al que una pasada reduce la huella para un techo dado.
pub fn target_bytes(max_bytes: u64) -> u64 {
    (max_bytes as u128 * TARGET_PERCENT / 100) as u64
}

/// Aplica el techo `max_bytes` sobre el espejo en disco.
///
/// `None` desactiva el límite: la pasada solo mide la huella.
pub fn enforce_ceiling(disk: &DiskMirror, max_bytes: Option<u64>) -> JanitorReport {
    evict_oldest(disk.scan(), max_bytes, |path| disk.remove_file(path))
}

/// Pasada sobre un snapshot ya tomado; `remove` borra un archivo.
fn evict_oldest<F>(artifacts: Vec<DiskArtifact>, max_bytes: Option<u64>, mut remove: F) -> JanitorReport
where
    F: FnMut(&Path) -> Result<()>,
{
    let mut total: u64 = artifacts.iter().map(|a| a.size).sum();
    let mut report = JanitorReport {
        bytes_before: total,
        ..JanitorReport::default()
    };

    let Some(max_bytes) = max_bytes else {
        report.bytes_after = total;
        return report;
    };
    if total <= max_bytes {
        report.bytes_after = total;
        return report;
    }

    let target = target_bytes(max_bytes);
    info!(
        "📦 Límite de caché excedido ({} > {} bytes), limpiando hasta {} bytes",
        total, max_bytes, target
    );

    let mut candidates: Vec<_> = artifacts
        .into_iter()
        .filter(|a| a.kind.is_eviction_candidate())
        .collect();
    // Más antiguos primero; la ruta desempata para que el orden sea estable
    candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    for artifact in candidates {
        if total <= target {
            break;
        }
        match remove(&artifact.path) {
            Ok(()) => {
                total = total.saturating_sub(artifact.size);
                report.files_removed += 1;
                report.bytes_freed += artifact.size;
                if let ArtifactKind::Audio { track_id } = artifact.kind {
                    report.removed_tracks.push(track_id);
                }
                debug!("🗑️ Eliminado por capacidad: {}", artifact.path.display());
            }
            Err(e) => {
                report.failures += 1;
                warn!("No se pudo eliminar {}: {}", artifact.path.display(), e);
            }
        }
    }

    report.bytes_after = total;
    if total > target {
        warn!(
            "⚠️ La caché sigue en {} bytes tras la limpieza (objetivo {} bytes)",
            total, target
        );
    }
    info!(
        "🧹 Janitor: {} archivos eliminados, {} bytes liberados",
        report.files_removed, report.bytes_freed
    );
    report
}
