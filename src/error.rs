use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errores internos de las operaciones que tocan disco.
///
/// Nunca cruzan la API pública de [`crate::cache::MusicCache`]: allí se
/// registran con `tracing` y se convierten en un fallo blando (miss, `false`
/// o resultado vacío).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O {operation} failed: {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error in {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("Audio source failed for track {track_id}: {message}")]
    AudioSource { track_id: String, message: String },
}

impl CacheError {
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn serialization(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// `true` si el archivo desapareció entre el listado y la operación.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = CacheError::io(
            "write",
            "/tmp/cache/items/a.cache",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "I/O write failed: /tmp/cache/items/a.cache");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        let err = CacheError::io(
            "metadata",
            "gone.mp3",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
        assert!(!CacheError::InvalidKey(String::new()).is_not_found());
    }
}
