use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// TTL por defecto para pistas guardadas offline (30 días).
pub const DEFAULT_OFFLINE_TTL_SECS: i64 = 2_592_000;
/// Retención de archivos en disco para la limpieza por antigüedad (7 días).
pub const DEFAULT_DISK_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
/// Intervalo del mantenimiento periódico (5 minutos).
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    // Paths
    pub storage_path: PathBuf,

    // Features
    pub enabled: bool,
    pub protect_live_entries: bool,

    // Límites
    /// Techo del tamaño en disco; `0` o negativo desactiva el límite.
    pub max_size_mb: i64,
    pub disk_retention: Duration,

    // TTLs (en segundos, `<= 0` = nunca expira)
    pub offline_ttl_secs: i64,
    /// TTL de los resultados de búsqueda guardados con `MusicCache::put_search`.
    pub search_ttl_secs: i64,

    // Mantenimiento
    pub maintenance_interval: Duration,

    // Audio offline
    pub audio_extension: String,
}

impl CacheConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Paths
            storage_path: std::env::var("CACHE_STORAGE_PATH")
                .unwrap_or_else(|_| "./cache".to_string())
                .into(),

            // Features
            enabled: std::env::var("CACHE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            protect_live_entries: std::env::var("CACHE_PROTECT_LIVE_ENTRIES")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            // Límites
            max_size_mb: std::env::var("CACHE_MAX_SIZE_MB")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()?,
            disk_retention: Duration::from_secs(
                std::env::var("CACHE_DISK_RETENTION_SECS")
                    .unwrap_or_else(|_| DEFAULT_DISK_RETENTION_SECS.to_string())
                    .parse()?,
            ),

            // TTLs
            offline_ttl_secs: std::env::var("CACHE_OFFLINE_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_OFFLINE_TTL_SECS.to_string())
                .parse()?,
            search_ttl_secs: std::env::var("CACHE_SEARCH_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hora
                .parse()?,

            // Mantenimiento
            maintenance_interval: Duration::from_secs(
                std::env::var("CACHE_MAINTENANCE_INTERVAL_SECS")
                    .unwrap_or_else(|_| DEFAULT_MAINTENANCE_INTERVAL_SECS.to_string())
                    .parse()?,
            ),

            audio_extension: std::env::var("CACHE_AUDIO_EXTENSION")
                .unwrap_or_else(|_| "mp3".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Configuración por defecto con la raíz de caché en `storage_path`.
    ///
    /// Pensado para tests y para quien construye la caché sin entorno.
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Disk retention and maintenance interval must be greater than zero
    /// - The audio extension must be a bare, non-empty extension (`mp3`, not `.mp3`)
    ///
    /// A non-positive `max_size_mb` is valid and means "no size limit".
    pub fn validate(&self) -> Result<()> {
        if self.disk_retention.is_zero() {
            anyhow::bail!("Disk retention must be greater than 0");
        }

        if self.maintenance_interval.is_zero() {
            anyhow::bail!("Maintenance interval must be greater than 0");
        }

        if self.audio_extension.is_empty()
            || self.audio_extension.contains('.')
            || self.audio_extension.contains(std::path::is_separator)
        {
            anyhow::bail!(
                "Audio extension must be a bare extension like \"mp3\", got: {:?}",
                self.audio_extension
            );
        }

        Ok(())
    }

    /// Límite en bytes, o `None` si el límite está desactivado.
    ///
    /// Un techo que no cabe en `u64` bytes se satura a `u64::MAX`.
    pub fn max_size_bytes(&self) -> Option<u64> {
        (self.max_size_mb > 0).then(|| (self.max_size_mb as u64).saturating_mul(1024 * 1024))
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Cache Config Summary:\n  \
            Storage: {} (enabled={})\n  \
            Limits: {}, disk retention {}\n  \
            TTLs: offline {}, search {}\n  \
            Maintenance: every {}, protect live entries={}",
            self.storage_path.display(),
            self.enabled,
            self.max_size_bytes()
                .map_or("no size limit".to_string(), |_| format!("{}MB max", self.max_size_mb)),
            humantime::format_duration(self.disk_retention),
            format_ttl(self.offline_ttl_secs),
            format_ttl(self.search_ttl_secs),
            humantime::format_duration(self.maintenance_interval),
            self.protect_live_entries,
        )
    }
}

fn format_ttl(ttl_secs: i64) -> String {
    if ttl_secs <= 0 {
        "never expires".to_string()
    } else {
        humantime::format_duration(Duration::from_secs(ttl_secs as u64)).to_string()
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_path: "./cache".into(),
            enabled: true,
            protect_live_entries: true,
            max_size_mb: 1024,
            disk_retention: Duration::from_secs(DEFAULT_DISK_RETENTION_SECS),
            offline_ttl_secs: DEFAULT_OFFLINE_TTL_SECS,
            search_ttl_secs: 3600,
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            audio_extension: "mp3".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_size_bytes(), Some(1024 * 1024 * 1024));
        assert_eq!(config.offline_ttl_secs, 2_592_000);
    }

    #[test]
    fn test_non_positive_ceiling_means_unlimited() {
        let mut config = CacheConfig::default();
        config.max_size_mb = 0;
        assert_eq!(config.max_size_bytes(), None);
        config.max_size_mb = -5;
        assert_eq!(config.max_size_bytes(), None);
        assert!(config.validate().is_ok());
        assert!(config.summary().contains("no size limit"));
    }

    #[test]
    fn test_huge_ceiling_saturates() {
        let mut config = CacheConfig::default();
        config.max_size_mb = 1 << 44;
        assert_eq!(config.max_size_bytes(), Some(u64::MAX));
        config.max_size_mb = i64::MAX;
        assert_eq!(config.max_size_bytes(), Some(u64::MAX));
        assert!(config.validate().is_ok());
        assert!(config.summary().contains(&format!("{}MB max", i64::MAX)));
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let mut config = CacheConfig::default();
        config.audio_extension = ".mp3".to_string();
        assert!(config.validate().is_err());
        config.audio_extension = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let mut config = CacheConfig::default();
        config.maintenance_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.disk_retention = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_mentions_ttls() {
        let summary = CacheConfig::with_storage_path("/srv/cache").summary();
        assert!(summary.contains("/srv/cache"));
        assert!(summary.contains("offline 30days"));
        assert!(summary.contains("search 1h"));
    }
}
