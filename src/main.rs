use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use music_cache::cache::MusicCache;
use music_cache::config::CacheConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("music_cache=debug".parse()?),
        )
        .init();

    info!("🎵 Iniciando Music Cache v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = CacheConfig::load()?;
    info!("{}", config.summary());

    let cache = Arc::new(MusicCache::new(config.clone()));

    // Comandos administrativos de una sola ejecución
    if std::env::args().any(|arg| arg == "--stats") {
        cache.restore_from_disk();
        println!("{}", serde_json::to_string_pretty(&cache.stats())?);
        return Ok(());
    }
    if std::env::args().any(|arg| arg == "--clear") {
        cache.clear_all();
        return Ok(());
    }
    if std::env::args().any(|arg| arg == "--maintain") {
        cache.restore_from_disk();
        if let Some(report) = cache.run_maintenance() {
            info!("🧹 Mantenimiento completado: {:?}", report);
        }
        return Ok(());
    }

    if !cache.is_enabled() {
        info!("Caché deshabilitada, nada que mantener");
        return Ok(());
    }

    cache.restore_from_disk();
    info!("{}", cache.stats());

    let maintenance = cache.spawn_maintenance(config.maintenance_interval);
    info!(
        "🚀 Mantenimiento periódico cada {}",
        humantime::format_duration(config.maintenance_interval)
    );

    // Manejar shutdown graceful
    tokio::signal::ctrl_c().await?;
    info!("⚠️ Señal de shutdown recibida, cerrando...");
    maintenance.abort();
    info!("{}", cache.stats());

    Ok(())
}
