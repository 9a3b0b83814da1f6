//! # Sensor Collector
//!
//! Recebe snapshots via POST CoAP no recurso `sensor/snapshot` e persiste
//! cada leitura em SQLite. Ctrl-C encerra o loop cooperativamente entre
//! polls; o teardown é a ordem natural dos drops.

mod server;
mod storage;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sensor_core::SensorRegistry;
use sensor_core::config::AppConfig;
use server::CoapServer;
use storage::SqliteStore;
use tracing::{info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for err in config.validate() {
        warn!("Config: {err}");
    }
    let collector_cfg = &config.collector;

    // ── Banco de dados ──
    let store =
        SqliteStore::open(Path::new(&collector_cfg.db_path)).expect("Falha ao abrir banco de dados");

    // ── Registry ──
    let registry = Arc::new(SensorRegistry::new());

    // ── Sinal de parada (Ctrl-C) ──
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .expect("Falha ao instalar handler de Ctrl-C");
    }

    // ── Servidor CoAP ──
    let server = CoapServer::bind(
        collector_cfg.port,
        Arc::clone(&registry),
        store,
        Duration::from_millis(collector_cfg.poll_interval_ms),
    )
    .expect("Falha ao abrir endpoint CoAP");

    server.run(&stop);

    info!("Collector encerrado ({} canais conhecidos)", registry.len());
}
