//! # Sensor Device
//!
//! Amostra canais de sensores e envia snapshots periódicos para o collector
//! via POST CoAP confirmável. Duas threads de vida longa: a de amostragem
//! (produtora da fila) e a principal, que consome a fila e dirige o
//! transporte com send/recv estritamente alternados.

mod link;
mod queue;
mod sampler;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use link::LinkGate;
use queue::snapshot_queue;
use sensor_core::config::AppConfig;
use sensor_core::{SensorRegistry, encode_snapshot};
use tracing::{debug, error, warn};
use transport::{CoapClient, RecvOutcome};

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
    let device_cfg = &config.device;

    // ── Registry, fila e gate de link ──
    let registry = Arc::new(SensorRegistry::new());
    let (producer, consumer) = snapshot_queue();
    let gate = Arc::new(LinkGate::new());

    sampler::spawn_sampler_thread(
        Arc::clone(&registry),
        producer,
        Arc::clone(&gate),
        Duration::from_millis(device_cfg.sample_interval_ms),
    );

    // ── Transporte CoAP ──
    // A resolução do collector e o bind do socket fazem as vezes do
    // bring-up de rede: só depois deles o gate é sinalizado.
    let mut client = CoapClient::connect(
        &device_cfg.server_host,
        device_cfg.server_port,
        Duration::from_millis(device_cfg.recv_timeout_ms),
    )
    .expect("Falha ao iniciar transporte CoAP");

    gate.signal();

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   SENSOR DEVICE – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Collector: {}", client.peer());
    println!("  Intervalo: {} ms", device_cfg.sample_interval_ms);
    println!("  Recurso:   {}", sensor_core::SNAPSHOT_RESOURCE);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop de envio ──
    while let Some(snapshot) = consumer.get() {
        let body = match encode_snapshot(&snapshot) {
            Ok(body) => body,
            Err(e) => {
                error!("Falha ao codificar snapshot: {e} — descartando");
                continue;
            }
        };

        debug!(
            "Enviando snapshot: {} leituras, {} bytes",
            snapshot.readings.len(),
            body.len()
        );
        debug!("{}", String::from_utf8_lossy(&body));

        if let Err(e) = client.send(&body) {
            error!("Falha no envio CoAP: {e} — descartando snapshot");
            continue;
        }

        match client.recv() {
            Ok(RecvOutcome::Completed) => {}
            // Timeout já logado; snapshot dado como perdido, sem retry
            Ok(RecvOutcome::TimedOut) => {}
            Err(e) => error!("Erro ao aguardar resposta CoAP: {e}"),
        }
    }
}
