//! Thread de amostragem.
//!
//! Registra o conjunto fixo de canais no boot, espera o link ficar pronto e
//! entra no loop: coleta via sysinfo → update no registry → snapshot →
//! try_put na fila. Com a fila cheia o snapshot é descartado (política lossy
//! da fila); o produtor nunca bloqueia.

use std::sync::Arc;
use std::time::Duration;

use sensor_core::{ChannelId, RegistryError, SensorRegistry, SensorType, SensorValue};
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, error, info};

use crate::link::LinkGate;
use crate::queue::SnapshotProducer;

/// Canais fixos do device.
struct DeviceChannels {
    cpu_usage: ChannelId,
    ram_percent: ChannelId,
    cpu_temp: ChannelId,
}

/// Fontes de leitura do device, via sysinfo.
struct Sampler {
    sys: System,
    components: Components,
}

impl Sampler {
    fn new() -> Self {
        Self {
            sys: System::new_with_specifics(
                RefreshKind::nothing()
                    .with_cpu(CpuRefreshKind::everything())
                    .with_memory(MemoryRefreshKind::everything()),
            ),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Atualiza os subsistemas e retorna (uso de CPU %, RAM %, temp CPU °C).
    fn collect(&mut self) -> (f32, f32, f32) {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.components.refresh(true);

        let cpu_usage = self.sys.global_cpu_usage();

        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        let ram_percent = if total > 0.0 {
            (used / total * 100.0) as f32
        } else {
            0.0
        };

        (cpu_usage, ram_percent, self.cpu_temp())
    }

    /// Maior temperatura plausível entre os components rotulados como CPU.
    fn cpu_temp(&self) -> f32 {
        let mut temp = 0.0_f32;
        for comp in self.components.iter() {
            let label = comp.label().to_lowercase();
            if label.contains("cpu")
                || label.contains("tctl")
                || label.contains("tdie")
                || label.contains("package")
                || label.contains("core")
            {
                if let Some(t) = comp.temperature() {
                    if t > temp && t < 150.0 {
                        temp = t;
                    }
                }
            }
        }
        temp
    }
}

/// Inicia a thread de amostragem (lado produtor da fila).
pub fn spawn_sampler_thread(
    registry: Arc<SensorRegistry>,
    producer: SnapshotProducer,
    gate: Arc<LinkGate>,
    interval: Duration,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("sampler".into())
        .spawn(move || sampler_loop(&registry, &producer, &gate, interval))
        .expect("Falha ao criar thread de amostragem")
}

fn sampler_loop(
    registry: &SensorRegistry,
    producer: &SnapshotProducer,
    gate: &LinkGate,
    interval: Duration,
) {
    let channels = match register_channels(registry) {
        Ok(channels) => channels,
        Err(e) => {
            error!("Falha ao registrar canais de sensores: {e} — abortando thread");
            return;
        }
    };

    info!("Aguardando link ficar pronto...");
    gate.wait();
    info!("Link pronto — iniciando amostragem");

    let mut sampler = Sampler::new();
    loop {
        let (cpu_usage, ram_percent, cpu_temp) = sampler.collect();
        let _ = registry.update(channels.cpu_usage, SensorValue::Float(cpu_usage));
        let _ = registry.update(channels.ram_percent, SensorValue::Float(ram_percent));
        let _ = registry.update(channels.cpu_temp, SensorValue::Float(cpu_temp));

        let snapshot = registry.snapshot();
        if producer.try_put(snapshot) {
            debug!("Snapshot enfileirado");
        }

        std::thread::sleep(interval);
    }
}

fn register_channels(registry: &SensorRegistry) -> Result<DeviceChannels, RegistryError> {
    Ok(DeviceChannels {
        cpu_usage: registry.register("cpu_usage", SensorType::Float)?,
        ram_percent: registry.register("ram_percent", SensorType::Float)?,
        cpu_temp: registry.register("cpu_temp", SensorType::Float)?,
    })
}
