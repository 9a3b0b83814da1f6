//! # Sensor Core
//!
//! Crate compartilhada entre o device e o collector: tipos de canais,
//! registry thread-safe, codec do formato wire e configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Canais, valores, leituras e snapshots
//! - [`registry`] – Registry limitado com exclusão mútua interna
//! - [`codec`] – Encode/decode JSON do recurso `sensor/snapshot`
//! - [`config`] – Configuração unificada via TOML

pub mod codec;
pub mod config;
pub mod registry;
pub mod types;

// Re-exports convenientes
pub use codec::{CodecError, decode_snapshot, encode_snapshot};
pub use config::{AppConfig, CollectorConfig, DeviceConfig};
pub use registry::{ChannelId, RegistryError, SensorRegistry};
pub use types::{MAX_CHANNELS, NAME_MAX_LEN, Reading, SensorType, SensorValue, Snapshot};

/// Caminho do recurso CoAP que recebe snapshots.
pub const SNAPSHOT_RESOURCE: &str = "sensor/snapshot";
