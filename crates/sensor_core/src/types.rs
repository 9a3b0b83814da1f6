//! Tipos compartilhados do pipeline de telemetria.
//!
//! Cada sensor publica valores em um canal nomeado e tipado; um snapshot é
//! uma cópia imutável e desacoplada dos canais com valor em um instante.

use serde::{Deserialize, Serialize};

/// Número máximo de canais em um registry.
pub const MAX_CHANNELS: usize = 16;

/// Tamanho máximo (em bytes) do nome de um canal.
pub const NAME_MAX_LEN: usize = 64;

// ──────────────────────────────────────────────
// Tipo e valor de canal
// ──────────────────────────────────────────────

/// Tipo declarado de um canal. O valor numérico é a tag `t` do formato wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorType {
    Float,
}

impl SensorType {
    /// Tag numérica usada no campo `"t"` do JSON.
    pub fn tag(self) -> u8 {
        match self {
            SensorType::Float => 0,
        }
    }

    /// Converte a tag wire de volta para o tipo. `None` para tag desconhecida.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SensorType::Float),
            _ => None,
        }
    }
}

/// Valor corrente de um canal. A variante carrega o payload junto da própria
/// tag de tipo, então valor e tipo nunca divergem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorValue {
    Float(f32),
}

impl SensorValue {
    /// Tipo correspondente à variante.
    pub fn sensor_type(self) -> SensorType {
        match self {
            SensorValue::Float(_) => SensorType::Float,
        }
    }

    /// Valor como número JSON (campo `"v"`).
    pub fn as_f64(self) -> f64 {
        match self {
            SensorValue::Float(v) => f64::from(v),
        }
    }
}

// ──────────────────────────────────────────────
// Leituras e snapshots
// ──────────────────────────────────────────────

/// Cópia desacoplada de um canal em um instante. Não guarda nenhum vínculo
/// com o registry de origem; segura para cruzar threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub name: String,
    pub value: SensorValue,
}

/// Lote imutável de leituras capturado atomicamente de um registry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Milissegundos desde a epoch.
    pub timestamp_ms: i64,
    pub readings: Vec<Reading>,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        assert_eq!(
            SensorType::from_tag(SensorType::Float.tag()),
            Some(SensorType::Float)
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(SensorType::from_tag(7), None);
        assert_eq!(SensorType::from_tag(255), None);
    }

    #[test]
    fn value_carries_its_type() {
        let v = SensorValue::Float(21.5);
        assert_eq!(v.sensor_type(), SensorType::Float);
        assert_eq!(v.as_f64(), 21.5);
    }

    #[test]
    fn default_snapshot_is_empty() {
        let s = Snapshot::default();
        assert_eq!(s.timestamp_ms, 0);
        assert!(s.readings.is_empty());
    }
}
