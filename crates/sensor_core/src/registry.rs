//! Registry de canais de sensores.
//!
//! Coleção limitada de canais nomeados com exclusão mútua interna. O device
//! registra seu conjunto fixo de sensores uma única vez no boot
//! ([`SensorRegistry::register`] rejeita duplicatas); o collector descobre
//! canais dinamicamente a partir dos dados recebidos
//! ([`SensorRegistry::register_or_get`] é um upsert idempotente). A
//! assimetria é intencional e reflete invariantes diferentes dos dois lados.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::types::{MAX_CHANNELS, NAME_MAX_LEN, Reading, SensorType, SensorValue, Snapshot};

/// Handle opaco para um canal registrado. Só é válido no registry que o
/// emitiu; nunca atravessa a fronteira de rede.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelId(usize);

#[derive(Debug)]
struct Channel {
    name: String,
    ty: SensorType,
    value: Option<SensorValue>,
}

/// Erros do registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Nome de canal inválido (vazio ou acima de {NAME_MAX_LEN} bytes)")]
    InvalidName,

    #[error("Registry cheio (máximo {0} canais)")]
    CapacityExceeded(usize),

    #[error("Canal `{0}` já registrado")]
    AlreadyRegistered(String),

    #[error("Tipo incompatível para o canal `{channel}`: declarado {declared:?}, recebido {got:?}")]
    TypeMismatch {
        channel: String,
        declared: SensorType,
        got: SensorType,
    },

    #[error("Handle de canal desconhecido")]
    UnknownChannel,
}

/// Coleção limitada de canais, indexada por nome, thread-safe.
///
/// Todas as operações serializam atrás do mesmo mutex; um `snapshot()` nunca
/// observa um update pela metade.
#[derive(Debug)]
pub struct SensorRegistry {
    capacity: usize,
    channels: Mutex<Vec<Channel>>,
}

impl SensorRegistry {
    /// Cria um registry com a capacidade padrão ([`MAX_CHANNELS`]).
    pub fn new() -> Self {
        Self::with_capacity(MAX_CHANNELS)
    }

    /// Cria um registry com capacidade explícita.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Registra um canal novo. Falha com `AlreadyRegistered` se o nome já
    /// existe: o conjunto de sensores do device é fixo, enumerado uma vez
    /// no boot.
    pub fn register(&self, name: &str, ty: SensorType) -> Result<ChannelId, RegistryError> {
        validate_name(name)?;
        let mut channels = self.channels.lock().unwrap();

        if channels.iter().any(|c| c.name == name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }

        Self::insert(&mut channels, self.capacity, name, ty)
    }

    /// Registra o canal ou retorna o existente (upsert idempotente do
    /// collector). Falha com `TypeMismatch` se o nome existe com outro tipo.
    pub fn register_or_get(&self, name: &str, ty: SensorType) -> Result<ChannelId, RegistryError> {
        validate_name(name)?;
        let mut channels = self.channels.lock().unwrap();

        if let Some(idx) = channels.iter().position(|c| c.name == name) {
            let ch = &channels[idx];
            if ch.ty != ty {
                return Err(RegistryError::TypeMismatch {
                    channel: name.to_string(),
                    declared: ch.ty,
                    got: ty,
                });
            }
            return Ok(ChannelId(idx));
        }

        Self::insert(&mut channels, self.capacity, name, ty)
    }

    fn insert(
        channels: &mut Vec<Channel>,
        capacity: usize,
        name: &str,
        ty: SensorType,
    ) -> Result<ChannelId, RegistryError> {
        if channels.len() >= capacity {
            return Err(RegistryError::CapacityExceeded(capacity));
        }

        channels.push(Channel {
            name: name.to_string(),
            ty,
            value: None,
        });
        let id = ChannelId(channels.len() - 1);
        debug!("Canal '{name}' registrado (tipo {ty:?}, slot {})", id.0);
        Ok(id)
    }

    /// Atualiza o valor de um canal. `TypeMismatch` se o tipo do valor não
    /// bate com o tipo declarado no registro.
    pub fn update(&self, id: ChannelId, value: SensorValue) -> Result<(), RegistryError> {
        let mut channels = self.channels.lock().unwrap();
        let ch = channels.get_mut(id.0).ok_or(RegistryError::UnknownChannel)?;

        if ch.ty != value.sensor_type() {
            return Err(RegistryError::TypeMismatch {
                channel: ch.name.clone(),
                declared: ch.ty,
                got: value.sensor_type(),
            });
        }

        ch.value = Some(value);
        Ok(())
    }

    /// Captura uma cópia consistente de todos os canais com valor, com o
    /// timestamp corrente. Roda inteira sob o lock, então nenhum update é
    /// observado parcialmente aplicado; o resultado não compartilha estado
    /// com o registry.
    pub fn snapshot(&self) -> Snapshot {
        let channels = self.channels.lock().unwrap();
        let readings = channels
            .iter()
            .filter_map(|c| {
                c.value.map(|value| Reading {
                    name: c.name.clone(),
                    value,
                })
            })
            .collect();

        Snapshot {
            timestamp_ms: now_millis(),
            readings,
        }
    }

    /// Quantidade de canais registrados.
    pub fn len(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.len() > NAME_MAX_LEN {
        return Err(RegistryError::InvalidName);
    }
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
