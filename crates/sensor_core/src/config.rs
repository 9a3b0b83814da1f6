//! Configuração unificada via TOML.
//!
//! Um único `config.toml` cobre os dois binários; cada um lê a própria
//! seção. Campos ausentes caem nos defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuração do device (lado que amostra e envia).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host do collector (nome ou IP)
    pub server_host: String,
    /// Porta UDP do collector
    pub server_port: u16,
    /// Intervalo entre amostragens (ms)
    pub sample_interval_ms: u64,
    /// Deadline de resposta de um exchange CoAP (ms)
    pub recv_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".into(),
            server_port: 5683,
            sample_interval_ms: 2000,
            recv_timeout_ms: 5000,
        }
    }
}

/// Configuração do collector (lado que recebe e persiste).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Porta UDP de escuta
    pub port: u16,
    /// Caminho do banco SQLite
    pub db_path: String,
    /// Intervalo de poll do loop de I/O (ms); o sinal de parada é checado
    /// entre polls
    pub poll_interval_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            port: 5683,
            db_path: "readings.db".into(),
            poll_interval_ms: 1000,
        }
    }
}

/// Configuração raiz do aplicativo (unifica device e collector).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub collector: CollectorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.device.server_port == 0 {
            errors.push("Porta do collector no device não pode ser 0".into());
        }
        if self.device.sample_interval_ms < 100 || self.device.sample_interval_ms > 60_000 {
            errors.push(format!(
                "Intervalo de amostragem inválido: {} ms (100–60000)",
                self.device.sample_interval_ms
            ));
        }
        if self.device.recv_timeout_ms == 0 {
            errors.push("Deadline de resposta não pode ser 0".into());
        }
        if self.collector.port == 0 {
            errors.push("Porta do collector não pode ser 0".into());
        }
        if self.collector.db_path.is_empty() {
            errors.push("Caminho do banco não pode ser vazio".into());
        }
        if self.collector.poll_interval_ms == 0 {
            errors.push("Intervalo de poll não pode ser 0".into());
        }

        errors
    }
}
