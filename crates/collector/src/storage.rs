//! Persistência das leituras em SQLite.
//!
//! O servidor só conhece a interface estreita [`ReadingSink`]. Falhas de
//! persistência são best-effort: o chamador loga e segue, nenhuma transação
//! atravessa mais de uma leitura.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use sensor_core::{SensorType, SensorValue};
use tracing::info;

/// Erros da camada de persistência.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Erro SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Sink de leituras consumido pelo servidor.
pub trait ReadingSink {
    /// Insere uma leitura com o timestamp do snapshot de origem.
    fn insert_reading(
        &self,
        name: &str,
        ty: SensorType,
        value: SensorValue,
        timestamp_ms: i64,
    ) -> Result<(), StorageError>;
}

/// Store SQLite com o schema de canais e leituras.
///
/// Thread-safe via mutex interno (a `Connection` não é `Sync`). O cleanup é
/// o próprio drop da connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Abre (ou cria) o banco no caminho dado e garante o schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("Banco de dados pronto em {}", path.display());
        Ok(store)
    }

    /// Banco em memória, para testes.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS channels (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT    NOT NULL UNIQUE,
                type INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS readings (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id  INTEGER NOT NULL REFERENCES channels(id),
                timestamp   INTEGER NOT NULL,
                value_float REAL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_readings_channel_time
               ON readings(channel_id, timestamp)",
            [],
        )?;

        Ok(())
    }

    /// Busca o canal pelo nome ou cria a linha se ainda não existe.
    fn channel_get_or_create(
        conn: &Connection,
        name: &str,
        ty: SensorType,
    ) -> Result<i64, StorageError> {
        let existing = conn
            .query_row(
                "SELECT id FROM channels WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO channels (name, type) VALUES (?1, ?2)",
            params![name, ty.tag()],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl ReadingSink for SqliteStore {
    fn insert_reading(
        &self,
        name: &str,
        ty: SensorType,
        value: SensorValue,
        timestamp_ms: i64,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let channel_id = Self::channel_get_or_create(&conn, name, ty)?;

        let value_float = match value {
            SensorValue::Float(v) => f64::from(v),
        };

        conn.execute(
            "INSERT INTO readings (channel_id, timestamp, value_float)
             VALUES (?1, ?2, ?3)",
            params![channel_id, timestamp_ms, value_float],
        )?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
