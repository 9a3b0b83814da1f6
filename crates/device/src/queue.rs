//! Fila limitada de hand-off de snapshots entre a thread de amostragem e a
//! thread de envio.
//!
//! Política lossy: com a fila cheia o snapshot novo é descartado com log e
//! o produtor nunca bloqueia. A ordem FIFO é preservada entre os itens
//! efetivamente enfileirados.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use sensor_core::Snapshot;
use tracing::warn;

/// Capacidade da fila de snapshots.
pub const QUEUE_CAPACITY: usize = 4;

/// Lado produtor da fila (thread de amostragem).
pub struct SnapshotProducer {
    tx: Sender<Snapshot>,
}

/// Lado consumidor da fila (thread de envio).
pub struct SnapshotConsumer {
    rx: Receiver<Snapshot>,
}

/// Cria a fila com a capacidade padrão.
pub fn snapshot_queue() -> (SnapshotProducer, SnapshotConsumer) {
    let (tx, rx) = bounded(QUEUE_CAPACITY);
    (SnapshotProducer { tx }, SnapshotConsumer { rx })
}

impl SnapshotProducer {
    /// Enfileira sem bloquear. Retorna `false` (com warn de perda de dados)
    /// quando a fila está cheia e o snapshot foi descartado.
    pub fn try_put(&self, snapshot: Snapshot) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(snapshot)) => {
                warn!(
                    "Fila cheia — descartando snapshot ({} leituras)",
                    snapshot.readings.len()
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl SnapshotConsumer {
    /// Bloqueia até um snapshot chegar. `None` apenas quando o lado produtor
    /// encerrou.
    pub fn get(&self) -> Option<Snapshot> {
        self.rx.recv().ok()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ts: i64) -> Snapshot {
        Snapshot {
            timestamp_ms: ts,
            readings: Vec::new(),
        }
    }

    #[test]
    fn fifo_is_preserved_and_fifth_is_dropped() {
        let (producer, consumer) = snapshot_queue();

        for ts in 1..=4 {
            assert!(producer.try_put(snapshot(ts)));
        }
        // Quinta entrada numa fila de capacidade 4: descartada
        assert!(!producer.try_put(snapshot(5)));

        for ts in 1..=4 {
            assert_eq!(consumer.get().unwrap().timestamp_ms, ts);
        }
    }

    #[test]
    fn queue_drains_and_accepts_again() {
        let (producer, consumer) = snapshot_queue();

        for ts in 1..=4 {
            assert!(producer.try_put(snapshot(ts)));
        }
        assert_eq!(consumer.get().unwrap().timestamp_ms, 1);
        assert!(producer.try_put(snapshot(5)));
    }

    #[test]
    fn get_returns_none_when_producer_is_gone() {
        let (producer, consumer) = snapshot_queue();
        producer.try_put(snapshot(1));
        drop(producer);

        assert_eq!(consumer.get().unwrap().timestamp_ms, 1);
        assert!(consumer.get().is_none());
    }

    #[test]
    fn get_blocks_until_item_arrives() {
        let (producer, consumer) = snapshot_queue();

        let handle = std::thread::spawn(move || consumer.get());
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(producer.try_put(snapshot(7)));

        let got = handle.join().unwrap();
        assert_eq!(got.unwrap().timestamp_ms, 7);
    }
}
