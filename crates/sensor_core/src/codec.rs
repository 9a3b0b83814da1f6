//! Codec do formato wire do snapshot.
//!
//! O corpo do POST `sensor/snapshot` é JSON auto-descritivo por leitura:
//!
//! ```text
//! {"ts":<i64 ms>,"readings":[{"n":"<nome>","t":<tag>,"v":<número>},…]}
//! ```
//!
//! O encode produz exatamente essa ordem de campos. O decode é estrito no
//! envelope (objeto com array `readings`) e tolerante por entrada: leituras
//! malformadas são puladas com log, sem derrubar o decode inteiro, e nunca
//! resultam em uma leitura parcialmente populada.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::types::{MAX_CHANNELS, Reading, SensorType, SensorValue, Snapshot};

/// Erros do codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Corpo não é JSON válido: {0}")]
    Malformed(String),

    #[error("Campo `readings` ausente ou não é array")]
    MissingReadings,

    #[error("Erro de serialização: {0}")]
    Serialize(String),
}

#[derive(Serialize)]
struct WireSnapshot<'a> {
    ts: i64,
    readings: Vec<WireReading<'a>>,
}

// A ordem de declaração dos campos é a ordem no wire
#[derive(Serialize)]
struct WireReading<'a> {
    n: &'a str,
    t: u8,
    v: f64,
}

/// Codifica um [`Snapshot`] no corpo JSON do request.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, CodecError> {
    let wire = WireSnapshot {
        ts: snapshot.timestamp_ms,
        readings: snapshot
            .readings
            .iter()
            .map(|r| WireReading {
                n: &r.name,
                t: r.value.sensor_type().tag(),
                v: r.value.as_f64(),
            })
            .collect(),
    };

    serde_json::to_vec(&wire).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Decodifica o corpo JSON de volta em [`Snapshot`].
///
/// Falha por inteiro apenas quando o envelope é inválido. Entradas sem `n`,
/// sem `v`, ou com tag de tipo desconhecida são puladas com warn; acima de
/// [`MAX_CHANNELS`] entradas válidas o excedente é descartado com warn
/// (truncamento, não erro). `ts` ausente vale 0.
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot, CodecError> {
    let root: Value =
        serde_json::from_slice(data).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let readings_json = root
        .get("readings")
        .and_then(Value::as_array)
        .ok_or(CodecError::MissingReadings)?;
    let timestamp_ms = root.get("ts").and_then(Value::as_i64).unwrap_or(0);

    let mut readings = Vec::new();
    for entry in readings_json {
        if readings.len() >= MAX_CHANNELS {
            warn!("Snapshot com leituras demais — truncando em {MAX_CHANNELS}");
            break;
        }
        if let Some(reading) = decode_reading(entry) {
            readings.push(reading);
        }
    }

    Ok(Snapshot {
        timestamp_ms,
        readings,
    })
}

/// Valida e converte uma entrada do array `readings`. `None` (com warn) para
/// qualquer campo ausente ou inválido.
fn decode_reading(entry: &Value) -> Option<Reading> {
    let Some(name) = entry.get("n").and_then(Value::as_str) else {
        warn!("Leitura sem campo `n` — pulando");
        return None;
    };

    let Some(v) = entry.get("v").and_then(Value::as_f64) else {
        warn!("Leitura '{name}' sem campo `v` — pulando");
        return None;
    };

    let Some(tag) = entry.get("t").and_then(Value::as_u64) else {
        warn!("Leitura '{name}' sem campo `t` válido — pulando");
        return None;
    };
    let Some(ty) = u8::try_from(tag).ok().and_then(SensorType::from_tag) else {
        warn!("Leitura '{name}' com tipo desconhecido {tag} — pulando");
        return None;
    };

    let value = match ty {
        SensorType::Float => SensorValue::Float(v as f32),
    };

    Some(Reading {
        name: name.to_string(),
        value,
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            timestamp_ms: 1_700_000_000_123,
            readings: vec![
                Reading {
                    name: "temperature".into(),
                    value: SensorValue::Float(21.5),
                },
                Reading {
                    name: "humidity".into(),
                    value: SensorValue::Float(63.0),
                },
            ],
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = sample_snapshot();
        let encoded = encode_snapshot(&original).unwrap();
        let decoded = decode_snapshot(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn encode_produces_exact_field_order() {
        let snapshot = Snapshot {
            timestamp_ms: 1,
            readings: vec![Reading {
                name: "temperature".into(),
                value: SensorValue::Float(21.5),
            }],
        };
        let encoded = encode_snapshot(&snapshot).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"ts":1,"readings":[{"n":"temperature","t":0,"v":21.5}]}"#
        );
    }

    #[test]
    fn empty_snapshot_roundtrip() {
        let original = Snapshot {
            timestamp_ms: 42,
            readings: Vec::new(),
        };
        let decoded = decode_snapshot(&encode_snapshot(&original).unwrap()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            decode_snapshot(b"isso nao e json"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_readings_array() {
        assert!(matches!(
            decode_snapshot(br#"{"ts":1}"#),
            Err(CodecError::MissingReadings)
        ));
        assert!(matches!(
            decode_snapshot(br#"{"ts":1,"readings":"nope"}"#),
            Err(CodecError::MissingReadings)
        ));
        assert!(matches!(
            decode_snapshot(br#"7"#),
            Err(CodecError::MissingReadings)
        ));
    }

    #[test]
    fn skips_entry_missing_value() {
        let body = br#"{"ts":9,"readings":[
            {"n":"temperature","t":0,"v":21.5},
            {"n":"humidity","t":0}
        ]}"#;
        let snap = decode_snapshot(body).unwrap();
        assert_eq!(snap.timestamp_ms, 9);
        assert_eq!(snap.readings.len(), 1);
        assert_eq!(snap.readings[0].name, "temperature");
    }

    #[test]
    fn skips_entry_with_unknown_type_tag() {
        let body = br#"{"ts":1,"readings":[{"n":"x","t":99,"v":1.0}]}"#;
        let snap = decode_snapshot(body).unwrap();
        assert!(snap.readings.is_empty());
    }

    #[test]
    fn entirely_invalid_entries_decode_to_empty() {
        let body = br#"{"ts":1,"readings":[{"x":1}]}"#;
        let snap = decode_snapshot(body).unwrap();
        assert_eq!(snap.timestamp_ms, 1);
        assert!(snap.readings.is_empty());
    }

    #[test]
    fn missing_ts_defaults_to_zero() {
        let snap = decode_snapshot(br#"{"readings":[]}"#).unwrap();
        assert_eq!(snap.timestamp_ms, 0);
    }

    #[test]
    fn excess_entries_are_truncated() {
        let entries: Vec<String> = (0..MAX_CHANNELS + 4)
            .map(|i| format!(r#"{{"n":"ch{i}","t":0,"v":{i}.0}}"#))
            .collect();
        let body = format!(r#"{{"ts":1,"readings":[{}]}}"#, entries.join(","));

        let snap = decode_snapshot(body.as_bytes()).unwrap();
        assert_eq!(snap.readings.len(), MAX_CHANNELS);
        assert_eq!(snap.readings[0].name, "ch0");
        assert_eq!(snap.readings[MAX_CHANNELS - 1].name, format!("ch{}", MAX_CHANNELS - 1));
    }
}
