//! Servidor CoAP do collector.
//!
//! Loop de I/O single-thread: um datagrama por vez, dispatch por recurso.
//! Leituras individuais que falham (capacidade, tipo, persistência) são
//! logadas e puladas; o processamento continua para as demais e a resposta
//! é `2.04 Changed` sempre que o corpo parseou estruturalmente.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use coap_lite::{CoapRequest, ContentFormat, Packet, RequestType, ResponseType};
use sensor_core::{SNAPSHOT_RESOURCE, SensorRegistry, decode_snapshot};
use tracing::{debug, error, info, warn};

use crate::storage::ReadingSink;

/// Descrição do recurso anunciada em `/.well-known/core` (ct 50 = JSON).
const RESOURCE_DIRECTORY: &str = "</sensor/snapshot>;ct=50;title=\"Sensor Snapshot\"";

/// Tamanho do buffer de recepção de datagramas.
const RECV_BUF_SIZE: usize = 2048;

/// Servidor com endpoint UDP próprio, registry e sink de persistência.
pub struct CoapServer<S: ReadingSink> {
    socket: UdpSocket,
    registry: Arc<SensorRegistry>,
    sink: S,
}

impl<S: ReadingSink> CoapServer<S> {
    /// Abre o endpoint de escuta. O intervalo de poll limita quanto tempo o
    /// loop fica sem checar o sinal de parada.
    pub fn bind(
        port: u16,
        registry: Arc<SensorRegistry>,
        sink: S,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_read_timeout(Some(poll_interval))?;
        info!("Servidor CoAP escutando na porta {port}");
        Ok(Self {
            socket,
            registry,
            sink,
        })
    }

    /// Roda o loop de I/O até o sinal de parada ser observado entre polls.
    pub fn run(&self, stop: &AtomicBool) {
        let mut buf = [0u8; RECV_BUF_SIZE];
        while !stop.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    error!("Erro no socket de escuta: {e}");
                    break;
                }
            }
        }
        info!("Sinal de parada observado — encerrando loop CoAP");
    }

    fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let packet = match Packet::from_bytes(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Datagrama inválido de {source}: {e}");
                return;
            }
        };

        let mut request = CoapRequest::from_packet(packet, source);
        let (status, body) = dispatch(&self.registry, &self.sink, &request);

        let Some(response) = request.response.as_mut() else {
            debug!("Request de {source} sem resposta associada");
            return;
        };
        response.set_status(status);
        if let Some(body) = body {
            response
                .message
                .set_content_format(ContentFormat::ApplicationLinkFormat);
            response.message.payload = body;
        }

        match response.message.to_bytes() {
            Ok(frame) => {
                if let Err(e) = self.socket.send_to(&frame, source) {
                    warn!("Falha ao responder {source}: {e}");
                }
            }
            Err(e) => error!("Falha ao serializar resposta: {e}"),
        }
    }
}

/// Dispatch por método e recurso. Retorna o código de resposta e, quando o
/// recurso produz conteúdo, o corpo.
fn dispatch<S: ReadingSink>(
    registry: &SensorRegistry,
    sink: &S,
    request: &CoapRequest<SocketAddr>,
) -> (ResponseType, Option<Vec<u8>>) {
    let path = request.get_path();
    match (request.get_method(), path.as_str()) {
        (RequestType::Post, SNAPSHOT_RESOURCE) => {
            (apply_snapshot(registry, sink, &request.message.payload), None)
        }
        (RequestType::Get, ".well-known/core") => (
            ResponseType::Content,
            Some(RESOURCE_DIRECTORY.as_bytes().to_vec()),
        ),
        (method, path) => {
            debug!("Recurso desconhecido: {method:?} /{path}");
            (ResponseType::NotFound, None)
        }
    }
}

/// Aplica o corpo de um POST de snapshot: decode, upsert no registry,
/// persistência. Falha estrutural do corpo responde `4.00`; falha de uma
/// leitura individual é logada e pulada, e a resposta segue `2.04`.
fn apply_snapshot<S: ReadingSink>(
    registry: &SensorRegistry,
    sink: &S,
    payload: &[u8],
) -> ResponseType {
    if payload.is_empty() {
        warn!("POST de snapshot sem corpo");
        return ResponseType::BadRequest;
    }

    debug!("Snapshot recebido: {}", String::from_utf8_lossy(payload));

    let snapshot = match decode_snapshot(payload) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Corpo de snapshot malformado: {e}");
            return ResponseType::BadRequest;
        }
    };

    let mut applied = 0usize;
    for reading in &snapshot.readings {
        let ty = reading.value.sensor_type();

        let id = match registry.register_or_get(&reading.name, ty) {
            Ok(id) => id,
            Err(e) => {
                warn!("Canal '{}' rejeitado: {e} — pulando", reading.name);
                continue;
            }
        };

        if let Err(e) = registry.update(id, reading.value) {
            warn!("Update do canal '{}' falhou: {e} — pulando", reading.name);
            continue;
        }

        if let Err(e) = sink.insert_reading(&reading.name, ty, reading.value, snapshot.timestamp_ms)
        {
            // Best-effort: a leitura já está no registry, só a persistência falhou
            warn!("Persistência falhou para '{}': {e}", reading.name);
            continue;
        }

        applied += 1;
    }

    debug!(
        "Snapshot aplicado: {applied}/{} leituras",
        snapshot.readings.len()
    );
    ResponseType::Changed
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStore, StorageError};
    use coap_lite::{CoapOption, MessageClass, MessageType};
    use sensor_core::{SensorType, SensorValue};
    use std::sync::Mutex;

    /// Sink de teste que grava em memória.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<(String, i64)>>,
    }

    impl ReadingSink for MemorySink {
        fn insert_reading(
            &self,
            name: &str,
            _ty: SensorType,
            _value: SensorValue,
            timestamp_ms: i64,
        ) -> Result<(), StorageError> {
            self.rows
                .lock()
                .unwrap()
                .push((name.to_string(), timestamp_ms));
            Ok(())
        }
    }

    /// Sink que sempre falha, para exercitar o best-effort.
    struct FailingSink;

    impl ReadingSink for FailingSink {
        fn insert_reading(
            &self,
            _name: &str,
            _ty: SensorType,
            _value: SensorValue,
            _timestamp_ms: i64,
        ) -> Result<(), StorageError> {
            Err(StorageError::Sqlite(
                rusqlite::Error::InvalidParameterName("sem banco".into()),
            ))
        }
    }

    fn post_request(path_segments: &[&str], payload: &[u8]) -> CoapRequest<SocketAddr> {
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Confirmable);
        packet.header.code = MessageClass::Request(RequestType::Post);
        packet.header.message_id = 7;
        packet.set_token(vec![1, 2, 3]);
        for segment in path_segments {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
        packet.payload = payload.to_vec();

        CoapRequest::from_packet(packet, "127.0.0.1:5683".parse().unwrap())
    }

    fn get_request(path_segments: &[&str]) -> CoapRequest<SocketAddr> {
        let mut request = post_request(path_segments, b"");
        request.message.header.code = MessageClass::Request(RequestType::Get);
        request
    }

    #[test]
    fn valid_snapshot_is_applied_and_persisted() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let request = post_request(
            &["sensor", "snapshot"],
            br#"{"ts":77,"readings":[
                {"n":"temperature","t":0,"v":21.5},
                {"n":"humidity","t":0,"v":63.0}
            ]}"#,
        );

        let (status, body) = dispatch(&registry, &sink, &request);
        assert_eq!(status, ResponseType::Changed);
        assert!(body.is_none());
        assert_eq!(registry.len(), 2);

        let rows = sink.rows.lock().unwrap();
        assert_eq!(
            *rows,
            vec![("temperature".to_string(), 77), ("humidity".to_string(), 77)]
        );
    }

    #[test]
    fn empty_body_is_bad_request() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let request = post_request(&["sensor", "snapshot"], b"");

        let (status, _) = dispatch(&registry, &sink, &request);
        assert_eq!(status, ResponseType::BadRequest);
        assert!(sink.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();

        let request = post_request(&["sensor", "snapshot"], b"nao e json");
        assert_eq!(dispatch(&registry, &sink, &request).0, ResponseType::BadRequest);

        let request = post_request(&["sensor", "snapshot"], br#"{"ts":1}"#);
        assert_eq!(dispatch(&registry, &sink, &request).0, ResponseType::BadRequest);
    }

    #[test]
    fn structurally_valid_but_useless_readings_still_change() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let request = post_request(&["sensor", "snapshot"], br#"{"ts":1,"readings":[{"x":1}]}"#);

        let (status, _) = dispatch(&registry, &sink, &request);
        assert_eq!(status, ResponseType::Changed);
        assert_eq!(registry.len(), 0);
        assert!(sink.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn persistence_failure_does_not_fail_the_request() {
        let registry = SensorRegistry::new();
        let request = post_request(
            &["sensor", "snapshot"],
            br#"{"ts":1,"readings":[{"n":"temperature","t":0,"v":21.5}]}"#,
        );

        let (status, _) = dispatch(&registry, &FailingSink, &request);
        assert_eq!(status, ResponseType::Changed);
        // O canal entra no registry mesmo com a persistência fora do ar
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeated_snapshot_upserts_channels_once() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let body = br#"{"ts":1,"readings":[{"n":"temperature","t":0,"v":21.5}]}"#;

        dispatch(&registry, &sink, &post_request(&["sensor", "snapshot"], body));
        dispatch(&registry, &sink, &post_request(&["sensor", "snapshot"], body));

        assert_eq!(registry.len(), 1);
        assert_eq!(sink.rows.lock().unwrap().len(), 2);
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let request = post_request(&["outro", "recurso"], b"{}");

        let (status, _) = dispatch(&registry, &sink, &request);
        assert_eq!(status, ResponseType::NotFound);
    }

    #[test]
    fn well_known_core_lists_snapshot_resource() {
        let registry = SensorRegistry::new();
        let sink = MemorySink::default();
        let request = get_request(&[".well-known", "core"]);

        let (status, body) = dispatch(&registry, &sink, &request);
        assert_eq!(status, ResponseType::Content);
        let body = String::from_utf8(body.unwrap()).unwrap();
        assert!(body.contains("</sensor/snapshot>"));
        assert!(body.contains("ct=50"));
    }

    #[test]
    fn sqlite_sink_end_to_end() {
        let registry = SensorRegistry::new();
        let store = SqliteStore::open_in_memory().unwrap();
        let request = post_request(
            &["sensor", "snapshot"],
            br#"{"ts":55,"readings":[{"n":"temperature","t":0,"v":21.5}]}"#,
        );

        let (status, _) = dispatch(&registry, &store, &request);
        assert_eq!(status, ResponseType::Changed);
    }
}
