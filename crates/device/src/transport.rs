//! Cliente CoAP do device.
//!
//! Um exchange por vez: `send()` monta um POST confirmável para
//! `sensor/snapshot` com message id e token frescos e retorna logo após o
//! handoff ao socket; `recv()` faz poll do socket até chegar a resposta
//! correlata ao exchange pendente ou o deadline expirar. Timeout não gera
//! retry: entrega at-most-once, o snapshot é dado como possivelmente
//! perdido e o pipeline segue para o próximo.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use coap_lite::{CoapOption, ContentFormat, MessageClass, MessageType, Packet, RequestType};
use tracing::{debug, info, warn};

/// Quantum de poll do socket enquanto espera resposta.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tamanho do buffer de recepção de datagramas.
const RECV_BUF_SIZE: usize = 2048;

/// Resultado de [`CoapClient::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A resposta correlata ao último request chegou inteira.
    Completed,
    /// Deadline expirou sem resposta; o snapshot pode ter se perdido.
    TimedOut,
}

/// Erros do transporte.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao resolver `{0}`")]
    Resolve(String),

    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao montar PDU CoAP: {0}")]
    Packet(String),
}

/// Exchange aguardando resposta.
struct Pending {
    message_id: u16,
    token: Vec<u8>,
}

/// Resultado da correlação de um datagrama com o exchange pendente.
enum Correlation {
    /// Resposta final do exchange.
    Completed,
    /// ACK vazio: request recebido, resposta separada ainda vem.
    AckOnly,
    /// Não é deste exchange.
    Unrelated,
}

/// Cliente CoAP com no máximo um exchange em voo.
///
/// A thread de envio alterna `send`/`recv` estritamente; o cleanup é o
/// próprio drop do socket.
pub struct CoapClient {
    socket: UdpSocket,
    peer: SocketAddr,
    recv_timeout: Duration,
    next_message_id: u16,
    next_token: u64,
    pending: Option<Pending>,
}

impl CoapClient {
    /// Resolve o endereço do collector e abre a sessão UDP. Falha aqui é
    /// fatal no bootstrap; não há retry nesta camada.
    pub fn connect(
        host: &str,
        port: u16,
        recv_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let peer = (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve(format!("{host}:{port}")))?
            .next()
            .ok_or_else(|| TransportError::Resolve(format!("{host}:{port}")))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(peer)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        info!("Sessão CoAP aberta para {peer}");
        Ok(Self {
            socket,
            peer,
            recv_timeout,
            next_message_id: 1,
            next_token: 1,
            pending: None,
        })
    }

    /// Endereço resolvido do collector.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Monta e envia um POST confirmável com o corpo já codificado. Retorna
    /// logo após o handoff ao socket, sem esperar confirmação.
    pub fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        let token = self.next_token.to_be_bytes().to_vec();
        self.next_token = self.next_token.wrapping_add(1);

        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Confirmable);
        packet.header.code = MessageClass::Request(RequestType::Post);
        packet.header.message_id = message_id;
        packet.set_token(token.clone());
        for segment in sensor_core::SNAPSHOT_RESOURCE.split('/') {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
        packet.set_content_format(ContentFormat::ApplicationJSON);
        packet.payload = body.to_vec();

        let frame = packet
            .to_bytes()
            .map_err(|e| TransportError::Packet(e.to_string()))?;
        self.socket.send(&frame)?;
        self.pending = Some(Pending { message_id, token });

        debug!(
            "POST {} enviado ({} bytes, mid={message_id})",
            sensor_core::SNAPSHOT_RESOURCE,
            frame.len()
        );
        Ok(())
    }

    /// Espera a resposta do exchange pendente até o deadline. Datagramas não
    /// correlatos são ignorados com log.
    pub fn recv(&mut self) -> Result<RecvOutcome, TransportError> {
        let Some(pending) = self.pending.take() else {
            debug!("recv() sem exchange pendente");
            return Ok(RecvOutcome::Completed);
        };

        let deadline = Instant::now() + self.recv_timeout;
        let mut buf = [0u8; RECV_BUF_SIZE];

        while Instant::now() < deadline {
            match self.socket.recv(&mut buf) {
                Ok(len) => match Packet::from_bytes(&buf[..len]) {
                    Ok(response) => match correlate(&response, &pending) {
                        Correlation::Completed => {
                            log_response(&response);
                            return Ok(RecvOutcome::Completed);
                        }
                        Correlation::AckOnly => {
                            debug!(
                                "ACK vazio (mid={}) — aguardando resposta separada",
                                response.header.message_id
                            );
                        }
                        Correlation::Unrelated => {
                            debug!(
                                "Datagrama não correlato (mid={}) — ignorando",
                                response.header.message_id
                            );
                        }
                    },
                    Err(e) => debug!("Datagrama CoAP inválido: {e}"),
                },
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        warn!(
            "Sem resposta em {} ms — snapshot pode ter se perdido",
            self.recv_timeout.as_millis()
        );
        Ok(RecvOutcome::TimedOut)
    }
}

/// Correlaciona um datagrama com o exchange pendente: ACK piggyback casa por
/// message id, resposta separada casa por token.
fn correlate(response: &Packet, pending: &Pending) -> Correlation {
    match (response.header.get_type(), &response.header.code) {
        (MessageType::Acknowledgement, MessageClass::Empty)
            if response.header.message_id == pending.message_id =>
        {
            Correlation::AckOnly
        }
        (MessageType::Acknowledgement, MessageClass::Response(_))
            if response.header.message_id == pending.message_id =>
        {
            Correlation::Completed
        }
        (MessageType::Confirmable | MessageType::NonConfirmable, MessageClass::Response(_))
            if *response.get_token() == pending.token[..] =>
        {
            Correlation::Completed
        }
        _ => Correlation::Unrelated,
    }
}

fn log_response(response: &Packet) {
    if response.payload.is_empty() {
        debug!("Resposta {:?}", response.header.code);
    } else {
        info!(
            "Resposta {:?} ({} bytes): {}",
            response.header.code,
            response.payload.len(),
            String::from_utf8_lossy(&response.payload)
        );
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
