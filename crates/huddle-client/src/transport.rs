//! QUIC transport for the client.
//!
//! Provides [`ConnectedClient`], which moves frames between channels and a
//! QUIC connection. Each outbound frame travels on its own bidirectional
//! stream; the server pushes inbound frames on unidirectional streams.
//! Protocol logic stays in the Sans-IO [`crate::Client`].

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use huddle_proto::{Frame, FrameHeader};
use quinn::{ClientConfig, Endpoint, RecvStream, SendStream};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// ALPN protocol identifier; must match the server.
pub const ALPN: &[u8] = b"huddle";

/// QUIC idle timeout. Longer than the heartbeat interval so the session
/// layer, not QUIC, decides when a quiet connection is dead.
const QUIC_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Outcome of one outbound frame, reported by the connection task.
#[derive(Debug)]
pub struct SendFailure {
    /// Frame that was not delivered.
    pub frame: Frame,
    /// Why.
    pub error: TransportError,
}

/// Handle to a connected QUIC transport.
///
/// Frames are sent and received via the channels; an internal task handles
/// the QUIC I/O.
pub struct ConnectedClient {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<Frame>,
    /// Frames the connection task failed to deliver.
    pub send_failures: mpsc::Receiver<SendFailure>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }

    /// Whether the connection task is still running.
    pub fn is_running(&self) -> bool {
        !self.abort_handle.is_finished()
    }
}

/// Connect to a Huddle server via QUIC.
pub async fn connect(server_addr: &str) -> Result<ConnectedClient, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address: {e}")))?;

    let bind: SocketAddr = SocketAddr::from(([0, 0, 0, 0], 0));
    let mut endpoint = Endpoint::client(bind)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(insecure_client_config()?);

    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(32);
    let (failures_tx, failures_rx) = mpsc::channel::<SendFailure>(32);

    let handle =
        tokio::spawn(run_connection(connection, to_server_rx, from_server_tx, failures_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        send_failures: failures_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and QUIC.
async fn run_connection(
    connection: quinn::Connection,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
    failures: mpsc::Sender<SendFailure>,
) {
    let conn_recv = connection.clone();
    let recv_handle = tokio::spawn(async move {
        loop {
            match conn_recv.accept_uni().await {
                Ok(recv) => {
                    let tx = from_server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_incoming_stream(recv, tx).await {
                            warn!(error = %e, "incoming stream error");
                        }
                    });
                },
                Err(e) => {
                    debug!(error = %e, "connection stopped accepting streams");
                    break;
                },
            }
        }
    });

    while let Some(frame) = to_server.recv().await {
        let result = match connection.open_bi().await {
            Ok((send, _recv)) => send_frame(send, &frame).await,
            Err(e) => Err(TransportError::Stream(format!("open stream failed: {e}"))),
        };

        if let Err(error) = result {
            warn!(%error, "send failed");
            if failures.send(SendFailure { frame, error }).await.is_err() {
                break;
            }
        }
    }

    recv_handle.abort();
}

/// Handle an incoming unidirectional stream (server -> client).
async fn handle_incoming_stream(
    mut recv: RecvStream,
    tx: mpsc::Sender<Frame>,
) -> Result<(), TransportError> {
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);

    recv.read_exact(&mut buf[..FrameHeader::SIZE])
        .await
        .map_err(|e| TransportError::Stream(format!("header read failed: {e}")))?;

    let header = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
        .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;
    let payload_size = header.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
    }

    let frame = Frame::decode(&buf)
        .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))?;

    tx.send(frame)
        .await
        .map_err(|e| TransportError::Stream(format!("channel send failed: {e}")))?;

    Ok(())
}

/// Send a frame on a stream.
async fn send_frame(mut send: SendStream, frame: &Frame) -> Result<(), TransportError> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

    send.write_all(&buf).await.map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;
    send.finish().map_err(|e| TransportError::Stream(format!("finish failed: {e}")))?;

    Ok(())
}

/// Client config that accepts any certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("invalid TLS config: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(quic));

    let idle = QUIC_IDLE_TIMEOUT
        .try_into()
        .map_err(|e| TransportError::Connection(format!("invalid idle timeout: {e}")))?;
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
