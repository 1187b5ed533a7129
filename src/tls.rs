//! Opportunistic TLS upgrade over an already-connected socket.
//!
//! The handshake reads through [`TlsSniff`], which peeks at the first byte the
//! peer sends before anything is consumed. A peer that answers with something
//! other than a TLS record aborts the handshake with the stream untouched, so the
//! caller can still capture the plaintext greeting from it.

use crate::types::TlsInfo;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::rustls::client::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::{
    self, Certificate, ClientConfig, ClientConnection, DigitallySignedStruct, ProtocolVersion,
    ServerName,
};
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::*;

/// What the TLS attempt found out about the peer.
#[derive(Debug)]
pub(crate) enum TlsOutcome {
    Negotiated(TlsInfo),
    /// The peer's first bytes are not TLS; they are still unread on the socket.
    Plaintext,
    /// The peer speaks TLS (or said nothing) but no session was established.
    Failed,
}

// Reconnaissance only: any certificate is accepted so that self-signed and
// expired endpoints still report their parameters.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &Certificate,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &Certificate,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }
}

fn connector() -> TlsConnector {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    let config = CONFIG.get_or_init(|| {
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();
        Arc::new(config)
    });
    TlsConnector::from(Arc::clone(config))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sniffed {
    Undecided,
    Tls,
    Plaintext,
}

/// Pass-through stream that refuses to hand non-TLS bytes to the handshake.
struct TlsSniff<'a> {
    stream: &'a mut TcpStream,
    state: Sniffed,
}

impl<'a> TlsSniff<'a> {
    fn new(stream: &'a mut TcpStream) -> Self {
        Self { stream, state: Sniffed::Undecided }
    }
}

// Alert (21) or handshake (22): the only record types a server answers a ClientHello with.
fn is_tls_record_start(byte: u8) -> bool {
    matches!(byte, 0x15 | 0x16)
}

fn not_tls() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "peer did not answer with a TLS record")
}

impl AsyncRead for TlsSniff<'_> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match this.state {
            Sniffed::Tls => {}
            Sniffed::Plaintext => return Poll::Ready(Err(not_tls())),
            Sniffed::Undecided => {
                let mut first = [0u8; 1];
                let mut peek_buf = ReadBuf::new(&mut first);
                match this.stream.poll_peek(cx, &mut peek_buf) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    // EOF: let the handshake observe it through a normal read.
                    Poll::Ready(Ok(0)) => {}
                    Poll::Ready(Ok(_)) => {
                        if is_tls_record_start(first[0]) {
                            this.state = Sniffed::Tls;
                        } else {
                            this.state = Sniffed::Plaintext;
                            return Poll::Ready(Err(not_tls()));
                        }
                    }
                }
            }
        }
        Pin::new(&mut *this.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsSniff<'_> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.stream).poll_shutdown(cx)
    }
}

/// Attempt a TLS handshake on `stream` within `timeout`.
///
/// Plaintext peers are detected from a peek at the first response byte, so on
/// [`TlsOutcome::Plaintext`] nothing the peer sent has been consumed.
pub(crate) async fn try_handshake(
    stream: &mut TcpStream,
    host: &str,
    peer_ip: IpAddr,
    timeout: Duration,
) -> TlsOutcome {
    let name = server_name(host, peer_ip);
    let mut sniff = TlsSniff::new(stream);

    let handshake = time::timeout(timeout, connector().connect(name, &mut sniff)).await;
    let reason = match handshake {
        Ok(Ok(tls)) => {
            let (_, conn) = tls.get_ref();
            return match session_info(conn) {
                Some(info) => TlsOutcome::Negotiated(info),
                None => TlsOutcome::Failed,
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => "handshake timed out".to_string(),
    };

    if sniff.state == Sniffed::Plaintext {
        return TlsOutcome::Plaintext;
    }
    debug!(host, %peer_ip, %reason, "tls handshake failed");
    TlsOutcome::Failed
}

fn server_name(host: &str, peer_ip: IpAddr) -> ServerName {
    match host.parse::<IpAddr>() {
        Ok(ip) => ServerName::IpAddress(ip),
        Err(_) => ServerName::try_from(host).unwrap_or(ServerName::IpAddress(peer_ip)),
    }
}

fn session_info(conn: &ClientConnection) -> Option<TlsInfo> {
    let version = conn.protocol_version()?;
    let suite = conn.negotiated_cipher_suite()?;
    let certificate_subject = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .and_then(|leaf| leaf_subject(&leaf.0));
    Some(TlsInfo {
        protocol_version: version_name(version),
        cipher_suite: format!("{:?}", suite.suite()),
        certificate_subject,
    })
}

fn version_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1.0".to_string(),
        other => format!("{other:?}"),
    }
}

/// Subject DN of a DER certificate, e.g. `CN=localhost`.
pub(crate) fn leaf_subject(der: &[u8]) -> Option<String> {
    match X509Certificate::from_der(der) {
        Ok((_, cert)) => Some(cert.subject().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            debug!(error = %e, "unparseable peer certificate");
            None
        }
    }
}
