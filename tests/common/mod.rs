#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};
use tokio_rustls::TlsAcceptor;

const CERT_DER: &[u8] = include_bytes!("../fixtures/cert.der");
const KEY_DER: &[u8] = include_bytes!("../fixtures/key.der");

/// A port on 127.0.0.1 that nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Server that waits `delay` after accepting, then sends `greeting` unprompted.
pub async fn spawn_greeter(delay: Duration, greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sock.write_all(greeting).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });
    addr
}

/// Plaintext server that only talks after reading a request, like HTTP.
pub async fn spawn_http_like() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let mut buf = [0u8; 512];
                if let Ok(n) = sock.read(&mut buf).await {
                    if n > 0 {
                        let _ = sock
                            .write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
                            .await;
                    }
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });
    addr
}

/// TLS server with the self-signed `CN=localhost` fixture certificate.
pub async fn spawn_tls_server() -> SocketAddr {
    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(vec![Certificate(CERT_DER.to_vec())], PrivateKey(KEY_DER.to_vec()))
        .expect("fixture certificate loads");
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else { return };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(sock).await {
                    let mut buf = [0u8; 64];
                    let _ = tokio::time::timeout(Duration::from_secs(2), tls.read(&mut buf)).await;
                }
            });
        }
    });
    addr
}

/// Server that reads the ClientHello and answers with a fatal handshake_failure alert.
pub async fn spawn_tls_alert() -> SocketAddr {
    const ALERT: [u8; 7] = [0x15, 0x03, 0x03, 0x00, 0x02, 0x02, 0x28];
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                if let Ok(n) = sock.read(&mut buf).await {
                    if n > 0 && buf[0] == 0x16 {
                        let _ = sock.write_all(&ALERT).await;
                    }
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });
    addr
}
