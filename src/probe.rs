use crate::config::ScanConfig;
use crate::services;
use crate::tls::{self, TlsOutcome};
use crate::types::{FailureReason, ProbeResult, Target, TlsInfo};
use ::time::{format_description::well_known, OffsetDateTime};
use socket2::SockRef;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{self, TcpStream};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

const BANNER_MAX: usize = 1024;

/// Probe one target: connect, try TLS or capture a banner, then gather metadata.
///
/// Never fails. Connect errors are classified into `failure_reason`; every other
/// problem only leaves the corresponding field empty. The socket is owned by this
/// call and closed before it returns.
pub async fn probe_target(target: Target, cfg: &ScanConfig) -> ProbeResult {
    let timestamp = now_iso_like();
    trace!(probe = %target, "connecting");

    let (mut stream, addr, latency) = match connect(&target, cfg.timeout).await {
        Ok(connected) => connected,
        Err(reason) => {
            trace!(probe = %target, %reason, "failed");
            return ProbeResult::unreachable(target, reason, timestamp);
        }
    };
    trace!(probe = %target, ?latency, "connected");

    let peer = stream.peer_addr().unwrap_or(addr);
    let local = stream.local_addr().ok();
    let sockopts = socket_options(&stream, peer);

    let ((tls, banner), reverse_dns) = tokio::join!(
        exchange(&mut stream, &target, peer.ip(), cfg),
        reverse_dns(peer.ip(), cfg),
    );
    drop(stream);
    trace!(probe = %target, tls = tls.is_some(), banner = banner.is_some(), "completed");

    ProbeResult {
        service_name: services::tcp_service_name(target.port).map(str::to_string),
        target,
        reachable: true,
        latency_ms: Some(round_ms(latency)),
        local_endpoint: local,
        peer_endpoint: Some(peer),
        banner,
        reverse_dns,
        send_buffer_size: sockopts.send_buffer_size,
        recv_buffer_size: sockopts.recv_buffer_size,
        ttl: sockopts.ttl,
        tls,
        failure_reason: None,
        timestamp,
    }
}

/// Resolve and connect within `timeout`. Latency covers only this step.
async fn connect(
    target: &Target,
    timeout: Duration,
) -> Result<(TcpStream, SocketAddr, Duration), FailureReason> {
    let start = Instant::now();
    let attempt = connect_any(&target.host, target.port);
    match time::timeout(timeout, attempt).await {
        Ok(Ok((stream, addr))) => Ok((stream, addr, start.elapsed())),
        Ok(Err(e)) => {
            debug!(probe = %target, error = %e, "connect failed");
            Err(classify_connect_error(&e))
        }
        Err(_) => Err(FailureReason::Timeout),
    }
}

async fn connect_any(host: &str, port: u16) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for addr in net::lookup_host((host, port)).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok((stream, addr)),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

pub(crate) fn classify_connect_error(e: &io::Error) -> FailureReason {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => FailureReason::Refused,
        io::ErrorKind::TimedOut => FailureReason::Timeout,
        io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::NetworkDown => FailureReason::Unreachable,
        _ => FailureReason::Other,
    }
}

/// TLS first; the banner path only runs when the peer was seen answering in plaintext
/// (or TLS is disabled), so both never read from the same bytes.
async fn exchange(
    stream: &mut TcpStream,
    target: &Target,
    peer_ip: IpAddr,
    cfg: &ScanConfig,
) -> (Option<TlsInfo>, Option<Vec<u8>>) {
    if cfg.tls {
        match tls::try_handshake(stream, &target.host, peer_ip, cfg.timeout).await {
            TlsOutcome::Negotiated(info) => return (Some(info), None),
            TlsOutcome::Failed => return (None, None),
            TlsOutcome::Plaintext => trace!(probe = %target, "plaintext peer, capturing banner"),
        }
    }
    (None, read_banner(stream, cfg.effective_banner_wait()).await)
}

/// One bounded read for whatever the peer sends on its own.
async fn read_banner(stream: &mut TcpStream, wait: Duration) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; BANNER_MAX];
    match time::timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            Some(buf)
        }
        Ok(Err(e)) => {
            debug!(error = %e, "banner read failed");
            None
        }
        _ => None,
    }
}

async fn reverse_dns(ip: IpAddr, cfg: &ScanConfig) -> Option<String> {
    if !cfg.reverse_dns {
        return None;
    }
    // getnameinfo blocks; the lookup keeps running on the blocking pool if it overruns.
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));
    match time::timeout(cfg.timeout, lookup).await {
        Ok(Ok(Ok(name))) => Some(name).filter(|n| !n.is_empty() && *n != ip.to_string()),
        Ok(Ok(Err(e))) => {
            debug!(%ip, error = %e, "reverse dns lookup failed");
            None
        }
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "reverse dns task failed");
            None
        }
        Err(_) => {
            debug!(%ip, "reverse dns lookup timed out");
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SocketOptions {
    send_buffer_size: Option<usize>,
    recv_buffer_size: Option<usize>,
    ttl: Option<u32>,
}

fn socket_options(stream: &TcpStream, peer: SocketAddr) -> SocketOptions {
    let sock = SockRef::from(stream);
    let ttl = if peer.is_ipv4() {
        sock.ttl()
    } else {
        sock.unicast_hops_v6()
    };
    SocketOptions {
        send_buffer_size: ok_or_log(sock.send_buffer_size(), "SO_SNDBUF"),
        recv_buffer_size: ok_or_log(sock.recv_buffer_size(), "SO_RCVBUF"),
        ttl: ok_or_log(ttl, "IP_TTL"),
    }
}

fn ok_or_log<T>(res: io::Result<T>, what: &str) -> Option<T> {
    res.map_err(|e| debug!(option = what, error = %e, "socket option unavailable"))
        .ok()
}

fn round_ms(d: Duration) -> f64 {
    (d.as_secs_f64() * 100_000.0).round() / 100.0
}

fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
