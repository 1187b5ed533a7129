use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;

/// One host/port pair to probe.
///
/// `index` is the position of the target in the enumerated set; the sink uses it
/// to restore input order when asked to.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub index: usize,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Why a connection attempt did not succeed.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Refused,
    Unreachable,
    Other,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Refused => "refused",
            FailureReason::Unreachable => "unreachable",
            FailureReason::Other => "error",
        };
        f.write_str(s)
    }
}

/// Parameters of a completed TLS handshake. Never partially filled: either the
/// handshake finished and version and cipher are known, or there is no `TlsInfo`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub protocol_version: String,
    pub cipher_suite: String,
    pub certificate_subject: Option<String>,
}

/// Outcome of probing a single target.
///
/// Absent optional fields mean "not available", never an error marker. When
/// `reachable` is false only `failure_reason` is set.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub target: Target,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub local_endpoint: Option<SocketAddr>,
    pub peer_endpoint: Option<SocketAddr>,
    pub service_name: Option<String>,
    #[serde(serialize_with = "serialize_banner")]
    pub banner: Option<Vec<u8>>,
    pub reverse_dns: Option<String>,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    pub ttl: Option<u32>,
    pub tls: Option<TlsInfo>,
    pub failure_reason: Option<FailureReason>,
    pub timestamp: String,
}

impl ProbeResult {
    /// Result for a target that could not be connected to.
    pub fn unreachable(target: Target, reason: FailureReason, timestamp: String) -> Self {
        Self {
            target,
            reachable: false,
            latency_ms: None,
            local_endpoint: None,
            peer_endpoint: None,
            service_name: None,
            banner: None,
            reverse_dns: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            ttl: None,
            tls: None,
            failure_reason: Some(reason),
            timestamp,
        }
    }

    /// Banner bytes rendered for display: lossy UTF-8 with CR/LF escaped.
    pub fn banner_text(&self) -> Option<String> {
        self.banner.as_deref().map(render_banner)
    }
}

/// Lossy UTF-8 rendering of raw banner bytes, trimmed, with line breaks escaped.
pub fn render_banner(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim()
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn serialize_banner<S: Serializer>(banner: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match banner {
        Some(bytes) => s.serialize_some(&render_banner(bytes)),
        None => s.serialize_none(),
    }
}

/// Aggregate of one batch.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ScanReport {
    pub scanned_total: u64,
    pub reachable_count: u64,
    pub results: Vec<ProbeResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target { index: 0, host: "127.0.0.1".into(), port: 9 }
    }

    #[test]
    fn unreachable_result_has_only_failure_reason() {
        let r = ProbeResult::unreachable(target(), FailureReason::Refused, "t".into());
        assert!(!r.reachable);
        assert_eq!(r.failure_reason, Some(FailureReason::Refused));
        assert!(r.latency_ms.is_none() && r.tls.is_none() && r.banner.is_none());
        assert!(r.peer_endpoint.is_none() && r.service_name.is_none() && r.ttl.is_none());
    }

    #[test]
    fn banner_serializes_as_escaped_text() {
        let mut r = ProbeResult::unreachable(target(), FailureReason::Other, "t".into());
        r.banner = Some(b"SSH-2.0-OpenSSH_9.6\r\nextra\n".to_vec());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["banner"], "SSH-2.0-OpenSSH_9.6\\r\\nextra");
        assert_eq!(v["failure_reason"], "other");
        assert!(v["tls"].is_null());
    }

    #[test]
    fn ipv6_target_display_is_bracketed() {
        let t = Target { index: 1, host: "::1".into(), port: 443 };
        assert_eq!(t.to_string(), "[::1]:443");
        assert_eq!(target().to_string(), "127.0.0.1:9");
    }
}
