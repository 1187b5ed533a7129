mod common;

use std::time::Duration;

use sockprobe::{probe_target, FailureReason, ScanConfig, Target};
use tokio::time::Instant;

fn cfg(timeout_ms: u64) -> ScanConfig {
    ScanConfig {
        timeout: Duration::from_millis(timeout_ms),
        banner_wait: Duration::from_millis(500),
        reverse_dns: false,
        ..Default::default()
    }
}

fn local(port: u16) -> Target {
    Target { index: 0, host: "127.0.0.1".into(), port }
}

#[tokio::test]
async fn refused_port_has_no_metadata() {
    let port = common::closed_port().await;
    let r = probe_target(local(port), &cfg(1000)).await;

    assert!(!r.reachable);
    assert_eq!(r.failure_reason, Some(FailureReason::Refused));
    assert!(r.latency_ms.is_none());
    assert!(r.local_endpoint.is_none() && r.peer_endpoint.is_none());
    assert!(r.service_name.is_none() && r.reverse_dns.is_none());
    assert!(r.banner.is_none() && r.tls.is_none());
    assert!(r.send_buffer_size.is_none() && r.recv_buffer_size.is_none() && r.ttl.is_none());
}

#[tokio::test]
async fn self_signed_tls_endpoint_reports_session() {
    let addr = common::spawn_tls_server().await;
    let r = probe_target(local(addr.port()), &cfg(2000)).await;

    assert!(r.reachable);
    let tls = r.tls.expect("tls negotiated");
    assert_eq!(tls.protocol_version, "TLSv1.3");
    assert!(tls.cipher_suite.starts_with("TLS13_"), "{}", tls.cipher_suite);
    let subject = tls.certificate_subject.expect("subject parsed");
    assert!(subject.contains("localhost"), "{subject}");
    assert!(r.banner.is_none());
}

#[tokio::test]
async fn tls_handshake_does_not_eat_plaintext_greeting() {
    let addr = common::spawn_greeter(Duration::ZERO, b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let r = probe_target(local(addr.port()), &cfg(1500)).await;

    assert!(r.reachable);
    assert!(r.tls.is_none());
    assert_eq!(r.banner_text().as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
}

#[tokio::test]
async fn plaintext_reply_to_client_hello_is_captured_not_tls() {
    let addr = common::spawn_http_like().await;
    let r = probe_target(local(addr.port()), &cfg(1500)).await;

    assert!(r.reachable);
    assert!(r.tls.is_none());
    let banner = r.banner_text().expect("reply captured");
    assert!(banner.starts_with("HTTP/1.1 400"), "{banner}");
}

#[tokio::test]
async fn reachable_result_carries_endpoints_and_socket_options() {
    let addr = common::spawn_greeter(Duration::ZERO, b"hi\n").await;
    let r = probe_target(local(addr.port()), &cfg(1500)).await;

    assert!(r.reachable);
    assert!(r.latency_ms.unwrap() >= 0.0);
    assert_eq!(r.peer_endpoint, Some(addr));
    assert_eq!(r.local_endpoint.map(|a| a.ip()), Some(addr.ip()));
    assert!(r.send_buffer_size.unwrap_or(0) > 0);
    assert!(r.recv_buffer_size.unwrap_or(0) > 0);
    assert!(r.ttl.is_some());
    assert!(r.failure_reason.is_none());
}

#[tokio::test]
async fn tls_alert_is_not_a_failure() {
    let addr = common::spawn_tls_alert().await;
    let r = probe_target(local(addr.port()), &cfg(2000)).await;

    assert!(r.reachable);
    assert!(r.tls.is_none());
    assert!(r.failure_reason.is_none());
    // The alert bytes were TLS, not a greeting.
    assert!(r.banner.is_none());
    assert!(r.latency_ms.is_some() && r.peer_endpoint.is_some());
}

#[tokio::test]
async fn reverse_dns_outcome_never_changes_reachability() {
    let addr = common::spawn_greeter(Duration::ZERO, b"hi\n").await;
    let cfg = ScanConfig { reverse_dns: true, ..cfg(1500) };
    let r = probe_target(local(addr.port()), &cfg).await;

    assert!(r.reachable);
    if let Some(name) = &r.reverse_dns {
        assert_ne!(name, "127.0.0.1");
    }
}

#[tokio::test]
async fn unreachable_target_respects_timeout() {
    // Non-routable; either silently dropped (timeout) or rejected by the stack.
    let timeout = Duration::from_millis(300);
    let slack = Duration::from_millis(250);
    let t = Target { index: 0, host: "10.255.255.1".into(), port: 81 };

    let start = Instant::now();
    let r = probe_target(t, &cfg(timeout.as_millis() as u64)).await;
    let elapsed = start.elapsed();

    if r.reachable {
        eprintln!("skipping: {} accepted a connection on this network", r.target);
        return;
    }
    assert!(r.failure_reason.is_some());
    assert!(elapsed <= timeout + slack, "took {elapsed:?}");
    if r.failure_reason == Some(FailureReason::Timeout) {
        assert!(elapsed >= timeout, "timed out early: {elapsed:?}");
    }
}
