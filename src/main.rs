use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use sockprobe::{
    hosts, ports, scan_targets_with_sink, OutputFormat, OutputOrder, ProbeResult, Progress,
    ResultSink, ScanConfig, ScanReport, TargetSet,
};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// sockprobe — bulk TCP reachability prober with banner, TLS and socket metadata capture.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sockprobe",
    version,
    about = "Bulk TCP reachability prober with banner, TLS and socket metadata capture.",
    long_about = None
)]
struct Cli {
    /// Single target host (IP or name). Requires --port.
    #[arg(long, conflicts_with_all = ["hosts", "ports"], requires = "port")]
    ip: Option<String>,

    /// Port for a single-target probe.
    #[arg(long, requires = "ip")]
    port: Option<u16>,

    /// Path to hosts list (one host per line; CIDR blocks allowed in cross mode).
    #[arg(long, requires = "ports")]
    hosts: Option<PathBuf>,

    /// Path to ports list (one port per line; ranges allowed in cross mode).
    #[arg(long, requires = "hosts")]
    ports: Option<PathBuf>,

    /// How host and port lists are combined.
    #[arg(long, value_enum, default_value_t = Mode::Cross)]
    mode: Mode,

    /// Per-probe timeout in milliseconds (connect, TLS handshake, reverse DNS).
    #[arg(short = 't', long = "timeout-ms", default_value_t = 3000)]
    timeout_ms: u64,

    /// Max concurrent probes.
    #[arg(short = 'w', long, default_value_t = 30)]
    concurrency: usize,

    /// Max probes started per second (unlimited if omitted).
    #[arg(long)]
    rate: Option<f64>,

    /// How long to wait for a plaintext greeting, in milliseconds.
    #[arg(long = "banner-wait-ms", default_value_t = 1000)]
    banner_wait_ms: u64,

    /// Skip the opportunistic TLS handshake.
    #[arg(long = "no-tls", default_value_t = false)]
    no_tls: bool,

    /// Skip reverse DNS lookups.
    #[arg(long = "no-rdns", default_value_t = false)]
    no_rdns: bool,

    /// Order of results in the output.
    #[arg(long, value_enum, default_value_t = Order::Completion)]
    order: Order,

    /// Write results to this path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output encoding for --output.
    #[arg(long, value_enum, default_value_t = Format::Jsonl)]
    format: Format,

    /// Seconds between progress log lines in bulk mode (0 disables).
    #[arg(long = "progress-secs", default_value_t = 10)]
    progress_secs: u64,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// hosts[i] with ports[i]
    Pairwise,
    /// every host with every port
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Order {
    Completion,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// one JSON object per line, streamed
    Jsonl,
    /// one pretty JSON report at the end
    Json,
    /// header plus one flattened row per result, streamed
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let targets = build_targets(&cli)?;
    let cfg = ScanConfig {
        timeout: Duration::from_millis(cli.timeout_ms),
        concurrency: cli.concurrency,
        rate_limit_per_second: cli.rate,
        banner_wait: Duration::from_millis(cli.banner_wait_ms),
        tls: !cli.no_tls,
        reverse_dns: !cli.no_rdns,
        order: match cli.order {
            Order::Completion => OutputOrder::Completion,
            Order::Input => OutputOrder::Input,
        },
    };
    cfg.validate()?;

    info!(
        targets = targets.len(),
        timeout_ms = cli.timeout_ms,
        concurrency = cli.concurrency,
        rate = ?cli.rate,
        tls = cfg.tls,
        reverse_dns = cfg.reverse_dns,
        output = %cli.output.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<none>".to_string()),
        "sockprobe configuration"
    );

    let sink = match cli.output.as_deref() {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file: {}", path.display()))?;
            let format = match cli.format {
                Format::Jsonl => OutputFormat::JsonLines,
                Format::Json => OutputFormat::JsonReport,
                Format::Csv => OutputFormat::Csv,
            };
            ResultSink::new(BufWriter::new(file), format, cfg.order)
        }
        None => ResultSink::collecting(cfg.order),
    };

    let single = cli.ip.is_some();
    let progress = Progress::new(targets.len() as u64);
    let reporter = (!single && cli.progress_secs > 0)
        .then(|| tokio::spawn(report_progress(progress.clone(), Duration::from_secs(cli.progress_secs))));

    // Ctrl-C ends the process; there is no partial-batch cancellation.
    let report = tokio::select! {
        res = scan_targets_with_sink(targets, &cfg, sink, progress) => res?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, exiting");
            std::process::exit(130);
        }
    };
    if let Some(handle) = reporter {
        handle.abort();
    }

    if single {
        if let Some(result) = report.results.first() {
            print_single(result);
        }
    } else {
        print_results_table(&report);
    }
    if let Some(path) = cli.output.as_deref() {
        println!("Wrote {} results to {}", report.results.len(), path.display());
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_targets(cli: &Cli) -> Result<TargetSet> {
    if let (Some(ip), Some(port)) = (cli.ip.as_deref(), cli.port) {
        return Ok(TargetSet::single(ip, port)?);
    }
    let (Some(hosts_path), Some(ports_path)) = (cli.hosts.as_deref(), cli.ports.as_deref()) else {
        bail!("either --ip/--port or --hosts/--ports is required");
    };
    let pairwise = cli.mode == Mode::Pairwise;
    let host_list = hosts::load_hosts_from_path(hosts_path, !pairwise)?;
    let port_list = ports::load_ports_from_path(ports_path, pairwise)?;
    let set = if pairwise {
        TargetSet::build_pairwise(&host_list, &port_list)?
    } else {
        TargetSet::build_cross_product(&host_list, &port_list)?
    };
    Ok(set)
}

async fn report_progress(progress: Progress, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        info!(
            "checked {} of {} targets ({} reachable)",
            progress.done(),
            progress.total(),
            progress.reachable()
        );
    }
}

fn print_single(r: &ProbeResult) {
    let state = if r.reachable { "OPEN" } else { "CLOSED" };
    println!("{}: {}", state, r.target);
    let opt = |v: Option<String>| v.unwrap_or_default();
    println!("failure_reason: {}", opt(r.failure_reason.map(|f| f.to_string())));
    println!("latency_ms: {}", opt(r.latency_ms.map(|l| l.to_string())));
    println!("local_endpoint: {}", opt(r.local_endpoint.map(|a| a.to_string())));
    println!("peer_endpoint: {}", opt(r.peer_endpoint.map(|a| a.to_string())));
    println!("service: {}", opt(r.service_name.clone()));
    println!("rdns: {}", opt(r.reverse_dns.clone()));
    println!("sndbuf: {}", opt(r.send_buffer_size.map(|v| v.to_string())));
    println!("rcvbuf: {}", opt(r.recv_buffer_size.map(|v| v.to_string())));
    println!("ttl: {}", opt(r.ttl.map(|v| v.to_string())));
    println!("banner: {}", opt(r.banner_text()));
    if let Some(tls) = &r.tls {
        println!("tls_version: {}", tls.protocol_version);
        println!("tls_cipher: {}", tls.cipher_suite);
        println!("cert_subject: {}", opt(tls.certificate_subject.clone()));
    }
}

fn print_results_table(report: &ScanReport) {
    let mut target_w = "target".len();
    let mut banner_w = "banner".len();
    let mut tls_w = "tls".len();
    for r in &report.results {
        target_w = target_w.max(r.target.to_string().len());
        if let Some(b) = r.banner_text() {
            banner_w = banner_w.max(b.chars().count().min(60));
        }
        if let Some(t) = &r.tls {
            tls_w = tls_w.max(t.protocol_version.len());
        }
    }
    let state_w = "unreachable".len();
    let lat_w = "latency_ms".len();
    let svc_w = 14usize;

    println!(
        "\nReachable: {} (scanned: {})",
        report.reachable_count, report.scanned_total
    );
    println!(
        "{:<target_w$}  {:<state_w$}  {:>lat_w$}  {:<svc_w$}  {:<tls_w$}  {:<banner_w$}",
        "target", "state", "latency_ms", "service", "tls", "banner",
    );
    println!(
        "{:-<target_w$}  {:-<state_w$}  {:-<lat_w$}  {:-<svc_w$}  {:-<tls_w$}  {:-<banner_w$}",
        "", "", "", "", "", "",
    );
    for r in &report.results {
        let state = match r.failure_reason {
            Some(reason) => reason.to_string(),
            None => "open".to_string(),
        };
        let latency = r.latency_ms.map(|l| format!("{l:.2}")).unwrap_or_default();
        let service = r.service_name.as_deref().unwrap_or("");
        let tls = r.tls.as_ref().map(|t| t.protocol_version.as_str()).unwrap_or("");
        let banner: String = r.banner_text().unwrap_or_default().chars().take(60).collect();
        println!(
            "{:<target_w$}  {:<state_w$}  {:>lat_w$}  {:<svc_w$}  {:<tls_w$}  {:<banner_w$}",
            r.target.to_string(),
            state,
            latency,
            service,
            tls,
            banner,
        );
    }
}
