use crate::config::OutputOrder;
use crate::error::{Result, ScanError};
use crate::scanner::Progress;
use crate::types::{ProbeResult, ScanReport};
use csv::WriterBuilder;
use std::collections::BTreeMap;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::error;

/// Encoding used when the sink has a backing writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON object per line, written as each result is emitted.
    #[default]
    JsonLines,
    /// A single pretty-printed `ScanReport`, written when the batch finishes.
    JsonReport,
    /// Header line, then one flattened row per result as it is emitted.
    Csv,
}

/// Column layout of `OutputFormat::Csv`.
pub const CSV_COLUMNS: [&str; 18] = [
    "ip",
    "port",
    "status",
    "banner",
    "local_ip",
    "local_port",
    "peer_ip",
    "peer_port",
    "service",
    "latency_ms",
    "rdns",
    "sndbuf",
    "rcvbuf",
    "ttl",
    "tls_version",
    "tls_cipher",
    "cert_subject",
    "failure_reason",
];

fn csv_row(r: &ProbeResult) -> Vec<String> {
    fn opt<T: ToString>(v: Option<T>) -> String {
        v.map(|v| v.to_string()).unwrap_or_default()
    }
    let tls = r.tls.as_ref();
    vec![
        r.target.host.clone(),
        r.target.port.to_string(),
        if r.reachable { "open" } else { "closed" }.to_string(),
        r.banner_text().unwrap_or_default(),
        opt(r.local_endpoint.map(|a| a.ip())),
        opt(r.local_endpoint.map(|a| a.port())),
        opt(r.peer_endpoint.map(|a| a.ip())),
        opt(r.peer_endpoint.map(|a| a.port())),
        opt(r.service_name.as_deref()),
        opt(r.latency_ms),
        opt(r.reverse_dns.as_deref()),
        opt(r.send_buffer_size),
        opt(r.recv_buffer_size),
        opt(r.ttl),
        opt(tls.map(|t| t.protocol_version.as_str())),
        opt(tls.map(|t| t.cipher_suite.as_str())),
        opt(tls.and_then(|t| t.certificate_subject.as_deref())),
        opt(r.failure_reason),
    ]
}

// Renders into memory so a record reaches the writer in one piece.
fn render_csv<I, S>(record: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    wtr.write_record(record)?;
    wtr.into_inner()
        .map_err(|e| ScanError::Output(e.into_error()))
}

/// Single writer for a batch's results.
///
/// Results are rendered completely before being written, one at a time, so two
/// results never interleave. Any write error is returned as `ScanError::Output`.
pub struct ResultSink {
    writer: Option<Box<dyn Write + Send>>,
    format: OutputFormat,
    order: OutputOrder,
    pending: BTreeMap<usize, ProbeResult>,
    next_index: usize,
    header_written: bool,
    report: ScanReport,
}

impl ResultSink {
    /// Sink that only aggregates into the returned `ScanReport`.
    pub fn collecting(order: OutputOrder) -> Self {
        Self {
            writer: None,
            format: OutputFormat::default(),
            order,
            pending: BTreeMap::new(),
            next_index: 0,
            header_written: false,
            report: ScanReport::default(),
        }
    }

    pub fn new(writer: impl Write + Send + 'static, format: OutputFormat, order: OutputOrder) -> Self {
        Self { writer: Some(Box::new(writer)), format, ..Self::collecting(order) }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.report.scanned_total = total;
    }

    /// Accept one completed result, emitting it now or once its predecessors
    /// (by target index) have arrived.
    pub fn accept(&mut self, result: ProbeResult) -> Result<()> {
        match self.order {
            OutputOrder::Completion => self.emit(result),
            OutputOrder::Input => {
                self.pending.insert(result.target.index, result);
                while let Some(next) = self.pending.remove(&self.next_index) {
                    self.next_index += 1;
                    self.emit(next)?;
                }
                Ok(())
            }
        }
    }

    fn emit(&mut self, result: ProbeResult) -> Result<()> {
        if self.writer.is_some() {
            let line = match self.format {
                OutputFormat::JsonLines => {
                    let mut line = serde_json::to_vec(&result)?;
                    line.push(b'\n');
                    Some(line)
                }
                OutputFormat::Csv => Some(render_csv(csv_row(&result))?),
                OutputFormat::JsonReport => None,
            };
            if let Some(line) = line {
                self.write_csv_header()?;
                self.write_all(&line)?;
            }
        }
        if result.reachable {
            self.report.reachable_count += 1;
        }
        self.report.results.push(result);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).map_err(ScanError::Output)?;
            writer.flush().map_err(ScanError::Output)?;
        }
        Ok(())
    }

    fn write_csv_header(&mut self) -> Result<()> {
        if self.format != OutputFormat::Csv || self.header_written || self.writer.is_none() {
            return Ok(());
        }
        let header = render_csv(CSV_COLUMNS)?;
        self.write_all(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Flush whatever is still buffered and return the aggregate report.
    pub fn finish(mut self) -> Result<ScanReport> {
        // Gaps only exist if probes were lost; emit the rest in index order anyway.
        let rest = std::mem::take(&mut self.pending);
        for (_, result) in rest {
            self.emit(result)?;
        }
        self.write_csv_header()?;
        if let (Some(writer), OutputFormat::JsonReport) = (self.writer.as_mut(), self.format) {
            let body = serde_json::to_vec_pretty(&self.report)?;
            writer.write_all(&body).map_err(ScanError::Output)?;
            writer.write_all(b"\n").map_err(ScanError::Output)?;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(ScanError::Output)?;
        }
        Ok(self.report)
    }

    /// Consume completions until every producer is gone. Runs on a blocking thread.
    ///
    /// Returning early (on error) drops `rx`, which the scheduler observes as the
    /// signal to stop dispatching.
    pub(crate) fn drain(
        mut self,
        mut rx: mpsc::Receiver<ProbeResult>,
        progress: &Progress,
    ) -> Result<ScanReport> {
        while let Some(result) = rx.blocking_recv() {
            let reachable = result.reachable;
            if let Err(e) = self.accept(result) {
                error!(error = %e, "result sink failed, aborting batch");
                return Err(e);
            }
            progress.record(reachable);
        }
        self.finish()
    }
}
