use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::probe::probe_target;
use crate::sink::ResultSink;
use crate::targets::TargetSet;
use crate::types::{ProbeResult, ScanReport};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Probe every target and return the aggregated results.
///
/// - Limits in-flight probes with a `Semaphore` of `cfg.concurrency` permits.
/// - Optionally spaces dispatches by a fixed interval (`cfg.rate_limit_per_second`).
/// - Probes report through a channel to one sink consumer; nothing else is shared.
pub async fn scan_targets(targets: TargetSet, cfg: &ScanConfig) -> Result<ScanReport> {
    let sink = ResultSink::collecting(cfg.order);
    scan_targets_with_sink(targets, cfg, sink, Progress::new(0)).await
}

/// Completion counters. Written only by the sink consumer, readable from anywhere.
#[derive(Clone, Debug)]
pub struct Progress {
    total: Arc<AtomicU64>,
    done: Arc<AtomicU64>,
    reachable: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total: Arc::new(AtomicU64::new(total)),
            done: Arc::new(AtomicU64::new(0)),
            reachable: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn record(&self, reachable: bool) {
        self.done.fetch_add(1, Ordering::Relaxed);
        if reachable {
            self.reachable.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn reachable(&self) -> u64 {
        self.reachable.load(Ordering::Relaxed)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Variant that streams results into `sink` and publishes counters through `progress`.
///
/// Returns `ScanError::Output` as soon as the sink fails; probes still in flight
/// are aborted and no further targets are dispatched.
pub async fn scan_targets_with_sink(
    targets: TargetSet,
    cfg: &ScanConfig,
    mut sink: ResultSink,
    progress: Progress,
) -> Result<ScanReport> {
    cfg.validate()?;
    let total = targets.len() as u64;
    progress.total.store(total, Ordering::Relaxed);
    sink.set_total(total);

    let started = Instant::now();
    info!(
        targets = total,
        concurrency = cfg.concurrency,
        rate = ?cfg.rate_limit_per_second,
        timeout_ms = cfg.timeout.as_millis() as u64,
        "scan started"
    );

    let (tx, rx) = mpsc::channel::<ProbeResult>(cfg.concurrency);
    let consumer_progress = progress.clone();
    let consumer = tokio::task::spawn_blocking(move || sink.drain(rx, &consumer_progress));

    let cfg = Arc::new(cfg.clone());
    let sem = Arc::new(Semaphore::new(cfg.concurrency));
    let mut ticker = cfg.dispatch_interval().map(|period| {
        let mut iv = time::interval(period);
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        iv
    });
    let mut set = JoinSet::new();
    let mut sink_failed = false;

    for target in targets {
        // Throttle and slot wait both give way to a failed sink.
        let slot = async {
            if let Some(iv) = ticker.as_mut() {
                iv.tick().await;
            }
            sem.clone().acquire_owned().await
        };
        let permit = tokio::select! {
            permit = slot => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = tx.closed() => {
                sink_failed = true;
                break;
            }
        };
        let tx = tx.clone();
        let cfg = Arc::clone(&cfg);

        set.spawn(async move {
            let _permit = permit; // keep permit until the result is handed off
            let result = probe_target(target, &cfg).await;
            // A closed channel means the sink already failed; the scheduler reports it.
            let _ = tx.send(result).await;
        });

        while let Some(joined) = set.try_join_next() {
            log_join_error(joined);
        }
    }

    if !sink_failed {
        loop {
            tokio::select! {
                biased;
                _ = tx.closed() => {
                    sink_failed = true;
                    break;
                }
                joined = set.join_next() => match joined {
                    Some(joined) => log_join_error(joined),
                    None => break,
                },
            }
        }
    }
    if sink_failed {
        warn!(in_flight = set.len(), "aborting remaining probes");
        set.shutdown().await;
    }
    drop(tx);

    let report = consumer
        .await
        .map_err(|e| ScanError::Output(io::Error::other(e)))??;
    info!(
        scanned = progress.done(),
        reachable = progress.reachable(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan finished"
    );
    Ok(report)
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if !e.is_cancelled() {
            error!(error = %e, "probe task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn progress_counts() {
        let p = Progress::new(3);
        p.record(true);
        p.record(false);
        assert_eq!((p.total(), p.done(), p.reachable()), (3, 2, 1));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_probing() {
        let targets = TargetSet::single("127.0.0.1", 9).unwrap();
        let cfg = ScanConfig { timeout: Duration::ZERO, ..Default::default() };
        let err = scan_targets(targets, &cfg).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn oversized_pool_is_config_error_not_panic() {
        let targets = TargetSet::single("127.0.0.1", 9).unwrap();
        let cfg = ScanConfig { concurrency: usize::MAX, ..Default::default() };
        assert!(scan_targets(targets, &cfg).await.unwrap_err().is_config());

        let targets = TargetSet::single("127.0.0.1", 9).unwrap();
        let cfg = ScanConfig { rate_limit_per_second: Some(1e-20), ..Default::default() };
        assert!(scan_targets(targets, &cfg).await.unwrap_err().is_config());
    }
}
