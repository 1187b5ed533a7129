use crate::error::{Result, ScanError};
use serde::Serialize;
use std::time::Duration;

/// Upper bound on in-flight probes; also keeps the semaphore and channel sizes sane.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Order in which the sink emits results.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrder {
    /// As probes finish.
    #[default]
    Completion,
    /// Same order as the enumerated targets; out-of-order completions are buffered.
    Input,
}

/// Knobs consumed by the probing engine.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Per-probe bound applied to connect, TLS handshake and resolver lookups.
    pub timeout: Duration,
    /// Maximum number of probes in flight.
    pub concurrency: usize,
    /// Optional cap on how many probes are started per second.
    pub rate_limit_per_second: Option<f64>,
    /// How long to wait for a spontaneous greeting on the plaintext path.
    pub banner_wait: Duration,
    pub tls: bool,
    pub reverse_dns: bool,
    pub order: OutputOrder,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            concurrency: 30,
            rate_limit_per_second: None,
            banner_wait: Duration::from_secs(1),
            tls: true,
            reverse_dns: true,
            order: OutputOrder::Completion,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(ScanError::config("timeout must be greater than zero"));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ScanError::config(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if let Some(rate) = self.rate_limit_per_second {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ScanError::config(format!(
                    "rate limit must be a positive number, got {rate}"
                )));
            }
            if interval_for(rate).is_none() {
                return Err(ScanError::config(format!(
                    "rate limit {rate} gives no usable dispatch interval"
                )));
            }
        }
        Ok(())
    }

    /// Fixed spacing between two probe dispatches, if throttling is enabled.
    pub fn dispatch_interval(&self) -> Option<Duration> {
        self.rate_limit_per_second.and_then(interval_for)
    }

    /// Banner window, never longer than the probe timeout.
    pub fn effective_banner_wait(&self) -> Duration {
        self.banner_wait.min(self.timeout)
    }
}

// None when the spacing overflows `Duration` or rounds down to zero.
fn interval_for(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rate)
        .ok()
        .filter(|d| !d.is_zero())
}
