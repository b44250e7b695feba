//! Process-wide health sampling and admission control.
//!
//! A single background sampler measures scheduler delay (the drift of a
//! periodic timer) and the process's resident-set size, publishing both into
//! atomic latest-value cells. Request handlers read the cells without
//! locking; a sample one interval stale is acceptable. There is no
//! hysteresis: every admission check re-evaluates the latest snapshot
//! against the configured ceilings independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;

/// How often the background task samples delay and memory.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Latest sampled metric values, as exposed on the status route.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthSnapshot {
    /// Estimated scheduler delay over the last interval.
    pub event_loop_delay_ms: u64,
    /// Resident-set size of this process.
    pub rss_bytes: u64,
}

/// Configured ceilings, mirrored into the status payload.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthLimits {
    pub max_event_loop_delay_ms: u64,
    pub max_rss_bytes: u64,
}

/// Single-writer, many-reader health state.
///
/// Written only by [`run_sampler`]; request handling code never mutates it.
pub struct HealthMonitor {
    delay_ms: AtomicU64,
    rss_bytes: AtomicU64,
    limits: HealthLimits,
}

impl HealthMonitor {
    /// Create a monitor with ceilings from config. Metrics start at zero,
    /// so a freshly started server admits requests before the first sample.
    pub fn new(limits: &af_core::config::LimitsConfig) -> Self {
        Self {
            delay_ms: AtomicU64::new(0),
            rss_bytes: AtomicU64::new(0),
            limits: HealthLimits {
                max_event_loop_delay_ms: limits.max_event_loop_delay_ms,
                max_rss_bytes: limits.max_rss_bytes,
            },
        }
    }

    /// Publish a new sample. Called by the sampler task (and tests).
    pub fn record_sample(&self, delay: Duration, rss_bytes: u64) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
        self.rss_bytes.store(rss_bytes, Ordering::Relaxed);
    }

    /// Read the latest sample.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            event_loop_delay_ms: self.delay_ms.load(Ordering::Relaxed),
            rss_bytes: self.rss_bytes.load(Ordering::Relaxed),
        }
    }

    /// The configured ceilings.
    pub fn limits(&self) -> HealthLimits {
        self.limits
    }

    /// Whether any ceiling is currently breached.
    pub fn is_overloaded(&self) -> bool {
        let snap = self.snapshot();
        snap.event_loop_delay_ms > self.limits.max_event_loop_delay_ms
            || snap.rss_bytes > self.limits.max_rss_bytes
    }

    /// Admission check, run before any subprocess is spawned or upload
    /// bytes are consumed.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Overloaded`] naming the breached ceiling.
    pub fn check_admission(&self) -> af_core::Result<()> {
        let snap = self.snapshot();
        if snap.event_loop_delay_ms > self.limits.max_event_loop_delay_ms {
            return Err(af_core::Error::Overloaded(format!(
                "event loop delay {}ms above ceiling {}ms",
                snap.event_loop_delay_ms, self.limits.max_event_loop_delay_ms
            )));
        }
        if snap.rss_bytes > self.limits.max_rss_bytes {
            return Err(af_core::Error::Overloaded(format!(
                "resident memory {} bytes above ceiling {} bytes",
                snap.rss_bytes, self.limits.max_rss_bytes
            )));
        }
        Ok(())
    }
}

/// Background sampler: measures timer drift and RSS once per interval
/// until cancelled.
pub async fn run_sampler(monitor: Arc<HealthMonitor>, cancel: CancellationToken) {
    let mut system = System::new();
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => Some(pid),
        Err(e) => {
            tracing::warn!("Cannot determine own pid; memory sampling disabled: {e}");
            None
        }
    };

    loop {
        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(SAMPLE_INTERVAL) => {}
            _ = cancel.cancelled() => break,
        }
        // A busy scheduler wakes the timer late; the overshoot is the
        // delay estimate.
        let delay = started.elapsed().saturating_sub(SAMPLE_INTERVAL);

        let mut rss_bytes = 0;
        if let Some(pid) = pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                rss_bytes = process.memory();
            }
        }

        monitor.record_sample(delay, rss_bytes);

        if monitor.is_overloaded() {
            let snap = monitor.snapshot();
            tracing::warn!(
                delay_ms = snap.event_loop_delay_ms,
                rss_bytes = snap.rss_bytes,
                "Resource ceiling breached; rejecting new conversions"
            );
        }
    }

    tracing::debug!("Health sampler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::config::LimitsConfig;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(&LimitsConfig::default())
    }

    #[test]
    fn fresh_monitor_admits() {
        let m = monitor();
        assert!(!m.is_overloaded());
        assert!(m.check_admission().is_ok());
    }

    #[test]
    fn delay_ceiling_rejects() {
        let m = monitor();
        m.record_sample(Duration::from_secs(5), 0);
        assert!(m.is_overloaded());
        let err = m.check_admission().unwrap_err();
        assert!(matches!(err, af_core::Error::Overloaded(_)));
        assert!(err.to_string().contains("event loop delay"));
    }

    #[test]
    fn rss_ceiling_rejects() {
        let m = monitor();
        m.record_sample(Duration::ZERO, u64::MAX);
        let err = m.check_admission().unwrap_err();
        assert!(err.to_string().contains("resident memory"));
    }

    #[test]
    fn recovery_admits_again() {
        let m = monitor();
        m.record_sample(Duration::from_secs(5), 0);
        assert!(m.check_admission().is_err());
        // No hysteresis: the next healthy sample immediately re-admits.
        m.record_sample(Duration::from_millis(1), 1024);
        assert!(m.check_admission().is_ok());
    }

    #[test]
    fn snapshot_reflects_latest_sample() {
        let m = monitor();
        m.record_sample(Duration::from_millis(250), 42 * 1024 * 1024);
        let snap = m.snapshot();
        assert_eq!(snap.event_loop_delay_ms, 250);
        assert_eq!(snap.rss_bytes, 42 * 1024 * 1024);
    }

    #[tokio::test]
    async fn sampler_stops_on_cancel() {
        let m = Arc::new(monitor());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sampler(m, cancel.clone()));
        cancel.cancel();
        task.await.unwrap();
    }
}
