//! Periodic rate/ETA logging for long batches.

use tokio::time::Instant;
use tracing::info;

/// Records between progress lines.
const EVERY: usize = 10;

/// Counts finished items and logs throughput every few of them.
#[derive(Debug)]
pub(crate) struct Progress {
    what: &'static str,
    total: usize,
    done: usize,
    started: Instant,
}

impl Progress {
    pub(crate) fn new(what: &'static str, total: usize) -> Self {
        Self {
            what,
            total,
            done: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn tick(&mut self) {
        self.done += 1;
        if self.done % EVERY != 0 && self.done != self.total {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.done as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(self.done);
        let eta_secs = if rate > 0.0 {
            (remaining as f64 / rate).round() as u64
        } else {
            0
        };
        info!(
            done = self.done,
            total = self.total,
            rate = %format!("{rate:.1}/s"),
            eta_secs,
            "{} progress",
            self.what
        );
    }
}
