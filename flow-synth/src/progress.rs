/// Observes how far a generation run has come. Purely informational.
pub trait ProgressSink {
    fn flows_emitted(&mut self, total: u64);
}

pub struct NoOpProgress;
impl ProgressSink for NoOpProgress {
    fn flows_emitted(&mut self, _: u64) {}
}

/// Logs the completion percentage every time it crosses a multiple of `step_percent`
pub struct LoggingProgress {
    target: u64,
    step_percent: u64,
    last_reported: u64,
}

impl LoggingProgress {
    pub fn new(target: u64, step_percent: u64) -> Self {
        Self {
            target: target.max(1),
            step_percent: step_percent.clamp(1, 100),
            last_reported: 0,
        }
    }

    fn percent(&self, total: u64) -> u64 {
        (total.saturating_mul(100) / self.target).min(100)
    }
}

impl ProgressSink for LoggingProgress {
    fn flows_emitted(&mut self, total: u64) {
        let percent = self.percent(total);
        let step = percent / self.step_percent * self.step_percent;
        if step > self.last_reported {
            self.last_reported = step;
            tracing::info!("{step}% done ({total} raw flows)");
        }
    }
}
