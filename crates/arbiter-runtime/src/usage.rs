//! Judge usage tracking.

use parking_lot::RwLock;

use crate::providers::JudgeResponse;

/// Accumulated judge usage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JudgeUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_latency_seconds: f64,
}

/// Thread-safe usage accumulator shared across judge calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    inner: RwLock<JudgeUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, response: &JudgeResponse) {
        let mut usage = self.inner.write();
        usage.calls += 1;
        usage.input_tokens += u64::from(response.input_tokens);
        usage.output_tokens += u64::from(response.output_tokens);
        usage.total_latency_seconds += response.latency_seconds;
    }

    pub fn snapshot(&self) -> JudgeUsage {
        *self.inner.read()
    }

    pub fn reset(&self) {
        *self.inner.write() = JudgeUsage::default();
    }
}
