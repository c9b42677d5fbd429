use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Persistent node the participants are created under
    pub namespace: String,

    /// Name prefix of each participant's sequential node
    pub prefix: String,

    /// Bound on consecutive evaluations that find the predecessor already gone
    /// (`None` keeps retrying)
    pub max_attempts: Option<u32>,

    /// Pause between such evaluations
    pub retry_backoff: Duration,

    /// Upper bound of random extra pause added to `retry_backoff`
    pub retry_jitter: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            namespace: "/election".to_string(),
            prefix: "c_".to_string(),
            max_attempts: None,
            retry_backoff: Duration::ZERO,
            retry_jitter: Duration::ZERO,
        }
    }
}

impl ElectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Pause before the next evaluation after a vanished predecessor.
    pub fn retry_delay(&self) -> Duration {
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.retry_backoff;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.retry_backoff + Duration::from_millis(extra)
    }

    pub(crate) fn participant_prefix(&self) -> String {
        herald_core::path::join(&self.namespace, &self.prefix)
    }
}
