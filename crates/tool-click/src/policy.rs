use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClickPolicy {
    /// Delay between an attempt and its verification.
    pub settle_ms: u64,
}

impl ClickPolicy {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for ClickPolicy {
    fn default() -> Self {
        Self { settle_ms: 2000 }
    }
}
