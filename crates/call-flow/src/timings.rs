use std::time::Duration;

/// Delays and budgets of the call flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTimings {
    /// Wait after the tab opens before anything runs.
    pub page_load_delay: Duration,
    pub locate_timeout: Duration,
    /// Locate budget of one join attempt.
    pub join_attempt_timeout: Duration,
    pub join_attempts: u32,
    pub retry_pause: Duration,
    /// Wait after joining before the monitor is armed.
    pub settle_delay: Duration,
    /// Extra wait before the greeting.
    pub chat_delay: Duration,
    pub chat_attempts: u32,
    pub chat_locate_timeout: Duration,
    /// Exit-info refresh period.
    pub tick: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            page_load_delay: Duration::from_secs(5),
            locate_timeout: Duration::from_secs(10),
            join_attempt_timeout: Duration::from_secs(5),
            join_attempts: 5,
            retry_pause: Duration::from_secs(2),
            settle_delay: Duration::from_secs(10),
            chat_delay: Duration::from_secs(5),
            chat_attempts: 3,
            chat_locate_timeout: Duration::from_secs(5),
            tick: Duration::from_secs(1),
        }
    }
}

impl FlowTimings {
    /// Upper bound of one leave sequence: farewell attempts plus the leave lookup.
    pub fn exit_budget(&self) -> Duration {
        self.chat_locate_timeout * self.chat_attempts + self.locate_timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTexts {
    pub greeting: String,
    pub farewell: String,
}

impl Default for ChatTexts {
    fn default() -> Self {
        Self {
            greeting: "Hello".to_string(),
            farewell: "Goodbye".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_budget_covers_every_farewell_attempt_and_the_leave_lookup() {
        let timings = FlowTimings::default();
        assert_eq!(timings.exit_budget(), Duration::from_secs(25));
    }
}
