//! Ephemeral per-tab call state.

/// Participant bookkeeping for one call. `peak_participants` never decreases and is
/// at least the current count once anything was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSession {
    pub participant_count: u32,
    pub peak_participants: u32,
    /// Epoch milliseconds of the join click.
    pub joined_at: Option<i64>,
    pub exit_armed: bool,
    observed: bool,
}

impl CallSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a counter reading; returns whether the count changed.
    pub fn observe(&mut self, count: u32) -> bool {
        let changed = !self.observed || count != self.participant_count;
        self.observed = true;
        self.participant_count = count;
        self.peak_participants = self.peak_participants.max(count);
        changed
    }

    pub fn has_observation(&self) -> bool {
        self.observed
    }
}

/// Reads the first run of ASCII digits, as in `"5 participants"` or `"(12)"`.
pub fn parse_count(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
