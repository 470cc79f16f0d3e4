//! Exit predicates and the reasons they report.

use std::fmt;
use std::time::Duration;

use callwarden_config_store::{ExitMode, MeetingConfig};

use crate::session::CallSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TimerExpired,
    MinimumParticipants,
    PeakPercentage,
}

impl ExitReason {
    /// Text stored as the meeting's `exitReason`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TimerExpired => "Timer expired",
            ExitReason::MinimumParticipants => "Minimum participants reached",
            ExitReason::PeakPercentage => "Peak percentage threshold reached",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single predicate an armed monitor evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPredicate {
    Timer { after: Duration },
    Participants { min: u32 },
    Peak { percentage: u32 },
}

impl ExitPredicate {
    /// `None` when automatic exit is off, or the timer is selected with duration zero.
    pub fn from_config(cfg: &MeetingConfig) -> Option<Self> {
        if !cfg.auto_exit_enabled {
            return None;
        }
        match cfg.exit_mode {
            ExitMode::Timer if cfg.timer_duration == 0 => None,
            ExitMode::Timer => Some(ExitPredicate::Timer {
                after: Duration::from_secs(u64::from(cfg.timer_duration) * 60),
            }),
            ExitMode::Participants => Some(ExitPredicate::Participants {
                min: cfg.min_participants,
            }),
            ExitMode::Peak => Some(ExitPredicate::Peak {
                percentage: cfg.peak_percentage,
            }),
        }
    }

    pub fn mode(&self) -> ExitMode {
        match self {
            ExitPredicate::Timer { .. } => ExitMode::Timer,
            ExitPredicate::Participants { .. } => ExitMode::Participants,
            ExitPredicate::Peak { .. } => ExitMode::Peak,
        }
    }

    pub fn watches_count(&self) -> bool {
        !matches!(self, ExitPredicate::Timer { .. })
    }

    /// Count-driven decision. The timer predicate never fires from here.
    pub fn evaluate(&self, session: &CallSession) -> Option<ExitReason> {
        if !session.has_observation() {
            return None;
        }
        let count = u64::from(session.participant_count);
        match *self {
            ExitPredicate::Timer { .. } => None,
            ExitPredicate::Participants { min } => {
                (count <= u64::from(min)).then_some(ExitReason::MinimumParticipants)
            }
            ExitPredicate::Peak { percentage } => {
                let peak = u64::from(session.peak_participants);
                // count / peak * 100 <= percentage, without the division
                (peak > 0 && count * 100 <= u64::from(percentage) * peak)
                    .then_some(ExitReason::PeakPercentage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(counts: &[u32]) -> CallSession {
        let mut session = CallSession::new();
        for count in counts {
            session.observe(*count);
        }
        session
    }

    #[test]
    fn disabled_config_has_no_predicate() {
        for mode in [ExitMode::Timer, ExitMode::Participants, ExitMode::Peak] {
            let cfg = MeetingConfig {
                exit_mode: mode,
                auto_exit_enabled: false,
                ..MeetingConfig::default()
            };
            assert_eq!(ExitPredicate::from_config(&cfg), None);
        }
        let zero_timer = MeetingConfig {
            timer_duration: 0,
            ..MeetingConfig::default()
        };
        assert_eq!(ExitPredicate::from_config(&zero_timer), None);
    }

    #[test]
    fn only_the_selected_threshold_matters() {
        let cfg = MeetingConfig {
            exit_mode: ExitMode::Peak,
            min_participants: 1_000,
            peak_percentage: 50,
            ..MeetingConfig::default()
        };
        let predicate = ExitPredicate::from_config(&cfg).unwrap();
        assert_eq!(predicate.evaluate(&observed(&[10, 6])), None);
        assert_eq!(
            predicate.evaluate(&observed(&[10, 5])),
            Some(ExitReason::PeakPercentage)
        );
    }

    #[test]
    fn participants_threshold_is_inclusive() {
        let predicate = ExitPredicate::Participants { min: 2 };
        assert_eq!(predicate.evaluate(&observed(&[10, 3])), None);
        assert_eq!(
            predicate.evaluate(&observed(&[10, 2])),
            Some(ExitReason::MinimumParticipants)
        );
        assert_eq!(predicate.evaluate(&CallSession::new()), None);
    }

    #[test]
    fn peak_needs_a_nonzero_peak() {
        let predicate = ExitPredicate::Peak { percentage: 10 };
        assert_eq!(predicate.evaluate(&observed(&[0])), None);
        assert_eq!(
            predicate.evaluate(&observed(&[20, 2])),
            Some(ExitReason::PeakPercentage)
        );
        assert_eq!(predicate.evaluate(&observed(&[20, 3])), None);
    }

    #[test]
    fn timer_minutes_become_duration() {
        let cfg = MeetingConfig {
            timer_duration: 2,
            ..MeetingConfig::default()
        };
        assert_eq!(
            ExitPredicate::from_config(&cfg),
            Some(ExitPredicate::Timer {
                after: Duration::from_secs(120)
            })
        );
    }
}
