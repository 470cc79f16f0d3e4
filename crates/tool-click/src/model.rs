use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Post-condition checked after each attempt, once the settle interval passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Verification {
    /// First attempt that does not raise counts as success.
    #[default]
    None,
    AttributeEquals {
        name: String,
        value: String,
    },
    /// The element left the document.
    Detached,
}

impl Verification {
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Verification::AttributeEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Verification::None)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The strategy itself failed.
    Raised(String),
    /// Ran without error; nothing to verify against.
    Unverified,
    Verified,
    /// Ran without error, but the verification did not hold.
    Ineffective,
}

#[derive(Clone, Debug)]
pub struct AttemptRecord {
    pub strategy: &'static str,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    pub fn describe(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Raised(reason) => format!("{}: {}", self.strategy, reason),
            AttemptOutcome::Unverified => format!("{}: unverified", self.strategy),
            AttemptOutcome::Verified => format!("{}: verified", self.strategy),
            AttemptOutcome::Ineffective => format!("{}: no effect", self.strategy),
        }
    }
}

/// Outcome of a successful click.
#[derive(Clone, Debug)]
pub struct ClickReport {
    pub strategy: &'static str,
    pub verified: bool,
    pub attempts: Vec<AttemptRecord>,
    pub started_at: Instant,
    pub latency: Duration,
}

impl ClickReport {
    pub(crate) fn finish(
        started_at: Instant,
        attempts: Vec<AttemptRecord>,
    ) -> Option<Self> {
        let last = attempts.last()?;
        let verified = match last.outcome {
            AttemptOutcome::Verified => true,
            AttemptOutcome::Unverified => false,
            _ => return None,
        };
        Some(Self {
            strategy: last.strategy,
            verified,
            started_at,
            latency: started_at.elapsed(),
            attempts,
        })
    }
}
