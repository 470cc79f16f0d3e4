use std::time::Instant;

use action_primitives::{ActionError, DomPort, ElementRef};
use tracing::{debug, instrument, warn};

use crate::errors::ClickError;
use crate::metrics::ClickMetrics;
use crate::model::{AttemptOutcome, AttemptRecord, ClickReport, Verification};
use crate::policy::ClickPolicy;
use crate::strategies::{ClickDeps, ClickStrategy};

pub struct RuntimeDeps<'a> {
    pub page: ClickDeps<'a>,
    pub strategies: &'a [Box<dyn ClickStrategy>],
    pub policy: &'a ClickPolicy,
    pub metrics: &'a ClickMetrics,
}

#[instrument(skip_all, fields(element = %el, verify = ?verification))]
pub async fn execute(
    el: &ElementRef,
    verification: &Verification,
    deps: RuntimeDeps<'_>,
) -> Result<ClickReport, ClickError> {
    if deps.strategies.is_empty() {
        return Err(ClickError::NoStrategies);
    }
    let started_at = Instant::now();
    let mut attempts = Vec::with_capacity(deps.strategies.len());

    for strategy in deps.strategies {
        let outcome = match strategy.attempt(el, &deps.page).await {
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                debug!(strategy = strategy.name(), %err, "click strategy raised");
                deps.metrics.record_raised();
                AttemptOutcome::Raised(err.to_string())
            }
            Ok(()) if verification.is_none() => AttemptOutcome::Unverified,
            Ok(()) => {
                tokio::time::sleep(deps.policy.settle()).await;
                if verify(deps.page.dom, el, verification).await? {
                    AttemptOutcome::Verified
                } else {
                    debug!(strategy = strategy.name(), "click had no visible effect");
                    deps.metrics.record_ineffective();
                    AttemptOutcome::Ineffective
                }
            }
        };
        attempts.push(AttemptRecord {
            strategy: strategy.name(),
            outcome,
        });
        if let Some(report) = ClickReport::finish(started_at, attempts.clone()) {
            deps.metrics.record_ok();
            debug!(strategy = report.strategy, verified = report.verified, "click done");
            return Ok(report);
        }
    }

    let attempts: Vec<String> = attempts.iter().map(AttemptRecord::describe).collect();
    warn!(?attempts, "all click strategies exhausted");
    Err(ClickError::Ineffective { attempts })
}

async fn verify(
    dom: &dyn DomPort,
    el: &ElementRef,
    verification: &Verification,
) -> Result<bool, ClickError> {
    match verification {
        Verification::None => Ok(true),
        Verification::Detached => Ok(!dom.is_attached(el).await?),
        Verification::AttributeEquals { name, value } => match dom.attribute(el, name).await {
            Ok(current) => Ok(current.as_deref() == Some(value.as_str())),
            Err(ActionError::Detached(_)) => Ok(false),
            Err(err) => Err(err.into()),
        },
    }
}
