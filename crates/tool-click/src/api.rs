use std::sync::Arc;

use action_primitives::{DomPort, ElementRef, NativeInput};

use crate::errors::ClickError;
use crate::metrics::{ClickMetrics, ClickMetricsSnapshot};
use crate::model::{ClickReport, Verification};
use crate::policy::ClickPolicy;
use crate::runner::{execute, RuntimeDeps};
use crate::strategies::{default_chain, ClickDeps, ClickStrategy};

/// Clicks elements through an ordered chain of strategies, escalating until one
/// attempt satisfies the verification.
pub struct ActionExecutor {
    dom: Arc<dyn DomPort>,
    native: Option<Arc<dyn NativeInput>>,
    strategies: Vec<Box<dyn ClickStrategy>>,
    policy: ClickPolicy,
    metrics: ClickMetrics,
}

impl ActionExecutor {
    pub fn builder(dom: Arc<dyn DomPort>) -> ActionExecutorBuilder {
        ActionExecutorBuilder {
            dom,
            native: None,
            strategies: None,
            policy: ClickPolicy::default(),
        }
    }

    pub async fn click(
        &self,
        el: &ElementRef,
        verification: &Verification,
    ) -> Result<ClickReport, ClickError> {
        let deps = RuntimeDeps {
            page: ClickDeps {
                dom: self.dom.as_ref(),
                native: self.native.as_deref(),
            },
            strategies: &self.strategies,
            policy: &self.policy,
            metrics: &self.metrics,
        };
        execute(el, verification, deps).await
    }

    pub fn metrics(&self) -> ClickMetricsSnapshot {
        self.metrics.snapshot()
    }
}

pub struct ActionExecutorBuilder {
    dom: Arc<dyn DomPort>,
    native: Option<Arc<dyn NativeInput>>,
    strategies: Option<Vec<Box<dyn ClickStrategy>>>,
    policy: ClickPolicy,
}

impl ActionExecutorBuilder {
    pub fn native(mut self, native: Arc<dyn NativeInput>) -> Self {
        self.native = Some(native);
        self
    }

    /// Replaces the default native → DOM → pointer chain.
    pub fn strategies(mut self, strategies: Vec<Box<dyn ClickStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn policy(mut self, policy: ClickPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> ActionExecutor {
        ActionExecutor {
            dom: self.dom,
            native: self.native,
            strategies: self.strategies.unwrap_or_else(default_chain),
            policy: self.policy,
            metrics: ClickMetrics::default(),
        }
    }
}
