//! Stage-keyed hook registry.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::builtin::{ReviewGateHook, SanityCheckHook};
use super::command::CommandHook;
use super::types::{HookContext, HookOutcome, HookResult, PreStepHook};
use crate::stage::PULL_REQUEST_STAGE;
use crate::waypoint_config::HookSection;

/// Hooks run immediately before a stage, in registration order.
///
/// The first failing hook stops the rest for that stage and its remediation
/// hint becomes the outcome's.
#[derive(Default)]
pub struct PreStepHookRegistry {
    hooks: BTreeMap<u8, Vec<Box<dyn PreStepHook>>>,
}

impl PreStepHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sanity check and review gate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(0, Box::new(SanityCheckHook));
        registry.register(PULL_REQUEST_STAGE, Box::new(ReviewGateHook));
        registry
    }

    /// Defaults followed by the configured command hooks.
    pub fn from_config(hooks: &[HookSection]) -> Self {
        let mut registry = Self::with_defaults();
        for section in hooks {
            registry.register(section.stage, Box::new(CommandHook::from_config(section)));
        }
        registry
    }

    pub fn register(&mut self, stage: u8, hook: Box<dyn PreStepHook>) {
        debug!(stage, hook = hook.name(), "registered pre-step hook");
        self.hooks.entry(stage).or_default().push(hook);
    }

    /// Names of hooks registered for `stage`, in run order.
    pub fn hook_names(&self, stage: u8) -> Vec<&str> {
        self.hooks
            .get(&stage)
            .map(|hooks| hooks.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }

    pub async fn run_hooks(&self, stage: u8, ctx: &HookContext) -> HookOutcome {
        let Some(hooks) = self.hooks.get(&stage) else {
            return HookOutcome::passed();
        };
        for hook in hooks {
            let result = match hook.run(ctx).await {
                Ok(result) => result,
                Err(e) => HookResult::fail(
                    format!("{e:#}"),
                    format!("hook '{}' could not run; check its configuration", hook.name()),
                ),
            };
            if !result.ok {
                warn!(stage, hook = hook.name(), message = ?result.message, "pre-step hook failed");
                return HookOutcome::failed(hook.name(), result);
            }
            debug!(stage, hook = hook.name(), "pre-step hook passed");
        }
        HookOutcome::passed()
    }
}
