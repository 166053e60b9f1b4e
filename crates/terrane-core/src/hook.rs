//! Observers of resource instance lifecycle transitions.
//!
//! Hooks can observe every transition and may ask the run to halt, but can
//! never change an outcome. Observers are called in registration order; the
//! first `Halt` or error stops the remaining observers for that call.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use terrane_schema::{AbsResourceInstance, ResourceType, Value};
use terrane_states::{Generation, State, StateError, StatePersister};
use thiserror::Error;
use tracing::{debug, info, warn};

/// What the run should do after a hook returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookAction {
    #[default]
    Continue,
    /// Stop at the next step boundary. This is an operator request, not a failure.
    Halt,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),
    #[error("failed to persist state snapshot: {0}")]
    Persist(#[from] StateError),
}

pub type HookResult = Result<HookAction, HookError>;

/// The outcome of the operation a `post_*` call reports on.
pub type OpError<'a> = Option<&'a (dyn StdError + 'static)>;

/// An object produced by an import, before it is written to state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedObject {
    pub type_name: ResourceType,
    pub value: Value,
    pub private: Vec<u8>,
}

/// Observer of lifecycle transitions. Every method defaults to `Continue`.
#[allow(unused_variables)]
pub trait Hook: Send + Sync {
    fn pre_apply(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
        prior: &Value,
        planned: &Value,
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_apply(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
        new_state: &Value,
        err: OpError<'_>,
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn pre_diff(&self, addr: &AbsResourceInstance, prior: &Value, proposed: &Value) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_diff(&self, addr: &AbsResourceInstance, prior: &Value, planned: &Value) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn pre_provision_instance(&self, addr: &AbsResourceInstance, state: &Value) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_provision_instance(&self, addr: &AbsResourceInstance, state: &Value) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn pre_provision_instance_step(
        &self,
        addr: &AbsResourceInstance,
        provisioner: &str,
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_provision_instance_step(
        &self,
        addr: &AbsResourceInstance,
        provisioner: &str,
        err: OpError<'_>,
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    /// Raw output from a provisioner. Cannot halt.
    fn provision_output(&self, addr: &AbsResourceInstance, provisioner: &str, line: &str) {}

    fn pre_refresh(&self, addr: &AbsResourceInstance, prior: &Value) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_refresh(
        &self,
        addr: &AbsResourceInstance,
        prior: &Value,
        new_state: &Value,
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn pre_import_state(&self, addr: &AbsResourceInstance, import_id: &str) -> HookResult {
        Ok(HookAction::Continue)
    }

    fn post_import_state(
        &self,
        addr: &AbsResourceInstance,
        imported: &[ImportedObject],
    ) -> HookResult {
        Ok(HookAction::Continue)
    }

    /// Receives an independent deep copy of the whole state.
    fn post_state_update(&self, state: &State) -> HookResult {
        Ok(HookAction::Continue)
    }
}

/// Hook that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilHook;

impl Hook for NilHook {}

/// Ordered, run-scoped list of hooks.
#[derive(Default, Clone)]
pub struct HookDispatcher {
    hooks: Vec<Arc<dyn Hook>>,
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self { hooks }
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Call `f` against each hook in order, stopping at the first halt or error.
    pub fn dispatch(&self, f: &mut dyn FnMut(&dyn Hook) -> HookResult) -> HookResult {
        for hook in &self.hooks {
            if f(hook.as_ref())? == HookAction::Halt {
                return Ok(HookAction::Halt);
            }
        }
        Ok(HookAction::Continue)
    }

    pub fn provision_output(&self, addr: &AbsResourceInstance, provisioner: &str, line: &str) {
        for hook in &self.hooks {
            hook.provision_output(addr, provisioner, line);
        }
    }
}

/// Halts the run at the next hook call once a stop has been requested.
#[derive(Debug, Clone, Default)]
pub struct StopHook {
    stop: Arc<AtomicBool>,
    watch_shutdown: bool,
}

impl StopHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stop hook that also halts after Ctrl-C.
    pub fn watching_shutdown() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            watch_shutdown: true,
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
            || (self.watch_shutdown && crate::concurrency::shutdown_requested())
    }

    /// The flag backing this hook, for sharing with an evaluation context.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn action(&self) -> HookResult {
        if self.is_stopped() {
            Ok(HookAction::Halt)
        } else {
            Ok(HookAction::Continue)
        }
    }
}

impl Hook for StopHook {
    fn pre_apply(
        &self,
        _: &AbsResourceInstance,
        _: &Generation,
        _: &Value,
        _: &Value,
    ) -> HookResult {
        self.action()
    }

    fn post_apply(
        &self,
        _: &AbsResourceInstance,
        _: &Generation,
        _: &Value,
        _: OpError<'_>,
    ) -> HookResult {
        self.action()
    }

    fn pre_diff(&self, _: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        self.action()
    }

    fn post_diff(&self, _: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        self.action()
    }

    fn pre_provision_instance(&self, _: &AbsResourceInstance, _: &Value) -> HookResult {
        self.action()
    }

    fn post_provision_instance(&self, _: &AbsResourceInstance, _: &Value) -> HookResult {
        self.action()
    }

    fn pre_provision_instance_step(&self, _: &AbsResourceInstance, _: &str) -> HookResult {
        self.action()
    }

    fn post_provision_instance_step(
        &self,
        _: &AbsResourceInstance,
        _: &str,
        _: OpError<'_>,
    ) -> HookResult {
        self.action()
    }

    fn pre_refresh(&self, _: &AbsResourceInstance, _: &Value) -> HookResult {
        self.action()
    }

    fn post_refresh(&self, _: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        self.action()
    }

    fn pre_import_state(&self, _: &AbsResourceInstance, _: &str) -> HookResult {
        self.action()
    }

    fn post_import_state(&self, _: &AbsResourceInstance, _: &[ImportedObject]) -> HookResult {
        self.action()
    }

    fn post_state_update(&self, _: &State) -> HookResult {
        self.action()
    }
}

/// Reports every transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl Hook for TracingHook {
    fn pre_apply(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
        prior: &Value,
        planned: &Value,
    ) -> HookResult {
        let verb = match (prior.is_null(), planned.is_null()) {
            (true, _) => "creating",
            (false, true) => "destroying",
            (false, false) => "modifying",
        };
        info!("{addr} ({generation}): {verb}...");
        Ok(HookAction::Continue)
    }

    fn post_apply(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
        _new_state: &Value,
        err: OpError<'_>,
    ) -> HookResult {
        match err {
            Some(e) => warn!("{addr} ({generation}): apply failed: {e}"),
            None => info!("{addr} ({generation}): apply complete"),
        }
        Ok(HookAction::Continue)
    }

    fn pre_diff(&self, addr: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        debug!("{addr}: planning");
        Ok(HookAction::Continue)
    }

    fn post_diff(&self, addr: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        debug!("{addr}: planned");
        Ok(HookAction::Continue)
    }

    fn pre_provision_instance(&self, addr: &AbsResourceInstance, _: &Value) -> HookResult {
        info!("{addr}: provisioning");
        Ok(HookAction::Continue)
    }

    fn post_provision_instance(&self, addr: &AbsResourceInstance, _: &Value) -> HookResult {
        info!("{addr}: provisioning complete");
        Ok(HookAction::Continue)
    }

    fn pre_provision_instance_step(
        &self,
        addr: &AbsResourceInstance,
        provisioner: &str,
    ) -> HookResult {
        info!("{addr}: running provisioner {provisioner}");
        Ok(HookAction::Continue)
    }

    fn post_provision_instance_step(
        &self,
        addr: &AbsResourceInstance,
        provisioner: &str,
        err: OpError<'_>,
    ) -> HookResult {
        if let Some(e) = err {
            warn!("{addr}: provisioner {provisioner} failed: {e}");
        }
        Ok(HookAction::Continue)
    }

    fn provision_output(&self, addr: &AbsResourceInstance, provisioner: &str, line: &str) {
        info!("{addr} ({provisioner}): {line}");
    }

    fn pre_refresh(&self, addr: &AbsResourceInstance, _: &Value) -> HookResult {
        info!("{addr}: refreshing state...");
        Ok(HookAction::Continue)
    }

    fn post_refresh(&self, addr: &AbsResourceInstance, _: &Value, _: &Value) -> HookResult {
        debug!("{addr}: refreshed");
        Ok(HookAction::Continue)
    }

    fn pre_import_state(&self, addr: &AbsResourceInstance, import_id: &str) -> HookResult {
        info!("{addr}: importing from ID \"{import_id}\"...");
        Ok(HookAction::Continue)
    }

    fn post_import_state(
        &self,
        addr: &AbsResourceInstance,
        imported: &[ImportedObject],
    ) -> HookResult {
        for obj in imported {
            info!("{addr}: import prepared {}", obj.type_name);
        }
        Ok(HookAction::Continue)
    }

    fn post_state_update(&self, state: &State) -> HookResult {
        let (current, deposed) = state.object_count();
        debug!("state updated: {current} current, {deposed} deposed objects");
        Ok(HookAction::Continue)
    }
}

/// Persists every state snapshot so partial applies survive a crash.
pub struct StateHook {
    persister: Arc<dyn StatePersister>,
}

impl StateHook {
    pub fn new(persister: Arc<dyn StatePersister>) -> Self {
        Self { persister }
    }
}

impl Hook for StateHook {
    fn post_state_update(&self, state: &State) -> HookResult {
        let serial = self.persister.write_state(state)?;
        debug!("persisted state snapshot at serial {serial}");
        Ok(HookAction::Continue)
    }
}
