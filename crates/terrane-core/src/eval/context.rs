use crate::hook::{Hook, HookDispatcher, HookResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use terrane_schema::{AbsProviderConfig, ModuleInstance, ProviderSchema, ProviderType};
use terrane_states::SyncState;

/// Services available to every evaluation step.
pub trait EvalContext: Send + Sync {
    /// Module instance the step is evaluated in; relative addresses resolve against it.
    fn path(&self) -> &ModuleInstance;

    fn state(&self) -> &SyncState;

    /// Held from snapshot through dispatch so `post_state_update` sees
    /// snapshots in the order they were taken. Never the State Store lock.
    fn state_updates(&self) -> &Mutex<()>;

    /// Call `f` against every registered hook, in order.
    fn hook(&self, f: &mut dyn FnMut(&dyn Hook) -> HookResult) -> HookResult;

    fn provider_schema(&self, provider: &AbsProviderConfig) -> Option<Arc<ProviderSchema>>;

    /// True once the run has been asked to stop.
    fn stopped(&self) -> bool;
}

/// Run-scoped context shared by all steps of one run.
///
/// Cloning is cheap; every service is reference counted. Use
/// [`BuiltinEvalContext::with_path`] to derive the context for a child module.
#[derive(Debug, Clone)]
pub struct BuiltinEvalContext {
    path: ModuleInstance,
    state: Arc<SyncState>,
    hooks: Arc<HookDispatcher>,
    state_updates: Arc<Mutex<()>>,
    schemas: Arc<HashMap<ProviderType, Arc<ProviderSchema>>>,
    stop: Arc<AtomicBool>,
}

impl BuiltinEvalContext {
    pub fn new(state: Arc<SyncState>, hooks: Arc<HookDispatcher>) -> Self {
        Self {
            path: ModuleInstance::root(),
            state,
            hooks,
            state_updates: Arc::default(),
            schemas: Arc::new(HashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_provider_schemas(
        mut self,
        schemas: impl IntoIterator<Item = ProviderSchema>,
    ) -> Self {
        let mut map = (*self.schemas).clone();
        for schema in schemas {
            map.insert(schema.provider.clone(), Arc::new(schema));
        }
        self.schemas = Arc::new(map);
        self
    }

    /// Share a stop flag, e.g. the one behind a [`crate::StopHook`].
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// The same run, evaluated in another module instance.
    #[must_use]
    pub fn with_path(&self, path: ModuleInstance) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    pub fn state_handle(&self) -> Arc<SyncState> {
        Arc::clone(&self.state)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl EvalContext for BuiltinEvalContext {
    fn path(&self) -> &ModuleInstance {
        &self.path
    }

    fn state(&self) -> &SyncState {
        &self.state
    }

    fn state_updates(&self) -> &Mutex<()> {
        &self.state_updates
    }

    fn hook(&self, f: &mut dyn FnMut(&dyn Hook) -> HookResult) -> HookResult {
        self.hooks.dispatch(f)
    }

    fn provider_schema(&self, provider: &AbsProviderConfig) -> Option<Arc<ProviderSchema>> {
        self.schemas.get(&provider.provider_type).cloned()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || crate::concurrency::shutdown_requested()
    }
}
