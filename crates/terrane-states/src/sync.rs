use crate::generation::{DeposedKey, Generation};
use crate::object::ResourceInstanceObjectSrc;
use crate::state::{OutputValue, ResourceInstanceState, State};
use std::sync::{Mutex, MutexGuard, PoisonError};
use terrane_schema::{AbsProviderConfig, AbsResourceInstance, ModuleInstance};
use tracing::debug;

/// Exclusive access to the state, released when dropped.
pub type StateGuard<'a> = MutexGuard<'a, State>;

/// Run-scoped, mutex-guarded wrapper around [`State`].
///
/// Each method is atomic with respect to every other. Reads return clones so
/// no reference into the state escapes the lock. A panic while the lock is
/// held does not wedge the run: later callers recover the guard and see every
/// write that completed before the panic.
#[derive(Debug, Default)]
pub struct SyncState {
    inner: Mutex<State>,
}

impl SyncState {
    pub fn new(state: State) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Scoped exclusive access for multi-step consistent views.
    ///
    /// Hold the guard only as long as needed; never across hook dispatch.
    pub fn lock(&self) -> StateGuard<'_> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn resource_instance_object(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
    ) -> Option<ResourceInstanceObjectSrc> {
        self.lock()
            .resource_instance_object(addr, generation)
            .cloned()
    }

    pub fn resource_instance(&self, addr: &AbsResourceInstance) -> Option<ResourceInstanceState> {
        self.lock().resource_instance(addr).cloned()
    }

    pub fn set_resource_instance_current(
        &self,
        addr: &AbsResourceInstance,
        obj: Option<ResourceInstanceObjectSrc>,
        provider: &AbsProviderConfig,
    ) {
        debug!(
            "{} current object of {addr}",
            if obj.is_some() { "writing" } else { "removing" }
        );
        self.lock().set_resource_instance_current(addr, obj, provider);
    }

    pub fn set_resource_instance_deposed(
        &self,
        addr: &AbsResourceInstance,
        key: &DeposedKey,
        obj: Option<ResourceInstanceObjectSrc>,
        provider: &AbsProviderConfig,
    ) {
        debug!(
            "{} deposed object {key} of {addr}",
            if obj.is_some() { "writing" } else { "removing" }
        );
        self.lock()
            .set_resource_instance_deposed(addr, key, obj, provider);
    }

    /// Move the current object of `addr` to a new deposed slot.
    ///
    /// The key is generated while the lock is held, so it is unique for the
    /// instance even under concurrent deposes.
    pub fn depose_resource_instance_object(&self, addr: &AbsResourceInstance) -> DeposedKey {
        let key = self.lock().depose_resource_instance_object(addr);
        if key.is_not_deposed() {
            debug!("{addr} has no current object to depose");
        } else {
            debug!("deposed current object of {addr} as {key}");
        }
        key
    }

    pub fn set_output_value(&self, module: &ModuleInstance, name: &str, value: OutputValue) {
        self.lock().set_output_value(module, name, value);
    }

    pub fn remove_output_value(&self, module: &ModuleInstance, name: &str) {
        self.lock().remove_output_value(module, name);
    }

    /// An independent copy of the whole state, taken under the lock.
    pub fn deep_copy(&self) -> State {
        self.lock().clone()
    }

    /// End the run and yield the final state.
    pub fn close(self) -> State {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
