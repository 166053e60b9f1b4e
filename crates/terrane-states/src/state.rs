//! The in-memory state model: modules, resources, instances, and outputs.
//!
//! `State` is a plain value with no synchronization; [`crate::SyncState`]
//! wraps it for concurrent use during a run. Every mutation prunes the
//! containers it empties so that the model never carries husks: an instance
//! with no objects, a resource with no instances, or a non-root module with
//! neither resources nor outputs.

use crate::generation::{DeposedKey, Generation, NOT_DEPOSED};
use crate::object::ResourceInstanceObjectSrc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use terrane_schema::{
    AbsProviderConfig, AbsResourceInstance, InstanceKey, ModuleInstance, Resource,
};

/// A module output value as recorded in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
}

impl OutputValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            sensitive: false,
        }
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// The objects recorded for one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInstanceState {
    pub current: Option<ResourceInstanceObjectSrc>,
    pub deposed: BTreeMap<DeposedKey, ResourceInstanceObjectSrc>,
}

impl ResourceInstanceState {
    pub fn has_objects(&self) -> bool {
        self.current.is_some() || !self.deposed.is_empty()
    }

    pub fn object(&self, generation: &Generation) -> Option<&ResourceInstanceObjectSrc> {
        match generation {
            Generation::Current => self.current.as_ref(),
            Generation::Deposed(key) => self.deposed.get(key),
        }
    }

    /// A fresh key not used by any deposed object of this instance.
    fn fresh_deposed_key(&self) -> DeposedKey {
        loop {
            let key = DeposedKey::generate();
            if !self.deposed.contains_key(&key) {
                return key;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    /// Provider configuration that most recently wrote an object of this resource.
    pub provider: AbsProviderConfig,
    pub instances: BTreeMap<InstanceKey, ResourceInstanceState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleState {
    pub resources: BTreeMap<Resource, ResourceState>,
    pub outputs: BTreeMap<String, OutputValue>,
}

impl ModuleState {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

/// The whole recorded state of one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    modules: BTreeMap<ModuleInstance, ModuleState>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// One row of [`State::resource_instances`].
pub type InstanceEntry<'a> = (
    AbsResourceInstance,
    &'a AbsProviderConfig,
    &'a ResourceInstanceState,
);

impl State {
    /// An empty state containing only the root module.
    pub fn new() -> Self {
        let mut modules = BTreeMap::new();
        modules.insert(ModuleInstance::root(), ModuleState::default());
        Self { modules }
    }

    pub fn modules(&self) -> &BTreeMap<ModuleInstance, ModuleState> {
        &self.modules
    }

    pub fn module(&self, path: &ModuleInstance) -> Option<&ModuleState> {
        self.modules.get(path)
    }

    pub fn root_module(&self) -> &ModuleState {
        self.modules
            .get(&ModuleInstance::root())
            .unwrap_or_else(|| unreachable!("root module is never pruned"))
    }

    /// True when no module records any resource instance object.
    pub fn has_resources(&self) -> bool {
        self.modules.values().any(|m| !m.resources.is_empty())
    }

    pub fn resource(&self, module: &ModuleInstance, resource: &Resource) -> Option<&ResourceState> {
        self.modules.get(module)?.resources.get(resource)
    }

    pub fn resource_instance(&self, addr: &AbsResourceInstance) -> Option<&ResourceInstanceState> {
        self.resource(&addr.module, &addr.resource.resource)?
            .instances
            .get(&addr.resource.key)
    }

    pub fn resource_instance_object(
        &self,
        addr: &AbsResourceInstance,
        generation: &Generation,
    ) -> Option<&ResourceInstanceObjectSrc> {
        self.resource_instance(addr)?.object(generation)
    }

    /// Every resource instance in address order, with its provider.
    pub fn resource_instances(
        &self,
    ) -> impl Iterator<Item = InstanceEntry<'_>> + '_ {
        self.modules.iter().flat_map(|(path, module)| {
            module.resources.iter().flat_map(move |(resource, rs)| {
                rs.instances.iter().map(move |(key, is)| {
                    (
                        resource.instance(key.clone()).absolute(path),
                        &rs.provider,
                        is,
                    )
                })
            })
        })
    }

    /// Count of current and deposed objects across the whole state.
    pub fn object_count(&self) -> (usize, usize) {
        self.resource_instances()
            .fold((0, 0), |(current, deposed), (_, _, is)| {
                (
                    current + usize::from(is.current.is_some()),
                    deposed + is.deposed.len(),
                )
            })
    }

    /// Replace the current object of `addr`, or remove it when `obj` is `None`.
    pub fn set_resource_instance_current(
        &mut self,
        addr: &AbsResourceInstance,
        obj: Option<ResourceInstanceObjectSrc>,
        provider: &AbsProviderConfig,
    ) {
        match obj {
            Some(obj) => self.ensure_instance(addr, provider).current = Some(obj),
            None => {
                if let Some(is) = self.instance_mut(addr) {
                    is.current = None;
                    self.prune(addr);
                }
            }
        }
    }

    /// Write or remove exactly the deposed slot named by `key`.
    ///
    /// The [`NOT_DEPOSED`] sentinel never names a slot; writes against it are
    /// ignored.
    pub fn set_resource_instance_deposed(
        &mut self,
        addr: &AbsResourceInstance,
        key: &DeposedKey,
        obj: Option<ResourceInstanceObjectSrc>,
        provider: &AbsProviderConfig,
    ) {
        if key.is_not_deposed() {
            tracing::warn!("ignoring deposed write for {addr} with empty deposed key");
            return;
        }
        match obj {
            Some(obj) => {
                self.ensure_instance(addr, provider)
                    .deposed
                    .insert(key.clone(), obj);
            }
            None => {
                if let Some(is) = self.instance_mut(addr) {
                    is.deposed.remove(key);
                    self.prune(addr);
                }
            }
        }
    }

    /// Move the current object of `addr` into a newly keyed deposed slot.
    ///
    /// Returns [`NOT_DEPOSED`] and changes nothing if there is no current object.
    pub fn depose_resource_instance_object(&mut self, addr: &AbsResourceInstance) -> DeposedKey {
        let Some(is) = self.instance_mut(addr) else {
            return NOT_DEPOSED;
        };
        let Some(current) = is.current.take() else {
            return NOT_DEPOSED;
        };
        let key = is.fresh_deposed_key();
        is.deposed.insert(key.clone(), current);
        key
    }

    pub fn set_output_value(&mut self, module: &ModuleInstance, name: &str, value: OutputValue) {
        self.modules
            .entry(module.clone())
            .or_default()
            .outputs
            .insert(name.to_owned(), value);
    }

    pub fn remove_output_value(&mut self, module: &ModuleInstance, name: &str) {
        if let Some(m) = self.modules.get_mut(module) {
            m.outputs.remove(name);
            self.prune_module(module);
        }
    }

    pub fn output_value(&self, module: &ModuleInstance, name: &str) -> Option<&OutputValue> {
        self.modules.get(module)?.outputs.get(name)
    }

    pub(crate) fn insert_resource(
        &mut self,
        module: &ModuleInstance,
        resource: Resource,
        state: ResourceState,
    ) {
        self.modules
            .entry(module.clone())
            .or_default()
            .resources
            .insert(resource, state);
    }

    fn ensure_instance(
        &mut self,
        addr: &AbsResourceInstance,
        provider: &AbsProviderConfig,
    ) -> &mut ResourceInstanceState {
        let rs = self
            .modules
            .entry(addr.module.clone())
            .or_default()
            .resources
            .entry(addr.resource.resource.clone())
            .or_insert_with(|| ResourceState {
                provider: provider.clone(),
                instances: BTreeMap::new(),
            });
        if rs.provider != *provider {
            rs.provider = provider.clone();
        }
        rs.instances.entry(addr.resource.key.clone()).or_default()
    }

    fn instance_mut(&mut self, addr: &AbsResourceInstance) -> Option<&mut ResourceInstanceState> {
        self.modules
            .get_mut(&addr.module)?
            .resources
            .get_mut(&addr.resource.resource)?
            .instances
            .get_mut(&addr.resource.key)
    }

    fn prune(&mut self, addr: &AbsResourceInstance) {
        if let Some(module) = self.modules.get_mut(&addr.module) {
            if let Some(rs) = module.resources.get_mut(&addr.resource.resource) {
                if rs
                    .instances
                    .get(&addr.resource.key)
                    .is_some_and(|is| !is.has_objects())
                {
                    rs.instances.remove(&addr.resource.key);
                }
                if rs.instances.is_empty() {
                    module.resources.remove(&addr.resource.resource);
                }
            }
        }
        self.prune_module(&addr.module);
    }

    fn prune_module(&mut self, path: &ModuleInstance) {
        if path.is_root() {
            return;
        }
        if self.modules.get(path).is_some_and(ModuleState::is_empty) {
            self.modules.remove(path);
        }
    }
}
