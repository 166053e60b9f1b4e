//! On-disk JSON representation of a [`State`].
//!
//! The file carries a format version, a lineage identifying the state's
//! history, a serial counting content changes, and a blake3 checksum over the
//! document without the checksum field.

use crate::generation::DeposedKey;
use crate::object::{ObjectStatus, ResourceInstanceObjectSrc};
use crate::state::{OutputValue, ResourceInstanceState, ResourceState, State};
use crate::{fsync_dir, StateError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use terrane_schema::{
    AbsProviderConfig, AbsResourceInstance, InstanceKey, ModuleInstance, Resource, ResourceMode,
    ResourceType,
};

pub const STATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub serial: u64,
    pub lineage: String,
    /// Output values keyed by module path; the root module is the empty string.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, BTreeMap<String, OutputValue>>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    pub mode: ResourceMode,
    #[serde(rename = "type")]
    pub type_name: ResourceType,
    pub name: String,
    pub provider: AbsProviderConfig,
    pub instances: Vec<InstanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_key: Option<IndexKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposed: Option<DeposedKey>,
    #[serde(default)]
    pub schema_version: u64,
    #[serde(default)]
    pub status: ObjectStatus,
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Provider-private bytes, base64 encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<AbsResourceInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Int(i64),
    Str(String),
}

impl IndexKey {
    fn from_key(key: &InstanceKey) -> Option<Self> {
        match key {
            InstanceKey::NoKey => None,
            InstanceKey::Int(i) => Some(IndexKey::Int(*i)),
            InstanceKey::Str(s) => Some(IndexKey::Str(s.clone())),
        }
    }

    fn to_key(key: Option<&Self>) -> InstanceKey {
        match key {
            None => InstanceKey::NoKey,
            Some(IndexKey::Int(i)) => InstanceKey::Int(*i),
            Some(IndexKey::Str(s)) => InstanceKey::Str(s.clone()),
        }
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl InstanceEntry {
    fn from_src(
        deposed: Option<&DeposedKey>,
        key: &InstanceKey,
        src: &ResourceInstanceObjectSrc,
    ) -> Self {
        Self {
            index_key: IndexKey::from_key(key),
            deposed: deposed.cloned(),
            schema_version: src.schema_version,
            status: src.status,
            attributes: src.attrs_json.clone(),
            private: if src.private.is_empty() {
                None
            } else {
                Some(BASE64.encode(&src.private))
            },
            dependencies: src.dependencies.clone(),
        }
    }

    fn to_src(&self, context: &str) -> Result<ResourceInstanceObjectSrc, StateError> {
        let private = match &self.private {
            Some(encoded) => BASE64.decode(encoded).map_err(|e| {
                StateError::Malformed(format!("{context}: invalid private data: {e}"))
            })?,
            None => Vec::new(),
        };
        Ok(ResourceInstanceObjectSrc {
            attrs_json: self.attributes.clone(),
            schema_version: self.schema_version,
            status: self.status,
            private,
            dependencies: self.dependencies.clone(),
        })
    }
}

impl StateFile {
    /// Build the file form of `state` with the given lineage and serial.
    pub fn from_state(state: &State, lineage: &str, serial: u64) -> Self {
        let mut outputs = BTreeMap::new();
        let mut resources = Vec::new();

        for (path, module) in state.modules() {
            if !module.outputs.is_empty() {
                outputs.insert(path.to_string(), module.outputs.clone());
            }
            for (resource, rs) in &module.resources {
                let mut instances = Vec::new();
                for (key, is) in &rs.instances {
                    if let Some(current) = &is.current {
                        instances.push(InstanceEntry::from_src(None, key, current));
                    }
                    for (dk, src) in &is.deposed {
                        instances.push(InstanceEntry::from_src(Some(dk), key, src));
                    }
                }
                resources.push(ResourceEntry {
                    module: path.to_string(),
                    mode: resource.mode,
                    type_name: resource.type_name.clone(),
                    name: resource.name.clone(),
                    provider: rs.provider.clone(),
                    instances,
                });
            }
        }

        Self {
            version: STATE_FORMAT_VERSION,
            serial,
            lineage: lineage.to_owned(),
            outputs,
            resources,
            checksum: None,
        }
    }

    /// Rebuild the in-memory state, rejecting structurally invalid documents.
    pub fn to_state(&self) -> Result<State, StateError> {
        let mut state = State::new();

        for (path, values) in &self.outputs {
            let module = parse_module(path)?;
            for (name, value) in values {
                state.set_output_value(&module, name, value.clone());
            }
        }

        for entry in &self.resources {
            let module = parse_module(&entry.module)?;
            let resource = Resource {
                mode: entry.mode,
                type_name: entry.type_name.clone(),
                name: entry.name.clone(),
            };
            if state.resource(&module, &resource).is_some() {
                return Err(StateError::Malformed(format!(
                    "duplicate resource entry for {}",
                    resource.instance(InstanceKey::NoKey).absolute(&module)
                )));
            }

            let mut instances: BTreeMap<InstanceKey, ResourceInstanceState> = BTreeMap::new();
            for inst in &entry.instances {
                let key = IndexKey::to_key(inst.index_key.as_ref());
                let addr = resource.instance(key.clone()).absolute(&module);
                let src = inst.to_src(&addr.to_string())?;
                let slot = instances.entry(key).or_default();
                match &inst.deposed {
                    None => {
                        if slot.current.replace(src).is_some() {
                            return Err(StateError::Malformed(format!(
                                "{addr} has more than one current object"
                            )));
                        }
                    }
                    Some(dk) if dk.is_not_deposed() => {
                        return Err(StateError::Malformed(format!(
                            "{addr} has a deposed object with an empty key"
                        )));
                    }
                    Some(dk) => {
                        if slot.deposed.insert(dk.clone(), src).is_some() {
                            return Err(StateError::Malformed(format!(
                                "{addr} has duplicate deposed key {dk}"
                            )));
                        }
                    }
                }
            }
            if instances.is_empty() {
                continue;
            }
            state.insert_resource(
                &module,
                resource,
                ResourceState {
                    provider: entry.provider.clone(),
                    instances,
                },
            );
        }

        Ok(state)
    }

    /// True when both files describe the same resources and outputs,
    /// regardless of lineage, serial, or checksum.
    pub fn same_content(&self, other: &StateFile) -> bool {
        self.resources == other.resources && self.outputs == other.outputs
    }

    /// Compute the checksum over the file content (excluding the checksum field itself).
    fn compute_checksum(&self) -> Result<String, StateError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Serialize with an embedded checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        let mut with_checksum = self.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        Ok(serde_json::to_vec_pretty(&with_checksum)?)
    }

    /// Parse and verify a serialized state file.
    ///
    /// The format version is checked before the body is parsed. A missing
    /// checksum is accepted; a present one must match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.version != STATE_FORMAT_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_FORMAT_VERSION,
                found: probe.version,
            });
        }
        let file: StateFile = serde_json::from_slice(bytes)?;
        if let Some(ref expected) = file.checksum {
            let actual = file.compute_checksum()?;
            if actual != *expected {
                return Err(StateError::IntegrityFailure {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(file)
    }
}

fn parse_module(path: &str) -> Result<ModuleInstance, StateError> {
    path.parse()
        .map_err(|e| StateError::Malformed(format!("invalid module path: {e}")))
}

/// Atomically replace `path` with a serialized state file.
pub fn write_state_file(path: &Path, file: &StateFile) -> Result<(), StateError> {
    let content = file.to_bytes()?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StateError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

/// Read a state file, or `None` if it does not exist.
pub fn read_state_file(path: &Path) -> Result<Option<StateFile>, StateError> {
    match fs::read(path) {
        Ok(bytes) => StateFile::from_bytes(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
