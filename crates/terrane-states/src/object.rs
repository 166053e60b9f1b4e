//! Resource instance objects and their encoded form.
//!
//! The codec is stateless: callers resolve the structural type from the
//! provider schema and pass it in. Encoding happens before anything touches
//! the state store, so a value that cannot be encoded never reaches it.

use serde::{Deserialize, Serialize};
use terrane_schema::{json, AbsResourceInstance, SchemaError, Type, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    #[default]
    Ready,
    /// The object exists but is known to be in a bad state and must be replaced.
    Tainted,
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStatus::Ready => write!(f, "ready"),
            ObjectStatus::Tainted => write!(f, "tainted"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode object: {0}")]
    Decode(#[source] SchemaError),
    #[error("failed to decode object: invalid attribute document: {0}")]
    DecodeJson(#[source] serde_json::Error),
    #[error("failed to encode object: {0}")]
    Encode(#[source] SchemaError),
}

impl CodecError {
    pub fn is_decode(&self) -> bool {
        matches!(self, CodecError::Decode(_) | CodecError::DecodeJson(_))
    }
}

/// The decoded value of one resource instance plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceInstanceObject {
    pub value: Value,
    pub status: ObjectStatus,
    /// Opaque provider-private data, carried through verbatim.
    pub private: Vec<u8>,
    pub dependencies: Vec<AbsResourceInstance>,
}

impl ResourceInstanceObject {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ObjectStatus) -> Self {
        self.status = status;
        self
    }

    /// Encode against `ty`, recording `schema_version` verbatim.
    pub fn encode(
        &self,
        ty: &Type,
        schema_version: u64,
    ) -> Result<ResourceInstanceObjectSrc, CodecError> {
        let attrs_json = json::to_json(&self.value, ty).map_err(CodecError::Encode)?;
        let mut dependencies = self.dependencies.clone();
        dependencies.sort();
        dependencies.dedup();
        Ok(ResourceInstanceObjectSrc {
            attrs_json,
            schema_version,
            status: self.status,
            private: self.private.clone(),
            dependencies,
        })
    }
}

/// The schema-agnostic, storable form of a [`ResourceInstanceObject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInstanceObjectSrc {
    pub attrs_json: serde_json::Value,
    pub schema_version: u64,
    pub status: ObjectStatus,
    pub private: Vec<u8>,
    pub dependencies: Vec<AbsResourceInstance>,
}

impl ResourceInstanceObjectSrc {
    /// Build a source record from raw attribute JSON bytes.
    pub fn from_json_bytes(bytes: &[u8], schema_version: u64) -> Result<Self, CodecError> {
        let attrs_json = serde_json::from_slice(bytes).map_err(CodecError::DecodeJson)?;
        Ok(Self {
            attrs_json,
            schema_version,
            status: ObjectStatus::Ready,
            private: Vec::new(),
            dependencies: Vec::new(),
        })
    }

    pub fn decode(&self, ty: &Type) -> Result<ResourceInstanceObject, CodecError> {
        let value = json::from_json(&self.attrs_json, ty).map_err(CodecError::Decode)?;
        Ok(ResourceInstanceObject {
            value,
            status: self.status,
            private: self.private.clone(),
            dependencies: self.dependencies.clone(),
        })
    }
}

/// Decode an optional source record. Absence decodes to `None`, not an error.
pub fn decode(
    src: Option<&ResourceInstanceObjectSrc>,
    ty: &Type,
) -> Result<Option<ResourceInstanceObject>, CodecError> {
    src.map(|s| s.decode(ty)).transpose()
}

/// Encode an object against `ty`.
pub fn encode(
    object: &ResourceInstanceObject,
    ty: &Type,
    schema_version: u64,
) -> Result<ResourceInstanceObjectSrc, CodecError> {
    object.encode(ty, schema_version)
}
