//! Resource instance state for terrane.
//!
//! This crate provides the state layer: the `State` model of modules,
//! resources, and instance objects with current and deposed generations, the
//! schema-guided object codec (`ResourceInstanceObject` ⇄
//! `ResourceInstanceObjectSrc`), the run-scoped `SyncState` store, and the
//! versioned, checksummed `StateFile` format with lineage/serial tracking.

pub mod generation;
pub mod object;
pub mod persist;
pub mod state;
pub mod statefile;
pub mod sync;

pub use generation::{DeposedKey, Generation, NOT_DEPOSED};
pub use object::{
    decode, encode, CodecError, ObjectStatus, ResourceInstanceObject, ResourceInstanceObjectSrc,
};
pub use persist::{MemoryPersister, SerialTracker, StatePersister};
pub use state::{
    InstanceEntry, ModuleState, OutputValue, ResourceInstanceState, ResourceState, State,
};
pub use statefile::{read_state_file, write_state_file, StateFile, STATE_FORMAT_VERSION};
pub use sync::{StateGuard, SyncState};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state file integrity check failed: expected checksum {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },
    #[error("state format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("malformed state file: {0}")]
    Malformed(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("state backend error: {0}")]
    Backend(String),
}
