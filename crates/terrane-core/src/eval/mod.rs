//! Evaluation steps: the discrete state operations a graph walker runs one at a time.
//!
//! Each step resolves its relative address against the context's module
//! path, talks to the shared [`terrane_states::SyncState`] through the codec,
//! and either continues or exits early. Early exit is not an error; it means
//! there is nothing further to do for the instance on this pass.

pub mod context;
pub mod steps;

pub use context::{BuiltinEvalContext, EvalContext};
pub use steps::{
    create_before_destroy, DeposeState, EvalStep, ReadState, ReadStateDeposed, ReplaceSteps,
    RequireState, UndeposeState, UpdateStateHook, WriteState, WriteStateDeposed,
};

use crate::hook::HookError;
use terrane_schema::{AbsProviderConfig, AbsResourceInstance};
use terrane_states::{CodecError, DeposedKey, ResourceInstanceObject, NOT_DEPOSED};
use thiserror::Error;

/// Whether a walker should keep going with the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    EarlyExit,
}

/// Caller-owned slot that carries data between the steps of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepIo {
    pub object: Option<ResourceInstanceObject>,
    /// Key produced by the last depose; consumed by deposed reads, writes, and undepose.
    pub deposed_key: DeposedKey,
}

impl Default for StepIo {
    fn default() -> Self {
        Self {
            object: None,
            deposed_key: NOT_DEPOSED,
        }
    }
}

impl StepIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(object: ResourceInstanceObject) -> Self {
        Self {
            object: Some(object),
            deposed_key: NOT_DEPOSED,
        }
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("failed to decode {addr} from state: {source}")]
    Decode {
        addr: AbsResourceInstance,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode {addr} in state: {source}")]
    Encode {
        addr: AbsResourceInstance,
        #[source]
        source: CodecError,
    },
    #[error("no schema for {addr} in {provider}")]
    MissingSchema {
        addr: AbsResourceInstance,
        provider: AbsProviderConfig,
    },
    #[error(
        "{addr} is stored with schema version {found} but the provider schema is \
         version {expected}; schema upgrade is not supported"
    )]
    SchemaVersion {
        addr: AbsResourceInstance,
        found: u64,
        expected: u64,
    },
    #[error("{0}; this is a bug in terrane and should be reported")]
    Internal(String),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("run stopped before {0}")]
    Cancelled(&'static str),
}

impl EvalError {
    pub fn is_internal(&self) -> bool {
        matches!(self, EvalError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_is_reported_as_bug() {
        let e = EvalError::Internal("deposed write without a key".to_owned());
        assert!(e.is_internal());
        assert!(e.to_string().ends_with("this is a bug in terrane and should be reported"));
    }

    #[test]
    fn schema_version_error_names_both_versions() {
        let e = EvalError::SchemaVersion {
            addr: "null_resource.a".parse().unwrap(),
            found: 0,
            expected: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("version 0"), "{msg}");
        assert!(msg.contains("version 2"), "{msg}");
    }

    #[test]
    fn step_io_starts_empty() {
        let io = StepIo::new();
        assert!(io.object.is_none());
        assert!(io.deposed_key.is_not_deposed());
    }
}
