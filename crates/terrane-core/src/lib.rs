//! Core evaluation engine for terrane resource instance state.
//!
//! This crate ties the schema and state layers together into the evaluation
//! steps a graph walker runs against a shared `SyncState`: reading, writing,
//! deposing and forgetting instance objects through the schema-guided codec,
//! with lifecycle transition checks, ordered hook dispatch, cancellation, and
//! locked, atomic local persistence of state snapshots.

pub mod concurrency;
pub mod eval;
pub mod hook;
pub mod lifecycle;
pub mod persist;

pub use concurrency::{install_signal_handler, shutdown_requested, StateLock};
pub use eval::{
    create_before_destroy, BuiltinEvalContext, DeposeState, EvalContext, EvalError, EvalStep,
    Flow, ReadState, ReadStateDeposed, ReplaceSteps, RequireState, StepIo, UndeposeState,
    UpdateStateHook, WriteState, WriteStateDeposed,
};
pub use hook::{
    Hook, HookAction, HookDispatcher, HookError, HookResult, ImportedObject, NilHook, StateHook,
    StopHook, TracingHook,
};
pub use lifecycle::{validate_transition, SlotState};
pub use persist::LocalStatePersister;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] terrane_schema::SchemaError),
    #[error("codec error: {0}")]
    Codec(#[from] terrane_states::CodecError),
    #[error("state error: {0}")]
    State(#[from] terrane_states::StateError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("hook error: {0}")]
    Hook(#[from] HookError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_wraps_eval_error() {
        let e: CoreError = EvalError::Cancelled("DeposeState").into();
        assert_eq!(
            e.to_string(),
            "evaluation error: run stopped before DeposeState"
        );
    }
}
