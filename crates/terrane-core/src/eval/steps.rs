use super::{EvalContext, EvalError, Flow, StepIo};
use crate::hook::HookAction;
use crate::lifecycle::{validate_transition, SlotState};
use std::sync::PoisonError;
use terrane_schema::{AbsProviderConfig, AbsResourceInstance, ResourceInstance, Schema};
use terrane_states::{
    DeposedKey, Generation, ResourceInstanceObject, ResourceInstanceObjectSrc,
};
use tracing::debug;

/// Look up the schema that governs `addr`'s objects.
fn resolve_schema(
    ctx: &dyn EvalContext,
    addr: &AbsResourceInstance,
    provider: &AbsProviderConfig,
) -> Result<Schema, EvalError> {
    let missing = || EvalError::MissingSchema {
        addr: addr.clone(),
        provider: provider.clone(),
    };
    let provider_schema = ctx.provider_schema(provider).ok_or_else(missing)?;
    provider_schema
        .schema_for(addr.mode(), addr.type_name())
        .cloned()
        .ok_or_else(missing)
}

fn decode_src(
    ctx: &dyn EvalContext,
    addr: &AbsResourceInstance,
    provider: &AbsProviderConfig,
    src: &ResourceInstanceObjectSrc,
) -> Result<ResourceInstanceObject, EvalError> {
    let schema = resolve_schema(ctx, addr, provider)?;
    if src.schema_version != schema.version {
        return Err(EvalError::SchemaVersion {
            addr: addr.clone(),
            found: src.schema_version,
            expected: schema.version,
        });
    }
    src.decode(&schema.implied_type())
        .map_err(|source| EvalError::Decode {
            addr: addr.clone(),
            source,
        })
}

fn encode_obj(
    ctx: &dyn EvalContext,
    addr: &AbsResourceInstance,
    provider: &AbsProviderConfig,
    obj: &ResourceInstanceObject,
) -> Result<ResourceInstanceObjectSrc, EvalError> {
    let schema = resolve_schema(ctx, addr, provider)?;
    obj.encode(&schema.implied_type(), schema.version)
        .map_err(|source| EvalError::Encode {
            addr: addr.clone(),
            source,
        })
}

/// Reads the current object of an instance. Absence is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    pub addr: ResourceInstance,
    pub provider: AbsProviderConfig,
}

impl ReadState {
    pub fn run(&self, ctx: &dyn EvalContext) -> Result<Option<ResourceInstanceObject>, EvalError> {
        let abs = self.addr.absolute(ctx.path());
        let Some(src) = ctx
            .state()
            .resource_instance_object(&abs, &Generation::Current)
        else {
            debug!("{abs} has no current object");
            return Ok(None);
        };
        decode_src(ctx, &abs, &self.provider, &src).map(Some)
    }
}

/// Reads one deposed object of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStateDeposed {
    pub addr: ResourceInstance,
    pub provider: AbsProviderConfig,
    /// Fixed key, or `None` to use the key carried in [`StepIo`].
    pub key: Option<DeposedKey>,
}

impl ReadStateDeposed {
    pub fn run(
        &self,
        ctx: &dyn EvalContext,
        key: &DeposedKey,
    ) -> Result<Option<ResourceInstanceObject>, EvalError> {
        let abs = self.addr.absolute(ctx.path());
        if key.is_not_deposed() {
            return Err(EvalError::Internal(format!(
                "deposed read of {abs} used with no deposed key"
            )));
        }
        let Some(src) = ctx
            .state()
            .resource_instance_object(&abs, &Generation::Deposed(key.clone()))
        else {
            return Ok(None);
        };
        decode_src(ctx, &abs, &self.provider, &src).map(Some)
    }
}

/// Exits early unless a prior read produced a non-null object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequireState;

impl RequireState {
    pub fn run(self, object: Option<&ResourceInstanceObject>) -> Flow {
        match object {
            Some(obj) if !obj.value.is_null() => Flow::Continue,
            _ => Flow::EarlyExit,
        }
    }
}

/// Stores an object as the current object of an instance.
///
/// Writing `None` removes the current object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteState {
    pub addr: ResourceInstance,
    pub provider: AbsProviderConfig,
}

impl WriteState {
    pub fn run(
        &self,
        ctx: &dyn EvalContext,
        obj: Option<&ResourceInstanceObject>,
    ) -> Result<(), EvalError> {
        let abs = self.addr.absolute(ctx.path());
        let src = obj
            .map(|o| encode_obj(ctx, &abs, &self.provider, o))
            .transpose()?;
        ctx.state()
            .set_resource_instance_current(&abs, src, &self.provider);
        Ok(())
    }
}

/// Stores an object in one deposed slot of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStateDeposed {
    pub addr: ResourceInstance,
    pub provider: AbsProviderConfig,
    /// Fixed key, or `None` to use the key carried in [`StepIo`].
    pub key: Option<DeposedKey>,
}

impl WriteStateDeposed {
    pub fn run(
        &self,
        ctx: &dyn EvalContext,
        key: &DeposedKey,
        obj: Option<&ResourceInstanceObject>,
    ) -> Result<(), EvalError> {
        let abs = self.addr.absolute(ctx.path());
        if key.is_not_deposed() {
            return Err(EvalError::Internal(format!(
                "can't save deposed object for {abs} without a deposed key"
            )));
        }
        let src = obj
            .map(|o| encode_obj(ctx, &abs, &self.provider, o))
            .transpose()?;
        ctx.state()
            .set_resource_instance_deposed(&abs, key, src, &self.provider);
        Ok(())
    }
}

/// Moves the current object of an instance into a new deposed slot.
///
/// Used at the start of a create-before-destroy replace so the replacement can
/// be written while the old object is still tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeposeState {
    pub addr: ResourceInstance,
}

impl DeposeState {
    /// Returns the new key, or the not-deposed sentinel if nothing was current.
    pub fn run(&self, ctx: &dyn EvalContext) -> Result<DeposedKey, EvalError> {
        let abs = self.addr.absolute(ctx.path());
        let key = ctx.state().depose_resource_instance_object(&abs);
        debug!("deposed {abs}: {key}");
        Ok(key)
    }
}

/// Forgets one deposed object.
///
/// Callers must only run this after the real object it tracked is gone; no
/// such check happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeposeState {
    pub addr: ResourceInstance,
    /// Fixed key, or `None` to use the key carried in [`StepIo`].
    pub key: Option<DeposedKey>,
}

impl UndeposeState {
    pub fn run(&self, ctx: &dyn EvalContext, key: &DeposedKey) -> Result<(), EvalError> {
        let abs = self.addr.absolute(ctx.path());
        if key.is_not_deposed() {
            debug!("nothing was deposed for {abs}; nothing to forget");
            return Ok(());
        }
        let mut state = ctx.state().lock();
        let from = SlotState::of_deposed(state.resource_instance(&abs), key);
        validate_transition(&from, &SlotState::Absent)
            .map_err(|e| EvalError::Internal(format!("{abs}: {e}")))?;
        let provider = state
            .resource(&abs.module, &abs.resource.resource)
            .map(|rs| rs.provider.clone());
        if let Some(provider) = provider {
            state.set_resource_instance_deposed(&abs, key, None, &provider);
        }
        Ok(())
    }
}

/// Snapshots the whole state and hands it to every hook's `post_state_update`.
///
/// Concurrent runs are serialized on [`EvalContext::state_updates`], so hooks
/// never receive an older snapshot after a newer one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStateHook;

impl UpdateStateHook {
    pub fn run(self, ctx: &dyn EvalContext) -> Result<Flow, EvalError> {
        let _order = ctx
            .state_updates()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The guard is a temporary, so the state lock is released before dispatch.
        let snapshot = ctx.state().lock().clone();
        match ctx.hook(&mut |h| h.post_state_update(&snapshot))? {
            HookAction::Continue => Ok(Flow::Continue),
            HookAction::Halt => Ok(Flow::EarlyExit),
        }
    }
}

/// The closed set of evaluation steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalStep {
    ReadState(ReadState),
    ReadStateDeposed(ReadStateDeposed),
    RequireState(RequireState),
    WriteState(WriteState),
    WriteStateDeposed(WriteStateDeposed),
    DeposeState(DeposeState),
    UndeposeState(UndeposeState),
    UpdateStateHook(UpdateStateHook),
    /// Runs steps in order, stopping at the first early exit.
    Sequence(Vec<EvalStep>),
}

impl EvalStep {
    pub fn name(&self) -> &'static str {
        match self {
            EvalStep::ReadState(_) => "ReadState",
            EvalStep::ReadStateDeposed(_) => "ReadStateDeposed",
            EvalStep::RequireState(_) => "RequireState",
            EvalStep::WriteState(_) => "WriteState",
            EvalStep::WriteStateDeposed(_) => "WriteStateDeposed",
            EvalStep::DeposeState(_) => "DeposeState",
            EvalStep::UndeposeState(_) => "UndeposeState",
            EvalStep::UpdateStateHook(_) => "UpdateStateHook",
            EvalStep::Sequence(_) => "Sequence",
        }
    }

    /// Run the step. Reads fill `io.object`, deposes fill `io.deposed_key`.
    ///
    /// A stopped run fails with [`EvalError::Cancelled`] before the step
    /// touches anything; writes already committed stay in place.
    pub fn eval(&self, ctx: &dyn EvalContext, io: &mut StepIo) -> Result<Flow, EvalError> {
        if ctx.stopped() {
            return Err(EvalError::Cancelled(self.name()));
        }
        match self {
            EvalStep::ReadState(step) => {
                io.object = step.run(ctx)?;
                Ok(Flow::Continue)
            }
            EvalStep::ReadStateDeposed(step) => {
                let key = step.key.as_ref().unwrap_or(&io.deposed_key);
                io.object = step.run(ctx, key)?;
                Ok(Flow::Continue)
            }
            EvalStep::RequireState(step) => Ok(step.run(io.object.as_ref())),
            EvalStep::WriteState(step) => {
                step.run(ctx, io.object.as_ref())?;
                Ok(Flow::Continue)
            }
            EvalStep::WriteStateDeposed(step) => {
                let key = step.key.as_ref().unwrap_or(&io.deposed_key);
                step.run(ctx, key, io.object.as_ref())?;
                Ok(Flow::Continue)
            }
            EvalStep::DeposeState(step) => {
                io.deposed_key = step.run(ctx)?;
                Ok(Flow::Continue)
            }
            EvalStep::UndeposeState(step) => {
                let key = step.key.as_ref().unwrap_or(&io.deposed_key);
                step.run(ctx, key)?;
                Ok(Flow::Continue)
            }
            EvalStep::UpdateStateHook(step) => step.run(ctx),
            EvalStep::Sequence(steps) => {
                for step in steps {
                    if step.eval(ctx, io)? == Flow::EarlyExit {
                        return Ok(Flow::EarlyExit);
                    }
                }
                Ok(Flow::Continue)
            }
        }
    }
}

/// The two halves of a create-before-destroy replacement.
///
/// Run `create` with the replacement object in [`StepIo::object`]; it deposes
/// the old object, writes the new one as current, and snapshots state. Destroy
/// the old real-world object (its key is in [`StepIo::deposed_key`]), then run
/// `finish` with the same `StepIo` to forget it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceSteps {
    pub create: EvalStep,
    pub finish: EvalStep,
}

pub fn create_before_destroy(
    addr: &ResourceInstance,
    provider: &AbsProviderConfig,
) -> ReplaceSteps {
    ReplaceSteps {
        create: EvalStep::Sequence(vec![
            EvalStep::DeposeState(DeposeState { addr: addr.clone() }),
            EvalStep::WriteState(WriteState {
                addr: addr.clone(),
                provider: provider.clone(),
            }),
            EvalStep::UpdateStateHook(UpdateStateHook),
        ]),
        finish: EvalStep::Sequence(vec![
            EvalStep::UndeposeState(UndeposeState {
                addr: addr.clone(),
                key: None,
            }),
            EvalStep::UpdateStateHook(UpdateStateHook),
        ]),
    }
}
