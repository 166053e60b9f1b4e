use super::{json_pretty, load_state, parse_address, EXIT_SUCCESS};
use std::path::Path;
use std::sync::Arc;
use terrane_core::{
    BuiltinEvalContext, EvalStep, HookDispatcher, LocalStatePersister, StateHook, StepIo,
    TracingHook, UndeposeState, UpdateStateHook,
};
use terrane_states::{read_state_file, DeposedKey, Generation, SyncState};
use tracing::info;

pub fn run(state_path: &Path, address: &str, deposed: &str, json: bool) -> Result<u8, String> {
    let addr = parse_address(address)?;
    let key = DeposedKey::new(deposed);
    if key.is_not_deposed() {
        return Err("a deposed key is required".to_owned());
    }

    let (_, state) = load_state(state_path)?;
    if state
        .resource_instance_object(&addr, &Generation::Deposed(key.clone()))
        .is_none()
    {
        return Err(format!("no resource instance {addr} with deposed object {key}"));
    }

    let persister = Arc::new(LocalStatePersister::new(state_path));
    let hooks = HookDispatcher::with_hooks(vec![
        Arc::new(TracingHook),
        Arc::new(StateHook::new(persister)),
    ]);
    let ctx = BuiltinEvalContext::new(Arc::new(SyncState::new(state)), Arc::new(hooks))
        .with_path(addr.module.clone());

    let steps = EvalStep::Sequence(vec![
        EvalStep::UndeposeState(UndeposeState {
            addr: addr.resource.clone(),
            key: Some(key.clone()),
        }),
        EvalStep::UpdateStateHook(UpdateStateHook),
    ]);
    steps
        .eval(&ctx, &mut StepIo::new())
        .map_err(|e| e.to_string())?;

    let serial = read_state_file(state_path)
        .map_err(|e| format!("state error: {e}"))?
        .map_or(0, |f| f.serial);
    info!("forgot deposed object {key} of {addr}");

    if json {
        let payload = serde_json::json!({
            "address": addr.to_string(),
            "deposed": key,
            "serial": serial,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("forgot deposed object {key} of {addr} (state serial {serial})");
    }
    Ok(EXIT_SUCCESS)
}
