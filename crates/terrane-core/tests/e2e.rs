//! End-to-end runs of evaluation steps against shared state, hooks and the
//! local state file.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use terrane_core::{
    create_before_destroy, BuiltinEvalContext, DeposeState, EvalContext, EvalError, EvalStep,
    Flow, Hook, HookAction, HookDispatcher, HookResult, LocalStatePersister, ReadState,
    ReadStateDeposed, RequireState, StateHook, StepIo, StopHook, UndeposeState, UpdateStateHook,
    WriteState,
};
use terrane_schema::{
    AbsProviderConfig, AbsResourceInstance, Attribute, Block, InstanceKey, ModuleInstance,
    ProviderSchema, Resource, ResourceInstance, Schema, Type, Value,
};
use terrane_states::{
    read_state_file, Generation, ResourceInstanceObject, State, StatePersister, SyncState,
};

fn provider_schema() -> ProviderSchema {
    ProviderSchema::new("test").with_resource_type(
        "test_thing",
        Schema::new(
            0,
            Block::new()
                .with_attribute("id", Attribute::computed(Type::String))
                .with_attribute("count", Attribute::optional(Type::Number)),
        ),
    )
}

fn context(hooks: HookDispatcher) -> BuiltinEvalContext {
    BuiltinEvalContext::new(Arc::new(SyncState::default()), Arc::new(hooks))
        .with_provider_schemas([provider_schema()])
}

fn provider() -> AbsProviderConfig {
    AbsProviderConfig::root("test")
}

fn thing(name: &str, key: i64) -> ResourceInstance {
    Resource::managed("test_thing", name).instance(InstanceKey::Int(key))
}

fn object(id: &str) -> ResourceInstanceObject {
    ResourceInstanceObject::new(Value::object([("id", Value::string(id))]))
}

fn write(addr: &ResourceInstance) -> EvalStep {
    EvalStep::WriteState(WriteState {
        addr: addr.clone(),
        provider: provider(),
    })
}

#[test]
fn replace_in_child_module_leaves_one_current_object() {
    let root = context(HookDispatcher::new());
    let ctx = root.with_path("module.a".parse().unwrap());
    let addr = Resource::managed("test_thing", "b").instance(InstanceKey::Int(0));

    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("old")))
        .unwrap();

    let mut io = StepIo::new();
    EvalStep::DeposeState(DeposeState { addr: addr.clone() })
        .eval(&ctx, &mut io)
        .unwrap();
    let key = io.deposed_key.clone();
    assert!(!key.is_not_deposed());

    let mut io = StepIo::with_object(object("new"));
    write(&addr).eval(&ctx, &mut io).unwrap();

    let deposed = ReadStateDeposed {
        addr: addr.clone(),
        provider: provider(),
        key: Some(key.clone()),
    }
    .run(&ctx, &key)
    .unwrap()
    .unwrap();
    assert_eq!(deposed.value.attr("id").and_then(Value::as_str), Some("old"));

    EvalStep::UndeposeState(UndeposeState {
        addr: addr.clone(),
        key: Some(key),
    })
    .eval(&ctx, &mut io)
    .unwrap();

    let state = root.state().deep_copy();
    assert_eq!(state.object_count(), (1, 0));
    let abs: AbsResourceInstance = "module.a.test_thing.b[0]".parse().unwrap();
    let current = state
        .resource_instance_object(&abs, &Generation::Current)
        .unwrap();
    assert_eq!(current.attrs_json["id"], "new");
    assert!(state
        .resource_instance(&thing("b", 0).absolute(&ModuleInstance::root()))
        .is_none());
}

#[test]
fn concurrent_deposes_produce_distinct_keys() {
    const WORKERS: i64 = 16;
    let ctx = context(HookDispatcher::new());
    for i in 0..WORKERS {
        write(&thing("x", i))
            .eval(&ctx, &mut StepIo::with_object(object(&i.to_string())))
            .unwrap();
    }

    let keys: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let ctx = &ctx;
                scope.spawn(move || {
                    let mut io = StepIo::new();
                    EvalStep::DeposeState(DeposeState { addr: thing("x", i) })
                        .eval(ctx, &mut io)
                        .unwrap();
                    io.deposed_key.as_str().to_owned()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: BTreeSet<&String> = keys.iter().collect();
    assert_eq!(distinct.len(), keys.len());
    assert_eq!(ctx.state().deep_copy().object_count(), (0, 16));
}

#[test]
fn repeated_deposes_of_one_instance_never_collide() {
    let ctx = context(HookDispatcher::new());
    let addr = thing("x", 0);
    let abs = addr.absolute(&ModuleInstance::root());
    for n in 0..50 {
        write(&addr)
            .eval(&ctx, &mut StepIo::with_object(object(&n.to_string())))
            .unwrap();
        DeposeState { addr: addr.clone() }.run(&ctx).unwrap();
    }
    let instance = ctx.state().resource_instance(&abs).unwrap();
    assert!(instance.current.is_none());
    assert_eq!(instance.deposed.len(), 50);
}

#[derive(Default)]
struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    snapshots: Mutex<Vec<State>>,
    halt: bool,
}

impl Hook for Recording {
    fn post_state_update(&self, state: &State) -> HookResult {
        self.log.lock().unwrap().push(self.name.to_owned());
        self.snapshots.lock().unwrap().push(state.clone());
        if self.halt {
            Ok(HookAction::Halt)
        } else {
            Ok(HookAction::Continue)
        }
    }
}

#[test]
fn hooks_run_in_order_and_halt_short_circuits() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::new(Recording {
        name: "first",
        log: log.clone(),
        ..Recording::default()
    });
    let halting = Arc::new(Recording {
        name: "halting",
        log: log.clone(),
        halt: true,
        ..Recording::default()
    });
    let never = Arc::new(Recording {
        name: "never",
        log: log.clone(),
        ..Recording::default()
    });
    let ctx = context(HookDispatcher::with_hooks(vec![first, halting, never]));

    let addr = thing("x", 0);
    let steps = EvalStep::Sequence(vec![
        write(&addr),
        EvalStep::UpdateStateHook(UpdateStateHook),
        EvalStep::ReadState(ReadState {
            addr: addr.clone(),
            provider: provider(),
        }),
    ]);
    let mut io = StepIo::with_object(object("a"));
    assert_eq!(steps.eval(&ctx, &mut io).unwrap(), Flow::EarlyExit);
    assert_eq!(*log.lock().unwrap(), vec!["first", "halting"]);
}

#[test]
fn snapshot_is_unaffected_by_later_writes() {
    let recorder = Arc::new(Recording::default());
    let ctx = context(HookDispatcher::with_hooks(vec![recorder.clone()]));
    let addr = thing("x", 0);
    let abs = addr.absolute(&ModuleInstance::root());

    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("v1")))
        .unwrap();
    UpdateStateHook.run(&ctx).unwrap();
    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("v2")))
        .unwrap();

    let snapshots = recorder.snapshots.lock().unwrap();
    let seen = snapshots[0]
        .resource_instance_object(&abs, &Generation::Current)
        .unwrap();
    assert_eq!(seen.attrs_json["id"], "v1");
}

#[test]
fn require_state_guards_later_steps() {
    let ctx = context(HookDispatcher::new());
    let addr = thing("x", 0);
    let seq = EvalStep::Sequence(vec![
        EvalStep::ReadState(ReadState {
            addr: addr.clone(),
            provider: provider(),
        }),
        EvalStep::RequireState(RequireState),
        EvalStep::DeposeState(DeposeState { addr: addr.clone() }),
    ]);
    let mut io = StepIo::new();
    assert_eq!(seq.eval(&ctx, &mut io).unwrap(), Flow::EarlyExit);
    assert!(io.deposed_key.is_not_deposed());

    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("a")))
        .unwrap();
    let mut io = StepIo::new();
    assert_eq!(seq.eval(&ctx, &mut io).unwrap(), Flow::Continue);
    assert!(!io.deposed_key.is_not_deposed());
}

#[test]
fn stop_hook_flag_cancels_remaining_steps() {
    let stop = StopHook::new();
    let ctx = context(HookDispatcher::new()).with_stop_flag(stop.flag());
    let addr = thing("x", 0);
    let steps = create_before_destroy(&addr, &provider());

    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("old")))
        .unwrap();
    let mut io = StepIo::with_object(object("new"));
    steps.create.eval(&ctx, &mut io).unwrap();

    stop.stop();
    let err = steps.finish.eval(&ctx, &mut io).unwrap_err();
    assert!(matches!(err, EvalError::Cancelled("Sequence")));

    // Work committed before the stop is kept.
    assert_eq!(ctx.state().deep_copy().object_count(), (1, 1));
}

struct CountingHook(AtomicUsize);

impl Hook for CountingHook {
    fn post_state_update(&self, _state: &State) -> HookResult {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(HookAction::Continue)
    }
}

#[test]
fn state_hook_persists_every_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrane.tfstate");
    let persister = Arc::new(LocalStatePersister::new(&path));
    let counter = Arc::new(CountingHook(AtomicUsize::new(0)));
    let ctx = context(HookDispatcher::with_hooks(vec![
        Arc::new(StateHook::new(persister.clone())),
        counter.clone(),
    ]));

    let addr = thing("x", 0);
    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("old")))
        .unwrap();
    UpdateStateHook.run(&ctx).unwrap();

    let steps = create_before_destroy(&addr, &provider());
    let mut io = StepIo::with_object(object("new"));
    steps.create.eval(&ctx, &mut io).unwrap();

    let mid = read_state_file(&path).unwrap().unwrap();
    assert_eq!(mid.serial, 2);
    assert_eq!(mid.to_state().unwrap().object_count(), (1, 1));

    steps.finish.eval(&ctx, &mut io).unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 3);

    let reopened = LocalStatePersister::new(&path);
    let persisted = reopened.read_state().unwrap().unwrap();
    assert_eq!(persisted, ctx.state().deep_copy());
    assert_eq!(persisted.object_count(), (1, 0));
    assert_eq!(read_state_file(&path).unwrap().unwrap().serial, 3);
}

#[test]
fn failing_persister_surfaces_as_hook_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the state file should be makes every write fail.
    let path = dir.path().join("blocked");
    std::fs::create_dir(&path).unwrap();
    let persister = Arc::new(LocalStatePersister::new(&path));
    let ctx = context(HookDispatcher::with_hooks(vec![Arc::new(StateHook::new(
        persister,
    ))]));

    let err = UpdateStateHook.run(&ctx).unwrap_err();
    assert!(matches!(err, EvalError::Hook(_)));
}

#[test]
fn snapshot_lost_to_a_failed_write_is_persisted_on_retry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrane.tfstate");
    let ctx = context(HookDispatcher::with_hooks(vec![Arc::new(StateHook::new(
        Arc::new(LocalStatePersister::new(&path)),
    ))]));
    let addr = thing("x", 0);

    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("v1")))
        .unwrap();
    UpdateStateHook.run(&ctx).unwrap();

    // Swap the state file for a directory so the next write fails mid-way.
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    write(&addr)
        .eval(&ctx, &mut StepIo::with_object(object("v2")))
        .unwrap();
    assert!(matches!(
        UpdateStateHook.run(&ctx).unwrap_err(),
        EvalError::Hook(_)
    ));

    std::fs::remove_dir(&path).unwrap();
    UpdateStateHook.run(&ctx).unwrap();
    let file = read_state_file(&path).unwrap().unwrap();
    assert_eq!(file.serial, 2);
    assert_eq!(file.to_state().unwrap(), ctx.state().deep_copy());
}

/// Holds up delivery of the first snapshot that has exactly one object.
struct SlowFirstDelivery {
    entered: Mutex<Option<mpsc::Sender<()>>>,
}

impl Hook for SlowFirstDelivery {
    fn post_state_update(&self, state: &State) -> HookResult {
        if state.object_count() == (1, 0) {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(200));
            }
        }
        Ok(HookAction::Continue)
    }
}

#[test]
fn concurrent_snapshots_reach_persister_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrane.tfstate");
    let (tx, rx) = mpsc::channel();
    let ctx = context(HookDispatcher::with_hooks(vec![
        Arc::new(SlowFirstDelivery {
            entered: Mutex::new(Some(tx)),
        }),
        Arc::new(StateHook::new(Arc::new(LocalStatePersister::new(&path)))),
    ]));

    std::thread::scope(|scope| {
        let ctx = &ctx;
        let worker = scope.spawn(move || {
            write(&thing("a", 0))
                .eval(ctx, &mut StepIo::with_object(object("a")))
                .unwrap();
            UpdateStateHook.run(ctx).unwrap();
        });

        // The worker's snapshot is taken and its delivery is in progress.
        rx.recv().unwrap();
        write(&thing("b", 0))
            .eval(ctx, &mut StepIo::with_object(object("b")))
            .unwrap();
        UpdateStateHook.run(ctx).unwrap();
        worker.join().unwrap();
    });

    let live = ctx.state().deep_copy();
    assert_eq!(live.object_count(), (2, 0));
    let persisted = read_state_file(&path).unwrap().unwrap();
    assert_eq!(persisted.serial, 2);
    assert_eq!(persisted.to_state().unwrap(), live);
}
