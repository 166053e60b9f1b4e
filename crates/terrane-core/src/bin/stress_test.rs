//! Long-running stress test for concurrent state mutation.
//!
//! Runs many create-before-destroy cycles from parallel workers against one
//! shared state, persisting every snapshot to a local state file, and checks
//! after every cycle that no deposed objects leak and that the persisted file
//! matches the in-memory state.
//!
//! Usage:
//!   cargo run --bin stress_test -- [--cycles N] [--workers N]

use std::sync::Arc;
use std::time::{Duration, Instant};
use terrane_core::{
    create_before_destroy, BuiltinEvalContext, EvalStep, HookDispatcher, LocalStatePersister,
    StateHook, StepIo, WriteState,
};
use terrane_schema::{
    AbsProviderConfig, Attribute, Block, InstanceKey, ProviderSchema, Resource, Schema, Type,
    Value,
};
use terrane_states::{ResourceInstanceObject, StatePersister, SyncState};

fn parse_flag(args: &[String], flag: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn provider_schema() -> ProviderSchema {
    ProviderSchema::new("null").with_resource_type(
        "null_resource",
        Schema::new(
            0,
            Block::new()
                .with_attribute("id", Attribute::computed(Type::String))
                .with_attribute("generation", Attribute::computed(Type::Number)),
        ),
    )
}

fn object(id: &str, generation: usize) -> ResourceInstanceObject {
    ResourceInstanceObject::new(Value::object([
        ("id", Value::string(id)),
        ("generation", Value::number(generation as u64)),
    ]))
}

fn run_worker(ctx: &BuiltinEvalContext, worker: usize, cycle: usize) -> Result<(), String> {
    let provider = AbsProviderConfig::root("null");
    let addr = Resource::managed("null_resource", "w").instance(InstanceKey::Int(worker as i64));

    if cycle == 1 {
        EvalStep::WriteState(WriteState {
            addr: addr.clone(),
            provider: provider.clone(),
        })
        .eval(ctx, &mut StepIo::with_object(object(&format!("{worker}-0"), 0)))
        .map_err(|e| format!("worker {worker}: initial write failed: {e}"))?;
    }

    let steps = create_before_destroy(&addr, &provider);
    let mut io = StepIo::with_object(object(&format!("{worker}-{cycle}"), cycle));
    steps
        .create
        .eval(ctx, &mut io)
        .map_err(|e| format!("worker {worker} cycle {cycle}: create failed: {e}"))?;
    if io.deposed_key.is_not_deposed() {
        return Err(format!("worker {worker} cycle {cycle}: nothing was deposed"));
    }
    steps
        .finish
        .eval(ctx, &mut io)
        .map_err(|e| format!("worker {worker} cycle {cycle}: finish failed: {e}"))?;
    Ok(())
}

fn check_health(
    ctx: &BuiltinEvalContext,
    persister: &LocalStatePersister,
    workers: usize,
    cycle: usize,
) -> u64 {
    let mut failures = 0u64;
    // Every worker ends with a state hook, so the last persisted snapshot
    // must match memory exactly.
    let state = ctx.state_handle().deep_copy();
    let (current, deposed) = state.object_count();
    if current != workers {
        eprintln!("  cycle {cycle}: expected {workers} current objects, found {current}");
        failures += 1;
    }
    if deposed > 0 {
        eprintln!("  cycle {cycle}: DEPOSED LEAK: {deposed} objects");
        failures += 1;
    }
    match persister.read_state() {
        Ok(Some(persisted)) if persisted == state => {}
        Ok(Some(_)) => {
            eprintln!("  cycle {cycle}: persisted state differs from memory");
            failures += 1;
        }
        Ok(None) => {
            eprintln!("  cycle {cycle}: state file missing");
            failures += 1;
        }
        Err(e) => {
            eprintln!("  cycle {cycle}: STATE FILE ERROR: {e}");
            failures += 1;
        }
    }
    failures
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cycles = parse_flag(&args, "--cycles", 200);
    let workers = parse_flag(&args, "--workers", 8);

    println!("terrane stress test: {cycles} cycles x {workers} workers");
    println!("============================================");

    let dir = tempfile::tempdir().expect("create temp dir");
    let persister = Arc::new(LocalStatePersister::new(dir.path().join("terrane.tfstate")));
    let hooks = HookDispatcher::with_hooks(vec![Arc::new(StateHook::new(persister.clone()))]);
    let ctx = BuiltinEvalContext::new(Arc::new(SyncState::default()), Arc::new(hooks))
        .with_provider_schemas([provider_schema()]);

    let mut failures = 0u64;
    let mut elapsed = Duration::ZERO;

    for cycle in 1..=cycles {
        let t0 = Instant::now();
        let results: Vec<Result<(), String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let ctx = &ctx;
                    scope.spawn(move || run_worker(ctx, worker, cycle))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err("worker panicked".to_owned()))
                })
                .collect()
        });
        elapsed += t0.elapsed();

        for result in results {
            if let Err(msg) = result {
                eprintln!("  {msg}");
                failures += 1;
            }
        }
        if cycle % 25 == 0 {
            failures += check_health(&ctx, &persister, workers, cycle);
            println!(
                "  cycle {cycle}/{cycles}: {:.1}s elapsed, {failures} failures",
                elapsed.as_secs_f64()
            );
        }
    }

    failures += check_health(&ctx, &persister, workers, cycles);

    println!();
    println!("============================================");
    println!("Results: {cycles} cycles, {failures} failures");
    println!(
        "  replace cycle: {:.3}ms avg",
        elapsed.as_secs_f64() * 1000.0 / cycles.max(1) as f64
    );

    if failures > 0 {
        eprintln!("\nSTRESS TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSTRESS TEST PASSED");
    }
}
