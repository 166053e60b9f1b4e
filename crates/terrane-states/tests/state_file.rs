//! State file persistence tests: legacy documents, concurrent mutation, reload.

use serde_json::json;
use std::fs;
use std::sync::Arc;
use terrane_schema::{AbsProviderConfig, AbsResourceInstance, ModuleInstance, Type, Value};
use terrane_states::{
    read_state_file, write_state_file, Generation, ObjectStatus, OutputValue,
    ResourceInstanceObject, SerialTracker, StateError, StateFile, SyncState,
};

fn instance_type() -> Type {
    Type::object([("id", Type::String), ("size", Type::Number)])
}

fn object(id: &str) -> ResourceInstanceObject {
    ResourceInstanceObject::new(Value::object([
        ("id", Value::string(id)),
        ("size", Value::number(1)),
    ]))
}

/// A document written without a checksum, as produced by hand or by older tools.
#[test]
fn reads_document_without_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrane.tfstate");
    let doc = json!({
        "version": 1,
        "serial": 3,
        "lineage": "0f8fad5b-d9cb-469f-a165-70867728950e",
        "resources": [{
            "mode": "managed",
            "type": "null_resource",
            "name": "web",
            "provider": "provider.null",
            "instances": [
                { "index_key": 0, "attributes": { "id": "a", "size": 2 } },
                { "index_key": 0, "deposed": "00c0ffee", "status": "tainted",
                  "attributes": { "id": "old" } }
            ]
        }]
    });
    fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let file = read_state_file(&path).unwrap().unwrap();
    let state = file.to_state().unwrap();
    let addr: AbsResourceInstance = "null_resource.web[0]".parse().unwrap();

    let deposed = state
        .resource_instance_object(
            &addr,
            &Generation::Deposed(terrane_states::DeposedKey::new("00c0ffee")),
        )
        .unwrap();
    assert_eq!(deposed.status, ObjectStatus::Tainted);

    let decoded = deposed.decode(&instance_type()).unwrap();
    assert_eq!(decoded.value.attr("size"), Some(&Value::Null));
}

#[test]
fn concurrent_writers_then_persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("terrane.tfstate");
    let sync = Arc::new(SyncState::default());
    let provider = AbsProviderConfig::root("null");
    let ty = instance_type();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let sync = Arc::clone(&sync);
            let provider = provider.clone();
            let ty = ty.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    let addr: AbsResourceInstance =
                        format!("module.w{worker}.null_resource.r[{i}]").parse().unwrap();
                    let src = object(&format!("{worker}-{i}")).encode(&ty, 0).unwrap();
                    sync.set_resource_instance_current(&addr, Some(src), &provider);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    sync.set_output_value(
        &ModuleInstance::root(),
        "count",
        OutputValue::new(json!(40)),
    );

    let state = Arc::try_unwrap(sync).unwrap().close();
    assert_eq!(state.object_count(), (40, 0));

    let mut tracker = SerialTracker::new();
    let file = tracker.prepare(&state).unwrap();
    write_state_file(&path, &file).unwrap();
    tracker.commit(file);
    assert_eq!(tracker.serial(), 1);

    let reloaded = read_state_file(&path).unwrap().unwrap();
    assert_eq!(reloaded.lineage, tracker.lineage());
    assert_eq!(reloaded.serial, 1);
    assert_eq!(reloaded.to_state().unwrap(), state);

    let addr: AbsResourceInstance = "module.w2.null_resource.r[7]".parse().unwrap();
    let obj = reloaded
        .to_state()
        .unwrap()
        .resource_instance_object(&addr, &Generation::Current)
        .cloned()
        .unwrap()
        .decode(&ty)
        .unwrap();
    assert_eq!(obj.value.attr("id").and_then(Value::as_str), Some("2-7"));
}

#[test]
fn truncated_file_is_a_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terrane.tfstate");
    let bytes = StateFile::from_state(&terrane_states::State::new(), "l", 1)
        .to_bytes()
        .unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(
        read_state_file(&path),
        Err(StateError::Serialization(_))
    ));
}
