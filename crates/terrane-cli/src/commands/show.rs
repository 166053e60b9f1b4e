use super::{json_pretty, load_state, parse_address, EXIT_SUCCESS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use terrane_schema::AbsResourceInstance;
use terrane_states::{DeposedKey, ObjectStatus, ResourceInstanceObjectSrc};

#[derive(Debug, Serialize)]
struct ObjectView<'a> {
    schema_version: u64,
    status: ObjectStatus,
    attributes: &'a serde_json::Value,
    private_bytes: usize,
    dependencies: &'a [AbsResourceInstance],
}

impl<'a> From<&'a ResourceInstanceObjectSrc> for ObjectView<'a> {
    fn from(src: &'a ResourceInstanceObjectSrc) -> Self {
        Self {
            schema_version: src.schema_version,
            status: src.status,
            attributes: &src.attrs_json,
            private_bytes: src.private.len(),
            dependencies: &src.dependencies,
        }
    }
}

#[derive(Debug, Serialize)]
struct InstanceView<'a> {
    address: String,
    provider: String,
    current: Option<ObjectView<'a>>,
    deposed: BTreeMap<&'a DeposedKey, ObjectView<'a>>,
}

fn print_object(label: &str, obj: &ObjectView<'_>) -> Result<(), String> {
    let status = match obj.status {
        ObjectStatus::Ready => "",
        ObjectStatus::Tainted => " (tainted)",
    };
    println!("{label}{status}:");
    println!("  schema_version: {}", obj.schema_version);
    if obj.private_bytes > 0 {
        println!("  private:        {} bytes", obj.private_bytes);
    }
    for dep in obj.dependencies {
        println!("  depends on:     {dep}");
    }
    let attrs = serde_json::to_string_pretty(obj.attributes)
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    for line in attrs.lines() {
        println!("  {line}");
    }
    Ok(())
}

pub fn run(state_path: &Path, address: &str, json: bool) -> Result<u8, String> {
    let addr = parse_address(address)?;
    let (_, state) = load_state(state_path)?;
    let is = state
        .resource_instance(&addr)
        .ok_or_else(|| format!("no resource instance {addr} in state"))?;
    let provider = state
        .resource(&addr.module, &addr.resource.resource)
        .map(|rs| rs.provider.to_string())
        .unwrap_or_default();

    let view = InstanceView {
        address: addr.to_string(),
        provider,
        current: is.current.as_ref().map(ObjectView::from),
        deposed: is
            .deposed
            .iter()
            .map(|(k, src)| (k, ObjectView::from(src)))
            .collect(),
    };

    if json {
        println!("{}", json_pretty(&view)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("# {} ({})", view.address, view.provider);
    match &view.current {
        Some(obj) => print_object("current", obj)?,
        None => println!("current: (none)"),
    }
    for (key, obj) in &view.deposed {
        print_object(&format!("deposed {key}"), obj)?;
    }
    Ok(EXIT_SUCCESS)
}
