use super::{json_pretty, load_state, EXIT_SUCCESS};
use serde::Serialize;
use std::path::Path;
use terrane_states::DeposedKey;

#[derive(Debug, Serialize)]
struct InstanceRow {
    address: String,
    provider: String,
    current: bool,
    deposed: Vec<DeposedKey>,
}

pub fn run(state_path: &Path, json: bool) -> Result<u8, String> {
    let (_, state) = load_state(state_path)?;
    let rows: Vec<InstanceRow> = state
        .resource_instances()
        .map(|(addr, provider, is)| InstanceRow {
            address: addr.to_string(),
            provider: provider.to_string(),
            current: is.current.is_some(),
            deposed: is.deposed.keys().cloned().collect(),
        })
        .collect();

    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no resource instances found");
    } else {
        for row in &rows {
            if row.current {
                println!("{}", row.address);
            }
            for key in &row.deposed {
                println!("{} (deposed {key})", row.address);
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
