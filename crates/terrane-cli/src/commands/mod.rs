pub mod forget;
pub mod list;
pub mod outputs;
pub mod remote;
pub mod show;
pub mod verify;

use std::path::Path;
use terrane_schema::AbsResourceInstance;
use terrane_states::{read_state_file, State, StateFile};
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_ADDRESS_ERROR: u8 = 2;
pub const EXIT_STATE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Read and validate the state file at `path`.
pub fn load_state(path: &Path) -> Result<(StateFile, State), String> {
    let file = read_state_file(path)
        .map_err(|e| format!("state error: {e}"))?
        .ok_or_else(|| format!("no state file at {}", path.display()))?;
    let state = file.to_state().map_err(|e| format!("state error: {e}"))?;
    debug!(
        "loaded {} serial {} lineage {}",
        path.display(),
        file.serial,
        file.lineage
    );
    Ok((file, state))
}

pub fn parse_address(input: &str) -> Result<AbsResourceInstance, String> {
    input
        .parse()
        .map_err(|e| format!("invalid address '{input}': {e}"))
}
