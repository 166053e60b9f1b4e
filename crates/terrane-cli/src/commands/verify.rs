use super::{json_pretty, EXIT_STATE_ERROR, EXIT_SUCCESS};
use std::path::Path;
use terrane_states::{State, StateError, StateFile};

struct Report {
    serial: u64,
    lineage: String,
    checksummed: bool,
    current: usize,
    deposed: usize,
}

fn check(bytes: &[u8]) -> Result<Report, StateError> {
    let file = StateFile::from_bytes(bytes)?;
    let state: State = file.to_state()?;
    let (current, deposed) = state.object_count();
    Ok(Report {
        serial: file.serial,
        checksummed: file.checksum.is_some(),
        lineage: file.lineage,
        current,
        deposed,
    })
}

pub fn run(state_path: &Path, json: bool) -> Result<u8, String> {
    let bytes = match std::fs::read(state_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(format!("no state file at {}", state_path.display()));
        }
        Err(e) => return Err(format!("state error: {e}")),
    };

    match check(&bytes) {
        Ok(report) => {
            if json {
                let payload = serde_json::json!({
                    "ok": true,
                    "serial": report.serial,
                    "lineage": report.lineage,
                    "checksum": report.checksummed,
                    "current": report.current,
                    "deposed": report.deposed,
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                println!(
                    "state file OK: serial {}, lineage {}",
                    report.serial, report.lineage
                );
                println!(
                    "  {} current, {} deposed objects",
                    report.current, report.deposed
                );
                if !report.checksummed {
                    println!("  no checksum recorded");
                }
                if report.deposed > 0 {
                    println!("  deposed objects remain from an interrupted replace");
                }
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if json {
                let payload = serde_json::json!({ "ok": false, "error": e.to_string() });
                println!("{}", json_pretty(&payload)?);
            } else {
                println!("state file FAILED: {e}");
            }
            Ok(EXIT_STATE_ERROR)
        }
    }
}
