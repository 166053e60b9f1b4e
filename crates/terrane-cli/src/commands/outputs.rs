use super::{json_pretty, load_state, EXIT_SUCCESS};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    module: String,
    name: &'a str,
    sensitive: bool,
    /// `None` for sensitive outputs.
    value: Option<&'a serde_json::Value>,
}

pub fn run(state_path: &Path, json: bool) -> Result<u8, String> {
    let (_, state) = load_state(state_path)?;
    let rows: Vec<OutputRow<'_>> = state
        .modules()
        .iter()
        .flat_map(|(path, module)| {
            module.outputs.iter().map(move |(name, out)| OutputRow {
                module: path.to_string(),
                name,
                sensitive: out.sensitive,
                value: (!out.sensitive).then_some(&out.value),
            })
        })
        .collect();

    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no outputs found");
    } else {
        for row in &rows {
            let name = if row.module.is_empty() {
                row.name.to_owned()
            } else {
                format!("{}.{}", row.module, row.name)
            };
            match row.value {
                Some(value) => println!("{name} = {value}"),
                None => println!("{name} = (sensitive value)"),
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
