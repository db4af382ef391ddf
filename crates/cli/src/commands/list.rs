use serde_json::{json, Value};

use crate::app::App;
use crate::commands::print_json;
use crate::OutputFormat;

/// Print every registered check and action with its parameters.
pub(crate) fn cmd_list(app: &App, output: OutputFormat) -> Result<(), String> {
    match output {
        OutputFormat::Json => {
            let entries: Vec<Value> = app
                .registry
                .registrations()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "kind": r.kind().to_string(),
                        "defaults": r.defaults,
                        "action": r.bound_action,
                    })
                })
                .collect();
            print_json(&Value::Array(entries));
        }
        OutputFormat::Text => {
            for r in app.registry.registrations() {
                let mut line = format!("{:<24} {}", r.name, r.kind());
                if let Some(action) = &r.bound_action {
                    line.push_str(&format!(" -> {action}"));
                }
                if !r.defaults.is_empty() {
                    let params: Vec<String> = r
                        .defaults
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect();
                    line.push_str(&format!("  [{}]", params.join(", ")));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}
