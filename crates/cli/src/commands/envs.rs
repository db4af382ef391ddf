use serde_json::{json, Value};

use foursight_core::{list_environments, load_manifest};

use crate::app::App;
use crate::commands::print_json;
use crate::OutputFormat;

/// List the environments with a manifest in the envs bucket.
pub(crate) async fn cmd_envs(app: &App, output: OutputFormat) -> Result<(), String> {
    let envs = app.envs_store();
    let names = list_environments(envs.as_ref())
        .await
        .map_err(|e| format!("could not list environments: {e}"))?;

    let mut entries = Vec::with_capacity(names.len());
    for name in &names {
        match load_manifest(envs.as_ref(), name).await {
            Ok(manifest) => entries.push(json!({
                "env": name,
                "fourfront": manifest.fourfront,
                "es": manifest.es,
                "ff_env": manifest.ff_env,
            })),
            Err(e) => {
                tracing::warn!(env = %name, error = %e, "skipping environment");
                entries.push(json!({ "env": name, "error": e.to_string() }));
            }
        }
    }

    match output {
        OutputFormat::Json => print_json(&Value::Array(entries)),
        OutputFormat::Text if entries.is_empty() => println!("no environments found"),
        OutputFormat::Text => {
            for entry in &entries {
                match entry.get("error") {
                    Some(error) => println!(
                        "{:<20} unreadable: {}",
                        entry["env"].as_str().unwrap_or_default(),
                        error
                    ),
                    None => println!(
                        "{:<20} {}",
                        entry["env"].as_str().unwrap_or_default(),
                        entry["fourfront"].as_str().unwrap_or_default()
                    ),
                }
            }
        }
    }
    Ok(())
}
