//! `latest` and `history`: read stored results without running anything.

use serde_json::{json, Value};
use time::OffsetDateTime;

use foursight_core::result::placeholder_record;
use foursight_core::{ActionRecord, CheckRecord, StorageError};

use crate::app::App;
use crate::commands::{action_line, check_line, print_json};
use crate::OutputFormat;

/// Print the most recent result for `name`, or its most recent primary
/// result with `primary`. A check with no history shows the placeholder.
pub(crate) async fn cmd_latest(
    app: &App,
    name: &str,
    primary: bool,
    output: OutputFormat,
) -> Result<(), String> {
    let results = app.results();
    if app.is_action(name) {
        if primary {
            return Err(format!("{name} is an action; actions have no primary results"));
        }
        let latest: Option<ActionRecord> = results
            .latest(name)
            .await
            .map_err(|e| format!("could not read results for {name}: {e}"))?;
        let Some(record) = latest else {
            return Err(format!("no results stored for {name}"));
        };
        match output {
            OutputFormat::Json => print_json(&json!(record)),
            OutputFormat::Text => println!("{}", action_line(&record)),
        }
        return Ok(());
    }

    let has_history = results
        .has_history(name)
        .await
        .map_err(|e| format!("could not read results for {name}: {e}"))?;
    let record: CheckRecord = if !has_history {
        placeholder_record(name, OffsetDateTime::now_utc())
    } else if primary {
        results
            .primary(name)
            .await
            .map_err(|e| format!("could not read results for {name}: {e}"))?
            .ok_or_else(|| format!("no primary result stored for {name}"))?
    } else {
        results
            .latest(name)
            .await
            .map_err(|e| format!("could not read results for {name}: {e}"))?
            .ok_or_else(|| format!("no results stored for {name}"))?
    };

    match output {
        OutputFormat::Json => print_json(&json!(record)),
        OutputFormat::Text => {
            println!("{}", check_line(&record));
            if !record.description.is_empty() {
                println!("  {}", record.description);
            }
            if !record.brief_output.is_null() {
                println!("  {}", record.brief_output);
            }
        }
    }
    Ok(())
}

/// Print up to `limit` results for `name`, newest first.
pub(crate) async fn cmd_history(
    app: &App,
    name: &str,
    limit: usize,
    output: OutputFormat,
) -> Result<(), String> {
    let results = app.results();
    let read_error = |e: StorageError| format!("could not read results for {name}: {e}");
    let (lines, values): (Vec<String>, Vec<Value>) = if app.is_action(name) {
        let records: Vec<ActionRecord> = results.history(name, limit).await.map_err(read_error)?;
        records.iter().map(|r| (action_line(r), json!(r))).unzip()
    } else {
        let records: Vec<CheckRecord> = results.history(name, limit).await.map_err(read_error)?;
        records.iter().map(|r| (check_line(r), json!(r))).unzip()
    };

    match output {
        OutputFormat::Json => print_json(&Value::Array(values)),
        OutputFormat::Text if lines.is_empty() => println!("no results stored for {name}"),
        OutputFormat::Text => {
            for line in lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}
