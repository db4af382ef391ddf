pub(crate) mod envs;
pub(crate) mod list;
pub(crate) mod results;
pub(crate) mod run;

use serde_json::{json, Value};

use foursight_core::{ActionRecord, CheckRecord, RunOutcome, RunReport};

pub(crate) fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
    );
}

pub(crate) fn check_line(record: &CheckRecord) -> String {
    format!(
        "{} {} {}: {}",
        record.name, record.uuid, record.status, record.summary
    )
}

pub(crate) fn action_line(record: &ActionRecord) -> String {
    let mut line = format!("{} {} {}", record.name, record.uuid, record.status);
    if let Some(check) = &record.called_by {
        line.push_str(&format!(" (called by {check})"));
    }
    line
}

pub(crate) fn report_line(report: &RunReport) -> String {
    match &report.outcome {
        RunOutcome::Check(record) => check_line(record),
        RunOutcome::Action(record) => action_line(record),
        RunOutcome::Lost { name, uuid, error } => format!("{name} {uuid} LOST: {error}"),
    }
}

pub(crate) fn report_json(report: &RunReport) -> Value {
    match &report.outcome {
        RunOutcome::Check(record) => json!(record),
        RunOutcome::Action(record) => json!(record),
        RunOutcome::Lost { name, uuid, error } => json!({
            "name": name,
            "uuid": uuid,
            "lost": error,
        }),
    }
}
