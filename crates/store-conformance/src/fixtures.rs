//! Records and keys shared by the obligations.

use serde_json::{json, Value};

use foursight_storage::{CheckRecord, CheckStatus, Kwargs};

/// UUIDs for one name, in chronological (and lexicographic) order.
pub const UUIDS: [&str; 4] = [
    "2024-01-31T23:59:59.999999",
    "2024-02-01T00:00:00.000000",
    "2024-02-01T00:00:00.000001",
    "2024-02-01T10:30:00.000000",
];

/// A check record with the given status, marked primary when asked.
pub fn check_record(name: &str, uuid: &str, status: CheckStatus, primary: bool) -> CheckRecord {
    let mut kwargs = Kwargs::new();
    kwargs.insert("primary".into(), Value::Bool(primary));
    CheckRecord {
        name: name.to_string(),
        uuid: uuid.to_string(),
        kwargs,
        status,
        summary: format!("{status} at {uuid}"),
        description: "conformance fixture".to_string(),
        brief_output: Value::Null,
        full_output: json!({ "uuid": uuid }),
        action: None,
        allow_action: false,
    }
}

/// `count` keys under `prefix`, zero-padded so they sort numerically.
pub fn numbered_keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i:04}")).collect()
}
