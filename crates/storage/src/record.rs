use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters a check or action ran with. `serde_json::Map` is backed by a
/// `BTreeMap`, so serialization is key-sorted.
pub type Kwargs = serde_json::Map<String, Value>;

/// Outcome of one check execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    /// Set by the runner when a handler raised, panicked, or timed out.
    Error,
    /// Persisted, never actionable, hidden by default.
    Ignore,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Error => "ERROR",
            CheckStatus::Ignore => "IGNORE",
        }
    }

    /// Whether a result with this status may chain its bound action.
    pub fn permits_action(self) -> bool {
        !matches!(self, CheckStatus::Ignore | CheckStatus::Error)
    }

    pub fn hidden_by_default(self) -> bool {
        self == CheckStatus::Ignore
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Done,
    Fail,
    Pend,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Done => "DONE",
            ActionStatus::Fail => "FAIL",
            ActionStatus::Pend => "PEND",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted form of a check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub kwargs: Kwargs,
    pub status: CheckStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brief_output: Value,
    #[serde(default)]
    pub full_output: Value,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub allow_action: bool,
}

impl CheckRecord {
    /// The action this record asks to chain, if any. Requires
    /// `allow_action`, a non-empty action name, and an actionable status.
    pub fn chained_action(&self) -> Option<&str> {
        if !self.allow_action || !self.status.permits_action() {
            return None;
        }
        self.action.as_deref().filter(|a| !a.is_empty())
    }
}

/// The persisted form of an action result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub kwargs: Kwargs,
    pub status: ActionStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub output: Value,
    /// UUID of the check result that chained this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_by: Option<String>,
}

/// A record the [`ResultStore`](crate::ResultStore) can persist.
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn name(&self) -> &str;
    fn uuid(&self) -> &str;
    fn kwargs(&self) -> &Kwargs;

    /// The free-form payload replaced by a truncated head when the
    /// serialized record exceeds the body limit.
    fn bulky_output_mut(&mut self) -> &mut Value;

    fn is_primary(&self) -> bool {
        self.kwargs()
            .get("primary")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl StoredRecord for CheckRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    fn bulky_output_mut(&mut self) -> &mut Value {
        &mut self.full_output
    }
}

impl StoredRecord for ActionRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    fn bulky_output_mut(&mut self) -> &mut Value {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(status: CheckStatus) -> CheckRecord {
        CheckRecord {
            name: "ecs_status".into(),
            uuid: "2024-05-01T10:00:00.000000".into(),
            kwargs: Kwargs::new(),
            status,
            summary: String::new(),
            description: String::new(),
            brief_output: Value::Null,
            full_output: Value::Null,
            action: Some("patch_ecs".into()),
            allow_action: true,
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_value(CheckStatus::Warn).unwrap(), json!("WARN"));
        assert_eq!(serde_json::to_value(ActionStatus::Pend).unwrap(), json!("PEND"));
        let parsed: CheckStatus = serde_json::from_value(json!("IGNORE")).unwrap();
        assert_eq!(parsed, CheckStatus::Ignore);
    }

    #[test]
    fn ignore_and_error_never_chain() {
        assert_eq!(record(CheckStatus::Fail).chained_action(), Some("patch_ecs"));
        assert_eq!(record(CheckStatus::Ignore).chained_action(), None);
        assert_eq!(record(CheckStatus::Error).chained_action(), None);

        let mut empty = record(CheckStatus::Warn);
        empty.action = Some(String::new());
        assert_eq!(empty.chained_action(), None);

        let mut disallowed = record(CheckStatus::Warn);
        disallowed.allow_action = false;
        assert_eq!(disallowed.chained_action(), None);
    }

    #[test]
    fn primary_flag_comes_from_kwargs() {
        let mut rec = record(CheckStatus::Pass);
        assert!(!rec.is_primary());
        rec.kwargs.insert("primary".into(), json!(true));
        assert!(rec.is_primary());
        rec.kwargs.insert("primary".into(), json!("yes"));
        assert!(!rec.is_primary());
    }

    #[test]
    fn missing_optional_fields_default() {
        let rec: CheckRecord = serde_json::from_value(json!({
            "name": "a",
            "uuid": "2024-05-01T10:00:00.000000",
            "status": "PASS"
        }))
        .unwrap();
        assert!(rec.kwargs.is_empty());
        assert_eq!(rec.full_output, Value::Null);
        assert!(!rec.allow_action);
    }
}
