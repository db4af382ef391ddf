//! The mutable result objects handlers fill in, and their history queries.
//!
//! A [`CheckResult`] is minted by the Runner before the handler is invoked:
//! it carries a fresh UUID and no status. The handler assigns a status and
//! whatever outputs it likes; the Runner then persists it. The same object
//! gives the handler read access to the name's history (latest, primary,
//! closest-to-a-time), which is how checks compare against their own past.

use serde_json::Value;
use time::{Duration, OffsetDateTime};

use foursight_storage::{
    ActionRecord, ActionStatus, CheckRecord, CheckStatus, Kwargs, StorageError,
};

use crate::clock::{format_uuid, truncate_to_micros};
use crate::context::RunContext;

/// Summary of the synthetic record returned for a name with no history.
pub const PLACEHOLDER_SUMMARY: &str = "Check has not yet run";

#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    /// The handler returned without choosing a status.
    #[error("'{name}' finished without assigning a status")]
    StatusUnassigned { name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ──────────────────────────────────────────────
// Check results
// ──────────────────────────────────────────────

/// One check execution in progress.
pub struct CheckResult {
    ctx: RunContext,
    pub name: String,
    pub uuid: String,
    /// `None` until the handler assigns one.
    pub status: Option<CheckStatus>,
    pub summary: String,
    pub description: String,
    pub brief_output: Value,
    pub full_output: Value,
    pub kwargs: Kwargs,
    pub action: Option<String>,
    pub allow_action: bool,
}

impl CheckResult {
    /// Mint a fresh result for `name`. The description is carried over from
    /// the latest stored result so a first run still displays something.
    pub async fn new(ctx: &RunContext, name: &str) -> Self {
        let description = match ctx.results().latest::<CheckRecord>(name).await {
            Ok(Some(latest)) => latest.description,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(name, error = %e, "could not read latest result for defaults");
                String::new()
            }
        };
        CheckResult {
            ctx: ctx.clone(),
            name: name.to_string(),
            uuid: ctx.ids().mint(),
            status: None,
            summary: String::new(),
            description,
            brief_output: Value::Null,
            full_output: Value::Null,
            kwargs: Kwargs::new(),
            action: None,
            allow_action: false,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Snapshot as a persistable record.
    pub fn to_record(&self) -> Result<CheckRecord, ResultError> {
        let status = self.status.ok_or_else(|| ResultError::StatusUnassigned {
            name: self.name.clone(),
        })?;
        Ok(CheckRecord {
            name: self.name.clone(),
            uuid: self.uuid.clone(),
            kwargs: self.kwargs.clone(),
            status,
            summary: self.summary.clone(),
            description: self.description.clone(),
            brief_output: self.brief_output.clone(),
            full_output: self.full_output.clone(),
            action: self.action.clone(),
            allow_action: self.allow_action,
        })
    }

    /// Persist under `(name, uuid)`. Returns the record as stored, which may
    /// have had its full output truncated.
    pub async fn store_result(&self) -> Result<CheckRecord, ResultError> {
        let record = self.to_record()?;
        Ok(self.ctx.results().store(&record).await?)
    }

    /// The newest stored result, or the placeholder if none exists.
    pub async fn get_latest_result(&self) -> Result<CheckRecord, ResultError> {
        match self.ctx.results().latest(&self.name).await? {
            Some(record) => Ok(record),
            None => Ok(self.placeholder()),
        }
    }

    /// The newest result run with `primary = true`. The placeholder if the
    /// name has no history at all; `None` if it has history but no primary.
    pub async fn get_primary_result(&self) -> Result<Option<CheckRecord>, ResultError> {
        let results = self.ctx.results();
        if let Some(record) = results.primary(&self.name).await? {
            return Ok(Some(record));
        }
        if results.has_history(&self.name).await? {
            Ok(None)
        } else {
            Ok(Some(self.placeholder()))
        }
    }

    /// The stored result closest to `now - diff_mins`.
    pub async fn get_closest_result(
        &self,
        diff_mins: i64,
    ) -> Result<Option<CheckRecord>, ResultError> {
        let target = self.ctx.now() - Duration::minutes(diff_mins);
        self.get_closest_result_to(target).await
    }

    /// The stored result closest to `target`; ties go to the earlier one.
    pub async fn get_closest_result_to(
        &self,
        target: OffsetDateTime,
    ) -> Result<Option<CheckRecord>, ResultError> {
        Ok(self.ctx.results().closest_to(&self.name, target).await?)
    }

    pub async fn get_result_by_uuid(&self, uuid: &str) -> Result<Option<CheckRecord>, ResultError> {
        Ok(self.ctx.results().get(&self.name, uuid).await?)
    }

    fn placeholder(&self) -> CheckRecord {
        placeholder_record(&self.name, self.ctx.now())
    }
}

/// The synthetic record shown for a name that has never run.
pub fn placeholder_record(name: &str, now: OffsetDateTime) -> CheckRecord {
    CheckRecord {
        name: name.to_string(),
        uuid: format_uuid(truncate_to_micros(now)),
        kwargs: Kwargs::new(),
        status: CheckStatus::Pass,
        summary: PLACEHOLDER_SUMMARY.to_string(),
        description: String::new(),
        brief_output: Value::Null,
        full_output: Value::Null,
        action: None,
        allow_action: false,
    }
}

// ──────────────────────────────────────────────
// Action results
// ──────────────────────────────────────────────

/// One action execution in progress.
pub struct ActionResult {
    ctx: RunContext,
    pub name: String,
    pub uuid: String,
    pub status: Option<ActionStatus>,
    pub description: String,
    pub output: Value,
    pub kwargs: Kwargs,
    /// UUID of the check result that chained this action.
    pub called_by: Option<String>,
}

impl ActionResult {
    pub async fn new(ctx: &RunContext, name: &str) -> Self {
        let description = match ctx.results().latest::<ActionRecord>(name).await {
            Ok(Some(latest)) => latest.description,
            _ => String::new(),
        };
        ActionResult {
            ctx: ctx.clone(),
            name: name.to_string(),
            uuid: ctx.ids().mint(),
            status: None,
            description,
            output: Value::Null,
            kwargs: Kwargs::new(),
            called_by: None,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn to_record(&self) -> Result<ActionRecord, ResultError> {
        let status = self.status.ok_or_else(|| ResultError::StatusUnassigned {
            name: self.name.clone(),
        })?;
        Ok(ActionRecord {
            name: self.name.clone(),
            uuid: self.uuid.clone(),
            kwargs: self.kwargs.clone(),
            status,
            description: self.description.clone(),
            output: self.output.clone(),
            called_by: self.called_by.clone(),
        })
    }

    pub async fn store_result(&self) -> Result<ActionRecord, ResultError> {
        let record = self.to_record()?;
        Ok(self.ctx.results().store(&record).await?)
    }

    pub async fn get_latest_result(&self) -> Result<Option<ActionRecord>, ResultError> {
        Ok(self.ctx.results().latest(&self.name).await?)
    }

    /// The check result that chained this action, looked up under
    /// `check_name`. `None` when the action was run directly.
    pub async fn get_associated_check_result(
        &self,
        check_name: &str,
    ) -> Result<Option<CheckRecord>, ResultError> {
        match &self.called_by {
            Some(uuid) => Ok(self.ctx.results().get(check_name, uuid).await?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use foursight_storage::{MemoryObjectStore, ResultStore};
    use serde_json::json;
    use time::macros::datetime;

    use crate::clock::{IdMinter, ManualClock};
    use crate::testing::StubConnection;

    fn context(clock: Arc<ManualClock>) -> RunContext {
        RunContext::new(
            Arc::new(StubConnection::new("mastertest")),
            ResultStore::new(Arc::new(MemoryObjectStore::new()), "results"),
            Arc::new(IdMinter::new(clock)),
        )
    }

    async fn run(ctx: &RunContext, status: CheckStatus, primary: bool) -> CheckRecord {
        let mut result = CheckResult::new(ctx, "es_status").await;
        result.status = Some(status);
        result.summary = format!("{status}");
        result.kwargs.insert("primary".into(), json!(primary));
        result.store_result().await.unwrap()
    }

    #[tokio::test]
    async fn unseen_name_reads_as_placeholder() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock);
        let result = CheckResult::new(&ctx, "never_ran").await;

        let latest = result.get_latest_result().await.unwrap();
        assert_eq!(latest.status, CheckStatus::Pass);
        assert_eq!(latest.summary, PLACEHOLDER_SUMMARY);
        assert_eq!(latest.uuid, "2024-03-01T09:00:00.000000");

        let primary = result.get_primary_result().await.unwrap().unwrap();
        assert_eq!(primary.summary, PLACEHOLDER_SUMMARY);
        assert!(result.get_closest_result(30).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unassigned_status_is_not_stored() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock);
        let result = CheckResult::new(&ctx, "es_status").await;
        let err = result.store_result().await.unwrap_err();
        assert!(matches!(err, ResultError::StatusUnassigned { .. }));
        assert!(!ctx.results().has_history("es_status").await.unwrap());
    }

    #[tokio::test]
    async fn primary_and_latest_diverge() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock.clone());
        let first = run(&ctx, CheckStatus::Pass, true).await;
        clock.advance(Duration::minutes(5));
        let second = run(&ctx, CheckStatus::Warn, false).await;

        let check = CheckResult::new(&ctx, "es_status").await;
        assert_eq!(check.get_latest_result().await.unwrap().uuid, second.uuid);
        assert_eq!(
            check.get_primary_result().await.unwrap().unwrap().uuid,
            first.uuid
        );
    }

    #[tokio::test]
    async fn history_without_primary_has_no_primary() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock);
        run(&ctx, CheckStatus::Fail, false).await;
        let check = CheckResult::new(&ctx, "es_status").await;
        assert!(check.get_primary_result().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closest_result_looks_back_from_now() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock.clone());
        let at_0900 = run(&ctx, CheckStatus::Warn, false).await;
        clock.advance(Duration::minutes(30));
        let at_0930 = run(&ctx, CheckStatus::Warn, false).await;
        clock.advance(Duration::minutes(30));

        let check = CheckResult::new(&ctx, "es_status").await;
        let closest = check.get_closest_result(30).await.unwrap().unwrap();
        assert_eq!(closest.uuid, at_0930.uuid);
        let closest = check.get_closest_result(59).await.unwrap().unwrap();
        assert_eq!(closest.uuid, at_0900.uuid);
        // 09:15 is equidistant; the earlier record wins.
        let tie = check.get_closest_result(45).await.unwrap().unwrap();
        assert_eq!(tie.uuid, at_0900.uuid);
    }

    #[tokio::test]
    async fn description_carries_over_from_latest() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock);
        let mut first = CheckResult::new(&ctx, "es_status").await;
        first.status = Some(CheckStatus::Pass);
        first.description = "Search cluster health".into();
        first.store_result().await.unwrap();

        let second = CheckResult::new(&ctx, "es_status").await;
        assert_eq!(second.description, "Search cluster health");
        assert!(second.uuid > first.uuid);
    }

    #[tokio::test]
    async fn action_links_back_to_its_check() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 09:00 UTC)));
        let ctx = context(clock);
        let check = run(&ctx, CheckStatus::Warn, false).await;

        let mut action = ActionResult::new(&ctx, "patch_es").await;
        action.status = Some(ActionStatus::Done);
        action.called_by = Some(check.uuid.clone());
        action.output = json!({"patched": 3});
        let stored = action.store_result().await.unwrap();
        assert!(stored.uuid > check.uuid);

        let linked = action
            .get_associated_check_result("es_status")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(linked, check);
        assert_eq!(
            action.get_latest_result().await.unwrap().unwrap().uuid,
            stored.uuid
        );
    }
}
