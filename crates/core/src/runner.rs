//! Executes dequeued units and persists what they produce.
//!
//! For every unit the runner resolves the handler, merges parameters,
//! builds a fresh connection, and runs the handler on its own task under a
//! watchdog. Whatever happens (normal return, error, panic, timeout, a
//! past-deadline unit, an unreachable environment) exactly one result is
//! persisted for the unit, unless the store stays unavailable through every
//! retry, in which case the run is logged and counted as lost.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use foursight_storage::{
    ActionRecord, ActionStatus, CheckRecord, CheckStatus, Kwargs, ResultStore, StorageError,
    StoredRecord,
};

use crate::clock::IdMinter;
use crate::connection::ConnectionFactory;
use crate::context::RunContext;
use crate::registry::{
    ActionHandler, CheckHandler, Handler, HandlerKind, Registry, RegistryError, QUEUE_ACTION_PARAM,
};
use crate::result::{ActionResult, CheckResult};
use crate::scheduler::{QueueKind, Scheduler, Submission, WorkUnit, CHECK_TIMEOUT, POLL_INTERVAL};

pub const TIMEOUT_SUMMARY: &str = "timeout";
pub const DEADLINE_SUMMARY: &str = "deadline exceeded";
pub const UNASSIGNED_SUMMARY: &str = "check finished without assigning a status";
pub const RESERVED_STATUS_SUMMARY: &str = "check assigned reserved status ERROR";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub check_timeout: Duration,
    pub poll_interval: Duration,
    /// Extra persistence attempts after the first one fails.
    pub store_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub store_backoff: Duration,
    /// How long an idle worker sleeps before polling the queues again.
    pub idle_sleep: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            check_timeout: CHECK_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            store_retries: 3,
            store_backoff: Duration::from_millis(200),
            idle_sleep: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Check(CheckRecord),
    Action(ActionRecord),
    /// The result could not be persisted.
    Lost {
        name: String,
        uuid: String,
        error: String,
    },
}

impl RunOutcome {
    pub fn uuid(&self) -> &str {
        match self {
            RunOutcome::Check(r) => &r.uuid,
            RunOutcome::Action(r) => &r.uuid,
            RunOutcome::Lost { uuid, .. } => uuid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub unit: WorkUnit,
    pub outcome: RunOutcome,
    /// The action submission made on behalf of this check result, if any.
    pub chained: Option<Submission>,
}

/// How a watched handler task ended.
enum Watched<T> {
    Finished(T),
    Panicked(String),
    TimedOut,
}

pub struct Runner {
    registry: Arc<Registry>,
    scheduler: Scheduler,
    connections: Arc<dyn ConnectionFactory>,
    results: ResultStore,
    ids: Arc<IdMinter>,
    env: String,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        registry: Arc<Registry>,
        scheduler: Scheduler,
        connections: Arc<dyn ConnectionFactory>,
        results: ResultStore,
        ids: Arc<IdMinter>,
        env: impl Into<String>,
    ) -> Self {
        Runner {
            registry,
            scheduler,
            connections,
            results,
            ids,
            env: env.into(),
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Run the next queued unit, checks first. `None` when both queues are
    /// empty.
    pub async fn run_next(&self) -> Option<Result<RunReport, RunnerError>> {
        let unit = self.scheduler.next_any().await?;
        Some(self.run_unit(unit).await)
    }

    /// Process both queues until they are empty, including actions chained
    /// along the way.
    pub async fn drain(&self) -> Result<Vec<RunReport>, RunnerError> {
        let mut reports = Vec::new();
        while let Some(report) = self.run_next().await {
            reports.push(report?);
        }
        Ok(reports)
    }

    /// Run one dequeued unit to completion and release its fingerprint.
    pub async fn run_unit(&self, unit: WorkUnit) -> Result<RunReport, RunnerError> {
        let report = self.dispatch(&unit).await;
        self.scheduler.complete(&unit).await;
        let (outcome, chained) = report?;
        Ok(RunReport {
            unit,
            outcome,
            chained,
        })
    }

    async fn dispatch(
        &self,
        unit: &WorkUnit,
    ) -> Result<(RunOutcome, Option<Submission>), RunnerError> {
        let expected = match unit.queue {
            QueueKind::Checks => HandlerKind::Check,
            QueueKind::Actions => HandlerKind::Action,
        };
        let registration = self.registry.get_kind(&unit.name, expected)?;
        let params = registration.merge_params(&unit.kwargs);

        match &registration.handler {
            Handler::Check(handler) => {
                let outcome = self
                    .run_check(
                        unit,
                        handler.clone(),
                        params.clone(),
                        registration.bound_action.clone(),
                    )
                    .await;
                let chained = match &outcome {
                    RunOutcome::Check(record) => self.chain(unit, record, &params).await,
                    _ => None,
                };
                Ok((outcome, chained))
            }
            Handler::Action(handler) => {
                let outcome = self.run_action(unit, handler.clone(), params).await;
                Ok((outcome, None))
            }
        }
    }

    async fn run_check(
        &self,
        unit: &WorkUnit,
        handler: Arc<dyn CheckHandler>,
        params: Kwargs,
        bound_action: Option<String>,
    ) -> RunOutcome {
        let name = unit.name.as_str();

        if self.ids.now() > unit.deadline {
            tracing::warn!(name, deadline = %unit.deadline, "discarding unit past its deadline");
            let record = check_error(name, &self.ids.mint(), params, DEADLINE_SUMMARY, Value::Null);
            return self.persist(record).await;
        }

        let connection = match self.connections.connect(&self.env).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(name, env = %self.env, error = %e, "could not connect");
                let summary = format!("could not connect to {}: {e}", self.env);
                let record = check_error(name, &self.ids.mint(), params, &summary, Value::Null);
                return self.persist(record).await;
            }
        };
        let ctx = RunContext::new(connection, self.results.clone(), self.ids.clone());

        let mut result = CheckResult::new(&ctx, name).await;
        result.kwargs = params.clone();
        result.action = bound_action;
        let uuid = result.uuid.clone();

        let task = tokio::spawn(async move {
            let outcome = handler.check(&ctx, &params, &mut result).await;
            (result, outcome)
        });

        let record = match self.watch(name, task).await {
            Watched::Finished((result, Ok(()))) if result.status == Some(CheckStatus::Error) => {
                tracing::warn!(name, uuid = %uuid, summary = %result.summary, "{RESERVED_STATUS_SUMMARY}");
                let mut record = check_error(
                    name,
                    &uuid,
                    result.kwargs,
                    RESERVED_STATUS_SUMMARY,
                    json!({ "handler_summary": result.summary }),
                );
                record.description = result.description;
                record
            }
            Watched::Finished((result, Ok(()))) => match result.to_record() {
                Ok(record) => record,
                Err(_) => {
                    tracing::warn!(name, uuid = %uuid, "{UNASSIGNED_SUMMARY}");
                    let mut record =
                        check_error(name, &uuid, result.kwargs, UNASSIGNED_SUMMARY, Value::Null);
                    record.description = result.description;
                    record
                }
            },
            Watched::Finished((result, Err(error))) => {
                tracing::warn!(name, uuid = %uuid, error = %error, "check raised");
                let mut record = check_error(
                    name,
                    &uuid,
                    result.kwargs,
                    error.message(),
                    Value::String(error.trace().to_string()),
                );
                record.description = result.description;
                record
            }
            Watched::Panicked(message) => {
                tracing::warn!(name, uuid = %uuid, message = %message, "check panicked");
                check_error(name, &uuid, unit_params(&self.registry, unit), &message, Value::Null)
            }
            Watched::TimedOut => check_error(
                name,
                &uuid,
                unit_params(&self.registry, unit),
                TIMEOUT_SUMMARY,
                Value::Null,
            ),
        };
        self.persist(record).await
    }

    async fn run_action(
        &self,
        unit: &WorkUnit,
        handler: Arc<dyn ActionHandler>,
        params: Kwargs,
    ) -> RunOutcome {
        let name = unit.name.as_str();
        let called_by = unit.called_by.clone();

        if self.ids.now() > unit.deadline {
            tracing::warn!(name, deadline = %unit.deadline, "discarding unit past its deadline");
            let record = action_failure(name, &self.ids.mint(), params, called_by, DEADLINE_SUMMARY, "");
            return self.persist(record).await;
        }

        let connection = match self.connections.connect(&self.env).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(name, env = %self.env, error = %e, "could not connect");
                let message = format!("could not connect to {}: {e}", self.env);
                let record = action_failure(name, &self.ids.mint(), params, called_by, &message, "");
                return self.persist(record).await;
            }
        };
        let ctx = RunContext::new(connection, self.results.clone(), self.ids.clone());

        let mut result = ActionResult::new(&ctx, name).await;
        result.kwargs = params.clone();
        result.called_by = called_by.clone();
        let uuid = result.uuid.clone();

        let task = tokio::spawn(async move {
            let outcome = handler.act(&ctx, &params, &mut result).await;
            (result, outcome)
        });

        let params = unit_params(&self.registry, unit);
        let record = match self.watch(name, task).await {
            Watched::Finished((result, Ok(()))) => match result.to_record() {
                Ok(record) => record,
                Err(_) => {
                    tracing::warn!(name, uuid = %uuid, "action finished without assigning a status");
                    action_failure(
                        name,
                        &uuid,
                        result.kwargs,
                        called_by,
                        "action finished without assigning a status",
                        "",
                    )
                }
            },
            Watched::Finished((result, Err(error))) => {
                tracing::warn!(name, uuid = %uuid, error = %error, "action raised");
                action_failure(
                    name,
                    &uuid,
                    result.kwargs,
                    called_by,
                    error.message(),
                    error.trace(),
                )
            }
            Watched::Panicked(message) => {
                tracing::warn!(name, uuid = %uuid, message = %message, "action panicked");
                action_failure(name, &uuid, params, called_by, &message, "")
            }
            Watched::TimedOut => {
                action_failure(name, &uuid, params, called_by, TIMEOUT_SUMMARY, "")
            }
        };
        self.persist(record).await
    }

    /// Wait for a handler task, aborting it once it outlives the timeout.
    /// The timeout is checked every `poll_interval`.
    async fn watch<T>(&self, name: &str, mut task: JoinHandle<T>) -> Watched<T> {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                joined = &mut task => {
                    return match joined {
                        Ok(value) => Watched::Finished(value),
                        Err(e) if e.is_panic() => Watched::Panicked(panic_message(e.into_panic())),
                        Err(e) => Watched::Panicked(e.to_string()),
                    };
                }
                _ = ticker.tick() => {
                    if started.elapsed() >= self.config.check_timeout {
                        tracing::warn!(
                            name,
                            timeout_secs = self.config.check_timeout.as_secs(),
                            "handler timed out; aborting"
                        );
                        task.abort();
                        return Watched::TimedOut;
                    }
                }
            }
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    async fn persist<R>(&self, record: R) -> RunOutcome
    where
        R: StoredRecord + Into<RunOutcome> + StatusField,
    {
        match self.store_with_retry(&record).await {
            Ok(stored) => {
                tracing::info!(
                    name = stored.name(),
                    uuid = stored.uuid(),
                    status = stored.status_str(),
                    "stored result"
                );
                stored.into()
            }
            Err(e) => {
                tracing::error!(
                    name = record.name(),
                    uuid = record.uuid(),
                    status = record.status_str(),
                    error = %e,
                    "dropping result; store unavailable"
                );
                RunOutcome::Lost {
                    name: record.name().to_string(),
                    uuid: record.uuid().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Exponential backoff with random jitter, retrying only transient
    /// failures.
    async fn store_with_retry<R: StoredRecord>(&self, record: &R) -> Result<R, StorageError> {
        let mut backoff = self.config.store_backoff;
        let mut attempt = 0;
        loop {
            match self.results.store(record).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_retriable() && attempt < self.config.store_retries => {
                    attempt += 1;
                    let jitter_ms = backoff.as_millis() as u64 / 2;
                    let delay = backoff
                        + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
                    tracing::warn!(
                        name = record.name(),
                        uuid = record.uuid(),
                        attempt,
                        retries = self.config.store_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying result persistence"
                    );
                    tokio::time::sleep(delay).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Chaining ─────────────────────────────────────────────────────────────

    async fn chain(
        &self,
        unit: &WorkUnit,
        record: &CheckRecord,
        params: &Kwargs,
    ) -> Option<Submission> {
        let action = record.chained_action()?;
        if params.get(QUEUE_ACTION_PARAM) == Some(&Value::Bool(false)) {
            tracing::debug!(name = %record.name, action, "action chaining disabled for this run");
            return None;
        }
        if let Err(e) = self.registry.get_kind(action, HandlerKind::Action) {
            tracing::warn!(name = %record.name, action, error = %e, "not chaining unregistered action");
            return None;
        }
        let submission = self
            .scheduler
            .submit_action(action, unit.kwargs.clone(), Some(record.uuid.clone()))
            .await;
        Some(submission)
    }

    // ── Workers ──────────────────────────────────────────────────────────────

    /// Process units until `shutdown` turns `true`.
    pub async fn run_worker(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_next().await {
                Some(Ok(_)) => {}
                Some(Err(e)) => tracing::error!(error = %e, "could not dispatch unit"),
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.idle_sleep) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Start `workers` tasks sharing this runner's queues.
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|worker| {
                let runner = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker, "worker started");
                    runner.run_worker(shutdown).await;
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect()
    }
}

/// Status rendering shared by the two record kinds.
trait StatusField {
    fn status_str(&self) -> &'static str;
}

impl StatusField for CheckRecord {
    fn status_str(&self) -> &'static str {
        self.status.as_str()
    }
}

impl StatusField for ActionRecord {
    fn status_str(&self) -> &'static str {
        self.status.as_str()
    }
}

impl From<CheckRecord> for RunOutcome {
    fn from(record: CheckRecord) -> Self {
        RunOutcome::Check(record)
    }
}

impl From<ActionRecord> for RunOutcome {
    fn from(record: ActionRecord) -> Self {
        RunOutcome::Action(record)
    }
}

/// Parameters for a record built after the handler's result was lost.
fn unit_params(registry: &Registry, unit: &WorkUnit) -> Kwargs {
    registry
        .get(&unit.name)
        .map(|r| r.merge_params(&unit.kwargs))
        .unwrap_or_else(|_| unit.kwargs.clone())
}

fn check_error(name: &str, uuid: &str, kwargs: Kwargs, summary: &str, trace: Value) -> CheckRecord {
    CheckRecord {
        name: name.to_string(),
        uuid: uuid.to_string(),
        kwargs,
        status: CheckStatus::Error,
        summary: summary.to_string(),
        description: String::new(),
        brief_output: Value::Null,
        full_output: trace,
        action: None,
        allow_action: false,
    }
}

fn action_failure(
    name: &str,
    uuid: &str,
    kwargs: Kwargs,
    called_by: Option<String>,
    error: &str,
    trace: &str,
) -> ActionRecord {
    ActionRecord {
        name: name.to_string(),
        uuid: uuid.to_string(),
        kwargs,
        status: ActionStatus::Fail,
        description: String::new(),
        output: json!({ "error": error, "trace": trace }),
        called_by,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_render_as_text() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "handler panicked");
    }

    #[test]
    fn error_records_never_chain() {
        let record = check_error("x", "2024-01-01T00:00:00.000000", Kwargs::new(), "timeout", Value::Null);
        assert_eq!(record.status, CheckStatus::Error);
        assert!(record.chained_action().is_none());
    }

    #[test]
    fn action_failures_carry_error_and_trace() {
        let record = action_failure("a", "u", Kwargs::new(), Some("c".into()), "nope", "at line 1");
        assert_eq!(record.status, ActionStatus::Fail);
        assert_eq!(record.output, json!({"error": "nope", "trace": "at line 1"}));
        assert_eq!(record.called_by.as_deref(), Some("c"));
    }
}
