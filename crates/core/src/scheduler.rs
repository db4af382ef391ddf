//! Fingerprint-deduplicated work queues.
//!
//! Two logical queues, `checks` and `actions`, hold [`WorkUnit`]s. A unit's
//! fingerprint is `sha256(name || canonical(kwargs))`, where reserved
//! parameters left at their default are omitted; at most one unit per
//! fingerprint is in flight (enqueued or running) at any time. A submission
//! whose fingerprint is already in flight is dropped, not queued.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use foursight_storage::Kwargs;

use crate::clock::{Clock, SystemClock};
use crate::registry::{PRIMARY_PARAM, QUEUE_ACTION_PARAM};

/// Wall-clock budget of a single handler run.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(870);

/// How often the watchdog looks at a running handler.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long a unit may wait in its queue before it is discarded.
pub const DEFAULT_UNIT_TTL: Duration = Duration::from_secs(900);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Checks,
    Actions,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueKind::Checks => "checks",
            QueueKind::Actions => "actions",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex sha256 of a name and its canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `Kwargs` keeps its keys sorted, so its JSON rendering is canonical.
    ///
    /// `primary = false` and `queue_action = true` are dropped first, so
    /// spelling out a reserved default does not make a distinct run. Other
    /// parameters are hashed as submitted: the scheduler does not know each
    /// handler's declared defaults, so `{}` and `{"url": ""}` still differ
    /// for a handler whose `url` defaults to `""`.
    pub fn compute(name: &str, kwargs: &Kwargs) -> Self {
        let mut canonical = kwargs.clone();
        if canonical.get(PRIMARY_PARAM) == Some(&serde_json::Value::Bool(false)) {
            canonical.remove(PRIMARY_PARAM);
        }
        if canonical.get(QUEUE_ACTION_PARAM) == Some(&serde_json::Value::Bool(true)) {
            canonical.remove(QUEUE_ACTION_PARAM);
        }

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::Value::Object(canonical).to_string().as_bytes());
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One queued run of a check or action.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub queue: QueueKind,
    pub name: String,
    /// Parameters as submitted; defaults are merged at dispatch.
    pub kwargs: Kwargs,
    /// A unit dequeued after this instant is discarded with an error result.
    pub deadline: OffsetDateTime,
    pub attempt: u32,
    pub fingerprint: Fingerprint,
    /// For chained actions: UUID of the check result that queued it.
    pub called_by: Option<String>,
}

// ──────────────────────────────────────────────
// QueueDriver
// ──────────────────────────────────────────────

/// Storage for queued units and the in-flight fingerprint set.
///
/// `claim` must be an atomic set-if-absent: of any number of concurrent
/// claims for one fingerprint, exactly one returns `true`.
#[async_trait]
pub trait QueueDriver: Send + Sync + 'static {
    async fn claim(&self, fingerprint: &Fingerprint) -> bool;

    async fn release(&self, fingerprint: &Fingerprint);

    async fn push(&self, unit: WorkUnit);

    async fn pop(&self, queue: QueueKind) -> Option<WorkUnit>;

    async fn depth(&self, queue: QueueKind) -> usize;

    async fn in_flight(&self) -> usize;
}

#[derive(Default)]
struct MemoryQueueState {
    checks: VecDeque<WorkUnit>,
    actions: VecDeque<WorkUnit>,
    in_flight: HashSet<Fingerprint>,
}

impl MemoryQueueState {
    fn queue(&mut self, kind: QueueKind) -> &mut VecDeque<WorkUnit> {
        match kind {
            QueueKind::Checks => &mut self.checks,
            QueueKind::Actions => &mut self.actions,
        }
    }
}

/// Process-local FIFO queues.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryQueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueDriver for MemoryQueue {
    async fn claim(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().in_flight.insert(fingerprint.clone())
    }

    async fn release(&self, fingerprint: &Fingerprint) {
        self.lock().in_flight.remove(fingerprint);
    }

    async fn push(&self, unit: WorkUnit) {
        self.lock().queue(unit.queue).push_back(unit);
    }

    async fn pop(&self, queue: QueueKind) -> Option<WorkUnit> {
        self.lock().queue(queue).pop_front()
    }

    async fn depth(&self, queue: QueueKind) -> usize {
        self.lock().queue(queue).len()
    }

    async fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

// ──────────────────────────────────────────────
// Scheduler
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Enqueued(Fingerprint),
    /// A unit with this fingerprint was already in flight; nothing queued.
    Duplicate(Fingerprint),
}

impl Submission {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Submission::Enqueued(_))
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Submission::Enqueued(fp) | Submission::Duplicate(fp) => fp,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    driver: Arc<dyn QueueDriver>,
    clock: Arc<dyn Clock>,
    unit_ttl: Duration,
}

impl Scheduler {
    pub fn new(driver: Arc<dyn QueueDriver>, clock: Arc<dyn Clock>) -> Self {
        Scheduler {
            driver,
            clock,
            unit_ttl: DEFAULT_UNIT_TTL,
        }
    }

    /// A scheduler over a fresh [`MemoryQueue`] and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryQueue::new()), Arc::new(SystemClock))
    }

    pub fn with_unit_ttl(mut self, ttl: Duration) -> Self {
        self.unit_ttl = ttl;
        self
    }

    pub fn driver(&self) -> &Arc<dyn QueueDriver> {
        &self.driver
    }

    pub async fn submit_check(&self, name: &str, kwargs: Kwargs) -> Submission {
        self.submit(QueueKind::Checks, name, kwargs, None).await
    }

    pub async fn submit_action(
        &self,
        name: &str,
        kwargs: Kwargs,
        called_by: Option<String>,
    ) -> Submission {
        self.submit(QueueKind::Actions, name, kwargs, called_by)
            .await
    }

    async fn submit(
        &self,
        queue: QueueKind,
        name: &str,
        kwargs: Kwargs,
        called_by: Option<String>,
    ) -> Submission {
        let fingerprint = Fingerprint::compute(name, &kwargs);
        if !self.driver.claim(&fingerprint).await {
            tracing::info!(%queue, name, %fingerprint, "dropping duplicate submission");
            return Submission::Duplicate(fingerprint);
        }

        let ttl = time::Duration::try_from(self.unit_ttl).unwrap_or(time::Duration::MAX);
        let unit = WorkUnit {
            queue,
            name: name.to_string(),
            kwargs,
            deadline: self.clock.now_utc().saturating_add(ttl),
            attempt: 1,
            fingerprint: fingerprint.clone(),
            called_by,
        };
        tracing::debug!(%queue, name, %fingerprint, "enqueued");
        self.driver.push(unit).await;
        Submission::Enqueued(fingerprint)
    }

    /// The next unit from `queue`, if any. The unit stays in flight until
    /// [`complete`](Self::complete).
    pub async fn next(&self, queue: QueueKind) -> Option<WorkUnit> {
        self.driver.pop(queue).await
    }

    /// The next check, or failing that the next action.
    pub async fn next_any(&self) -> Option<WorkUnit> {
        match self.driver.pop(QueueKind::Checks).await {
            Some(unit) => Some(unit),
            None => self.driver.pop(QueueKind::Actions).await,
        }
    }

    /// Release a unit's fingerprint once it has finished running.
    pub async fn complete(&self, unit: &WorkUnit) {
        self.driver.release(&unit.fingerprint).await;
    }

    pub async fn depth(&self, queue: QueueKind) -> usize {
        self.driver.depth(queue).await
    }

    pub async fn is_idle(&self) -> bool {
        self.driver.in_flight().await == 0
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }
}
