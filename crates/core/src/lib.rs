//! foursight-core: the check-and-action execution model.
//!
//! Checks register with a [`Registry`]; the [`Scheduler`] queues
//! fingerprint-deduplicated runs; the [`Runner`] executes each run against a
//! fresh [`Connection`] under a watchdog, persists exactly one result per
//! run through the [`ResultStore`], and chains bound actions.
//!
//! # Public API
//!
//! - [`Registry`], [`CheckHandler`], [`ActionHandler`] -- handler registration
//! - [`CheckResult`], [`ActionResult`] -- what handlers fill in, plus history queries
//! - [`Scheduler`], [`QueueDriver`], [`MemoryQueue`] -- work queues
//! - [`Runner`], [`RunnerConfig`] -- dispatch, persistence, chaining, workers
//! - [`Connection`], [`PortalConnection`], [`ManifestConnectionFactory`] -- environment access
//! - [`IdMinter`], [`Clock`] -- result identity
//! - [`testing::StubConnection`] -- scripted connection for handler tests

pub mod clock;
pub mod connection;
pub mod context;
pub mod environment;
pub mod portal;
pub mod registry;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod testing;

// ── Convenience re-exports ───────────────────────────────────────────

pub use clock::{
    format_uuid, parse_timestamp, parse_uuid, Clock, IdMinter, ManualClock, SystemClock,
};
pub use connection::{
    Connection, ConnectionError, ConnectionFactory, PortalKeys, StaticConnectionFactory,
};
pub use context::RunContext;
pub use environment::{
    list_environments, load_manifest, load_portal_keys, BucketNames, BucketSuffix,
    EnvironmentError, EnvironmentManifest, ManifestConnectionFactory, Stage,
};
pub use portal::PortalConnection;
pub use registry::{
    ActionHandler, CheckHandler, Handler, HandlerError, HandlerKind, Registration, Registry,
    RegistryError, PRIMARY_PARAM, QUEUE_ACTION_PARAM,
};
pub use result::{ActionResult, CheckResult, ResultError, PLACEHOLDER_SUMMARY};
pub use runner::{RunOutcome, RunReport, Runner, RunnerConfig, RunnerError};
pub use scheduler::{
    Fingerprint, MemoryQueue, QueueDriver, QueueKind, Scheduler, Submission, WorkUnit,
    CHECK_TIMEOUT, POLL_INTERVAL,
};

pub use foursight_storage::{
    ActionRecord, ActionStatus, CheckRecord, CheckStatus, Kwargs, ResultStore, StorageError,
    LAMBDA_MAX_BODY_SIZE,
};
