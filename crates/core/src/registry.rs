//! Name → handler mapping, populated explicitly at startup.
//!
//! Every check module calls [`Registry::register_check`] or
//! [`Registry::register_action`] with its handler and the parameters it
//! recognizes (each with one default). The finished registry is wrapped in
//! an `Arc` and shared read-only by the scheduler and every worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use foursight_storage::Kwargs;

use crate::context::RunContext;
use crate::result::{ActionResult, CheckResult};

/// Reserved parameter: store the result as the primary one for its name.
pub const PRIMARY_PARAM: &str = "primary";

/// Reserved parameter: whether an allowed action is chained after the check.
pub const QUEUE_ACTION_PARAM: &str = "queue_action";

// ──────────────────────────────────────────────
// HandlerError
// ──────────────────────────────────────────────

/// An unexpected failure inside a handler.
///
/// Domain outcomes (an unreachable cluster, an expired key) are statuses,
/// not errors. A `HandlerError` becomes an `ERROR` result with the message
/// as summary and the captured trace as full output.
///
/// Any `std::error::Error` converts with `?`.
pub struct HandlerError {
    message: String,
    trace: String,
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
            trace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }

    /// Build from a caught panic payload.
    pub fn from_panic(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
            trace: "handler panicked".to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        HandlerError::msg(error.to_string())
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ──────────────────────────────────────────────
// Handler traits
// ──────────────────────────────────────────────

/// A health check. Must assign `result.status` from
/// {PASS, WARN, FAIL, IGNORE} before returning `Ok`.
#[async_trait]
pub trait CheckHandler: Send + Sync + 'static {
    async fn check(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError>;
}

/// A remediation routine. Must assign `result.status` from
/// {DONE, FAIL, PEND} before returning `Ok`.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn act(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut ActionResult,
    ) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Check,
    Action,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Check => f.write_str("check"),
            HandlerKind::Action => f.write_str("action"),
        }
    }
}

#[derive(Clone)]
pub enum Handler {
    Check(Arc<dyn CheckHandler>),
    Action(Arc<dyn ActionHandler>),
}

impl Handler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Check(_) => HandlerKind::Check,
            Handler::Action(_) => HandlerKind::Action,
        }
    }
}

// ──────────────────────────────────────────────
// Registration
// ──────────────────────────────────────────────

/// One registered handler with its recognized parameters.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub handler: Handler,
    /// Recognized parameters and their defaults.
    pub defaults: Kwargs,
    /// For checks: the action a result of this check chains by default.
    pub bound_action: Option<String>,
}

impl Registration {
    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }

    /// Merge call-site parameters over the defaults. Reserved parameters
    /// are always recognized; any other unrecognized key is dropped.
    pub fn merge_params(&self, call: &Kwargs) -> Kwargs {
        let mut merged = Kwargs::new();
        merged.insert(PRIMARY_PARAM.to_string(), Value::Bool(false));
        merged.insert(QUEUE_ACTION_PARAM.to_string(), Value::Bool(true));
        for (key, value) in &self.defaults {
            merged.insert(key.clone(), value.clone());
        }

        let mut dropped = Vec::new();
        for (key, value) in call {
            if merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            } else {
                dropped.push(key.as_str());
            }
        }
        if !dropped.is_empty() {
            tracing::debug!(name = %self.name, ?dropped, "dropping unrecognized parameters");
        }
        merged
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("'{name}' is already registered")]
    DuplicateName { name: String },

    #[error("no check or action named '{name}'")]
    UnknownName { name: String },

    #[error("'{name}' is registered as {actual}, not {expected}")]
    WrongKind {
        name: String,
        expected: HandlerKind,
        actual: HandlerKind,
    },
}

/// Checks and actions share one namespace, so a name identifies exactly
/// one handler and one result history.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Registration>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_check(
        &mut self,
        name: &str,
        handler: impl CheckHandler,
        defaults: Kwargs,
        bound_action: Option<&str>,
    ) -> Result<(), RegistryError> {
        self.insert(Registration {
            name: name.to_string(),
            handler: Handler::Check(Arc::new(handler)),
            defaults,
            bound_action: bound_action.map(str::to_string),
        })
    }

    pub fn register_action(
        &mut self,
        name: &str,
        handler: impl ActionHandler,
        defaults: Kwargs,
    ) -> Result<(), RegistryError> {
        self.insert(Registration {
            name: name.to_string(),
            handler: Handler::Action(Arc::new(handler)),
            defaults,
            bound_action: None,
        })
    }

    fn insert(&mut self, registration: Registration) -> Result<(), RegistryError> {
        if self.index.contains_key(&registration.name) {
            return Err(RegistryError::DuplicateName {
                name: registration.name,
            });
        }
        self.index
            .insert(registration.name.clone(), self.entries.len());
        self.entries.push(registration);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Registration, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RegistryError::UnknownName {
                name: name.to_string(),
            })
    }

    /// Like [`get`](Self::get), but also requires the given kind.
    pub fn get_kind(&self, name: &str, kind: HandlerKind) -> Result<&Registration, RegistryError> {
        let registration = self.get(name)?;
        if registration.kind() != kind {
            return Err(RegistryError::WrongKind {
                name: name.to_string(),
                expected: kind,
                actual: registration.kind(),
            });
        }
        Ok(registration)
    }

    /// Registered names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every check's bound action must be a registered action.
    pub fn validate_bindings(&self) -> Result<(), RegistryError> {
        for registration in &self.entries {
            if let Some(action) = &registration.bound_action {
                self.get_kind(action, HandlerKind::Action)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foursight_storage::{ActionStatus, CheckStatus};
    use serde_json::json;

    struct AlwaysPass;

    #[async_trait]
    impl CheckHandler for AlwaysPass {
        async fn check(
            &self,
            _ctx: &RunContext,
            _kwargs: &Kwargs,
            result: &mut CheckResult,
        ) -> Result<(), HandlerError> {
            result.status = Some(CheckStatus::Pass);
            Ok(())
        }
    }

    struct Noop;

    #[async_trait]
    impl ActionHandler for Noop {
        async fn act(
            &self,
            _ctx: &RunContext,
            _kwargs: &Kwargs,
            result: &mut ActionResult,
        ) -> Result<(), HandlerError> {
            result.status = Some(ActionStatus::Done);
            Ok(())
        }
    }

    fn kwargs(value: Value) -> Kwargs {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn duplicate_names_are_rejected_across_kinds() {
        let mut registry = Registry::new();
        registry
            .register_check("es_status", AlwaysPass, Kwargs::new(), None)
            .unwrap();
        let err = registry
            .register_action("es_status", Noop, Kwargs::new())
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName {
                name: "es_status".into()
            }
        );
    }

    #[test]
    fn list_keeps_insertion_order() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register_check(name, AlwaysPass, Kwargs::new(), None)
                .unwrap();
        }
        assert_eq!(registry.list(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn unknown_and_wrong_kind_lookups_fail() {
        let mut registry = Registry::new();
        registry
            .register_action("patch_es", Noop, Kwargs::new())
            .unwrap();
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::UnknownName { .. })
        ));
        assert!(matches!(
            registry.get_kind("patch_es", HandlerKind::Check),
            Err(RegistryError::WrongKind { .. })
        ));
        assert_eq!(
            registry.get("patch_es").unwrap().kind(),
            HandlerKind::Action
        );
    }

    #[test]
    fn merge_applies_defaults_and_drops_unknown() {
        let mut registry = Registry::new();
        registry
            .register_check(
                "indices",
                AlwaysPass,
                kwargs(json!({"url": "", "retries": 3})),
                None,
            )
            .unwrap();
        let merged = registry
            .get("indices")
            .unwrap()
            .merge_params(&kwargs(json!({"url": "https://es", "colour": "red", "primary": true})));
        assert_eq!(
            Value::Object(merged),
            json!({
                "url": "https://es",
                "retries": 3,
                "primary": true,
                "queue_action": true
            })
        );
    }

    #[test]
    fn bindings_must_name_registered_actions() {
        let mut registry = Registry::new();
        registry
            .register_check("es_status", AlwaysPass, Kwargs::new(), Some("patch_es"))
            .unwrap();
        assert!(matches!(
            registry.validate_bindings(),
            Err(RegistryError::UnknownName { .. })
        ));

        registry
            .register_action("patch_es", Noop, Kwargs::new())
            .unwrap();
        assert_eq!(registry.validate_bindings(), Ok(()));
    }
}
