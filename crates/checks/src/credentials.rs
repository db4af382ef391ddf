//! Portal access-key expiry check and the rotation action bound to it.
//!
//! Access keys expire 90 days after creation. The check warns three weeks
//! ahead and fails one week ahead; the action mints a new key, stores it as
//! the environment's admin key, and marks every older key deleted.

use async_trait::async_trait;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};

use foursight_core::environment::ACCESS_KEY_OBJECT;
use foursight_core::{
    parse_timestamp, ActionHandler, ActionResult, ActionStatus, CheckHandler, CheckResult,
    CheckStatus, HandlerError, Kwargs, PortalKeys, RunContext,
};

pub const CHECK_NAME: &str = "access_key_status";
pub const ACTION_NAME: &str = "refresh_access_keys";

pub const DEFAULT_ADMIN_EMAIL: &str = "foursight.app@example.org";

const KEY_LIFETIME_DAYS: i64 = 90;
const WARN_DAYS: i64 = 21;
const FAIL_DAYS: i64 = 7;

/// Parameters recognized by both the check and the action.
pub fn defaults() -> Kwargs {
    let mut kwargs = Kwargs::new();
    kwargs.insert("email".into(), json!(DEFAULT_ADMIN_EMAIL));
    kwargs
}

fn email(kwargs: &Kwargs) -> &str {
    kwargs
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ADMIN_EMAIL)
}

fn key_query(user_uuid: &str) -> String {
    format!("type=AccessKey&user.uuid={user_uuid}")
}

/// A live access key and when it expires.
#[derive(Debug, Clone)]
struct KeyExpiry {
    access_key_id: String,
    created: OffsetDateTime,
    expires: OffsetDateTime,
}

fn key_expiry(item: &Value) -> Option<KeyExpiry> {
    if item.get("status").and_then(Value::as_str) == Some("deleted") {
        return None;
    }
    let created = parse_timestamp(item.get("date_created")?.as_str()?, None)?;
    Some(KeyExpiry {
        access_key_id: item
            .get("access_key_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created,
        expires: created + Duration::days(KEY_LIFETIME_DAYS),
    })
}

/// Classify an expiry relative to `now`.
pub fn expiry_status(now: OffsetDateTime, expires: OffsetDateTime) -> (CheckStatus, String) {
    if now > expires - Duration::days(FAIL_DAYS) {
        (
            CheckStatus::Fail,
            format!("Admin access key expires in less than {FAIL_DAYS} days"),
        )
    } else if now > expires - Duration::days(WARN_DAYS) {
        (
            CheckStatus::Warn,
            format!("Admin access key expires in less than {WARN_DAYS} days"),
        )
    } else {
        (
            CheckStatus::Pass,
            "Admin access key is not close to expiring".to_string(),
        )
    }
}

// ──────────────────────────────────────────────
// Check
// ──────────────────────────────────────────────

pub struct AccessKeyStatus;

#[async_trait]
impl CheckHandler for AccessKeyStatus {
    async fn check(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError> {
        result.description = "Expiry of the portal admin access key".into();
        let conn = ctx.connection();
        let email = email(kwargs);

        let user = match conn.portal_get(&format!("/users/{email}")).await {
            Ok(user) => user,
            Err(e) => {
                result.status = Some(CheckStatus::Warn);
                result.summary = format!("Could not look up user {email}");
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };
        let Some(user_uuid) = user.get("uuid").and_then(Value::as_str) else {
            result.status = Some(CheckStatus::Warn);
            result.summary = format!("User {email} has no uuid");
            return Ok(());
        };

        let items = match conn.search(&key_query(user_uuid)).await {
            Ok(items) => items,
            Err(e) => {
                result.status = Some(CheckStatus::Warn);
                result.summary = "Could not search access keys".into();
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };

        // The newest key is the one in use.
        let Some(current) = items.iter().filter_map(key_expiry).max_by_key(|k| k.created) else {
            result.status = Some(CheckStatus::Fail);
            result.summary = format!("No access keys found for {email}");
            return Ok(());
        };

        let (status, summary) = expiry_status(ctx.now(), current.expires);
        result.status = Some(status);
        result.summary = summary;
        result.brief_output = json!({ "expires": current.expires.to_string() });
        result.full_output = json!({
            "access_key_id": current.access_key_id,
            "created": current.created.to_string(),
            "expires": current.expires.to_string(),
        });
        if status != CheckStatus::Pass {
            result.action = Some(ACTION_NAME.to_string());
            result.allow_action = true;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Action
// ──────────────────────────────────────────────

/// Extract the new key pair from a key-creation response. The portal
/// answers either with the pair at top level or nested in `@graph[0]`.
fn new_key_pair(response: &Value) -> Option<(String, String)> {
    let pair = |v: &Value| {
        let id = v.get("access_key_id")?.as_str()?.to_string();
        let secret = v.get("secret_access_key")?.as_str()?.to_string();
        Some((id, secret))
    };
    pair(response).or_else(|| pair(response.get("@graph")?.get(0)?))
}

pub struct RefreshAccessKeys;

#[async_trait]
impl ActionHandler for RefreshAccessKeys {
    async fn act(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut ActionResult,
    ) -> Result<(), HandlerError> {
        result.description = "Rotate the portal admin access key".into();
        let conn = ctx.connection();
        let email = email(kwargs);

        let user = conn.portal_get(&format!("/users/{email}")).await?;
        let user_uuid = user
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::msg(format!("user {email} has no uuid")))?
            .to_string();
        let previous = conn.search(&key_query(&user_uuid)).await?;

        let response = conn
            .portal_post("/access-keys/", &json!({ "user": user_uuid }))
            .await?;
        let (access_key_id, secret) = new_key_pair(&response).ok_or_else(|| {
            HandlerError::msg(format!("unrecognized access key response: {response}"))
        })?;

        let keys = PortalKeys {
            key: access_key_id.clone(),
            secret,
            server: conn.ff_keys().server.clone(),
        };
        conn.put_object(ACCESS_KEY_OBJECT, serde_json::to_vec(&keys)?)
            .await?;

        let mut deleted = Vec::new();
        for item in &previous {
            let Some(id) = item.get("access_key_id").and_then(Value::as_str) else {
                continue;
            };
            if id == access_key_id || item.get("status").and_then(Value::as_str) == Some("deleted")
            {
                continue;
            }
            let path = item
                .get("@id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("/access-keys/{id}/"));
            conn.portal_patch(&path, &json!({ "status": "deleted" }))
                .await?;
            deleted.push(id.to_string());
        }

        tracing::info!(env = conn.ff_env(), new_key = %access_key_id, deleted = deleted.len(), "rotated admin access key");
        result.status = Some(ActionStatus::Done);
        result.output = json!({ "new_key": access_key_id, "deleted": deleted });
        Ok(())
    }
}
