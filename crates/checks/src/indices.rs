//! Wipe the numbered indices a test build leaves behind on a search cluster.
//!
//! Only indices whose name starts with a digit are touched. Each delete is
//! tried up to [`DELETE_ATTEMPTS`] times.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use foursight_core::{CheckHandler, CheckResult, CheckStatus, HandlerError, Kwargs, RunContext};

use crate::clients::{CloudError, SearchAdmin};

pub const CHECK_NAME: &str = "wipe_build_indices";

pub const DELETE_ATTEMPTS: u32 = 3;

pub fn defaults() -> Kwargs {
    let mut kwargs = Kwargs::new();
    kwargs.insert("url".into(), json!(""));
    kwargs
}

/// Build indices are named `^[0-9]...`.
pub fn is_build_index(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_digit())
}

async fn delete_with_retry(
    admin: &dyn SearchAdmin,
    url: &str,
    index: &str,
) -> Result<bool, CloudError> {
    let mut attempt = 1;
    loop {
        match admin.delete_index(url, index).await {
            Ok(acknowledged) => return Ok(acknowledged),
            Err(e) if attempt < DELETE_ATTEMPTS => {
                tracing::warn!(index, attempt, error = %e, "retrying index delete");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct WipeBuildIndices {
    admin: Arc<dyn SearchAdmin>,
}

impl WipeBuildIndices {
    pub fn new(admin: Arc<dyn SearchAdmin>) -> Self {
        WipeBuildIndices { admin }
    }
}

#[async_trait]
impl CheckHandler for WipeBuildIndices {
    async fn check(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError> {
        result.description = "Delete build indices from a search cluster".into();
        let url = kwargs
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ctx.connection().es_url())
            .to_string();

        let indices = match self.admin.list_indices(&url).await {
            Ok(indices) => indices,
            Err(e) => {
                result.status = Some(CheckStatus::Warn);
                result.summary = format!("Could not list indices on {url}");
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };

        let mut acknowledgements = serde_json::Map::new();
        let mut errors = serde_json::Map::new();
        for index in indices.iter().filter(|i| is_build_index(i)) {
            match delete_with_retry(self.admin.as_ref(), &url, index).await {
                Ok(acknowledged) => {
                    acknowledgements.insert(index.clone(), json!(acknowledged));
                }
                Err(e) => {
                    acknowledgements.insert(index.clone(), json!(false));
                    errors.insert(index.clone(), json!(e.to_string()));
                }
            }
        }

        let failed: Vec<&String> = acknowledgements
            .iter()
            .filter(|(_, ack)| **ack != Value::Bool(true))
            .map(|(index, _)| index)
            .collect();
        if failed.is_empty() {
            result.status = Some(CheckStatus::Pass);
            result.summary = format!("Wiped {} index(es) on {url}", acknowledgements.len());
        } else {
            result.status = Some(CheckStatus::Fail);
            result.summary = format!(
                "Could not delete {} index(es) on {url}",
                failed.len()
            );
        }
        result.brief_output = json!({ "deleted": acknowledgements.len() - failed.len() });
        result.full_output = if errors.is_empty() {
            Value::Object(acknowledgements)
        } else {
            json!({ "acknowledgements": acknowledgements, "errors": errors })
        };
        Ok(())
    }
}
