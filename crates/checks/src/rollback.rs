//! Automatic image rollback for a deployment that will not settle.
//!
//! While a deployment is rolling out in the product's cluster and the search
//! cluster answers, each run records WARN. When the previous result was WARN
//! and the result closest to half an hour before it was WARN too, the image
//! tag is moved back to the image pushed before the one it currently marks,
//! and the run records PASS.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use time::Duration;

use foursight_core::{
    parse_uuid, CheckHandler, CheckResult, CheckStatus, HandlerError, Kwargs, RunContext,
};

use crate::clients::{ContainerRegistry, ContainerService, ImageDetail};
use crate::ecs::{product_clusters, DEFAULT_PRODUCT};

pub const CHECK_NAME: &str = "deployment_rollback";

/// Two WARN results at least this far apart trigger a rollback.
pub const ESCALATION_WINDOW_MINS: i64 = 30;

pub const DEFAULT_REPOSITORY: &str = "fourfront";
pub const DEFAULT_IMAGE_TAG: &str = "latest";

pub fn defaults() -> Kwargs {
    let mut kwargs = Kwargs::new();
    kwargs.insert("product".into(), json!(DEFAULT_PRODUCT));
    kwargs.insert("repository".into(), json!(DEFAULT_REPOSITORY));
    kwargs.insert("image_tag".into(), json!(DEFAULT_IMAGE_TAG));
    kwargs
}

fn param<'a>(kwargs: &'a Kwargs, key: &str, default: &'a str) -> &'a str {
    kwargs.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// The image to move `tag` onto: the one pushed immediately before the image
/// currently carrying it.
pub fn rollback_target<'a>(images: &'a [ImageDetail], tag: &str) -> Option<&'a ImageDetail> {
    let mut newest_first: Vec<&ImageDetail> = images.iter().collect();
    newest_first.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
    let current = newest_first
        .iter()
        .position(|image| image.tags.iter().any(|t| t == tag))?;
    newest_first.get(current + 1).copied()
}

pub struct DeploymentRollback {
    containers: Arc<dyn ContainerService>,
    registry: Arc<dyn ContainerRegistry>,
}

impl DeploymentRollback {
    pub fn new(containers: Arc<dyn ContainerService>, registry: Arc<dyn ContainerRegistry>) -> Self {
        DeploymentRollback {
            containers,
            registry,
        }
    }

    async fn deployment_active(&self, product: &str) -> Result<bool, crate::clients::CloudError> {
        for arn in product_clusters(self.containers.as_ref(), product).await? {
            let services = self.containers.list_services(&arn).await?;
            if services
                .iter()
                .flat_map(|s| &s.deployments)
                .any(|d| d.is_in_progress())
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the stored history already holds two WARN results at least
    /// the escalation window apart, the newer one being the latest result.
    async fn escalated(&self, result: &CheckResult) -> Result<bool, HandlerError> {
        let latest = result.get_latest_result().await?;
        if latest.status != CheckStatus::Warn {
            return Ok(false);
        }
        let Some(latest_at) = parse_uuid(&latest.uuid) else {
            return Ok(false);
        };
        let window = Duration::minutes(ESCALATION_WINDOW_MINS);
        let Some(earlier) = result.get_closest_result_to(latest_at - window).await? else {
            return Ok(false);
        };
        let Some(earlier_at) = parse_uuid(&earlier.uuid) else {
            return Ok(false);
        };
        Ok(earlier.uuid != latest.uuid
            && earlier.status == CheckStatus::Warn
            && latest_at - earlier_at >= window)
    }
}

#[async_trait]
impl CheckHandler for DeploymentRollback {
    async fn check(
        &self,
        ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError> {
        result.description = "Roll back images of deployments that do not settle".into();
        let product = param(kwargs, "product", DEFAULT_PRODUCT);
        let repository = param(kwargs, "repository", DEFAULT_REPOSITORY);
        let tag = param(kwargs, "image_tag", DEFAULT_IMAGE_TAG);

        let active = match self.deployment_active(product).await {
            Ok(active) => active,
            Err(e) => {
                result.status = Some(CheckStatus::Warn);
                result.summary = "Could not inspect deployments".into();
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };
        if !active {
            result.status = Some(CheckStatus::Pass);
            result.summary = "No active deployment".into();
            return Ok(());
        }
        if !ctx.connection().test_es_connection().await {
            result.status = Some(CheckStatus::Fail);
            result.summary = "Deployment active but the search cluster is unreachable".into();
            return Ok(());
        }

        if !self.escalated(result).await? {
            result.status = Some(CheckStatus::Warn);
            result.summary = "Deployment in progress; will roll back if it persists".into();
            return Ok(());
        }

        let images = match self.registry.list_images(repository).await {
            Ok(images) => images,
            Err(e) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = format!("Could not list images in {repository}");
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };
        let Some(target) = rollback_target(&images, tag) else {
            result.status = Some(CheckStatus::Fail);
            result.summary = format!("No image to roll '{tag}' back to in {repository}");
            return Ok(());
        };

        match self
            .registry
            .add_image_tag(repository, &target.digest, tag)
            .await
        {
            Ok(()) => {
                tracing::warn!(repository, tag, digest = %target.digest, "rolled back image tag");
                result.status = Some(CheckStatus::Pass);
                result.summary = format!("Rolled '{tag}' back to {}", target.digest);
                result.full_output = json!({ "repository": repository, "tag": tag, "digest": target.digest });
            }
            Err(e) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = format!("Could not move '{tag}' in {repository}");
                result.full_output = json!({ "error": e.to_string() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn image(digest: &str, tags: &[&str], pushed_at: time::OffsetDateTime) -> ImageDetail {
        ImageDetail {
            digest: digest.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            pushed_at,
        }
    }

    #[test]
    fn target_is_the_image_pushed_before_the_tagged_one() {
        let images = vec![
            image("sha256:old", &[], datetime!(2024-01-01 00:00 UTC)),
            image("sha256:new", &["latest"], datetime!(2024-01-03 00:00 UTC)),
            image("sha256:mid", &["v2"], datetime!(2024-01-02 00:00 UTC)),
        ];
        assert_eq!(rollback_target(&images, "latest").unwrap().digest, "sha256:mid");
        assert_eq!(rollback_target(&images, "v2").unwrap().digest, "sha256:old");
    }

    #[test]
    fn nothing_to_roll_back_to() {
        let images = vec![image("sha256:only", &["latest"], datetime!(2024-01-01 00:00 UTC))];
        assert!(rollback_target(&images, "latest").is_none());
        assert!(rollback_target(&images, "missing").is_none());
    }
}
