//! Container-service status: which services run in this product's clusters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use foursight_core::{CheckHandler, CheckResult, CheckStatus, HandlerError, Kwargs, RunContext};

use crate::clients::ContainerService;

pub const CHECK_NAME: &str = "ecs_status";

pub const DEFAULT_PRODUCT: &str = "fourfront";

pub fn defaults() -> Kwargs {
    let mut kwargs = Kwargs::new();
    kwargs.insert("product".into(), json!(DEFAULT_PRODUCT));
    kwargs
}

/// Clusters whose ARN mentions `product`.
pub(crate) async fn product_clusters(
    containers: &dyn ContainerService,
    product: &str,
) -> Result<Vec<String>, crate::clients::CloudError> {
    Ok(containers
        .list_clusters()
        .await?
        .into_iter()
        .filter(|arn| arn.contains(product))
        .collect())
}

pub struct EcsStatus {
    containers: Arc<dyn ContainerService>,
}

impl EcsStatus {
    pub fn new(containers: Arc<dyn ContainerService>) -> Self {
        EcsStatus { containers }
    }
}

#[async_trait]
impl CheckHandler for EcsStatus {
    async fn check(
        &self,
        _ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError> {
        result.description = "Services running in the product's container clusters".into();
        let product = kwargs
            .get("product")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PRODUCT);

        let clusters = match product_clusters(self.containers.as_ref(), product).await {
            Ok(clusters) => clusters,
            Err(e) => {
                result.status = Some(CheckStatus::Warn);
                result.summary = "Could not list container clusters".into();
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };
        if clusters.is_empty() {
            result.status = Some(CheckStatus::Warn);
            result.summary = format!("No clusters found for {product}");
            return Ok(());
        }

        let mut full = serde_json::Map::new();
        let mut brief = serde_json::Map::new();
        for arn in &clusters {
            let services = match self.containers.list_services(arn).await {
                Ok(services) => services,
                Err(e) => {
                    result.status = Some(CheckStatus::Warn);
                    result.summary = format!("Could not list services in {arn}");
                    result.full_output = json!({ "error": e.to_string() });
                    return Ok(());
                }
            };
            brief.insert(arn.clone(), json!(services.len()));
            full.insert(arn.clone(), serde_json::to_value(&services)?);
        }

        result.status = Some(CheckStatus::Pass);
        result.summary = format!("Found {} cluster(s) for {product}", clusters.len());
        result.brief_output = Value::Object(brief);
        result.full_output = Value::Object(full);
        Ok(())
    }
}
