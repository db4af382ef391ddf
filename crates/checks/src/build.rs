//! Start a build of the product's build project.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use foursight_core::{CheckHandler, CheckResult, CheckStatus, HandlerError, Kwargs, RunContext};

use crate::clients::BuildService;

pub const CHECK_NAME: &str = "trigger_build";

pub fn defaults() -> Kwargs {
    let mut kwargs = Kwargs::new();
    kwargs.insert("build_name".into(), json!(""));
    kwargs
}

pub struct TriggerBuild {
    builds: Arc<dyn BuildService>,
}

impl TriggerBuild {
    pub fn new(builds: Arc<dyn BuildService>) -> Self {
        TriggerBuild { builds }
    }
}

#[async_trait]
impl CheckHandler for TriggerBuild {
    async fn check(
        &self,
        _ctx: &RunContext,
        kwargs: &Kwargs,
        result: &mut CheckResult,
    ) -> Result<(), HandlerError> {
        result.description = "Trigger a build of the product".into();
        let requested = kwargs
            .get("build_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty());

        let projects = match self.builds.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = "Could not list build projects".into();
                result.full_output = json!({ "error": e.to_string() });
                return Ok(());
            }
        };

        let project = match (requested, projects.as_slice()) {
            (Some(name), _) if projects.iter().any(|p| p == name) => name.to_string(),
            (Some(name), _) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = format!("No build project named {name}");
                result.full_output = json!({ "projects": projects });
                return Ok(());
            }
            (None, [only]) => only.clone(),
            (None, []) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = "No build projects found".into();
                return Ok(());
            }
            (None, _) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = format!(
                    "Several build projects found; pass build_name as one of: {}",
                    projects.join(", ")
                );
                result.full_output = json!({ "projects": projects });
                return Ok(());
            }
        };

        match self.builds.start_build(&project).await {
            Ok(build_id) => {
                result.status = Some(CheckStatus::Pass);
                result.summary = format!("Triggered build of {project}");
                result.full_output = json!({ "project": project, "build_id": build_id });
            }
            Err(e) => {
                result.status = Some(CheckStatus::Fail);
                result.summary = format!("Could not start a build of {project}");
                result.full_output = json!({ "error": e.to_string() });
            }
        }
        Ok(())
    }
}
