//! foursight-checks: the built-in checks.
//!
//! Each module exports its handler(s), name constants, and a `defaults()`
//! parameter set. [`register_builtin`] registers every check whose clients
//! are available.

pub mod build;
pub mod clients;
pub mod credentials;
pub mod ecs;
pub mod indices;
pub mod rollback;

use std::sync::Arc;

use foursight_core::{Kwargs, Registry, RegistryError};

pub use clients::{
    BuildService, CloudError, ContainerRegistry, ContainerService, Deployment, HttpSearchAdmin,
    ImageDetail, SearchAdmin, ServiceSummary,
};

/// Cloud clients available to this process. Checks whose clients are
/// missing are not registered.
#[derive(Clone, Default)]
pub struct CloudClients {
    pub containers: Option<Arc<dyn ContainerService>>,
    pub registry: Option<Arc<dyn ContainerRegistry>>,
    pub builds: Option<Arc<dyn BuildService>>,
    pub search: Option<Arc<dyn SearchAdmin>>,
}

impl CloudClients {
    /// Only the search cluster client, which needs no cloud credentials.
    pub fn search_only() -> Self {
        CloudClients {
            search: Some(Arc::new(HttpSearchAdmin::new())),
            ..Self::default()
        }
    }
}

/// Register the credential check and its rotation action, plus every check
/// the given clients support, then verify action bindings.
pub fn register_builtin(registry: &mut Registry, clients: CloudClients) -> Result<(), RegistryError> {
    registry.register_check(
        credentials::CHECK_NAME,
        credentials::AccessKeyStatus,
        credentials::defaults(),
        Some(credentials::ACTION_NAME),
    )?;
    registry.register_action(
        credentials::ACTION_NAME,
        credentials::RefreshAccessKeys,
        credentials::defaults(),
    )?;

    if let Some(containers) = &clients.containers {
        registry.register_check(
            ecs::CHECK_NAME,
            ecs::EcsStatus::new(containers.clone()),
            ecs::defaults(),
            None,
        )?;
        if let Some(images) = &clients.registry {
            registry.register_check(
                rollback::CHECK_NAME,
                rollback::DeploymentRollback::new(containers.clone(), images.clone()),
                rollback::defaults(),
                None,
            )?;
        }
    }
    if let Some(builds) = clients.builds {
        registry.register_check(
            build::CHECK_NAME,
            build::TriggerBuild::new(builds),
            build::defaults(),
            None,
        )?;
    }
    if let Some(search) = clients.search {
        registry.register_check(
            indices::CHECK_NAME,
            indices::WipeBuildIndices::new(search),
            indices::defaults(),
            None,
        )?;
    }

    registry.validate_bindings()
}

/// Parameters recognized by a registered check, for display.
pub fn describe(registry: &Registry, name: &str) -> Result<Kwargs, RegistryError> {
    Ok(registry.get(name)?.defaults.clone())
}
