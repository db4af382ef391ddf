//! Environment manifests, portal keys, and bucket naming.
//!
//! Each environment has a JSON manifest `{fourfront, es, ff_env}` stored in
//! the envs bucket under the environment's name, and its portal keys under
//! `<env>/access_key_admin` in the same bucket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use foursight_storage::{list_all_keys, ObjectStore, StorageError};

use crate::connection::{Connection, ConnectionFactory, PortalKeys};
use crate::portal::{PortalConnection, ES_PING_TIMEOUT};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Object (relative to the environment's area) holding its portal keys.
pub const ACCESS_KEY_OBJECT: &str = "access_key_admin";

/// Per-environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentManifest {
    /// Portal base URL.
    pub fourfront: String,
    /// Search cluster URL.
    pub es: String,
    pub ff_env: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("no environment manifest for '{env}'")]
    ManifestMissing { env: String },

    #[error("environment manifest for '{env}' is malformed: {message}")]
    ManifestMalformed { env: String, message: String },

    #[error("no portal keys for '{env}'")]
    KeysMissing { env: String },

    #[error("portal keys for '{env}' are malformed: {message}")]
    KeysMalformed { env: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Deployment stage of a results bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Prod,
}

/// The bucket suffixes foursight provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketSuffix {
    Dev(String),
    Prod(String),
    TestS3,
    UnitTestEnvs,
    Runs,
    Envs,
}

impl BucketSuffix {
    fn render(&self) -> String {
        match self {
            BucketSuffix::Dev(env) => format!("dev-{env}"),
            BucketSuffix::Prod(env) => format!("prod-{env}"),
            BucketSuffix::TestS3 => "test-s3".to_string(),
            BucketSuffix::UnitTestEnvs => "unit-test-envs".to_string(),
            BucketSuffix::Runs => "runs".to_string(),
            BucketSuffix::Envs => "envs".to_string(),
        }
    }
}

/// Computes `<prefix>-<suffix>` bucket names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
    prefix: String,
    region: String,
}

impl BucketNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        BucketNames {
            prefix: prefix.into(),
            region: DEFAULT_REGION.to_string(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn bucket(&self, suffix: &BucketSuffix) -> String {
        format!("{}-{}", self.prefix, suffix.render())
    }

    /// Where check and action results for `env` live.
    pub fn results(&self, stage: Stage, env: &str) -> String {
        let suffix = match stage {
            Stage::Dev => BucketSuffix::Dev(env.to_string()),
            Stage::Prod => BucketSuffix::Prod(env.to_string()),
        };
        self.bucket(&suffix)
    }

    pub fn envs(&self) -> String {
        self.bucket(&BucketSuffix::Envs)
    }

    pub fn runs(&self) -> String {
        self.bucket(&BucketSuffix::Runs)
    }
}

/// Read and decode the manifest for `env`.
pub async fn load_manifest(
    envs: &dyn ObjectStore,
    env: &str,
) -> Result<EnvironmentManifest, EnvironmentError> {
    let body = envs
        .get_object(env)
        .await?
        .ok_or_else(|| EnvironmentError::ManifestMissing {
            env: env.to_string(),
        })?;
    serde_json::from_slice(&body).map_err(|e| EnvironmentError::ManifestMalformed {
        env: env.to_string(),
        message: e.to_string(),
    })
}

/// Read and decode the portal keys for `env`.
pub async fn load_portal_keys(
    envs: &dyn ObjectStore,
    env: &str,
) -> Result<PortalKeys, EnvironmentError> {
    let key = format!("{env}/{ACCESS_KEY_OBJECT}");
    let body = envs
        .get_object(&key)
        .await?
        .ok_or_else(|| EnvironmentError::KeysMissing {
            env: env.to_string(),
        })?;
    serde_json::from_slice(&body).map_err(|e| EnvironmentError::KeysMalformed {
        env: env.to_string(),
        message: e.to_string(),
    })
}

/// Names of every environment with a manifest, sorted.
pub async fn list_environments(envs: &dyn ObjectStore) -> Result<Vec<String>, StorageError> {
    let keys = list_all_keys(envs, "").await?;
    Ok(keys.into_iter().filter(|k| !k.contains('/')).collect())
}

/// Builds a [`PortalConnection`] from the manifest and keys in the envs
/// bucket, fresh for every dispatch.
pub struct ManifestConnectionFactory {
    envs: Arc<dyn ObjectStore>,
    es_timeout: Duration,
}

impl ManifestConnectionFactory {
    pub fn new(envs: Arc<dyn ObjectStore>) -> Self {
        ManifestConnectionFactory {
            envs,
            es_timeout: ES_PING_TIMEOUT,
        }
    }

    pub fn with_es_timeout(mut self, timeout: Duration) -> Self {
        self.es_timeout = timeout;
        self
    }
}

#[async_trait]
impl ConnectionFactory for ManifestConnectionFactory {
    async fn connect(&self, env: &str) -> Result<Arc<dyn Connection>, EnvironmentError> {
        let manifest = load_manifest(self.envs.as_ref(), env).await?;
        let keys = load_portal_keys(self.envs.as_ref(), env).await?;
        let connection = PortalConnection::new(env, manifest, keys, self.envs.clone())
            .with_es_timeout(self.es_timeout);
        Ok(Arc::new(connection))
    }
}
