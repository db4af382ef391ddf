//! The per-environment capability set handed to every handler.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use foursight_storage::StorageError;

use crate::environment::EnvironmentError;

/// Portal credentials for one environment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalKeys {
    pub key: String,
    pub secret: String,
    pub server: String,
}

impl fmt::Debug for PortalKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalKeys")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Errors surfaced by [`Connection`] capabilities.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The remote answered with a non-success status.
    #[error("{method} {path} returned status {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    /// The request never produced a response.
    #[error("{method} {path} failed: {message}")]
    Transport {
        method: &'static str,
        path: String,
        message: String,
    },

    /// The response body was not what the caller expected.
    #[error("could not decode response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ConnectionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectionError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything a handler may touch in its environment.
///
/// One connection is built per dispatched unit and dropped afterwards.
/// Production uses [`PortalConnection`](crate::portal::PortalConnection);
/// tests use [`StubConnection`](crate::testing::StubConnection).
#[async_trait]
pub trait Connection: Send + Sync {
    /// Environment name, e.g. `"mastertest"`.
    fn ff_env(&self) -> &str;

    fn ff_keys(&self) -> &PortalKeys;

    /// Base URL of the environment's search cluster.
    fn es_url(&self) -> &str;

    /// Whether the search cluster answers within a short budget. Never fails;
    /// any error is `false`.
    async fn test_es_connection(&self) -> bool;

    async fn portal_get(&self, path: &str) -> Result<Value, ConnectionError>;

    async fn portal_post(&self, path: &str, body: &Value) -> Result<Value, ConnectionError>;

    async fn portal_patch(&self, path: &str, body: &Value) -> Result<Value, ConnectionError>;

    /// Run a portal search, e.g. `"type=AccessKey&user.uuid=..."`, and return
    /// the matching items. No matches is an empty list, not an error.
    async fn search(&self, query: &str) -> Result<Vec<Value>, ConnectionError>;

    /// Write an object in this environment's private storage area.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ConnectionError>;

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError>;
}

/// Builds the connection for a dispatched unit.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn connect(&self, env: &str) -> Result<Arc<dyn Connection>, EnvironmentError>;
}

/// Hands out the same connection for every environment.
pub struct StaticConnectionFactory {
    connection: Arc<dyn Connection>,
}

impl StaticConnectionFactory {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        StaticConnectionFactory { connection }
    }
}

#[async_trait]
impl ConnectionFactory for StaticConnectionFactory {
    async fn connect(&self, _env: &str) -> Result<Arc<dyn Connection>, EnvironmentError> {
        Ok(self.connection.clone())
    }
}
