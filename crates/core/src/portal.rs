//! HTTP-backed [`Connection`] for a live environment.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` so portal
//! calls never block the runtime. Requests authenticate with HTTP basic
//! auth built from the environment's portal keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

use foursight_storage::ObjectStore;

use crate::connection::{Connection, ConnectionError, PortalKeys};
use crate::environment::EnvironmentManifest;

/// Budget for [`Connection::test_es_connection`].
pub const ES_PING_TIMEOUT: Duration = Duration::from_secs(5);

const PORTAL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

pub struct PortalConnection {
    env: String,
    manifest: EnvironmentManifest,
    keys: PortalKeys,
    objects: Arc<dyn ObjectStore>,
    es_timeout: Duration,
}

impl PortalConnection {
    /// `objects` is the envs bucket; this connection reads and writes only
    /// below `<env>/` in it.
    pub fn new(
        env: impl Into<String>,
        manifest: EnvironmentManifest,
        keys: PortalKeys,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        PortalConnection {
            env: env.into(),
            manifest,
            keys,
            objects,
            es_timeout: ES_PING_TIMEOUT,
        }
    }

    pub fn with_es_timeout(mut self, timeout: Duration) -> Self {
        self.es_timeout = timeout;
        self
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}/{}", self.env, key.trim_start_matches('/'))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.manifest.fourfront.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn auth_header(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.keys.key, self.keys.secret));
        format!("Basic {token}")
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ConnectionError> {
        let url = self.url(path);
        let auth = self.auth_header();
        let path = path.to_string();
        let body = body.cloned();

        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(PORTAL_TIMEOUT))
                .build();
            let agent = ureq::Agent::new_with_config(config);

            let response = match (method, body) {
                (Method::Get, _) => agent
                    .get(&url)
                    .header("Authorization", &auth)
                    .header("Accept", "application/json")
                    .call(),
                (Method::Post, body) => agent
                    .post(&url)
                    .header("Authorization", &auth)
                    .header("Accept", "application/json")
                    .send_json(body.unwrap_or(Value::Null)),
                (Method::Patch, body) => agent
                    .patch(&url)
                    .header("Authorization", &auth)
                    .header("Accept", "application/json")
                    .send_json(body.unwrap_or(Value::Null)),
            };

            let response = response.map_err(|e| match e {
                ureq::Error::StatusCode(status) => ConnectionError::Status {
                    method: method.as_str(),
                    path: path.clone(),
                    status,
                },
                other => ConnectionError::Transport {
                    method: method.as_str(),
                    path: path.clone(),
                    message: other.to_string(),
                },
            })?;

            response
                .into_body()
                .read_json::<Value>()
                .map_err(|e| ConnectionError::Decode {
                    path,
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|e| ConnectionError::Transport {
            method: method.as_str(),
            path: "<task>".to_string(),
            message: format!("task join error: {e}"),
        })?
    }
}

#[async_trait]
impl Connection for PortalConnection {
    fn ff_env(&self) -> &str {
        &self.manifest.ff_env
    }

    fn ff_keys(&self) -> &PortalKeys {
        &self.keys
    }

    fn es_url(&self) -> &str {
        &self.manifest.es
    }

    async fn test_es_connection(&self) -> bool {
        let url = self.manifest.es.clone();
        let budget = self.es_timeout;
        let check = tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(budget))
                .build();
            let agent = ureq::Agent::new_with_config(config);
            agent.get(&url).call().is_ok()
        });
        match tokio::time::timeout(budget, check).await {
            Ok(Ok(reachable)) => reachable,
            _ => false,
        }
    }

    async fn portal_get(&self, path: &str) -> Result<Value, ConnectionError> {
        self.request(Method::Get, path, None).await
    }

    async fn portal_post(&self, path: &str, body: &Value) -> Result<Value, ConnectionError> {
        self.request(Method::Post, path, Some(body)).await
    }

    async fn portal_patch(&self, path: &str, body: &Value) -> Result<Value, ConnectionError> {
        self.request(Method::Patch, path, Some(body)).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, ConnectionError> {
        let path = format!("/search/?{query}&format=json&limit=all");
        match self.request(Method::Get, &path, None).await {
            Ok(body) => Ok(body
                .get("@graph")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()),
            // The portal answers an empty search with 404.
            Err(ConnectionError::Status { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ConnectionError> {
        let key = self.object_key(key);
        Ok(self.objects.put_object(&key, body).await?)
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError> {
        let key = self.object_key(key);
        Ok(self.objects.get_object(&key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foursight_storage::MemoryObjectStore;

    fn connection(objects: Arc<MemoryObjectStore>) -> PortalConnection {
        PortalConnection::new(
            "mastertest",
            EnvironmentManifest {
                fourfront: "https://mastertest.example.org/".into(),
                // Nothing listens on the discard port.
                es: "http://127.0.0.1:9".into(),
                ff_env: "fourfront-mastertest".into(),
            },
            PortalKeys {
                key: "KEY".into(),
                secret: "SECRET".into(),
                server: "https://mastertest.example.org".into(),
            },
            objects,
        )
        .with_es_timeout(Duration::from_millis(500))
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let conn = connection(Arc::new(MemoryObjectStore::new()));
        assert_eq!(
            conn.url("/users/admin@example.org"),
            "https://mastertest.example.org/users/admin@example.org"
        );
    }

    #[test]
    fn basic_auth_encodes_key_and_secret() {
        let conn = connection(Arc::new(MemoryObjectStore::new()));
        assert_eq!(conn.auth_header(), format!("Basic {}", BASE64.encode("KEY:SECRET")));
    }

    #[tokio::test]
    async fn objects_are_scoped_to_the_environment() {
        let objects = Arc::new(MemoryObjectStore::new());
        let conn = connection(objects.clone());
        conn.put_object("access_key_admin", b"{}".to_vec()).await.unwrap();
        assert_eq!(objects.keys().await, vec!["mastertest/access_key_admin"]);
        assert_eq!(
            conn.get_object("access_key_admin").await.unwrap(),
            Some(b"{}".to_vec())
        );
    }

    #[tokio::test]
    async fn unreachable_search_cluster_is_false() {
        let conn = connection(Arc::new(MemoryObjectStore::new()));
        assert!(!conn.test_es_connection().await);
    }
}
