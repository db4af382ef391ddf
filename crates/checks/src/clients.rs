//! Cloud client interfaces the checks consume.
//!
//! The checks never talk to a cloud SDK directly; they take these traits so
//! tests can hand them fakes. [`HttpSearchAdmin`] is the one concrete client
//! shipped here, speaking the search cluster's REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloudError {
    /// The service answered, but not with what was asked for.
    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },

    /// The service could not be reached.
    #[error("{service} is unreachable: {message}")]
    Unreachable {
        service: &'static str,
        message: String,
    },
}

// ──────────────────────────────────────────────
// Container service
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    /// `PRIMARY` for the deployment being rolled out, `ACTIVE` for the
    /// one it replaces.
    pub status: String,
    /// `IN_PROGRESS`, `COMPLETED` or `FAILED`.
    pub rollout_state: String,
    pub task_definition: String,
}

impl Deployment {
    pub fn is_in_progress(&self) -> bool {
        self.rollout_state == "IN_PROGRESS"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub cluster_arn: String,
    pub service_name: String,
    pub status: String,
    pub running_count: u32,
    pub desired_count: u32,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

#[async_trait]
pub trait ContainerService: Send + Sync {
    /// ARNs of every cluster in the account.
    async fn list_clusters(&self) -> Result<Vec<String>, CloudError>;

    async fn list_services(&self, cluster_arn: &str) -> Result<Vec<ServiceSummary>, CloudError>;
}

// ──────────────────────────────────────────────
// Container registry
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetail {
    pub digest: String,
    pub tags: Vec<String>,
    pub pushed_at: OffsetDateTime,
}

#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Images in `repository`, in no particular order.
    async fn list_images(&self, repository: &str) -> Result<Vec<ImageDetail>, CloudError>;

    /// Point `tag` at the image with `digest`, moving it off whichever
    /// image held it before.
    async fn add_image_tag(
        &self,
        repository: &str,
        digest: &str,
        tag: &str,
    ) -> Result<(), CloudError>;
}

// ──────────────────────────────────────────────
// Build service
// ──────────────────────────────────────────────

#[async_trait]
pub trait BuildService: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<String>, CloudError>;

    /// Start a build of `project`; returns the build id.
    async fn start_build(&self, project: &str) -> Result<String, CloudError>;
}

// ──────────────────────────────────────────────
// Search cluster administration
// ──────────────────────────────────────────────

#[async_trait]
pub trait SearchAdmin: Send + Sync {
    async fn list_indices(&self, url: &str) -> Result<Vec<String>, CloudError>;

    /// Delete one index; returns the cluster's acknowledgement.
    async fn delete_index(&self, url: &str, index: &str) -> Result<bool, CloudError>;
}

/// Per-request budget for [`HttpSearchAdmin`]. A blocking request cannot be
/// cancelled by the runner's watchdog, so every request carries its own.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Delete => "DELETE",
        }
    }
}

/// [`SearchAdmin`] over the cluster's REST API.
///
/// Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct HttpSearchAdmin {
    timeout: Duration,
}

impl Default for HttpSearchAdmin {
    fn default() -> Self {
        HttpSearchAdmin {
            timeout: SEARCH_TIMEOUT,
        }
    }
}

impl HttpSearchAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn join(base: &str, path: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }

    async fn call(&self, method: Method, url: String) -> Result<Value, CloudError> {
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent = ureq::Agent::new_with_config(config);
            let response = match method {
                Method::Get => agent.get(&url).call(),
                Method::Delete => agent.delete(&url).call(),
            };
            let response = response.map_err(|e| match e {
                ureq::Error::StatusCode(status) => CloudError::Request {
                    service: "search",
                    message: format!("{} {url} returned status {status}", method.as_str()),
                },
                other => CloudError::Unreachable {
                    service: "search",
                    message: other.to_string(),
                },
            })?;
            response
                .into_body()
                .read_json::<Value>()
                .map_err(|e| CloudError::Request {
                    service: "search",
                    message: format!("failed to parse response as JSON: {e}"),
                })
        })
        .await
        .map_err(|e| CloudError::Unreachable {
            service: "search",
            message: format!("task join error: {e}"),
        })?
    }
}

#[async_trait]
impl SearchAdmin for HttpSearchAdmin {
    async fn list_indices(&self, url: &str) -> Result<Vec<String>, CloudError> {
        let body = self
            .call(Method::Get, Self::join(url, "_cat/indices?format=json")).await?;
        Ok(body
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("index").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_index(&self, url: &str, index: &str) -> Result<bool, CloudError> {
        let body = self.call(Method::Delete, Self::join(url, index)).await?;
        Ok(body
            .get("acknowledged")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_on_a_single_slash() {
        assert_eq!(
            HttpSearchAdmin::join("https://search.example.org:443/", "1abc"),
            "https://search.example.org:443/1abc"
        );
    }

    #[tokio::test]
    async fn unreachable_cluster_is_reported() {
        let err = HttpSearchAdmin::new()
            .list_indices("http://127.0.0.1:9")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Unreachable { .. }));
    }

    /// Serve one canned response on a local port and hand back the
    /// request line the client sent.
    fn one_shot_server(response: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                    break;
                }
            }
            let mut stream = stream;
            stream.write_all(response.as_bytes()).unwrap();
            request_line
        });
        (url, handle)
    }

    #[tokio::test]
    async fn delete_sends_the_delete_method() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 404 Not Found\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
        );
        let err = HttpSearchAdmin::new()
            .delete_index(&url, "1abc")
            .await
            .unwrap_err();
        assert!(
            matches!(&err, CloudError::Request { message, .. } if message.starts_with("DELETE ")),
            "{err:?}"
        );
        assert!(server.join().unwrap().starts_with("DELETE /1abc "));
    }

    #[tokio::test]
    async fn silent_cluster_times_out() {
        // Accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let started = std::time::Instant::now();
        let err = HttpSearchAdmin::new()
            .with_timeout(Duration::from_millis(200))
            .list_indices(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Unreachable { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(listener);
    }

    #[test]
    fn only_in_progress_rollouts_are_active() {
        let deployment = Deployment {
            id: "ecs-svc/1".into(),
            status: "PRIMARY".into(),
            rollout_state: "COMPLETED".into(),
            task_definition: "app:7".into(),
        };
        assert!(!deployment.is_in_progress());
    }
}
