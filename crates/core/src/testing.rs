//! In-memory [`Connection`] double for handler tests.
//!
//! Portal routes, search results and search-cluster reachability are
//! scripted up front; every POST and PATCH is recorded so tests can assert
//! on what a handler sent.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::connection::{Connection, ConnectionError, PortalKeys};

/// A write a handler sent to the portal.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct StubState {
    gets: HashMap<String, Value>,
    posts: HashMap<String, Value>,
    searches: HashMap<String, Vec<Value>>,
    requests: Vec<RecordedRequest>,
    objects: BTreeMap<String, Vec<u8>>,
}

pub struct StubConnection {
    ff_env: String,
    keys: PortalKeys,
    es_url: String,
    es_reachable: AtomicBool,
    state: Mutex<StubState>,
}

impl StubConnection {
    pub fn new(ff_env: impl Into<String>) -> Self {
        StubConnection {
            ff_env: ff_env.into(),
            keys: PortalKeys {
                key: "STUBKEY".into(),
                secret: "stub-secret".into(),
                server: "https://portal.invalid".into(),
            },
            es_url: "https://search.invalid".into(),
            es_reachable: AtomicBool::new(true),
            state: Mutex::new(StubState::default()),
        }
    }

    pub fn with_keys(mut self, keys: PortalKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_es_url(mut self, url: impl Into<String>) -> Self {
        self.es_url = url.into();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_es_reachable(&self, reachable: bool) {
        self.es_reachable.store(reachable, Ordering::SeqCst);
    }

    /// Answer `GET path` with `body`. Unscripted GETs return 404.
    pub fn route_get(&self, path: &str, body: Value) {
        self.lock().gets.insert(path.to_string(), body);
    }

    /// Answer `POST path` with `body`. Unscripted POSTs return 404.
    pub fn route_post(&self, path: &str, body: Value) {
        self.lock().posts.insert(path.to_string(), body);
    }

    /// Results for an exact search query. Unscripted queries match nothing.
    pub fn route_search(&self, query: &str, items: Vec<Value>) {
        self.lock().searches.insert(query.to_string(), items);
    }

    /// Every POST and PATCH received, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    fn not_found(method: &'static str, path: &str) -> ConnectionError {
        ConnectionError::Status {
            method,
            path: path.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl Connection for StubConnection {
    fn ff_env(&self) -> &str {
        &self.ff_env
    }

    fn ff_keys(&self) -> &PortalKeys {
        &self.keys
    }

    fn es_url(&self) -> &str {
        &self.es_url
    }

    async fn test_es_connection(&self) -> bool {
        self.es_reachable.load(Ordering::SeqCst)
    }

    async fn portal_get(&self, path: &str) -> Result<Value, ConnectionError> {
        self.lock()
            .gets
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found("GET", path))
    }

    async fn portal_post(&self, path: &str, body: &Value) -> Result<Value, ConnectionError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: "POST",
            path: path.to_string(),
            body: body.clone(),
        });
        state
            .posts
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found("POST", path))
    }

    async fn portal_patch(&self, path: &str, body: &Value) -> Result<Value, ConnectionError> {
        self.lock().requests.push(RecordedRequest {
            method: "PATCH",
            path: path.to_string(),
            body: body.clone(),
        });
        Ok(json!({"status": "success"}))
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>, ConnectionError> {
        Ok(self.lock().searches.get(query).cloned().unwrap_or_default())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ConnectionError> {
        self.lock().objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(self.lock().objects.get(key).cloned())
    }
}
