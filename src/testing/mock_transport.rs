//! Canned HTTP responses for the trading API

use crate::api::transport::{ApiTransport, HttpMethod, HttpRequest, HttpResponse};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use url::Position;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Routes are keyed by method plus path and query, e.g. `GET /v1/api/assets`.
/// Unrouted requests get a 404 with an empty body.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    failures_left: AtomicU32,
}

fn route_key(method: HttpMethod, path_and_query: &str) -> String {
    format!("{} {}", method, path_and_query)
}

fn request_path(request: &HttpRequest) -> &str {
    &request.url[Position::BeforePath..]
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: HttpMethod, path_and_query: &str, status: u16, body: Value) {
        lock(&self.routes).insert(route_key(method, path_and_query), HttpResponse { status, body });
    }

    /// The next `n` requests fail at the network layer
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn count_for(&self, method: HttpMethod, path_and_query: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && request_path(r) == path_and_query)
            .count()
    }

    pub fn last_body(&self, method: HttpMethod, path_and_query: &str) -> Option<Value> {
        lock(&self.requests)
            .iter()
            .rev()
            .find(|r| r.method == method && request_path(r) == path_and_query)
            .and_then(|r| r.body.clone())
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = route_key(request.method, request_path(&request));
        lock(&self.requests).push(request);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Network("mock transport: connection reset".to_string()));
        }

        Ok(lock(&self.routes).get(&key).cloned().unwrap_or(HttpResponse {
            status: 404,
            body: Value::Null,
        }))
    }
}
