//! In-memory doubles for the network seams.
//!
//! [`StubHttpClient`] answers from a routing table and records every request,
//! which lets registry providers, watchers and triggers run without sockets.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwatch_core::error::{Result, WatchError};

use crate::http::{HttpClient, HttpResponse, Method, RequestOptions};

#[derive(Clone)]
enum Reply {
    Response(HttpResponse),
    Unreachable(String),
}

struct Route {
    method: Method,
    url: String,
    prefix: bool,
    replies: VecDeque<Reply>,
}

/// Canned-response HTTP client.
///
/// Routes match on method and exact URL, or URL prefix for [`Self::on_prefix`].
/// Exact routes win over prefix routes and later routes win over earlier ones.
/// A route with several queued replies pops one per request and repeats the
/// last. Unmatched requests get a 404.
#[derive(Default, Clone)]
pub struct StubHttpClient {
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<RequestOptions>>>,
}

impl StubHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method url` with `response`, replacing any previous route.
    pub fn on(&self, method: Method, url: &str, response: HttpResponse) -> &Self {
        self.push(method, url, false, vec![Reply::Response(response)])
    }

    /// Answer every URL starting with `prefix`.
    pub fn on_prefix(&self, method: Method, prefix: &str, response: HttpResponse) -> &Self {
        self.push(method, prefix, true, vec![Reply::Response(response)])
    }

    /// Answer successive requests with successive responses.
    pub fn on_sequence(&self, method: Method, url: &str, responses: Vec<HttpResponse>) -> &Self {
        self.push(
            method,
            url,
            false,
            responses.into_iter().map(Reply::Response).collect(),
        )
    }

    /// Fail `method url` with a network error.
    pub fn unreachable(&self, method: Method, url: &str) -> &Self {
        self.push(
            method,
            url,
            false,
            vec![Reply::Unreachable("connection refused".to_string())],
        )
    }

    /// Fail every URL starting with `prefix` with a network error.
    pub fn unreachable_prefix(&self, method: Method, prefix: &str) -> &Self {
        self.push(
            method,
            prefix,
            true,
            vec![Reply::Unreachable("connection refused".to_string())],
        )
    }

    /// Drop every route for `method url` (exact or prefix).
    pub fn clear(&self, method: Method, url: &str) {
        self.routes
            .lock()
            .retain(|r| !(r.method == method && r.url == url));
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<RequestOptions> {
        self.requests.lock().clone()
    }

    /// Requests whose URL starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> Vec<RequestOptions> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn push(&self, method: Method, url: &str, prefix: bool, replies: Vec<Reply>) -> &Self {
        let mut routes = self.routes.lock();
        routes.retain(|r| !(r.method == method && r.url == url && r.prefix == prefix));
        routes.push(Route {
            method,
            url: url.to_string(),
            prefix,
            replies: replies.into(),
        });
        self
    }

    fn reply(&self, options: &RequestOptions) -> Option<Reply> {
        let mut routes = self.routes.lock();
        let exact = routes
            .iter()
            .rposition(|r| !r.prefix && r.method == options.method && r.url == options.url);
        let index = exact.or_else(|| {
            routes
                .iter()
                .rposition(|r| r.prefix && r.method == options.method && options.url.starts_with(&r.url))
        })?;
        let replies = &mut routes[index].replies;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl HttpClient for StubHttpClient {
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse> {
        self.requests.lock().push(options.clone());
        match self.reply(&options) {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Unreachable(message)) => Err(WatchError::network(&options.url, message)),
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}
