// Integration test utilities: scripted instance sources and a canned HTTP server.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use fedimap_core::client::{ClientSettings, InstanceSource};
use fedimap_core::config::CrawlSection;
use fedimap_core::store::SqliteStore;
use fedimap_core::types::{
    FailureKind, FetchFailure, FetchResult, FetchedInstance, InstanceMetadata, Mention, Post,
};

// ── Post builders ────────────────────────────────────────────────

/// A post with one mention per account identifier.
pub fn post(id: &str, created_at: DateTime<Utc>, accts: &[&str]) -> Post {
    Post {
        id: id.to_string(),
        created_at,
        mentions: accts
            .iter()
            .map(|acct| Mention {
                acct: (*acct).to_string(),
            })
            .collect(),
    }
}

/// A post published an hour ago, well inside any mention window.
pub fn recent_post(id: &str, accts: &[&str]) -> Post {
    post(id, Utc::now() - chrono::Duration::hours(1), accts)
}

/// Timeline JSON as a Mastodon server would return it.
pub fn posts_json(posts: &[Post]) -> serde_json::Value {
    serde_json::Value::Array(
        posts
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "created_at": p.created_at.to_rfc3339(),
                    "mentions": p.mentions.iter().map(|m| serde_json::json!({"acct": m.acct})).collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

// ── Store and settings fixtures ──────────────────────────────────

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().expect("in-memory store"))
}

/// Crawl settings for tests: given seed and workers, no page delay.
pub fn crawl_settings(seed: &str, workers: usize) -> CrawlSection {
    CrawlSection {
        seed: seed.to_string(),
        workers,
        page_delay_ms: 0,
        ..CrawlSection::default()
    }
}

/// Client settings for talking plain HTTP to a [`CannedHttpServer`].
pub fn http_client_settings(timeout: Duration) -> ClientSettings {
    ClientSettings {
        timeout,
        page_delay: Duration::ZERO,
        ..ClientSettings::from_config(&crawl_settings("unused.test", 1))
    }
    .with_scheme("http")
}

// ── Scripted instance source ─────────────────────────────────────

/// What a scripted instance answers.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply {
        metadata: InstanceMetadata,
        peers: Vec<String>,
        posts: Vec<Post>,
    },
    Fail(FailureKind),
}

/// In-process [`InstanceSource`] that answers from a script.
///
/// Instances without a script fail with `NetworkFailure`, like an
/// unreachable host. Every fetch is recorded.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful instance with default metadata.
    #[must_use]
    pub fn with_instance(self, name: &str, peers: &[&str], posts: Vec<Post>) -> Self {
        self.set(
            name,
            Scripted::Reply {
                metadata: default_metadata(name),
                peers: peers.iter().map(ToString::to_string).collect(),
                posts,
            },
        );
        self
    }

    #[must_use]
    pub fn with_failure(self, name: &str, kind: FailureKind) -> Self {
        self.set(name, Scripted::Fail(kind));
        self
    }

    /// Sleep this long in every fetch, to keep several workers busy at once.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace one instance's script, e.g. between two passes.
    pub fn set(&self, name: &str, script: Scripted) {
        self.scripts
            .lock()
            .expect("scripts mutex poisoned")
            .insert(name.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn fetch_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }
}

pub fn default_metadata(name: &str) -> InstanceMetadata {
    InstanceMetadata {
        description: Some(format!("{name} test instance")),
        version: Some("4.2.0".to_string()),
        domain_count: Some(10),
        status_count: Some(1000),
        user_count: Some(100),
    }
}

#[async_trait::async_trait]
impl InstanceSource for ScriptedSource {
    async fn fetch(&self, instance: &str) -> FetchResult {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(instance.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let script = self
            .scripts
            .lock()
            .expect("scripts mutex poisoned")
            .get(instance)
            .cloned();
        match script {
            Some(Scripted::Reply {
                metadata,
                peers,
                posts,
            }) => Ok(FetchedInstance {
                name: instance.to_string(),
                metadata,
                peers,
                posts,
                window_start: Utc::now() - chrono::Duration::days(31),
            }),
            Some(Scripted::Fail(kind)) => Err(FetchFailure::new(kind, "scripted failure")),
            None => Err(FetchFailure::network("unscripted instance")),
        }
    }
}

// ── Canned HTTP server ──────────────────────────────────────────

/// One canned HTTP reply.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl CannedResponse {
    pub fn json(value: &serde_json::Value) -> Self {
        Self::raw(200, value.to_string())
    }

    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Routes = HashMap<String, Mutex<VecDeque<CannedResponse>>>;

/// Shared state behind the canned router.
#[derive(Debug)]
struct ServerState {
    routes: Routes,
    requests: Mutex<Vec<(Instant, String)>>,
}

/// HTTP server on `127.0.0.1` answering GETs from canned routes.
///
/// Each route holds a queue of replies keyed by path (query string
/// ignored); the last reply repeats once the queue is down to one.
/// Unknown paths get a 404. Request targets are recorded in order, with
/// the time each one arrived.
#[derive(Debug)]
pub struct CannedHttpServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl CannedHttpServer {
    pub async fn start(routes: Vec<(&str, Vec<CannedResponse>)>) -> std::io::Result<Self> {
        let state = Arc::new(ServerState {
            routes: routes
                .into_iter()
                .map(|(path, replies)| (path.to_string(), Mutex::new(replies.into())))
                .collect(),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .fallback(canned_reply)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// `host:port`, usable as an instance name with an `http` client.
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    /// Request targets (path plus query) received so far.
    pub fn requests(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .expect("requests mutex poisoned")
            .iter()
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Arrival times of the requests for `path`, oldest first.
    pub fn request_times(&self, path: &str) -> Vec<Instant> {
        self.state
            .requests
            .lock()
            .expect("requests mutex poisoned")
            .iter()
            .filter(|(_, target)| target.split('?').next() == Some(path))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|target| target.split('?').next() == Some(path))
            .count()
    }
}

impl Drop for CannedHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn canned_reply(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    state
        .requests
        .lock()
        .expect("requests mutex poisoned")
        .push((Instant::now(), target));

    let reply = state.routes.get(uri.path()).and_then(|queue| {
        let mut queue = queue.lock().expect("route mutex poisoned");
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    });
    let reply = reply.unwrap_or_else(|| CannedResponse::raw(404, r#"{"error":"not found"}"#));

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response()
}
