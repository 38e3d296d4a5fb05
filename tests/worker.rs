//! Integration tests for the worker: config retrieval over the reply
//! channel, cache behaviour, and the per-request transformation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use serde_json::json;

use authrelay::config::model::ProxyConfig;
use authrelay::error::RelayError;
use authrelay::fetcher::channel::ReplyPort;
use authrelay::fetcher::client::{ClientError, ClientRegistry, ControllingClient};
use authrelay::fetcher::ChannelFetcher;
use authrelay::protocol::{ClientMessage, ConfigReply};
use authrelay::proxy::network::{FetchResponse, Network};
use authrelay::proxy::policy::{AddressingMode, PolicySettings};
use authrelay::proxy::request::{
    CacheMode, CredentialsMode, Destination, InterceptedRequest, OutgoingRequest, RequestMode,
};
use authrelay::store::{CacheState, ConfigStore};
use authrelay::worker::{FetchOutcome, LifecycleHost, MessageOutcome, Worker, WorkerState};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// How the scripted client answers `get-configuration`.
#[derive(Clone)]
enum Answer {
    Config(ProxyConfig),
    Raw(serde_json::Value),
    /// Keep the port open and never answer.
    Silent,
    /// Hand the port to the test so it can answer later.
    Deferred(tokio::sync::mpsc::UnboundedSender<ReplyPort>),
}

struct ScriptedClient {
    id: String,
    answer: Answer,
    parked: Arc<Mutex<Vec<ReplyPort>>>,
}

impl ControllingClient for ScriptedClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn post_message(&self, message: ClientMessage, transfer: ReplyPort) -> Result<(), ClientError> {
        assert_eq!(message, ClientMessage::GetConfiguration);
        match &self.answer {
            Answer::Config(config) => {
                let _ = transfer.post(ConfigReply::Config(config.clone()).encode());
            }
            Answer::Raw(value) => {
                let _ = transfer.post(value.clone());
            }
            Answer::Silent => self.parked.lock().unwrap().push(transfer),
            Answer::Deferred(tx) => {
                let _ = tx.send(transfer);
            }
        }
        Ok(())
    }
}

/// Registry that knows a single client id and counts lookups.
struct ScriptedClients {
    known: &'static str,
    answer: Answer,
    lookups: AtomicUsize,
    parked: Arc<Mutex<Vec<ReplyPort>>>,
}

impl ScriptedClients {
    fn new(known: &'static str, answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            known,
            answer,
            lookups: AtomicUsize::new(0),
            parked: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientRegistry for ScriptedClients {
    async fn get(&self, client_id: &str) -> Result<Option<Arc<dyn ControllingClient>>, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if client_id != self.known {
            return Ok(None);
        }
        Ok(Some(Arc::new(ScriptedClient {
            id: client_id.to_string(),
            answer: self.answer.clone(),
            parked: Arc::clone(&self.parked),
        })))
    }

    async fn claim(&self) -> Result<usize, ClientError> {
        Ok(1)
    }
}

/// Network that records what it is asked to send and answers 200.
#[derive(Default)]
struct RecordingNetwork {
    sent: Mutex<Vec<OutgoingRequest>>,
}

impl RecordingNetwork {
    fn sent(&self) -> Vec<OutgoingRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for RecordingNetwork {
    async fn fetch(&self, request: OutgoingRequest) -> Result<FetchResponse, RelayError> {
        self.sent.lock().unwrap().push(request);
        Ok(FetchResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"ok"),
        })
    }
}

struct NoopHost;

#[async_trait]
impl LifecycleHost for NoopHost {
    async fn skip_waiting(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn claim_clients(&self) -> Result<usize, RelayError> {
        Ok(2)
    }
}

fn app_origin() -> PolicySettings {
    PolicySettings {
        addressing: AddressingMode::Auto,
        origin: Some(url::Url::parse("https://app.example").unwrap()),
    }
}

fn build_worker(
    clients: Arc<ScriptedClients>,
    reply_timeout: Option<Duration>,
) -> (Worker, Arc<RecordingNetwork>) {
    let fetcher = ChannelFetcher::new(clients).with_reply_timeout(reply_timeout);
    let store = Arc::new(ConfigStore::new(Arc::new(fetcher)));
    let network = Arc::new(RecordingNetwork::default());
    let worker = Worker::new(store, network.clone(), app_origin());
    (worker, network)
}

fn get(url: &str) -> InterceptedRequest {
    InterceptedRequest::new(Method::GET, url).with_client_id("c1")
}

fn svc_backend() -> ProxyConfig {
    ProxyConfig::new("https://api.internal").with_credentials("svc", None)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn install_then_activate_claims_clients() {
    let (worker, _) = build_worker(ScriptedClients::new("c1", Answer::Silent), None);
    assert_eq!(worker.state(), WorkerState::Parsed);

    worker.install(&NoopHost).await.unwrap();
    assert_eq!(worker.state(), WorkerState::Installed);

    let claimed = worker.activate(&NoopHost).await.unwrap();
    assert_eq!(claimed, 2);
    assert_eq!(worker.state(), WorkerState::Activated);
}

// ---------------------------------------------------------------------------
// Config retrieval and cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cold_cache_fetches_once_then_serves_from_cache() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, _) = build_worker(clients.clone(), Some(Duration::from_secs(1)));

    let first = worker.store().get(Some("c1")).await.unwrap();
    let second = worker.store().get(Some("c1")).await.unwrap();

    assert_eq!(*first, svc_backend());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(clients.lookups(), 1);
    assert_eq!(worker.store().state(), CacheState::Cached);
}

#[tokio::test]
async fn warm_cache_never_contacts_clients() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, _) = build_worker(clients.clone(), Some(Duration::from_secs(1)));
    worker.store().set(ProxyConfig::new("https://other.internal"));

    let config = worker.store().get(Some("unknown-client")).await.unwrap();
    assert_eq!(config.base_url, "https://other.internal");
    assert_eq!(clients.lookups(), 0);
}

#[tokio::test]
async fn missing_client_id_skips_fetch() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients.clone(), Some(Duration::from_secs(1)));

    let request = InterceptedRequest::new(Method::GET, "https://api.internal/widgets");
    let FetchOutcome::Responded(Ok(_)) = worker.handle_fetch(request).await else {
        panic!("expected a proxied response");
    };

    assert_eq!(clients.lookups(), 0);
    let sent = network.sent();
    assert!(sent[0].headers.get(header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn unresolvable_client_means_no_proxying() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients.clone(), Some(Duration::from_secs(1)));

    let request = InterceptedRequest::new(Method::GET, "https://api.internal/widgets")
        .with_client_id("closed-tab");
    worker.handle_fetch(request).await;

    assert_eq!(clients.lookups(), 1);
    assert_eq!(worker.store().state(), CacheState::Uncached);
    assert!(network.sent()[0].headers.get(header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn error_reply_is_not_cached() {
    let clients = ScriptedClients::new("c1", Answer::Raw(json!({ "error": "not signed in" })));
    let (worker, network) = build_worker(clients.clone(), Some(Duration::from_secs(1)));

    worker.handle_fetch(get("https://api.internal/widgets")).await;
    worker.handle_fetch(get("https://api.internal/widgets")).await;

    // Nothing cached, so every request asks again.
    assert_eq!(clients.lookups(), 2);
    assert_eq!(worker.store().state(), CacheState::Uncached);
    assert!(network
        .sent()
        .iter()
        .all(|r| r.headers.get(header::AUTHORIZATION).is_none()));
    assert_eq!(worker.store().stats().fetch_failures.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn malformed_reply_is_rejected() {
    let clients = ScriptedClients::new("c1", Answer::Raw(json!({ "baseUrl": 42 })));
    let (worker, _) = build_worker(clients, Some(Duration::from_secs(1)));
    assert!(worker.store().get(Some("c1")).await.is_none());
    assert_eq!(worker.store().state(), CacheState::Uncached);
}

#[tokio::test]
async fn double_invalidate_is_harmless() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, _) = build_worker(clients.clone(), Some(Duration::from_secs(1)));
    worker.store().get(Some("c1")).await.unwrap();

    assert_eq!(
        worker.handle_message(json!({ "type": "invalidate" })),
        MessageOutcome::Invalidated
    );
    assert_eq!(
        worker.handle_message(json!({ "type": "invalidate" })),
        MessageOutcome::Invalidated
    );
    assert_eq!(worker.store().state(), CacheState::Uncached);

    // The next request repopulates the cache.
    worker.store().get(Some("c1")).await.unwrap();
    assert_eq!(clients.lookups(), 2);
}

#[tokio::test]
async fn unrecognized_message_invalidates() {
    let (worker, _) = build_worker(ScriptedClients::new("c1", Answer::Silent), None);
    worker.store().set(svc_backend());
    assert_eq!(worker.handle_message(json!("reload")), MessageOutcome::Invalidated);
    assert_eq!(worker.store().state(), CacheState::Uncached);
}

#[tokio::test]
async fn invalid_push_leaves_cache_untouched() {
    let (worker, _) = build_worker(ScriptedClients::new("c1", Answer::Silent), None);
    worker.store().set(svc_backend());

    let outcome = worker.handle_message(json!({
        "type": "set-config",
        "config": { "baseUrl": "not-a-url" }
    }));
    assert!(matches!(outcome, MessageOutcome::Rejected(ref errors) if !errors.is_empty()));
    assert_eq!(*worker.store().current().unwrap(), svc_backend());
}

// ---------------------------------------------------------------------------
// Scenario 1: client never replies
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn silent_client_falls_back_to_unmodified_request_after_timeout() {
    let clients = ScriptedClients::new("c1", Answer::Silent);
    let (worker, network) = build_worker(clients, Some(Duration::from_millis(200)));

    let outcome = worker.handle_fetch(get("https://api.internal/widgets")).await;
    assert!(matches!(outcome, FetchOutcome::Responded(Ok(_))));

    let sent = network.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://api.internal/widgets");
    assert!(sent[0].headers.get(header::AUTHORIZATION).is_none());
    assert_eq!(worker.store().state(), CacheState::Uncached);
}

#[tokio::test(start_paused = true)]
async fn silent_client_without_bound_suspends_the_request() {
    let clients = ScriptedClients::new("c1", Answer::Silent);
    let (worker, network) = build_worker(clients, None);

    let pending = tokio::time::timeout(
        Duration::from_secs(60),
        worker.handle_fetch(get("https://api.internal/widgets")),
    )
    .await;

    assert!(pending.is_err(), "request should still be waiting on the client");
    assert!(network.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Scenario 2: credentials and mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passthrough_injects_basic_credentials_and_goes_cross_origin() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients, Some(Duration::from_secs(1)));

    let request = get("https://api.internal/widgets").with_mode(RequestMode::SameOrigin);
    worker.handle_fetch(request).await;

    let sent = network.sent();
    assert_eq!(sent[0].url, "https://api.internal/widgets");
    assert_eq!(sent[0].headers.get(header::AUTHORIZATION).unwrap(), "Basic c3Zj");
    assert_eq!(sent[0].mode, RequestMode::Cors);
    assert_eq!(sent[0].credentials, CredentialsMode::Include);
}

#[tokio::test]
async fn no_username_means_no_authorization_header() {
    let config = ProxyConfig::new("https://backend.example").with_proxy_base_url("/api");
    let clients = ScriptedClients::new("c1", Answer::Config(config));
    let (worker, network) = build_worker(clients, Some(Duration::from_secs(1)));

    worker
        .handle_fetch(get("https://app.example/api/widgets?page=2"))
        .await;

    let sent = network.sent();
    assert_eq!(sent[0].url, "https://backend.example/widgets?page=2");
    assert!(sent[0].headers.get(header::AUTHORIZATION).is_none());
    assert_eq!(sent[0].mode, RequestMode::Cors);
}

#[tokio::test]
async fn out_of_scope_request_is_forwarded_unmodified() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients, Some(Duration::from_secs(1)));

    let request = get("https://cdn.example/app.css").with_mode(RequestMode::NoCors);
    worker.handle_fetch(request).await;

    let sent = network.sent();
    assert_eq!(sent[0].url, "https://cdn.example/app.css");
    assert!(sent[0].headers.get(header::AUTHORIZATION).is_none());
    assert_eq!(sent[0].mode, RequestMode::NoCors);
}

#[tokio::test]
async fn only_if_cached_is_downgraded_when_credentials_are_injected() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients, Some(Duration::from_secs(1)));

    let request = get("https://api.internal/widgets")
        .with_mode(RequestMode::SameOrigin)
        .with_cache(CacheMode::OnlyIfCached);
    worker.handle_fetch(request).await;

    assert_eq!(network.sent()[0].cache, CacheMode::Default);
}

#[tokio::test]
async fn script_requests_are_never_intercepted() {
    let clients = ScriptedClients::new("c1", Answer::Config(svc_backend()));
    let (worker, network) = build_worker(clients.clone(), Some(Duration::from_secs(1)));

    let request = get("https://api.internal/sw.js").with_destination(Destination::script());
    let outcome = worker.handle_fetch(request).await;

    let FetchOutcome::Default(request) = outcome else {
        panic!("script request should be left to default handling");
    };
    assert_eq!(request.url, "https://api.internal/sw.js");
    assert!(network.sent().is_empty());
    assert_eq!(clients.lookups(), 0);
}

// ---------------------------------------------------------------------------
// Scenario 3: push while a round-trip is outstanding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_resolving_after_push_wins() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let clients = ScriptedClients::new("c1", Answer::Deferred(tx));
    let (worker, _) = build_worker(clients, Some(Duration::from_secs(5)));
    let worker = Arc::new(worker);

    let fetching = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.store().get(Some("c1")).await })
    };
    let port = rx.recv().await.unwrap();

    let pushed = ProxyConfig::new("https://pushed.internal");
    let outcome = worker.handle_message(json!({
        "type": "set-config",
        "config": { "baseUrl": "https://pushed.internal" }
    }));
    assert!(matches!(outcome, MessageOutcome::Replaced { .. }));
    assert_eq!(*worker.store().current().unwrap(), pushed);

    let fetched = ProxyConfig::new("https://fetched.internal");
    port.post(ConfigReply::Config(fetched.clone()).encode()).unwrap();
    let resolved = fetching.await.unwrap().unwrap();

    assert_eq!(*resolved, fetched);
    assert_eq!(*worker.store().current().unwrap(), fetched);
}

#[tokio::test]
async fn push_after_reply_wins() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let clients = ScriptedClients::new("c1", Answer::Deferred(tx));
    let (worker, _) = build_worker(clients, Some(Duration::from_secs(5)));
    let worker = Arc::new(worker);

    let fetching = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.store().get(Some("c1")).await })
    };
    let port = rx.recv().await.unwrap();
    port.post(ConfigReply::Config(ProxyConfig::new("https://fetched.internal")).encode())
        .unwrap();
    fetching.await.unwrap().unwrap();

    worker.handle_message(json!({
        "type": "set-config",
        "config": { "baseUrl": "https://pushed.internal" }
    }));
    assert_eq!(
        worker.store().current().unwrap().base_url,
        "https://pushed.internal"
    );
}
