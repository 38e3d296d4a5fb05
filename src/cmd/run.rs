//! `authrelay run` — start the interception proxy.
//!
//! Resolves the record file served by the file-backed controlling client,
//! assembles the fetcher, store, network primitive, and worker, runs the
//! install and activate lifecycle steps, and serves the Axum router with
//! graceful shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::RunArgs;
use crate::config::sources;
use crate::config::ConfigSource;
use crate::error::RelayError;
use crate::fetcher::client::FileClients;
use crate::fetcher::ChannelFetcher;
use crate::logging;
use crate::proxy::network::HyperNetwork;
use crate::proxy::policy::PolicySettings;
use crate::server::{self, AppState, StandaloneHost, Stats};
use crate::store::ConfigStore;
use crate::worker::Worker;

pub async fn execute(args: RunArgs) -> Result<(), RelayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let origin = parse_origin(&args.origin)?;

    let source_path = resolve_client_config(args.client_config.as_deref()).await?;
    let source: Arc<dyn ConfigSource> = Arc::from(sources::for_path(&source_path)?);

    // Fail fast on a broken record file; clients would only ever get errors.
    match source.load().await {
        Ok((config, version)) => tracing::info!(
            path = %source_path.display(),
            version = version.short(),
            fingerprint = %config.fingerprint(),
            "client record file loaded"
        ),
        Err(e) => return Err(e),
    }

    let clients = Arc::new(FileClients::new(source));
    let reply_timeout =
        (args.config_timeout > 0).then(|| Duration::from_millis(args.config_timeout));
    let fetcher = ChannelFetcher::new(clients.clone()).with_reply_timeout(reply_timeout);
    let store = Arc::new(ConfigStore::new(Arc::new(fetcher)));

    let network = Arc::new(HyperNetwork::new(
        server::build_http_client(),
        Duration::from_millis(args.timeout),
    ));

    let settings = PolicySettings {
        addressing: args.mode,
        origin: Some(origin.clone()),
    };
    let worker = Arc::new(Worker::new(store, network.clone(), settings));

    let host = StandaloneHost::new(clients.clone());
    worker.install(&host).await?;
    worker.activate(&host).await?;

    let message_token = args.message_token.clone().filter(|t| !t.is_empty());
    let state = Arc::new(AppState {
        worker,
        network,
        origin: origin.clone(),
        client_source: format!("{} ({})", clients.source_name(), source_path.display()),
        message_token: message_token.clone(),
        start_time: Instant::now(),
        stats: Stats::new(),
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        origin = %origin.origin().ascii_serialization(),
        mode = ?args.mode,
        config_timeout_ms = args.config_timeout,
        message_auth = if message_token.is_some() { "token" } else { "loopback" },
        "authrelay started"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("authrelay stopped");
    Ok(())
}

fn parse_origin(raw: &str) -> Result<url::Url, RelayError> {
    let origin = url::Url::parse(raw).map_err(|e| RelayError::UriParse {
        source: Box::new(e),
    })?;
    if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
        return Err(RelayError::UriParse {
            source: format!("origin '{raw}' must be an http(s) URL with a host").into(),
        });
    }
    Ok(origin)
}

async fn resolve_client_config(explicit: Option<&Path>) -> Result<PathBuf, RelayError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    // Auto-detect in current directory
    let candidates = [
        "authrelay.yaml",
        "authrelay.yml",
        "authrelay.json",
        "authrelay.toml",
    ];

    for name in &candidates {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected client record file");
            return Ok(path);
        }
    }

    Err(RelayError::ConfigFileNotFound {
        path: PathBuf::from("authrelay.yaml"),
    })
}
