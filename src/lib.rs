//! Authrelay is a request-interception proxy worker.
//!
//! It sits between pages and the network, intercepts every outgoing
//! request, and decides per request whether to forward it unchanged or
//! to rewrite its URL, inject Basic credentials, and adjust its fetch
//! options. The decision is driven by a single configuration record that
//! is fetched lazily from the requesting client over a one-shot reply
//! channel, cached, and invalidated or replaced through inbound messages.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- The [`ProxyConfig`](config::model::ProxyConfig) record,
//!   its validation, and file sources behind the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`fetcher`] -- Retrieves the record from the controlling client over a
//!   one-shot reply channel.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`protocol`] -- Message shapes exchanged with clients and the host.
//! - [`proxy`] -- The interception policy, header construction, and the
//!   network primitive.
//! - [`server`] -- Axum server setup, shared application state, HTTP client,
//!   lifecycle host, and graceful shutdown.
//! - [`store`] -- The single-slot configuration cache.
//! - [`worker`] -- Lifecycle, message, and fetch event handling.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML record file support _(enabled by default)_ |
//! | `json` | JSON record file support |
//! | `toml` | TOML record file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod logging;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod store;
pub mod worker;
