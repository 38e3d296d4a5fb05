//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, init, validate, health), and their associated
//! argument structs. Every `run` flag has an environment variable
//! equivalent for container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::proxy::policy::AddressingMode;

#[derive(Parser)]
#[command(
    name = "authrelay",
    version,
    about = "Request-interception proxy worker with credential injection",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        authrelay init --base-url https://api.internal      Create a record file\n  \
        authrelay run --origin https://app.example          Start with ./authrelay.yaml\n  \
        authrelay validate authrelay.yaml                   Check a record file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interception proxy
    Run(Box<RunArgs>),

    /// Generate a starter configuration record file
    Init(InitArgs),

    /// Validate a configuration record file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        authrelay run --origin https://app.example                       Auto-detect record file\n  \
        authrelay run --origin https://app.example -c relay.json         Specific record file\n  \
        authrelay run --origin https://app.example --mode rewrite --pretty")]
pub struct RunArgs {
    /// Page-facing origin of the intercepting process (scheme://host[:port])
    #[arg(long, env = "WORKER_ORIGIN")]
    pub origin: String,

    /// Record file served to clients on `get-configuration` (.yaml, .json, .toml)
    #[arg(short = 'c', long, env = "CLIENT_CONFIG")]
    pub client_config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Shared secret required in `x-worker-token` on the inbound message endpoint
    /// (unset: only loopback callers may push or invalidate)
    #[arg(long, env = "WORKER_MESSAGE_TOKEN", hide_env_values = true)]
    pub message_token: Option<String>,

    /// Which addressing policy decides whether a request is proxied
    #[arg(long, env = "ADDRESSING_MODE", value_enum, default_value_t = AddressingMode::Auto)]
    pub mode: AddressingMode,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Configuration reply timeout in milliseconds (0 waits forever)
    #[arg(
        long,
        env = "CONFIG_TIMEOUT_MS",
        default_value_t = 10_000,
        help_heading = "Tuning"
    )]
    pub config_timeout: u64,

    /// Upstream request timeout in milliseconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help_heading = "Tuning"
    )]
    pub timeout: u64,

    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        authrelay init --base-url https://api.internal\n  \
        authrelay init --base-url https://api.internal --proxy-base-url /api -u svc\n  \
        authrelay init --base-url https://api.internal -f json -o relay.json")]
pub struct InitArgs {
    /// Backend origin or URL prefix requests are delivered to
    #[arg(long)]
    pub base_url: String,

    /// URL prefix pages use to address the proxy (enables URL rewriting)
    #[arg(long)]
    pub proxy_base_url: Option<String>,

    /// Username for Basic credentials
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for Basic credentials (requires --username)
    #[arg(long, requires = "username", env = "AUTHRELAY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Record file to validate
    #[arg(default_value = "authrelay.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
