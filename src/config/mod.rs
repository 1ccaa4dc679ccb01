//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::{DEFAULT_LAYOUT, DEFAULT_SESSION};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rollcall";
const ENV_PREFIX: &str = "ROLLCALL";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_TEMPLATES_DIR: &str = "templates/attendance";
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 25;
const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ANCHOR_WAIT_MS: u64 = 5_000;
const DEFAULT_SETTLE_MS: u64 = 200;
const DEFAULT_MASTERLIST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MASTERLIST_SETTLE_MS: u64 = 400;

/// Command-line arguments for the rollcall binary.
#[derive(Debug, Parser)]
#[command(
    name = "rollcall",
    version,
    about = "Renders class rosters into attendance sheets and master lists"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ROLLCALL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Render one attendance batch described by a JSON request file.
    Render(RenderArgs),
    /// Concatenate local PDF files in the order given.
    Concat(ConcatArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the Chrome/Chromium executable.
    #[arg(long = "chrome-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub chrome_path: Option<PathBuf>,

    /// Override the attendance template directory.
    #[arg(long = "templates-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub templates_dir: Option<PathBuf>,

    /// Override the layout used when a template name is unknown.
    #[arg(long = "default-layout", value_name = "NAME")]
    pub default_layout: Option<String>,

    /// Override the per-document render timeout.
    #[arg(long = "render-job-timeout-seconds", value_name = "SECONDS")]
    pub job_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// JSON attendance request (same shape as the HTTP body).
    #[arg(value_name = "REQUEST", value_hint = ValueHint::FilePath)]
    pub request: PathBuf,

    /// Output path; defaults to the derived filename in the working directory.
    #[arg(short = 'o', long = "output", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ConcatArgs {
    /// PDF files to merge, in order.
    #[arg(value_name = "PDF", required = true, value_hint = ValueHint::FilePath)]
    pub inputs: Vec<PathBuf>,

    /// Output path; defaults to `combined.pdf` in the working directory.
    #[arg(short = 'o', long = "output", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub max_request_bytes: NonZeroU64,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// `None` defers to `CHROME_PATH` and executable discovery.
    pub chrome_path: Option<PathBuf>,
    pub templates_dir: PathBuf,
    pub default_layout: String,
    pub default_session: String,
    pub job_timeout: Duration,
    pub batch_timeout: Duration,
    pub anchor_wait: Duration,
    pub settle: Duration,
    pub masterlist_timeout: Duration,
    pub masterlist_settle: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        Some(Command::Concat(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(limit) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(limit);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.chrome_path.as_ref() {
            self.render.chrome_path = Some(path.clone());
        }
        if let Some(dir) = overrides.templates_dir.as_ref() {
            self.render.templates_dir = Some(dir.clone());
        }
        if let Some(layout) = overrides.default_layout.as_ref() {
            self.render.default_layout = Some(layout.clone());
        }
        if let Some(seconds) = overrides.job_timeout_seconds {
            self.render.job_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        Ok(Self {
            server,
            logging,
            render,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let max_request_bytes_value = server
        .max_request_bytes
        .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("server.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "server.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let graceful_shutdown = non_zero_secs(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        max_request_bytes,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let chrome_path = match render.chrome_path {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "render.chrome_path",
                "path must not be empty",
            ));
        }
        other => other,
    };

    let templates_dir = render
        .templates_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR));
    if templates_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.templates_dir",
            "path must not be empty",
        ));
    }

    let default_layout = non_blank(
        render.default_layout,
        DEFAULT_LAYOUT,
        "render.default_layout",
    )?;
    let default_session = non_blank(
        render.default_session,
        DEFAULT_SESSION,
        "render.default_session",
    )?;

    let job_timeout = non_zero_secs(
        render
            .job_timeout_seconds
            .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
        "render.job_timeout_seconds",
    )?;
    let batch_timeout = non_zero_secs(
        render
            .batch_timeout_seconds
            .unwrap_or(DEFAULT_BATCH_TIMEOUT_SECS),
        "render.batch_timeout_seconds",
    )?;
    if batch_timeout <= job_timeout {
        return Err(LoadError::invalid(
            "render.batch_timeout_seconds",
            "must be greater than render.job_timeout_seconds",
        ));
    }

    Ok(RenderSettings {
        chrome_path,
        templates_dir,
        default_layout,
        default_session,
        job_timeout,
        batch_timeout,
        anchor_wait: non_zero_millis(
            render.anchor_wait_ms.unwrap_or(DEFAULT_ANCHOR_WAIT_MS),
            "render.anchor_wait_ms",
        )?,
        settle: Duration::from_millis(render.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
        masterlist_timeout: non_zero_secs(
            render
                .masterlist_timeout_seconds
                .unwrap_or(DEFAULT_MASTERLIST_TIMEOUT_SECS),
            "render.masterlist_timeout_seconds",
        )?,
        masterlist_settle: Duration::from_millis(
            render
                .masterlist_settle_ms
                .unwrap_or(DEFAULT_MASTERLIST_SETTLE_MS),
        ),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    max_request_bytes: Option<u64>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_path: Option<PathBuf>,
    templates_dir: Option<PathBuf>,
    default_layout: Option<String>,
    default_session: Option<String>,
    job_timeout_seconds: Option<u64>,
    batch_timeout_seconds: Option<u64>,
    anchor_wait_ms: Option<u64>,
    settle_ms: Option<u64>,
    masterlist_timeout_seconds: Option<u64>,
    masterlist_settle_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_blank(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(LoadError::invalid(key, "must not be blank"))
            } else {
                Ok(trimmed.to_string())
            }
        }
    }
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
