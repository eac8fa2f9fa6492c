use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Args;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::magic::RelativePathBuf,
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::error::Error;
use crate::websocket::session::DEFAULT_SEND_TIMEOUT;

use super::TracingGuard;

pub const DEFAULT_HUB_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);
pub const DEFAULT_WS_PATH: &str = "/ws";

#[derive(Deserialize, Serialize, Debug)]
pub struct HubConfig {
    pub(crate) bind: SocketAddr,
    pub(crate) ws_path: String,
    #[serde(with = "humantime_serde")]
    pub(crate) send_timeout: Duration,
    pub(crate) log_path: Option<RelativePathBuf>,
    pub(crate) file_log: bool,
}

#[derive(Args, Debug, Serialize, Default)]
#[command(rename_all = "kebab-case")]
pub struct HubConfigCli {
    /// The address to bind to
    #[arg(short, long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub bind: Option<String>,
    /// The path of the config file
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub config: Option<String>,
    /// The request path reserved for the WebSocket channel, default to `/ws`
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub ws_path: Option<String>,
    /// How long a single relay to one peer may take, default to 5 seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub send_timeout: Option<String>,
    /// The log file path. If not specified, then the default rolling log file path would be used.
    /// If specified, then the log file would be exactly at the path specified.
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub log_path: Option<String>,
    /// Enable logging to file
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::ops::Not::not")]
    pub file_log: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HUB_ADDR,
            ws_path: DEFAULT_WS_PATH.to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            log_path: None,
            file_log: false,
        }
    }
}

impl HubConfig {
    pub fn new(cli: &HubConfigCli) -> crate::error::Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::from(Self::default(), "hub"))
            .merge(Toml::file(cli.config.as_deref().unwrap_or("config.toml")).nested())
            .merge(Env::prefixed("FANHUB_").profile("hub"))
            .merge(Serialized::from(cli, "hub"))
            .select("hub")
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if !self.ws_path.starts_with('/') {
            return Err(Error::InvalidConfig(figment::Error::from(format!(
                "ws_path must start with '/', got {:?}",
                self.ws_path
            ))));
        }
        if self.send_timeout.is_zero() {
            return Err(Error::InvalidConfig(figment::Error::from(
                "send_timeout must be greater than zero",
            )));
        }
        Ok(())
    }

    pub fn bind(&self) -> SocketAddr {
        self.bind
    }

    pub fn ws_path(&self) -> &str {
        &self.ws_path
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn setup_tracing_subscriber(&self) -> crate::error::Result<TracingGuard> {
        let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netfanhub=info".into()),
        );
        if self.file_log {
            let file_logger = self
                .log_path
                .as_ref()
                .and_then(|p| {
                    let path = p.relative();
                    match (path.parent(), path.file_name()) {
                        (Some(dir), Some(file_name)) => {
                            Some(tracing_appender::rolling::never(dir, file_name))
                        }
                        _ => None,
                    }
                })
                .or_else(|| {
                    dirs::cache_dir().map(|mut dir| {
                        dir.push("fanhub");
                        tracing_appender::rolling::daily(dir, format!("{}.log", self.bind))
                    })
                })
                .ok_or(Error::InvalidConfig(figment::Error::from(
                    "log path not valid and cache directory not found",
                )))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_logger);
            let file_filter = tracing_subscriber::EnvFilter::try_from_env("FANHUB_FILE_LOG_FILTER")
                .unwrap_or_else(|_| "netfanhub=info".into());
            tracing_subscriber::registry()
                .with(stdout_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking)
                        .with_filter(file_filter),
                )
                .try_init()
                .map_err(|e| Error::Custom(format!("set tracing subscriber failed: {e}")))?;
            Ok(TracingGuard {
                file_guard: Some(guard),
            })
        } else {
            tracing_subscriber::registry()
                .with(stdout_layer)
                .try_init()
                .map_err(|e| Error::Custom(format!("set tracing subscriber failed: {e}")))?;
            Ok(TracingGuard { file_guard: None })
        }
    }
}
