//! Optional TOML defaults for the command line.
//!
//! Nothing is read unless `--config <path>` is given. Every key may be
//! omitted:
//!
//! ```toml
//! dest = "grpc.routeviews.org"
//! key_file = "/etc/rv-upload/service-account.json"
//! timeout_secs = 600
//! port = 50051
//! workers = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rv_upload_client::DEFAULT_DESTINATION;
use rv_upload_echo::DEFAULT_WORKERS;
use rv_upload_protocol::DEFAULT_PORT;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Upload destination, `host[:port]`.
    #[serde(default = "default_dest")]
    pub dest: String,

    /// Service-account key; uploads are plaintext without one.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Deadline for the upload call.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Echo server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Echo server concurrency.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_dest() -> String {
    DEFAULT_DESTINATION.into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dest: default_dest(),
            key_file: None,
            timeout_secs: None,
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Config {
    /// Loads `path`, or the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
