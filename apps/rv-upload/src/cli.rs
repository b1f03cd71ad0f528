//! Command-line arguments and how they combine with the config file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rv_upload_client::{UploadJob, UploadOptions};
use rv_upload_protocol::Project;

use crate::config::Config;

/// Upload a file to the Route Views ingestion service.
#[derive(Parser, Debug)]
#[command(name = "rv-upload", version, about, long_about = None)]
pub struct Args {
    /// Destination `host[:port]` [default: grpc.routeviews.org]
    #[arg(long, env = "RV_UPLOAD_DEST")]
    pub dest: Option<String>,

    /// File to upload
    #[arg(long, required_unless_present = "server")]
    pub file: Option<PathBuf>,

    /// Project the file belongs to (routeviews, ripe-ris, rpki-rarc, routeviews-rib)
    #[arg(long, required_unless_present = "server")]
    pub project: Option<Project>,

    /// Ask the destination to convert the file to SQL
    #[arg(long)]
    pub to_sql: bool,

    /// Store the file under this name instead of its path
    #[arg(long)]
    pub override_filename: Option<String>,

    /// Service-account key file; enables TLS and ID-token authentication
    #[arg(long, env = "RV_UPLOAD_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Deadline for the upload in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also send log records to the local syslog daemon
    #[arg(long)]
    pub syslog: bool,

    /// TOML file with defaults for the options above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the debug echo server instead of uploading
    #[arg(long, conflicts_with_all = ["file", "project", "to_sql", "override_filename"])]
    pub server: bool,

    /// Echo server port [default: 50051]
    #[arg(long, requires = "server")]
    pub port: Option<u16>,

    /// Echo server concurrent calls [default: 10]
    #[arg(long, requires = "server")]
    pub workers: Option<usize>,
}

/// What this invocation does, with flags and config merged.
#[derive(Debug)]
pub enum Mode {
    Upload {
        destination: String,
        job: UploadJob,
        key_file: Option<PathBuf>,
        options: UploadOptions,
    },
    Echo {
        port: u16,
        workers: usize,
    },
}

impl Args {
    /// Flags win over the config file, which wins over built-in defaults.
    pub fn mode(&self, config: &Config) -> anyhow::Result<Mode> {
        if self.server {
            return Ok(Mode::Echo {
                port: self.port.unwrap_or(config.port),
                workers: self.workers.unwrap_or(config.workers),
            });
        }

        let file = self.file.clone().context("--file is required")?;
        let project = self.project.context("--project is required")?;

        let mut job = UploadJob::new(file, project).convert(self.to_sql);
        if let Some(name) = &self.override_filename {
            job = job.filename(name.clone());
        }

        let options = UploadOptions {
            timeout: self.timeout.map(Duration::from_secs).or(config.timeout()),
            ..UploadOptions::default()
        };

        Ok(Mode::Upload {
            destination: self.dest.clone().unwrap_or_else(|| config.dest.clone()),
            job,
            key_file: self.key_file.clone().or_else(|| config.key_file.clone()),
            options,
        })
    }
}
