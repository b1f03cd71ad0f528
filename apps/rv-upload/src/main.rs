//! `rv-upload` entry point.
//!
//! Uploads one file per invocation, or with `--server` runs the debug echo
//! server. The upload outcome is printed on stdout; logs go to stderr and,
//! with `--syslog`, to the local syslog daemon.

mod cli;
mod config;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rv_upload_client::UploadError;
use rv_upload_echo::EchoServer;
use rv_upload_protocol::Status;
use syslog_tracing::{Facility, Options, Syslog};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Args, Mode};
use crate::config::Config;

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_logging(args.syslog) {
        eprintln!("rv-upload: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "rv-upload failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(syslog: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let syslog_layer = if syslog {
        let writer = Syslog::new(c"rv-upload", Options::LOG_PID, Facility::User)
            .context("syslog writer already initialized")?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(syslog_layer)
        .try_init()?;
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let mode = args.mode(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    match mode {
        Mode::Upload {
            destination,
            job,
            key_file,
            options,
        } => rt.block_on(async {
            let result =
                rv_upload_client::upload(&destination, &job, key_file.as_deref(), &options).await;
            match result {
                Ok(response) => {
                    report(response.status(), &response.error_message);
                    Ok(())
                }
                Err(UploadError::RemoteRejection { status, message }) => {
                    report(status, &message);
                    anyhow::bail!("{destination} rejected the upload with status {status}")
                }
                Err(err) => Err(err).with_context(|| format!("uploading {}", job.path.display())),
            }
        }),
        Mode::Echo { port, workers } => {
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                port,
                workers,
                "starting debug echo server"
            );
            rt.block_on(EchoServer::new().port(port).workers(workers).run())?;
            tracing::info!("echo server shut down cleanly");
            Ok(())
        }
    }
}

fn report(status: Status, error_message: &str) {
    println!("Status: {status}");
    if !error_message.is_empty() {
        println!("Error Message: {error_message}");
    }
}
