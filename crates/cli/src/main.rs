//! Cloud Build status relay entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags and environment.
//! 2. **Wire observability**: see [`telemetry`].
//! 3. **Construct infrastructure**: Cloud Storage and Cloud KMS adapters for
//!    the credential cache, an HTTP status poster for the dispatcher, all
//!    sharing one `reqwest::Client`.
//! 4. **Select run mode**:
//!    - `serve`: run the Pub/Sub push endpoint (Cloud Run).
//!    - `handle`: relay one message read from a file or stdin.
//!
//! The credential location (`CREDENTIALS_BUCKET`, `KMS_CRYPTO_KEY_ID`) is read
//! by the credential cache on first use, not here.

mod telemetry;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gcp::{GcsObjectStore, KmsDecryptor, TokenSource};
use relay::credentials::{CREDENTIALS_BUCKET_VAR, KMS_CRYPTO_KEY_ID_VAR};
use relay::{CredentialCache, PubsubMessage, PushRequest, Relay, StatusDispatcher};
use scm::HttpStatusPoster;
use tokio::io::AsyncReadExt;

use crate::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "cloud-build-status", version, about = "Relays Cloud Build results as commit statuses")]
struct Cli {
    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the Pub/Sub push endpoint.
    Serve {
        /// Full listen address; overrides `--port`.
        #[arg(long, env = "RELAY_ADDR")]
        addr: Option<SocketAddr>,

        /// Port to listen on, on all interfaces.
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },

    /// Relay one Pub/Sub message (push body or bare message JSON).
    Handle {
        /// Read the message from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format)?;

    let result = run(cli.command).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "cloud-build-status failed");
    }

    telemetry.shutdown();
    result
}

async fn run(command: Command) -> anyhow::Result<()> {
    warn_on_missing_settings();
    let relay = Arc::new(build_relay()?);

    match command {
        Command::Serve { addr, port } => {
            let addr = addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], port)));
            listener::serve(addr, relay).await?;
        }
        Command::Handle { file } => {
            let raw = read_input(file.as_deref()).await?;
            let message = parse_message(&raw)?;
            let marker = relay.handle(&message).await?;
            println!("{marker}");
        }
    }
    Ok(())
}

fn build_relay() -> anyhow::Result<Relay> {
    let http = reqwest::Client::builder()
        .user_agent(scm::RELAY_USER_AGENT)
        .build()
        .context("building HTTP client")?;
    let tokens = TokenSource::from_env();

    let credentials = CredentialCache::new(
        Arc::new(GcsObjectStore::new(http.clone(), tokens.clone())),
        Arc::new(KmsDecryptor::new(http.clone(), tokens)),
    );
    let dispatcher = StatusDispatcher::new(Arc::new(HttpStatusPoster::new(http)));
    Ok(Relay::new(credentials, dispatcher))
}

/// Missing settings only fail the first event that needs credentials, so
/// flag them at startup where they are easier to spot.
fn warn_on_missing_settings() {
    for name in [CREDENTIALS_BUCKET_VAR, KMS_CRYPTO_KEY_ID_VAR] {
        if std::env::var(name).map_or(true, |v| v.trim().is_empty()) {
            tracing::warn!(setting = name, "credential setting is not set");
        }
    }
}

async fn read_input(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

/// Accepts either a push delivery (`{"message": {..}}`) or a bare message.
fn parse_message(raw: &[u8]) -> anyhow::Result<PubsubMessage> {
    if let Ok(push) = serde_json::from_slice::<PushRequest>(raw) {
        return Ok(push.message);
    }
    serde_json::from_slice::<PubsubMessage>(raw).context("input is not a Pub/Sub message")
}
