//! Pub/Sub push event source.
//!
//! Cloud Build publishes to the `cloud-builds` topic; a push subscription
//! delivers each message as an HTTP `POST` to this service. The response code
//! is the acknowledgement:
//!
//! | Outcome | Response | Pub/Sub behaviour |
//! |---------|----------|-------------------|
//! | Relayed or deliberately ignored | `200 OK` | acked |
//! | Body is not a push request | `400` | redelivered per subscription policy |
//! | Relay failed | `500` | redelivered per subscription policy |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and push-body parsing live here. The
//! [`relay`] crate sees only [`relay::PubsubMessage`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use relay::{PushRequest, Relay};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Routes: `POST /` for push deliveries, `GET /healthz` for probes.
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(relay)
}

/// Serves [`router`] on `addr` until SIGINT or SIGTERM.
pub async fn serve(addr: SocketAddr, relay: Arc<Relay>) -> Result<(), ListenerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;
    info!(%addr, "listening for Pub/Sub push deliveries");

    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("listener stopped");
    Ok(())
}

async fn receive(State(relay): State<Arc<Relay>>, body: Bytes) -> Response {
    let push: PushRequest = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(e) => {
            warn!(error = %e, "rejecting malformed push request");
            return (StatusCode::BAD_REQUEST, format!("malformed push request: {e}")).into_response();
        }
    };

    match relay.handle(&push.message).await {
        Ok(marker) => (StatusCode::OK, marker).into_response(),
        Err(e) => {
            error!(error = %e, subscription = push.subscription.as_deref().unwrap_or_default(), "relay failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "could not install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
