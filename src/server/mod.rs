//! Webhook Server
//!
//! Receives Mattermost slash-command posts and answers them in channel.

use crate::commands::{CommandRequest, CommandRouter, Dispatch};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Slash-command response body.
#[derive(Debug, Serialize)]
struct CommandReply {
    response_type: &'static str,
    text: String,
}

/// Build the HTTP router.
pub fn router(commands: Arc<CommandRouter>) -> Router {
    Router::new()
        .route("/commands", post(command_handler))
        .route("/health", get(health_handler))
        .with_state(commands)
}

async fn command_handler(
    State(commands): State<Arc<CommandRouter>>,
    Form(request): Form<CommandRequest>,
) -> Response {
    info!(
        command = %request.command,
        user_id = %request.user_id,
        channel_id = %request.channel_id,
        "Incoming slash command"
    );

    match commands.dispatch(&request).await {
        Dispatch::Reply(text) => Json(CommandReply {
            response_type: "in_channel",
            text,
        })
        .into_response(),
        Dispatch::NotFound(trigger) => {
            warn!(trigger = %trigger, "Unknown command");
            (StatusCode::NOT_FOUND, "Command not found").into_response()
        }
        Dispatch::Failed(e) => {
            error!(command = %request.command, error = %e, "Command failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(addr: SocketAddr, commands: Arc<CommandRouter>) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(address = %addr, "Starting command server");

    axum::serve(listener, router(commands))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Command server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
