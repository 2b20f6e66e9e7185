//! Process runtime: bridge bootstrap, webhook server and graceful shutdown.

use crate::client::wppconnect::{SessionState, WppConnectClient};
use crate::config::{BroadcastConfig, Settings};
use crate::relay::BroadcastRelay;
use crate::utils::retry_bridge_operation;
use crate::webhook::{build_app, WebhookState};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Interval between two session status checks while waiting for login
const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Run the relay until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the bridge session cannot be opened or the webhook
/// listener cannot be bound.
pub async fn run(settings: Arc<Settings>, config: Arc<BroadcastConfig>) -> Result<()> {
    let shutdown = CancellationToken::new();

    let client = retry_bridge_operation(|| WppConnectClient::from_settings(&settings))
        .await
        .context("failed to authenticate against the bridge")?;

    let state = retry_bridge_operation(|| {
        client.start_session(settings.webhook_public_url.as_deref())
    })
    .await
    .context("failed to start the bridge session")?;
    info!(session = %settings.session_name, ?state, "Bridge session started.");

    if settings.webhook_public_url.is_none() {
        warn!("WEBHOOK_PUBLIC_URL is not set; the bridge must already be configured to post events here.");
    }

    let relay = Arc::new(
        BroadcastRelay::new(Arc::new(client.clone()), config).with_shutdown(shutdown.clone()),
    );

    let listener = tokio::net::TcpListener::bind(&settings.webhook_bind)
        .await
        .with_context(|| format!("failed to bind webhook on {}", settings.webhook_bind))?;
    info!(bind = %settings.webhook_bind, "Webhook listening.");

    tokio::spawn(watch_session(client, shutdown.clone()));
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let tasks = TaskTracker::new();
    let app = build_app(WebhookState {
        relay,
        tasks: tasks.clone(),
    });

    info!("Relay is running...");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("webhook server failed")?;

    // In-flight broadcasts stop at their next pause and still report a summary
    tasks.close();
    if !tasks.is_empty() {
        info!(pending = tasks.len(), "Waiting for in-flight broadcasts to stop...");
    }
    tasks.wait().await;

    info!("Relay stopped.");
    Ok(())
}

/// Log the session state until it is connected, reminding the operator to scan the QR code
async fn watch_session(client: WppConnectClient, shutdown: CancellationToken) {
    let mut last = None;
    loop {
        match client.status().await {
            Ok(SessionState::Connected) => {
                info!("✅ WhatsApp session connected.");
                return;
            }
            Ok(state) => {
                if last != Some(state) {
                    if state == SessionState::QrCode {
                        warn!("Session waiting for QR code scan, see the bridge logs.");
                    } else {
                        info!(?state, "Waiting for WhatsApp session...");
                    }
                    last = Some(state);
                }
            }
            Err(e) => warn!(error = %e, "Failed to read session status"),
        }

        tokio::select! {
            () = tokio::time::sleep(SESSION_POLL_INTERVAL) => {}
            () = shutdown.cancelled() => return,
        }
    }
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Ctrl-C received, shutting down...");
    shutdown.cancel();
}
