//! Broadcast relay pipeline
//!
//! Inbound event → classifier → authorization → time window → formatter →
//! dispatch loop → summary.

/// Authorization gate
pub mod authorization;
/// Trigger recognition
pub mod classifier;
/// Paced delivery loop
pub mod dispatch;
/// Message formatting
pub mod formatter;
/// Author-facing replies
pub mod notices;
/// Pauses between sends
pub mod pacing;
/// Allowed hours
pub mod schedule;

pub use authorization::AuthorizationGate;
pub use classifier::{classify, BroadcastRequest, ContentKind, InboundMessage};
pub use dispatch::{DispatchResult, Dispatcher};
pub use formatter::ContentFormatter;
pub use pacing::{PacingPlan, Pause, RandomSource, ThreadRandom, TokioPause};
pub use schedule::{Clock, LocalClock, TimeWindow};

use crate::client::ChatClient;
use crate::config::BroadcastConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

/// Why a broadcast request was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The author may not broadcast
    Unauthorized,
    /// Outside the allowed hours
    OutsideHours,
    /// Nothing meaningful left after removing the tag
    TooShort,
}

/// Where a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Not a broadcast command
    Ignored,
    /// Turned down with a notice to the author
    Rejected(Rejection),
    /// Dispatch ran and a summary was sent
    Completed(DispatchResult),
    /// Dispatch could not start; the author got the technical error notice
    Failed,
}

/// Runs broadcast requests against one chat client
///
/// Broadcasts are serialized: a second qualifying request waits until the one in
/// flight has finished.
pub struct BroadcastRelay {
    client: Arc<dyn ChatClient>,
    config: Arc<BroadcastConfig>,
    gate: AuthorizationGate,
    window: TimeWindow,
    formatter: ContentFormatter,
    plan: PacingPlan,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    pause: Arc<dyn Pause>,
    shutdown: CancellationToken,
    in_flight: Mutex<()>,
}

impl BroadcastRelay {
    /// Create a relay with the system clock, thread RNG and tokio sleep
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, config: Arc<BroadcastConfig>) -> Self {
        Self {
            gate: AuthorizationGate::new(&config),
            window: TimeWindow::new(config.allowed_hour_start, config.allowed_hour_end),
            formatter: ContentFormatter::new(&config),
            plan: PacingPlan::new(&config),
            client,
            config,
            clock: Arc::new(LocalClock),
            rng: Arc::new(ThreadRandom),
            pause: Arc::new(TokioPause),
            shutdown: CancellationToken::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the random source
    #[must_use]
    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Replace the pause primitive
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Token that interrupts an in-flight broadcast when cancelled
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Process one inbound event to completion
    pub async fn handle_message(&self, message: &InboundMessage) -> BroadcastOutcome {
        let Some(request) = classify(message, &self.config.trigger_tag) else {
            trace!(origin = %message.origin_id, "Not a broadcast trigger");
            return BroadcastOutcome::Ignored;
        };

        let span = info_span!(
            "broadcast",
            id = %Uuid::new_v4(),
            group = %request.origin_group_id
        );
        self.handle_request(&request).instrument(span).await
    }

    async fn handle_request(&self, request: &BroadcastRequest) -> BroadcastOutcome {
        info!(author = %request.author_id, "🔔 Broadcast trigger detected");

        if !self.gate.is_authorized(request) {
            return self
                .reject(request, Rejection::Unauthorized, notices::NOT_ADMIN)
                .await;
        }
        if !self.window.is_open(self.clock.as_ref()) {
            let notice = notices::outside_hours(&self.window);
            return self
                .reject(request, Rejection::OutsideHours, &notice)
                .await;
        }
        let Some(content) = self.formatter.validated_content(request.text_content()) else {
            return self
                .reject(request, Rejection::TooShort, notices::TOO_SHORT)
                .await;
        };
        let final_message = self.formatter.final_message(&content, self.rng.as_ref());

        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Another broadcast is in flight, waiting for it to finish");
                let guard = self.in_flight.lock().await;
                // The wait can outlast the allowed hours
                if !self.window.is_open(self.clock.as_ref()) {
                    let notice = notices::outside_hours(&self.window);
                    return self
                        .reject(request, Rejection::OutsideHours, &notice)
                        .await;
                }
                guard
            }
        };

        let dispatcher = Dispatcher {
            client: self.client.as_ref(),
            plan: self.plan,
            max_messages: self.config.max_messages_per_session,
            rng: self.rng.as_ref(),
            pause: self.pause.as_ref(),
            shutdown: &self.shutdown,
        };

        match dispatcher.run(request, &final_message).await {
            Ok(result) => {
                self.notify(&request.author_id, &notices::summary(&result))
                    .await;
                info!(
                    sent = result.sent,
                    failed = result.failed,
                    cancelled = result.cancelled,
                    "Broadcast finished"
                );
                BroadcastOutcome::Completed(result)
            }
            Err(e) => {
                error!(error = ?e, "💥 Broadcast failed");
                self.notify(&request.author_id, notices::TECHNICAL_ERROR)
                    .await;
                BroadcastOutcome::Failed
            }
        }
    }

    async fn reject(
        &self,
        request: &BroadcastRequest,
        rejection: Rejection,
        notice: &str,
    ) -> BroadcastOutcome {
        debug!(author = %request.author_id, ?rejection, "Broadcast rejected");
        self.notify(&request.author_id, notice).await;
        BroadcastOutcome::Rejected(rejection)
    }

    /// Best-effort private reply
    async fn notify(&self, author: &str, text: &str) {
        if let Err(e) = self.client.send_text(author, text).await {
            warn!(author = %author, error = %e, "Failed to notify author");
        }
    }
}
