//! Sequential, paced delivery to every member of the origin group.

use super::classifier::{BroadcastRequest, ContentKind};
use super::notices;
use super::pacing::{PacingPlan, Pause, PauseKind, RandomSource};
use crate::client::{ChatClient, ClientError, GroupMember, MediaPayload};
use crate::config::BROADCAST_IMAGE_FILENAME;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters reported to the author once the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
    /// Successful deliveries
    pub sent: usize,
    /// Failed deliveries
    pub failed: usize,
    /// Whether shutdown interrupted the loop
    pub cancelled: bool,
}

/// One run of the dispatch loop, borrowing the relay's collaborators
pub struct Dispatcher<'a> {
    /// Chat client used for every send
    pub client: &'a dyn ChatClient,
    /// Pause rules
    pub plan: PacingPlan,
    /// Session cap on successful sends
    pub max_messages: usize,
    /// Random source for pause durations
    pub rng: &'a dyn RandomSource,
    /// Sleep primitive
    pub pause: &'a dyn Pause,
    /// Stops the loop at the next suspension point
    pub shutdown: &'a CancellationToken,
}

impl Dispatcher<'_> {
    /// Fetch the recipients, acknowledge to the author, then deliver to each recipient
    ///
    /// Per-recipient failures are counted, never propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if the member list cannot be fetched or the acknowledgment
    /// cannot be sent.
    pub async fn run(
        &self,
        request: &BroadcastRequest,
        final_message: &str,
    ) -> Result<DispatchResult, ClientError> {
        let targets = self.targets(request).await?;
        self.client
            .send_text(&request.author_id, &notices::in_progress(targets.len()))
            .await?;
        info!(targets = targets.len(), "⏳ Broadcast started");

        let mut result = DispatchResult::default();
        let mut media = None;

        for member in &targets {
            if result.sent >= self.max_messages {
                info!(cap = self.max_messages, "Session cap reached, stopping");
                break;
            }
            if self.shutdown.is_cancelled() {
                result.cancelled = true;
                break;
            }

            match self.deliver(request, member, final_message, &mut media).await {
                Ok(()) => {
                    result.sent += 1;
                    info!(sent = result.sent, target = %member.display_name, "✅ Delivered");
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(target = %member.display_name, error = %e, "❌ Delivery failed");
                }
            }

            if !self.pace(result.sent).await {
                result.cancelled = true;
                break;
            }
        }

        if result.cancelled {
            warn!(sent = result.sent, "Broadcast interrupted by shutdown");
        }
        Ok(result)
    }

    async fn targets(&self, request: &BroadcastRequest) -> Result<Vec<GroupMember>, ClientError> {
        let members = self.client.group_members(&request.origin_group_id).await?;
        Ok(members
            .into_iter()
            .filter(|member| member.id != request.author_id)
            .collect())
    }

    /// Send the content to one member, downloading the image the first time it is needed
    async fn deliver(
        &self,
        request: &BroadcastRequest,
        member: &GroupMember,
        text: &str,
        media: &mut Option<MediaPayload>,
    ) -> Result<(), ClientError> {
        let media_ref = match (request.kind, request.media_ref.as_deref()) {
            (ContentKind::Image, Some(media_ref)) => media_ref,
            _ => return self.client.send_text(&member.id, text).await,
        };

        let payload = match media.take() {
            Some(payload) => payload,
            None => self.client.download_media(media_ref).await?,
        };
        let sent = self
            .client
            .send_image(&member.id, &payload, BROADCAST_IMAGE_FILENAME, text)
            .await;
        *media = Some(payload);
        sent
    }

    /// Wait after an attempt; returns `false` if shutdown cut the pause short
    async fn pace(&self, sent: usize) -> bool {
        let pace = self.plan.pace_after(sent, self.rng);
        match pace.kind {
            PauseKind::Long => {
                let minutes = (pace.duration.as_secs_f64() / 60.0).round();
                info!(minutes, "😴 Long pause");
            }
            PauseKind::Short => debug!(millis = pace.duration.as_millis(), "Pause"),
        }

        tokio::select! {
            () = self.pause.pause(pace.duration) => true,
            () = self.shutdown.cancelled() => false,
        }
    }
}
