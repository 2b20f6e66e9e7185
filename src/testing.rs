//! Testing helpers and fakes.
//!
//! Deterministic stand-ins for the chat client, random source, clock and pause.

use crate::client::{ChatClient, ClientError, GroupMember, MediaPayload};
use crate::relay::{BroadcastRequest, Clock, ContentKind, InboundMessage, Pause, RandomSource};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// An outbound call recorded by [`RecordingClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `send_text`
    Text {
        /// Recipient
        to: String,
        /// Text
        text: String,
    },
    /// `send_image`
    Image {
        /// Recipient
        to: String,
        /// Caption
        caption: String,
        /// Attachment filename
        filename: String,
    },
}

/// In-memory chat client that records every send
#[derive(Default)]
pub struct RecordingClient {
    members: Vec<GroupMember>,
    failing_targets: HashSet<String>,
    fail_members: bool,
    failing_downloads: AtomicUsize,
    downloads: AtomicUsize,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingClient {
    /// Client whose group contains `members`
    #[must_use]
    pub fn with_members(members: Vec<GroupMember>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    /// Client whose member listing always fails
    #[must_use]
    pub fn failing_members() -> Self {
        Self {
            fail_members: true,
            ..Self::default()
        }
    }

    /// Make every send to `id` fail
    pub fn fail_target(&mut self, id: &str) {
        self.failing_targets.insert(id.to_string());
    }

    /// Make the next `count` media downloads fail
    pub fn fail_next_downloads(&self, count: usize) {
        self.failing_downloads.store(count, Ordering::SeqCst);
    }

    /// Every recorded send, in order
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Number of download attempts
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().expect("sent lock").push(sent);
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ClientError> {
        if self.failing_targets.contains(to) {
            return Err(ClientError::Bridge(format!("cannot reach {to}")));
        }
        self.record(Sent::Text {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_image(
        &self,
        to: &str,
        _media: &MediaPayload,
        filename: &str,
        caption: &str,
    ) -> Result<(), ClientError> {
        if self.failing_targets.contains(to) {
            return Err(ClientError::Bridge(format!("cannot reach {to}")));
        }
        self.record(Sent::Image {
            to: to.to_string(),
            caption: caption.to_string(),
            filename: filename.to_string(),
        });
        Ok(())
    }

    async fn group_members(&self, _group_id: &str) -> Result<Vec<GroupMember>, ClientError> {
        if self.fail_members {
            return Err(ClientError::Api {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(self.members.clone())
    }

    async fn download_media(&self, _message_id: &str) -> Result<MediaPayload, ClientError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_downloads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_downloads.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::Bridge("media expired".to_string()));
        }
        Ok(MediaPayload {
            base64: "/9j/4AAQ".to_string(),
            mimetype: "image/jpeg".to_string(),
        })
    }
}

/// Pause that returns immediately and records the requested durations
#[derive(Default)]
pub struct RecordingPause {
    durations: Mutex<Vec<Duration>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingPause {
    /// Cancel `token` during the `calls`-th pause
    #[must_use]
    pub fn cancelling_after(calls: usize, token: CancellationToken) -> Self {
        Self {
            durations: Mutex::new(Vec::new()),
            cancel_after: Some((calls, token)),
        }
    }

    /// Requested durations, in order
    #[must_use]
    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().expect("durations lock").clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        let calls = {
            let mut durations = self.durations.lock().expect("durations lock");
            durations.push(duration);
            durations.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if calls >= *after {
                token.cancel();
            }
        }
    }
}

/// Random source that always picks the lower bound and the second suffix
pub struct FixedRandom;

impl RandomSource for FixedRandom {
    fn uniform_inclusive(&self, low: u64, _high: u64) -> u64 {
        low
    }

    fn choose_index(&self, len: usize) -> usize {
        1.min(len.saturating_sub(1))
    }
}

/// Clock stuck on one hour
pub struct FixedClock(pub u32);

impl Clock for FixedClock {
    fn local_hour(&self) -> u32 {
        self.0
    }
}

/// `count` members, `237600000000@c.us` first
#[must_use]
pub fn group_members(count: usize) -> Vec<GroupMember> {
    (0..count)
        .map(|i| GroupMember::from_id(format!("23760000000{i}@c.us")))
        .collect()
}

/// Text broadcast request from `author`
#[must_use]
pub fn text_request(author: &str, body: &str) -> BroadcastRequest {
    BroadcastRequest {
        origin_group_id: "120363000000@g.us".to_string(),
        author_id: author.to_string(),
        is_self_sent: false,
        kind: ContentKind::Text,
        raw_text: Some(body.to_string()),
        raw_caption: None,
        media_ref: None,
    }
}

/// Group text message from `author`
#[must_use]
pub fn group_message(author: &str, body: &str) -> InboundMessage {
    InboundMessage {
        message_id: "true_120363000000@g.us_3EB0".to_string(),
        origin_id: "120363000000@g.us".to_string(),
        author_id: author.to_string(),
        body: Some(body.to_string()),
        caption: None,
        kind: ContentKind::Text,
        is_group: true,
        is_self_sent: false,
    }
}
