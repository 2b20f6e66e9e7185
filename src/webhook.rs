//! Inbound webhook receiving bridge events.
//!
//! Each accepted message is handed to its own tracked task, so the HTTP response
//! never waits for a broadcast to finish.

use crate::relay::{BroadcastRelay, ContentKind, InboundMessage};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

/// Shared webhook state
#[derive(Clone)]
pub struct WebhookState {
    /// Relay every accepted message is handed to
    pub relay: Arc<BroadcastRelay>,
    /// Tracks broadcast tasks so shutdown can wait for them
    pub tasks: TaskTracker,
}

/// Message id, either serialized or as the structured key
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireMessageId {
    Plain(String),
    Structured {
        #[serde(rename = "_serialized")]
        serialized: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WireSender {
    #[serde(default)]
    id: Option<WireMessageId>,
}

/// Event payload posted by the bridge
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(default)]
    event: String,
    #[serde(default)]
    id: Option<WireMessageId>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    sender: Option<WireSender>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    from_me: bool,
    #[serde(default)]
    is_group_msg: bool,
}

fn serialized(id: WireMessageId) -> String {
    match id {
        WireMessageId::Plain(id) | WireMessageId::Structured { serialized: id } => id,
    }
}

impl WebhookEvent {
    /// Convert a message event; other events and authorless messages yield `None`
    #[must_use]
    pub fn into_message(self) -> Option<InboundMessage> {
        if !matches!(self.event.as_str(), "onmessage" | "onselfmessage") {
            return None;
        }
        let origin_id = self.from?;
        let author_id = self
            .author
            .or_else(|| self.sender.and_then(|s| s.id).map(serialized))?;

        Some(InboundMessage {
            message_id: self.id.map(serialized).unwrap_or_default(),
            origin_id,
            author_id,
            body: self.body,
            caption: self.caption,
            kind: ContentKind::from_wire(self.kind.as_deref().unwrap_or("chat")),
            is_group: self.is_group_msg,
            is_self_sent: self.from_me,
        })
    }
}

/// Build the webhook router
pub fn build_app(state: WebhookState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/webhook", post(receive_event))
        .with_state(state)
}

async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn receive_event(
    State(state): State<WebhookState>,
    Json(event): Json<WebhookEvent>,
) -> StatusCode {
    let event_name = event.event.clone();
    match event.into_message() {
        Some(message) if message.is_group => {
            let relay = state.relay.clone();
            state.tasks.spawn(async move {
                relay.handle_message(&message).await;
            });
        }
        Some(message) => trace!(origin = %message.origin_id, "Private message ignored"),
        None => debug!(event = %event_name, "Event ignored"),
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockChatClient;
    use crate::config::{test_settings, BroadcastConfig};
    use crate::relay::notices;
    use crate::testing::{
        group_members, FixedClock, FixedRandom, RecordingClient, RecordingPause, Sent,
    };
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn event(value: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(value).expect("event")
    }

    #[test]
    fn test_group_message_conversion() {
        let message = event(json!({
            "event": "onmessage",
            "session": "nyamsi-connect",
            "id": "false_120363000000@g.us_3EB0_98765432@lid",
            "from": "120363000000@g.us",
            "author": "98765432@lid",
            "body": "Réunion @tous",
            "type": "chat",
            "fromMe": false,
            "isGroupMsg": true
        }))
        .into_message()
        .expect("message");

        assert_eq!(message.origin_id, "120363000000@g.us");
        assert_eq!(message.author_id, "98765432@lid");
        assert_eq!(message.kind, ContentKind::Text);
        assert!(message.is_group);
        assert!(!message.is_self_sent);
    }

    #[test]
    fn test_image_with_structured_ids() {
        let message = event(json!({
            "event": "onselfmessage",
            "id": { "_serialized": "true_120363000000@g.us_3EB1" },
            "from": "120363000000@g.us",
            "sender": { "id": { "_serialized": "237600000000@c.us" } },
            "body": "/9j/4AAQ",
            "caption": "Photo @tous",
            "type": "image",
            "fromMe": true,
            "isGroupMsg": true
        }))
        .into_message()
        .expect("message");

        assert_eq!(message.message_id, "true_120363000000@g.us_3EB1");
        assert_eq!(message.author_id, "237600000000@c.us");
        assert_eq!(message.kind, ContentKind::Image);
        assert_eq!(message.caption.as_deref(), Some("Photo @tous"));
        assert!(message.is_self_sent);
    }

    #[test]
    fn test_other_events_and_authorless_dropped() {
        assert!(event(json!({ "event": "onack", "from": "x@c.us", "author": "y@c.us" }))
            .into_message()
            .is_none());
        assert!(event(json!({ "event": "onmessage", "from": "120363000000@g.us" }))
            .into_message()
            .is_none());
    }

    #[tokio::test]
    async fn test_router_accepts_events() {
        let mut client = MockChatClient::new();
        client.expect_send_text().never();
        let config = BroadcastConfig::from_settings(&test_settings()).expect("config");
        let relay = Arc::new(BroadcastRelay::new(Arc::new(client), Arc::new(config)));
        let app = build_app(WebhookState {
            relay,
            tasks: TaskTracker::new(),
        });

        let body = json!({ "event": "onpresencechanged", "id": "x" }).to_string();
        let response = app
            .clone()
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/livez").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    fn recording_app(client: Arc<RecordingClient>, tasks: TaskTracker) -> Router {
        let config = BroadcastConfig::from_settings(&test_settings()).expect("config");
        let relay = BroadcastRelay::new(client, Arc::new(config))
            .with_clock(Arc::new(FixedClock(12)))
            .with_random(Arc::new(FixedRandom))
            .with_pause(Arc::new(RecordingPause::default()));
        build_app(WebhookState {
            relay: Arc::new(relay),
            tasks,
        })
    }

    fn tagged_event(is_group: bool) -> Request<Body> {
        let body = json!({
            "event": "onmessage",
            "id": "false_120363000000@g.us_3EB0_98765432@lid",
            "from": "120363000000@g.us",
            "author": "98765432@lid",
            "body": "Réunion dimanche @tous",
            "type": "chat",
            "fromMe": false,
            "isGroupMsg": is_group
        })
        .to_string();
        Request::post("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn test_group_trigger_runs_broadcast_task() {
        let mut members = group_members(3);
        members.push(crate::client::GroupMember::from_id("98765432@lid"));
        let client = Arc::new(RecordingClient::with_members(members));
        let tasks = TaskTracker::new();
        let app = recording_app(client.clone(), tasks.clone());

        let response = app.oneshot(tagged_event(true)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        tasks.close();
        tasks.wait().await;

        let sent = client.sent();
        assert_eq!(sent.len(), 5);
        assert_eq!(
            sent[0],
            Sent::Text {
                to: "98765432@lid".to_string(),
                text: notices::in_progress(3),
            }
        );
        assert!(sent[1..4].iter().all(|s| matches!(
            s,
            Sent::Text { to, text } if to != "98765432@lid" && text.contains("Réunion dimanche")
        )));
        assert!(matches!(
            &sent[4],
            Sent::Text { to, text } if to == "98765432@lid" && text.starts_with("✅ *Diffusion terminée*")
        ));
    }

    #[tokio::test]
    async fn test_private_trigger_not_dispatched() {
        let client = Arc::new(RecordingClient::with_members(group_members(3)));
        let tasks = TaskTracker::new();
        let app = recording_app(client.clone(), tasks.clone());

        let response = app.oneshot(tagged_event(false)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        tasks.close();
        assert!(tasks.is_empty());
        tasks.wait().await;
        assert!(client.sent().is_empty());
    }
}
