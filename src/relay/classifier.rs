//! Recognizes broadcast triggers among inbound chat events.

use crate::config::TriggerTag;

/// Kind of content carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Plain text, read from the body
    Text,
    /// An image, read from the caption
    Image,
}

impl ContentKind {
    /// Map the bridge's message type; everything but `image` reads as text
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("image") {
            Self::Image
        } else {
            Self::Text
        }
    }
}

/// An inbound chat event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Message id, used to download media
    pub message_id: String,
    /// Chat the message was posted in
    pub origin_id: String,
    /// Sender of the message
    pub author_id: String,
    /// Body text
    pub body: Option<String>,
    /// Media caption
    pub caption: Option<String>,
    /// Content kind
    pub kind: ContentKind,
    /// Whether the message was posted in a group
    pub is_group: bool,
    /// Whether the message was sent by the bot's own account
    pub is_self_sent: bool,
}

/// A qualifying broadcast command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    /// Group whose members receive the broadcast
    pub origin_group_id: String,
    /// Administrator who posted the command
    pub author_id: String,
    /// Whether the command came from the bot's own account
    pub is_self_sent: bool,
    /// Content kind
    pub kind: ContentKind,
    /// Body text of the triggering message
    pub raw_text: Option<String>,
    /// Caption of the triggering message
    pub raw_caption: Option<String>,
    /// Message to download media from, for image broadcasts
    pub media_ref: Option<String>,
}

impl BroadcastRequest {
    /// Caption for images, body otherwise
    #[must_use]
    pub fn text_content(&self) -> &str {
        let text = match self.kind {
            ContentKind::Image => self.raw_caption.as_deref(),
            ContentKind::Text => self.raw_text.as_deref(),
        };
        text.unwrap_or_default()
    }
}

/// Turn an inbound event into a broadcast request, or `None` when it is not one
#[must_use]
pub fn classify(message: &InboundMessage, tag: &TriggerTag) -> Option<BroadcastRequest> {
    if !message.is_group {
        return None;
    }

    let text_content = match message.kind {
        ContentKind::Image => message.caption.as_deref(),
        ContentKind::Text => message.body.as_deref(),
    }?;
    if !tag.is_in(text_content) {
        return None;
    }

    Some(BroadcastRequest {
        origin_group_id: message.origin_id.clone(),
        author_id: message.author_id.clone(),
        is_self_sent: message.is_self_sent,
        kind: message.kind,
        raw_text: message.body.clone(),
        raw_caption: message.caption.clone(),
        media_ref: (message.kind == ContentKind::Image).then(|| message.message_id.clone()),
    })
}
