//! Chat client abstraction
//!
//! The relay only needs four primitives from the WhatsApp side: listing group
//! members, downloading the media of a message, and sending text or images.

/// WPPConnect Server implementation.
pub mod wppconnect;

use async_trait::async_trait;
use thiserror::Error;

pub use wppconnect::WppConnectClient;

/// Errors that can occur while talking to the chat client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Error during network communication
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status returned by the bridge
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },
    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The bridge answered but reported a failure
    #[error("Bridge error: {0}")]
    Bridge(String),
    /// Neither a token nor a secret key is configured
    #[error("either WPP_TOKEN or WPP_SECRET_KEY must be set")]
    MissingCredentials,
}

impl ClientError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Bridge(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::MissingCredentials => false,
        }
    }
}

/// A member of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// Serialized chat identifier, e.g. `237600000000@c.us`
    pub id: String,
    /// User part of the identifier, used in logs
    pub display_name: String,
}

impl GroupMember {
    /// Build a member from its serialized id, deriving the display name from the user part
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = id.split('@').next().unwrap_or_default().to_string();
        Self { id, display_name }
    }
}

/// Base64 media as returned by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Base64-encoded bytes, without a data URI prefix
    pub base64: String,
    /// MIME type of the media
    pub mimetype: String,
}

impl MediaPayload {
    /// Render the payload as a `data:` URI
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mimetype, self.base64)
    }
}

/// Outbound primitives of the WhatsApp chat client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ClientError>;
    /// Send an image with a caption
    async fn send_image(
        &self,
        to: &str,
        media: &MediaPayload,
        filename: &str,
        caption: &str,
    ) -> Result<(), ClientError>;
    /// List the members of a group
    async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, ClientError>;
    /// Download the media attached to a message
    async fn download_media(&self, message_id: &str) -> Result<MediaPayload, ClientError>;
}
