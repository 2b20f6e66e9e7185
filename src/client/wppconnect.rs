//! [WPPConnect Server](https://github.com/wppconnect-team/wppconnect-server) REST client.
//!
//! The bridge owns the browser, the QR login and the session directory. This
//! client only issues authenticated REST calls against `/api/{session}/...`.

use super::{ChatClient, ClientError, GroupMember, MediaPayload};
use crate::config::{Settings, BRIDGE_REQUEST_TIMEOUT_SECS};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Connection state reported by `status-session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Logged in and ready to send
    Connected,
    /// Waiting for the QR code to be scanned
    QrCode,
    /// Browser still starting
    Initializing,
    /// Session closed or unknown
    Closed,
}

impl SessionState {
    fn from_wire(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "CONNECTED" | "INCHAT" | "ISLOGGED" => Self::Connected,
            "QRCODE" | "NOTLOGGED" => Self::QrCode,
            "INITIALIZING" | "STARTING" | "OPENING" => Self::Initializing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
}

/// Contact id as returned by `group-members-ids`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContactId {
    Structured {
        #[serde(rename = "_serialized")]
        serialized: String,
        #[serde(default)]
        user: Option<String>,
    },
    Plain(String),
}

impl From<WireContactId> for GroupMember {
    fn from(id: WireContactId) -> Self {
        match id {
            WireContactId::Structured {
                serialized,
                user: Some(user),
            } => Self {
                id: serialized,
                display_name: user,
            },
            WireContactId::Structured {
                serialized,
                user: None,
            }
            | WireContactId::Plain(serialized) => Self::from_id(serialized),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    #[serde(alias = "data")]
    base64: String,
    #[serde(default = "default_mimetype")]
    mimetype: String,
}

fn default_mimetype() -> String {
    "image/jpeg".to_string()
}

/// REST client bound to one bridge session
#[derive(Clone)]
pub struct WppConnectClient {
    http: Client,
    base_url: String,
    session: String,
    token: String,
}

impl WppConnectClient {
    /// Create a client using an already issued bearer token
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_token(
        base_url: &str,
        session: &str,
        token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: session.to_string(),
            token: token.into(),
        })
    }

    /// Create a client from settings, generating a token from the secret key when
    /// no token is configured
    ///
    /// # Errors
    ///
    /// Returns an error if neither `WPP_TOKEN` nor `WPP_SECRET_KEY` is set, or if
    /// token generation fails.
    pub async fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        if let Some(token) = settings.wpp_token.as_deref() {
            return Self::with_token(&settings.wpp_base_url, &settings.session_name, token);
        }
        let secret = settings
            .wpp_secret_key
            .as_deref()
            .ok_or(ClientError::MissingCredentials)?;

        let http = build_http()?;
        let base_url = settings.wpp_base_url.trim_end_matches('/');
        let url = format!(
            "{base_url}/api/{}/{secret}/generate-token",
            settings.session_name
        );
        let response = http.post(url).send().await?;
        let token: TokenResponse = serde_json::from_value(read_json(response).await?)?;
        info!(session = %settings.session_name, "Bridge token generated.");

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            session: settings.session_name.clone(),
            token: token.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, self.session, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        read_json(response).await
    }

    /// Ask the bridge to open the session, optionally registering the webhook
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge rejects the request.
    pub async fn start_session(&self, webhook: Option<&str>) -> Result<SessionState, ClientError> {
        let body = json!({
            "webhook": webhook.unwrap_or_default(),
            "waitQrCode": false,
        });
        let value = self.post("start-session", &body).await?;
        let status: StatusResponse = serde_json::from_value(value)?;
        Ok(SessionState::from_wire(&status.status))
    }

    /// Current connection state of the session
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge cannot be reached.
    pub async fn status(&self) -> Result<SessionState, ClientError> {
        let value = self.get("status-session").await?;
        let status: StatusResponse = serde_json::from_value(value)?;
        Ok(SessionState::from_wire(&status.status))
    }
}

fn build_http() -> Result<Client, ClientError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(BRIDGE_REQUEST_TIMEOUT_SECS))
        .build()?)
}

/// Read a bridge response, mapping HTTP and `{"status": "error"}` failures to errors
async fn read_json(response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let value: Value = serde_json::from_str(&body)?;
    check_bridge_status(value)
}

fn check_bridge_status(value: Value) -> Result<Value, ClientError> {
    if value.get("status").and_then(Value::as_str) == Some("error") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown bridge error")
            .to_string();
        return Err(ClientError::Bridge(message));
    }
    Ok(value)
}

/// Strip a `data:<mime>;base64,` prefix if the bridge included one
fn strip_data_uri(raw: &str) -> &str {
    if raw.starts_with("data:") {
        if let Some((_, data)) = raw.split_once(',') {
            return data;
        }
    }
    raw
}

fn parse_members(value: Value) -> Result<Vec<GroupMember>, ClientError> {
    let list = match value {
        Value::Object(mut map) => map.remove("response").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    let ids: Vec<WireContactId> = serde_json::from_value(list)?;
    Ok(ids.into_iter().map(GroupMember::from).collect())
}

fn parse_media(value: Value) -> Result<MediaPayload, ClientError> {
    let payload = match value {
        Value::Object(mut map) if map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    };
    let media: WireMedia = serde_json::from_value(payload)?;
    Ok(MediaPayload {
        base64: strip_data_uri(&media.base64).to_string(),
        mimetype: media.mimetype,
    })
}

#[async_trait]
impl ChatClient for WppConnectClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ClientError> {
        let body = json!({
            "phone": to,
            "isGroup": false,
            "message": text,
        });
        self.post("send-message", &body).await?;
        debug!(to = %to, "Text delivered to bridge");
        Ok(())
    }

    async fn send_image(
        &self,
        to: &str,
        media: &MediaPayload,
        filename: &str,
        caption: &str,
    ) -> Result<(), ClientError> {
        let body = json!({
            "phone": to,
            "isGroup": false,
            "filename": filename,
            "caption": caption,
            "base64": media.data_uri(),
        });
        self.post("send-image", &body).await?;
        debug!(to = %to, "Image delivered to bridge");
        Ok(())
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, ClientError> {
        let value = self.get(&format!("group-members-ids/{group_id}")).await?;
        parse_members(value)
    }

    async fn download_media(&self, message_id: &str) -> Result<MediaPayload, ClientError> {
        let value = self
            .post("download-media", &json!({ "messageId": message_id }))
            .await?;
        parse_media(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_members_structured_and_plain() -> Result<(), ClientError> {
        let value = json!({
            "status": "success",
            "response": [
                { "server": "c.us", "user": "237600000001", "_serialized": "237600000001@c.us" },
                "237600000002@c.us",
                { "_serialized": "4455@lid" }
            ]
        });
        let members = parse_members(value)?;
        assert_eq!(
            members,
            vec![
                GroupMember {
                    id: "237600000001@c.us".to_string(),
                    display_name: "237600000001".to_string(),
                },
                GroupMember::from_id("237600000002@c.us"),
                GroupMember::from_id("4455@lid"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_media_strips_data_uri() -> Result<(), ClientError> {
        let value = json!({ "base64": "data:image/png;base64,iVBO", "mimetype": "image/png" });
        let media = parse_media(value)?;
        assert_eq!(media.base64, "iVBO");
        assert_eq!(media.mimetype, "image/png");

        let wrapped = json!({ "status": "success", "response": { "data": "QUJD" } });
        let media = parse_media(wrapped)?;
        assert_eq!(media.base64, "QUJD");
        assert_eq!(media.mimetype, "image/jpeg");
        Ok(())
    }

    #[test]
    fn test_bridge_error_status() {
        let err = check_bridge_status(json!({ "status": "error", "message": "Not connected" }));
        assert!(matches!(err, Err(ClientError::Bridge(m)) if m == "Not connected"));
        assert!(check_bridge_status(json!({ "status": "success" })).is_ok());
    }

    #[test]
    fn test_session_state_mapping() {
        assert_eq!(SessionState::from_wire("CONNECTED"), SessionState::Connected);
        assert_eq!(SessionState::from_wire("qrcode"), SessionState::QrCode);
        assert_eq!(SessionState::from_wire("INITIALIZING"), SessionState::Initializing);
        assert_eq!(SessionState::from_wire("CLOSED"), SessionState::Closed);
    }

    #[test]
    fn test_url_layout() -> Result<(), ClientError> {
        let client = WppConnectClient::with_token("http://bridge:21465/", "famille", "tok")?;
        assert_eq!(
            client.url("send-message"),
            "http://bridge:21465/api/famille/send-message"
        );
        Ok(())
    }
}
