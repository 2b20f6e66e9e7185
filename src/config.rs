//! Configuration and settings management
//!
//! Loads raw settings from config files and environment variables, then
//! validates them into the immutable [`BroadcastConfig`] handed to the relay.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use config::{Config, ConfigError, Environment, File};
use lazy_regex::lazy_regex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Anything that is not an ASCII digit
static RE_NON_DIGIT: lazy_regex::Lazy<Regex> = lazy_regex!(r"\D");

/// Identifier suffix the chat client uses for privacy-masked accounts
pub const ORIGIN_MARKER: &str = "@lid";

/// Filename attached to image broadcasts
pub const BROADCAST_IMAGE_FILENAME: &str = "broadcast.jpg";

/// Minimum number of characters a cleaned broadcast must keep
pub const MIN_CONTENT_CHARS: usize = 3;

/// Decorative suffixes, one of which is appended to every broadcast
pub const DECORATIVE_SUFFIXES: &[&str] = &["🙏", "📌", "🔔", "ℹ️", ""];

/// Initial backoff for bridge bootstrap calls
pub const BRIDGE_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for bridge bootstrap calls
pub const BRIDGE_MAX_BACKOFF_MS: u64 = 10_000;
/// Number of retries for bridge bootstrap calls
pub const BRIDGE_MAX_RETRIES: usize = 5;
/// Timeout applied to every request sent to the bridge
pub const BRIDGE_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Which rule decides that a trigger author may broadcast
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Self-sent messages or authors carrying the origin marker
    #[default]
    OriginMarker,
    /// Self-sent messages or authors whose phone digits are in the admin list
    AdminPhones,
    /// Any of the above
    Either,
}

/// Raw application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Bridge session name
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Whether the bridge browser runs headless
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Comma-separated list of admin phone numbers
    pub admin_phones: Option<String>,

    /// Substring that marks a group message as a broadcast command
    #[serde(default = "default_trigger_tag")]
    pub trigger_tag: String,
    /// Lower bound of the pause between two sends
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound of the pause between two sends
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum number of successful sends per broadcast
    #[serde(default = "default_max_messages_per_session")]
    pub max_messages_per_session: usize,
    /// A long pause is taken every this many successful sends
    #[serde(default = "default_long_pause_every")]
    pub long_pause_every: usize,
    /// Lower bound of a long pause
    #[serde(default = "default_long_pause_min_ms")]
    pub long_pause_min_ms: u64,
    /// Upper bound of a long pause
    #[serde(default = "default_long_pause_max_ms")]
    pub long_pause_max_ms: u64,
    /// First hour (inclusive) broadcasts are allowed
    #[serde(default = "default_allowed_hours_start")]
    pub allowed_hours_start: u32,
    /// Last hour (exclusive) broadcasts are allowed
    #[serde(default = "default_allowed_hours_end")]
    pub allowed_hours_end: u32,
    /// Heading placed above every broadcast
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Block appended after every broadcast
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Authorization rule
    #[serde(default)]
    pub auth_policy: AuthPolicy,

    /// WPPConnect Server base URL
    #[serde(default = "default_wpp_base_url")]
    pub wpp_base_url: String,
    /// WPPConnect Server secret used to generate a session token
    pub wpp_secret_key: Option<String>,
    /// Pre-issued WPPConnect bearer token
    pub wpp_token: Option<String>,
    /// Address the inbound webhook listens on
    #[serde(default = "default_webhook_bind")]
    pub webhook_bind: String,
    /// Public URL of the webhook, registered with the bridge at session start
    pub webhook_public_url: Option<String>,
}

fn default_session_name() -> String {
    "nyamsi-connect".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_trigger_tag() -> String {
    "@tous".to_string()
}

const fn default_min_delay_ms() -> u64 {
    12_000
}

const fn default_max_delay_ms() -> u64 {
    25_000
}

const fn default_max_messages_per_session() -> usize {
    120
}

const fn default_long_pause_every() -> usize {
    25
}

const fn default_long_pause_min_ms() -> u64 {
    10 * 60 * 1000
}

const fn default_long_pause_max_ms() -> u64 {
    20 * 60 * 1000
}

const fn default_allowed_hours_start() -> u32 {
    8
}

const fn default_allowed_hours_end() -> u32 {
    22
}

fn default_banner() -> String {
    "*MESSAGE IMPORTANT DE LA FAMILLE* 🔔".to_string()
}

fn default_signature() -> String {
    "\n\n📢 _Envoyé par le Secrétariat Famille Nyamsi_".to_string()
}

fn default_wpp_base_url() -> String {
    "http://localhost:21465".to_string()
}

fn default_webhook_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
            .add_source(
                Environment::default()
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the admin phone numbers reduced to their digits
    #[must_use]
    pub fn admin_phone_digits(&self) -> HashSet<String> {
        self.admin_phones
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|num| RE_NON_DIGIT.replace_all(num, "").into_owned())
                    .filter(|digits| !digits.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Case-insensitive matcher for the trigger tag
#[derive(Debug, Clone)]
pub struct TriggerTag {
    literal: String,
    pattern: Regex,
}

impl TriggerTag {
    /// Compile a matcher for `tag`, treating it as a literal
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the tag is blank.
    pub fn new(tag: &str) -> Result<Self, ConfigError> {
        let literal = tag.trim();
        if literal.is_empty() {
            return Err(ConfigError::Message(
                "trigger_tag must not be empty".to_string(),
            ));
        }
        let pattern = RegexBuilder::new(&regex::escape(literal))
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Message(format!("invalid trigger_tag: {e}")))?;

        Ok(Self {
            literal: literal.to_string(),
            pattern,
        })
    }

    /// The tag as configured
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    /// Whether `text` contains the tag, ignoring case
    #[must_use]
    pub fn is_in(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Remove every occurrence of the tag, including ones formed by a previous removal
    #[must_use]
    pub fn strip(&self, text: &str) -> String {
        let mut current = text.to_string();
        while self.pattern.is_match(&current) {
            current = self.pattern.replace_all(&current, "").into_owned();
        }
        current
    }
}

/// Validated, immutable broadcast settings
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Admin phone numbers, digits only
    pub admin_phone_digits: HashSet<String>,
    /// Broadcast trigger
    pub trigger_tag: TriggerTag,
    /// Lower bound of the pause between two sends
    pub min_delay: Duration,
    /// Upper bound of the pause between two sends
    pub max_delay: Duration,
    /// Maximum number of successful sends per broadcast
    pub max_messages_per_session: usize,
    /// A long pause is taken every this many successful sends
    pub long_pause_every: usize,
    /// Lower bound of a long pause
    pub long_pause_min: Duration,
    /// Upper bound of a long pause
    pub long_pause_max: Duration,
    /// First hour (inclusive) broadcasts are allowed
    pub allowed_hour_start: u32,
    /// Last hour (exclusive) broadcasts are allowed
    pub allowed_hour_end: u32,
    /// Heading placed above every broadcast
    pub banner: String,
    /// Block appended after every broadcast
    pub signature: String,
    /// Authorization rule
    pub auth_policy: AuthPolicy,
}

impl BroadcastConfig {
    /// Validate raw settings
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first inconsistent value.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        if settings.min_delay_ms > settings.max_delay_ms {
            return Err(ConfigError::Message(
                "min_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if settings.long_pause_min_ms > settings.long_pause_max_ms {
            return Err(ConfigError::Message(
                "long_pause_min_ms must not exceed long_pause_max_ms".to_string(),
            ));
        }
        if settings.long_pause_every == 0 {
            return Err(ConfigError::Message(
                "long_pause_every must be at least 1".to_string(),
            ));
        }
        if settings.max_messages_per_session == 0 {
            return Err(ConfigError::Message(
                "max_messages_per_session must be at least 1".to_string(),
            ));
        }
        if settings.allowed_hours_start >= settings.allowed_hours_end
            || settings.allowed_hours_end > 24
        {
            return Err(ConfigError::Message(format!(
                "allowed hours {}..{} are not a valid window",
                settings.allowed_hours_start, settings.allowed_hours_end
            )));
        }

        Ok(Self {
            admin_phone_digits: settings.admin_phone_digits(),
            trigger_tag: TriggerTag::new(&settings.trigger_tag)?,
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_messages_per_session: settings.max_messages_per_session,
            long_pause_every: settings.long_pause_every,
            long_pause_min: Duration::from_millis(settings.long_pause_min_ms),
            long_pause_max: Duration::from_millis(settings.long_pause_max_ms),
            allowed_hour_start: settings.allowed_hours_start,
            allowed_hour_end: settings.allowed_hours_end,
            banner: settings.banner.clone(),
            signature: settings.signature.clone(),
            auth_policy: settings.auth_policy,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        session_name: default_session_name(),
        headless: true,
        admin_phones: None,
        trigger_tag: default_trigger_tag(),
        min_delay_ms: default_min_delay_ms(),
        max_delay_ms: default_max_delay_ms(),
        max_messages_per_session: default_max_messages_per_session(),
        long_pause_every: default_long_pause_every(),
        long_pause_min_ms: default_long_pause_min_ms(),
        long_pause_max_ms: default_long_pause_max_ms(),
        allowed_hours_start: default_allowed_hours_start(),
        allowed_hours_end: default_allowed_hours_end(),
        banner: default_banner(),
        signature: default_signature(),
        auth_policy: AuthPolicy::default(),
        wpp_base_url: default_wpp_base_url(),
        wpp_secret_key: None,
        wpp_token: None,
        webhook_bind: default_webhook_bind(),
        webhook_public_url: None,
    }
}
