//! Builds the text that is sent to every recipient.

use super::pacing::RandomSource;
use crate::config::{BroadcastConfig, TriggerTag, DECORATIVE_SUFFIXES, MIN_CONTENT_CHARS};

/// Applies the banner, signature and decorative suffix
#[derive(Debug, Clone)]
pub struct ContentFormatter {
    tag: TriggerTag,
    banner: String,
    signature: String,
}

impl ContentFormatter {
    /// Create a formatter from the broadcast config
    #[must_use]
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            tag: config.trigger_tag.clone(),
            banner: config.banner.clone(),
            signature: config.signature.clone(),
        }
    }

    /// Remove every occurrence of the trigger tag and trim the result
    ///
    /// Applying it twice yields the same string as applying it once.
    ///
    /// # Examples
    ///
    /// ```
    /// use nyamsi_connect::config::{BroadcastConfig, Settings};
    /// use nyamsi_connect::relay::ContentFormatter;
    ///
    /// # fn main() -> Result<(), config::ConfigError> {
    /// let settings: Settings = config::Config::builder().build()?.try_deserialize()?;
    /// let formatter = ContentFormatter::new(&BroadcastConfig::from_settings(&settings)?);
    /// assert_eq!(formatter.clean_message("Bonjour @tous !!!"), "Bonjour  !!!");
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn clean_message(&self, text: &str) -> String {
        self.tag.strip(text).trim().to_string()
    }

    /// Clean `text` and reject it when too little content remains
    #[must_use]
    pub fn validated_content(&self, text: &str) -> Option<String> {
        let cleaned = self.clean_message(text);
        (cleaned.chars().count() >= MIN_CONTENT_CHARS).then_some(cleaned)
    }

    /// Banner, blank line, content and signature
    #[must_use]
    pub fn format_broadcast(&self, content: &str) -> String {
        format!("{}\n\n{content}{}", self.banner, self.signature)
    }

    /// Append one decorative suffix, possibly empty, on its own line
    #[must_use]
    pub fn humanize(&self, text: &str, rng: &dyn RandomSource) -> String {
        let index = rng.choose_index(DECORATIVE_SUFFIXES.len());
        let suffix = DECORATIVE_SUFFIXES.get(index).copied().unwrap_or_default();
        format!("{text}\n{suffix}")
    }

    /// Full message for already validated content
    #[must_use]
    pub fn final_message(&self, content: &str, rng: &dyn RandomSource) -> String {
        self.humanize(&self.format_broadcast(content), rng)
    }
}
