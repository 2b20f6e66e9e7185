use dotenvy::dotenv;
use nyamsi_connect::config::{BroadcastConfig, Settings};
use nyamsi_connect::runner::run;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    secret_in_url: Regex,
    bearer: Regex,
    secret_env: Regex,
    token_json: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            secret_in_url: Regex::new(r"(/api/[^/\s]+/)([^/\s]+)(/generate-token)")?,
            bearer: Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._$/+=-]+")?,
            secret_env: Regex::new(r"(WPP_(?:SECRET_KEY|TOKEN)=)[^\s&]+")?,
            token_json: Regex::new(r#"("token"\s*:\s*")[^"]*(")"#)?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .secret_in_url
            .replace_all(&output, "$1[MASKED]$3")
            .to_string();
        output = self.bearer.replace_all(&output, "$1[MASKED]").to_string();
        output = self
            .secret_env
            .replace_all(&output, "$1[MASKED]")
            .to_string();
        output = self
            .token_json
            .replace_all(&output, "$1[MASKED]$2")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the input length, the redacted one may differ
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Redaction must be ready before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("🚀 Nyamsi Connect starting...");

    let (settings, config) = init_settings();

    run(settings, config).await?;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("nyamsi_connect=info,hyper=warn,reqwest=warn,tower=warn,axum=warn")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> (Arc<Settings>, Arc<BroadcastConfig>) {
    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let config = match BroadcastConfig::from_settings(&settings) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid broadcast configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        session = %settings.session_name,
        headless = settings.headless,
        policy = ?config.auth_policy,
        tag = %config.trigger_tag.as_str(),
        "Configuration loaded successfully."
    );
    if config.admin_phone_digits.is_empty() {
        warn!("No admin phone numbers configured (ADMIN_PHONES).");
    } else {
        info!(admins = ?config.admin_phone_digits, "Admin phone numbers loaded.");
    }

    (Arc::new(settings), Arc::new(config))
}
