#![deny(missing_docs)]
//! Nyamsi Connect: WhatsApp group broadcast relay.
//!
//! An administrator tags a group message and the relay re-sends it as a direct
//! message to every other member of the group, pacing the sends.

/// Chat client abstraction and the WPPConnect implementation.
pub mod client;
/// Configuration management.
pub mod config;
/// Broadcast pipeline.
pub mod relay;
/// Process runtime.
pub mod runner;
/// Utility functions.
pub mod utils;
/// Inbound webhook.
pub mod webhook;

/// Test fakes.
#[cfg(test)]
pub mod testing;
