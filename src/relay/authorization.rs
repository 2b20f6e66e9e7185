//! Decides whether a trigger's author may broadcast.

use super::classifier::BroadcastRequest;
use crate::config::{AuthPolicy, BroadcastConfig, ORIGIN_MARKER};
use std::collections::HashSet;

/// Authorization gate built from the configured policy
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    policy: AuthPolicy,
    admin_phone_digits: HashSet<String>,
}

impl AuthorizationGate {
    /// Create a gate from the broadcast config
    #[must_use]
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            policy: config.auth_policy,
            admin_phone_digits: config.admin_phone_digits.clone(),
        }
    }

    /// Self-sent commands are always accepted; otherwise the policy decides
    #[must_use]
    pub fn is_authorized(&self, request: &BroadcastRequest) -> bool {
        if request.is_self_sent {
            return true;
        }
        let author = request.author_id.as_str();
        match self.policy {
            AuthPolicy::OriginMarker => has_origin_marker(author),
            AuthPolicy::AdminPhones => self.is_admin_phone(author),
            AuthPolicy::Either => has_origin_marker(author) || self.is_admin_phone(author),
        }
    }

    fn is_admin_phone(&self, author: &str) -> bool {
        let user = author.split('@').next().unwrap_or_default();
        let digits: String = user.chars().filter(char::is_ascii_digit).collect();
        !digits.is_empty() && self.admin_phone_digits.contains(&digits)
    }
}

fn has_origin_marker(author: &str) -> bool {
    author.contains(ORIGIN_MARKER)
}
