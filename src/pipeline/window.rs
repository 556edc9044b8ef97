use std::collections::HashSet;
use std::time::{Duration, Instant};

pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Text before the first `/`. An identity without a separator is its own
/// group; a blank identity belongs to `unknown`.
pub fn derive_group(identity: &str) -> &str {
    let group = identity.split('/').next().unwrap_or_default().trim();
    if group.is_empty() {
        UNKNOWN_IDENTITY
    } else {
        group
    }
}

pub fn is_unknown(identity: &str) -> bool {
    let identity = identity.trim();
    identity.is_empty() || identity == UNKNOWN_IDENTITY
}

/// Last time an allowed subject was in frame, used to keep attributing
/// posture through brief occlusions.
#[derive(Debug, Clone, Default)]
pub struct AllowedGroupWindow {
    last_allowed_seen_at: Option<Instant>,
    last_allowed_identity: Option<String>,
}

impl AllowedGroupWindow {
    pub fn refresh(&mut self, identity: &str, now: Instant) {
        self.last_allowed_seen_at = Some(now);
        self.last_allowed_identity = Some(identity.to_string());
    }

    pub fn within(&self, grace: Duration, now: Instant) -> bool {
        self.last_allowed_seen_at
            .map(|seen| now.saturating_duration_since(seen) <= grace)
            .unwrap_or(false)
    }

    pub fn last_identity(&self) -> Option<&str> {
        self.last_allowed_identity.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The identity posture is attributed to for logging.
    Proceed { identity: String },
    Denied,
}

/// Allow-list of identity groups and exact identities. With both lists
/// empty every frame is authorized.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationFilter {
    groups: HashSet<String>,
    identities: HashSet<String>,
    grace: Duration,
}

impl AuthorizationFilter {
    pub fn new(groups: HashSet<String>, identities: HashSet<String>, grace: Duration) -> Self {
        Self {
            groups,
            identities,
            grace,
        }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        !self.groups.is_empty() || !self.identities.is_empty()
    }

    pub fn allows(&self, identity: &str) -> bool {
        if self.identities.contains(identity) {
            return true;
        }
        !is_unknown(identity) && self.groups.contains(derive_group(identity))
    }

    pub fn authorize(
        &self,
        primary_identity: &str,
        window: &AllowedGroupWindow,
        now: Instant,
    ) -> Authorization {
        if !self.is_configured() || self.allows(primary_identity) {
            return Authorization::Proceed {
                identity: primary_identity.to_string(),
            };
        }

        if !window.within(self.grace, now) {
            return Authorization::Denied;
        }

        let identity = match window.last_identity() {
            Some(last) if is_unknown(primary_identity) => last.to_string(),
            _ => primary_identity.to_string(),
        };
        Authorization::Proceed { identity }
    }
}
