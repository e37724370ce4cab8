//! Identity collaborators. Authentication itself happens upstream (the auth
//! provider or a gateway); the engine only needs an actor id for attribution.

use axum::http::HeaderMap;

use crate::limits::MAX_ID_LEN;

pub trait IdentityProvider: Send + Sync {
    /// The authenticated actor for a request, if any.
    fn actor_id(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header set by an authenticating proxy.
#[derive(Debug, Clone)]
pub struct TrustedHeader {
    header: String,
}

impl TrustedHeader {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl IdentityProvider for TrustedHeader {
    fn actor_id(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if value.is_empty() || value.len() > MAX_ID_LEN {
            return None;
        }
        Some(value.to_string())
    }
}

/// Never yields an actor; owners must then come from the request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn actor_id(&self, _headers: &HeaderMap) -> Option<String> {
        None
    }
}
