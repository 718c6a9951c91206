//! Provider authentication flows for data-source connectors.
//!
//! Three flow shapes cover every supported provider:
//! 1. Authorization-code with refresh token (Google services)
//! 2. Short-lived to long-lived token exchange (Facebook Ads)
//! 3. Static private token with a liveness check (Shopify)
//!
//! Each flow produces a [`RawCredential`]; the router wraps it into a
//! [`StoredCredential`](crate::credentials::StoredCredential) and persists
//! it. Terminal interaction, the browser redirect listener, and CSRF nonce
//! generation are external collaborators injected through the [`Prompter`]
//! and [`OAuthBroker`] traits.

use crate::credentials::SecretPayload;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

mod exchange;
mod facebook;
mod google;
mod router;
mod shopify;

pub use exchange::{exchange_code_for_tokens, TokenGrant};
pub use facebook::{FacebookFlow, LONG_LIVED_TOKEN_DAYS};
pub use google::GoogleFlow;
pub use router::{resolve, FlowEndpoints, OAuthRouter, ProviderKind};
pub use shopify::ShopifyFlow;

/// Errors terminating an authentication attempt.
///
/// None of these are retried internally; the caller decides whether to
/// prompt the user again or abort.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication cancelled")]
    Cancelled,

    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("browser authorization failed or timed out")]
    AuthorizationFailed,

    #[error("state parameter mismatch (possible CSRF forgery)")]
    StateMismatch,

    #[error(
        "token endpoint returned no refresh token; this app was likely \
         authorized previously - revoke its access and try again"
    )]
    NoRefreshToken,

    #[error("token exchange request failed: {0}")]
    ExchangeTransport(#[from] reqwest::Error),

    #[error("token exchange failed with HTTP {status}: {body}")]
    ExchangeStatus { status: u16, body: String },

    #[error("liveness check failed: {0}")]
    LivenessCheckFailed(String),
}

/// Payload produced by a completed provider flow, before it is named and
/// wrapped into a stored credential.
#[derive(Clone, Debug)]
pub struct RawCredential {
    /// Provider-scoped identifier (email, shop URL, ad account id)
    pub identifier: String,
    /// Human-readable account description
    pub account_info: String,
    /// Secret fields to store encrypted
    pub secret_payload: SecretPayload,
    /// Expiry, when the provider issues tokens with a fixed validity window
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider-specific non-secret extras
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Completed browser round-trip: authorization code plus echoed state.
#[derive(Clone, Debug)]
pub struct CallbackResponse {
    pub code: String,
    pub state: String,
}

/// External collaborator owning the redirect listener and CSRF nonces.
///
/// `start_oauth_flow` blocks until the browser round-trip completes and
/// returns `None` on failure or timeout; the timeout is owned by the
/// implementation.
#[async_trait]
pub trait OAuthBroker: Send + Sync {
    /// Redirect URI the provider sends the user back to.
    fn callback_url(&self) -> String;

    /// Fresh unguessable CSRF state nonce.
    fn generate_state(&self) -> String;

    /// Runs the browser round-trip for an authorization URL.
    async fn start_oauth_flow(&self, label: &str, auth_url: &str) -> Option<CallbackResponse>;
}

/// External collaborator gathering user-supplied fields.
///
/// A user interrupt during any prompt surfaces as [`AuthError::Cancelled`].
pub trait Prompter: Send + Sync {
    /// Asks for a required plaintext value.
    fn ask(&self, label: &str) -> Result<String, AuthError>;

    /// Asks for a required value without echoing it.
    fn ask_secret(&self, label: &str) -> Result<String, AuthError>;

    /// Asks for an optional value; an empty answer means "skip".
    fn ask_optional(&self, label: &str) -> Result<String, AuthError>;
}

/// One authentication strategy per provider, polymorphic over a single
/// capability so the router can dispatch without type inspection.
#[async_trait]
pub trait ProviderFlow: Send + Sync {
    /// Provider tag recorded on stored credentials.
    fn provider(&self) -> &'static str;

    /// Runs the flow to completion, returning the raw credential payload.
    ///
    /// `service` narrows a multi-service provider (e.g. "google_analytics"
    /// for the shared Google flow); single-service providers ignore it.
    async fn authenticate(&self, service: Option<&str>) -> Result<RawCredential, AuthError>;
}

/// Trims a prompt answer and rejects empty required fields.
pub(crate) fn required(value: String, field: &'static str) -> Result<String, AuthError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AuthError::MissingInput(field));
    }
    Ok(value)
}
