//! Encrypted credential storage for connector authentication.
//!
//! This module provides the uniform data model for heterogeneous provider
//! credentials (OAuth2 refresh tokens, long-lived tokens, private API keys)
//! and their durable storage inside a shared TOML secrets file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - save / get / list / delete            │
//! │  - transparent payload encryption        │
//! │  - atomic temp-file-then-rename writes   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt_token)     (decrypt_token)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher (injected)             │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │   secrets.toml  [oauth.<name>] sections  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use connector_auth::credentials::{CredentialStore, StoredCredential};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<(), connector_auth::credentials::StorageError> {
//! let store = CredentialStore::new("/path/to/project", None);
//!
//! let mut payload = BTreeMap::new();
//! payload.insert("refresh_token".to_string(), "1//abc".to_string());
//!
//! let cred = StoredCredential::new(
//!     "google_alice_example_com".to_string(),
//!     "google".to_string(),
//!     "alice@example.com".to_string(),
//!     "Google account alice@example.com".to_string(),
//!     payload,
//! );
//! store.save(&cred)?;
//!
//! if let Some(cred) = store.get("google_alice_example_com")? {
//!     println!("created at {}", cred.created_at);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod error;
pub mod naming;
mod storage;

pub use error::StorageError;
pub use storage::{CredentialStore, TokenCipher};

/// Secret portion of a credential: token material, client secrets,
/// account ids. This mapping, and only this mapping, is encrypted at rest.
pub type SecretPayload = BTreeMap<String, String>;

/// Seconds per day, used for ceiling division in expiry math.
const SECONDS_PER_DAY: i64 = 86_400;

/// One stored credential and its lifecycle metadata.
///
/// Uniquely keyed by `name` within the store. The `credentials` payload is
/// the only field treated as secret; everything else is plaintext metadata.
/// Timestamps round-trip as RFC 3339 UTC strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Unique key, derived from provider + sanitized identifier
    /// (e.g. "google_alice_example_com")
    pub name: String,

    /// Provider tag (e.g. "google", "facebook_ads", "shopify"). Open set:
    /// storage logic never interprets it beyond equality checks.
    pub provider: String,

    /// Provider-scoped unique identifier (email, shop URL, account id)
    pub identifier: String,

    /// Human-readable account description; not used for identity
    pub account_info: String,

    /// Secret payload (encrypted at rest when a cipher is configured)
    pub credentials: SecretPayload,

    /// When the credential was created; set once, immutable thereafter
    pub created_at: DateTime<Utc>,

    /// When the credential expires; absent means it does not expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Last time the credential was read for use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// Last time the token material was refreshed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,

    /// Provider-specific non-secret extras (e.g. a GA4 property id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl StoredCredential {
    /// Creates a credential with `created_at = now` and no optional fields.
    pub fn new(
        name: String,
        provider: String,
        identifier: String,
        account_info: String,
        credentials: SecretPayload,
    ) -> Self {
        Self {
            name,
            provider,
            identifier,
            account_info,
            credentials,
            created_at: Utc::now(),
            expires_at: None,
            last_used: None,
            last_refreshed: None,
            metadata: None,
        }
    }

    /// Returns true if the credential has an expiry and it has passed.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Whole days until expiry (ceiling, clamped at 0), or `None` if the
    /// credential does not expire.
    pub fn days_until_expiry(&self) -> Option<i64> {
        let expires_at = self.expires_at?;
        let seconds = (expires_at - Utc::now()).num_seconds();
        if seconds <= 0 {
            return Some(0);
        }
        Some((seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
    }

    /// Returns true if the credential expires within `within_days` days.
    ///
    /// Always false for non-expiring credentials.
    pub fn is_expiring_soon(&self, within_days: i64) -> bool {
        match self.days_until_expiry() {
            Some(days) => days <= within_days,
            None => false,
        }
    }
}
