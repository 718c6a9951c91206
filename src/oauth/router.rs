//! Source-type routing to provider flows.
//!
//! The source wizard deals in source types ("google_ads", "shopify", …);
//! this module maps them to provider flows, runs the chosen flow, and
//! persists the result. Existence/status queries read back through the
//! store without triggering any flow.

use super::{
    FacebookFlow, GoogleFlow, OAuthBroker, Prompter, ProviderFlow, ShopifyFlow,
};
use crate::credentials::{naming, CredentialStore, StoredCredential};
use crate::report::{FlowEvent, Reporter};
use std::sync::Arc;

/// Provider family behind a source type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Facebook,
    Shopify,
}

impl ProviderKind {
    /// Provider tag recorded on stored credentials.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Facebook => "facebook_ads",
            ProviderKind::Shopify => "shopify",
        }
    }

    /// Payload fields that must all be present for a credential of this
    /// provider to count as complete.
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Google => &["client_id", "client_secret", "refresh_token"],
            ProviderKind::Facebook => &["access_token"],
            ProviderKind::Shopify => &["private_app_password"],
        }
    }
}

/// Maps a source type to its provider flow and service hint.
///
/// All Google services share one flow (and one OAuth client); the hint
/// selects the scope set.
pub fn resolve(source_type: &str) -> Option<(ProviderKind, Option<&'static str>)> {
    match source_type {
        "google_ads" => Some((ProviderKind::Google, Some("google_ads"))),
        "google_analytics" => Some((ProviderKind::Google, Some("google_analytics"))),
        "google_sheets" => Some((ProviderKind::Google, Some("google_sheets"))),
        "facebook_ads" => Some((ProviderKind::Facebook, None)),
        "shopify" => Some((ProviderKind::Shopify, None)),
        _ => None,
    }
}

/// Endpoint overrides applied to constructed flows.
///
/// Defaults (all `None`) hit the real provider endpoints.
#[derive(Clone, Debug, Default)]
pub struct FlowEndpoints {
    pub google_auth_url: Option<String>,
    pub google_token_url: Option<String>,
    pub facebook_exchange_url: Option<String>,
    pub shopify_admin_base: Option<String>,
}

/// Entry point consumed by the source wizard.
pub struct OAuthRouter {
    store: CredentialStore,
    broker: Arc<dyn OAuthBroker>,
    prompter: Arc<dyn Prompter>,
    reporter: Arc<dyn Reporter>,
    endpoints: FlowEndpoints,
}

impl OAuthRouter {
    pub fn new(
        store: CredentialStore,
        broker: Arc<dyn OAuthBroker>,
        prompter: Arc<dyn Prompter>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            broker,
            prompter,
            reporter,
            endpoints: FlowEndpoints::default(),
        }
    }

    /// Points constructed flows at non-default endpoints (tests, proxies).
    pub fn with_endpoints(mut self, endpoints: FlowEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The underlying credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Runs the authentication flow for a source type and persists the
    /// resulting credential under an auto-generated name.
    ///
    /// Returns false on any failure; failures are reported, never raised.
    pub async fn run_oauth_for_source(&self, source_type: &str) -> bool {
        let Some((kind, service)) = resolve(source_type) else {
            self.reporter.report(FlowEvent::Warning {
                message: format!("no OAuth provider configured for '{source_type}'"),
            });
            return false;
        };

        let flow = self.flow_for(kind);
        let raw = match flow.authenticate(service).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(source_type = %source_type, error = %e, "authentication failed");
                self.reporter.report(FlowEvent::Failure {
                    message: format!("{source_type} authentication failed: {e}"),
                });
                return false;
            }
        };

        let name = naming::generate_name(kind.as_str(), &raw.identifier);
        let mut cred = StoredCredential::new(
            name.clone(),
            kind.as_str().to_string(),
            raw.identifier,
            raw.account_info,
            raw.secret_payload,
        );
        cred.expires_at = raw.expires_at;
        cred.metadata = raw.metadata;

        match self.store.save(&cred) {
            Ok(()) => {
                self.reporter.report(FlowEvent::Success {
                    message: format!("Saved credential: {name}"),
                });
                true
            }
            Err(e) => {
                self.reporter.report(FlowEvent::Failure {
                    message: format!("Failed to save credential {name}: {e}"),
                });
                false
            }
        }
    }

    /// Checks whether a complete credential for this source type is already
    /// stored. Never runs a flow; storage errors read as "absent".
    pub fn check_oauth_credentials_exist(&self, source_type: &str) -> bool {
        let Some((kind, _)) = resolve(source_type) else {
            return false;
        };
        let credentials = match self.store.list(Some(kind.as_str())) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::debug!(source_type = %source_type, error = %e, "credential check failed");
                return false;
            }
        };

        let required = kind.required_fields();
        credentials
            .iter()
            .any(|c| required.iter().all(|field| c.credentials.contains_key(*field)))
    }

    /// Human-readable credential status for a source type, or `None` when
    /// the source type has no OAuth provider.
    pub fn get_oauth_status_message(&self, source_type: &str) -> Option<String> {
        resolve(source_type)?;
        if self.check_oauth_credentials_exist(source_type) {
            Some("OAuth credentials already configured".to_string())
        } else {
            Some("OAuth credentials not found - setup required".to_string())
        }
    }

    fn flow_for(&self, kind: ProviderKind) -> Box<dyn ProviderFlow> {
        match kind {
            ProviderKind::Google => {
                let mut flow = GoogleFlow::new(
                    self.broker.clone(),
                    self.prompter.clone(),
                    self.reporter.clone(),
                );
                if let Some(url) = &self.endpoints.google_auth_url {
                    flow = flow.with_auth_url(url.clone());
                }
                if let Some(url) = &self.endpoints.google_token_url {
                    flow = flow.with_token_url(url.clone());
                }
                Box::new(flow)
            }
            ProviderKind::Facebook => {
                let mut flow = FacebookFlow::new(self.prompter.clone(), self.reporter.clone());
                if let Some(url) = &self.endpoints.facebook_exchange_url {
                    flow = flow.with_exchange_url(url.clone());
                }
                Box::new(flow)
            }
            ProviderKind::Shopify => {
                let mut flow = ShopifyFlow::new(self.prompter.clone(), self.reporter.clone());
                if let Some(base) = &self.endpoints.shopify_admin_base {
                    flow = flow.with_admin_base(base.clone());
                }
                Box::new(flow)
            }
        }
    }
}
