//! Google authorization-code flow.
//!
//! Google Ads, Analytics, and Sheets share one OAuth client; only the
//! requested scopes differ. The flow forces refresh-token issuance
//! (`access_type=offline`, `prompt=consent`) because a credential without a
//! refresh token cannot be renewed and is useless to store.

use super::{
    exchange, required, AuthError, OAuthBroker, Prompter, ProviderFlow, RawCredential,
};
use crate::credentials::SecretPayload;
use crate::report::{FlowEvent, Reporter};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Service assumed when no hint is given.
const DEFAULT_SERVICE: &str = "google_ads";

/// Scopes per Google service.
fn scopes_for(service: &str) -> &'static [&'static str] {
    match service {
        "google_analytics" => &["https://www.googleapis.com/auth/analytics.readonly"],
        "google_sheets" => &[
            "https://www.googleapis.com/auth/spreadsheets.readonly",
            "https://www.googleapis.com/auth/drive.readonly",
        ],
        // google_ads and anything unrecognized
        _ => &["https://www.googleapis.com/auth/adwords"],
    }
}

fn service_label(service: &str) -> &'static str {
    match service {
        "google_analytics" => "Google Analytics",
        "google_sheets" => "Google Sheets",
        _ => "Google Ads",
    }
}

/// Authorization-code flow shared by all Google services.
pub struct GoogleFlow {
    http: reqwest::Client,
    broker: Arc<dyn OAuthBroker>,
    prompter: Arc<dyn Prompter>,
    reporter: Arc<dyn Reporter>,
    auth_url: String,
    token_url: String,
}

impl GoogleFlow {
    pub fn new(
        broker: Arc<dyn OAuthBroker>,
        prompter: Arc<dyn Prompter>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            broker,
            prompter,
            reporter,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Overrides the authorization endpoint (self-hosted proxies, tests).
    pub fn with_auth_url(mut self, auth_url: String) -> Self {
        self.auth_url = auth_url;
        self
    }

    /// Overrides the token endpoint (self-hosted proxies, tests).
    pub fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }

    fn build_auth_url(
        &self,
        client_id: &str,
        scopes: &[&str],
        redirect_uri: &str,
        state: &str,
    ) -> String {
        let scope = scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
        )
    }
}

#[async_trait]
impl ProviderFlow for GoogleFlow {
    fn provider(&self) -> &'static str {
        "google"
    }

    async fn authenticate(&self, service: Option<&str>) -> Result<RawCredential, AuthError> {
        let service = service.unwrap_or(DEFAULT_SERVICE);
        let label = service_label(service);

        self.reporter.report(FlowEvent::Step {
            message: format!("{label} authentication"),
        });

        let client_id = required(self.prompter.ask("OAuth client ID")?, "client_id")?;
        let client_secret = required(
            self.prompter.ask_secret("OAuth client secret")?,
            "client_secret",
        )?;
        let email = required(self.prompter.ask("Google account email")?, "email")?;

        let state = self.broker.generate_state();
        let redirect_uri = self.broker.callback_url();
        let auth_url = self.build_auth_url(&client_id, scopes_for(service), &redirect_uri, &state);

        self.reporter.report(FlowEvent::Step {
            message: "Waiting for browser authorization".to_string(),
        });
        let callback = self
            .broker
            .start_oauth_flow("Google", &auth_url)
            .await
            .ok_or(AuthError::AuthorizationFailed)?;

        // Hard failure before any token exchange: a forged callback must
        // never reach the provider with our client secret.
        if callback.state != state {
            tracing::warn!(service = %service, "OAuth state mismatch");
            return Err(AuthError::StateMismatch);
        }

        self.reporter.report(FlowEvent::Step {
            message: "Exchanging authorization code for tokens".to_string(),
        });
        let grant = exchange::exchange_code_for_tokens(
            &self.http,
            &self.token_url,
            &callback.code,
            &redirect_uri,
            &client_id,
            &client_secret,
        )
        .await?;

        let refresh_token = grant.refresh_token.ok_or(AuthError::NoRefreshToken)?;

        let mut payload = SecretPayload::new();
        payload.insert("client_id".to_string(), client_id);
        payload.insert("client_secret".to_string(), client_secret);
        payload.insert("refresh_token".to_string(), refresh_token);

        let mut metadata: Option<BTreeMap<String, String>> = None;

        match service {
            "google_ads" => {
                let dev_token = self
                    .prompter
                    .ask_optional("Developer token (optional)")?;
                if !dev_token.trim().is_empty() {
                    payload.insert("developer_token".to_string(), dev_token.trim().to_string());
                }
                let customer_id = self.prompter.ask_optional("Customer ID (optional)")?;
                if !customer_id.trim().is_empty() {
                    payload.insert("customer_id".to_string(), customer_id.trim().to_string());
                }
            }
            "google_analytics" => {
                let property_id = self
                    .prompter
                    .ask_optional("GA4 property ID (optional)")?;
                if !property_id.trim().is_empty() {
                    metadata = Some(BTreeMap::from([(
                        "property_id".to_string(),
                        property_id.trim().to_string(),
                    )]));
                }
            }
            _ => {}
        }

        self.reporter.report(FlowEvent::Success {
            message: format!("{label} authentication complete"),
        });

        Ok(RawCredential {
            identifier: email.clone(),
            account_info: format!("{label} ({email})"),
            secret_payload: payload,
            expires_at: None,
            metadata,
        })
    }
}
