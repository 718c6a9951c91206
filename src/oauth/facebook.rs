//! Facebook Ads token-exchange flow.
//!
//! No redirect round-trip: the user pastes a short-lived token from the
//! Graph API Explorer and we upgrade it to a long-lived token with a fixed
//! 60-day validity window.

use super::{required, AuthError, Prompter, ProviderFlow, RawCredential};
use crate::credentials::SecretPayload;
use crate::report::{FlowEvent, Reporter};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

const TOKEN_EXCHANGE_URL: &str = "https://graph.facebook.com/v18.0/oauth/access_token";

/// Validity window of a long-lived Graph API token.
pub const LONG_LIVED_TOKEN_DAYS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
}

/// Short-lived to long-lived token exchange for the Marketing API.
pub struct FacebookFlow {
    http: reqwest::Client,
    prompter: Arc<dyn Prompter>,
    reporter: Arc<dyn Reporter>,
    exchange_url: String,
}

impl FacebookFlow {
    pub fn new(prompter: Arc<dyn Prompter>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            prompter,
            reporter,
            exchange_url: TOKEN_EXCHANGE_URL.to_string(),
        }
    }

    /// Overrides the exchange endpoint (tests).
    pub fn with_exchange_url(mut self, exchange_url: String) -> Self {
        self.exchange_url = exchange_url;
        self
    }

    async fn exchange_token(
        &self,
        short_token: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<String, AuthError> {
        tracing::debug!("exchanging short-lived token for long-lived token");

        let response = self
            .http
            .get(&self.exchange_url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", app_id),
                ("client_secret", app_secret),
                ("fb_exchange_token", short_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AuthError::ExchangeStatus { status, body });
        }

        let exchange: ExchangeResponse = response.json().await?;
        Ok(exchange.access_token)
    }
}

#[async_trait]
impl ProviderFlow for FacebookFlow {
    fn provider(&self) -> &'static str {
        "facebook_ads"
    }

    async fn authenticate(&self, _service: Option<&str>) -> Result<RawCredential, AuthError> {
        self.reporter.report(FlowEvent::Step {
            message: "Facebook Ads authentication".to_string(),
        });

        let short_token = required(
            self.prompter.ask_secret("Short-lived access token")?,
            "access_token",
        )?;
        let app_id = required(self.prompter.ask("Facebook app ID")?, "app_id")?;
        let app_secret = required(
            self.prompter.ask_secret("Facebook app secret")?,
            "app_secret",
        )?;

        self.reporter.report(FlowEvent::Step {
            message: format!("Exchanging for a long-lived token ({LONG_LIVED_TOKEN_DAYS} days)"),
        });
        let long_token = self
            .exchange_token(&short_token, &app_id, &app_secret)
            .await?;

        let account_id = required(
            self.prompter.ask("Ad account ID (e.g. act_123456789)")?,
            "account_id",
        )?;

        let expires_at = Utc::now() + Duration::days(LONG_LIVED_TOKEN_DAYS);
        self.reporter.report(FlowEvent::Success {
            message: format!(
                "Facebook Ads authentication complete; token expires {}",
                expires_at.format("%Y-%m-%d")
            ),
        });

        let mut payload = SecretPayload::new();
        payload.insert("access_token".to_string(), long_token);
        payload.insert("account_id".to_string(), account_id.clone());

        Ok(RawCredential {
            identifier: account_id.clone(),
            account_info: format!("Facebook Ads account {account_id}"),
            secret_payload: payload,
            expires_at: Some(expires_at),
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{RecordingReporter, ScriptedPrompter};
    use super::*;
    use mockito::Matcher;

    fn flow_with(prompter: ScriptedPrompter, exchange_url: String) -> FacebookFlow {
        FacebookFlow::new(Arc::new(prompter), Arc::new(RecordingReporter::new()))
            .with_exchange_url(exchange_url)
    }

    #[tokio::test]
    async fn test_successful_exchange_sets_sixty_day_expiry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/exchange")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "fb_exchange_token".into()),
                Matcher::UrlEncoded("fb_exchange_token".into(), "short-tok".into()),
                Matcher::UrlEncoded("client_id".into(), "app-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"long-tok","token_type":"bearer"}"#)
            .create_async()
            .await;

        let prompter =
            ScriptedPrompter::new(&["short-tok", "app-1", "app-secret-1", "act_123456789"]);
        let flow = flow_with(prompter, format!("{}/exchange", server.url()));

        let before = Utc::now();
        let raw = flow.authenticate(None).await.unwrap();

        assert_eq!(raw.identifier, "act_123456789");
        assert_eq!(
            raw.secret_payload.get("access_token"),
            Some(&"long-tok".to_string())
        );

        let expires_at = raw.expires_at.expect("long-lived token must expire");
        let window = expires_at - before;
        assert!(window <= Duration::days(LONG_LIVED_TOKEN_DAYS));
        assert!(window > Duration::days(LONG_LIVED_TOKEN_DAYS) - Duration::minutes(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_rejection_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/exchange")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"message":"Invalid OAuth access token"}}"#)
            .create_async()
            .await;

        let prompter = ScriptedPrompter::new(&["bad-tok", "app-1", "app-secret-1"]);
        let flow = flow_with(prompter, format!("{}/exchange", server.url()));

        let err = flow.authenticate(None).await.unwrap_err();
        match err {
            AuthError::ExchangeStatus { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid OAuth access token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_short_token_is_missing_input() {
        let prompter = ScriptedPrompter::new(&[""]);
        let flow = flow_with(prompter, "http://unused.invalid".to_string());

        let err = flow.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingInput("access_token")));
    }

    #[tokio::test]
    async fn test_interrupt_during_prompt_cancels() {
        // Queue exhausted after the first answer: the app-id prompt cancels.
        let prompter = ScriptedPrompter::new(&["short-tok"]);
        let flow = flow_with(prompter, "http://unused.invalid".to_string());

        let err = flow.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
    }
}
