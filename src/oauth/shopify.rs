//! Shopify static-token flow.
//!
//! Custom-app admin tokens are pre-issued and never expire, so there is no
//! exchange step; instead the token is verified against a read-only shop
//! endpoint before anything is stored. An unreachable or unauthorized check
//! is a hard failure.

use super::{required, AuthError, Prompter, ProviderFlow, RawCredential};
use crate::credentials::SecretPayload;
use crate::report::{FlowEvent, Reporter};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const ADMIN_API_VERSION: &str = "2024-01";

/// Bound on the liveness probe; the target API is expected to answer fast.
const LIVENESS_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Default, Deserialize)]
struct ShopInfo {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ShopResponse {
    #[serde(default)]
    shop: ShopInfo,
}

/// Private admin-token authentication for a single store.
pub struct ShopifyFlow {
    http: reqwest::Client,
    prompter: Arc<dyn Prompter>,
    reporter: Arc<dyn Reporter>,
    admin_base: Option<String>,
}

impl ShopifyFlow {
    pub fn new(prompter: Arc<dyn Prompter>, reporter: Arc<dyn Reporter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(LIVENESS_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            prompter,
            reporter,
            admin_base: None,
        }
    }

    /// Overrides the `https://<shop>` base of the admin API (tests).
    pub fn with_admin_base(mut self, admin_base: String) -> Self {
        self.admin_base = Some(admin_base);
        self
    }

    fn shop_endpoint(&self, shop_url: &str) -> String {
        let base = match &self.admin_base {
            Some(base) => base.clone(),
            None => format!("https://{shop_url}"),
        };
        format!("{base}/admin/api/{ADMIN_API_VERSION}/shop.json")
    }

    /// Probes a read-only endpoint to prove the token works for this shop.
    async fn check_liveness(
        &self,
        shop_url: &str,
        access_token: &str,
    ) -> Result<Option<String>, AuthError> {
        let endpoint = self.shop_endpoint(shop_url);
        tracing::debug!(shop = %shop_url, "running liveness check");

        let response = self
            .http
            .get(&endpoint)
            .header("X-Shopify-Access-Token", access_token)
            .send()
            .await
            .map_err(|e| AuthError::LivenessCheckFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::LivenessCheckFailed(format!(
                "shop endpoint answered HTTP {}",
                response.status().as_u16()
            )));
        }

        let shop: ShopResponse = response.json().await.unwrap_or_default();
        Ok(shop.shop.name)
    }
}

/// Appends the `.myshopify.com` suffix when the user typed a bare store name.
fn normalize_shop_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.ends_with(".myshopify.com") {
        trimmed.to_string()
    } else {
        format!("{trimmed}.myshopify.com")
    }
}

#[async_trait]
impl ProviderFlow for ShopifyFlow {
    fn provider(&self) -> &'static str {
        "shopify"
    }

    async fn authenticate(&self, _service: Option<&str>) -> Result<RawCredential, AuthError> {
        self.reporter.report(FlowEvent::Step {
            message: "Shopify authentication".to_string(),
        });

        let shop_url = required(
            self.prompter.ask("Shop URL (e.g. mystore.myshopify.com)")?,
            "shop_url",
        )?;
        let shop_url = normalize_shop_url(&shop_url);
        let access_token = required(
            self.prompter.ask_secret("Admin API access token")?,
            "access_token",
        )?;

        self.reporter.report(FlowEvent::Step {
            message: format!("Testing connection to {shop_url}"),
        });
        let shop_name = self.check_liveness(&shop_url, &access_token).await?;

        let display_name = shop_name.unwrap_or_else(|| shop_url.clone());
        self.reporter.report(FlowEvent::Success {
            message: format!("Connected to shop: {display_name}"),
        });

        let mut payload = SecretPayload::new();
        payload.insert("private_app_password".to_string(), access_token);
        payload.insert("shop_url".to_string(), shop_url.clone());

        Ok(RawCredential {
            identifier: shop_url,
            account_info: format!("Shopify store {display_name}"),
            secret_payload: payload,
            expires_at: None,
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{RecordingReporter, ScriptedPrompter};
    use super::*;

    fn flow_with(prompter: ScriptedPrompter, admin_base: String) -> ShopifyFlow {
        ShopifyFlow::new(Arc::new(prompter), Arc::new(RecordingReporter::new()))
            .with_admin_base(admin_base)
    }

    #[test]
    fn test_normalize_shop_url() {
        assert_eq!(normalize_shop_url("mystore"), "mystore.myshopify.com");
        assert_eq!(
            normalize_shop_url("mystore.myshopify.com"),
            "mystore.myshopify.com"
        );
        assert_eq!(
            normalize_shop_url("  mystore.myshopify.com/ "),
            "mystore.myshopify.com"
        );
    }

    #[tokio::test]
    async fn test_successful_liveness_produces_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/admin/api/2024-01/shop.json")
            .match_header("X-Shopify-Access-Token", "shpat_123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"shop":{"name":"My Store"}}"#)
            .create_async()
            .await;

        let prompter = ScriptedPrompter::new(&["mystore", "shpat_123"]);
        let flow = flow_with(prompter, server.url());

        let raw = flow.authenticate(None).await.unwrap();

        assert_eq!(raw.identifier, "mystore.myshopify.com");
        assert_eq!(raw.account_info, "Shopify store My Store");
        assert_eq!(raw.expires_at, None);
        assert_eq!(
            raw.secret_payload.get("private_app_password"),
            Some(&"shpat_123".to_string())
        );
        assert_eq!(
            raw.secret_payload.get("shop_url"),
            Some(&"mystore.myshopify.com".to_string())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_liveness_is_a_hard_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/admin/api/2024-01/shop.json")
            .with_status(401)
            .with_body(r#"{"errors":"[API] Invalid API key or access token"}"#)
            .create_async()
            .await;

        let prompter = ScriptedPrompter::new(&["mystore", "bad-token"]);
        let flow = flow_with(prompter, server.url());

        let err = flow.authenticate(None).await.unwrap_err();
        match err {
            AuthError::LivenessCheckFailed(reason) => assert!(reason.contains("401")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_shop_is_a_hard_failure() {
        // Nothing listens on this port
        let prompter = ScriptedPrompter::new(&["mystore", "shpat_123"]);
        let flow = flow_with(prompter, "http://127.0.0.1:1".to_string());

        let err = flow.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::LivenessCheckFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_shop_url_is_missing_input() {
        let prompter = ScriptedPrompter::new(&[" "]);
        let flow = flow_with(prompter, "http://unused.invalid".to_string());

        let err = flow.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingInput("shop_url")));
    }
}
