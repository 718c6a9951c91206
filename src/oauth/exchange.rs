//! Authorization-code token exchange.

use super::AuthError;
use serde::Deserialize;
use std::collections::HashMap;

/// Token endpoint response (standard OAuth 2.0).
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Exchanges an authorization code for tokens at a provider token endpoint.
///
/// A non-success HTTP status surfaces as [`AuthError::ExchangeStatus`] with
/// the response body attached; transport and decode failures surface as
/// [`AuthError::ExchangeTransport`].
pub async fn exchange_code_for_tokens(
    http: &reqwest::Client,
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenGrant, AuthError> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", redirect_uri);
    form.insert("client_id", client_id);
    form.insert("client_secret", client_secret);

    tracing::debug!(%token_url, "exchanging authorization code for tokens");

    let response = http
        .post(token_url)
        .header("Accept", "application/json")
        .form(&form)
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

    let grant: TokenGrant = response.json().await?;

    tracing::debug!(
        has_refresh_token = grant.refresh_token.is_some(),
        expires_in = ?grant.expires_in,
        "token exchange succeeded"
    );

    Ok(grant)
}
