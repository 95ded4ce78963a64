//! OAuth authorization flow against the Douyin open platform.
//!
//! Three-step lifecycle: the operator opens the authorization URL, the
//! platform redirects back with a code, the code is exchanged for a token
//! bundle. Expired bundles are renewed through the refresh endpoint until
//! the refresh token itself dies, after which only a fresh authorization
//! round trip helps.

use serde_json::json;

use crate::config::DouyinConfig;
use crate::error::{Error, Result};
use crate::store::TokenData;

use super::unwrap_envelope;

const AUTHORIZE_PATH: &str = "/platform/oauth/connect/";
const TOKEN_PATH: &str = "/oauth/access_token/";
const REFRESH_PATH: &str = "/oauth/refresh_token/";

/// Builds authorization URLs and turns authorization codes into tokens.
#[derive(Clone)]
pub struct AuthFlow {
    http: reqwest::Client,
    config: DouyinConfig,
}

impl AuthFlow {
    pub fn new(config: DouyinConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// The URL a human visits to grant access for one employee.
    ///
    /// Deterministic, no I/O. The employee id rides along as the `state`
    /// parameter and comes back on the callback for correlation; it is not
    /// signed and the callback does not verify it was ever issued.
    pub fn authorize_url(&self, employee_id: &str) -> String {
        format!(
            "{}{}?client_key={}&response_type=code&scope={}&redirect_uri={}&state={}",
            self.config.api_base,
            AUTHORIZE_PATH,
            urlencoding::encode(&self.config.client_key),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(employee_id),
        )
    }

    /// Exchange an authorization code for a token bundle.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenData> {
        if code.is_empty() {
            return Err(Error::validation("authorization code must not be empty"));
        }
        tracing::debug!("Exchanging authorization code for token");
        self.token_request(
            TOKEN_PATH,
            json!({
                "client_key": self.config.client_key,
                "client_secret": self.config.client_secret,
                "code": code,
                "grant_type": "authorization_code",
            }),
        )
        .await
    }

    /// Mint a new access token from a stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenData> {
        if refresh_token.is_empty() {
            return Err(Error::validation("refresh token must not be empty"));
        }
        tracing::debug!("Refreshing access token");
        self.token_request(
            REFRESH_PATH,
            json!({
                "client_key": self.config.client_key,
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }),
        )
        .await
    }

    async fn token_request(&self, path: &str, body: serde_json::Value) -> Result<TokenData> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(Error::Transport(format!(
                "token endpoint returned status {}: {}",
                status, text
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        let data = unwrap_envelope(raw)?;
        serde_json::from_value(data)
            .map_err(|e| Error::Internal(format!("malformed token response: {}", e)))
    }
}
