//! Issuer Client
//!
//! HTTP client for the token issuer's two endpoints: credential issuance
//! (`POST /token`) and key-set retrieval (`GET /jwks`). Implements the
//! agent-auth seams so the token cache and verifiers can pull from a
//! remote issuer.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use agent_auth::{
    AuthError, IssuedGrant, IssuedToken, JwkSet, KeySet, KeySource, TokenSource,
};

/// Issuance request wire shape
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub requested_audiences: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    code: String,
}

/// Issuer client configuration
#[derive(Clone, Debug)]
pub struct IssuerClientConfig {
    /// Issuer base URL
    pub base_url: String,

    /// Client credential presented at issuance
    pub client_id: String,
    pub client_secret: String,
}

impl IssuerClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read `ISSUER_URL`, `AGENT_CLIENT_ID` and `AGENT_CLIENT_SECRET`
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ISSUER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9400".into()),
            client_id: std::env::var("AGENT_CLIENT_ID").unwrap_or_else(|_| "test-client".into()),
            client_secret: std::env::var("AGENT_CLIENT_SECRET")
                .unwrap_or_else(|_| "test-secret".into()),
        }
    }
}

/// Client for the token issuer
pub struct IssuerClient {
    http: reqwest::Client,
    config: IssuerClientConfig,
}

impl IssuerClient {
    pub fn new(config: IssuerClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(IssuerClientConfig::from_env())
    }

    /// Request a token for the given audience set
    pub async fn issue(&self, audiences: &[String]) -> Result<IssuedToken, AuthError> {
        let request = TokenRequest {
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            requested_audiences: audiences.to_vec(),
        };

        let response = self
            .http
            .post(format!("{}/token", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return response
                .json::<IssuedToken>()
                .await
                .map_err(|e| AuthError::Transport(format!("bad issuer response: {}", e)));
        }

        let wire = response
            .json::<WireError>()
            .await
            .unwrap_or(WireError {
                error: "issuance rejected".into(),
                code: String::new(),
            });

        Err(match wire.code.as_str() {
            "UNKNOWN_AUDIENCE" => AuthError::UnknownAudience(wire.error),
            _ => AuthError::Authentication(wire.error),
        })
    }

    /// Retrieve the issuer's published key document
    pub async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        fetch_jwks(&self.http, &self.config.base_url).await
    }
}

#[async_trait]
impl TokenSource for IssuerClient {
    async fn issue_for(&self, audience: &str) -> Result<IssuedGrant, AuthError> {
        let audiences = vec![audience.to_string()];
        let issued = self.issue(&audiences).await?;
        Ok(IssuedGrant {
            access_token: issued.access_token,
            expires_at: Utc::now() + Duration::seconds(issued.expires_in_seconds),
        })
    }
}

async fn fetch_jwks(http: &reqwest::Client, base_url: &str) -> Result<JwkSet, AuthError> {
    let response = http
        .get(format!("{}/jwks", base_url))
        .send()
        .await
        .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AuthError::KeyFetch(format!(
            "key endpoint returned {}",
            response.status()
        )));
    }

    response
        .json::<JwkSet>()
        .await
        .map_err(|e| AuthError::KeyFetch(format!("bad key document: {}", e)))
}

/// Credential-free key-set source for tool-server verifiers
pub struct JwksKeySource {
    http: reqwest::Client,
    base_url: String,
}

impl JwksKeySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn fetch_keys(&self) -> Result<KeySet, AuthError> {
        let jwks = fetch_jwks(&self.http, &self.base_url).await?;
        KeySet::from_jwks(&jwks)
    }
}
