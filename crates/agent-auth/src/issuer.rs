//! Token Issuer
//!
//! Mints short-lived signed credentials bound to one or more target
//! audiences, and publishes the matching verification keys. Clients are
//! validated against a static registry; secrets are stored as SHA-256
//! digests and compared by digest.

use std::collections::HashMap;

use chrono::Utc;
use jsonwebtoken::{Algorithm, Header, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::claims::AccessClaims;
use crate::error::{AuthError, Result};
use crate::keys::{JwkSet, SigningKey, dev_jwks};

/// Default token lifetime in seconds
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 600;

/// A registered client credential and the identity it authenticates
#[derive(Clone, Debug)]
pub struct ClientRecord {
    /// Client identifier presented at issuance
    pub client_id: String,

    /// Subject embedded into minted tokens
    pub subject: String,

    /// Roles granted to the subject
    pub roles: Vec<String>,

    /// Organization memberships of the subject
    pub organizations: Vec<String>,

    secret_digest: String,
}

impl ClientRecord {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: &str,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            subject: subject.into(),
            roles: Vec::new(),
            organizations: Vec::new(),
            secret_digest: digest(client_secret),
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| (*r).to_string()).collect();
        self
    }

    pub fn with_organizations(mut self, organizations: &[&str]) -> Self {
        self.organizations = organizations.iter().map(|o| (*o).to_string()).collect();
        self
    }

    fn secret_matches(&self, client_secret: &str) -> bool {
        self.secret_digest == digest(client_secret)
    }
}

fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Issuer configuration
#[derive(Clone, Debug)]
pub struct IssuerConfig {
    /// Issuer URL embedded as `iss`
    pub issuer_url: String,

    /// Token lifetime in seconds
    pub token_ttl_secs: i64,

    /// Audiences this issuer serves; issuance for any other is rejected
    pub audiences: Vec<String>,
}

impl IssuerConfig {
    pub fn new(issuer_url: impl Into<String>, audiences: Vec<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            audiences,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.token_ttl_secs = ttl_secs;
        self
    }
}

/// A minted token and its lifetime
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in_seconds: i64,
}

/// The token issuer
pub struct TokenIssuer {
    config: IssuerConfig,
    signing: SigningKey,
    jwks: JwkSet,
    clients: HashMap<String, ClientRecord>,
}

impl TokenIssuer {
    pub fn new(config: IssuerConfig, signing: SigningKey, jwks: JwkSet) -> Self {
        Self {
            config,
            signing,
            jwks,
            clients: HashMap::new(),
        }
    }

    /// Issuer backed by the embedded development keypair
    pub fn with_dev_key(config: IssuerConfig) -> Self {
        Self::new(config, SigningKey::dev(), dev_jwks())
    }

    /// Register a client at startup
    pub fn register_client(&mut self, record: ClientRecord) {
        self.clients.insert(record.client_id.clone(), record);
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Validate a client credential and mint a token for the requested
    /// audience set.
    pub fn issue(
        &self,
        client_id: &str,
        client_secret: &str,
        requested_audiences: &[String],
    ) -> Result<IssuedToken> {
        let client = self.clients.get(client_id).ok_or_else(|| {
            tracing::warn!(client_id, "Issuance attempt by unknown client");
            AuthError::Authentication("unknown client".into())
        })?;

        if !client.secret_matches(client_secret) {
            tracing::warn!(client_id, "Issuance attempt with bad secret");
            return Err(AuthError::Authentication("invalid client secret".into()));
        }

        if requested_audiences.is_empty() {
            return Err(AuthError::UnknownAudience("no audiences requested".into()));
        }
        for audience in requested_audiences {
            if !self.config.audiences.iter().any(|a| a == audience) {
                return Err(AuthError::UnknownAudience(audience.clone()));
            }
        }

        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: client.subject.clone(),
            aud: requested_audiences.to_vec(),
            iss: self.config.issuer_url.clone(),
            iat: now,
            exp: now + self.config.token_ttl_secs,
            roles: client.roles.clone(),
            organizations: client.organizations.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.signing.kid().to_string());

        let access_token = encode(&header, &claims, self.signing.encoding_key())
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        tracing::debug!(
            subject = %claims.sub,
            audiences = ?claims.aud,
            ttl = self.config.token_ttl_secs,
            "Issued access token"
        );

        Ok(IssuedToken {
            access_token,
            expires_in_seconds: self.config.token_ttl_secs,
        })
    }

    /// Currently valid public verification keys
    pub fn publish_keys(&self) -> JwkSet {
        self.jwks.clone()
    }
}
