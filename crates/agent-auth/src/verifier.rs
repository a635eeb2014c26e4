//! Token Verifier
//!
//! Embedded in every tool server. Validates a presented credential in a
//! fixed order — key resolution, signature, issuer, audience, expiry — and
//! produces a [`Principal`]. Each failure mode is a distinct error so
//! callers can tell "expired, retry with a fresh token" from "forged,
//! alert"; signature and issuer failures are logged as security events.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use tokio::sync::RwLock;

use crate::claims::{AccessClaims, Principal};
use crate::error::{AuthError, Result};
use crate::keys::KeySet;

/// Source of the issuer's published key set
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<KeySet>;
}

/// Fixed key set, for wiring verifiers without a key endpoint
pub struct StaticKeySource(pub KeySet);

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch_keys(&self) -> Result<KeySet> {
        Ok(self.0.clone())
    }
}

/// The token verifier
pub struct TokenVerifier {
    trusted_issuer: String,
    source: Arc<dyn KeySource>,
    cached: RwLock<KeySet>,
}

impl TokenVerifier {
    /// Create a verifier trusting `trusted_issuer`, pulling keys from
    /// `source`. The key cache starts empty and fills on first use.
    pub fn new(trusted_issuer: impl Into<String>, source: Arc<dyn KeySource>) -> Self {
        Self {
            trusted_issuer: trusted_issuer.into(),
            source,
            cached: RwLock::new(KeySet::default()),
        }
    }

    /// Verify `token` for `expected_audience`, producing the principal.
    pub async fn verify(&self, token: &str, expected_audience: &str) -> Result<Principal> {
        // (1) resolve the signing key by key id
        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Malformed("missing key id".into()))?;
        let key = self.resolve_key(&kid).await?;

        // (2) signature; issuer/audience/expiry are checked explicitly below
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let claims = match decode::<AccessClaims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return Err(match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        tracing::warn!(security = true, "Token signature check failed");
                        AuthError::SignatureInvalid
                    }
                    _ => AuthError::Malformed(e.to_string()),
                });
            }
        };

        // (3) issuer
        if claims.iss != self.trusted_issuer {
            tracing::warn!(
                security = true,
                found = %claims.iss,
                expected = %self.trusted_issuer,
                "Token from untrusted issuer"
            );
            return Err(AuthError::IssuerUntrusted { found: claims.iss });
        }

        // (4) audience membership
        if !claims.has_audience(expected_audience) {
            return Err(AuthError::AudienceMismatch {
                expected: expected_audience.to_string(),
            });
        }

        // (5) expiry
        if claims.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }

        Ok(claims.principal())
    }

    /// Resolve a key id against the cached key set, refreshing once on miss.
    async fn resolve_key(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.cached.read().await.resolve(kid) {
            return Ok(key.clone());
        }

        let fresh = self.source.fetch_keys().await?;
        let mut cached = self.cached.write().await;
        *cached = fresh;

        cached
            .resolve(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{ClientRecord, IssuerConfig, TokenIssuer};
    use crate::keys::{DEV_KID, KeySet, dev_jwks};

    const AUD_TICKETING: &str = "http://127.0.0.1:9000";
    const AUD_ORGS: &str = "http://127.0.0.1:9001";
    const ISSUER: &str = "http://127.0.0.1:9400";

    fn issuer_with_ttl(issuer_url: &str, ttl_secs: i64) -> TokenIssuer {
        let config = IssuerConfig::new(
            issuer_url,
            vec![AUD_TICKETING.into(), AUD_ORGS.into()],
        )
        .with_ttl_secs(ttl_secs);
        let mut issuer = TokenIssuer::with_dev_key(config);
        issuer.register_client(
            ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
        );
        issuer
    }

    fn verifier() -> TokenVerifier {
        let keyset = KeySet::from_jwks(&dev_jwks()).unwrap();
        TokenVerifier::new(ISSUER, Arc::new(StaticKeySource(keyset)))
    }

    fn mint(ttl_secs: i64, audiences: &[&str]) -> String {
        let audiences: Vec<String> = audiences.iter().map(|a| (*a).to_string()).collect();
        issuer_with_ttl(ISSUER, ttl_secs)
            .issue("admin", "admin-secret", &audiences)
            .unwrap()
            .access_token
    }

    #[tokio::test]
    async fn test_multi_audience_round_trip() {
        let token = mint(600, &[AUD_TICKETING, AUD_ORGS]);
        let verifier = verifier();

        let p1 = verifier.verify(&token, AUD_TICKETING).await.unwrap();
        let p2 = verifier.verify(&token, AUD_ORGS).await.unwrap();

        assert_eq!(p1.subject, "admin");
        assert_eq!(p1, p2);
        assert!(p1.has_role("admin"));
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let token = mint(600, &[AUD_TICKETING]);
        let err = verifier().verify(&token, AUD_ORGS).await.unwrap_err();
        assert!(matches!(err, AuthError::AudienceMismatch { .. }));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let token = mint(-1, &[AUD_TICKETING]);
        let err = verifier().verify(&token, AUD_TICKETING).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn test_untrusted_issuer_rejected() {
        // signed with the same key but claiming another issuer
        let token = issuer_with_ttl("http://evil.example", 600)
            .issue("admin", "admin-secret", &[AUD_TICKETING.into()])
            .unwrap()
            .access_token;

        let err = verifier().verify(&token, AUD_TICKETING).await.unwrap_err();
        assert!(matches!(err, AuthError::IssuerUntrusted { .. }));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let token = mint(600, &[AUD_TICKETING]);
        // flip a character early in the signature segment
        let sig_start = token.rfind('.').unwrap() + 1;
        let target = sig_start + 4;
        let original = token.as_bytes()[target];
        let flipped = if original == b'A' { 'B' } else { 'A' };
        let mut tampered: Vec<char> = token.chars().collect();
        tampered[target] = flipped;
        let tampered: String = tampered.into_iter().collect();

        let err = verifier()
            .verify(&tampered, AUD_TICKETING)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::SignatureInvalid | AuthError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let err = verifier()
            .verify("not-a-token", AUD_TICKETING)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_keyset_refresh_on_kid_miss() {
        struct FlakySource {
            real: KeySet,
            calls: std::sync::atomic::AtomicU32,
        }

        #[async_trait]
        impl KeySource for FlakySource {
            async fn fetch_keys(&self) -> Result<KeySet> {
                self.calls
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(self.real.clone())
            }
        }

        let source = Arc::new(FlakySource {
            real: KeySet::from_jwks(&dev_jwks()).unwrap(),
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let verifier = TokenVerifier::new(ISSUER, source.clone());

        // cache is empty, so the first verify refreshes once
        let token = mint(600, &[AUD_TICKETING]);
        verifier.verify(&token, AUD_TICKETING).await.unwrap();
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // resolvable kid now cached; no further fetches
        verifier.verify(&token, AUD_TICKETING).await.unwrap();
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        assert_eq!(KeySet::from_jwks(&dev_jwks()).unwrap().kids(), vec![DEV_KID]);
    }
}
