//! # agent-auth
//!
//! The credential layer of desk-agent: short-lived multi-audience JWTs
//! minted by a [`TokenIssuer`], checked by a per-server [`TokenVerifier`]
//! (key id → signature → issuer → audience → expiry, each failure a
//! distinct error), an RBAC gate, and a per-audience [`TokenCache`] with
//! single-flight issuance.
//!
//! Shared mutable state (key cache, token cache) is encapsulated behind
//! atomic operations; callers never see raw mutable fields.

pub mod cache;
pub mod claims;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod rbac;
pub mod verifier;

pub use cache::{IssuedGrant, TokenCache, TokenSource};
pub use claims::{AccessClaims, Principal};
pub use error::{AuthError, Result, code_is_token_rejection};
pub use issuer::{ClientRecord, IssuedToken, IssuerConfig, TokenIssuer};
pub use keys::{Jwk, JwkSet, KeySet, SigningKey, dev_jwks};
pub use rbac::{authorize, require};
pub use verifier::{KeySource, StaticKeySource, TokenVerifier};
