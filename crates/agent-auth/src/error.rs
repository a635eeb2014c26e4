//! Auth Error Types
//!
//! Each verification failure mode is a distinct variant, never collapsed into
//! one generic rejection: security logging and retry logic must distinguish
//! "expired, retry with a fresh token" from "forged, alert".

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication and authorization errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad issuance credentials (unknown client or wrong secret)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Issuance requested for an audience the issuer does not serve
    #[error("Unknown audience: {0}")]
    UnknownAudience(String),

    /// Token could not be minted
    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    /// Token could not be decoded at all
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signing key id not present in the key set, even after refresh
    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    /// Cryptographic signature check failed
    #[error("Token signature invalid")]
    SignatureInvalid,

    /// Token was issued by an untrusted issuer
    #[error("Untrusted issuer: {found}")]
    IssuerUntrusted { found: String },

    /// The expected audience is not in the token's audience set
    #[error("Audience mismatch: token not valid for {expected}")]
    AudienceMismatch { expected: String },

    /// Token expiry has passed
    #[error("Token expired")]
    Expired,

    /// Principal lacks a required role
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Key-set retrieval failed
    #[error("Key set retrieval failed: {0}")]
    KeyFetch(String),

    /// Client-side transport failure talking to the issuer
    #[error("Transport error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Stable wire code for HTTP error payloads
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Authentication(_) => "AUTHENTICATION_FAILED",
            AuthError::UnknownAudience(_) => "UNKNOWN_AUDIENCE",
            AuthError::TokenCreation(_) => "TOKEN_CREATION_FAILED",
            AuthError::Malformed(_) => "TOKEN_MALFORMED",
            AuthError::UnknownKeyId(_) => "UNKNOWN_KEY_ID",
            AuthError::SignatureInvalid => "SIGNATURE_INVALID",
            AuthError::IssuerUntrusted { .. } => "ISSUER_UNTRUSTED",
            AuthError::AudienceMismatch { .. } => "AUDIENCE_MISMATCH",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::PermissionDenied(_) => "PERMISSION_DENIED",
            AuthError::KeyFetch(_) => "KEY_FETCH_FAILED",
            AuthError::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Whether this failure should be logged as a security event
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            AuthError::SignatureInvalid | AuthError::IssuerUntrusted { .. }
        )
    }

    /// Whether this failure is a rejection of the presented token, which the
    /// invoker answers with exactly one re-issuance-and-retry attempt
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed(_)
                | AuthError::UnknownKeyId(_)
                | AuthError::SignatureInvalid
                | AuthError::IssuerUntrusted { .. }
                | AuthError::AudienceMismatch { .. }
                | AuthError::Expired
        )
    }
}

/// Whether a wire code names a token rejection (see
/// [`AuthError::is_token_rejection`]); used by clients that only see codes.
pub fn code_is_token_rejection(code: &str) -> bool {
    matches!(
        code,
        "TOKEN_MALFORMED"
            | "UNKNOWN_KEY_ID"
            | "SIGNATURE_INVALID"
            | "ISSUER_UNTRUSTED"
            | "AUDIENCE_MISMATCH"
            | "TOKEN_EXPIRED"
    )
}
