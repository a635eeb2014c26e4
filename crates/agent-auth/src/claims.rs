//! Token Claims and Principals
//!
//! Claims are a fixed-field structure validated once at verification time,
//! never an untyped map probed ad hoc at use sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token. Immutable once issued.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject identifier
    pub sub: String,

    /// Audience set: every service this token may be presented to
    pub aud: Vec<String>,

    /// Issuer URL
    pub iss: String,

    /// Issued-at, seconds since epoch
    pub iat: i64,

    /// Expiry, seconds since epoch
    pub exp: i64,

    /// Roles granted to the subject
    #[serde(default)]
    pub roles: Vec<String>,

    /// Organization memberships of the subject
    #[serde(default)]
    pub organizations: Vec<String>,
}

impl AccessClaims {
    /// Whether the token's expiry has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Whether `audience` is a member of the token's audience set
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    /// Derive the principal these claims describe
    pub fn principal(&self) -> Principal {
        Principal {
            subject: self.sub.clone(),
            roles: self.roles.clone(),
            organizations: self.organizations.clone(),
        }
    }
}

/// An authenticated identity. Derived solely from a verified credential;
/// never constructed from unverified input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier
    pub subject: String,

    /// Roles held
    pub roles: Vec<String>,

    /// Organization memberships
    pub organizations: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn in_organization(&self, organization: &str) -> bool {
        self.organizations.iter().any(|o| o == organization)
    }
}
