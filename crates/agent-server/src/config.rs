//! Configuration
//!
//! Environment-driven settings with development defaults. Every knob the
//! orchestration core exposes — the tool-call budget, the shared rate
//! limiter and the token lifetime — is set here, in one place.

/// Process settings
#[derive(Clone, Debug)]
pub struct Settings {
    /// Chat API bind address
    pub bind_addr: String,

    /// Token issuer bind address
    pub issuer_addr: String,

    /// Ticketing tool server bind address
    pub ticketing_addr: String,

    /// Organizations tool server bind address
    pub organizations_addr: String,

    /// Max tool calls per conversation
    pub tool_call_budget: u32,

    /// Rate limiter burst capacity
    pub rate_capacity: u32,

    /// Rate limiter refill, tokens per second
    pub rate_refill_per_sec: f64,

    /// Access-token lifetime in seconds
    pub token_ttl_secs: i64,

    /// Reasoning model
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            issuer_addr: "127.0.0.1:9400".into(),
            ticketing_addr: "127.0.0.1:9000".into(),
            organizations_addr: "127.0.0.1:9001".into(),
            tool_call_budget: 15,
            rate_capacity: 10,
            rate_refill_per_sec: 2.0,
            token_ttl_secs: 600,
            model: "gpt-4o-mini".into(),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            issuer_addr: env_or("ISSUER_ADDR", &defaults.issuer_addr),
            ticketing_addr: env_or("TICKETING_ADDR", &defaults.ticketing_addr),
            organizations_addr: env_or("ORGANIZATIONS_ADDR", &defaults.organizations_addr),
            tool_call_budget: env_parse("TOOL_CALL_BUDGET", defaults.tool_call_budget),
            rate_capacity: env_parse("RATE_LIMIT_BUCKET_SIZE", defaults.rate_capacity),
            rate_refill_per_sec: env_parse(
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                defaults.rate_refill_per_sec,
            ),
            token_ttl_secs: env_parse("TOKEN_TTL_SECS", defaults.token_ttl_secs),
            model: env_or("AGENT_MODEL", &defaults.model),
        }
    }

    /// Issuer base URL as seen by the other components
    pub fn issuer_url(&self) -> String {
        format!("http://{}", self.issuer_addr)
    }

    pub fn ticketing_url(&self) -> String {
        format!("http://{}", self.ticketing_addr)
    }

    pub fn organizations_url(&self) -> String {
        format!("http://{}", self.organizations_addr)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_budgets() {
        let settings = Settings::default();
        assert_eq!(settings.tool_call_budget, 15);
        assert_eq!(settings.rate_capacity, 10);
        assert!((settings.rate_refill_per_sec - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.token_ttl_secs, 600);
    }

    #[test]
    fn test_urls_derive_from_addrs() {
        let settings = Settings::default();
        assert_eq!(settings.issuer_url(), "http://127.0.0.1:9400");
        assert_eq!(settings.ticketing_url(), "http://127.0.0.1:9000");
    }
}
