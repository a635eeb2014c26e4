//! HTTP Tool Invoker
//!
//! The client half of the tool layer: discovers tools across the configured
//! servers and performs authenticated invocation, transparently acquiring
//! and caching access tokens per audience.
//!
//! Outcome classification, per the error policy: transport failures are
//! retried a small fixed number of times with backoff and then surfaced as
//! a tool-failure message; a token rejection triggers exactly one
//! re-issuance-and-retry; RBAC denials and domain failures come back as
//! ordinary unsuccessful tool results the reasoning step can react to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use agent_auth::{TokenCache, code_is_token_rejection};
use agent_core::error::{AgentError, Result};
use agent_core::tool::{ToolCall, ToolDescriptor, ToolInvoker, ToolResult};

/// One configured tool server
#[derive(Clone, Debug)]
pub struct ToolServerConfig {
    /// Display name for logs
    pub name: String,

    /// Base URL of the server's tool endpoints
    pub base_url: String,

    /// Audience tokens must carry to be accepted by this server
    pub audience: String,
}

impl ToolServerConfig {
    /// The audience defaults to the base URL, matching the server setup.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            name: name.into(),
            audience: base_url.clone(),
            base_url,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: String,
}

/// Authenticated tool invoker over HTTP
pub struct HttpToolInvoker {
    http: reqwest::Client,
    servers: Vec<ToolServerConfig>,
    tokens: Arc<TokenCache>,
    routes: RwLock<HashMap<String, usize>>,
    transport_retries: u32,
    backoff: Duration,
}

impl HttpToolInvoker {
    pub fn new(servers: Vec<ToolServerConfig>, tokens: Arc<TokenCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            servers,
            tokens,
            routes: RwLock::new(HashMap::new()),
            transport_retries: 2,
            backoff: Duration::from_millis(100),
        }
    }

    pub fn with_transport_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.transport_retries = retries;
        self.backoff = backoff;
        self
    }

    async fn route(&self, tool: &str) -> Option<ToolServerConfig> {
        let routes = self.routes.read().await;
        routes.get(tool).map(|idx| self.servers[*idx].clone())
    }

    async fn post_call(
        &self,
        server: &ToolServerConfig,
        call: &ToolCall,
        token: &str,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(format!("{}/tools/{}", server.base_url, call.name))
            .bearer_auth(token)
            .json(&call.arguments)
            .send()
            .await
    }
}

/// Render a tool result value as text for the reasoning step
fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    /// Query every configured server for its exposed tools. Server order and
    /// per-server registration order are preserved, so repeated discovery
    /// against unchanged servers yields identical descriptor sets.
    async fn discover(&self) -> Result<Vec<ToolDescriptor>> {
        let mut all = Vec::new();
        let mut routes = HashMap::new();

        for (idx, server) in self.servers.iter().enumerate() {
            let response = self
                .http
                .get(format!("{}/tools", server.base_url))
                .send()
                .await
                .map_err(|e| {
                    AgentError::Discovery(format!("server '{}' unreachable: {}", server.name, e))
                })?;

            let mut descriptors: Vec<ToolDescriptor> = response.json().await.map_err(|e| {
                AgentError::Discovery(format!("server '{}' sent bad tool list: {}", server.name, e))
            })?;

            for descriptor in &mut descriptors {
                descriptor.audience = server.audience.clone();
                routes.insert(descriptor.name.clone(), idx);
            }

            tracing::debug!(
                server = %server.name,
                tools = descriptors.len(),
                "Discovered tools"
            );
            all.extend(descriptors);
        }

        *self.routes.write().await = routes;
        Ok(all)
    }

    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult> {
        let Some(server) = self.route(&call.name).await else {
            return Ok(ToolResult::failure(
                &call.name,
                format!("Tool '{}' is not available on any configured server", call.name),
            )
            .with_id(call.id.clone()));
        };

        let mut reissued = false;
        let mut transport_attempts: u32 = 0;

        loop {
            let token = match self.tokens.get_or_issue(&server.audience).await {
                Ok(token) => token,
                Err(e) => {
                    // fatal to this call only; the conversation continues
                    tracing::warn!(tool = %call.name, error = %e, "Token acquisition failed");
                    return Ok(ToolResult::failure(
                        &call.name,
                        format!("Could not authenticate to the tool server: {}", e),
                    )
                    .with_id(call.id.clone()));
                }
            };

            let response = match self.post_call(&server, call, &token).await {
                Ok(response) => response,
                Err(e) => {
                    if transport_attempts < self.transport_retries {
                        transport_attempts += 1;
                        let wait = self.backoff * 2_u32.pow(transport_attempts - 1);
                        tracing::debug!(
                            tool = %call.name,
                            attempt = transport_attempts,
                            "Transport failure, retrying after backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    tracing::warn!(tool = %call.name, error = %e, "Transport retries exhausted");
                    return Ok(ToolResult::failure(
                        &call.name,
                        format!("Tool temporarily unreachable: {}", e),
                    )
                    .with_id(call.id.clone()));
                }
            };

            let status = response.status();

            if status.is_success() {
                let body: ResultBody = match response.json().await {
                    Ok(body) => body,
                    Err(e) => {
                        return Ok(ToolResult::failure(
                            &call.name,
                            format!("Tool returned a malformed response: {}", e),
                        )
                        .with_id(call.id.clone()));
                    }
                };
                return Ok(
                    ToolResult::success(&call.name, render_result(&body.result))
                        .with_id(call.id.clone()),
                );
            }

            let wire = response.json::<ErrorBody>().await.unwrap_or(ErrorBody {
                error: format!("tool server returned {}", status),
                code: String::new(),
            });

            if status == reqwest::StatusCode::UNAUTHORIZED
                && code_is_token_rejection(&wire.code)
                && !reissued
            {
                // exactly one re-issuance-and-retry attempt
                reissued = true;
                tracing::info!(tool = %call.name, code = %wire.code, "Token rejected; reissuing once");
                self.tokens.invalidate(&server.audience).await;
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Ok(ToolResult::failure(
                    &call.name,
                    format!("Authorization failed: {}", wire.error),
                )
                .with_id(call.id.clone()));
            }

            // RBAC denial or domain failure: surfaced immediately, not retried
            return Ok(ToolResult::failure(&call.name, wire.error).with_id(call.id.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_auth::{IssuedGrant, TokenSource};
    use chrono::Utc;

    struct NoSource;

    #[async_trait]
    impl TokenSource for NoSource {
        async fn issue_for(&self, _audience: &str) -> agent_auth::Result<IssuedGrant> {
            Ok(IssuedGrant {
                access_token: "t".into(),
                expires_at: Utc::now() + chrono::Duration::seconds(600),
            })
        }
    }

    #[test]
    fn test_audience_defaults_to_base_url() {
        let config = ToolServerConfig::new("ticketing", "http://127.0.0.1:9000");
        assert_eq!(config.audience, "http://127.0.0.1:9000");

        let config = config.with_audience("urn:ticketing");
        assert_eq!(config.audience, "urn:ticketing");
    }

    #[test]
    fn test_render_result() {
        assert_eq!(render_result(&Value::String("plain".into())), "plain");
        assert_eq!(
            render_result(&serde_json::json!({"a": 1})),
            "{\"a\":1}"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure_result_not_error() {
        let invoker = HttpToolInvoker::new(
            vec![ToolServerConfig::new("t", "http://127.0.0.1:1")],
            Arc::new(TokenCache::new(Arc::new(NoSource))),
        );

        // no discovery has populated routes, so nothing resolves
        let call = ToolCall {
            name: "ghost".into(),
            arguments: serde_json::Map::new(),
            id: Some("c1".into()),
        };
        let result = invoker.invoke(&call).await.unwrap();

        assert!(!result.success);
        assert!(result.output.contains("not available"));
        assert_eq!(result.id.as_deref(), Some("c1"));
    }
}
