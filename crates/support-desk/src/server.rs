//! Authenticated Tool Server
//!
//! One HTTP server per tool host: an explicit registry populated by direct
//! registration at startup, fronted by token verification and the RBAC
//! gate. Verification and authorization run — and return — before any tool
//! handler executes; on denial the handler is never reached.

use std::sync::Arc;

use agent_auth::{AuthError, Principal, TokenVerifier, authorize};
use agent_core::ToolDescriptor;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::error::DeskError;

/// Business logic of one tool. Runs only after verification and RBAC.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError>;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// An authenticated tool server: registry + verifier + RBAC gate.
pub struct ToolServer {
    name: String,
    audience: String,
    verifier: TokenVerifier,
    tools: Vec<RegisteredTool>,
}

impl ToolServer {
    pub fn new(
        name: impl Into<String>,
        audience: impl Into<String>,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            name: name.into(),
            audience: audience.into(),
            verifier,
            tools: Vec::new(),
        }
    }

    /// Register a tool. Call at startup; registration order is the
    /// discovery order.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Descriptors of every registered tool, in registration order
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }

    /// Build the HTTP surface: `GET /tools` and `POST /tools/{name}`.
    pub fn router(self) -> Router {
        let server = Arc::new(self);
        Router::new()
            .route("/tools", get(list_tools))
            .route("/tools/{name}", post(invoke_tool))
            .with_state(server)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

#[derive(Serialize)]
struct ResultBody {
    result: Value,
}

fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
            code: code.into(),
        }),
    )
        .into_response()
}

async fn list_tools(State(server): State<Arc<ToolServer>>) -> Json<Vec<ToolDescriptor>> {
    Json(server.descriptors())
}

async fn invoke_tool(
    State(server): State<Arc<ToolServer>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(args): Json<serde_json::Map<String, Value>>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "missing bearer credential",
            "MISSING_CREDENTIAL",
        );
    };

    let principal = match server.verifier.verify(token, &server.audience).await {
        Ok(principal) => principal,
        Err(e) => return auth_error_response(&server, &e),
    };

    let Some(tool) = server.find(&name) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("unknown tool: {}", name),
            "UNKNOWN_TOOL",
        );
    };

    if !authorize(&principal, &tool.descriptor.required_roles) {
        tracing::info!(
            server = %server.name,
            tool = %name,
            subject = %principal.subject,
            "RBAC denial"
        );
        return error_response(
            StatusCode::FORBIDDEN,
            "User does not have permission to use this tool",
            "PERMISSION_DENIED",
        );
    }

    for param in &tool.descriptor.parameters {
        if param.required && !args.contains_key(&param.name) {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Missing required parameter: {}", param.name),
                "INVALID_ARGUMENTS",
            );
        }
    }

    match tool.handler.call(&args, &principal).await {
        Ok(result) => {
            tracing::debug!(server = %server.name, tool = %name, subject = %principal.subject, "Tool invoked");
            Json(ResultBody { result }).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string(), e.code()),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn auth_error_response(server: &ToolServer, error: &AuthError) -> Response {
    // the verifier already logged security events; record the rejection here
    tracing::info!(
        server = %server.name,
        code = error.code(),
        "Rejected credential"
    );
    error_response(StatusCode::UNAUTHORIZED, error.to_string(), error.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_auth::{
        ClientRecord, IssuerConfig, KeySet, StaticKeySource, TokenIssuer, dev_jwks,
    };
    use agent_core::tool::ParameterSchema;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const AUDIENCE: &str = "http://127.0.0.1:9000";
    const ISSUER: &str = "http://127.0.0.1:9400";

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(
            &self,
            args: &serde_json::Map<String, Value>,
            principal: &Principal,
        ) -> Result<Value, DeskError> {
            Ok(serde_json::json!({
                "subject": principal.subject,
                "args": args,
            }))
        }
    }

    fn issuer() -> TokenIssuer {
        let config = IssuerConfig::new(ISSUER, vec![AUDIENCE.into()]);
        let mut issuer = TokenIssuer::with_dev_key(config);
        issuer.register_client(
            ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
        );
        issuer.register_client(ClientRecord::new("viewer", "viewer-secret", "viewer"));
        issuer
    }

    fn server() -> ToolServer {
        let keyset = KeySet::from_jwks(&dev_jwks()).unwrap();
        let verifier = TokenVerifier::new(ISSUER, Arc::new(StaticKeySource(keyset)));
        let mut server = ToolServer::new("test", AUDIENCE, verifier);

        server.register(
            ToolDescriptor {
                name: "echo".into(),
                description: "Echo arguments".into(),
                parameters: vec![ParameterSchema::required("text", "string", "Text")],
                required_roles: vec![],
                audience: AUDIENCE.into(),
            },
            Arc::new(EchoTool),
        );
        server.register(
            ToolDescriptor {
                name: "admin_echo".into(),
                description: "Echo, admins only".into(),
                parameters: vec![],
                required_roles: vec!["admin".into()],
                audience: AUDIENCE.into(),
            },
            Arc::new(EchoTool),
        );

        server
    }

    fn token(client_id: &str, secret: &str) -> String {
        issuer()
            .issue(client_id, secret, &[AUDIENCE.into()])
            .unwrap()
            .access_token
    }

    async fn invoke(app: Router, tool: &str, token: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(format!("/tools/{}", tool))
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }

        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let app = server().router();

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            bodies.push(serde_json::from_slice::<Value>(&bytes).unwrap());
        }

        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invoke_requires_credential() {
        let (status, body) = invoke(server().router(), "echo", None, r#"{"text":"hi"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "MISSING_CREDENTIAL");
    }

    #[tokio::test]
    async fn test_invoke_with_valid_token() {
        let token = token("admin", "admin-secret");
        let (status, body) = invoke(
            server().router(),
            "echo",
            Some(&token),
            r#"{"text":"hi"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["subject"], "admin");
    }

    #[tokio::test]
    async fn test_rbac_gate_denies_before_handler() {
        let token = token("viewer", "viewer-secret");
        let (status, body) = invoke(server().router(), "admin_echo", Some(&token), "{}").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_admin_passes_rbac_gate() {
        let token = token("admin", "admin-secret");
        let (status, body) = invoke(server().router(), "admin_echo", Some(&token), "{}").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["subject"], "admin");
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let token = token("admin", "admin-secret");
        let (status, body) = invoke(server().router(), "echo", Some(&token), "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let token = token("admin", "admin-secret");
        let (status, body) = invoke(server().router(), "missing", Some(&token), "{}").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_TOOL");
    }

    #[tokio::test]
    async fn test_wrong_audience_token_rejected() {
        // token minted for another server's audience
        let other = "http://127.0.0.1:9001";
        let config = IssuerConfig::new(ISSUER, vec![other.into()]);
        let mut issuer = TokenIssuer::with_dev_key(config);
        issuer.register_client(
            ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
        );
        let token = issuer
            .issue("admin", "admin-secret", &[other.into()])
            .unwrap()
            .access_token;

        let (status, body) = invoke(server().router(), "echo", Some(&token), r#"{"text":"x"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUDIENCE_MISMATCH");
    }

    #[tokio::test]
    async fn test_expired_token_rejected_with_distinct_code() {
        let config = IssuerConfig::new(ISSUER, vec![AUDIENCE.into()]).with_ttl_secs(-1);
        let mut issuer = TokenIssuer::with_dev_key(config);
        issuer.register_client(
            ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
        );
        let token = issuer
            .issue("admin", "admin-secret", &[AUDIENCE.into()])
            .unwrap()
            .access_token;

        let (status, body) = invoke(server().router(), "echo", Some(&token), r#"{"text":"x"}"#).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_EXPIRED");
    }
}
