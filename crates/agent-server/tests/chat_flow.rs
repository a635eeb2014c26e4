//! End-to-end agent flow against an in-process stack: token issuer and
//! ticketing tool server on ephemeral ports, real HTTP in between, and the
//! orchestrator driven by a scripted reasoning provider.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::net::TcpListener;

use agent_auth::{
    AuthError, ClientRecord, IssuedGrant, IssuerConfig, TokenCache, TokenIssuer, TokenSource,
    TokenVerifier,
};
use agent_core::{
    AgentError, Completion, EventSink, GenerationOptions, InvocationOutcome, LlmProvider,
    Message, Orchestrator, RateLimiter, ToolCall, ToolInvoker,
};
use agent_runtime::{
    HttpToolInvoker, IssuerClient, IssuerClientConfig, JwksKeySource, ToolServerConfig,
};
use agent_server::issuer_router;
use support_desk::{KeywordIndex, TicketStatus, TicketStore, ticketing_server};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn spawn_serve(listener: TcpListener, router: axum::Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

struct Stack {
    issuer_url: String,
    ticketing_url: String,
    store: Arc<TicketStore>,
}

async fn start_stack() -> Stack {
    let (issuer_listener, issuer_url) = bind().await;
    let (ticketing_listener, ticketing_url) = bind().await;

    let config = IssuerConfig::new(&issuer_url, vec![ticketing_url.clone()]);
    let mut issuer = TokenIssuer::with_dev_key(config);
    issuer.register_client(
        ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
    );
    issuer.register_client(ClientRecord::new("viewer", "viewer-secret", "viewer"));
    spawn_serve(issuer_listener, issuer_router(Arc::new(issuer)));

    let store = Arc::new(TicketStore::new());
    let verifier = TokenVerifier::new(&issuer_url, Arc::new(JwksKeySource::new(&issuer_url)));
    let server = ticketing_server(
        &ticketing_url,
        verifier,
        store.clone(),
        Arc::new(KeywordIndex::seeded()),
    );
    spawn_serve(ticketing_listener, server.router());

    Stack {
        issuer_url,
        ticketing_url,
        store,
    }
}

fn invoker_for(stack: &Stack, client_id: &str, client_secret: &str) -> Arc<HttpToolInvoker> {
    let issuer_client = IssuerClient::new(IssuerClientConfig::new(
        &stack.issuer_url,
        client_id,
        client_secret,
    ));
    let tokens = Arc::new(TokenCache::new(Arc::new(issuer_client)));
    Arc::new(HttpToolInvoker::new(
        vec![ToolServerConfig::new("ticketing", &stack.ticketing_url)],
        tokens,
    ))
}

struct ScriptedProvider {
    steps: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    fn new(steps: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.iter().map(|s| (*s).to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        _messages: &[Message],
        options: &GenerationOptions,
    ) -> agent_core::Result<Completion> {
        let content = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))?;
        Ok(Completion {
            content,
            model: options.model.clone(),
        })
    }

    async fn health_check(&self) -> agent_core::Result<bool> {
        Ok(true)
    }
}

fn orchestrator(provider: Arc<dyn LlmProvider>, invoker: Arc<dyn ToolInvoker>) -> Orchestrator {
    Orchestrator::builder()
        .provider(provider)
        .invoker(invoker)
        .limiter(Arc::new(RateLimiter::new(100, 100.0)))
        .build()
        .unwrap()
}

fn whoami_call() -> ToolCall {
    ToolCall {
        name: "whoami".into(),
        arguments: serde_json::Map::new(),
        id: None,
    }
}

#[tokio::test]
async fn test_admin_resolves_ticket_end_to_end() {
    let stack = start_stack().await;
    stack.store.create("Radio broken", "No signal", "james_smith");

    let provider = ScriptedProvider::new(&[
        "```tool\n{\"tool\": \"resolve_ticket\", \"arguments\": \
         {\"ticket_id\": 1, \"resolution_description\": \"Replaced antenna\"}}\n```",
        "Ticket 1 has been resolved.",
    ]);
    let agent = orchestrator(provider, invoker_for(&stack, "admin", "admin-secret"));

    let (sink, _rx) = EventSink::channel(64);
    let summary = agent
        .run(vec![Message::user("please resolve ticket 1")], sink)
        .await
        .unwrap();

    assert_eq!(summary.content, "Ticket 1 has been resolved.");
    assert_eq!(summary.records.len(), 1);
    assert!(matches!(
        summary.records[0].outcome,
        InvocationOutcome::Success { .. }
    ));
    assert_eq!(stack.store.get(1).unwrap().status, TicketStatus::Resolved);
}

#[tokio::test]
async fn test_viewer_denied_as_tool_output_without_side_effect() {
    let stack = start_stack().await;
    stack.store.create("Radio broken", "No signal", "james_smith");

    let provider = ScriptedProvider::new(&[
        "```tool\n{\"tool\": \"resolve_ticket\", \"arguments\": \
         {\"ticket_id\": 1, \"resolution_description\": \"done\"}}\n```",
        "I lack permission to resolve tickets.",
    ]);
    let agent = orchestrator(provider, invoker_for(&stack, "viewer", "viewer-secret"));

    let (sink, _rx) = EventSink::channel(64);
    let summary = agent
        .run(vec![Message::user("please resolve ticket 1")], sink)
        .await
        .unwrap();

    // the denial came back as ordinary tool output and the loop continued
    assert_eq!(summary.content, "I lack permission to resolve tickets.");
    match &summary.records[0].outcome {
        InvocationOutcome::Failure { message } => {
            assert!(message.contains("permission"), "got: {}", message);
        }
        other => panic!("expected failure outcome, got {:?}", other),
    }

    // no side effect was performed
    assert_eq!(stack.store.get(1).unwrap().status, TicketStatus::Active);
}

struct ExpiredFirstSource {
    issuer_url: String,
    audience: String,
    real: IssuerClient,
    calls: AtomicU32,
    served_expired: AtomicBool,
}

#[async_trait]
impl TokenSource for ExpiredFirstSource {
    async fn issue_for(&self, audience: &str) -> Result<IssuedGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.served_expired.swap(true, Ordering::SeqCst) {
            // a properly signed token whose expiry already passed, cached
            // with a future expires_at so the cache serves it
            let config = IssuerConfig::new(&self.issuer_url, vec![self.audience.clone()])
                .with_ttl_secs(-1);
            let mut issuer = TokenIssuer::with_dev_key(config);
            issuer.register_client(
                ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
            );
            let expired = issuer
                .issue("admin", "admin-secret", &[self.audience.clone()])
                .unwrap();
            return Ok(IssuedGrant {
                access_token: expired.access_token,
                expires_at: chrono::Utc::now() + chrono::Duration::seconds(600),
            });
        }

        self.real.issue_for(audience).await
    }
}

#[tokio::test]
async fn test_expired_token_triggers_single_reissue_and_retry() {
    let stack = start_stack().await;

    let source = Arc::new(ExpiredFirstSource {
        issuer_url: stack.issuer_url.clone(),
        audience: stack.ticketing_url.clone(),
        real: IssuerClient::new(IssuerClientConfig::new(
            &stack.issuer_url,
            "admin",
            "admin-secret",
        )),
        calls: AtomicU32::new(0),
        served_expired: AtomicBool::new(false),
    });

    let invoker = HttpToolInvoker::new(
        vec![ToolServerConfig::new("ticketing", &stack.ticketing_url)],
        Arc::new(TokenCache::new(source.clone())),
    );
    invoker.discover().await.unwrap();

    let result = invoker.invoke(&whoami_call()).await.unwrap();

    // first attempt hit TOKEN_EXPIRED, the invoker reissued once and retried
    assert!(result.success, "got: {}", result.output);
    assert!(result.output.contains("admin"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

struct CountingSource {
    real: IssuerClient,
    calls: AtomicU32,
}

#[async_trait]
impl TokenSource for CountingSource {
    async fn issue_for(&self, audience: &str) -> Result<IssuedGrant, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.real.issue_for(audience).await
    }
}

#[tokio::test]
async fn test_concurrent_invocations_share_one_issuance() {
    let stack = start_stack().await;

    let source = Arc::new(CountingSource {
        real: IssuerClient::new(IssuerClientConfig::new(
            &stack.issuer_url,
            "admin",
            "admin-secret",
        )),
        calls: AtomicU32::new(0),
    });

    let invoker = Arc::new(HttpToolInvoker::new(
        vec![ToolServerConfig::new("ticketing", &stack.ticketing_url)],
        Arc::new(TokenCache::new(source.clone())),
    ));
    invoker.discover().await.unwrap();

    let call_a = whoami_call();
    let call_b = whoami_call();
    let (a, b) = tokio::join!(invoker.invoke(&call_a), invoker.invoke(&call_b));

    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_discovery_idempotent_over_http() {
    let stack = start_stack().await;
    let invoker = invoker_for(&stack, "admin", "admin-secret");

    let first = invoker.discover().await.unwrap();
    let second = invoker.discover().await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}
