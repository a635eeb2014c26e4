//! desk-agent Server
//!
//! One process hosting the whole demo deployment: the token issuer, the
//! ticketing and organizations tool servers (each with its own verifier
//! and RBAC gate), and the chat API driving the orchestrator.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use agent_auth::{IssuerConfig, TokenCache, TokenVerifier};
use agent_core::{LlmProvider, Orchestrator, RateLimiter};
use agent_runtime::{
    HttpToolInvoker, IssuerClient, IssuerClientConfig, JwksKeySource, OpenAiConfig,
    OpenAiProvider, ToolInvoker, ToolServerConfig,
};
use support_desk::{KeywordIndex, OrgDirectory, TicketStore, organizations_server, ticketing_server};

use agent_server::config::Settings;
use agent_server::handlers::{chat_handler, chat_stream_handler, health_check};
use agent_server::issuer::{issuer_router, seeded_issuer};
use agent_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let settings = Settings::from_env();

    let issuer_url = settings.issuer_url();
    let ticketing_url = settings.ticketing_url();
    let organizations_url = settings.organizations_url();

    // Token issuer
    let issuer_config = IssuerConfig::new(
        &issuer_url,
        vec![ticketing_url.clone(), organizations_url.clone()],
    )
    .with_ttl_secs(settings.token_ttl_secs);
    let issuer = Arc::new(seeded_issuer(issuer_config));

    let issuer_listener = tokio::net::TcpListener::bind(settings.issuer_addr.as_str()).await?;
    tokio::spawn(serve(issuer_listener, issuer_router(issuer)));
    tracing::info!("✓ Token issuer on {}", issuer_url);

    // Tool servers, each with its own verifier pulling keys from the issuer
    let ticket_store = Arc::new(TicketStore::new());
    let docs_index = Arc::new(KeywordIndex::seeded());
    let ticketing = ticketing_server(
        &ticketing_url,
        TokenVerifier::new(&issuer_url, Arc::new(JwksKeySource::new(&issuer_url))),
        ticket_store,
        docs_index,
    );
    let ticketing_listener = tokio::net::TcpListener::bind(settings.ticketing_addr.as_str()).await?;
    tokio::spawn(serve(ticketing_listener, ticketing.router()));
    tracing::info!("✓ Ticketing tool server on {}", ticketing_url);

    let directory = Arc::new(OrgDirectory::seeded());
    let organizations = organizations_server(
        &organizations_url,
        TokenVerifier::new(&issuer_url, Arc::new(JwksKeySource::new(&issuer_url))),
        directory,
    );
    let organizations_listener =
        tokio::net::TcpListener::bind(settings.organizations_addr.as_str()).await?;
    tokio::spawn(serve(organizations_listener, organizations.router()));
    tracing::info!("✓ Organizations tool server on {}", organizations_url);

    // Reasoning provider
    let provider: Arc<dyn LlmProvider> = match OpenAiProvider::from_env() {
        Ok(provider) => {
            if provider.health_check().await.unwrap_or(false) {
                tracing::info!("✓ Reasoning provider reachable");
            } else {
                tracing::warn!("⚠ Reasoning provider not reachable - agent will fail");
            }
            Arc::new(provider)
        }
        Err(_) => {
            tracing::warn!("⚠ OPENAI_API_KEY not set - agent will fail");
            tracing::warn!("  Set OPENAI_API_KEY (and optionally OPENAI_BASE_URL) in .env");
            Arc::new(OpenAiProvider::new(OpenAiConfig::new(String::new())))
        }
    };

    // Invoker: shared token cache over the issuer, one entry per audience
    let issuer_client = IssuerClient::new(IssuerClientConfig {
        base_url: issuer_url.clone(),
        ..IssuerClientConfig::from_env()
    });
    let tokens = Arc::new(TokenCache::new(Arc::new(issuer_client)));
    let invoker = Arc::new(HttpToolInvoker::new(
        vec![
            ToolServerConfig::new("ticketing", &ticketing_url),
            ToolServerConfig::new("organizations", &organizations_url),
        ],
        tokens,
    ));

    match invoker.discover().await {
        Ok(toolset) => {
            tracing::info!("Discovered {} tools:", toolset.len());
            for descriptor in &toolset {
                tracing::info!("  • {}", descriptor.name);
            }
        }
        Err(e) => tracing::warn!("⚠ Tool discovery failed at startup: {}", e),
    }

    // Shared rate limiter across all conversations in this process
    let limiter = Arc::new(RateLimiter::new(
        settings.rate_capacity,
        settings.rate_refill_per_sec,
    ));
    tracing::info!(
        "Rate limiter configured: burst {}, {} requests/second",
        settings.rate_capacity,
        settings.rate_refill_per_sec
    );
    tracing::info!(
        "Tool call budget: {} calls per conversation",
        settings.tool_call_budget
    );

    let orchestrator = Orchestrator::builder()
        .provider(provider.clone())
        .invoker(invoker)
        .limiter(limiter)
        .tool_call_budget(settings.tool_call_budget)
        .model(settings.model.clone())
        .build()?;

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        provider,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr.as_str()).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 desk-agent running on http://{}", settings.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health           - Health check");
    tracing::info!("  POST /api/chat         - Send conversation, get answer");
    tracing::info!("  POST /api/chat/stream  - SSE event stream");
    tracing::info!("  POST {}/token  - Token issuance", issuer_url);
    tracing::info!("  GET  {}/jwks   - Verification keys", issuer_url);
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve(listener: tokio::net::TcpListener, router: Router) {
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("Auxiliary server failed: {}", e);
    }
}
