//! Issuer Endpoints
//!
//! HTTP surface of the token issuer: `POST /token` for issuance and
//! `GET /jwks` for key-set retrieval.

use std::sync::Arc;

use agent_auth::{AuthError, ClientRecord, IssuedToken, IssuerConfig, JwkSet, TokenIssuer};
use agent_runtime::TokenRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Build the issuer router
pub fn issuer_router(issuer: Arc<TokenIssuer>) -> Router {
    Router::new()
        .route("/token", post(token))
        .route("/jwks", get(jwks))
        .with_state(issuer)
}

async fn token(
    State(issuer): State<Arc<TokenIssuer>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<IssuedToken>, (StatusCode, Json<ErrorBody>)> {
    issuer
        .issue(
            &request.client_id,
            &request.client_secret,
            &request.requested_audiences,
        )
        .map(Json)
        .map_err(|e| {
            let status = match &e {
                AuthError::Authentication(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(ErrorBody {
                    error: e.to_string(),
                    code: e.code().into(),
                }),
            )
        })
}

async fn jwks(State(issuer): State<Arc<TokenIssuer>>) -> Json<JwkSet> {
    Json(issuer.publish_keys())
}

/// Issuer preloaded with the demo identity registry.
///
/// Secrets here are development-only; a deployment provisions its own
/// registry before exposing the endpoint.
pub fn seeded_issuer(config: IssuerConfig) -> TokenIssuer {
    let mut issuer = TokenIssuer::with_dev_key(config);

    issuer.register_client(ClientRecord::new("test-client", "test-secret", "test-client"));
    issuer.register_client(
        ClientRecord::new("admin", "admin-secret", "admin").with_roles(&["admin"]),
    );
    issuer.register_client(
        ClientRecord::new("james_smith", "james-secret", "james_smith")
            .with_organizations(&["Dallas_Police"]),
    );
    issuer.register_client(
        ClientRecord::new("linda_baker", "linda-secret", "linda_baker")
            .with_organizations(&["Dallas_Police"]),
    );
    issuer.register_client(
        ClientRecord::new("terry_jobs", "terry-secret", "terry_jobs")
            .with_organizations(&["Dallas_Police"]),
    );
    issuer.register_client(
        ClientRecord::new("paul_morgan", "paul-secret", "paul_morgan")
            .with_organizations(&["Allen_Firestation"]),
    );

    issuer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_issuer_serves_registered_clients() {
        let config = IssuerConfig::new(
            "http://127.0.0.1:9400",
            vec!["http://127.0.0.1:9000".into()],
        );
        let issuer = seeded_issuer(config);

        assert!(
            issuer
                .issue("admin", "admin-secret", &["http://127.0.0.1:9000".into()])
                .is_ok()
        );
        assert!(
            issuer
                .issue("admin", "wrong", &["http://127.0.0.1:9000".into()])
                .is_err()
        );
    }
}
