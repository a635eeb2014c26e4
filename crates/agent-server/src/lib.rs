//! # agent-server
//!
//! Process wiring for desk-agent: the token issuer, the ticketing and
//! organizations tool servers, and the chat API, assembled from the
//! workspace crates. The binary in `main.rs` runs all of them in one
//! process; the pieces are exposed here so integration tests can assemble
//! the same stack on ephemeral ports.

pub mod config;
pub mod handlers;
pub mod issuer;
pub mod state;

pub use config::Settings;
pub use issuer::{issuer_router, seeded_issuer};
pub use state::AppState;
