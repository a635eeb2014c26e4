//! # support-desk
//!
//! The tool-server side of desk-agent: an authenticated [`ToolServer`]
//! (registry + token verification + RBAC gate) and the domain tools it
//! hosts — ticketing, the organizations directory, and documentation
//! search. Each server owns its storage; nothing here is shared with the
//! orchestration core beyond the HTTP surface.

pub mod docs;
pub mod error;
pub mod organizations;
pub mod server;
pub mod ticketing;

pub use docs::{DocumentSearch, KeywordIndex, SearchDocsTool};
pub use error::{DeskError, Result};
pub use organizations::{
    CompareUserPermissionsTool, GetOrganizationsTool, OrgDirectory, OrganizationUsersTool,
};
pub use server::{ToolHandler, ToolServer};
pub use ticketing::{
    CreateTicketTool, ResolveTicketTool, Ticket, TicketStatus, TicketStore, TicketsByStatusTool,
    TicketsByUserTool, WhoamiTool,
};

use std::sync::Arc;

use agent_auth::TokenVerifier;

/// Assemble the ticketing tool server with every ticketing tool registered.
pub fn ticketing_server(
    audience: &str,
    verifier: TokenVerifier,
    store: Arc<TicketStore>,
    index: Arc<dyn DocumentSearch>,
) -> ToolServer {
    let mut server = ToolServer::new("ticketing", audience, verifier);
    server.register(WhoamiTool::descriptor(audience), Arc::new(WhoamiTool));
    server.register(
        CreateTicketTool::descriptor(audience),
        Arc::new(CreateTicketTool::new(store.clone())),
    );
    server.register(
        ResolveTicketTool::descriptor(audience),
        Arc::new(ResolveTicketTool::new(store.clone())),
    );
    server.register(
        TicketsByUserTool::descriptor(audience),
        Arc::new(TicketsByUserTool::new(store.clone())),
    );
    server.register(
        TicketsByStatusTool::descriptor(audience),
        Arc::new(TicketsByStatusTool::new(store)),
    );
    server.register(
        SearchDocsTool::descriptor(audience),
        Arc::new(SearchDocsTool::new(index)),
    );
    server
}

/// Assemble the organizations tool server.
pub fn organizations_server(
    audience: &str,
    verifier: TokenVerifier,
    directory: Arc<OrgDirectory>,
) -> ToolServer {
    let mut server = ToolServer::new("organizations", audience, verifier);
    server.register(
        GetOrganizationsTool::descriptor(audience),
        Arc::new(GetOrganizationsTool::new(directory.clone())),
    );
    server.register(
        OrganizationUsersTool::descriptor(audience),
        Arc::new(OrganizationUsersTool::new(directory.clone())),
    );
    server.register(
        CompareUserPermissionsTool::descriptor(audience),
        Arc::new(CompareUserPermissionsTool::new(directory)),
    );
    server
}
