//! Ticketing Tools
//!
//! Support-ticket management: creation is open to any authenticated
//! principal, resolution and cross-user queries are admin-only. Storage is
//! an in-process store; durability is this server's own concern and opaque
//! to the orchestration core.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use agent_auth::Principal;
use agent_core::ToolDescriptor;
use agent_core::tool::ParameterSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::DeskError;
use crate::server::ToolHandler;

/// Ticket lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TicketStatus::Active),
            "resolved" => Some(TicketStatus::Resolved),
            _ => None,
        }
    }
}

/// A support ticket
#[derive(Clone, Debug, Serialize)]
pub struct Ticket {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub username: String,
    pub status: TicketStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    tickets: BTreeMap<u64, Ticket>,
}

/// In-memory ticket store
#[derive(Default)]
pub struct TicketStore {
    inner: RwLock<Inner>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, title: &str, description: &str, username: &str) -> u64 {
        let mut inner = self.inner.write().expect("ticket store lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tickets.insert(
            id,
            Ticket {
                id,
                title: title.to_string(),
                description: description.to_string(),
                username: username.to_string(),
                status: TicketStatus::Active,
                resolution: None,
                resolved_by: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Resolve an active ticket. Returns the prior status on refusal.
    pub fn resolve(
        &self,
        id: u64,
        resolution: &str,
        resolved_by: &str,
    ) -> Result<(), ResolveRefusal> {
        let mut inner = self.inner.write().expect("ticket store lock poisoned");
        let Some(ticket) = inner.tickets.get_mut(&id) else {
            return Err(ResolveRefusal::NotFound);
        };
        if ticket.status != TicketStatus::Active {
            return Err(ResolveRefusal::NotActive);
        }
        ticket.status = TicketStatus::Resolved;
        ticket.resolution = Some(resolution.to_string());
        ticket.resolved_by = Some(resolved_by.to_string());
        Ok(())
    }

    pub fn by_user(&self, username: &str) -> Vec<Ticket> {
        let inner = self.inner.read().expect("ticket store lock poisoned");
        inner
            .tickets
            .values()
            .filter(|t| t.username == username)
            .cloned()
            .collect()
    }

    pub fn by_status(&self, status: Option<TicketStatus>) -> Vec<Ticket> {
        let inner = self.inner.read().expect("ticket store lock poisoned");
        inner
            .tickets
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<Ticket> {
        let inner = self.inner.read().expect("ticket store lock poisoned");
        inner.tickets.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("ticket store lock poisoned");
        inner.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a resolution was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveRefusal {
    NotFound,
    NotActive,
}

fn ticket_json(ticket: &Ticket) -> Value {
    json!({
        "title": ticket.title,
        "description": ticket.description,
        "status": ticket.status.as_str(),
        "resolution": ticket.resolution,
        "resolved_by": ticket.resolved_by,
    })
}

fn tickets_map(tickets: &[Ticket]) -> Value {
    let mut map = serde_json::Map::new();
    for ticket in tickets {
        map.insert(ticket.id.to_string(), ticket_json(ticket));
    }
    Value::Object(map)
}

fn arg_str<'a>(args: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

// ----------------------------------------------------------------------------
// Tools
// ----------------------------------------------------------------------------

/// `create_ticket` — submit a ticket on behalf of the user. Any role.
pub struct CreateTicketTool {
    store: Arc<TicketStore>,
}

impl CreateTicketTool {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "create_ticket".into(),
            description: "Submit a support ticket describing a user issue. \
                          The ticket is attributed to the authenticated user."
                .into(),
            parameters: vec![
                ParameterSchema::required("title", "string", "Short ticket title"),
                ParameterSchema::required("description", "string", "Full issue description"),
            ],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for CreateTicketTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        let title = arg_str(args, "title")
            .ok_or_else(|| DeskError::InvalidArguments("title must be a string".into()))?;
        let description = arg_str(args, "description")
            .ok_or_else(|| DeskError::InvalidArguments("description must be a string".into()))?;
        if title.is_empty() {
            return Err(DeskError::InvalidArguments("title must not be empty".into()));
        }

        let id = self.store.create(title, description, &principal.subject);
        tracing::info!(id, subject = %principal.subject, "Ticket created");
        Ok(json!(format!("Ticket successfully created with id: {}", id)))
    }
}

/// `resolve_ticket` — close an active ticket. Admin only.
pub struct ResolveTicketTool {
    store: Arc<TicketStore>,
}

impl ResolveTicketTool {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "resolve_ticket".into(),
            description: "Resolve an active support ticket with a resolution note.".into(),
            parameters: vec![
                ParameterSchema::required("ticket_id", "number", "Ticket to resolve"),
                ParameterSchema::required(
                    "resolution_description",
                    "string",
                    "How the issue was resolved",
                ),
            ],
            required_roles: vec!["admin".into()],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for ResolveTicketTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        let id = args
            .get("ticket_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| DeskError::InvalidArguments("ticket_id must be a number".into()))?;
        let resolution = arg_str(args, "resolution_description").ok_or_else(|| {
            DeskError::InvalidArguments("resolution_description must be a string".into())
        })?;

        match self.store.resolve(id, resolution, &principal.subject) {
            Ok(()) => {
                tracing::info!(id, subject = %principal.subject, "Ticket resolved");
                Ok(json!(format!("Ticket {} resolved", id)))
            }
            Err(ResolveRefusal::NotFound) => Ok(json!(format!("Ticket ID {} not found", id))),
            Err(ResolveRefusal::NotActive) => {
                Ok(json!(format!("Ticket {} status not active", id)))
            }
        }
    }
}

/// `get_tickets_by_user` — list a user's tickets. Non-admins may only view
/// their own.
pub struct TicketsByUserTool {
    store: Arc<TicketStore>,
}

impl TicketsByUserTool {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_tickets_by_user".into(),
            description: "View tickets created by a user. Without a username argument, \
                          lists the authenticated user's own tickets; other users' \
                          tickets require the admin role."
                .into(),
            parameters: vec![ParameterSchema::optional(
                "username",
                "string",
                "Ticket owner; defaults to the authenticated user",
            )],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for TicketsByUserTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        let target = arg_str(args, "username").unwrap_or(&principal.subject);

        if target != principal.subject && !principal.has_role("admin") {
            return Ok(json!({
                "error": "User does not have permission to use this tool for the given username"
            }));
        }

        Ok(tickets_map(&self.store.by_user(target)))
    }
}

/// `get_tickets_by_status` — list tickets by status. Admin only.
pub struct TicketsByStatusTool {
    store: Arc<TicketStore>,
}

impl TicketsByStatusTool {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_tickets_by_status".into(),
            description: "List all tickets of a given status, or every ticket when no \
                          status is given."
                .into(),
            parameters: vec![ParameterSchema::optional(
                "status",
                "string",
                "Ticket status: 'active' or 'resolved'",
            )],
            required_roles: vec!["admin".into()],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for TicketsByStatusTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        _principal: &Principal,
    ) -> Result<Value, DeskError> {
        let status = match arg_str(args, "status") {
            Some(s) => Some(
                TicketStatus::parse(s)
                    .ok_or_else(|| DeskError::InvalidArguments(format!("unknown status: {}", s)))?,
            ),
            None => None,
        };

        Ok(tickets_map(&self.store.by_status(status)))
    }
}

/// `whoami` — echo the authenticated identity's claims. Any role.
pub struct WhoamiTool;

impl WhoamiTool {
    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "whoami".into(),
            description: "Retrieve the authenticated user's username, roles and \
                          organization memberships."
                .into(),
            parameters: vec![],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for WhoamiTool {
    async fn call(
        &self,
        _args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        Ok(json!({
            "username": principal.subject,
            "roles": principal.roles,
            "organizations": principal.organizations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(subject: &str, roles: &[&str]) -> Principal {
        Principal {
            subject: subject.into(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            organizations: vec![],
        }
    }

    fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_store_create_and_resolve() {
        let store = TicketStore::new();
        let id = store.create("Radio broken", "No signal", "james_smith");
        assert_eq!(id, 1);
        assert_eq!(store.get(id).unwrap().status, TicketStatus::Active);

        store.resolve(id, "Replaced antenna", "admin").unwrap();
        let ticket = store.get(id).unwrap();
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.resolved_by.as_deref(), Some("admin"));

        assert_eq!(
            store.resolve(id, "again", "admin"),
            Err(ResolveRefusal::NotActive)
        );
        assert_eq!(
            store.resolve(99, "x", "admin"),
            Err(ResolveRefusal::NotFound)
        );
    }

    #[tokio::test]
    async fn test_create_ticket_attributes_to_principal() {
        let store = Arc::new(TicketStore::new());
        let tool = CreateTicketTool::new(store.clone());

        let out = tool
            .call(
                &args(&[
                    ("title", json!("Radio broken")),
                    ("description", json!("No signal after update")),
                ]),
                &principal("james_smith", &[]),
            )
            .await
            .unwrap();

        assert_eq!(out, json!("Ticket successfully created with id: 1"));
        assert_eq!(store.by_user("james_smith").len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_missing_ticket_is_plain_output() {
        let tool = ResolveTicketTool::new(Arc::new(TicketStore::new()));
        let out = tool
            .call(
                &args(&[
                    ("ticket_id", json!(42)),
                    ("resolution_description", json!("done")),
                ]),
                &principal("admin", &["admin"]),
            )
            .await
            .unwrap();
        assert_eq!(out, json!("Ticket ID 42 not found"));
    }

    #[tokio::test]
    async fn test_tickets_by_user_scoping() {
        let store = Arc::new(TicketStore::new());
        store.create("a", "a", "james_smith");
        store.create("b", "b", "linda_baker");
        let tool = TicketsByUserTool::new(store);

        // self view is allowed
        let own = tool
            .call(&args(&[]), &principal("james_smith", &[]))
            .await
            .unwrap();
        assert_eq!(own.as_object().unwrap().len(), 1);

        // other users' tickets require admin
        let denied = tool
            .call(
                &args(&[("username", json!("linda_baker"))]),
                &principal("james_smith", &[]),
            )
            .await
            .unwrap();
        assert!(denied.get("error").is_some());

        let admin_view = tool
            .call(
                &args(&[("username", json!("linda_baker"))]),
                &principal("admin", &["admin"]),
            )
            .await
            .unwrap();
        assert_eq!(admin_view.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tickets_by_status_filter() {
        let store = Arc::new(TicketStore::new());
        let id = store.create("a", "a", "x");
        store.create("b", "b", "y");
        store.resolve(id, "done", "admin").unwrap();

        let tool = TicketsByStatusTool::new(store);
        let admin = principal("admin", &["admin"]);

        let active = tool
            .call(&args(&[("status", json!("active"))]), &admin)
            .await
            .unwrap();
        assert_eq!(active.as_object().unwrap().len(), 1);

        let all = tool.call(&args(&[]), &admin).await.unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);

        let err = tool
            .call(&args(&[("status", json!("open"))]), &admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::InvalidArguments(_)));
    }
}
