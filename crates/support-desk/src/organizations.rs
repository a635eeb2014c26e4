//! Organizations Tools
//!
//! Directory of organizations and their members. Member queries are open to
//! admins, or to members of the organization holding the
//! `view_agency_users` permission; the full organization listing is
//! admin-only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use agent_auth::Principal;
use agent_core::ToolDescriptor;
use agent_core::tool::ParameterSchema;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::DeskError;
use crate::server::ToolHandler;

/// Permission to list and compare an organization's members
pub const PERM_VIEW_AGENCY_USERS: &str = "view_agency_users";

/// An organization record
#[derive(Clone, Debug, Serialize)]
pub struct Organization {
    pub name: String,
    pub aware_service: bool,
    pub status: String,
    pub region: String,
}

/// One user's membership in one organization
#[derive(Clone, Debug)]
pub struct Membership {
    pub username: String,
    pub organization: String,
    pub permissions: BTreeSet<String>,
}

/// Read-mostly organizations directory; immutable after seeding.
#[derive(Default)]
pub struct OrgDirectory {
    organizations: BTreeMap<String, Organization>,
    memberships: Vec<Membership>,
}

impl OrgDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with the demo data set
    pub fn seeded() -> Self {
        let mut directory = Self::new();

        directory.add_organization(Organization {
            name: "Dallas_Police".into(),
            aware_service: true,
            status: "active".into(),
            region: "TX-North".into(),
        });
        directory.add_organization(Organization {
            name: "Allen_Firestation".into(),
            aware_service: false,
            status: "active".into(),
            region: "TX-Collin".into(),
        });

        directory.add_membership("james_smith", "Dallas_Police", &[PERM_VIEW_AGENCY_USERS, "manage_radios"]);
        directory.add_membership("linda_baker", "Dallas_Police", &[PERM_VIEW_AGENCY_USERS]);
        directory.add_membership("terry_jobs", "Dallas_Police", &[]);
        directory.add_membership("paul_morgan", "Allen_Firestation", &[PERM_VIEW_AGENCY_USERS]);

        directory
    }

    pub fn add_organization(&mut self, organization: Organization) {
        self.organizations
            .insert(organization.name.clone(), organization);
    }

    pub fn add_membership(&mut self, username: &str, organization: &str, permissions: &[&str]) {
        self.memberships.push(Membership {
            username: username.to_string(),
            organization: organization.to_string(),
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
        });
    }

    pub fn organizations(&self) -> impl Iterator<Item = &Organization> {
        self.organizations.values()
    }

    pub fn users_of(&self, organization: &str) -> Vec<&str> {
        self.memberships
            .iter()
            .filter(|m| m.organization == organization)
            .map(|m| m.username.as_str())
            .collect()
    }

    /// Permissions of `username` within `organization`, if a member
    pub fn permissions_of(&self, username: &str, organization: &str) -> Option<&BTreeSet<String>> {
        self.memberships
            .iter()
            .find(|m| m.username == username && m.organization == organization)
            .map(|m| &m.permissions)
    }

    /// Permissions of `username` in any organization (directory-wide lookup)
    pub fn permissions_anywhere(&self, username: &str) -> BTreeSet<String> {
        self.memberships
            .iter()
            .filter(|m| m.username == username)
            .flat_map(|m| m.permissions.iter().cloned())
            .collect()
    }
}

/// Admins pass; members need `view_agency_users` within the organization.
fn may_view_members(directory: &OrgDirectory, principal: &Principal, organization: &str) -> bool {
    if principal.has_role("admin") {
        return true;
    }
    directory
        .permissions_of(&principal.subject, organization)
        .is_some_and(|perms| perms.contains(PERM_VIEW_AGENCY_USERS))
}

const MEMBER_DENIAL: &str =
    "User does not have permission to use this tool for the given organization";

fn arg_str<'a>(args: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

// ----------------------------------------------------------------------------
// Tools
// ----------------------------------------------------------------------------

/// `get_organizations` — full organization listing. Admin only.
pub struct GetOrganizationsTool {
    directory: Arc<OrgDirectory>,
}

impl GetOrganizationsTool {
    pub fn new(directory: Arc<OrgDirectory>) -> Self {
        Self { directory }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_organizations".into(),
            description: "Retrieve every organization with its service flag, status \
                          and region."
                .into(),
            parameters: vec![],
            required_roles: vec!["admin".into()],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for GetOrganizationsTool {
    async fn call(
        &self,
        _args: &serde_json::Map<String, Value>,
        _principal: &Principal,
    ) -> Result<Value, DeskError> {
        let mut map = serde_json::Map::new();
        for org in self.directory.organizations() {
            map.insert(
                org.name.clone(),
                json!({
                    "aware_service": org.aware_service,
                    "status": org.status,
                    "region": org.region,
                }),
            );
        }
        Ok(Value::Object(map))
    }
}

/// `get_organization_users` — usernames of an organization's members.
pub struct OrganizationUsersTool {
    directory: Arc<OrgDirectory>,
}

impl OrganizationUsersTool {
    pub fn new(directory: Arc<OrgDirectory>) -> Self {
        Self { directory }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_organization_users".into(),
            description: "Retrieve all usernames for a given organization. Callers \
                          must be admins, or members of the organization with \
                          permission to view its members."
                .into(),
            parameters: vec![ParameterSchema::required(
                "organization",
                "string",
                "Organization name",
            )],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for OrganizationUsersTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        let organization = arg_str(args, "organization")
            .ok_or_else(|| DeskError::InvalidArguments("organization must be a string".into()))?;

        if !may_view_members(&self.directory, principal, organization) {
            return Ok(json!({ "error": MEMBER_DENIAL }));
        }

        Ok(json!({ "users": self.directory.users_of(organization) }))
    }
}

/// `compare_user_permissions` — shared and per-user permissions within an
/// organization.
pub struct CompareUserPermissionsTool {
    directory: Arc<OrgDirectory>,
}

impl CompareUserPermissionsTool {
    pub fn new(directory: Arc<OrgDirectory>) -> Self {
        Self { directory }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "compare_user_permissions".into(),
            description: "Compare the organization permissions of the given usernames: \
                          which permissions all of them share, and which are unique to \
                          each. Callers must be admins, or members of the organization \
                          with permission to view its members."
                .into(),
            parameters: vec![
                ParameterSchema::required("organization", "string", "Organization name"),
                ParameterSchema::required("usernames", "array", "Usernames to compare"),
            ],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for CompareUserPermissionsTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        principal: &Principal,
    ) -> Result<Value, DeskError> {
        let organization = arg_str(args, "organization")
            .ok_or_else(|| DeskError::InvalidArguments("organization must be a string".into()))?;
        let usernames: Vec<String> = args
            .get("usernames")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| DeskError::InvalidArguments("usernames must be an array".into()))?;
        if usernames.is_empty() {
            return Err(DeskError::InvalidArguments("usernames must not be empty".into()));
        }

        if !may_view_members(&self.directory, principal, organization) {
            return Ok(json!({ "error": MEMBER_DENIAL }));
        }

        let per_user: Vec<(String, BTreeSet<String>)> = usernames
            .iter()
            .map(|u| {
                let perms = self
                    .directory
                    .permissions_of(u, organization)
                    .cloned()
                    .unwrap_or_default();
                (u.clone(), perms)
            })
            .collect();

        let mut shared = per_user
            .first()
            .map(|(_, perms)| perms.clone())
            .unwrap_or_default();
        for (_, perms) in &per_user {
            shared = shared.intersection(perms).cloned().collect();
        }

        let mut comparison = serde_json::Map::new();
        comparison.insert(
            "shared_permissions".into(),
            json!(shared.iter().collect::<Vec<_>>()),
        );
        for (user, perms) in &per_user {
            let unique: Vec<&String> = perms.difference(&shared).collect();
            comparison.insert(format!("unique_to_{}", user), json!(unique));
        }

        Ok(Value::Object(comparison))
    }
}
