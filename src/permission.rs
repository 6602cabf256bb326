//! Roles, permissions and the acting principal
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::LifecycleError;
use crate::utils::is_blank;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    minicbor::Encode,
    minicbor::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Owner,
    #[n(2)]
    Driver,
    #[n(3)]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Owner, Role::Driver, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Driver => "driver",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability tuple such as `bookings:delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(id: &str, resource: &str, action: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("{resource} {action}"),
            resource: resource.to_string(),
            action: action.to_string(),
            description: String::new(),
        }
    }

    pub fn key(&self) -> String {
        grant_key(&self.resource, &self.action)
    }
}

fn grant_key(resource: &str, action: &str) -> String {
    format!(
        "{}:{}",
        resource.trim().to_ascii_lowercase(),
        action.trim().to_ascii_lowercase()
    )
}

/// Resolved `resource:action` grants held by a sub-admin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    grants: BTreeSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_permissions<'a>(permissions: impl IntoIterator<Item = &'a Permission>) -> Self {
        Self {
            grants: permissions.into_iter().map(Permission::key).collect(),
        }
    }

    /// Looks each assigned id up in the catalogue; unknown ids grant nothing.
    pub fn resolve(assigned_ids: &[String], catalogue: &[Permission]) -> Self {
        Self::from_permissions(
            catalogue
                .iter()
                .filter(|p| assigned_ids.iter().any(|id| *id == p.id)),
        )
    }

    pub fn grant(mut self, resource: &str, action: &str) -> Self {
        self.grants.insert(grant_key(resource, action));
        self
    }

    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.grants.contains(&grant_key(resource, action))
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().map(String::as_str)
    }
}

/// The authenticated principal a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub sub_admin: bool,
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
            sub_admin: false,
            permissions: PermissionSet::new(),
        }
    }
    pub fn admin(id: &str) -> Self {
        Self::new(id, Role::Admin)
    }
    pub fn sub_admin(id: &str, permissions: PermissionSet) -> Self {
        Self {
            sub_admin: true,
            permissions,
            ..Self::new(id, Role::Admin)
        }
    }
    pub fn owner(id: &str) -> Self {
        Self::new(id, Role::Owner)
    }
    pub fn driver(id: &str) -> Self {
        Self::new(id, Role::Driver)
    }
    pub fn customer(id: &str) -> Self {
        Self::new(id, Role::User)
    }

    pub fn is_full_admin(&self) -> bool {
        self.role == Role::Admin && !self.sub_admin
    }
}

/// An admin account restricted to an explicit subset of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAdmin {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
}

/// Payload for creating a sub-admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
    pub permission_ids: Vec<String>,
}

impl NewSubAdmin {
    pub fn new(name: &str, email: &str, password: &str, permission_ids: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            permission_ids,
        }
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        if is_blank(&self.name) {
            return Err(LifecycleError::malformed("name", "name is required"));
        }
        if !self.email.contains('@') {
            return Err(LifecycleError::malformed("email", "not a valid email address"));
        }
        if self.password.len() < 6 {
            return Err(LifecycleError::malformed(
                "password",
                "must be at least 6 characters",
            ));
        }
        validate_permission_ids(&self.permission_ids)
    }
}

impl SubAdmin {
    pub fn set_permissions(&mut self, permission_ids: Vec<String>) -> Result<(), LifecycleError> {
        validate_permission_ids(&permission_ids)?;
        self.permission_ids = permission_ids;
        Ok(())
    }
}

/// A sub-admin must always hold at least one permission.
pub fn validate_permission_ids(permission_ids: &[String]) -> Result<(), LifecycleError> {
    if permission_ids.iter().all(|id| is_blank(id)) {
        return Err(LifecycleError::malformed(
            "permissions",
            "select at least one permission",
        ));
    }
    Ok(())
}
