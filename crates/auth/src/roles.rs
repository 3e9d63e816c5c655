use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainError, Entity, RoleId};

use crate::Permission;

/// Name of the distinguished role that holds the full permission universe.
pub const SUPERADMIN_ROLE: &str = "superadmin";

const MAX_ROLE_NAME_LEN: usize = 64;

/// A role: a name plus an ordered collection of permission identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Input for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl NewRole {
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Validate and normalize into `(name, permissions)`.
    ///
    /// Duplicate permissions are not rejected here; callers should avoid them.
    pub fn validate(&self) -> Result<(String, Vec<Permission>), DomainError> {
        let name = validate_role_name(&self.name)?;
        let permissions = parse_permissions(&self.permissions)?;
        Ok((name, permissions))
    }
}

/// Partial update of a role. Fields left as `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// A validated [`RoleUpdate`], ready to be applied to a stored row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub name: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

impl RoleUpdate {
    pub fn validate(&self) -> Result<RolePatch, DomainError> {
        let name = self.name.as_deref().map(validate_role_name).transpose()?;
        let permissions = self
            .permissions
            .as_deref()
            .map(parse_permissions)
            .transpose()?;
        Ok(RolePatch { name, permissions })
    }
}

impl RolePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.permissions.is_none()
    }

    pub fn apply(&self, role: &mut Role, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            role.name = name.clone();
        }
        if let Some(permissions) = &self.permissions {
            role.permissions = permissions.clone();
        }
        role.updated_at = now;
    }
}

fn validate_role_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    if name.len() > MAX_ROLE_NAME_LEN {
        return Err(DomainError::validation(format!(
            "role name cannot exceed {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn parse_permissions(raw: &[String]) -> Result<Vec<Permission>, DomainError> {
    raw.iter().map(|p| Permission::parse(p.trim())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    fn role(permissions: Vec<Permission>) -> Role {
        let now = Utc::now();
        Role {
            id: RoleId::new(1),
            name: "editor".to_string(),
            permissions,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn new_role_validation_trims_and_parses() {
        let input = NewRole {
            name: "  auditor ".to_string(),
            permissions: vec!["roles:list".to_string(), " roles:read".to_string()],
        };
        let (name, permissions) = input.validate().unwrap();
        assert_eq!(name, "auditor");
        assert_eq!(permissions, vec![builtin::ROLES_LIST, builtin::ROLES_READ]);
    }

    #[test]
    fn new_role_rejects_blank_name_and_bad_permissions() {
        let blank = NewRole::new("   ", Vec::new());
        assert!(matches!(blank.validate(), Err(DomainError::Validation(_))));

        let bad = NewRole {
            name: "auditor".to_string(),
            permissions: vec!["roles.list".to_string()],
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("roles.list"));
    }

    #[test]
    fn patch_leaves_unspecified_fields_untouched() {
        let mut r = role(vec![builtin::ROLES_LIST]);
        let patch = RoleUpdate {
            name: Some("reviewer".to_string()),
            permissions: None,
        }
        .validate()
        .unwrap();

        patch.apply(&mut r, Utc::now());
        assert_eq!(r.name, "reviewer");
        assert_eq!(r.permissions, vec![builtin::ROLES_LIST]);
    }

    #[test]
    fn patch_can_replace_permissions() {
        let mut r = role(vec![builtin::ROLES_LIST, builtin::ROLES_CREATE]);
        let patch = RoleUpdate {
            name: None,
            permissions: Some(vec!["roles:list".to_string()]),
        }
        .validate()
        .unwrap();

        patch.apply(&mut r, Utc::now());
        assert_eq!(r.name, "editor");
        assert!(r.grants(&builtin::ROLES_LIST));
        assert!(!r.grants(&builtin::ROLES_CREATE));
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(RoleUpdate::default().validate().unwrap().is_empty());
    }
}
