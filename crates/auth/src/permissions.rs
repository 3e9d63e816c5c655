use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainError, Entity, PermissionId};

/// Separator between the namespace and the action of a permission identifier.
///
/// Only `:` is recognised; a `.` is an ordinary character inside a segment.
pub const DELIMITER: char = ':';

/// Permission identifier.
///
/// Permissions are opaque strings of the form `"<namespace>:<action>"`
/// (e.g. `"roles:list"`). Authorization is exact string membership; there is
/// no wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build a permission from user input, rejecting malformed identifiers.
    pub fn parse(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment of the identifier (everything before the delimiter).
    pub fn namespace(&self) -> &str {
        namespace_of(self.as_str())
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.namespace() == group
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Permission {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Permission {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Namespace segment of a raw identifier; the whole string if it has no delimiter.
pub fn namespace_of(identifier: &str) -> &str {
    identifier
        .split(DELIMITER)
        .next()
        .unwrap_or(identifier)
}

/// Check the `"<namespace>:<action>"` shape.
pub fn validate_identifier(identifier: &str) -> Result<(), DomainError> {
    if identifier.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!(
            "permission '{identifier}' must not contain whitespace"
        )));
    }

    let mut parts = identifier.split(DELIMITER);
    let namespace = parts.next().unwrap_or_default();
    let action = parts.next();

    match (namespace.is_empty(), action, parts.next()) {
        (false, Some(action), None) if !action.is_empty() => Ok(()),
        _ => Err(DomainError::validation(format!(
            "permission '{identifier}' must have the form '<namespace>{DELIMITER}<action>'"
        ))),
    }
}

/// Keep only the items whose permission namespace equals `group`.
///
/// A `None` (or blank) group returns the input untouched. Order is preserved.
pub fn filter_by_group<T, F>(items: Vec<T>, group: Option<&str>, name: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let Some(group) = group.map(str::trim).filter(|g| !g.is_empty()) else {
        return items;
    };

    items
        .into_iter()
        .filter(|item| namespace_of(name(item)) == group)
        .collect()
}

/// A persisted permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPermission {
    pub id: PermissionId,
    pub name: Permission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for StoredPermission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Permissions known to the system out of the box.
pub mod builtin {
    use super::Permission;

    pub const USERS_READ: Permission = Permission::from_static("users:read");
    pub const USERS_CREATE: Permission = Permission::from_static("users:create");
    pub const USERS_UPDATE: Permission = Permission::from_static("users:update");
    pub const USERS_DELETE: Permission = Permission::from_static("users:delete");

    pub const ROLES_LIST: Permission = Permission::from_static("roles:list");
    pub const ROLES_READ: Permission = Permission::from_static("roles:read");
    pub const ROLES_CREATE: Permission = Permission::from_static("roles:create");
    pub const ROLES_UPDATE: Permission = Permission::from_static("roles:update");
    pub const ROLES_DELETE: Permission = Permission::from_static("roles:delete");

    pub const PERMISSIONS_CREATE: Permission = Permission::from_static("permissions:create");
    pub const PERMISSIONS_DELETE: Permission = Permission::from_static("permissions:delete");
    pub const PERMISSIONS_LIST: Permission = Permission::from_static("permissions:list");

    /// The full permission universe seeded at bootstrap, in seed order.
    pub const UNIVERSE: [Permission; 12] = [
        USERS_READ,
        USERS_CREATE,
        USERS_UPDATE,
        USERS_DELETE,
        ROLES_LIST,
        ROLES_READ,
        ROLES_CREATE,
        ROLES_UPDATE,
        ROLES_DELETE,
        PERMISSIONS_CREATE,
        PERMISSIONS_DELETE,
        PERMISSIONS_LIST,
    ];

    pub fn universe() -> Vec<Permission> {
        UNIVERSE.to_vec()
    }
}
