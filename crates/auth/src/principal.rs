use serde::{Deserialize, Serialize};

use gatehouse_core::{RoleId, UserId};

use crate::{Permission, SessionClaims};

/// Identity of an authenticated caller, as carried by a verified token.
///
/// Built directly from verified claims; the permission list is the token's
/// snapshot and is never re-read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, role_id: RoleId, permissions: Vec<Permission>) -> Self {
        Self {
            user_id,
            role_id,
            permissions,
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl From<SessionClaims> for Principal {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.user_id,
            role_id: claims.role,
            permissions: claims.permissions,
        }
    }
}
