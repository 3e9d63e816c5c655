use gatehouse_auth::{Permission, Principal};
use gatehouse_core::{RoleId, UserId};

/// Principal context for a request (authenticated identity + permission snapshot).
///
/// Inserted by the auth middleware; immutable for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role_id(&self) -> RoleId {
        self.principal.role_id
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.principal.permissions
    }
}
