use async_trait::async_trait;
use thiserror::Error;

use gatehouse_auth::{
    NewUser, Permission, Role, RolePatch, StoredPermission, User, UserPatch, filter_by_group,
};
use gatehouse_core::{DomainError, PermissionId, RoleId, UserId};

/// Store operation error.
///
/// These are **infrastructure errors** as seen by callers of the store traits.
/// Backend causes are carried as strings so they can be logged; the API layer
/// never forwards them to clients verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A multi-row write failed part-way and was rolled back as a whole.
    #[error("transaction rolled back: {0}")]
    Transaction(String),

    #[error("store call timed out: {0}")]
    Timeout(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

/// Permission rows.
///
/// Uniqueness of names holds across live rows only; a soft-deleted name may be
/// created again.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Create every permission or none of them.
    ///
    /// Implementations run the inserts inside one transaction and roll it back
    /// wholesale when any insert fails. Readers never observe a partial batch.
    async fn create_many(&self, names: Vec<Permission>) -> Result<Vec<StoredPermission>, StoreError>;

    /// Live permissions in store order.
    async fn list_permissions(&self) -> Result<Vec<StoredPermission>, StoreError>;

    async fn soft_delete_permission(&self, id: PermissionId) -> Result<(), StoreError>;

    /// Live permissions whose namespace equals `group` (all of them when `None`).
    ///
    /// Filtering happens over the listed rows, not in the store query.
    async fn list_permissions_in_group(
        &self,
        group: Option<&str>,
    ) -> Result<Vec<StoredPermission>, StoreError> {
        let all = self.list_permissions().await?;
        Ok(filter_by_group(all, group, |p| p.name.as_str()))
    }
}

/// Role rows. Names are unique across live roles.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create_role(&self, name: String, permissions: Vec<Permission>) -> Result<Role, StoreError>;

    async fn get_role(&self, id: RoleId) -> Result<Role, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Partial update; fields absent from the patch are left unchanged.
    async fn update_role(&self, id: RoleId, patch: RolePatch) -> Result<Role, StoreError>;

    async fn soft_delete_role(&self, id: RoleId) -> Result<(), StoreError>;
}

/// User rows. Username and email are unique across live users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a validated user. `password_hash` is the digest of `input.password`;
    /// the plaintext is never stored.
    async fn create_user(&self, input: NewUser, password_hash: String) -> Result<User, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<User, StoreError>;

    /// Look up a live user by (normalized) email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError>;

    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError>;
}

/// Everything the RBAC core persists, behind one handle.
pub trait RbacStore: PermissionStore + RoleStore + UserStore {}

impl<T> RbacStore for T where T: PermissionStore + RoleStore + UserStore + ?Sized {}
