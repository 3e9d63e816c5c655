use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use gatehouse_auth::{
    NewUser, Permission, Role, RolePatch, StoredPermission, User, UserPatch, user::normalize_email,
};
use gatehouse_core::{Entity, PermissionId, RoleId, UserId};

use super::r#trait::{PermissionStore, RoleStore, StoreError, UserStore};

#[derive(Debug, Default, Clone)]
struct Tables {
    permissions: Vec<StoredPermission>,
    roles: Vec<Role>,
    users: Vec<User>,
    last_permission_id: i64,
    last_role_id: i64,
    last_user_id: i64,
}

impl Tables {
    fn live_permission_named(&self, name: &Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| p.is_live() && &p.name == name)
    }

    fn live_role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id && r.is_live())
    }

    fn live_role_named(&self, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .iter()
            .any(|r| r.is_live() && r.name == name && Some(r.id) != except)
    }

    fn check_user_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<UserId>,
    ) -> Result<(), StoreError> {
        for u in self.users.iter().filter(|u| u.is_live() && Some(u.id) != except) {
            if username == Some(u.username.as_str()) {
                return Err(StoreError::Conflict(format!("username '{}' is taken", u.username)));
            }
            if email == Some(u.email.as_str()) {
                return Err(StoreError::Conflict(format!("email '{}' is taken", u.email)));
            }
        }
        Ok(())
    }

    fn insert_permission(&mut self, name: Permission) -> Result<StoredPermission, StoreError> {
        if self.live_permission_named(&name) {
            return Err(StoreError::Conflict(format!("permission '{name}' already exists")));
        }
        self.last_permission_id += 1;
        let now = Utc::now();
        let row = StoredPermission {
            id: PermissionId::new(self.last_permission_id),
            name,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.permissions.push(row.clone());
        Ok(row)
    }
}

/// In-memory RBAC store.
///
/// Intended for tests/dev. A single lock guards all tables, so a batch write
/// is invisible to readers until it has been applied in full.
#[derive(Debug, Default)]
pub struct InMemoryRbacStore {
    tables: RwLock<Tables>,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl PermissionStore for InMemoryRbacStore {
    async fn create_many(&self, names: Vec<Permission>) -> Result<Vec<StoredPermission>, StoreError> {
        let mut tables = self.write()?;

        // Stage every insert on a copy; only a fully successful batch replaces the tables.
        let mut staged = tables.clone();
        let mut created = Vec::with_capacity(names.len());
        for name in names {
            match staged.insert_permission(name.clone()) {
                Ok(row) => created.push(row),
                Err(cause) => {
                    tracing::debug!(permission = %name, "batch create failed; discarding staged rows");
                    return Err(StoreError::Transaction(format!(
                        "insert of '{name}' failed: {cause}"
                    )));
                }
            }
        }

        *tables = staged;
        Ok(created)
    }

    async fn list_permissions(&self) -> Result<Vec<StoredPermission>, StoreError> {
        let tables = self.read()?;
        Ok(tables.permissions.iter().filter(|p| p.is_live()).cloned().collect())
    }

    async fn soft_delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let row = tables
            .permissions
            .iter_mut()
            .find(|p| p.id == id && p.is_live())
            .ok_or_else(|| StoreError::not_found(format!("permission {id}")))?;
        let now = Utc::now();
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryRbacStore {
    async fn create_role(&self, name: String, permissions: Vec<Permission>) -> Result<Role, StoreError> {
        let mut tables = self.write()?;
        if tables.live_role_named(&name, None) {
            return Err(StoreError::Conflict(format!("role '{name}' already exists")));
        }

        tables.last_role_id += 1;
        let now = Utc::now();
        let role = Role {
            id: RoleId::new(tables.last_role_id),
            name,
            permissions,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> Result<Role, StoreError> {
        let tables = self.read()?;
        tables
            .live_role(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("role {id}")))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .roles
            .iter()
            .find(|r| r.is_live() && r.name == name)
            .cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables.roles.iter().filter(|r| r.is_live()).cloned().collect())
    }

    async fn update_role(&self, id: RoleId, patch: RolePatch) -> Result<Role, StoreError> {
        let mut tables = self.write()?;
        if let Some(name) = &patch.name {
            if tables.live_role_named(name, Some(id)) {
                return Err(StoreError::Conflict(format!("role '{name}' already exists")));
            }
        }

        let role = tables
            .roles
            .iter_mut()
            .find(|r| r.id == id && r.is_live())
            .ok_or_else(|| StoreError::not_found(format!("role {id}")))?;
        patch.apply(role, Utc::now());
        Ok(role.clone())
    }

    async fn soft_delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let role = tables
            .roles
            .iter_mut()
            .find(|r| r.id == id && r.is_live())
            .ok_or_else(|| StoreError::not_found(format!("role {id}")))?;
        let now = Utc::now();
        role.deleted_at = Some(now);
        role.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryRbacStore {
    async fn create_user(&self, input: NewUser, password_hash: String) -> Result<User, StoreError> {
        let input = input.validate()?;
        let mut tables = self.write()?;

        if tables.live_role(input.role).is_none() {
            return Err(StoreError::not_found(format!("role {}", input.role)));
        }
        tables.check_user_unique(Some(&input.username), Some(&input.email), None)?;

        tables.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.last_user_id),
            username: input.username,
            email: input.email,
            password_hash,
            first_name: input.first_name,
            last_name: input.last_name,
            phone_number: input.phone_number,
            role: input.role,
            is_active: input.is_active,
            is_verified: input.is_verified,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        let tables = self.read()?;
        tables
            .users
            .iter()
            .find(|u| u.id == id && u.is_live())
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = normalize_email(email)?;
        let tables = self.read()?;
        tables
            .users
            .iter()
            .find(|u| u.email == email && u.is_live())
            .cloned()
            .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.read()?;
        Ok(tables.users.iter().filter(|u| u.is_live()).cloned().collect())
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError> {
        let mut tables = self.write()?;
        if let Some(role) = patch.role {
            if tables.live_role(role).is_none() {
                return Err(StoreError::not_found(format!("role {role}")));
            }
        }
        tables.check_user_unique(patch.username.as_deref(), patch.email.as_deref(), Some(id))?;

        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id && u.is_live())
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))?;
        patch.apply(user, Utc::now());
        Ok(user.clone())
    }

    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id && u.is_live())
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))?;
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }
}
