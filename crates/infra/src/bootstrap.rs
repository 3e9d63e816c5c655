//! First-start seeding of the permission universe, the superadmin role and the
//! superadmin user.
//!
//! Every step checks what is already there before writing, and a duplicate
//! reported by the store (a concurrent seeder won the race) is logged and
//! tolerated. Running the seeder any number of times leaves exactly one live
//! superadmin role and one live superadmin user.

use anyhow::Context;

use gatehouse_auth::user::{SUPERADMIN_EMAIL, SUPERADMIN_SECRET, SUPERADMIN_USERNAME};
use gatehouse_auth::{NewUser, PasswordHasher, Permission, Role, RolePatch, SUPERADMIN_ROLE, builtin};
use gatehouse_core::{RoleId, UserId};

use crate::store::{RbacStore, StoreError};

/// What a bootstrap run changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions_created: usize,
    pub role_id: RoleId,
    pub role_created: bool,
    pub user_id: Option<UserId>,
    pub user_created: bool,
}

pub async fn bootstrap(store: &dyn RbacStore, hasher: &PasswordHasher) -> anyhow::Result<BootstrapReport> {
    let permissions_created = seed_permissions(store).await?;
    let (role, role_created) = seed_role(store).await?;
    let (user_id, user_created) = seed_user(store, hasher, role.id).await?;

    let report = BootstrapReport {
        permissions_created,
        role_id: role.id,
        role_created,
        user_id,
        user_created,
    };
    tracing::info!(
        permissions_created,
        role_id = %role.id,
        role_created,
        user_created,
        "bootstrap complete"
    );
    Ok(report)
}

async fn seed_permissions(store: &dyn RbacStore) -> anyhow::Result<usize> {
    let existing = store
        .list_permissions()
        .await
        .context("listing permissions for bootstrap")?;
    let missing: Vec<Permission> = builtin::universe()
        .into_iter()
        .filter(|p| !existing.iter().any(|e| &e.name == p))
        .collect();

    if missing.is_empty() {
        tracing::debug!("permission universe already seeded");
        return Ok(0);
    }

    match store.create_many(missing).await {
        Ok(created) => {
            tracing::info!(count = created.len(), "seeded permissions");
            Ok(created.len())
        }
        Err(StoreError::Transaction(cause) | StoreError::Conflict(cause)) => {
            tracing::warn!(%cause, "permission seed raced with another writer; keeping existing rows");
            Ok(0)
        }
        Err(e) => Err(e).context("seeding permission universe"),
    }
}

async fn seed_role(store: &dyn RbacStore) -> anyhow::Result<(Role, bool)> {
    if let Some(role) = store
        .find_role_by_name(SUPERADMIN_ROLE)
        .await
        .context("looking up superadmin role")?
    {
        return Ok((ensure_full_universe(store, role).await?, false));
    }

    match store.create_role(SUPERADMIN_ROLE.to_string(), builtin::universe()).await {
        Ok(role) => {
            tracing::info!(role_id = %role.id, "created superadmin role");
            Ok((role, true))
        }
        Err(StoreError::Conflict(cause)) => {
            tracing::warn!(%cause, "superadmin role already exists; reusing it");
            let role = store
                .find_role_by_name(SUPERADMIN_ROLE)
                .await
                .context("re-reading superadmin role")?
                .context("superadmin role vanished after a conflicting create")?;
            Ok((role, false))
        }
        Err(e) => Err(e).context("creating superadmin role"),
    }
}

/// Grant any universe entries the stored superadmin role lacks.
async fn ensure_full_universe(store: &dyn RbacStore, role: Role) -> anyhow::Result<Role> {
    let missing: Vec<Permission> = builtin::universe()
        .into_iter()
        .filter(|p| !role.grants(p))
        .collect();
    if missing.is_empty() {
        return Ok(role);
    }

    tracing::info!(role_id = %role.id, missing = missing.len(), "restoring superadmin permissions");
    let mut permissions = role.permissions.clone();
    permissions.extend(missing);
    let patch = RolePatch {
        name: None,
        permissions: Some(permissions),
    };
    store
        .update_role(role.id, patch)
        .await
        .context("updating superadmin role")
}

async fn seed_user(
    store: &dyn RbacStore,
    hasher: &PasswordHasher,
    role: RoleId,
) -> anyhow::Result<(Option<UserId>, bool)> {
    match store.get_user_by_email(SUPERADMIN_EMAIL).await {
        Ok(user) => return Ok((Some(user.id), false)),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e).context("looking up superadmin user"),
    }

    let digest = hasher
        .hash(SUPERADMIN_SECRET)
        .context("hashing superadmin secret")?;
    let input = NewUser {
        username: SUPERADMIN_USERNAME.to_string(),
        email: SUPERADMIN_EMAIL.to_string(),
        password: SUPERADMIN_SECRET.to_string(),
        first_name: None,
        last_name: None,
        phone_number: None,
        role,
        is_active: true,
        is_verified: true,
    };

    match store.create_user(input, digest).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "created superadmin user");
            Ok((Some(user.id), true))
        }
        Err(StoreError::Conflict(cause)) => {
            // The username may be held by an account with a different email.
            tracing::warn!(%cause, "superadmin user already exists; leaving it untouched");
            Ok((None, false))
        }
        Err(e) => Err(e).context("creating superadmin user"),
    }
}
