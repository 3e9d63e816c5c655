//! Service wiring and the request flows behind the routes.
//!
//! Handlers stay thin: they parse input, call one method here, and shape the
//! JSON response.

use std::sync::Arc;

use chrono::Utc;

use gatehouse_auth::{
    NewRole, NewUser, PasswordHasher, Permission, Role, RoleUpdate, StoredPermission, TokenIssuer,
    User, UserPatch, UserUpdate, VerificationTokens,
};
use gatehouse_core::{PermissionId, RoleId, UserId};
use gatehouse_infra::{RbacStore, StoreError};

use super::errors::ApiError;

/// Secret hashed once at startup so unknown emails cost as much as wrong passwords.
const DUMMY_SECRET: &str = "gatehouse-timing-equalizer";

const INVALID_CREDENTIALS: &str = "invalid email or password";
const INVALID_VERIFICATION: &str = "invalid or expired verification token";

pub struct AppServices {
    store: Arc<dyn RbacStore>,
    tokens: Arc<dyn TokenIssuer>,
    verification: Arc<dyn VerificationTokens>,
    hasher: PasswordHasher,
    token_ttl_hours: u32,
    dummy_digest: String,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn RbacStore>,
        tokens: Arc<dyn TokenIssuer>,
        verification: Arc<dyn VerificationTokens>,
        hasher: PasswordHasher,
        token_ttl_hours: u32,
    ) -> Result<Self, ApiError> {
        let dummy_digest = hasher.hash(DUMMY_SECRET)?;
        Ok(Self {
            store,
            tokens,
            verification,
            hasher,
            token_ttl_hours,
            dummy_digest,
        })
    }

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Verify credentials and mint a token carrying the role's current permissions.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, User), ApiError> {
        let user = match self.store.get_user_by_email(email).await {
            Ok(user) => Some(user),
            Err(StoreError::NotFound(_) | StoreError::Validation(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let digest = user
            .as_ref()
            .map_or_else(|| self.dummy_digest.clone(), |u| u.password_hash.clone());
        let verified = self.verify(password, digest).await?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                tracing::debug!("login rejected: unknown email or wrong secret");
                return Err(ApiError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
            }
        };
        if !user.is_active {
            return Err(ApiError::Unauthenticated("account is not active".to_string()));
        }

        let token = self.issue_for(&user).await?;
        tracing::info!(user_id = %user.id, role_id = %user.role, "login succeeded");
        Ok((token, user))
    }

    /// Re-read the caller's user and role and mint a fresh token.
    ///
    /// The presented token stays valid until its own expiry.
    pub async fn refresh(&self, user_id: UserId) -> Result<String, ApiError> {
        let user = match self.store.get_user(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Err(ApiError::Unauthenticated("account no longer exists".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(ApiError::Unauthenticated("account is not active".to_string()));
        }
        self.issue_for(&user).await
    }

    async fn issue_for(&self, user: &User) -> Result<String, ApiError> {
        let role = match self.store.get_role(user.role).await {
            Ok(role) => role,
            Err(StoreError::NotFound(_)) => {
                return Err(ApiError::Unauthenticated("account role is no longer available".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self
            .tokens
            .issue(user.id, role.id, self.token_ttl_hours, role.permissions, Utc::now())?)
    }

    async fn verify(&self, password: &str, digest: String) -> Result<bool, ApiError> {
        let hasher = self.hasher;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| ApiError::Internal(format!("verify task failed: {e}")))
    }

    async fn hash(&self, password: &str) -> Result<String, ApiError> {
        let hasher = self.hasher;
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::Internal(format!("hash task failed: {e}")))?
            .map_err(ApiError::from)
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Self-service sign-up. The account starts inactive and unverified.
    pub async fn register(&self, input: NewUser) -> Result<User, ApiError> {
        let input = NewUser {
            is_active: false,
            is_verified: false,
            ..input
        }
        .validate()?;
        let digest = self.hash(&input.password).await?;
        let user = self.store.create_user(input, digest).await?;
        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Mint a verification token for delivery to the user's current email.
    pub async fn issue_verification(&self, id: UserId) -> Result<String, ApiError> {
        let user = self.store.get_user(id).await?;
        if user.is_verified {
            return Err(ApiError::Conflict("email is already verified".to_string()));
        }
        Ok(self.verification.issue_verification(user.id, &user.email, Utc::now())?)
    }

    /// Mark the token's user verified. Repeating a valid token is harmless.
    pub async fn verify_email(&self, token: &str) -> Result<User, ApiError> {
        let claims = self
            .verification
            .validate_verification(token, Utc::now())
            .map_err(|e| {
                tracing::debug!(reason = %e, "rejected verification token");
                ApiError::BadRequest(INVALID_VERIFICATION.to_string())
            })?;

        let user = match self.store.get_user(claims.user_id).await {
            Ok(user) if user.email == claims.email => user,
            Ok(_) | Err(StoreError::NotFound(_)) => {
                return Err(ApiError::BadRequest(INVALID_VERIFICATION.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if user.is_verified {
            return Ok(user);
        }

        let patch = UserPatch {
            is_verified: Some(true),
            ..Default::default()
        };
        let user = self.store.update_user(user.id, patch).await?;
        tracing::info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    // ── Permissions ─────────────────────────────────────────────────────────

    pub async fn create_permissions(&self, names: Vec<String>) -> Result<Vec<StoredPermission>, ApiError> {
        if names.is_empty() {
            return Err(ApiError::Validation("at least one permission is required".to_string()));
        }
        let permissions = names
            .into_iter()
            .map(|n| Permission::parse(n.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.store.create_many(permissions).await?)
    }

    pub async fn list_permissions(&self, group: Option<&str>) -> Result<Vec<StoredPermission>, ApiError> {
        Ok(self.store.list_permissions_in_group(group).await?)
    }

    pub async fn delete_permission(&self, id: PermissionId) -> Result<(), ApiError> {
        Ok(self.store.soft_delete_permission(id).await?)
    }

    // ── Roles ───────────────────────────────────────────────────────────────

    pub async fn create_role(&self, input: NewRole) -> Result<Role, ApiError> {
        let (name, permissions) = input.validate()?;
        Ok(self.store.create_role(name, permissions).await?)
    }

    pub async fn get_role(&self, id: RoleId) -> Result<Role, ApiError> {
        Ok(self.store.get_role(id).await?)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ApiError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> Result<Role, ApiError> {
        let patch = update.validate()?;
        if patch.is_empty() {
            return Err(ApiError::Validation("nothing to update".to_string()));
        }
        Ok(self.store.update_role(id, patch).await?)
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<(), ApiError> {
        Ok(self.store.soft_delete_role(id).await?)
    }

    // ── Users ───────────────────────────────────────────────────────────────

    pub async fn create_user(&self, input: NewUser) -> Result<User, ApiError> {
        let input = input.validate()?;
        let digest = self.hash(&input.password).await?;
        Ok(self.store.create_user(input, digest).await?)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, ApiError> {
        Ok(self.store.get_user(id).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User, ApiError> {
        let mut patch = update.validate()?;
        if let Some(password) = &update.password {
            patch.password_hash = Some(self.hash(password).await?);
        }
        Ok(self.store.update_user(id, patch).await?)
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), ApiError> {
        Ok(self.store.soft_delete_user(id).await?)
    }
}
