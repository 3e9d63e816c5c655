//! User identity model.
//!
//! A user references exactly one role. The credential is only ever held as a
//! digest and is never serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainError, Entity, RoleId, UserId};

/// Bootstrap account created alongside the superadmin role.
pub const SUPERADMIN_USERNAME: &str = "superadmin";
pub const SUPERADMIN_EMAIL: &str = "superadmin@email.com";
pub const SUPERADMIN_SECRET: &str = "superadmin";

pub const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt only looks at the first 72 bytes of a secret.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: RoleId,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Input for creating a user. `password` is plaintext until hashed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub role: RoleId,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
}

impl NewUser {
    /// Validate and normalize identity fields (trimmed username, lower-cased email).
    pub fn validate(mut self) -> Result<Self, DomainError> {
        self.username = validate_username(&self.username)?;
        self.email = normalize_email(&self.email)?;
        validate_password(&self.password)?;
        if self.role.get() <= 0 {
            return Err(DomainError::validation("role must reference an existing role id"));
        }
        self.first_name = blank_to_none(self.first_name);
        self.last_name = blank_to_none(self.last_name);
        self.phone_number = blank_to_none(self.phone_number);
        Ok(self)
    }
}

/// Partial update of a user. Fields left as `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Option<RoleId>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
}

/// A validated [`UserUpdate`]. A new secret is carried as a digest only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: Option<RoleId>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

impl UserUpdate {
    /// Validate the update.
    ///
    /// The returned patch never carries the plaintext secret; callers hash
    /// `self.password` and set `password_hash` themselves.
    pub fn validate(&self) -> Result<UserPatch, DomainError> {
        let username = self.username.as_deref().map(validate_username).transpose()?;
        let email = self.email.as_deref().map(normalize_email).transpose()?;
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        if let Some(role) = self.role {
            if role.get() <= 0 {
                return Err(DomainError::validation("role must reference an existing role id"));
            }
        }

        Ok(UserPatch {
            username,
            email,
            password_hash: None,
            first_name: blank_to_none(self.first_name.clone()),
            last_name: blank_to_none(self.last_name.clone()),
            phone_number: blank_to_none(self.phone_number.clone()),
            role: self.role,
            is_active: self.is_active,
            is_verified: self.is_verified,
        })
    }
}

impl UserPatch {
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = &self.username {
            user.username = v.clone();
        }
        if let Some(v) = &self.email {
            user.email = v.clone();
        }
        if let Some(v) = &self.password_hash {
            user.password_hash = v.clone();
        }
        if let Some(v) = &self.first_name {
            user.first_name = Some(v.clone());
        }
        if let Some(v) = &self.last_name {
            user.last_name = Some(v.clone());
        }
        if let Some(v) = &self.phone_number {
            user.phone_number = Some(v.clone());
        }
        if let Some(v) = self.role {
            user.role = v;
        }
        if let Some(v) = self.is_active {
            user.is_active = v;
        }
        if let Some(v) = self.is_verified {
            user.is_verified = v;
        }
        user.updated_at = now;
    }
}

/// Lower-case and trim an email, rejecting obviously malformed addresses.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(DomainError::validation("invalid email format")),
    }
}

fn validate_username(username: &str) -> Result<String, DomainError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username cannot be empty"));
    }
    Ok(username.to_string())
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(DomainError::validation(format!(
            "password cannot exceed {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
