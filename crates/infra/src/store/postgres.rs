//! Postgres-backed RBAC store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (check constraint violation) | `23514` | `Validation` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//!
//! Inside [`PermissionStore::create_many`] any insert failure is surfaced as
//! `Transaction` after the rollback has completed.
//!
//! ## Timeouts and cancellation
//!
//! Every call runs under `tokio::time::timeout`. When the deadline passes, or
//! the calling request is dropped, the in-flight future is dropped with it; a
//! `sqlx::Transaction` dropped before `commit` is rolled back by the driver.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use gatehouse_auth::{
    NewUser, Permission, Role, RolePatch, StoredPermission, User, UserPatch, user::normalize_email,
};
use gatehouse_core::{PermissionId, RoleId, UserId};

use super::r#trait::{PermissionStore, RoleStore, StoreError, UserStore};

/// Schema the adapter needs. Every statement is idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS permissions (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    deleted_at  TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS permissions_live_name
    ON permissions (name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS roles (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    permissions TEXT[] NOT NULL DEFAULT '{}',
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    deleted_at  TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS roles_live_name
    ON roles (name) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS users (
    id            BIGSERIAL PRIMARY KEY,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    first_name    TEXT,
    last_name     TEXT,
    phone_number  TEXT,
    role_id       BIGINT NOT NULL REFERENCES roles (id),
    is_active     BOOLEAN NOT NULL DEFAULT FALSE,
    is_verified   BOOLEAN NOT NULL DEFAULT FALSE,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL,
    deleted_at    TIMESTAMPTZ
);
CREATE UNIQUE INDEX IF NOT EXISTS users_live_email
    ON users (email) WHERE deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS users_live_username
    ON users (username) WHERE deleted_at IS NULL;
"#;

const PERMISSION_COLUMNS: &str = "id, name, created_at, updated_at, deleted_at";
const ROLE_COLUMNS: &str = "id, name, permissions, created_at, updated_at, deleted_at";
const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     phone_number, role_id, is_active, is_verified, created_at, updated_at, deleted_at";

/// Postgres-backed RBAC store.
///
/// Uses the SQLx connection pool, which is thread-safe; the struct itself is
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresRbacStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresRbacStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Connect, then make sure the schema exists.
    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool, timeout);
        store.migrate().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        self.timed("migrate", async {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
            Ok(())
        })
        .await
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "{operation} exceeded {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Holds the role row until the surrounding transaction ends, so a concurrent
/// soft delete waits for the user write.
const ROLE_EXISTS_SQL: &str = "SELECT 1 FROM roles WHERE id = $1 AND deleted_at IS NULL FOR SHARE";

async fn role_exists(tx: &mut Transaction<'_, Postgres>, id: RoleId) -> Result<bool, StoreError> {
    let row = sqlx::query(ROLE_EXISTS_SQL)
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("role_exists", e))?;
    Ok(row.is_some())
}

#[async_trait]
impl PermissionStore for PostgresRbacStore {
    #[instrument(skip(self, names), fields(batch_size = names.len()), err)]
    async fn create_many(&self, names: Vec<Permission>) -> Result<Vec<StoredPermission>, StoreError> {
        self.timed("create_many", async {
            let mut tx = self.begin().await?;
            let now = Utc::now();
            let mut created = Vec::with_capacity(names.len());

            for name in names {
                let inserted = sqlx::query(&format!(
                    "INSERT INTO permissions (name, created_at, updated_at) \
                     VALUES ($1, $2, $2) RETURNING {PERMISSION_COLUMNS}"
                ))
                .bind(name.as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await;

                let row = match inserted {
                    Ok(row) => row,
                    Err(e) => {
                        let cause = map_sqlx_error("insert_permission", e);
                        tx.rollback()
                            .await
                            .map_err(|e| map_sqlx_error("rollback", e))?;
                        return Err(StoreError::Transaction(format!(
                            "insert of '{name}' failed: {cause}"
                        )));
                    }
                };
                created.push(permission_from_row(&row)?);
            }

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(created)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self) -> Result<Vec<StoredPermission>, StoreError> {
        self.timed("list_permissions", async {
            let rows = sqlx::query(&format!(
                "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE deleted_at IS NULL ORDER BY id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
            rows.iter().map(permission_from_row).collect()
        })
        .await
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn soft_delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        self.timed("soft_delete_permission", async {
            let result = sqlx::query(
                "UPDATE permissions SET deleted_at = $2, updated_at = $2 \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id.get())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_permission", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("permission {id}")));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RoleStore for PostgresRbacStore {
    #[instrument(skip(self, permissions), fields(permission_count = permissions.len()), err)]
    async fn create_role(&self, name: String, permissions: Vec<Permission>) -> Result<Role, StoreError> {
        self.timed("create_role", async {
            let now = Utc::now();
            let row = sqlx::query(&format!(
                "INSERT INTO roles (name, permissions, created_at, updated_at) \
                 VALUES ($1, $2, $3, $3) RETURNING {ROLE_COLUMNS}"
            ))
            .bind(&name)
            .bind(permission_strings(&permissions))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_role", e))?;
            role_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn get_role(&self, id: RoleId) -> Result<Role, StoreError> {
        self.timed("get_role", async {
            let row = sqlx::query(&format!(
                "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND deleted_at IS NULL"
            ))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?
            .ok_or_else(|| StoreError::not_found(format!("role {id}")))?;
            role_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        self.timed("find_role_by_name", async {
            let row = sqlx::query(&format!(
                "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1 AND deleted_at IS NULL"
            ))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
            row.as_ref().map(role_from_row).transpose()
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.timed("list_roles", async {
            let rows = sqlx::query(&format!(
                "SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL ORDER BY id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
            rows.iter().map(role_from_row).collect()
        })
        .await
    }

    #[instrument(skip(self, patch), fields(role_id = %id), err)]
    async fn update_role(&self, id: RoleId, patch: RolePatch) -> Result<Role, StoreError> {
        self.timed("update_role", async {
            let permissions = patch.permissions.as_deref().map(permission_strings);
            let row = sqlx::query(&format!(
                "UPDATE roles SET \
                     name = COALESCE($2, name), \
                     permissions = COALESCE($3::text[], permissions), \
                     updated_at = $4 \
                 WHERE id = $1 AND deleted_at IS NULL \
                 RETURNING {ROLE_COLUMNS}"
            ))
            .bind(id.get())
            .bind(patch.name.as_deref())
            .bind(permissions)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_role", e))?
            .ok_or_else(|| StoreError::not_found(format!("role {id}")))?;
            role_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn soft_delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.timed("soft_delete_role", async {
            let result = sqlx::query(
                "UPDATE roles SET deleted_at = $2, updated_at = $2 \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id.get())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_role", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("role {id}")));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for PostgresRbacStore {
    #[instrument(skip(self, input, password_hash), fields(role_id = %input.role), err)]
    async fn create_user(&self, input: NewUser, password_hash: String) -> Result<User, StoreError> {
        let input = input.validate()?;
        self.timed("create_user", async {
            let mut tx = self.begin().await?;
            if !role_exists(&mut tx, input.role).await? {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::not_found(format!("role {}", input.role)));
            }

            let now = Utc::now();
            let row = sqlx::query(&format!(
                "INSERT INTO users (username, email, password_hash, first_name, last_name, \
                     phone_number, role_id, is_active, is_verified, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(&input.username)
            .bind(&input.email)
            .bind(&password_hash)
            .bind(input.first_name.as_deref())
            .bind(input.last_name.as_deref())
            .bind(input.phone_number.as_deref())
            .bind(input.role.get())
            .bind(input.is_active)
            .bind(input.is_verified)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_user", e))?;
            let user = user_from_row(&row)?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(user)
        })
        .await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.timed("get_user", async {
            let row = sqlx::query(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
            ))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))?;
            user_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self, email), err)]
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = normalize_email(email)?;
        self.timed("get_user_by_email", async {
            let row = sqlx::query(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
            ))
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_email", e))?
            .ok_or_else(|| StoreError::not_found("user"))?;
            user_from_row(&row)
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.timed("list_users", async {
            let rows = sqlx::query(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
            rows.iter().map(user_from_row).collect()
        })
        .await
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError> {
        self.timed("update_user", async {
            let mut tx = self.begin().await?;
            if let Some(role) = patch.role {
                if !role_exists(&mut tx, role).await? {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(StoreError::not_found(format!("role {role}")));
                }
            }

            let row = sqlx::query(&format!(
                "UPDATE users SET \
                     username = COALESCE($2, username), \
                     email = COALESCE($3, email), \
                     password_hash = COALESCE($4, password_hash), \
                     first_name = COALESCE($5, first_name), \
                     last_name = COALESCE($6, last_name), \
                     phone_number = COALESCE($7, phone_number), \
                     role_id = COALESCE($8, role_id), \
                     is_active = COALESCE($9, is_active), \
                     is_verified = COALESCE($10, is_verified), \
                     updated_at = $11 \
                 WHERE id = $1 AND deleted_at IS NULL \
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(id.get())
            .bind(patch.username.as_deref())
            .bind(patch.email.as_deref())
            .bind(patch.password_hash.as_deref())
            .bind(patch.first_name.as_deref())
            .bind(patch.last_name.as_deref())
            .bind(patch.phone_number.as_deref())
            .bind(patch.role.map(|r| r.get()))
            .bind(patch.is_active)
            .bind(patch.is_verified)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?
            .ok_or_else(|| StoreError::not_found(format!("user {id}")))?;
            let user = user_from_row(&row)?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(user)
        })
        .await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError> {
        self.timed("soft_delete_user", async {
            let result = sqlx::query(
                "UPDATE users SET deleted_at = $2, updated_at = $2 \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id.get())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("soft_delete_user", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("user {id}")));
            }
            Ok(())
        })
        .await
    }
}

fn permission_strings(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::backend(format!("failed to read column {name}: {e}")))
}

fn permission_from_row(row: &PgRow) -> Result<StoredPermission, StoreError> {
    let name: String = column(row, "name")?;
    Ok(StoredPermission {
        id: PermissionId::new(column(row, "id")?),
        name: Permission::new(name),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column::<Option<DateTime<Utc>>>(row, "deleted_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let permissions: Vec<String> = column(row, "permissions")?;
    Ok(Role {
        id: RoleId::new(column(row, "id")?),
        name: column(row, "name")?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column::<Option<DateTime<Utc>>>(row, "deleted_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::new(column(row, "id")?),
        username: column(row, "username")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        phone_number: column(row, "phone_number")?,
        role: RoleId::new(column(row, "role_id")?),
        is_active: column(row, "is_active")?,
        is_verified: column(row, "is_verified")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column::<Option<DateTime<Utc>>>(row, "deleted_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            tracing::warn!(
                operation,
                code = code.as_deref().unwrap_or("none"),
                cause = %db_err.message(),
                "database error"
            );
            classify_database_error(operation, code.as_deref())
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("no connection available for {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Map a SQLSTATE to a store error whose text is safe to show a client.
///
/// The database's own message is logged by the caller and never carried here.
fn classify_database_error(operation: &str, code: Option<&str>) -> StoreError {
    match code {
        Some("23505") => StoreError::Conflict(
            match operation {
                "insert_permission" => "permission name already exists",
                "create_role" | "update_role" => "role name already exists",
                "create_user" | "update_user" => "username or email already in use",
                _ => "record already exists",
            }
            .to_string(),
        ),
        Some("23503") => StoreError::NotFound(
            match operation {
                "create_user" | "update_user" => "role",
                _ => "referenced record",
            }
            .to_string(),
        ),
        Some("23514") => StoreError::Validation(format!("{operation} rejected by a store constraint")),
        _ => StoreError::Backend(format!("database error in {operation}")),
    }
}
