//! Credential repository implementation.

use sqlx::PgConnection;
use uuid::Uuid;

use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;
use keygate_entity::credential::{Credential, NewCredential};

/// Repository for credential rows.
#[derive(Debug, Clone, Default)]
pub struct CredentialRepository;

impl CredentialRepository {
    /// Create a new credential repository.
    pub fn new() -> Self {
        Self
    }

    /// Find a credential by email.
    pub async fn find_by_email(
        &self,
        conn: &mut PgConnection,
        email: &str,
    ) -> AppResult<Option<Credential>> {
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE email = $1")
            .bind(email)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find credential", e)
            })
    }

    /// Find a credential by ID.
    pub async fn find_by_id(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Credential>> {
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find credential", e)
            })
    }

    /// Insert a new credential.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        data: &NewCredential,
    ) -> AppResult<Credential> {
        sqlx::query_as::<_, Credential>(
            "INSERT INTO credentials (id, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(&data.role)
        .fetch_one(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to insert credential", e)
        })
    }

    /// Replace the stored password hash.
    pub async fn update_password_hash(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        password_hash: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update password hash", e)
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-disable (or re-enable) a credential. Never hard-deletes.
    pub async fn set_disabled(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        disabled: bool,
    ) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE credentials SET disabled = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(disabled)
                .execute(conn)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to update credential", e)
                })?;

        Ok(result.rows_affected() > 0)
    }
}
