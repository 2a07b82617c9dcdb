//! Per-request unit of work over a PostgreSQL transaction.
//!
//! Every logical request runs inside exactly one [`UnitOfWork`]: begin a
//! transaction, execute reads/writes through [`UnitOfWork::executor`],
//! then [`UnitOfWork::commit`] or [`UnitOfWork::rollback`]. Dropping an
//! uncommitted unit rolls the transaction back, so an aborted request can
//! never leave a partial commit behind. Units are never shared between
//! concurrent requests.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{Acquire, PgConnection, PgPool, Postgres, Transaction};

use keygate_core::error::{AppError, ErrorKind};
use keygate_core::result::AppResult;

/// Tables and timestamp columns the generic purge helper may touch.
///
/// Maintenance SQL interpolates table names into statement text; anything
/// not on this list is rejected before it reaches the database.
const PURGEABLE: &[(&str, &str)] = &[
    ("audit_log", "created_at"),
    ("password_reset_tokens", "expires_at"),
];

/// A single atomic unit of work bound to one logical request.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish()
    }
}

impl UnitOfWork {
    /// Acquire a connection from the pool and begin a transaction.
    pub async fn begin(pool: &PgPool) -> AppResult<Self> {
        let tx = pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Self { tx })
    }

    /// The connection to run repository calls against.
    pub fn executor(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Commit the transaction, releasing the connection back to the pool.
    pub async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })
    }

    /// Roll the transaction back, releasing the connection back to the pool.
    pub async fn rollback(self) -> AppResult<()> {
        self.tx.rollback().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to roll back transaction", e)
        })
    }

    /// Run `f` inside a nested savepoint.
    ///
    /// On `Ok` the savepoint is released into the outer transaction; on `Err`
    /// only the work inside `f` is rolled back and the outer transaction
    /// stays usable. Used where a multi-step mutation must not leave a
    /// half-applied state (e.g. password-reset completion).
    pub async fn savepoint<T, F>(&mut self, f: F) -> AppResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, AppResult<T>>,
    {
        let mut nested = self.tx.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create savepoint", e)
        })?;

        match f(&mut nested).await {
            Ok(value) => {
                nested.commit().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to release savepoint", e)
                })?;
                Ok(value)
            }
            Err(err) => {
                // Partial rollback only; the outer transaction survives.
                let _ = nested.rollback().await;
                Err(err)
            }
        }
    }
}

/// Delete rows whose timestamp column is older than `cutoff` from one of the
/// allow-listed maintenance tables. Returns the number of deleted rows.
pub async fn purge_older_than(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    cutoff: DateTime<Utc>,
) -> AppResult<u64> {
    validate_purge_target(table, column)?;

    let sql = format!("DELETE FROM {table} WHERE {column} < $1");
    let result = sqlx::query(&sql)
        .bind(cutoff)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, format!("Failed to purge {table}"), e)
        })?;

    Ok(result.rows_affected())
}

/// Reject purge targets that are not on the fixed allow-list.
fn validate_purge_target(table: &str, column: &str) -> AppResult<()> {
    if PURGEABLE.contains(&(table, column)) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Table '{table}' with column '{column}' is not a purgeable target"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_targets_pass() {
        assert!(validate_purge_target("audit_log", "created_at").is_ok());
        assert!(validate_purge_target("password_reset_tokens", "expires_at").is_ok());
    }

    #[test]
    fn unknown_table_is_rejected() {
        assert!(validate_purge_target("credentials", "created_at").is_err());
        assert!(validate_purge_target("audit_log; DROP TABLE sessions", "created_at").is_err());
    }

    #[test]
    fn mismatched_column_is_rejected() {
        assert!(validate_purge_target("audit_log", "expires_at").is_err());
    }
}
