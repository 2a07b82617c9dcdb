//! Read-through verification cache with in-flight request deduplication.
//!
//! The cache sits in front of the session ledger on the authenticated
//! request path. Entries are advisory with a TTL strictly shorter than the
//! refresh-token lifetime; the ledger stays authoritative, and a missing or
//! unreachable cache only changes latency, never outcomes.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::warn;
use uuid::Uuid;

use keygate_cache::{CacheManager, keys};
use keygate_core::error::AppError;
use keygate_core::result::AppResult;
use keygate_core::traits::cache::CacheProvider;

/// The last-known-good verification result for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// The owning credential.
    pub user_id: Uuid,
    /// The verified session.
    pub session_id: Uuid,
    /// The credential's email.
    pub email: String,
    /// Opaque role claim.
    pub role: String,
}

/// Outcome published to deduplicated waiters. `AppError` clones without its
/// source, which is all a waiter needs.
type VerifyOutcome = Result<SessionContext, AppError>;

/// Verification cache with per-session in-flight deduplication.
#[derive(Debug)]
pub struct ValidationCache {
    /// Backing cache.
    cache: CacheManager,
    /// Entry TTL; strictly shorter than the refresh-token lifetime.
    ttl: Duration,
    /// One in-flight ledger lookup per session key. Entries are removed as
    /// soon as the lookup resolves, success or failure.
    in_flight: Mutex<HashMap<Uuid, watch::Receiver<Option<VerifyOutcome>>>>,
}

impl ValidationCache {
    /// Create a new validation cache.
    pub fn new(cache: CacheManager, ttl_seconds: u64) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(ttl_seconds),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a session's verification result, consulting the cache first
    /// and collapsing concurrent misses into a single `verify` call.
    ///
    /// `verify` performs the authoritative ledger lookup. If the cache
    /// backend errors, the lookup proceeds anyway with the same outcome.
    pub async fn get_or_verify<F, Fut>(
        &self,
        session_id: Uuid,
        verify: F,
    ) -> AppResult<SessionContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<SessionContext>>,
    {
        let key = keys::session_validation(session_id);

        match self.cache.get_json::<SessionContext>(&key).await {
            Ok(Some(context)) => return Ok(context),
            Ok(None) => {}
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Validation cache unreachable, falling back to ledger");
            }
        }

        enum Role {
            Leader(watch::Sender<Option<VerifyOutcome>>),
            Follower(watch::Receiver<Option<VerifyOutcome>>),
        }

        let role = {
            let mut map = self.in_flight.lock().await;
            match map.get(&session_id) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(session_id, rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut rx) => {
                let waited = rx.wait_for(|outcome| outcome.is_some()).await.map(|outcome| {
                    outcome
                        .clone()
                        .unwrap_or_else(|| Err(AppError::internal("Empty verification result")))
                });
                match waited {
                    Ok(outcome) => outcome,
                    // The leader was dropped mid-lookup; verify independently
                    // rather than waiting forever.
                    Err(_) => verify().await,
                }
            }
            Role::Leader(tx) => {
                let outcome = verify().await;

                // Remove the entry before publishing so a late arrival starts
                // a fresh lookup instead of observing a resolved channel.
                self.in_flight.lock().await.remove(&session_id);
                let _ = tx.send(Some(outcome.clone()));

                if let Ok(context) = &outcome {
                    if let Err(err) = self.cache.set_json(&key, context, self.ttl).await {
                        warn!(session_id = %session_id, error = %err, "Failed to populate validation cache");
                    }
                }
                outcome
            }
        }
    }

    /// Drop the cached result for one session.
    pub async fn invalidate(&self, session_id: Uuid) {
        let key = keys::session_validation(session_id);
        if let Err(err) = self.cache.delete(&key).await {
            warn!(session_id = %session_id, error = %err, "Failed to invalidate validation cache entry");
        }
    }

    /// Drop the cached results for a batch of sessions (bulk revocation).
    pub async fn invalidate_sessions(&self, session_ids: &[Uuid]) {
        for session_id in session_ids {
            self.invalidate(*session_id).await;
        }
    }
}
