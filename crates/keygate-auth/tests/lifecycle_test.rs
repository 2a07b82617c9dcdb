//! End-to-end lifecycle tests over the in-memory ledger.
//!
//! These cover the engine's load-bearing guarantees: rotation uniqueness,
//! reuse-triggered mass revocation, the concurrent rotation race, lockout
//! asymmetry, logout idempotency, and cache-outage transparency.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use keygate_auth::{PasswordHasher, RequestOrigin};
use keygate_core::error::ErrorKind;
use keygate_entity::audit::AuditAction;
use keygate_entity::session::{RevokeReason, SessionStatus};

use support::{TestHarness, build_harness, memory_cache_provider};

const PASSWORD: &str = "correct horse battery staple";

fn origin() -> RequestOrigin {
    RequestOrigin {
        ip: Some("198.51.100.7".to_string()),
        user_agent: Some("keygate-tests/1.0".to_string()),
    }
}

fn harness_with_user(email: &str) -> (TestHarness, uuid::Uuid) {
    let harness = build_harness(memory_cache_provider());
    let hash = PasswordHasher::new().hash_password(PASSWORD).unwrap();
    let user_id = harness.ledger.add_credential(email, &hash);
    (harness, user_id)
}

#[tokio::test]
async fn login_issues_triple_and_stores_hashed_identifier() {
    let (h, user_id) = harness_with_user("ada@example.com");

    let outcome = h
        .lifecycle
        .login("ada@example.com", PASSWORD, &origin())
        .await
        .unwrap();

    assert!(outcome.tokens.identity_token.is_some());
    assert_eq!(outcome.session.user_id, user_id);
    assert_eq!(outcome.session.status, SessionStatus::Active);

    // The ledger holds the hash of the refresh jti, never the raw value.
    let stored = h.ledger.session(outcome.session.id).unwrap();
    assert_eq!(
        stored.refresh_token_hash,
        keygate_token::hash_jti(&outcome.tokens.refresh_jti)
    );
    assert_ne!(stored.refresh_token_hash, outcome.tokens.refresh_jti.to_string());

    assert_eq!(h.audit.count(AuditAction::LoginSucceeded), 1);
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let (h, _) = harness_with_user("bob@example.com");

    let err = h
        .lifecycle
        .login("bob@example.com", "not the password", &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidCredentials);

    // Unknown emails are indistinguishable from wrong passwords.
    let err = h
        .lifecycle
        .login("nobody@example.com", PASSWORD, &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidCredentials);
}

#[tokio::test]
async fn n_rotations_yield_n_distinct_identifiers() {
    let (h, _) = harness_with_user("carol@example.com");

    let outcome = h
        .lifecycle
        .login("carol@example.com", PASSWORD, &origin())
        .await
        .unwrap();
    let session_id = outcome.session.id;

    let mut seen = HashSet::new();
    seen.insert(h.ledger.session(session_id).unwrap().refresh_token_hash);

    let mut refresh_token = outcome.tokens.refresh_token;
    for _ in 0..5 {
        let tokens = h.lifecycle.refresh(&refresh_token, &origin()).await.unwrap();
        refresh_token = tokens.refresh_token;
        seen.insert(h.ledger.session(session_id).unwrap().refresh_token_hash);
    }

    // Five rotations after login: six distinct identifiers have existed.
    assert_eq!(seen.len(), 6);
    // Only the last one still rotates.
    assert!(h.lifecycle.refresh(&refresh_token, &origin()).await.is_ok());
}

#[tokio::test]
async fn replayed_token_revokes_every_session_of_the_subject() {
    let (h, user_id) = harness_with_user("dave@example.com");

    // Two live sessions for the same subject.
    let first = h
        .lifecycle
        .login("dave@example.com", PASSWORD, &origin())
        .await
        .unwrap();
    let second = h
        .lifecycle
        .login("dave@example.com", PASSWORD, &origin())
        .await
        .unwrap();

    // R0 rotates away; R0 replayed must be treated as theft.
    let r0 = first.tokens.refresh_token.clone();
    h.lifecycle.refresh(&r0, &origin()).await.unwrap();

    let err = h.lifecycle.refresh(&r0, &origin()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenReuse);

    // Every session of the subject is revoked with reason token_reuse.
    for session in h.ledger.sessions_for_user(user_id) {
        assert_eq!(session.status, SessionStatus::Revoked);
        assert_eq!(session.revoke_reason, Some(RevokeReason::TokenReuse));
    }
    assert_eq!(h.audit.count(AuditAction::TokenReuseDetected), 1);

    // The untouched second session's refresh token is dead too.
    let err = h
        .lifecycle
        .refresh(&second.tokens.refresh_token, &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionNotFound);
}

#[tokio::test]
async fn concurrent_refresh_race_has_exactly_one_winner() {
    let (h, _) = harness_with_user("eve@example.com");

    let outcome = h
        .lifecycle
        .login("eve@example.com", PASSWORD, &origin())
        .await
        .unwrap();
    let token = outcome.tokens.refresh_token;

    let a = {
        let lifecycle = Arc::clone(&h.lifecycle);
        let token = token.clone();
        tokio::spawn(async move { lifecycle.refresh(&token, &RequestOrigin::default()).await })
    };
    let b = {
        let lifecycle = Arc::clone(&h.lifecycle);
        let token = token.clone();
        tokio::spawn(async move { lifecycle.refresh(&token, &RequestOrigin::default()).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one rotation may win");

    let loser = results.iter().find(|r| r.is_err()).unwrap();
    let kind = loser.as_ref().unwrap_err().kind;
    assert!(
        kind == ErrorKind::TokenReuse || kind == ErrorKind::SessionNotFound,
        "loser must fail as reuse or invalid session, got {kind}"
    );
}

#[tokio::test]
async fn logout_is_idempotent() {
    let (h, _) = harness_with_user("fay@example.com");

    let outcome = h
        .lifecycle
        .login("fay@example.com", PASSWORD, &origin())
        .await
        .unwrap();
    let session_id = outcome.session.id;

    h.lifecycle.logout(session_id, &origin()).await.unwrap();
    h.lifecycle.logout(session_id, &origin()).await.unwrap();

    let session = h.ledger.session(session_id).unwrap();
    assert_eq!(session.status, SessionStatus::Revoked);
    assert_eq!(session.revoke_reason, Some(RevokeReason::Logout));
    // The second logout did not produce a second transition.
    assert_eq!(h.audit.count(AuditAction::Logout), 1);
}

#[tokio::test]
async fn email_lock_rejects_even_the_correct_password() {
    let (h, _) = harness_with_user("gil@example.com");

    for _ in 0..3 {
        let _ = h
            .lifecycle
            .login("gil@example.com", "wrong password", &origin())
            .await;
    }
    assert_eq!(h.audit.count(AuditAction::LockoutTriggered), 1);

    let err = h
        .lifecycle
        .login("gil@example.com", PASSWORD, &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AccountLocked);
}

#[tokio::test]
async fn ip_lock_blocks_other_accounts_and_survives_email_clear() {
    let harness = build_harness(memory_cache_provider());
    let hasher = PasswordHasher::new();
    let hash = hasher.hash_password(PASSWORD).unwrap();
    harness.ledger.add_credential("h1@example.com", &hash);
    harness.ledger.add_credential("h2@example.com", &hash);
    harness.ledger.add_credential("h3@example.com", &hash);

    let attacker = RequestOrigin {
        ip: Some("203.0.113.99".to_string()),
        user_agent: None,
    };

    // Six failures from one origin, spread across two accounts so neither
    // email scope locks on its own (threshold 3 resets on each account's
    // lock; the IP counter keeps climbing).
    for i in 0..6 {
        let email = if i % 2 == 0 { "h1@example.com" } else { "h2@example.com" };
        let _ = harness.lifecycle.login(email, "wrong password", &attacker).await;
    }

    // A third, untouched account is blocked from that origin...
    let err = harness
        .lifecycle
        .login("h3@example.com", PASSWORD, &attacker)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AccountLocked);

    // ...but not from a clean origin.
    let clean = RequestOrigin {
        ip: Some("198.51.100.20".to_string()),
        user_agent: None,
    };
    assert!(harness.lifecycle.login("h3@example.com", PASSWORD, &clean).await.is_ok());

    // That success cleared h3's email scope only; the attacking origin
    // remains locked out.
    let err = harness
        .lifecycle
        .login("h3@example.com", PASSWORD, &attacker)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AccountLocked);
}

/// Run one authenticate scenario and return its outcome kinds, so the
/// cache-enabled and cache-down runs can be compared verbatim.
async fn authenticate_outcomes(
    cache: Arc<dyn keygate_core::traits::cache::CacheProvider>,
) -> (bool, Option<ErrorKind>) {
    let harness = build_harness(cache);
    let hash = PasswordHasher::new().hash_password(PASSWORD).unwrap();
    harness.ledger.add_credential("ida@example.com", &hash);

    let outcome = harness
        .lifecycle
        .login("ida@example.com", PASSWORD, &origin())
        .await
        .unwrap();

    let live = harness
        .lifecycle
        .authenticate(&outcome.tokens.access_token, &origin())
        .await
        .is_ok();

    harness
        .lifecycle
        .logout(outcome.session.id, &origin())
        .await
        .unwrap();

    let after_logout = harness
        .lifecycle
        .authenticate(&outcome.tokens.access_token, &origin())
        .await
        .err()
        .map(|e| e.kind);

    (live, after_logout)
}

#[tokio::test]
async fn cache_outage_changes_latency_not_outcomes() {
    let with_cache = authenticate_outcomes(memory_cache_provider()).await;
    let without_cache = authenticate_outcomes(Arc::new(support::DownCacheProvider)).await;

    assert_eq!(with_cache, without_cache);
    assert_eq!(with_cache, (true, Some(ErrorKind::SessionNotFound)));
}

#[tokio::test]
async fn authenticate_rejects_refresh_tokens() {
    let (h, _) = harness_with_user("jan@example.com");

    let outcome = h
        .lifecycle
        .login("jan@example.com", PASSWORD, &origin())
        .await
        .unwrap();

    let err = h
        .lifecycle
        .authenticate(&outcome.tokens.refresh_token, &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TokenWrongKind);
}

#[tokio::test]
async fn password_reset_consumes_token_once_and_revokes_sessions() {
    let (h, user_id) = harness_with_user("kim@example.com");

    let session = h
        .lifecycle
        .login("kim@example.com", PASSWORD, &origin())
        .await
        .unwrap()
        .session;

    let raw = h
        .lifecycle
        .start_password_reset("kim@example.com", &origin())
        .await
        .unwrap()
        .expect("known account yields a token");

    // Unknown accounts are indistinguishable from known ones.
    assert!(h
        .lifecycle
        .start_password_reset("ghost@example.com", &origin())
        .await
        .unwrap()
        .is_none());

    let new_password = "brisk otter plays nine flutes";
    h.lifecycle
        .complete_password_reset(&raw, new_password, &origin())
        .await
        .unwrap();

    // The live session died with the old password.
    let stored = h.ledger.session(session.id).unwrap();
    assert_eq!(stored.status, SessionStatus::Revoked);
    assert_eq!(stored.revoke_reason, Some(RevokeReason::PasswordChange));

    // Old password out, new password in.
    assert!(h.lifecycle.login("kim@example.com", PASSWORD, &origin()).await.is_err());
    assert!(h
        .lifecycle
        .login("kim@example.com", new_password, &origin())
        .await
        .is_ok());
    assert!(h.ledger.password_hash(user_id).starts_with("$argon2"));

    // The token was one-time.
    let err = h
        .lifecycle
        .complete_password_reset(&raw, "another sturdy passphrase 7", &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn change_password_spares_only_the_requested_session() {
    let (h, user_id) = harness_with_user("lou@example.com");

    let keep = h
        .lifecycle
        .login("lou@example.com", PASSWORD, &origin())
        .await
        .unwrap()
        .session;
    let other = h
        .lifecycle
        .login("lou@example.com", PASSWORD, &origin())
        .await
        .unwrap()
        .session;

    h.lifecycle
        .change_password(
            user_id,
            PASSWORD,
            "brisk otter plays nine flutes",
            Some(keep.id),
            &origin(),
        )
        .await
        .unwrap();

    assert_eq!(h.ledger.session(keep.id).unwrap().status, SessionStatus::Active);
    let revoked = h.ledger.session(other.id).unwrap();
    assert_eq!(revoked.status, SessionStatus::Revoked);
    assert_eq!(revoked.revoke_reason, Some(RevokeReason::PasswordChange));

    // A weak replacement is rejected before anything is touched.
    let err = h
        .lifecycle
        .change_password(user_id, "brisk otter plays nine flutes", "abc", None, &origin())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}
