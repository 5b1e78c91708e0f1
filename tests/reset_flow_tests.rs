//! Reset-token lifecycle integration tests: single use, expiry, the
//! mismatch/unknown equivalence, and the concurrent double-submission race.

use std::sync::{Arc, Barrier};

use chrono::{Duration, Utc};
use uuid::Uuid;

use portico::reset::{self, ResetError};
use portico::security;
use portico::storage::{AccountRecord, ResetTokenRecord, SharedStore};

fn seed_account(store: &SharedStore, email: &str, password: &str) -> AccountRecord {
    let hash = security::hash_password(password).expect("seed hash");
    store.insert_account(email, hash).expect("seed account")
}

fn seed_token(store: &SharedStore, account_id: Uuid, ttl: Duration) -> String {
    let (raw, rec) = reset::issue_token(account_id, ttl).expect("issue token");
    store.insert_reset_token(rec).expect("insert token");
    raw
}

#[test]
fn valid_token_consumes_exactly_once() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(1));

    reset::validate_and_consume(&store, &raw, "u@x.com", "newpass1").expect("first consumption succeeds");
    let stored = store.account(acct.id).unwrap();
    assert!(security::verify_password(&stored.password_hash, "newpass1"), "password must be replaced");
    assert!(!security::verify_password(&stored.password_hash, "origpw1"), "old password must be gone");

    // Same raw secret again: terminal.
    let again = reset::validate_and_consume(&store, &raw, "u@x.com", "newpass2").unwrap_err();
    assert!(matches!(again, ResetError::AlreadyUsed), "repeat must be AlreadyUsed, got {again:?}");
    let stored = store.account(acct.id).unwrap();
    assert!(security::verify_password(&stored.password_hash, "newpass1"), "repeat must not change the password");

    // Unknown token: Invalid.
    let unknown = reset::validate_and_consume(&store, "no-such-token", "u@x.com", "newpass3").unwrap_err();
    assert!(matches!(unknown, ResetError::Invalid));
}

#[test]
fn expired_token_rejected_and_left_unconsumed() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(-1));

    let err = reset::validate_and_consume(&store, &raw, "u@x.com", "newpass1").unwrap_err();
    assert!(matches!(err, ResetError::Expired), "past expiry must be Expired, got {err:?}");

    // Expired-unconsumed stays Issued in storage; it is garbage, never reusable.
    let rec = store.find_reset_token_by_digest(&reset::token_digest(&raw)).unwrap();
    assert!(rec.consumed_at.is_none(), "expiry is derived, not stored");
    let stored = store.account(acct.id).unwrap();
    assert!(security::verify_password(&stored.password_hash, "origpw1"), "password must be untouched");
}

#[test]
fn email_mismatch_is_indistinguishable_from_unknown_token() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(1));

    let mismatch = reset::validate_and_consume(&store, &raw, "attacker@evil.com", "newpass1").unwrap_err();
    let unknown = reset::validate_and_consume(&store, "no-such-token", "u@x.com", "newpass1").unwrap_err();
    assert!(matches!(mismatch, ResetError::Invalid));
    assert!(matches!(unknown, ResetError::Invalid));
    assert_eq!(mismatch.to_string(), unknown.to_string(), "externally identical error class required");

    // The mismatch attempt must not have burned the token.
    reset::validate_and_consume(&store, &raw, "u@x.com", "newpass1").expect("owner can still consume");
}

#[test]
fn claimed_email_is_case_insensitive() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(1));
    reset::validate_and_consume(&store, &raw, "U@X.COM", "newpass1").expect("case variants of the owner email match");
}

#[test]
fn consumed_wins_over_expired() {
    // A token both consumed and expired reports AlreadyUsed: consumption is
    // terminal regardless of expiry state.
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let now = Utc::now();
    let raw = "manually-seeded-secret";
    store
        .insert_reset_token(ResetTokenRecord {
            id: Uuid::new_v4(),
            account_id: acct.id,
            token_digest: reset::token_digest(raw),
            expires_at: now - Duration::hours(2),
            created_at: now - Duration::hours(3),
            consumed_at: Some(now - Duration::hours(2)),
        })
        .unwrap();

    let err = reset::validate_and_consume(&store, raw, "u@x.com", "newpass1").unwrap_err();
    assert!(matches!(err, ResetError::AlreadyUsed), "consumed-at check precedes expiry, got {err:?}");
}

#[test]
fn short_new_password_leaves_token_issued() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(1));

    let err = reset::validate_and_consume(&store, &raw, "u@x.com", "abcde").unwrap_err();
    assert!(matches!(err, ResetError::ShortPassword));
    let rec = store.find_reset_token_by_digest(&reset::token_digest(&raw)).unwrap();
    assert!(rec.consumed_at.is_none(), "rejected input must not burn the token");
}

#[test]
fn dead_token_outcome_wins_over_short_password() {
    // The token's own state is reported even when the candidate password is
    // under the floor; the floor only gates tokens that passed every check.
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");

    // Consumed token + short password: AlreadyUsed, not ShortPassword.
    let consumed = seed_token(&store, acct.id, Duration::hours(1));
    reset::validate_and_consume(&store, &consumed, "u@x.com", "newpass1").expect("consume");
    let err = reset::validate_and_consume(&store, &consumed, "u@x.com", "abc").unwrap_err();
    assert!(matches!(err, ResetError::AlreadyUsed), "expected AlreadyUsed, got {err:?}");

    // Expired token + short password: Expired.
    let expired = seed_token(&store, acct.id, Duration::hours(-1));
    let err = reset::validate_and_consume(&store, &expired, "u@x.com", "abc").unwrap_err();
    assert!(matches!(err, ResetError::Expired), "expected Expired, got {err:?}");

    // Unknown token + short password: Invalid.
    let err = reset::validate_and_consume(&store, "no-such-token", "u@x.com", "abc").unwrap_err();
    assert!(matches!(err, ResetError::Invalid), "expected Invalid, got {err:?}");
}

#[test]
fn concurrent_double_submission_has_one_winner() {
    let store = SharedStore::new();
    let acct = seed_account(&store, "u@x.com", "origpw1");
    let raw = seed_token(&store, acct.id, Duration::hours(1));

    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(2));
    let candidates = ["racepass-a", "racepass-b"];

    let handles: Vec<_> = candidates
        .iter()
        .map(|pw| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let raw = raw.clone();
            let pw = pw.to_string();
            std::thread::spawn(move || {
                barrier.wait();
                reset::validate_and_consume(&store, &raw, "u@x.com", &pw)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread")).collect();
    portico::tprintln!("race results: {:?}", results.iter().map(|r| r.is_ok()).collect::<Vec<_>>());
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let already_used = results
        .iter()
        .filter(|r| matches!(r, Err(ResetError::AlreadyUsed)))
        .count();
    assert_eq!(wins, 1, "exactly one branch commits Consumed");
    assert_eq!(already_used, 1, "the loser observes AlreadyUsed");

    // Storage reflects exactly one password change attributable to the token.
    let winner_pw = candidates[results.iter().position(|r| r.is_ok()).unwrap()];
    let loser_pw = candidates[results.iter().position(|r| r.is_err()).unwrap()];
    let stored = store.account(acct.id).unwrap();
    assert!(security::verify_password(&stored.password_hash, winner_pw));
    assert!(!security::verify_password(&stored.password_hash, loser_pw));
}
