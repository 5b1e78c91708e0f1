//! Reset token manager: issuance-adjacent construction plus validation and
//! single-use consumption of password-reset tokens.
//!
//! Tokens are high-entropy random secrets looked up by a fast deterministic
//! SHA-256 digest; the slow Argon2 function is reserved for passwords. An
//! unknown digest and a mismatched claimed email surface as the same
//! `Invalid` outcome so email guessing gains no token-validity oracle.

use anyhow::anyhow;
use base64::Engine;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::security;
use crate::storage::{ResetTokenRecord, SharedStore, StoreError};

/// Raw secret entropy, before base64url encoding.
pub const TOKEN_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ResetError {
    /// Unknown token or claimed email does not own it; deliberately one class.
    #[error("invalid reset link")]
    Invalid,
    #[error("reset link already used")]
    AlreadyUsed,
    #[error("reset link expired")]
    Expired,
    #[error("password must be at least 6 characters")]
    ShortPassword,
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<ResetError> for AppError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::Invalid => AppError::user("invalid_reset_link", "invalid reset link"),
            ResetError::AlreadyUsed => AppError::user("reset_link_used", "reset link already used"),
            ResetError::Expired => AppError::user("reset_link_expired", "reset link expired"),
            ResetError::ShortPassword => AppError::user(
                "password_too_short".to_string(),
                format!("password must be at least {} characters", security::MIN_PASSWORD_LEN),
            ),
            ResetError::Internal(e) => e.into(),
        }
    }
}

/// Fast deterministic digest of a raw token secret: hex-encoded SHA-256.
/// This is the storage lookup key; the raw secret itself is never stored.
pub fn token_digest(raw_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_secret.as_bytes());
    let out = hasher.finalize();
    let mut hex = String::with_capacity(out.len() * 2);
    use std::fmt::Write as _;
    for b in out {
        let _ = write!(&mut hex, "{:02x}", b);
    }
    hex
}

/// Build a fresh Issued token for an account: random secret, matching
/// digest, bounded expiry window chosen by the caller. Returns the raw
/// secret (for the out-of-scope delivery channel) alongside the record to
/// persist.
pub fn issue_token(account_id: Uuid, ttl: Duration) -> Result<(String, ResetTokenRecord), ResetError> {
    let mut buf = [0u8; TOKEN_SECRET_BYTES];
    getrandom::getrandom(&mut buf).map_err(|e| ResetError::Internal(anyhow!(e.to_string())))?;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf);
    let now = Utc::now();
    let rec = ResetTokenRecord {
        id: Uuid::new_v4(),
        account_id,
        token_digest: token_digest(&raw),
        expires_at: now + ttl,
        created_at: now,
        consumed_at: None,
    };
    Ok((raw, rec))
}

/// Validate a reset attempt and, if every check passes, atomically replace
/// the account password hash and mark the token consumed.
///
/// Check order is part of the contract: digest lookup, then email ownership
/// (both `Invalid`), then consumed-at (`AlreadyUsed`, terminal regardless of
/// expiry), then expiry (`Expired`, derived from `expires_at` at call time),
/// and only then the password floor and Argon2 — so a dead token always
/// surfaces its own outcome, whatever the candidate password looks like.
/// The final commit re-checks consumed-at and expiry under the store's write
/// lock, so a concurrent duplicate submission loses with `AlreadyUsed` and a
/// single token never produces two password changes.
pub fn validate_and_consume(
    store: &SharedStore,
    raw_secret: &str,
    claimed_email: &str,
    new_password: &str,
) -> Result<(), ResetError> {
    let digest = token_digest(raw_secret);
    let Some(token) = store.find_reset_token_by_digest(&digest) else {
        return Err(ResetError::Invalid);
    };
    let Some(account) = store.account(token.account_id) else {
        // Orphaned token; indistinguishable from unknown externally.
        return Err(ResetError::Invalid);
    };
    if !account.email.eq_ignore_ascii_case(claimed_email.trim()) {
        return Err(ResetError::Invalid);
    }
    if token.consumed_at.is_some() {
        return Err(ResetError::AlreadyUsed);
    }
    if Utc::now() > token.expires_at {
        return Err(ResetError::Expired);
    }

    // Floor check still precedes the expensive hash; trivially-rejected
    // candidates never reach Argon2.
    if security::check_password_policy(new_password).is_err() {
        return Err(ResetError::ShortPassword);
    }
    let new_hash = security::hash_password(new_password).map_err(ResetError::Internal)?;
    match store.consume_token_and_set_password(token.id, account.id, new_hash) {
        Ok(consumed_at) => {
            tracing::info!(
                account = %account.id,
                digest_prefix = &digest[..8],
                %consumed_at,
                "reset token consumed"
            );
            Ok(())
        }
        // Lost the race to a concurrent consumer.
        Err(StoreError::TokenConsumed) => Err(ResetError::AlreadyUsed),
        // Expired while hashing; the commit re-derives the predicate.
        Err(StoreError::TokenExpired) => Err(ResetError::Expired),
        Err(e) => Err(ResetError::Internal(e.into())),
    }
}
