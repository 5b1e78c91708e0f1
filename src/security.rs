//! Credential manager: one-way password hashing and verification.
//!
//! Argon2 with default parameters and a fresh random salt per call; the work
//! factor is fixed here and not caller-tunable. Password policy is checked
//! before the expensive hash ever runs.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};

/// Minimum accepted plaintext length. A usability floor, not a strength
/// guarantee; acceptance behavior is relied upon by callers so it stays at 6.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Reject candidates under the minimum length without touching Argon2.
pub fn check_password_policy(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(anyhow!("password must be at least {} characters", MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Hash a plaintext into a PHC string. Each call draws a fresh 16-byte salt,
/// so two hashes of the same plaintext differ.
pub fn hash_password(password: &str) -> Result<String> {
    check_password_policy(password)?;
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

/// True iff the plaintext re-derives the stored PHC hash under its embedded
/// salt and parameters. An unparseable hash is simply a non-match.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}
