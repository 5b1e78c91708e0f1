//! Shared in-memory store for accounts, tenants and reset tokens.
//!
//! All request handlers operate through the cloneable `SharedStore` handle;
//! mutations take the write lock so credential/token updates serialize. The
//! token-consumption path re-checks state under the lock, which is what makes
//! a concurrent double-submission of one token resolve to a single winner.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account email already registered: {0}")]
    DuplicateEmail(String),
    #[error("domain already bound to a tenant: {0}")]
    DuplicateDomain(String),
    #[error("reset token digest already present")]
    DuplicateTokenDigest,
    #[error("record not found")]
    NotFound,
    #[error("reset token already consumed")]
    TokenConsumed,
    #[error("reset token expired")]
    TokenExpired,
}

/// Account row. The password hash never leaves the storage/security layers;
/// callers get projections, not this record, at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: Uuid,
    /// Stored lowercased; unique.
    pub email: String,
    pub password_hash: String,
}

/// Tenant row: one portfolio site bound to one owning account via a unique
/// normalized custom domain.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Normalized (see `domain::normalize`); unique among active tenants.
    pub domain: String,
    pub display_name: String,
    pub tagline: Option<String>,
    /// Public page sections, in display order.
    pub sections: Vec<String>,
}

/// Reset token row. Only the SHA-256 digest of the secret is stored; the raw
/// secret exists solely in the delivery channel. `consumed_at` set is
/// terminal — there is no un-consuming. "Expired" is derived at validation
/// time from `expires_at`, never stored.
#[derive(Debug, Clone)]
pub struct ResetTokenRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    accounts: HashMap<Uuid, AccountRecord>,
    email_index: HashMap<String, Uuid>,
    tenants: HashMap<Uuid, TenantRecord>,
    domain_index: HashMap<String, Uuid>,
    account_tenant_index: HashMap<Uuid, Uuid>,
    tokens: HashMap<Uuid, ResetTokenRecord>,
    digest_index: HashMap<String, Uuid>,
}

/// Cloneable handle to the shared store.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<RwLock<StoreInner>>);

impl SharedStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert_account(&self, email: &str, password_hash: String) -> Result<AccountRecord, StoreError> {
        let email = email.trim().to_ascii_lowercase();
        let mut inner = self.0.write();
        if inner.email_index.contains_key(&email) {
            return Err(StoreError::DuplicateEmail(email));
        }
        let rec = AccountRecord { id: Uuid::new_v4(), email: email.clone(), password_hash };
        inner.email_index.insert(email, rec.id);
        inner.accounts.insert(rec.id, rec.clone());
        Ok(rec)
    }

    pub fn account(&self, id: Uuid) -> Option<AccountRecord> {
        self.0.read().accounts.get(&id).cloned()
    }

    pub fn find_account_by_email(&self, email: &str) -> Option<AccountRecord> {
        let email = email.trim().to_ascii_lowercase();
        let inner = self.0.read();
        let id = inner.email_index.get(&email)?;
        inner.accounts.get(id).cloned()
    }

    /// Replace an account's password hash (self-service update and forced
    /// reset paths; the token-consumption path uses
    /// `consume_token_and_set_password` instead).
    pub fn set_password_hash(&self, account_id: Uuid, new_hash: String) -> Result<(), StoreError> {
        let mut inner = self.0.write();
        let acct = inner.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        acct.password_hash = new_hash;
        Ok(())
    }

    /// Insert a tenant. The domain is normalized here before the uniqueness
    /// check, so the at-most-one-tenant-per-normalized-domain invariant holds
    /// whatever form the caller supplies.
    pub fn insert_tenant(
        &self,
        account_id: Uuid,
        domain: &str,
        display_name: &str,
        tagline: Option<String>,
        sections: Vec<String>,
    ) -> Result<TenantRecord, StoreError> {
        let domain = crate::domain::normalize(domain);
        let mut inner = self.0.write();
        if !inner.accounts.contains_key(&account_id) {
            return Err(StoreError::NotFound);
        }
        if inner.domain_index.contains_key(&domain) {
            return Err(StoreError::DuplicateDomain(domain));
        }
        let rec = TenantRecord {
            id: Uuid::new_v4(),
            account_id,
            domain,
            display_name: display_name.to_string(),
            tagline,
            sections,
        };
        inner.domain_index.insert(rec.domain.clone(), rec.id);
        inner.account_tenant_index.insert(account_id, rec.id);
        inner.tenants.insert(rec.id, rec.clone());
        Ok(rec)
    }

    pub fn find_tenant_by_domain(&self, domain: &str) -> Option<TenantRecord> {
        let inner = self.0.read();
        let id = inner.domain_index.get(domain)?;
        inner.tenants.get(id).cloned()
    }

    pub fn tenant_for_account(&self, account_id: Uuid) -> Option<TenantRecord> {
        let inner = self.0.read();
        let id = inner.account_tenant_index.get(&account_id)?;
        inner.tenants.get(id).cloned()
    }

    pub fn insert_reset_token(&self, rec: ResetTokenRecord) -> Result<(), StoreError> {
        let mut inner = self.0.write();
        if !inner.accounts.contains_key(&rec.account_id) {
            return Err(StoreError::NotFound);
        }
        if inner.digest_index.contains_key(&rec.token_digest) {
            return Err(StoreError::DuplicateTokenDigest);
        }
        inner.digest_index.insert(rec.token_digest.clone(), rec.id);
        inner.tokens.insert(rec.id, rec);
        Ok(())
    }

    pub fn find_reset_token_by_digest(&self, digest: &str) -> Option<ResetTokenRecord> {
        let inner = self.0.read();
        let id = inner.digest_index.get(digest)?;
        inner.tokens.get(id).cloned()
    }

    /// Atomically set the account's password hash and mark the token
    /// consumed. Runs entirely under the write lock and re-checks
    /// `consumed_at` and `expires_at` there, so of two concurrent consumers
    /// exactly one commits (the loser gets `TokenConsumed`) and a token that
    /// crossed its expiry since the caller's validation does not slip
    /// through. Both writes land or neither.
    pub fn consume_token_and_set_password(
        &self,
        token_id: Uuid,
        account_id: Uuid,
        new_hash: String,
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut inner = self.0.write();
        // Validate both targets before mutating anything.
        let token = inner.tokens.get(&token_id).ok_or(StoreError::NotFound)?;
        if token.consumed_at.is_some() {
            return Err(StoreError::TokenConsumed);
        }
        let now = Utc::now();
        if now > token.expires_at {
            return Err(StoreError::TokenExpired);
        }
        if !inner.accounts.contains_key(&account_id) {
            return Err(StoreError::NotFound);
        }
        if let Some(tok) = inner.tokens.get_mut(&token_id) {
            tok.consumed_at = Some(now);
        }
        if let Some(acct) = inner.accounts.get_mut(&account_id) {
            acct.password_hash = new_hash;
        }
        Ok(now)
    }
}
