//! Privileged action gate: the super-admin role claim and the forced
//! password reset it guards.

use anyhow::anyhow;
use base64::Engine;
use tracing::info;

use crate::domain;
use crate::error::{AppError, AppResult};
use crate::identity::Principal;
use crate::security;
use crate::storage::SharedStore;

/// Role claim granting cross-account administrative actions. Attached to at
/// most one principal per deployment (the owner of the privileged domain).
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Deployment environment, threaded explicitly into handler calls so both
/// response branches of `forced_reset` are independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Parse from the `PORTICO_ENV` value; anything other than "production"
    /// is treated as development.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }
}

/// Role-claim check. Privilege lives on the principal, not in live domain
/// state; the claim is only ever granted by `assemble_roles`.
pub fn is_super_admin(principal: &Principal) -> bool {
    principal.has_role(SUPER_ADMIN_ROLE)
}

/// Assemble the role set for an account at session-establishment time.
///
/// The `super_admin` claim is granted only when the account's own tenant
/// domain resolves and equals the one configured privileged domain. No
/// tenant, an unresolvable domain or an empty configuration value all grant
/// nothing — the gate fails closed.
pub fn assemble_roles(store: &SharedStore, account_id: uuid::Uuid, privileged_domain: &str) -> Vec<String> {
    let mut roles = vec!["user".to_string()];
    let privileged = domain::normalize(privileged_domain);
    if privileged.is_empty() {
        return roles;
    }
    if let Some(own) = store.tenant_for_account(account_id) {
        if domain::resolve(store, &own.domain).is_some_and(|t| t.domain == privileged) {
            roles.push(SUPER_ADMIN_ROLE.to_string());
        }
    }
    roles
}

/// Outcome of a forced reset. `temp_password` is populated only outside
/// production; in production the plaintext goes exclusively through the
/// out-of-scope delivery channel.
#[derive(Debug)]
pub struct ForcedReset {
    pub message: String,
    pub temp_password: Option<String>,
}

fn gen_temp_password() -> AppResult<String> {
    // 24 random bytes, base64url without padding
    let mut buf = [0u8; 24];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::from(anyhow!(e.to_string())))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Replace the target account's password with a fresh high-entropy
/// temporary credential. Caller must already have passed `is_super_admin`.
pub fn forced_reset(store: &SharedStore, target_email: &str, env: Environment) -> AppResult<ForcedReset> {
    let Some(account) = store.find_account_by_email(target_email) else {
        return Err(AppError::not_found("account_not_found", "account not found"));
    };
    let temp = gen_temp_password()?;
    let new_hash = security::hash_password(&temp).map_err(AppError::from)?;
    store
        .set_password_hash(account.id, new_hash)
        .map_err(|e| AppError::from(anyhow::Error::from(e)))?;
    info!(account = %account.id, production = env.is_production(), "forced password reset");
    Ok(ForcedReset {
        message: "temporary password set".to_string(),
        temp_password: if env.is_production() { None } else { Some(temp) },
    })
}
