use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller as asserted by the session provider. Roles are
/// assembled once when the session is established (see
/// `admin::assemble_roles`); handlers only ever read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
