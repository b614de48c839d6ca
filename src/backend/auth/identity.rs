//! Caller identity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role that may read, write and manage every document
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated caller
///
/// Anonymous callers are represented as `Option<Identity>::None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            roles: Vec::new(),
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Self {
            id,
            roles: vec![ADMIN_ROLE.to_string()],
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}
