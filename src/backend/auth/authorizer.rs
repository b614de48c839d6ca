/**
 * Access Authorizer
 *
 * Decides whether a caller may read, write or manage a document.
 *
 * # Rules
 *
 * - The `admin` role may do everything
 * - The owner may do everything
 * - An `edit` grant allows read and write, a `view` grant read only
 * - Unowned documents are readable by anyone (including anonymous callers)
 *   and writable only by admins
 *
 * A denied anonymous caller gets `Unauthenticated`; a denied authenticated
 * caller gets `Forbidden`.
 */

use crate::backend::auth::identity::Identity;
use crate::backend::error::BackendError;
use crate::backend::store::{DiagramStore, StoreError};
use crate::shared::{Diagram, Permission, ShareGrant};
use uuid::Uuid;

/// Access level, ordered from least to most
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    Read,
    Write,
    Manage,
}

impl Access {
    fn describe(self) -> &'static str {
        match self {
            Access::None => "access",
            Access::Read => "read access",
            Access::Write => "write access",
            Access::Manage => "owner or admin access",
        }
    }
}

/// Pure access decision
pub fn decide(identity: Option<&Identity>, owner_id: Option<Uuid>, grant: Option<&ShareGrant>) -> Access {
    if identity.is_some_and(Identity::is_admin) {
        return Access::Manage;
    }

    let Some(owner_id) = owner_id else {
        return Access::Read;
    };

    match identity {
        Some(caller) if caller.id == owner_id => Access::Manage,
        Some(_) => match grant.map(|g| g.permission) {
            Some(Permission::Edit) => Access::Write,
            Some(Permission::View) => Access::Read,
            None => Access::None,
        },
        None => Access::None,
    }
}

/// Error for a caller that lacks `required`
pub fn denial(identity: Option<&Identity>, required: Access) -> BackendError {
    match identity {
        None => BackendError::Unauthenticated,
        Some(_) => BackendError::forbidden(format!("This diagram requires {}", required.describe())),
    }
}

/// Access checks backed by the share grants in the store
#[derive(Clone)]
pub struct Authorizer {
    store: DiagramStore,
}

impl Authorizer {
    pub fn new(store: DiagramStore) -> Self {
        Self { store }
    }

    /// Effective access of `identity` on `diagram`
    ///
    /// The grant table is only consulted when the answer depends on it.
    pub async fn access(&self, identity: Option<&Identity>, diagram: &Diagram) -> Result<Access, StoreError> {
        let needs_grant = match (identity, diagram.owner_id) {
            (Some(caller), Some(owner)) => !caller.is_admin() && caller.id != owner,
            _ => false,
        };

        let grant = match (needs_grant, identity) {
            (true, Some(caller)) => self.store.find_grant(diagram.id, caller.id).await?,
            _ => None,
        };

        Ok(decide(identity, diagram.owner_id, grant.as_ref()))
    }

    /// Fail with the matching error unless `identity` has `required`
    pub async fn require(
        &self,
        identity: Option<&Identity>,
        diagram: &Diagram,
        required: Access,
    ) -> Result<(), BackendError> {
        if self.access(identity, diagram).await? >= required {
            Ok(())
        } else {
            Err(denial(identity, required))
        }
    }
}
