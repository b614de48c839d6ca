//! Authentication test helpers
//!
//! Provides identities with signed tokens for the test secret.

use crate::common::app::TEST_SECRET;
use diagramsync::backend::auth::{Identity, SessionKeys};
use uuid::Uuid;

/// Test user with a bearer token
pub struct TestUser {
    pub identity: Identity,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.identity.id
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn with_token(identity: Identity) -> TestUser {
    let token = SessionKeys::new(TEST_SECRET)
        .create_token(&identity)
        .expect("Failed to create test token");
    TestUser { identity, token }
}

/// Create a regular user with a fresh id
pub fn test_user() -> TestUser {
    with_token(Identity::new(Uuid::new_v4()))
}

/// Create an admin with a fresh id
pub fn test_admin() -> TestUser {
    with_token(Identity::admin(Uuid::new_v4()))
}
