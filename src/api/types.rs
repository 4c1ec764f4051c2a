//! Shared types for the HTTP layer.

use std::sync::Arc;

use crate::core_state::CoreState;
use crate::session_manager::SessionIdentity;

/// Shared context for routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Authenticated session, injected into request extensions by the auth
/// middleware after the token validates.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub token: String,
    pub identity: SessionIdentity,
}
