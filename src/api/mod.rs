//! HTTP-facing pieces of the core.
//!
//! Error → status mapping, session token extraction and the auth middleware.
//! Routes themselves belong to whichever server embeds the core; it mounts
//! `middleware::auth::require_session` with an `Extension<ApiContext>` layer
//! outside it.

pub mod error;
pub mod middleware;
pub mod types;

pub use error::ApiError;
pub use types::{ApiContext, SessionContext};
