//! Request extractors enforcing authentication.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a JWT Bearer token.
//! - [`sweep::SweepAuth`] -- Checks the shared sweep secret when one is configured.

pub mod auth;
pub mod sweep;
