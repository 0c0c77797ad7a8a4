//! Authentication primitives.
//!
//! - [`jwt`] -- access-token validation.
//!
//! Accounts and login live in the user service; this server only trusts
//! tokens signed with the shared secret.

pub mod jwt;
