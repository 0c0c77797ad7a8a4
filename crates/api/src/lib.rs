//! HTTP surface for the generation pipeline.
//!
//! Exposes submission, status queries, task history, notifications and the
//! reconciliation sweep under `/api/v1`, plus `/health`. The binary in
//! `main.rs` wires configuration, the database, providers, storage and the
//! background workers together.

pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
