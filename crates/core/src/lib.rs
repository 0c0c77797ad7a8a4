//! Domain vocabulary for AI generation tasks.
//!
//! Pure types and rules with no I/O: identifiers, the shared error type,
//! media kinds, the task status machine, typed task payloads, the credit
//! cost table, content fingerprinting and notification text helpers.

pub mod error;
pub mod generation;
pub mod hashing;
pub mod notification;
pub mod payload;
pub mod types;
