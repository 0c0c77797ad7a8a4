//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts
//! - Patch / filter types where the table is updated or searched

pub mod credit;
pub mod generation_task;
pub mod notification;
