//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod credit_repo;
pub mod generation_task_repo;
pub mod notification_repo;

pub use credit_repo::CreditRepo;
pub use generation_task_repo::GenerationTaskRepo;
pub use notification_repo::NotificationRepo;
