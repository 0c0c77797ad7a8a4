pub mod generation;
pub mod notification;
pub mod sweep;
