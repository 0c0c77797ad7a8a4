//! Adapters over third-party AI generation APIs.
//!
//! Every provider is reached through [`ProviderAdapter`], which normalizes
//! submission and status responses into the shared task vocabulary from
//! `genflow_core`. Network failures that are worth retrying later are
//! reported as [`ProviderError::Transient`] so callers can tell them apart
//! from permanent rejections.

pub mod adapter;
pub mod error;
pub mod http;
pub mod kie;
pub mod registry;
pub mod replicate;

pub use adapter::{ProviderAdapter, ProviderQueryResponse, SubmitRequest, SubmitResponse};
pub use error::ProviderError;
pub use registry::ProviderRegistry;
