//! Port definitions
//!
//! - [`ISyncService`] - Remote storage operations a sync engine drives

pub mod sync_service;

pub use sync_service::ISyncService;
