//! Harmony Core - Domain types and the service port for sync adapters
//!
//! This crate holds everything a sync engine and a storage adapter share:
//! - **Domain values** - `RemoteRecord`, `RemoteFile`, `Version`, `ChangeToken`
//! - **Metadata** - the closed `MetadataKey` enumeration and typed maps
//! - **Errors** - the canonical `ServiceError` taxonomy and per-object wrappers
//! - **Progress** - cancellable `PendingOperation` handles for long-running calls
//! - **Ports** - the `ISyncService` trait that adapters implement
//!
//! # Architecture
//!
//! The sync engine depends only on the port defined here. Adapter crates
//! (for example `harmony-dropbox`) translate the port's operations into a
//! specific backend's API and every backend outcome back into `ServiceError`.

pub mod config;
pub mod domain;
pub mod ports;
