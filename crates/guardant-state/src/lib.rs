//! guardant-state — embedded coordination store for GuardAnt.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state for the worker registry, open incidents, and the short-lived
//! status surface, plus the domain types and wire formats shared by every
//! other crate in the workspace.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Records that expire (worker leases, status entries) carry an explicit
//! epoch-ms expiry; reads are lazy about it and purge passes reclaim space.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod directory;
pub mod error;
pub mod retry;
pub mod store;
pub mod tables;
pub mod types;

pub use directory::{ServiceStore, StaticServiceStore};
pub use error::{StateError, StateResult};
pub use retry::RetryPolicy;
pub use store::{STATUS_TTL_MS, StateStore};
pub use types::*;
