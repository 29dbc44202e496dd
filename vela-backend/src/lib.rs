//! Vela Backend Reconciliation
//!
//! Before the wrapped tool is initialized, the remote-state storage it points
//! at has to exist. This crate takes a resolved [`RemoteStateSpec`] and makes
//! that true:
//!
//! - [`RemoteStore`] abstracts the storage provider (bucket existence checks,
//!   bucket and lock-table creation with secure defaults)
//! - [`stores`] holds the S3 and GCS implementations plus the
//!   [`stores::create_store`] dispatch
//! - [`reconciler::reconcile`] decides what, if anything, to create and which
//!   [`InitMode`] the invoker should pass to the wrapped tool
//!
//! The reconciler never caches existence across invocations; the remote store
//! is the source of truth and every run re-checks it. Creation calls are
//! idempotent: "already exists" outcomes are treated as success so that
//! concurrent modules sharing one bucket tolerate the benign race.
//!
//! [`RemoteStateSpec`]: vela_config::RemoteStateSpec

pub mod error;
pub mod reconciler;
pub mod store;
pub mod stores;

// Re-export main types for convenience
pub use error::{BackendError, BackendResult};
pub use reconciler::{InitMode, reconcile, reconcile_spec};
pub use store::{BucketSettings, LockTableSettings, RemoteStore};
pub use stores::create_store;
