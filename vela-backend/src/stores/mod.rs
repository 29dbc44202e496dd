//! Store implementations for remote-state storage

mod gcs;
mod s3;

pub use gcs::GcsStore;
pub use s3::S3Store;

use vela_config::RemoteStateSpec;

use crate::error::{BackendError, BackendResult};
use crate::store::RemoteStore;

/// Create a store for the spec's backend kind.
///
/// Only `s3` and `gcs` have store implementations; every other kind is a
/// pass-through backend that the reconciler forwards without touching.
pub async fn create_store(spec: &RemoteStateSpec) -> BackendResult<Box<dyn RemoteStore>> {
    match spec.backend.as_str() {
        "s3" => {
            let store = S3Store::from_spec(spec).await?;
            Ok(Box::new(store))
        }
        "gcs" => {
            let store = GcsStore::new().await?;
            Ok(Box::new(store))
        }
        other => Err(BackendError::UnsupportedStore(other.to_string())),
    }
}
