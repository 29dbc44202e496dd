//! Backend reconciler
//!
//! Given a resolved [`RemoteStateSpec`], decide which storage resources need
//! to exist, create the missing ones with secure defaults, and tell the
//! invoker how to initialize the wrapped tool. Reconciliation is a pure
//! function of the spec and the observed remote state: nothing is cached
//! between invocations and every run re-checks the store.

use std::time::Duration;

use hcl::{Map, Value};
use vela_config::RemoteStateSpec;

use crate::error::{BackendError, BackendResult};
use crate::store::{BucketSettings, LockTableSettings, RemoteStore};
use crate::stores;

/// Bound on any single remote-store call. Exceeding it surfaces as a
/// retryable [`BackendError::Timeout`] instead of a silent hang.
pub const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How the invoker should run the wrapped tool's initialization
#[derive(Debug, Clone, PartialEq)]
pub enum InitMode {
    /// Normal initialization with the given backend configuration
    /// (engine-only keys already stripped)
    Full(Map<String, Value>),
    /// Initialization with the state backend explicitly disabled
    BackendDisabled,
}

/// Reconcile a spec against its remote store, creating whatever storage
/// resources are declared but absent.
///
/// `disable_init` short-circuits before any store call. Backend kinds other
/// than `s3` and `gcs` are pass-through: their configuration is forwarded
/// without touching any remote resource.
pub async fn reconcile(spec: &RemoteStateSpec, store: &dyn RemoteStore) -> BackendResult<InitMode> {
    if spec.disable_init {
        tracing::debug!("backend initialization disabled, skipping reconciliation");
        return Ok(InitMode::BackendDisabled);
    }

    match spec.backend.as_str() {
        "s3" => reconcile_s3(spec, store).await?,
        "gcs" => reconcile_gcs(spec, store).await?,
        other => {
            tracing::debug!(backend = other, "pass-through backend, nothing to provision");
        }
    }

    Ok(InitMode::Full(spec.forwarded_config().clone()))
}

/// Convenience wrapper that builds the store for the spec's backend kind.
/// `disable_init` and pass-through kinds never construct a client at all.
pub async fn reconcile_spec(spec: &RemoteStateSpec) -> BackendResult<InitMode> {
    if spec.disable_init {
        return Ok(InitMode::BackendDisabled);
    }
    match spec.backend.as_str() {
        "s3" | "gcs" => {
            let store = stores::create_store(spec).await?;
            reconcile(spec, store.as_ref()).await
        }
        _ => Ok(InitMode::Full(spec.forwarded_config().clone())),
    }
}

async fn reconcile_s3(spec: &RemoteStateSpec, store: &dyn RemoteStore) -> BackendResult<()> {
    if let Some(bucket) = spec.get_string("bucket") {
        if spec.skip_bucket_creation {
            tracing::debug!(bucket, "bucket creation skipped by configuration");
        } else if !with_timeout("bucket_exists", store.bucket_exists(bucket)).await? {
            let settings = BucketSettings {
                name: bucket.to_string(),
                versioning: !spec.skip_bucket_versioning,
                ssencryption: !spec.skip_bucket_ssencryption,
                access_logging: !spec.skip_bucket_accesslogging,
                tags: spec.s3_bucket_tags.clone(),
                project: None,
                location: None,
            };
            with_timeout("create_bucket", store.create_bucket(&settings)).await?;
        }
    }

    if let Some(table) = spec.get_string("dynamodb_table") {
        if !with_timeout("lock_table_exists", store.lock_table_exists(table)).await? {
            let settings = LockTableSettings {
                name: table.to_string(),
                ssencryption: spec.enable_lock_table_ssencryption,
                tags: spec.dynamodb_table_tags.clone(),
            };
            with_timeout("create_lock_table", store.create_lock_table(&settings)).await?;
        }
    }

    Ok(())
}

async fn reconcile_gcs(spec: &RemoteStateSpec, store: &dyn RemoteStore) -> BackendResult<()> {
    // No bucket in the spec means it is supplied externally (e.g. a raw
    // backend-config argument); there is nothing to check.
    let Some(bucket) = spec.get_string("bucket") else {
        tracing::debug!("no bucket declared, assuming externally managed");
        return Ok(());
    };

    if spec.skip_bucket_creation {
        tracing::debug!(bucket, "bucket creation skipped by configuration");
        return Ok(());
    }

    // Required fields are checked before the store is touched at all
    let project = spec
        .get_string("project")
        .ok_or(BackendError::MissingField {
            backend: "gcs",
            field: "project",
        })?;
    let location = spec
        .get_string("location")
        .ok_or(BackendError::MissingField {
            backend: "gcs",
            field: "location",
        })?;

    if with_timeout("bucket_exists", store.bucket_exists(bucket)).await? {
        return Ok(());
    }

    let settings = BucketSettings {
        name: bucket.to_string(),
        versioning: true,
        ssencryption: false,
        access_logging: false,
        tags: spec.gcs_bucket_labels.clone(),
        project: Some(project.to_string()),
        location: Some(location.to_string()),
    };
    with_timeout("create_bucket", store.create_bucket(&settings)).await
}

async fn with_timeout<T>(
    operation: &'static str,
    call: impl Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    match tokio::time::timeout(STORE_CALL_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout { operation }),
    }
}
