//! GCS remote store: state bucket only (locking is handled by the wrapped
//! tool inside the bucket itself)

use std::collections::HashMap;

use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::Error as GcsError;
use google_cloud_storage::http::buckets::Versioning;
use google_cloud_storage::http::buckets::get::GetBucketRequest;
use google_cloud_storage::http::buckets::insert::{
    BucketCreationConfig, InsertBucketParam, InsertBucketRequest,
};

use crate::error::{BackendError, BackendResult};
use crate::store::{BucketSettings, LockTableSettings, RemoteStore};

/// GCS-based remote store
pub struct GcsStore {
    client: Client,
}

impl GcsStore {
    /// Build a client from application-default credentials (the
    /// `GOOGLE_APPLICATION_CREDENTIALS` path or the metadata server).
    pub async fn new() -> BackendResult<Self> {
        let config = ClientConfig::default().with_auth().await.map_err(|e| {
            BackendError::configuration(format!("GCS credentials unavailable: {}", e))
        })?;
        Ok(Self {
            client: Client::new(config),
        })
    }
}

#[async_trait]
impl RemoteStore for GcsStore {
    async fn bucket_exists(&self, name: &str) -> BackendResult<bool> {
        let request = GetBucketRequest {
            bucket: name.to_string(),
            ..Default::default()
        };

        match self.client.get_bucket(&request).await {
            Ok(_) => Ok(true),
            Err(err) => match status_code(&err) {
                Some(404) => Ok(false),
                Some(403) => Err(BackendError::Permission {
                    resource: name.to_string(),
                    message: err.to_string(),
                }),
                _ => Err(store_error(&err)),
            },
        }
    }

    async fn create_bucket(&self, settings: &BucketSettings) -> BackendResult<()> {
        // Validated by the reconciler as well; kept here so the store is
        // safe to use on its own.
        let project = settings.project.as_deref().ok_or(BackendError::MissingField {
            backend: "gcs",
            field: "project",
        })?;
        let location = settings.location.as_deref().ok_or(BackendError::MissingField {
            backend: "gcs",
            field: "location",
        })?;

        let labels: HashMap<String, String> = settings
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let request = InsertBucketRequest {
            name: settings.name.clone(),
            param: InsertBucketParam {
                project: project.to_string(),
                ..Default::default()
            },
            bucket: BucketCreationConfig {
                location: location.to_string(),
                versioning: Some(Versioning {
                    enabled: settings.versioning,
                }),
                labels: if labels.is_empty() { None } else { Some(labels) },
                ..Default::default()
            },
        };

        match self.client.insert_bucket(&request).await {
            Ok(_) => {
                tracing::info!(bucket = %settings.name, "created state bucket");
                Ok(())
            }
            Err(err) if status_code(&err) == Some(409) => {
                // Benign race with a concurrent module; the bucket is there
                tracing::debug!(bucket = %settings.name, "bucket created concurrently");
                Ok(())
            }
            Err(err) => match store_error(&err) {
                transient @ BackendError::Transient(_) => Err(transient),
                other => Err(BackendError::CreationFailed {
                    resource: settings.name.clone(),
                    message: other.to_string(),
                }),
            },
        }
    }

    async fn lock_table_exists(&self, _name: &str) -> BackendResult<bool> {
        // GCS takes its locks inside the bucket; there is no table
        Ok(false)
    }

    async fn create_lock_table(&self, _settings: &LockTableSettings) -> BackendResult<()> {
        Err(BackendError::configuration(
            "GCS remote state has no lock table",
        ))
    }
}

/// HTTP status of a GCS API error, when one is available
fn status_code(err: &GcsError) -> Option<u16> {
    match err {
        GcsError::Response(response) => Some(response.code as u16),
        _ => None,
    }
}

fn store_error(err: &GcsError) -> BackendError {
    match err {
        GcsError::HttpClient(inner) if inner.is_timeout() || inner.is_connect() => {
            BackendError::Transient(err.to_string())
        }
        _ => BackendError::Store(err.to_string()),
    }
}
