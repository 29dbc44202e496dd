//! S3 remote store: state bucket plus DynamoDB lock table

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
    SseSpecification, TableStatus, Tag as DynamoTag,
};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketLoggingStatus, BucketVersioningStatus,
    CreateBucketConfiguration, LoggingEnabled, PublicAccessBlockConfiguration,
    ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration,
    ServerSideEncryptionRule, Tag, Tagging, VersioningConfiguration,
};
use vela_config::RemoteStateSpec;

use crate::error::{BackendError, BackendResult};
use crate::store::{BucketSettings, LockTableSettings, RemoteStore};

/// Primary key attribute of the lock table, fixed by the wrapped tool
const LOCK_TABLE_KEY: &str = "LockID";

/// How long to wait for a freshly created lock table to become active
const TABLE_ACTIVE_ATTEMPTS: u32 = 20;

/// S3-based remote store
pub struct S3Store {
    /// S3 client for the state bucket
    s3: aws_sdk_s3::Client,
    /// DynamoDB client for the lock table
    dynamo: aws_sdk_dynamodb::Client,
    /// Region the bucket lives in, when declared
    region: Option<String>,
}

impl S3Store {
    /// Build clients from the spec's `region` and optional `profile`.
    /// Credential environment variables are picked up by the default chain.
    pub async fn from_spec(spec: &RemoteStateSpec) -> BackendResult<Self> {
        let region = spec.get_string("region").map(str::to_string);

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = spec.get_string("profile") {
            loader = loader.profile_name(profile);
        }
        let aws_config = loader.load().await;

        Ok(Self {
            s3: aws_sdk_s3::Client::new(&aws_config),
            dynamo: aws_sdk_dynamodb::Client::new(&aws_config),
            region,
        })
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn bucket_exists(&self, name: &str) -> BackendResult<bool> {
        let result = self.s3.head_bucket().bucket(name).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found =
                    err.as_service_error().is_some_and(|e| e.is_not_found()) || is_status(&err, 404);
                if not_found {
                    Ok(false)
                } else if is_status(&err, 403) {
                    Err(BackendError::Permission {
                        resource: name.to_string(),
                        message: err.to_string(),
                    })
                } else {
                    Err(store_error(name, &err))
                }
            }
        }
    }

    async fn create_bucket(&self, settings: &BucketSettings) -> BackendResult<()> {
        let mut request = self.s3.create_bucket().bucket(&settings.name);

        // Location constraint is required everywhere except us-east-1
        if let Some(region) = self.region.as_deref().filter(|r| *r != "us-east-1") {
            let constraint = BucketLocationConstraint::from(region);
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            request = request.create_bucket_configuration(config);
        }

        if let Err(err) = request.send().await {
            let already_exists = err.as_service_error().is_some_and(|e| {
                e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
            });
            if already_exists {
                // Benign race with a concurrent module; the bucket is there
                tracing::debug!(bucket = %settings.name, "bucket created concurrently");
                return Ok(());
            }
            return Err(creation_failed(&settings.name, &err));
        }
        tracing::info!(bucket = %settings.name, "created state bucket");

        // Public access is always blocked on buckets we create
        let public_access_block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .block_public_policy(true)
            .ignore_public_acls(true)
            .restrict_public_buckets(true)
            .build();
        self.s3
            .put_public_access_block()
            .bucket(&settings.name)
            .public_access_block_configuration(public_access_block)
            .send()
            .await
            .map_err(|e| creation_failed(&settings.name, &e))?;

        if settings.versioning {
            let versioning = VersioningConfiguration::builder()
                .status(BucketVersioningStatus::Enabled)
                .build();
            self.s3
                .put_bucket_versioning()
                .bucket(&settings.name)
                .versioning_configuration(versioning)
                .send()
                .await
                .map_err(|e| creation_failed(&settings.name, &e))?;
        }

        if settings.ssencryption {
            let by_default = ServerSideEncryptionByDefault::builder()
                .sse_algorithm(ServerSideEncryption::Aes256)
                .build()
                .map_err(|e| BackendError::configuration(e.to_string()))?;
            let rule = ServerSideEncryptionRule::builder()
                .apply_server_side_encryption_by_default(by_default)
                .build();
            let config = ServerSideEncryptionConfiguration::builder()
                .rules(rule)
                .build()
                .map_err(|e| BackendError::configuration(e.to_string()))?;
            self.s3
                .put_bucket_encryption()
                .bucket(&settings.name)
                .server_side_encryption_configuration(config)
                .send()
                .await
                .map_err(|e| creation_failed(&settings.name, &e))?;
        }

        if settings.access_logging {
            // Access logs land in the bucket itself under a fixed prefix
            let logging_enabled = LoggingEnabled::builder()
                .target_bucket(&settings.name)
                .target_prefix("logs/")
                .build()
                .map_err(|e| BackendError::configuration(e.to_string()))?;
            let status = BucketLoggingStatus::builder()
                .logging_enabled(logging_enabled)
                .build();
            self.s3
                .put_bucket_logging()
                .bucket(&settings.name)
                .bucket_logging_status(status)
                .send()
                .await
                .map_err(|e| creation_failed(&settings.name, &e))?;
        }

        if !settings.tags.is_empty() {
            let mut tag_set = Vec::with_capacity(settings.tags.len());
            for (key, value) in &settings.tags {
                let tag = Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
                    .map_err(|e| BackendError::configuration(e.to_string()))?;
                tag_set.push(tag);
            }
            let tagging = Tagging::builder()
                .set_tag_set(Some(tag_set))
                .build()
                .map_err(|e| BackendError::configuration(e.to_string()))?;
            self.s3
                .put_bucket_tagging()
                .bucket(&settings.name)
                .tagging(tagging)
                .send()
                .await
                .map_err(|e| creation_failed(&settings.name, &e))?;
        }

        Ok(())
    }

    async fn lock_table_exists(&self, name: &str) -> BackendResult<bool> {
        let result = self.dynamo.describe_table().table_name(name).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                if not_found {
                    Ok(false)
                } else {
                    Err(store_error(name, &err))
                }
            }
        }
    }

    async fn create_lock_table(&self, settings: &LockTableSettings) -> BackendResult<()> {
        let attribute = AttributeDefinition::builder()
            .attribute_name(LOCK_TABLE_KEY)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| BackendError::configuration(e.to_string()))?;
        let key_schema = KeySchemaElement::builder()
            .attribute_name(LOCK_TABLE_KEY)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| BackendError::configuration(e.to_string()))?;

        let mut request = self
            .dynamo
            .create_table()
            .table_name(&settings.name)
            .attribute_definitions(attribute)
            .key_schema(key_schema)
            .billing_mode(BillingMode::PayPerRequest);

        if settings.ssencryption {
            request = request.sse_specification(SseSpecification::builder().enabled(true).build());
        }
        for (key, value) in &settings.tags {
            let tag = DynamoTag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| BackendError::configuration(e.to_string()))?;
            request = request.tags(tag);
        }

        if let Err(err) = request.send().await {
            let already_exists = err
                .as_service_error()
                .is_some_and(|e| e.is_resource_in_use_exception());
            if already_exists {
                tracing::debug!(table = %settings.name, "lock table created concurrently");
            } else {
                return Err(creation_failed(&settings.name, &err));
            }
        } else {
            tracing::info!(table = %settings.name, "created lock table");
        }

        self.wait_for_active_table(&settings.name).await
    }
}

impl S3Store {
    /// A freshly created table is unusable until it reaches ACTIVE
    async fn wait_for_active_table(&self, name: &str) -> BackendResult<()> {
        for _ in 0..TABLE_ACTIVE_ATTEMPTS {
            let output = self
                .dynamo
                .describe_table()
                .table_name(name)
                .send()
                .await
                .map_err(|e| store_error(name, &e))?;
            let status = output.table().and_then(|t| t.table_status());
            if status == Some(&TableStatus::Active) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Err(BackendError::Transient(format!(
            "lock table {} did not become active",
            name
        )))
    }
}

/// Check the raw HTTP response status of an SDK error
fn is_status<E>(err: &SdkError<E>, status: u16) -> bool {
    err.raw_response()
        .is_some_and(|r| r.status().as_u16() == status)
}

/// Classify an SDK error against the backend taxonomy
fn store_error<E>(resource: &str, err: &SdkError<E>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            BackendError::Transient(err.to_string())
        }
        _ => match err.code() {
            Some("AccessDenied") | Some("AccessDeniedException") | Some("UnauthorizedOperation") => {
                BackendError::Permission {
                    resource: resource.to_string(),
                    message: err.to_string(),
                }
            }
            _ => BackendError::Store(err.to_string()),
        },
    }
}

fn creation_failed<E>(resource: &str, err: &SdkError<E>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match store_error(resource, err) {
        transient @ BackendError::Transient(_) => transient,
        permission @ BackendError::Permission { .. } => permission,
        other => BackendError::CreationFailed {
            resource: resource.to_string(),
            message: other.to_string(),
        },
    }
}
