use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;

const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub(crate) enum ArchiveStoreError {
    #[error("archive {0} not found")]
    NotFound(Uuid),
    #[error("archive store deadline exceeded")]
    Timeout,
    #[error("archive store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque blob store keyed by archive UUID.
#[async_trait]
pub(crate) trait ArchiveStore: Send + Sync {
    async fn save_archive(&self, bytes: &[u8]) -> Result<Uuid, ArchiveStoreError>;
    async fn overwrite_archive(&self, id: Uuid, bytes: &[u8]) -> Result<(), ArchiveStoreError>;
    async fn get_archive_bytes(&self, id: Uuid) -> Result<Vec<u8>, ArchiveStoreError>;
    async fn delete_archive(&self, id: Uuid) -> Result<(), ArchiveStoreError>;
}

#[derive(Debug, Clone)]
pub(crate) struct S3ArchiveStore {
    client: Client,
    bucket: String,
    deadline: Duration,
}

impl S3ArchiveStore {
    /// Static credentials when configured, otherwise the default AWS provider chain.
    pub(crate) async fn from_settings(settings: &Settings) -> Self {
        let s3 = settings.s3();
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.clone())
            .region(aws_config::Region::new(s3.region.clone()));

        if !s3.access_key.is_empty() && !s3.secret_key.is_empty() {
            let creds = Credentials::new(
                s3.access_key.clone(),
                s3.secret_key.clone(),
                None,
                None,
                "gradeflow-static",
            );
            loader = loader.credentials_provider(creds);
        }

        let config = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build(),
        );

        Self {
            client,
            bucket: s3.bucket.clone(),
            deadline: Duration::from_secs(settings.storage().archive_timeout_seconds),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ArchiveStoreError>
    where
        F: Future<Output = Result<T, ArchiveStoreError>>,
    {
        tokio::time::timeout(self.deadline, call).await.map_err(|_| ArchiveStoreError::Timeout)?
    }

    async fn put(&self, id: Uuid, bytes: &[u8]) -> Result<(), ArchiveStoreError> {
        let size = bytes.len();
        let hash_hex = hex::encode(Sha256::digest(bytes));

        self.bounded(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(archive_key(id))
                .content_type(ARCHIVE_CONTENT_TYPE)
                .body(ByteStream::from(bytes.to_vec()))
                .send()
                .await
                .map_err(|err| ArchiveStoreError::Unavailable(err.to_string()))?;
            Ok::<_, ArchiveStoreError>(())
        })
        .await?;

        tracing::debug!(archive_id = %id, size, sha256 = %hash_hex, "Stored archive");
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    async fn save_archive(&self, bytes: &[u8]) -> Result<Uuid, ArchiveStoreError> {
        let id = Uuid::new_v4();
        self.put(id, bytes).await?;
        Ok(id)
    }

    async fn overwrite_archive(&self, id: Uuid, bytes: &[u8]) -> Result<(), ArchiveStoreError> {
        self.put(id, bytes).await
    }

    async fn get_archive_bytes(&self, id: Uuid) -> Result<Vec<u8>, ArchiveStoreError> {
        self.bounded(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(archive_key(id))
                .send()
                .await
                .map_err(|err| {
                    if err.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                        ArchiveStoreError::NotFound(id)
                    } else {
                        ArchiveStoreError::Unavailable(err.to_string())
                    }
                })?;

            let body = output
                .body
                .collect()
                .await
                .map_err(|err| ArchiveStoreError::Unavailable(err.to_string()))?;
            Ok::<_, ArchiveStoreError>(body.into_bytes().to_vec())
        })
        .await
    }

    async fn delete_archive(&self, id: Uuid) -> Result<(), ArchiveStoreError> {
        self.bounded(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(archive_key(id))
                .send()
                .await
                .map_err(|err| ArchiveStoreError::Unavailable(err.to_string()))?;
            Ok::<_, ArchiveStoreError>(())
        })
        .await
    }
}

pub(crate) fn archive_key(id: Uuid) -> String {
    format!("archives/{id}")
}
