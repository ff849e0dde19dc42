//! Object-store gateway: presigned upload/download URLs against an
//! S3-compatible bucket (`spec.md` C5).
//!
//! Like [`betterfly_db::DbGateway`], this owns its own small Tokio runtime
//! and exposes a blocking API, since `aws-sdk-s3` is async-only and the
//! dispatcher pool that calls in here is not.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::instrument;

use crate::config::StorageConfig;
use crate::error::StorageError;

const UPLOAD_EXPIRY: Duration = Duration::from_secs(300);
const DOWNLOAD_EXPIRY: Duration = Duration::from_secs(60);

pub struct ObjectStoreGateway {
    client: Client,
    bucket: String,
    rt: tokio::runtime::Runtime,
}

impl ObjectStoreGateway {
    pub fn connect(config: &StorageConfig) -> Result<ObjectStoreGateway, StorageError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("betterfly-storage")
            .enable_all()
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let credentials = Credentials::new(
            config.secret_id.clone(),
            config.secret_key.clone(),
            None,
            None,
            "betterfly-cos-config",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(false)
            .build();

        Ok(ObjectStoreGateway {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            rt,
        })
    }

    /// `spec.md` C5: 300 second expiry, matching the deployment's existing
    /// upload URLs.
    #[instrument(skip(self))]
    pub fn presigned_upload(&self, file_name: &str) -> Result<String, StorageError> {
        self.rt.block_on(async {
            let presigning = PresigningConfig::expires_in(UPLOAD_EXPIRY)
                .map_err(|e| StorageError::Presign(e.to_string()))?;
            let request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(file_name)
                .presigned(presigning)
                .await
                .map_err(|e| StorageError::Presign(e.to_string()))?;
            Ok(request.uri().to_string())
        })
    }

    /// `spec.md` C5: 60 second expiry.
    #[instrument(skip(self))]
    pub fn presigned_download(&self, file_name: &str) -> Result<String, StorageError> {
        self.rt.block_on(async {
            let presigning = PresigningConfig::expires_in(DOWNLOAD_EXPIRY)
                .map_err(|e| StorageError::Presign(e.to_string()))?;
            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(file_name)
                .presigned(presigning)
                .await
                .map_err(|e| StorageError::Presign(e.to_string()))?;
            Ok(request.uri().to_string())
        })
    }
}
