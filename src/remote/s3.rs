//! S3 implementation of the remote bucket.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, PublicAccessBlockConfiguration,
};
use aws_sdk_s3::Client;

use super::{RemoteBucket, RemoteConfig, RemoteError, Result};

pub struct S3Bucket {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Bucket {
    /// Build a client for the configured region.
    pub async fn connect(config: RemoteConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket,
            region: config.region,
        }
    }
}

#[async_trait]
impl RemoteBucket for S3Bucket {
    async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::debug!(bucket = %self.bucket, "bucket exists");
                return Ok(());
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(RemoteError::Api(service_error.to_string()));
                }
            }
        }

        tracing::info!(bucket = %self.bucket, region = %self.region, "creating bucket");
        let location = CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
            .build();
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .create_bucket_configuration(location)
            .send()
            .await
            .map_err(|e| RemoteError::Api(e.to_string()))?;

        // Private bucket: block all public access forms.
        self.client
            .put_public_access_block()
            .bucket(&self.bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(true)
                    .restrict_public_buckets(true)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| RemoteError::Api(e.to_string()))?;

        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(RemoteError::Api(service_error.to_string()))
                }
            }
        }
    }

    async fn upload(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| RemoteError::Api("upload path has no file name".into()))?;

        tracing::info!(bucket = %self.bucket, object = %name, "uploading object");
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| RemoteError::Api(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&name)
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteError::Api(e.to_string()))?;
        Ok(())
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<u64> {
        tracing::info!(bucket = %self.bucket, object = %name, "downloading object");
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    RemoteError::NotFound(name.to_string())
                } else {
                    RemoteError::Api(service_error.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| RemoteError::Api(e.to_string()))?
            .into_bytes();
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| RemoteError::Api(e.to_string()))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    names.push(key.to_string());
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        Ok(names)
    }
}
