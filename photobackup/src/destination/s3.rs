//! S3 destination for cold storage.
//!
//! Archives of unknown length are uploaded part by part as the stream fills
//! them. A stream that fits in the first part is stored with one `PutObject`.

use super::{Destination, HashCheck};
use crate::config::{DestinationConfig, MIN_PART_SIZE_MIB};
use crate::executor::manifest::CONTENT_HASH_KEY;
use crate::utils::errors::DestinationError;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, StorageClass};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// S3 allows at most this many parts per upload
const MAX_PARTS: i32 = 10_000;

const MIB: usize = 1024 * 1024;

pub struct S3Destination {
    client: Client,
    bucket: String,
    storage_class: StorageClass,
    part_size: usize,
}

impl S3Destination {
    pub async fn from_config(config: &DestinationConfig) -> Result<Self, DestinationError> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| DestinationError::Config("destination.bucket is not set".to_string()))?;

        if config.part_size_mib < MIN_PART_SIZE_MIB {
            return Err(DestinationError::Config(format!(
                "part size must be at least {} MiB",
                MIN_PART_SIZE_MIB
            )));
        }

        let region_provider = match &config.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider(),
        };
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        builder = builder.timeout_config(timeout_config);

        Ok(Self::with_client(
            Client::from_conf(builder.build()),
            bucket,
            StorageClass::from(config.storage_class.as_str()),
            config.part_size_mib as usize * MIB,
        ))
    }

    pub fn with_client(
        client: Client,
        bucket: impl Into<String>,
        storage_class: StorageClass,
        part_size: usize,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            storage_class,
            part_size,
        }
    }

    async fn put_single(
        &self,
        name: &str,
        content_hash: &str,
        data: Bytes,
    ) -> Result<u64, DestinationError> {
        let size = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .storage_class(self.storage_class.clone())
            .metadata(CONTENT_HASH_KEY, content_hash)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| request_error("PutObject", name, e))?;

        Ok(size)
    }

    async fn put_multipart(
        &self,
        name: &str,
        content_hash: &str,
        first: Bytes,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(name)
            .storage_class(self.storage_class.clone())
            .metadata(CONTENT_HASH_KEY, content_hash)
            .send()
            .await
            .map_err(|e| request_error("CreateMultipartUpload", name, e))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| DestinationError::Request {
                operation: "CreateMultipartUpload",
                key: name.to_string(),
                message: "no upload ID returned".to_string(),
            })?
            .to_string();

        match self.upload_parts(name, &upload_id, first, source).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.abort_upload(name, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        name: &str,
        upload_id: &str,
        first: Bytes,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut data = first;

        loop {
            let part_number = parts.len() as i32 + 1;
            if part_number > MAX_PARTS {
                return Err(DestinationError::Request {
                    operation: "UploadPart",
                    key: name.to_string(),
                    message: format!(
                        "archive needs more than {} parts of {} bytes",
                        MAX_PARTS, self.part_size
                    ),
                });
            }

            total += data.len() as u64;
            debug!(object = name, part_number, size = data.len(), "Uploading part");

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(name)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| request_error("UploadPart", name, e))?;

            let etag = response.e_tag().ok_or_else(|| DestinationError::Request {
                operation: "UploadPart",
                key: name.to_string(),
                message: format!("no ETag returned for part {}", part_number),
            })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            data = read_part(source, self.part_size).await?;
            if data.is_empty() {
                break;
            }
        }

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(name)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(|e| request_error("CompleteMultipartUpload", name, e))?;

        Ok(total)
    }

    async fn abort_upload(&self, name: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(name)
            .upload_id(upload_id)
            .send()
            .await;

        match result {
            Ok(_) => debug!(object = name, upload_id, "Aborted multipart upload"),
            Err(e) => warn!(
                object = name,
                upload_id,
                error = %DisplayErrorContext(&e),
                "Failed to abort multipart upload, parts may linger until a lifecycle rule removes them"
            ),
        }
    }
}

#[async_trait]
impl Destination for S3Destination {
    fn describe(&self) -> String {
        format!("s3://{} ({})", self.bucket, self.storage_class.as_str())
    }

    async fn exists(&self, name: &str, content_hash: &str) -> Result<bool, DestinationError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await;

        match result {
            Ok(output) => {
                let recorded = output
                    .metadata()
                    .and_then(|m| m.get(CONTENT_HASH_KEY))
                    .map(String::as_str);
                HashCheck::classify(recorded, content_hash).report(name, content_hash);
                Ok(true)
            }
            Err(e) if e.as_service_error().map(|e| e.is_not_found()) == Some(true) => Ok(false),
            Err(e) => Err(request_error("HeadObject", name, e)),
        }
    }

    async fn write(
        &self,
        name: &str,
        content_hash: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, DestinationError> {
        let first = read_part(source, self.part_size).await?;

        let bytes = if first.len() < self.part_size {
            self.put_single(name, content_hash, first).await?
        } else {
            self.put_multipart(name, content_hash, first, source).await?
        };

        info!(object = name, bucket = %self.bucket, bytes, "Archive uploaded");
        Ok(bytes)
    }
}

/// Read until `part_size` bytes are buffered or the stream ends.
async fn read_part(
    source: &mut (dyn AsyncRead + Send + Unpin),
    part_size: usize,
) -> Result<Bytes, DestinationError> {
    let mut buffer = BytesMut::with_capacity(part_size);
    while buffer.len() < part_size {
        if source.read_buf(&mut buffer).await? == 0 {
            break;
        }
    }
    Ok(buffer.freeze())
}

fn request_error<E>(operation: &'static str, key: &str, error: E) -> DestinationError
where
    E: std::error::Error,
{
    DestinationError::Request {
        operation,
        key: key.to_string(),
        message: DisplayErrorContext(&error).to_string(),
    }
}
