//! Amazon S3 object store.
//!
//! Credentials come from the SDK's default provider chain (environment,
//! shared credentials file, instance profile). The region is taken from the
//! same chain, with the configured region as fallback.
//!
//! Bodies below [`MULTIPART_THRESHOLD`] go up in one `PutObject`; larger
//! ones are sent as a multipart upload. Either way every request body is
//! held in memory, so the SDK can resend it when it retries.

use super::{DownloadRequest, ObjectStore, UploadRequest};
use crate::error::{Result, SwingError};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt;
use std::time::Duration;
use tokio::fs::File;
use swing_files::hasher::{self, RunningDigest};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

const MIB: u64 = 1024 * 1024;

/// Bodies of at least this many bytes are sent as a multipart upload
pub const MULTIPART_THRESHOLD: u64 = 16 * MIB;

/// Smallest part Swing sends (S3 accepts 5 MiB and up, except the last)
const MIN_PART_SIZE: u64 = 8 * MIB;

/// S3 limit on parts per upload
const MAX_PARTS: u64 = 10_000;

/// Client settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Region used when the SDK chain provides none
    pub region: Option<String>,
    /// Endpoint override for S3-compatible servers (MinIO, LocalStack)
    pub endpoint: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`)
    pub force_path_style: bool,
    /// Per-operation timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Retries after the first attempt
    pub max_retries: Option<u32>,
}

/// Object store backed by S3
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    sdk_config: SdkConfig,
    settings: S3Settings,
    region: Option<String>,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store")
            .field("region", &self.region)
            .field("endpoint", &self.settings.endpoint)
            .field("force_path_style", &self.settings.force_path_style)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Resolve credentials and region, then build a client
    ///
    /// No request is sent; bad credentials surface on the first transfer.
    pub async fn connect(settings: S3Settings) -> Self {
        let chain = match settings.region.clone() {
            Some(fallback) => RegionProviderChain::default_provider().or_else(Region::new(fallback)),
            None => RegionProviderChain::default_provider(),
        };

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(chain)
            .load()
            .await;
        let region = sdk_config.region().map(ToString::to_string);
        tracing::debug!("S3 session region: {:?}", region);

        let client = build_client(&sdk_config, &settings, None);
        Self {
            client,
            sdk_config,
            settings,
            region,
        }
    }

    async fn put_single(&self, request: UploadRequest<'_>, mut body: File) -> Result<String> {
        let UploadRequest {
            bucket,
            key,
            md5_hex,
            size,
        } = request;

        let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        body.read_to_end(&mut bytes)
            .await
            .map_err(|e| SwingError::transfer(key.to_string(), e.to_string()))?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_md5(content_md5(key, md5_hex)?)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        version_id(output.version_id(), bucket, key)
    }

    async fn put_multipart(&self, request: UploadRequest<'_>, body: File) -> Result<String> {
        let UploadRequest { bucket, key, .. } = request;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| SwingError::transfer(key.to_string(), "no multipart upload id returned"))?
            .to_string();

        tracing::debug!(
            "Multipart upload of {} ({} bytes) started: {}",
            key,
            request.size,
            upload_id
        );

        let parts = match self.put_parts(request, &upload_id, body).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(bucket, key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        match completed {
            Ok(output) => version_id(output.version_id(), bucket, key),
            Err(e) => {
                let err = map_s3_error(e, key);
                self.abort_multipart(bucket, key, &upload_id).await;
                Err(err)
            }
        }
    }

    /// Send `body` part by part, checking the whole against the hashed digest
    async fn put_parts(
        &self,
        request: UploadRequest<'_>,
        upload_id: &str,
        mut body: File,
    ) -> Result<Vec<CompletedPart>> {
        let UploadRequest {
            bucket,
            key,
            md5_hex,
            size,
        } = request;

        let part_size = part_size(size);
        let mut digest = RunningDigest::new();
        let mut parts = Vec::new();
        let mut part_number = 1i32;

        loop {
            let chunk = next_part(&mut body, part_size)
                .await
                .map_err(|e| SwingError::transfer(key.to_string(), e.to_string()))?;
            if chunk.is_empty() {
                break;
            }

            digest.update(&chunk);
            let part_md5 = content_md5(key, &hasher::hash_bytes(&chunk))?;

            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_md5(part_md5)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| map_s3_error(e, key))?;

            let e_tag = output.e_tag().ok_or_else(|| {
                SwingError::transfer(key.to_string(), format!("no ETag for part {part_number}"))
            })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build(),
            );
            part_number += 1;
        }

        if !hasher::digest_matches(&digest.finish(), md5_hex) {
            return Err(SwingError::transfer(
                key.to_string(),
                "file changed after it was hashed",
            ));
        }

        Ok(parts)
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = aborted {
            tracing::warn!(
                "Can't abort multipart upload {} of {}: {}",
                upload_id,
                key,
                DisplayErrorContext(&e)
            );
        }
    }
}

fn build_client(sdk_config: &SdkConfig, settings: &S3Settings, region: Option<&str>) -> Client {
    let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);

    if let Some(region) = region {
        builder = builder.region(Region::new(region.to_string()));
    }
    if let Some(endpoint) = &settings.endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    if settings.force_path_style {
        builder = builder.force_path_style(true);
    }
    if let Some(retries) = settings.max_retries {
        // Max attempts counts the first one
        builder = builder
            .retry_config(RetryConfig::standard().with_max_attempts(retries.saturating_add(1)));
    }
    if let Some(timeout_ms) = settings.timeout_ms {
        builder = builder.timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build(),
        );
    }

    Client::from_conf(builder.build())
}

/// Base64 `Content-MD5` header value for a hex digest
fn content_md5(key: &str, md5_hex: &str) -> Result<String> {
    let digest = hex::decode(md5_hex)
        .map_err(|e| SwingError::transfer(key.to_string(), format!("bad MD5 digest: {e}")))?;
    Ok(BASE64.encode(digest))
}

/// Version id of a put, or an error when versioning is off
fn version_id(returned: Option<&str>, bucket: &str, key: &str) -> Result<String> {
    match returned {
        Some(id) if !id.is_empty() && id != "null" => Ok(id.to_string()),
        _ => Err(SwingError::MissingVersionId {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Part size for a multipart body of `size` bytes
///
/// Whole MiB, at least [`MIN_PART_SIZE`], and large enough that the body
/// fits in [`MAX_PARTS`] parts.
fn part_size(size: u64) -> u64 {
    size.div_ceil(MAX_PARTS)
        .div_ceil(MIB)
        .saturating_mul(MIB)
        .max(MIN_PART_SIZE)
}

/// Read up to `part_size` bytes; empty at end of file
async fn next_part(body: &mut File, part_size: u64) -> std::io::Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(usize::try_from(part_size).unwrap_or_default());
    body.take(part_size).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

fn map_s3_error<E>(err: SdkError<E>, key: &str) -> SwingError
where
    E: std::error::Error + 'static,
{
    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                404 => SwingError::NotFound(key.to_string()),
                403 => SwingError::Forbidden(key.to_string()),
                _ => SwingError::transfer(
                    key.to_string(),
                    format!("HTTP {status}: {}", DisplayErrorContext(&err)),
                ),
            }
        }
        SdkError::TimeoutError(_) => SwingError::transfer(key.to_string(), "S3 request timed out"),
        SdkError::DispatchFailure(_) => SwingError::transfer(
            key.to_string(),
            format!("connection error: {}", DisplayErrorContext(&err)),
        ),
        _ => SwingError::transfer(key.to_string(), DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn with_region(&self, region: &str) -> Self {
        if self.region.as_deref() == Some(region) {
            return self.clone();
        }

        Self {
            client: build_client(&self.sdk_config, &self.settings, Some(region)),
            sdk_config: self.sdk_config.clone(),
            settings: self.settings.clone(),
            region: Some(region.to_string()),
        }
    }

    async fn upload(&self, request: UploadRequest<'_>, body: File) -> Result<String> {
        if request.size < MULTIPART_THRESHOLD {
            self.put_single(request, body).await
        } else {
            self.put_multipart(request, body).await
        }
    }

    async fn download(&self, request: DownloadRequest<'_>, sink: &mut File) -> Result<u64> {
        let DownloadRequest {
            bucket,
            key,
            version_id: version,
        } = request;

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .version_id(version)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        let write_err = |e: std::io::Error| SwingError::transfer(key.to_string(), e.to_string());
        sink.seek(SeekFrom::Start(0)).await.map_err(write_err)?;

        let mut body = output.body;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| SwingError::transfer(key.to_string(), e.to_string()))?
        {
            sink.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        sink.flush().await.map_err(write_err)?;

        Ok(written)
    }
}
