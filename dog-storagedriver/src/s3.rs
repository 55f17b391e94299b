use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
    CreateBucketConfiguration, Delete, MetadataDirective, ObjectCannedAcl, ObjectIdentifier,
    ServerSideEncryption,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info};

use crate::{
    ByteStream, DriverError, DriverParameters, DriverResult, ListPage, ObjectDriver, ObjectHead,
    ObjectOptions, ObjectStore, Part, S3DriverConfig, SessionId, StorageDriver, UploadSession,
};

/// Name the S3 driver is registered under
pub const DRIVER_NAME: &str = "s3";

/// How a store error code is treated by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    NotFound,
    UploadNotFound,
    BucketAlreadyOwned,
}

/// S3 error codes with a meaning beyond "transport failure"
const ERROR_CODES: &[(&str, ErrorClass)] = &[
    ("NoSuchKey", ErrorClass::NotFound),
    ("NotFound", ErrorClass::NotFound),
    ("NoSuchUpload", ErrorClass::UploadNotFound),
    ("BucketAlreadyOwnedByYou", ErrorClass::BucketAlreadyOwned),
];

fn classify(code: Option<&str>) -> Option<ErrorClass> {
    let code = code?;
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, class)| *class)
}

fn map_sdk_error<E, R>(err: SdkError<E, R>, subject: &str) -> DriverError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match classify(err.code()) {
        Some(ErrorClass::NotFound) => DriverError::not_found(subject),
        Some(ErrorClass::UploadNotFound) => DriverError::upload_not_found(subject),
        _ => DriverError::transport(err),
    }
}

fn malformed_response(what: &str) -> DriverError {
    DriverError::transport(std::io::Error::new(
        ErrorKind::InvalidData,
        format!("store response missing {}", what),
    ))
}

/// Object store backed by Amazon S3 or an S3-compatible service
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3DriverConfig) -> Self {
        let client = Self::create_client(config).await;
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }

    /// Wrap an already configured client
    pub fn from_client<S: Into<String>>(client: Client, bucket: S, region: S) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    async fn create_client(config: &S3DriverConfig) -> Client {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "dog-storagedriver",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.endpoint.is_some())
                .build(),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, key: &str, range_start: Option<u64>) -> DriverResult<ByteStream> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(start) = range_start {
            request = request.range(format!("bytes={}-", start));
        }

        let result = request.send().await.map_err(|e| map_sdk_error(e, key))?;

        let mut body = result.body;
        let stream = async_stream::stream! {
            loop {
                match body.try_next().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::new(ErrorKind::Other, e));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn head_object(&self, key: &str) -> DriverResult<ObjectHead> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        Ok(ObjectHead {
            size: result.content_length().unwrap_or(0) as u64,
            etag: result.e_tag().map(str::to_string),
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, options: &ObjectOptions) -> DriverResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(AwsByteStream::from(body))
            .content_type(&options.content_type)
            .acl(ObjectCannedAcl::Private);

        if options.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request.send().await.map_err(|e| map_sdk_error(e, key))?;
        Ok(())
    }

    async fn list_sessions(&self, prefix: &str) -> DriverResult<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let result = self
                .client
                .list_multipart_uploads()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, prefix))?;

            for upload in result.uploads() {
                if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                    sessions.push(UploadSession::new(SessionId::from_string(id.to_string()), key));
                }
            }

            if !result.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = result.next_key_marker().map(str::to_string);
            upload_id_marker = result.next_upload_id_marker().map(str::to_string);
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }

        Ok(sessions)
    }

    async fn init_session(&self, key: &str, options: &ObjectOptions) -> DriverResult<UploadSession> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&options.content_type)
            .acl(ObjectCannedAcl::Private);

        if options.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let result = request.send().await.map_err(|e| map_sdk_error(e, key))?;
        let upload_id = result
            .upload_id()
            .ok_or_else(|| malformed_response("upload id"))?;

        Ok(UploadSession::new(
            SessionId::from_string(upload_id.to_string()),
            key,
        ))
    }

    async fn list_parts(&self, session: &UploadSession) -> DriverResult<Vec<Part>> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let result = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(&session.path)
                .upload_id(session.id.as_str())
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(e, session.id.as_str()))?;

            for part in result.parts() {
                let number = part
                    .part_number()
                    .ok_or_else(|| malformed_response("part number"))?;
                parts.push(Part {
                    number: number as u32,
                    size: part.size().unwrap_or(0) as u64,
                    etag: part.e_tag().unwrap_or_default().to_string(),
                });
            }

            if !result.is_truncated().unwrap_or(false) {
                break;
            }
            match result.next_part_number_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        Ok(parts)
    }

    async fn put_part(&self, session: &UploadSession, number: u32, body: Bytes) -> DriverResult<Part> {
        let size = body.len() as u64;
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&session.path)
            .upload_id(session.id.as_str())
            .part_number(number as i32)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, session.id.as_str()))?;

        Ok(Part {
            number,
            size,
            etag: result.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_session(&self, session: &UploadSession, parts: &[Part]) -> DriverResult<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.number as i32)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&session.path)
            .upload_id(session.id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(e, session.id.as_str()))?;
        Ok(())
    }

    async fn copy_object(&self, source: &str, dest: &str, options: &ObjectOptions) -> DriverResult<()> {
        let mut request = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .key(dest)
            .copy_source(format!("{}/{}", self.bucket, source))
            .metadata_directive(MetadataDirective::Copy)
            .content_type(&options.content_type)
            .acl(ObjectCannedAcl::Private);

        if options.encrypt {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        request.send().await.map_err(|e| map_sdk_error(e, source))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> DriverResult<ListPage> {
        let result = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(str::to_string))
            .set_marker(marker.map(str::to_string))
            .max_keys(max_keys.min(i32::MAX as usize) as i32)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, prefix))?;

        let keys: Vec<String> = result
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect();
        let common_prefixes: Vec<String> = result
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        // NextMarker is only sent with a delimiter; otherwise resume after the last key
        let next_marker = if result.is_truncated().unwrap_or(false) {
            result
                .next_marker()
                .map(str::to_string)
                .or_else(|| keys.iter().chain(common_prefixes.iter()).max().cloned())
        } else {
            None
        };

        Ok(ListPage {
            keys,
            common_prefixes,
            next_marker,
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> DriverResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(DriverError::transport)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(DriverError::transport)?;

        let result = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.bucket))?;

        if let Some(failed) = result.errors().first() {
            return Err(DriverError::transport(std::io::Error::new(
                ErrorKind::Other,
                format!(
                    "failed to delete {}: {}",
                    failed.key().unwrap_or_default(),
                    failed.code().unwrap_or("unknown error")
                ),
            )));
        }

        debug!("Deleted {} objects from {}", result.deleted().len(), self.bucket);
        Ok(())
    }

    async fn ensure_bucket(&self) -> DriverResult<()> {
        let mut request = self
            .client
            .create_bucket()
            .bucket(&self.bucket)
            .acl(BucketCannedAcl::Private);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("Created bucket {}", self.bucket);
                Ok(())
            }
            Err(e) if classify(e.code()) == Some(ErrorClass::BucketAlreadyOwned) => {
                debug!("Bucket {} already exists", self.bucket);
                Ok(())
            }
            Err(e) => Err(map_sdk_error(e, &self.bucket)),
        }
    }
}

/// Connect an S3-backed driver, creating the bucket if needed
pub async fn connect(config: S3DriverConfig) -> DriverResult<ObjectDriver> {
    let store = S3ObjectStore::new(&config).await;
    let options = ObjectOptions::new().with_encryption(config.encrypt);
    ObjectDriver::connect(Arc::new(store), config.chunk_rules, options).await
}

/// Registry constructor for the `s3` driver name
pub async fn factory(parameters: DriverParameters) -> DriverResult<Arc<dyn StorageDriver>> {
    let config = S3DriverConfig::from_parameters(&parameters)?;
    let driver = connect(config).await?;
    Ok(Arc::new(driver))
}
