//! S3 backend built on the blocking rust-s3 API
//!
//! Uploads below one chunk go out as a single PutObject. Larger uploads are
//! driven part by part so that metadata and server-side encryption headers
//! travel only on the request that creates the object; S3 rejects them on
//! UploadPart and CompleteMultipartUpload.

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use s3::bucket::{Bucket, CHUNK_SIZE};
use s3::creds::Credentials;
use s3::region::Region;
use s3::serde_types::Part;
use tracing::{debug, warn};

use super::{ObjectStore, PutRequest, RemoteObject};
use crate::error::{BackupError, BackupResult};

const META_HEADER_PREFIX: &str = "x-amz-meta-";
const SSE_HEADER: &str = "x-amz-server-side-encryption";
const SSE_KEY_HEADER: &str = "x-amz-server-side-encryption-aws-kms-key-id";
const CONTENT_TYPE: &str = "application/octet-stream";

pub struct S3Store {
    bucket: Bucket,
}

impl S3Store {
    /// Connect using the standard AWS credential chain
    pub fn connect(bucket: &str, region: &str, endpoint: Option<&str>) -> BackupResult<Self> {
        let creds = Credentials::default()
            .map_err(|e| BackupError::Config(format!("No AWS credentials available: {}", e)))?;
        Self::with_credentials(bucket, region, endpoint, creds)
    }

    pub fn with_credentials(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        creds: Credentials,
    ) -> BackupResult<Self> {
        let region_value = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse::<Region>()
                .map_err(|e| BackupError::Config(format!("Invalid region '{}': {}", region, e)))?,
        };

        let mut bucket = Bucket::new(bucket, region_value, creds)
            .map_err(|e| BackupError::Config(format!("Failed to open bucket: {}", e)))?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }

    /// A bucket handle that sends `headers` on every request
    fn bucket_with(&self, headers: &[(String, String)]) -> Bucket {
        let mut bucket = self.bucket.clone();
        for (name, value) in headers {
            bucket.add_header(name, value);
        }
        bucket
    }

    fn put_multipart(
        &self,
        key: &str,
        first: Vec<u8>,
        data: &mut dyn Read,
        headers: &[(String, String)],
    ) -> BackupResult<()> {
        let initiated = self
            .bucket_with(headers)
            .initiate_multipart_upload(key, CONTENT_TYPE)
            .map_err(|e| BackupError::Upload(format!("{}: {}", key, e)))?;
        let upload_id = initiated.upload_id;

        let result = self.upload_parts(key, &upload_id, first, data);
        if result.is_err() {
            if let Err(e) = self.bucket.abort_upload(key, &upload_id) {
                warn!(key, upload_id = %upload_id, error = %e, "multipart upload not aborted");
            }
        }
        result
    }

    fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        data: &mut dyn Read,
    ) -> BackupResult<()> {
        let mut parts: Vec<Part> = Vec::new();
        let mut chunk = first;
        loop {
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < CHUNK_SIZE;
            let part_number = parts.len() as u32 + 1;
            let part = self
                .bucket
                .put_multipart_chunk(chunk, key, part_number, upload_id, CONTENT_TYPE)
                .map_err(|e| BackupError::Upload(format!("{} part {}: {}", key, part_number, e)))?;
            debug!(key, part_number, "part uploaded");
            parts.push(part);
            if last {
                break;
            }
            chunk = read_chunk(data)?;
        }

        let response = self
            .bucket
            .complete_multipart_upload(key, upload_id, parts)
            .map_err(|e| BackupError::Upload(format!("{}: {}", key, e)))?;
        expect_success(response.status_code(), key, BackupError::Upload)?;
        // CompleteMultipartUpload can fail after the 200 has been sent
        if response.as_str().map(|body| body.contains("<Error>")).unwrap_or(false) {
            return Err(BackupError::Upload(format!(
                "{}: multipart upload not completed",
                key
            )));
        }
        Ok(())
    }
}

impl ObjectStore for S3Store {
    fn put(&self, key: &str, data: &mut dyn Read, request: &PutRequest) -> BackupResult<()> {
        let headers = creation_headers(request)?;
        let first = read_chunk(data)?;

        if first.len() < CHUNK_SIZE {
            let response = self
                .bucket_with(&headers)
                .put_object_with_content_type(key, &first, CONTENT_TYPE)
                .map_err(|e| BackupError::Upload(format!("{}: {}", key, e)))?;
            expect_success(response.status_code(), key, BackupError::Upload)?;
        } else {
            self.put_multipart(key, first, data, &headers)?;
        }
        debug!(key, "object uploaded");
        Ok(())
    }

    /// On error `writer` may hold part of the body or the error document
    fn get(&self, key: &str, writer: &mut (dyn Write + Send)) -> BackupResult<u64> {
        let mut counting = CountingWriter {
            inner: writer,
            written: 0,
        };
        let code = self
            .bucket
            .get_object_to_writer(key, &mut counting)
            .map_err(|e| BackupError::Download(format!("{}: {}", key, e)))?;

        match code {
            200 => Ok(counting.written),
            404 => Err(BackupError::object_not_found(key)),
            code => Err(BackupError::Download(format!(
                "{}: status code {}",
                key, code
            ))),
        }
    }

    fn list(&self, prefix: &str) -> BackupResult<Vec<RemoteObject>> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .map_err(|e| BackupError::Download(format!("Failed to list {}: {}", prefix, e)))?;

        let mut objects = Vec::new();
        for page in pages {
            for object in page.contents {
                let last_modified = parse_last_modified(&object.key, &object.last_modified);
                objects.push(RemoteObject {
                    key: object.key,
                    last_modified,
                    size: object.size,
                });
            }
        }
        Ok(objects)
    }

    fn delete(&self, key: &str) -> BackupResult<()> {
        let response = self
            .bucket
            .delete_object(key)
            .map_err(|e| BackupError::Delete(format!("{}: {}", key, e)))?;
        expect_success(response.status_code(), key, BackupError::Delete)
    }

    fn exists(&self, key: &str) -> BackupResult<bool> {
        let (_, code) = self
            .bucket
            .head_object(key)
            .map_err(|e| BackupError::Download(format!("{}: {}", key, e)))?;
        match code {
            200 => Ok(true),
            404 => Ok(false),
            code => Err(BackupError::Download(format!(
                "{}: status code {}",
                key, code
            ))),
        }
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket.name(), key)
    }
}

/// Fail unless `code` is 2xx
fn expect_success(code: u16, key: &str, fail: fn(String) -> BackupError) -> BackupResult<()> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(fail(format!("{}: status code {}", key, code)))
    }
}

/// Metadata and server-side encryption headers for the creating request
fn creation_headers(request: &PutRequest) -> BackupResult<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for (name, value) in &request.metadata {
        let header = format!("{}{}", META_HEADER_PREFIX, name.to_lowercase());
        if !is_header_name(&header) || !is_header_value(value) {
            return Err(BackupError::Upload(format!(
                "metadata '{}' cannot be sent as a header",
                name
            )));
        }
        headers.push((header, value.clone()));
    }

    if let Some(sse) = &request.server_side {
        if !is_header_value(&sse.key_id) {
            return Err(BackupError::Upload(format!(
                "key id '{}' cannot be sent as a header",
                sse.key_id
            )));
        }
        headers.push((SSE_HEADER.to_string(), "aws:kms".to_string()));
        headers.push((SSE_KEY_HEADER.to_string(), sse.key_id.clone()));
    }
    Ok(headers)
}

fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

fn is_header_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}

/// Up to one chunk; shorter only at end of input
fn read_chunk(reader: &mut dyn Read) -> BackupResult<Vec<u8>> {
    let mut chunk = Vec::new();
    Read::take(&mut *reader, CHUNK_SIZE as u64)
        .read_to_end(&mut chunk)
        .map_err(|e| BackupError::Io(format!("Failed to read upload body: {}", e)))?;
    Ok(chunk)
}

fn parse_last_modified(key: &str, raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            warn!(key, value = raw, error = %e, "unparseable LastModified, listing it as oldest");
            DateTime::<Utc>::default()
        }
    }
}

struct CountingWriter<'a> {
    inner: &'a mut (dyn Write + Send),
    written: u64,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
