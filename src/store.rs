use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use rusoto_core::RusotoError;
use rusoto_s3::{
    DeleteObjectRequest, GetObjectError, GetObjectRequest, ListObjectsV2Request, Object,
    PutObjectRequest, S3Client, StreamingBody, S3,
};
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::errors::{BackendError, ConfigError};

pub mod chunk;
pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// Blob content, produced or consumed one buffer at a time.
pub type BlobStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// The metadata supplied when saving a blob.
#[derive(Clone, Debug, PartialEq)]
pub struct NewBlob {
    pub filename: String,
    pub content_type: String,
}

impl NewBlob {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }
}

/// A blob that has been written to a store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredBlob {
    /// The ID assigned by the store.
    pub id: Uuid,

    /// The name the blob was uploaded with.
    pub filename: String,

    /// The MIME type the blob was uploaded with.
    pub content_type: String,

    /// The size of the content in bytes.
    pub length: u64,
}

/// An entry in a store's listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ListedBlob {
    pub id: Uuid,

    /// When the blob was written, if the store knows.
    pub uploaded_at: Option<OffsetDateTime>,
}

pub trait Store: Send + Sync {
    /// Saves the content under a newly generated ID.
    fn save(&self, blob: NewBlob, content: BlobStream)
        -> BoxFuture<Result<StoredBlob, BackendError>>;

    /// Opens the given blob for reading, if it exists.
    fn open(&self, id: &Uuid) -> BoxFuture<Result<Option<(StoredBlob, BlobStream)>, BackendError>>;

    /// Deletes the given blob. Deleting a missing blob isn't an error.
    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    /// Lists all stored blobs.
    fn list(&self) -> BoxFuture<Result<Vec<ListedBlob>, BackendError>>;
}

/// Wraps an in-memory buffer as a single-item stream.
pub fn stream_from_bytes(data: impl Into<Bytes>) -> BlobStream {
    futures::stream::once(futures::future::ready(Ok(data.into()))).boxed()
}

const FILENAME_METADATA: &str = "filename";

/// A store that saves each blob as one object in an S3 bucket.
pub struct S3Store {
    client: Arc<S3Client>,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(client: Arc<S3Client>, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY")?;
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY")?;

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME")?,
            endpoint: get_variable("S3_ENDPOINT")?,
        };

        let bucket = get_variable("S3_BUCKET_NAME")?;
        let prefix = get_variable("S3_KEY_PREFIX").unwrap_or_default();

        let http_client = HttpClient::new().map_err(|e| ConfigError::Invalid {
            name: "S3_ENDPOINT",
            value: e.to_string(),
        })?;

        let client = Arc::new(S3Client::new_with(
            http_client,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        Ok(S3Store::new(client, bucket, prefix))
    }

    fn key(&self, id: &Uuid) -> String {
        format!("{}{}", self.prefix, id)
    }
}

impl Store for S3Store {
    fn save(
        &self,
        blob: NewBlob,
        content: BlobStream,
    ) -> BoxFuture<Result<StoredBlob, BackendError>> {
        upload(self, blob, content).boxed()
    }

    fn open(&self, id: &Uuid) -> BoxFuture<Result<Option<(StoredBlob, BlobStream)>, BackendError>> {
        download(self, *id).boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        delete(self, *id).boxed()
    }

    fn list(&self) -> BoxFuture<Result<Vec<ListedBlob>, BackendError>> {
        list(self).boxed()
    }
}

async fn upload(
    store: &S3Store,
    blob: NewBlob,
    content: BlobStream,
) -> Result<StoredBlob, BackendError> {
    use std::convert::TryFrom;

    // S3 needs the length up front, so the content is gathered first
    let raw: Vec<u8> = content
        .try_fold(Vec::new(), |mut raw, bytes| async move {
            raw.extend_from_slice(&bytes);
            Ok(raw)
        })
        .await
        .map_err(|source| BackendError::BlobStream { source })?;

    let id = Uuid::new_v4();
    let length = raw.len() as u64;
    let content_length = i64::try_from(length)
        .map_err(|_| BackendError::MalformedBlobMetadata(id.to_string()))?;

    let mut metadata = HashMap::new();
    metadata.insert(FILENAME_METADATA.to_owned(), blob.filename.clone());

    let request = PutObjectRequest {
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        content_length: Some(content_length),
        content_type: Some(blob.content_type.clone()),
        key: store.key(&id),
        metadata: Some(metadata),
        ..Default::default()
    };

    store
        .client
        .put_object(request)
        .await
        .map_err(|source| BackendError::UploadFailed { source })?;

    Ok(StoredBlob {
        id,
        filename: blob.filename,
        content_type: blob.content_type,
        length,
    })
}

async fn download(
    store: &S3Store,
    id: Uuid,
) -> Result<Option<(StoredBlob, BlobStream)>, BackendError> {
    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key: store.key(&id),
        ..Default::default()
    };

    let output = match store.client.get_object(request).await {
        Ok(output) => output,
        Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => return Ok(None),
        Err(source) => return Err(BackendError::DownloadFailed { source }),
    };

    let filename = output
        .metadata
        .as_ref()
        .and_then(|m| m.get(FILENAME_METADATA))
        .cloned()
        .unwrap_or_else(|| id.to_string());
    let content_type = output
        .content_type
        .clone()
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
    let length = output.content_length.unwrap_or(0).max(0) as u64;

    let stream: BlobStream = match output.body {
        Some(body) => body.boxed(),
        None => futures::stream::empty::<Result<Bytes, io::Error>>().boxed(),
    };

    let blob = StoredBlob {
        id,
        filename,
        content_type,
        length,
    };

    Ok(Some((blob, stream)))
}

async fn delete(store: &S3Store, id: Uuid) -> Result<(), BackendError> {
    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key: store.key(&id),
        ..Default::default()
    };

    store
        .client
        .delete_object(request)
        .await
        .map(|_| ())
        .map_err(|source| BackendError::DeleteFailed { source })
}

async fn list(store: &S3Store) -> Result<Vec<ListedBlob>, BackendError> {
    let mut listed = vec![];
    let mut continuation_token = None;

    loop {
        let request = ListObjectsV2Request {
            bucket: store.bucket.clone(),
            prefix: Some(store.prefix.clone()),
            continuation_token: continuation_token.take(),
            ..Default::default()
        };

        let output = store
            .client
            .list_objects_v2(request)
            .await
            .map_err(|source| BackendError::ListFailed { source })?;

        // objects that don't follow the naming scheme belong to someone else
        listed.extend(
            output
                .contents
                .unwrap_or_default()
                .into_iter()
                .filter_map(|object| listed_object(&store.prefix, object)),
        );

        match output.next_continuation_token {
            Some(token) if output.is_truncated.unwrap_or(false) => {
                continuation_token = Some(token)
            }
            _ => break,
        }
    }

    Ok(listed)
}

fn listed_object(prefix: &str, object: Object) -> Option<ListedBlob> {
    let id = object
        .key
        .as_deref()
        .and_then(|key| key.strip_prefix(prefix))
        .and_then(|id| Uuid::parse_str(id).ok())?;

    Some(ListedBlob {
        id,
        uploaded_at: object.last_modified.as_deref().and_then(parse_last_modified),
    })
}

/// Parses an S3 `LastModified` value such as `2021-03-04T05:06:07.000Z`.
/// Fractional seconds are dropped.
fn parse_last_modified(value: &str) -> Option<OffsetDateTime> {
    let seconds = value.get(..19)?;

    PrimitiveDateTime::parse(seconds, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_objects_need_an_id_under_the_prefix() {
        let id = Uuid::new_v4();
        let object = |key: String| Object {
            key: Some(key),
            last_modified: Some("2021-03-04T05:06:07.000Z".to_owned()),
            ..Default::default()
        };

        let listed = listed_object("blobs/", object(format!("blobs/{}", id))).expect("list blob");
        assert_eq!(listed.id, id);
        assert_eq!(
            listed.uploaded_at.map(|t| t.unix_timestamp()),
            Some(1_614_834_367)
        );

        assert!(listed_object("blobs/", object(format!("other/{}", id))).is_none());
        assert!(listed_object("blobs/", object("blobs/readme.txt".to_owned())).is_none());
    }

    #[test]
    fn unreadable_modification_times_are_unknown() {
        assert_eq!(parse_last_modified("yesterday"), None);
        assert_eq!(parse_last_modified(""), None);
    }
}
