use std::collections::HashMap;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::chunk::Rechunker;
use super::{BlobStream, ListedBlob, NewBlob, Store, StoredBlob};
use crate::errors::BackendError;

struct MemoryBlob {
    blob: StoredBlob,
    chunks: Vec<Bytes>,
    uploaded_at: OffsetDateTime,
}

/// A chunked store that keeps everything in memory, for local runs and
/// tests.
pub struct MemoryStore {
    blobs: RwLock<HashMap<Uuid, MemoryBlob>>,
    chunk_size: usize,
}

impl MemoryStore {
    pub fn new(chunk_size: usize) -> Self {
        MemoryStore {
            blobs: RwLock::new(HashMap::new()),
            chunk_size,
        }
    }

    /// The number of chunks the given blob was split into.
    pub async fn chunk_count(&self, id: &Uuid) -> Option<usize> {
        self.blobs.read().await.get(id).map(|b| b.chunks.len())
    }
}

impl Store for MemoryStore {
    fn save(
        &self,
        blob: NewBlob,
        content: BlobStream,
    ) -> BoxFuture<Result<StoredBlob, BackendError>> {
        async move {
            let mut rechunker = Rechunker::new(self.chunk_size);

            let mut chunks = content
                .map_err(|source| BackendError::BlobStream { source })
                .try_fold(vec![], |mut chunks, data| {
                    chunks.extend(rechunker.push(&data));
                    futures::future::ready(Ok(chunks))
                })
                .await?;

            chunks.extend(rechunker.finish());

            let stored = StoredBlob {
                id: Uuid::new_v4(),
                filename: blob.filename,
                content_type: blob.content_type,
                length: chunks.iter().map(|c| c.len() as u64).sum(),
            };

            self.blobs.write().await.insert(
                stored.id,
                MemoryBlob {
                    blob: stored.clone(),
                    chunks,
                    uploaded_at: OffsetDateTime::now_utc(),
                },
            );

            Ok(stored)
        }
        .boxed()
    }

    fn open(&self, id: &Uuid) -> BoxFuture<Result<Option<(StoredBlob, BlobStream)>, BackendError>> {
        let id = *id;

        async move {
            let blobs = self.blobs.read().await;

            Ok(blobs.get(&id).map(|stored| {
                let chunks: BlobStream =
                    stream::iter(stored.chunks.clone().into_iter().map(Ok)).boxed();
                (stored.blob.clone(), chunks)
            }))
        }
        .boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            self.blobs.write().await.remove(&id);
            Ok(())
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<Result<Vec<ListedBlob>, BackendError>> {
        async move {
            let listed = self
                .blobs
                .read()
                .await
                .iter()
                .map(|(id, stored)| ListedBlob {
                    id: *id,
                    uploaded_at: Some(stored.uploaded_at),
                })
                .collect();

            Ok(listed)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::stream::{self, StreamExt, TryStreamExt};

    use super::*;

    fn pieces(data: &[&'static [u8]]) -> BlobStream {
        let data: Vec<_> = data.iter().map(|d| Ok(Bytes::from_static(*d))).collect();
        stream::iter(data).boxed()
    }

    async fn read_all(stream: BlobStream) -> Vec<u8> {
        stream
            .try_fold(Vec::new(), |mut all, data| async move {
                all.extend_from_slice(&data);
                Ok(all)
            })
            .await
            .expect("read blob stream")
    }

    #[tokio::test]
    async fn content_is_chunked_and_read_back() {
        let store = MemoryStore::new(4);

        let stored = store
            .save(
                NewBlob::new("resume.pdf", "application/pdf"),
                pieces(&[&b"%PDF"[..], &b"-1.4 "[..], &b"hello"[..]]),
            )
            .await
            .expect("save blob");

        assert_eq!(stored.length, 14);
        assert_eq!(store.chunk_count(&stored.id).await, Some(4));

        let (blob, content) = store
            .open(&stored.id)
            .await
            .expect("open blob")
            .expect("blob exists");

        assert_eq!(blob, stored);
        assert_eq!(read_all(content).await, b"%PDF-1.4 hello".to_vec());
    }

    #[tokio::test]
    async fn empty_content_has_no_chunks() {
        let store = MemoryStore::new(4);

        let stored = store
            .save(NewBlob::new("empty.webm", "video/webm"), pieces(&[]))
            .await
            .expect("save blob");

        assert_eq!(stored.length, 0);
        assert_eq!(store.chunk_count(&stored.id).await, Some(0));
    }

    #[tokio::test]
    async fn deleted_blobs_are_gone() {
        let store = MemoryStore::new(4);

        let stored = store
            .save(NewBlob::new("video.webm", "video/webm"), pieces(&[&b"abc"[..]]))
            .await
            .expect("save blob");
        let listed = store.list().await.expect("list blobs");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
        assert!(listed[0].uploaded_at.is_some());

        store.delete(&stored.id).await.expect("delete blob");
        store.delete(&stored.id).await.expect("delete blob twice");

        assert!(store.open(&stored.id).await.expect("open blob").is_none());
        assert!(store.list().await.expect("list blobs").is_empty());
    }
}
