use std::convert::TryFrom;
use std::io;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::chunk::Rechunker;
use super::{BlobStream, ListedBlob, NewBlob, Store, StoredBlob};
use crate::errors::BackendError;

/// A store that splits each blob into fixed-size chunks kept in
/// PostgreSQL, alongside a header row with the blob's metadata.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    chunk_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        PgStore { pool, chunk_size }
    }
}

// these can be simplified once async functions in traits are stabilized
impl Store for PgStore {
    fn save(
        &self,
        blob: NewBlob,
        content: BlobStream,
    ) -> BoxFuture<Result<StoredBlob, BackendError>> {
        async move {
            let id = Uuid::new_v4();
            let chunk_size = i32::try_from(self.chunk_size)
                .map_err(|_| BackendError::MalformedBlobMetadata(id.to_string()))?;

            // the header row and every chunk land together or not at all
            let mut tx = self.pool.begin().await?;

            sqlx::query(include_str!("../queries/create_blob.sql"))
                .bind(id)
                .bind(&blob.filename)
                .bind(&blob.content_type)
                .bind(chunk_size)
                .execute(&mut tx)
                .await?;

            let mut content = content;
            let mut rechunker = Rechunker::new(self.chunk_size);
            let mut length: u64 = 0;
            let mut count: i32 = 0;

            while let Some(data) = content
                .try_next()
                .await
                .map_err(|source| BackendError::BlobStream { source })?
            {
                length += data.len() as u64;

                for chunk in rechunker.push(&data) {
                    write_chunk(&mut tx, id, count, chunk).await?;
                    count += 1;
                }
            }

            if let Some(chunk) = rechunker.finish() {
                write_chunk(&mut tx, id, count, chunk).await?;
                count += 1;
            }

            sqlx::query(include_str!("../queries/complete_blob.sql"))
                .bind(id)
                .bind(length as i64)
                .bind(count)
                .execute(&mut tx)
                .await?;

            tx.commit().await?;

            Ok(StoredBlob {
                id,
                filename: blob.filename,
                content_type: blob.content_type,
                length,
            })
        }
        .boxed()
    }

    fn open(&self, id: &Uuid) -> BoxFuture<Result<Option<(StoredBlob, BlobStream)>, BackendError>> {
        let id = *id;

        async move {
            let query = sqlx::query(include_str!("../queries/retrieve_blob.sql"));

            let header = query
                .bind(id)
                .try_map(|row: PgRow| {
                    let length: i64 = row.try_get("length")?;
                    let blob = StoredBlob {
                        id: row.try_get("id")?,
                        filename: row.try_get("filename")?,
                        content_type: row.try_get("content_type")?,
                        length: length.max(0) as u64,
                    };
                    let count: i32 = row.try_get("chunk_count")?;

                    Ok((blob, count))
                })
                .fetch_optional(&self.pool)
                .await?;

            Ok(header.map(|(blob, count)| {
                let chunks = stream_chunks(self.pool.clone(), id, count);
                (blob, chunks)
            }))
        }
        .boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            // chunks go with the header through the foreign key
            sqlx::query(include_str!("../queries/delete_blob.sql"))
                .bind(id)
                .execute(&self.pool)
                .await?;

            Ok(())
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<Result<Vec<ListedBlob>, BackendError>> {
        async move {
            let query = sqlx::query_as::<_, (Uuid, OffsetDateTime)>(include_str!(
                "../queries/list_blobs.sql"
            ));

            let listed = query
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|(id, uploaded_at)| ListedBlob {
                    id,
                    uploaded_at: Some(uploaded_at),
                })
                .collect();

            Ok(listed)
        }
        .boxed()
    }
}

async fn write_chunk(
    tx: &mut Transaction<'static, Postgres>,
    id: Uuid,
    n: i32,
    data: Bytes,
) -> Result<(), BackendError> {
    sqlx::query(include_str!("../queries/create_chunk.sql"))
        .bind(id)
        .bind(n)
        .bind(&data[..])
        .execute(tx)
        .await?;

    Ok(())
}

/// Reads the chunks of a blob one query at a time, so only a single
/// chunk is held in memory per reader.
fn stream_chunks(pool: PgPool, id: Uuid, count: i32) -> BlobStream {
    stream::iter(0..count)
        .then(move |n| {
            let pool = pool.clone();

            async move {
                let (data,): (Vec<u8>,) =
                    sqlx::query_as(include_str!("../queries/retrieve_chunk.sql"))
                        .bind(id)
                        .bind(n)
                        .fetch_one(&pool)
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

                Ok::<_, io::Error>(Bytes::from(data))
            }
        })
        .boxed()
}
