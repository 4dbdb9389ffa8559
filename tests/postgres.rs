//! Runs the PostgreSQL backends against a real database. Skipped unless
//! `BACKEND_DB_CONNECTION_STRING` is set. The migrations are applied
//! first.

use std::collections::HashMap;
use std::env;
use std::io;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use portal::candidate::{NewCandidate, Profile};
use portal::db::{Db, PgDb};
use portal::errors::BackendError;
use portal::store::{BlobStream, NewBlob, PgStore, Store};

const CHUNK_SIZE: usize = 4;

#[tokio::test]
async fn postgres_backends_work() {
    dotenv::dotenv().ok();

    let connection_string = match env::var("BACKEND_DB_CONNECTION_STRING") {
        Ok(connection_string) => connection_string,
        Err(_) => {
            eprintln!("BACKEND_DB_CONNECTION_STRING isn't set, skipping");
            return;
        }
    };

    prepare_db(connection_string.clone()).await;

    let pool = PgPool::connect(&connection_string)
        .await
        .expect("connect to database");

    test_blob_round_trips(&pool).await;
    test_failed_writes(&pool).await;
    test_candidates(&pool).await;
}

async fn test_blob_round_trips(pool: &PgPool) {
    let store = PgStore::new(pool.clone(), CHUNK_SIZE);

    // empty, short of one chunk, exactly one chunk, and a short last chunk
    for size in &[0usize, 3, 4, 10] {
        let data: Vec<u8> = (0..*size).map(|i| i as u8).collect();

        let stored = store
            .save(NewBlob::new("video.webm", "video/webm"), in_pieces(&data, 3))
            .await
            .expect("save blob");
        assert_eq!(stored.length, *size as u64);

        let (chunk_size, chunk_count, length): (i32, i32, i64) =
            sqlx::query_as("SELECT chunk_size, chunk_count, length FROM blobs WHERE id = $1")
                .bind(stored.id)
                .fetch_one(pool)
                .await
                .expect("read blob header");
        assert_eq!(chunk_size as usize, CHUNK_SIZE);
        assert_eq!(chunk_count as usize, (size + CHUNK_SIZE - 1) / CHUNK_SIZE);
        assert_eq!(length as usize, *size);
        assert_eq!(count_chunks(pool, &stored.id).await, i64::from(chunk_count));

        let (blob, content) = store
            .open(&stored.id)
            .await
            .expect("open blob")
            .expect("blob exists");
        assert_eq!(blob, stored);
        assert_eq!(read_all(content).await, data);

        let listed = store.list().await.expect("list blobs");
        let entry = listed
            .iter()
            .find(|b| b.id == stored.id)
            .expect("saved blob is listed");
        assert!(entry.uploaded_at.is_some());

        store.delete(&stored.id).await.expect("delete blob");
        assert!(store.open(&stored.id).await.expect("open blob").is_none());
        assert_eq!(count_chunks(pool, &stored.id).await, 0);
    }

    assert!(store
        .open(&Uuid::new_v4())
        .await
        .expect("open blob")
        .is_none());
}

async fn test_failed_writes(pool: &PgPool) {
    let store = PgStore::new(pool.clone(), CHUNK_SIZE);
    let before = store.list().await.expect("list blobs").len();

    let content: BlobStream = stream::iter(vec![
        Ok(Bytes::from_static(b"0123456789")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ])
    .boxed();

    let result = store
        .save(NewBlob::new("resume.pdf", "application/pdf"), content)
        .await;
    assert!(matches!(result, Err(BackendError::BlobStream { .. })));

    // nothing from the failed write is visible
    assert_eq!(store.list().await.expect("list blobs").len(), before);
}

async fn test_candidates(pool: &PgPool) {
    let db = PgDb::new(pool.clone());
    let resume = Uuid::new_v4();

    let inserted = db
        .insert(NewCandidate::new(profile(), Some(resume)))
        .await
        .expect("insert candidate");
    let id = *inserted.id();

    assert_eq!(inserted.resume_file_id(), Some(&resume));
    assert_eq!(inserted.video_file_id(), None);

    let retrieved = db
        .retrieve(&id)
        .await
        .expect("retrieve candidate")
        .expect("candidate exists");
    assert_eq!(retrieved, inserted);

    let first_video = Uuid::new_v4();
    let second_video = Uuid::new_v4();

    let previous = db
        .attach_video(&id, &first_video)
        .await
        .expect("attach video");
    assert_eq!(previous, None);

    let previous = db
        .attach_video(&id, &second_video)
        .await
        .expect("attach video");
    assert_eq!(previous, Some(first_video));

    let retrieved = db
        .retrieve(&id)
        .await
        .expect("retrieve candidate")
        .expect("candidate exists");
    assert_eq!(retrieved.video_file_id(), Some(&second_video));

    let unknown = Uuid::new_v4();
    assert!(matches!(
        db.attach_video(&unknown, &first_video).await,
        Err(BackendError::NonExistentId(i)) if i == unknown
    ));
    assert!(db
        .retrieve(&unknown)
        .await
        .expect("retrieve candidate")
        .is_none());

    let referenced = db.referenced_blobs().await.expect("list references");
    assert!(referenced.contains(&resume));
    assert!(referenced.contains(&second_video));
    assert!(!referenced.contains(&first_video));
}

fn profile() -> Profile {
    let fields: HashMap<String, String> = vec![
        ("firstName", "Ada"),
        ("lastName", "Lovelace"),
        ("positionApplied", "Analyst"),
        ("currentPosition", "Countess"),
        ("experienceYears", "12"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

    Profile::from_fields(&fields).expect("parse profile")
}

fn in_pieces(data: &[u8], size: usize) -> BlobStream {
    let pieces: Vec<Result<Bytes, io::Error>> = data
        .chunks(size)
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();

    stream::iter(pieces).boxed()
}

async fn read_all(content: BlobStream) -> Vec<u8> {
    content
        .try_fold(Vec::new(), |mut all, data| async move {
            all.extend_from_slice(&data);
            Ok(all)
        })
        .await
        .expect("read blob stream")
}

async fn count_chunks(pool: &PgPool, id: &Uuid) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM blob_chunks WHERE blob_id = $1")
        .bind(*id)
        .fetch_one(pool)
        .await
        .expect("count chunks");

    count
}

async fn prepare_db(connection_string: String) {
    tokio::task::spawn_blocking(move || initialize_db_for_test(&connection_string))
        .await
        .expect("initialize DB");
}

fn initialize_db_for_test(connection_string: &str) {
    use movine::Movine;
    // `movine` only works with the synchronous client
    use postgres::{Client, NoTls};

    let mut client = Client::connect(connection_string, NoTls)
        .expect("create postgres::Client from BACKEND_DB_CONNECTION_STRING");
    let mut movine = Movine::new(&mut client);

    movine.set_migration_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"));

    if movine.status().is_err() {
        movine.initialize().expect("initialize movine");
    }

    movine.up().expect("run movine migrations");
}
