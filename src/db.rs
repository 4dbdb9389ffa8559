use futures::future::BoxFuture;
use uuid::Uuid;

use crate::candidate::{Candidate, NewCandidate};
use crate::errors::BackendError;

pub mod memory;

pub trait Db {
    fn insert(&self, candidate: NewCandidate) -> BoxFuture<Result<Candidate, BackendError>>;

    fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Candidate>, BackendError>>;

    /// Points the candidate at a new video, returning the ID of the video
    /// it replaces, if any.
    fn attach_video(
        &self,
        id: &Uuid,
        video_id: &Uuid,
    ) -> BoxFuture<Result<Option<Uuid>, BackendError>>;

    /// Returns the IDs of every blob some candidate refers to.
    fn referenced_blobs(&self) -> BoxFuture<Result<Vec<Uuid>, BackendError>>;
}

pub use self::memory::MemoryDb;
pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::PgPool;
    use uuid::Uuid;

    use crate::candidate::{Candidate, NewCandidate};
    use crate::errors::BackendError;

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert(&self, candidate: NewCandidate) -> BoxFuture<Result<Candidate, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, Candidate>(include_str!(
                    "queries/create_candidate.sql"
                ));

                let NewCandidate {
                    profile,
                    resume_file_id,
                } = candidate;

                let inserted = query
                    .bind(&profile.first_name)
                    .bind(&profile.last_name)
                    .bind(&profile.position_applied)
                    .bind(&profile.current_position)
                    .bind(profile.experience_years)
                    .bind(resume_file_id)
                    .fetch_one(&self.pool)
                    .await?;

                Ok(inserted)
            }
            .boxed()
        }

        fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Candidate>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Candidate>(include_str!(
                    "queries/retrieve_candidate.sql"
                ));

                let candidate = query.bind(id).fetch_optional(&self.pool).await?;

                Ok(candidate)
            }
            .boxed()
        }

        fn attach_video(
            &self,
            id: &Uuid,
            video_id: &Uuid,
        ) -> BoxFuture<Result<Option<Uuid>, BackendError>> {
            let id = *id;
            let video_id = *video_id;

            async move {
                let query =
                    sqlx::query_as::<_, (Option<Uuid>,)>(include_str!("queries/attach_video.sql"));

                let row = query
                    .bind(id)
                    .bind(video_id)
                    .fetch_optional(&self.pool)
                    .await?;

                match row {
                    Some((previous,)) => Ok(previous),
                    None => Err(BackendError::NonExistentId(id)),
                }
            }
            .boxed()
        }

        fn referenced_blobs(&self) -> BoxFuture<Result<Vec<Uuid>, BackendError>> {
            async move {
                let query =
                    sqlx::query_as::<_, (Uuid,)>(include_str!("queries/referenced_blobs.sql"));

                let ids = query
                    .fetch_all(&self.pool)
                    .await?
                    .into_iter()
                    .map(|(id,)| id)
                    .collect();

                Ok(ids)
            }
            .boxed()
        }
    }
}
