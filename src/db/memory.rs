use std::collections::HashMap;

use futures::future::{BoxFuture, FutureExt};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::candidate::{Candidate, NewCandidate};
use crate::errors::BackendError;

/// Keeps candidates in memory, for local runs and tests.
#[derive(Default)]
pub struct MemoryDb {
    candidates: RwLock<HashMap<Uuid, Candidate>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Default::default()
    }
}

impl super::Db for MemoryDb {
    fn insert(&self, candidate: NewCandidate) -> BoxFuture<Result<Candidate, BackendError>> {
        async move {
            let candidate = Candidate::new(Uuid::new_v4(), OffsetDateTime::now_utc(), candidate);

            self.candidates
                .write()
                .await
                .insert(*candidate.id(), candidate.clone());

            Ok(candidate)
        }
        .boxed()
    }

    fn retrieve(&self, id: &Uuid) -> BoxFuture<Result<Option<Candidate>, BackendError>> {
        let id = *id;

        async move { Ok(self.candidates.read().await.get(&id).cloned()) }.boxed()
    }

    fn attach_video(
        &self,
        id: &Uuid,
        video_id: &Uuid,
    ) -> BoxFuture<Result<Option<Uuid>, BackendError>> {
        let id = *id;
        let video_id = *video_id;

        async move {
            let mut candidates = self.candidates.write().await;

            candidates
                .get_mut(&id)
                .map(|candidate| candidate.set_video_file_id(video_id))
                .ok_or(BackendError::NonExistentId(id))
        }
        .boxed()
    }

    fn referenced_blobs(&self) -> BoxFuture<Result<Vec<Uuid>, BackendError>> {
        async move {
            let candidates = self.candidates.read().await;

            let ids = candidates
                .values()
                .flat_map(|c| {
                    c.resume_file_id()
                        .into_iter()
                        .chain(c.video_file_id())
                        .copied()
                })
                .collect();

            Ok(ids)
        }
        .boxed()
    }
}
