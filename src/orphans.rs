use std::collections::HashSet;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::environment::SafeDb;
use crate::errors::BackendError;
use crate::store::Store;

/// Finds blobs that no candidate refers to and that were uploaded no
/// later than `cutoff`. Blobs with an unknown upload time are kept.
///
/// The store is listed before the references are read. A blob linked
/// to a candidate in between is then already in the reference set, and
/// a blob saved in between isn't listed at all.
pub async fn find_orphans(
    db: &SafeDb,
    store: &dyn Store,
    cutoff: OffsetDateTime,
) -> Result<Vec<Uuid>, BackendError> {
    let listed = store.list().await?;
    let referenced: HashSet<_> = db.referenced_blobs().await?.into_iter().collect();

    let orphans = listed
        .into_iter()
        .filter(|blob| matches!(blob.uploaded_at, Some(t) if t <= cutoff))
        .map(|blob| blob.id)
        .filter(|id| !referenced.contains(id))
        .collect();

    Ok(orphans)
}
