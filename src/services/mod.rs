pub mod announcements;
pub mod courses;
pub mod materials;
pub mod users;

pub use announcements::Announcements;
pub use courses::Courses;
pub use materials::Materials;
pub use users::Users;

use crate::error::StoreError;
use crate::mirror::materialize;
use crate::models::Record;
use crate::store::{DocumentStore, Query};

/// One-shot read of a newest-first listing.
///
/// Uses the same fallback as live mirrors: without the composite index the
/// store filters and the ordering and limit are applied here.
pub async fn fetch<T: Record>(store: &dyn DocumentStore, query: &Query) -> Result<Vec<T>, StoreError> {
    let docs = match store.query(query).await {
        Err(e) if e.is_index_missing() => {
            tracing::warn!(collection = %query.collection, reason = %e, "query degraded to filter-only");
            store.query(&query.filter_only()).await?
        }
        other => other?,
    };
    materialize(docs, query)
}
