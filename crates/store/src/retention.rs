use tracing::debug;

use crate::{error::Result, store::HistoryStore};

/// Trim history after a write.
///
/// `latest_id` is the id just returned by [`HistoryStore::insert_history`].
/// The cut is taken against the single id sequence shared by every
/// subscription, so a busy subscription can evict rows of a quiet one.
pub async fn enforce_retention(
    store: &dyn HistoryStore,
    latest_id: i64,
    max_records: i64,
) -> Result<u64> {
    if max_records <= 0 || latest_id <= max_records {
        return Ok(0);
    }
    let threshold = latest_id - max_records;
    let deleted = store.delete_history_up_to(threshold).await?;
    if deleted > 0 {
        debug!(threshold, deleted, "history trimmed");
    }
    Ok(deleted)
}
