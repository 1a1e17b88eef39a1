use chrono::{DateTime, Utc};

/// Whether a chat event sent at `sent_at` is too old to act on.
///
/// Compared at second resolution; an event exactly `max_age_secs` old is
/// still fresh. Events without a usable timestamp are never stale.
pub fn is_stale(sent_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age_secs: i64) -> bool {
    match sent_at {
        Some(ts) if ts.timestamp() > 0 => ts.timestamp() < now.timestamp() - max_age_secs,
        _ => false,
    }
}
