//! Metric names recorded by the bridge.
//!
//! Recording goes through the `metrics` facade, so every call is a no-op
//! until the binary installs an exporter.

pub use ::metrics::counter;

/// Chat events that passed the staleness filter
pub const CHAT_EVENTS_RECEIVED_TOTAL: &str = "mqtg_chat_events_received_total";
/// Chat events dropped for being older than the configured maximum age
pub const CHAT_EVENTS_STALE_TOTAL: &str = "mqtg_chat_events_stale_total";
/// Chat events rejected by the allow-list
pub const ACCESS_CONTROL_DENIALS_TOTAL: &str = "mqtg_access_control_denials_total";
/// Broker messages handled for a live subscription
pub const BUS_MESSAGES_RECEIVED_TOTAL: &str = "mqtg_bus_messages_received_total";
/// Subscription notifications delivered to a chat
pub const NOTIFICATIONS_SENT_TOTAL: &str = "mqtg_notifications_sent_total";
/// Subscription notifications the chat platform refused
pub const NOTIFICATION_ERRORS_TOTAL: &str = "mqtg_notification_errors_total";
/// Export requests queued, labelled by `result` (accepted, dropped)
pub const EXPORT_REQUESTS_TOTAL: &str = "mqtg_export_requests_total";
