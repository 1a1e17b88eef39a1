use async_trait::async_trait;

use crate::{
    error::Result,
    types::{DataType, HistoryRecord, NewSubscription, SubscriptionRecord, UserRecord},
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, chat_id: i64) -> Result<Option<UserRecord>>;
    async fn list_users(&self) -> Result<Vec<UserRecord>>;
    async fn insert_user(&self, chat_id: i64) -> Result<UserRecord>;
    async fn set_connected(&self, chat_id: i64, connected: bool) -> Result<()>;
    async fn set_mqtt_url(&self, chat_id: i64, url: &str) -> Result<()>;
    async fn save_session(&self, chat_id: i64, session: &str) -> Result<()>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Persist a new subscription and return it with its assigned id.
    async fn create_subscription(&self, new: NewSubscription) -> Result<SubscriptionRecord>;
    async fn update_last_value(&self, id: i64, payload: &[u8], message: &str) -> Result<()>;
    async fn delete_subscription(&self, id: i64) -> Result<()>;
    /// Subscriptions of one chat, in creation order.
    async fn list_subscriptions(&self, chat_id: i64) -> Result<Vec<SubscriptionRecord>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store one message and return its id.
    async fn insert_history(
        &self,
        subscription_id: i64,
        data_type: DataType,
        payload: &[u8],
    ) -> Result<i64>;
    /// Oldest first.
    async fn history_for(&self, subscription_id: i64) -> Result<Vec<HistoryRecord>>;
    /// Delete every row with `id <= max_id`; returns the number of rows removed.
    async fn delete_history_up_to(&self, max_id: i64) -> Result<u64>;
}

/// Everything the bridge needs from persistence.
pub trait BridgeStore: UserStore + SubscriptionStore + HistoryStore {}

impl<T: UserStore + SubscriptionStore + HistoryStore> BridgeStore for T {}
