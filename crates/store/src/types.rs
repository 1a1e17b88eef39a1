use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Classification of a subscription's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Image,
    #[default]
    Other,
}

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "image" => Ok(Self::Image),
            "other" => Ok(Self::Other),
            other => Err(Error::invalid_value("data_type", other)),
        }
    }
}

/// Whether an incoming message is stored, notified, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    #[default]
    NotifyAndStore,
    StoreSilently,
    NotifyWithoutStoring,
}

impl SubscriptionType {
    #[must_use]
    pub fn stores(self) -> bool {
        matches!(self, Self::NotifyAndStore | Self::StoreSilently)
    }

    #[must_use]
    pub fn notifies(self) -> bool {
        matches!(self, Self::NotifyAndStore | Self::NotifyWithoutStoring)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotifyAndStore => "notify_and_store",
            Self::StoreSilently => "store_silently",
            Self::NotifyWithoutStoring => "notify_without_storing",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "notify_and_store" => Ok(Self::NotifyAndStore),
            "store_silently" => Ok(Self::StoreSilently),
            "notify_without_storing" => Ok(Self::NotifyWithoutStoring),
            other => Err(Error::invalid_value("subscription_type", other)),
        }
    }
}

/// Persisted user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub chat_id: i64,
    pub mqtt_url: String,
    pub connected: bool,
    /// Serialized session position, if any transition has been persisted.
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to persist a new subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub chat_id: i64,
    pub topic: String,
    pub qos: u8,
    pub retained: bool,
    pub data_type: DataType,
    pub before_text: String,
    pub after_text: String,
    pub json_path: String,
    pub subscription_type: SubscriptionType,
}

/// Persisted subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub chat_id: i64,
    pub topic: String,
    pub qos: u8,
    pub retained: bool,
    pub data_type: DataType,
    pub before_text: String,
    pub after_text: String,
    pub json_path: String,
    pub subscription_type: SubscriptionType,
    pub last_payload: Vec<u8>,
    pub last_message: String,
}

impl SubscriptionRecord {
    pub(crate) fn from_new(id: i64, new: NewSubscription) -> Self {
        Self {
            id,
            chat_id: new.chat_id,
            topic: new.topic,
            qos: new.qos,
            retained: new.retained,
            data_type: new.data_type,
            before_text: new.before_text,
            after_text: new.after_text,
            json_path: new.json_path,
            subscription_type: new.subscription_type,
            last_payload: Vec::new(),
            last_message: String::new(),
        }
    }
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub subscription_id: i64,
    pub created_at: DateTime<Utc>,
    pub data_type: DataType,
    pub payload: Vec<u8>,
}
