use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::SqlitePool,
};

use crate::{
    error::{Error, Result},
    store::{HistoryStore, SubscriptionStore, UserStore},
    types::{
        DataType, HistoryRecord, NewSubscription, SubscriptionRecord, SubscriptionType, UserRecord,
    },
};

/// SQLite-backed store for users, subscriptions and history.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(sqlx::FromRow)]
struct UserRow {
    chat_id: i64,
    mqtt_url: String,
    connected: bool,
    session: Option<String>,
    created_at: i64,
}

impl From<UserRow> for UserRecord {
    fn from(r: UserRow) -> Self {
        Self {
            chat_id: r.chat_id,
            mqtt_url: r.mqtt_url,
            connected: r.connected,
            session: r.session,
            created_at: from_millis(r.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    chat_id: i64,
    topic: String,
    qos: i64,
    retained: bool,
    data_type: String,
    before_text: String,
    after_text: String,
    json_path: String,
    subscription_type: String,
    last_payload: Option<Vec<u8>>,
    last_message: String,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = Error;

    fn try_from(r: SubscriptionRow) -> Result<Self> {
        let qos = u8::try_from(r.qos)
            .ok()
            .filter(|q| *q <= 2)
            .ok_or_else(|| Error::invalid_value("qos", r.qos.to_string()))?;
        Ok(Self {
            id: r.id,
            chat_id: r.chat_id,
            topic: r.topic,
            qos,
            retained: r.retained,
            data_type: DataType::parse(&r.data_type)?,
            before_text: r.before_text,
            after_text: r.after_text,
            json_path: r.json_path,
            subscription_type: SubscriptionType::parse(&r.subscription_type)?,
            last_payload: r.last_payload.unwrap_or_default(),
            last_message: r.last_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    subscription_id: i64,
    created_at: i64,
    data_type: String,
    payload: Vec<u8>,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = Error;

    fn try_from(r: HistoryRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            subscription_id: r.subscription_id,
            created_at: from_millis(r.created_at),
            data_type: DataType::parse(&r.data_type)?,
            payload: r.payload,
        })
    }
}

const USER_COLUMNS: &str = "chat_id, mqtt_url, connected, session, created_at";
const SUBSCRIPTION_COLUMNS: &str = "id, chat_id, topic, qos, retained, data_type, before_text, \
                                    after_text, json_path, subscription_type, last_payload, \
                                    last_message";

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, chat_id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?"
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY chat_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_user(&self, chat_id: i64) -> Result<UserRecord> {
        let now = Utc::now().timestamp_millis();
        sqlx::query("INSERT OR IGNORE INTO users (chat_id, created_at) VALUES (?, ?)")
            .bind(chat_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        self.get_user(chat_id)
            .await?
            .ok_or(Error::UserNotFound { chat_id })
    }

    async fn set_connected(&self, chat_id: i64, connected: bool) -> Result<()> {
        sqlx::query("UPDATE users SET connected = ? WHERE chat_id = ?")
            .bind(connected)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_mqtt_url(&self, chat_id: i64, url: &str) -> Result<()> {
        sqlx::query("UPDATE users SET mqtt_url = ? WHERE chat_id = ?")
            .bind(url)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_session(&self, chat_id: i64, session: &str) -> Result<()> {
        sqlx::query("UPDATE users SET session = ? WHERE chat_id = ?")
            .bind(session)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn create_subscription(&self, new: NewSubscription) -> Result<SubscriptionRecord> {
        let result = sqlx::query(
            "INSERT INTO subscriptions
             (chat_id, topic, qos, retained, data_type, before_text, after_text,
              json_path, subscription_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.chat_id)
        .bind(&new.topic)
        .bind(i64::from(new.qos))
        .bind(new.retained)
        .bind(new.data_type.as_str())
        .bind(&new.before_text)
        .bind(&new.after_text)
        .bind(&new.json_path)
        .bind(new.subscription_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(SubscriptionRecord::from_new(result.last_insert_rowid(), new))
    }

    async fn update_last_value(&self, id: i64, payload: &[u8], message: &str) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET last_payload = ?, last_message = ? WHERE id = ?")
            .bind(payload)
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_subscription(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_subscriptions(&self, chat_id: i64) -> Result<Vec<SubscriptionRecord>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE chat_id = ? ORDER BY id"
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn insert_history(
        &self,
        subscription_id: i64,
        data_type: DataType,
        payload: &[u8],
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO history (subscription_id, created_at, data_type, payload)
             VALUES (?, ?, ?, ?)",
        )
        .bind(subscription_id)
        .bind(Utc::now().timestamp_millis())
        .bind(data_type.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn history_for(&self, subscription_id: i64) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, subscription_id, created_at, data_type, payload
             FROM history
             WHERE subscription_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_history_up_to(&self, max_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history WHERE id <= ?")
            .bind(max_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
