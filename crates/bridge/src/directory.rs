use std::{collections::HashMap, sync::Arc};

use {
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    services::Services,
    user::{User, UserHandle},
};

/// Loaded users by chat id.
pub struct UserDirectory {
    services: Arc<Services>,
    users: Mutex<HashMap<i64, UserHandle>>,
}

impl UserDirectory {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached user, loading it from the store or creating it on
    /// first contact.
    pub async fn get_or_create(&self, chat_id: i64) -> Result<UserHandle> {
        let mut users = self.users.lock().await;
        if let Some(handle) = users.get(&chat_id) {
            return Ok(Arc::clone(handle));
        }

        let store = &self.services.store;
        let record = match store.get_user(chat_id).await? {
            Some(record) => record,
            None => {
                info!(chat_id, "new user");
                store.insert_user(chat_id).await?
            },
        };
        let subscriptions = store.list_subscriptions(chat_id).await?;
        debug!(chat_id, subscriptions = subscriptions.len(), "user loaded");

        let session = self.services.sessions.restore(record.session.as_deref());
        let handle = User::new_handle(record.chat_id, record.mqtt_url, subscriptions, session);
        users.insert(chat_id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Reconnect, in the background, every user that was connected when
    /// the process last stopped. Returns the number of reconnects started.
    pub async fn reconnect_all(&self) -> Result<usize> {
        let records = self.services.store.list_users().await?;
        let mut started = 0;
        for record in records
            .into_iter()
            .filter(|r| r.connected && !r.mqtt_url.is_empty())
        {
            let handle = self.get_or_create(record.chat_id).await?;
            let services = Arc::clone(&self.services);
            tokio::spawn(async move {
                let mut user = handle.lock().await;
                let url = user.mqtt_url.clone();
                if let Err(e) = user.connect(&services, &url).await {
                    warn!(chat_id = user.chat_id, error = %e, "startup reconnect failed");
                    user.disconnect(&services).await;
                }
            });
            started += 1;
        }
        if started > 0 {
            info!(count = started, "reconnecting users");
        }
        Ok(started)
    }

    /// Disconnect every loaded user's broker connection. The persisted
    /// connected flag is kept so the next start reconnects them.
    pub async fn shutdown_all(&self) {
        let handles: Vec<UserHandle> = self.users.lock().await.values().cloned().collect();
        for handle in handles {
            handle.lock().await.disconnect_bus().await;
        }
        info!("all broker connections closed");
    }
}
