use std::{
    fmt,
    sync::{Arc, Weak},
};

use {
    mqtg_mqtt::{BusConnection, Registration},
    mqtg_store::SubscriptionRecord,
    tokio::sync::Mutex,
    tracing::{error, info},
};

use crate::{
    error::Result,
    registry::{SubscriptionRegistry, UserRecovery},
    services::Services,
    session::SessionMachine,
};

/// Shared handle to a user; the mutex is the per-user serialization lock.
pub type UserHandle = Arc<Mutex<User>>;
/// Non-owning reference to a user's lock.
pub type WeakUser = Weak<Mutex<User>>;
/// A user's live broker connection.
pub type Bus = Arc<dyn BusConnection<SubscriptionRef>>;

/// Identifies a subscription from outside the dispatch path.
///
/// Holds the owner's lock weakly so that bus events and the reconnect
/// callback can synchronize without keeping the user alive.
#[derive(Clone)]
pub struct SubscriptionRef {
    pub id: i64,
    pub owner: WeakUser,
}

impl fmt::Debug for SubscriptionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRef")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A subscription owned by one user.
pub struct Subscription {
    pub record: SubscriptionRecord,
    pub(crate) owner: WeakUser,
}

impl Subscription {
    pub fn reference(&self) -> SubscriptionRef {
        SubscriptionRef {
            id: self.record.id,
            owner: self.owner.clone(),
        }
    }

    pub fn registration(&self) -> Registration<SubscriptionRef> {
        Registration {
            id: self.record.id,
            filter: self.record.topic.clone(),
            qos: self.record.qos,
            target: self.reference(),
        }
    }
}

pub struct User {
    pub chat_id: i64,
    pub mqtt_url: String,
    pub subscriptions: SubscriptionRegistry,
    pub bus: Option<Bus>,
    session: Option<Box<dyn SessionMachine>>,
}

impl User {
    /// Build a user handle whose subscriptions point back at its own lock.
    pub fn new_handle(
        chat_id: i64,
        mqtt_url: String,
        subscriptions: Vec<SubscriptionRecord>,
        session: Box<dyn SessionMachine>,
    ) -> UserHandle {
        Arc::new_cyclic(|owner: &WeakUser| {
            Mutex::new(Self {
                chat_id,
                mqtt_url,
                subscriptions: SubscriptionRegistry::load(owner.clone(), subscriptions),
                bus: None,
                session: Some(session),
            })
        })
    }

    pub fn is_connected(&self) -> bool {
        self.bus.as_ref().is_some_and(|bus| bus.is_connected())
    }

    /// Take the session out for a transition; put it back with
    /// [`User::restore_session`].
    pub(crate) fn take_session(&mut self) -> Option<Box<dyn SessionMachine>> {
        self.session.take()
    }

    pub(crate) fn restore_session(&mut self, session: Box<dyn SessionMachine>) {
        self.session = Some(session);
    }

    /// Replace any existing connection with a new one to `url`.
    ///
    /// Existing subscriptions are registered again by the connection's
    /// recovery callback once it acquires this user's lock.
    pub async fn connect(&mut self, services: &Services, url: &str) -> Result<()> {
        self.disconnect_bus().await;

        let recovery = Arc::new(UserRecovery::new(self.subscriptions.owner()));
        let bus = services.connector.connect(url, recovery).await?;
        self.bus = Some(bus);
        self.mqtt_url = url.to_string();
        info!(chat_id = self.chat_id, "user connected to broker");

        if let Err(e) = services.store.set_mqtt_url(self.chat_id, url).await {
            error!(chat_id = self.chat_id, error = %e, "failed to persist broker url");
        }
        if let Err(e) = services.store.set_connected(self.chat_id, true).await {
            error!(chat_id = self.chat_id, error = %e, "failed to persist connected flag");
        }
        Ok(())
    }

    /// Drop the connection and remember that the user is offline.
    pub async fn disconnect(&mut self, services: &Services) {
        self.disconnect_bus().await;
        if let Err(e) = services.store.set_connected(self.chat_id, false).await {
            error!(chat_id = self.chat_id, error = %e, "failed to persist connected flag");
        }
    }

    /// Close the broker connection, leaving the persisted flag untouched.
    pub async fn disconnect_bus(&mut self) {
        if let Some(bus) = self.bus.take() {
            bus.disconnect().await;
        }
    }
}
