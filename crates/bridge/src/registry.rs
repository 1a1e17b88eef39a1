use {
    async_trait::async_trait,
    mqtg_mqtt::{RecoverySource, Registration},
    mqtg_store::{NewSubscription, SubscriptionRecord, SubscriptionStore},
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    user::{Bus, Subscription, SubscriptionRef, WeakUser},
};

/// Ordered subscriptions of one user, in creation order.
///
/// Creation and deletion are mirrored to the store and to the user's
/// broker connection.
pub struct SubscriptionRegistry {
    owner: WeakUser,
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub(crate) fn load(owner: WeakUser, records: Vec<SubscriptionRecord>) -> Self {
        let entries = records
            .into_iter()
            .map(|record| Subscription {
                record,
                owner: owner.clone(),
            })
            .collect();
        Self { owner, entries }
    }

    pub fn owner(&self) -> WeakUser {
        self.owner.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn find(&self, id: i64) -> Option<&Subscription> {
        self.entries.iter().find(|s| s.record.id == id)
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut Subscription> {
        self.entries.iter_mut().find(|s| s.record.id == id)
    }

    /// Persist, register with the broker connection and append.
    pub async fn create(
        &mut self,
        store: &dyn SubscriptionStore,
        bus: Option<&Bus>,
        new: NewSubscription,
    ) -> Result<&Subscription> {
        let record = store.create_subscription(new).await?;
        let subscription = Subscription {
            record,
            owner: self.owner.clone(),
        };
        if let Some(bus) = bus {
            bus.subscribe(subscription.registration());
        }
        info!(
            chat_id = subscription.record.chat_id,
            subscription_id = subscription.record.id,
            topic = %subscription.record.topic,
            "subscription created"
        );
        let index = self.entries.len();
        self.entries.push(subscription);
        Ok(&self.entries[index])
    }

    /// Unregister, delete from the store and remove the entry at `index`.
    pub async fn delete(
        &mut self,
        store: &dyn SubscriptionStore,
        bus: Option<&Bus>,
        index: usize,
    ) -> Result<SubscriptionRecord> {
        let subscription = self
            .entries
            .get(index)
            .ok_or_else(|| Error::message(format!("no subscription at position {}", index + 1)))?;
        let (id, topic) = (subscription.record.id, subscription.record.topic.clone());

        if let Some(bus) = bus {
            bus.unsubscribe(id, &topic);
        }
        store.delete_subscription(id).await?;
        info!(subscription_id = id, topic = %topic, "subscription deleted");
        Ok(self.entries.remove(index).record)
    }

    /// Broker registrations for every subscription.
    pub fn registrations(&self) -> Vec<Registration<SubscriptionRef>> {
        self.entries.iter().map(Subscription::registration).collect()
    }
}

/// Reconnect callback of a user's broker connection.
///
/// Locks the user only long enough to snapshot the registrations.
pub struct UserRecovery {
    user: WeakUser,
}

impl UserRecovery {
    pub fn new(user: WeakUser) -> Self {
        Self { user }
    }
}

#[async_trait]
impl RecoverySource<SubscriptionRef> for UserRecovery {
    async fn snapshot(&self) -> Vec<Registration<SubscriptionRef>> {
        let Some(handle) = self.user.upgrade() else {
            debug!("user dropped before recovery");
            return Vec::new();
        };
        let user = handle.lock().await;
        user.subscriptions.registrations()
    }
}
