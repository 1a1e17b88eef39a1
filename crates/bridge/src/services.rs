use std::sync::Arc;

use {
    mqtg_config::MqtgConfig,
    mqtg_mqtt::BusConnector,
    mqtg_store::BridgeStore,
};

use crate::{chat::ChatPlatform, session::SessionFactory, user::SubscriptionRef};

/// Collaborators shared by the dispatcher, the user directory and sessions.
pub struct Services {
    pub config: Arc<MqtgConfig>,
    pub store: Arc<dyn BridgeStore>,
    pub connector: Arc<dyn BusConnector<SubscriptionRef>>,
    pub platform: Arc<dyn ChatPlatform>,
    pub sessions: Arc<dyn SessionFactory>,
}
