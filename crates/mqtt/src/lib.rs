//! Per-user MQTT broker connections for the bridge.
//!
//! A connection owns its reconnect policy: after the initial bounded
//! connect, every transport failure is absorbed by a capped exponential
//! backoff and surfaces only through [`BusConnection::is_connected`]. Each
//! successful (re)connect pulls a fresh registration snapshot from a
//! [`RecoverySource`] and re-subscribes it.

pub mod backoff;
pub mod client;
pub mod error;
pub mod options;
pub mod router;
pub mod topic;

pub use {
    client::{BusConnection, BusConnector, MqttConnection, MqttConnector, RecoverySource},
    error::{ConnectError, Error, Result},
    options::{BrokerUrl, Transport},
    router::{BusEvent, BusMessage, Registration},
    topic::{filter_matches, is_valid_filter},
};
