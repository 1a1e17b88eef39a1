//! Event dispatch core of the MQTT ⇄ Telegram bridge.
//!
//! The [`Dispatcher`] is the only consumer of two queues: bus events coming
//! from every user's broker connection and chat events coming from the chat
//! platform. Each [`User`] sits behind its own lock, which is also what the
//! broker connection's reconnect callback takes to snapshot subscriptions.

pub mod access;
pub mod chat;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod formatter;
pub mod metrics;
pub mod registry;
pub mod services;
pub mod session;
pub mod staleness;
pub mod user;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing;

pub use {
    chat::{Button, ChatEvent, ChatPlatform, Content, Keyboard, Notification},
    directory::UserDirectory,
    dispatch::{BridgeEvent, Dispatcher},
    error::{Error, Result},
    export::{ExportQueue, ExportRequest},
    services::Services,
    session::{MenuSession, MenuSessions, SessionContext, SessionFactory, SessionMachine},
    user::{SubscriptionRef, User, UserHandle},
};
