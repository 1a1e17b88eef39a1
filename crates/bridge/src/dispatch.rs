//! The dispatch loop: one consumer for bus events and chat events.

use std::sync::Arc;

use {
    chrono::{DateTime, Local, Utc},
    mqtg_mqtt::BusEvent,
    mqtg_store::{DataType, enforce_retention},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    access::is_allowed,
    chat::{ChatEvent, Content, Notification, deliver},
    directory::UserDirectory,
    export::{ExportQueue, ExportRequest},
    formatter::format_message,
    metrics::{self as bridge_metrics, counter},
    services::Services,
    session::{EXPORT_PREFIX, SessionContext},
    staleness::is_stale,
    user::{SubscriptionRef, User},
};

pub const STATUS_COMMAND: &str = "/status";
pub const EXPORT_COMMAND_PREFIX: &str = "/export_";

/// A bus message paired with the subscription it matched.
pub type BridgeEvent = BusEvent<SubscriptionRef>;

pub struct Dispatcher {
    services: Arc<Services>,
    directory: Arc<UserDirectory>,
    exports: ExportQueue,
    bus_events: mpsc::Receiver<BridgeEvent>,
    chat_events: mpsc::Receiver<ChatEvent>,
}

impl Dispatcher {
    pub fn new(
        services: Arc<Services>,
        directory: Arc<UserDirectory>,
        exports: ExportQueue,
        bus_events: mpsc::Receiver<BridgeEvent>,
        chat_events: mpsc::Receiver<ChatEvent>,
    ) -> Self {
        Self {
            services,
            directory,
            exports,
            bus_events,
            chat_events,
        }
    }

    /// Process events until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("dispatcher started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(event) = self.bus_events.recv() => self.handle_bus_event(event).await,
                Some(event) = self.chat_events.recv() => self.handle_chat_event(event).await,
            }
        }
        info!("dispatcher stopped");
    }

    pub async fn handle_bus_event(&self, event: BridgeEvent) {
        let BusEvent { message, target } = event;
        if message.retained {
            debug!(topic = %message.topic, "ignoring retained message");
            return;
        }
        let Some(handle) = target.owner.upgrade() else {
            debug!(subscription_id = target.id, "owner gone, dropping message");
            return;
        };

        let mut user = handle.lock().await;
        let chat_id = user.chat_id;
        let Some(subscription) = user.subscriptions.find_mut(target.id) else {
            debug!(subscription_id = target.id, "subscription removed, dropping message");
            return;
        };
        counter!(bridge_metrics::BUS_MESSAGES_RECEIVED_TOTAL).increment(1);

        let formatted = format_message(&subscription.record, &message.topic, &message.payload);
        subscription.record.last_payload = formatted.payload.clone();
        subscription.record.last_message = formatted.text.clone();
        let record = subscription.record.clone();
        debug!(chat_id, subscription_id = record.id, topic = %message.topic, "bus message");

        let store = self.services.store.as_ref();
        if let Err(e) = store
            .update_last_value(record.id, &formatted.payload, &formatted.text)
            .await
        {
            error!(subscription_id = record.id, error = %e, "failed to save last value");
            return;
        }

        if record.subscription_type.stores() {
            let latest = match store
                .insert_history(record.id, record.data_type, &formatted.payload)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    error!(subscription_id = record.id, error = %e, "failed to store history");
                    return;
                },
            };
            let max_records = self.services.config.history.max_records;
            if let Err(e) = enforce_retention(store, latest, max_records).await {
                error!(error = %e, "failed to trim history");
            }
        }

        if record.subscription_type.notifies() {
            let content = match record.data_type {
                DataType::Image => Content::Image {
                    caption: formatted.text,
                    bytes: formatted.payload,
                },
                DataType::Other => Content::text(formatted.text),
            };
            let notification = Notification { chat_id, content };
            match deliver(self.services.platform.as_ref(), notification).await {
                Ok(()) => counter!(bridge_metrics::NOTIFICATIONS_SENT_TOTAL).increment(1),
                Err(e) => {
                    counter!(bridge_metrics::NOTIFICATION_ERRORS_TOTAL).increment(1);
                    error!(chat_id, error = %e, "failed to deliver notification");
                },
            }
        }
        drop(user);
    }

    pub async fn handle_chat_event(&self, event: ChatEvent) {
        let config = &self.services.config;
        let chat_id = event.chat_id();
        if is_stale(event.sent_at(), Utc::now(), config.bridge.max_message_age_secs) {
            counter!(bridge_metrics::CHAT_EVENTS_STALE_TOTAL).increment(1);
            warn!(chat_id, sent_at = ?event.sent_at(), "dropping stale chat event");
            return;
        }
        counter!(bridge_metrics::CHAT_EVENTS_RECEIVED_TOTAL).increment(1);

        let sender_id = event.sender_id();
        if !is_allowed(&config.telegram.allowlist, sender_id, event.username()) {
            counter!(bridge_metrics::ACCESS_CONTROL_DENIALS_TOTAL).increment(1);
            warn!(chat_id, sender_id, "access denied");
            self.send(Notification {
                chat_id,
                content: Content::text("⛔ Access denied."),
            })
            .await;
            return;
        }

        let handle = match self.directory.get_or_create(chat_id).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(chat_id, error = %e, "failed to load user");
                return;
            },
        };
        let mut user = handle.lock().await;
        let reply = self.route(&mut user, event).await;
        drop(user);

        if let Some(content) = reply {
            self.send(Notification { chat_id, content }).await;
        }
    }

    async fn route(&self, user: &mut User, event: ChatEvent) -> Option<Content> {
        let platform = self.services.platform.as_ref();
        match &event {
            ChatEvent::Message { text, sent_at, .. } => {
                if text.trim() == STATUS_COMMAND {
                    return Some(self.status(*sent_at));
                }
                if let Some(id) = parse_id(text, EXPORT_COMMAND_PREFIX) {
                    return self.request_export(user, id);
                }
            },
            ChatEvent::Callback { id, data, .. } => {
                if let Some(subscription_id) = parse_id(data, EXPORT_PREFIX) {
                    if let Err(e) = platform.answer_callback(id, Some("Generating CSV…")).await {
                        warn!(error = %e, "failed to answer callback");
                    }
                    return self.request_export(user, subscription_id);
                }
                if let Err(e) = platform.answer_callback(id, None).await {
                    debug!(error = %e, "failed to answer callback");
                }
            },
        }

        let mut session = user
            .take_session()
            .unwrap_or_else(|| self.services.sessions.restore(None));
        let mut ctx = SessionContext {
            user: &mut *user,
            services: &self.services,
        };
        let reply = match event {
            ChatEvent::Message {
                text,
                photo_file_id: Some(file_id),
                ..
            } => match platform.download_photo(&file_id).await {
                Ok(photo) => session.handle_photo(&mut ctx, &text, photo).await,
                Err(e) => {
                    warn!(chat_id = ctx.user.chat_id, error = %e, "photo download failed, using text");
                    session.handle_text(&mut ctx, &text).await
                },
            },
            ChatEvent::Message { text, .. } => session.handle_text(&mut ctx, &text).await,
            ChatEvent::Callback { data, .. } => match session.handle_callback(&mut ctx, &data).await {
                Some(reply) => Some(reply),
                None => {
                    warn!(chat_id = ctx.user.chat_id, data = %data, "session lost, resetting menu");
                    Some(session.start(&mut ctx).await)
                },
            },
        };

        let position = session.position();
        user.restore_session(session);
        if let Err(e) = self.services.store.save_session(user.chat_id, &position).await {
            error!(chat_id = user.chat_id, error = %e, "failed to save session");
        }
        reply
    }

    fn status(&self, telegram_time: Option<DateTime<Utc>>) -> Content {
        const FORMAT: &str = "%d-%m-%Y %H:%M:%S";
        let telegram_time = telegram_time
            .map(|t| t.with_timezone(&Local).format(FORMAT).to_string())
            .unwrap_or_else(|| "unknown".into());
        Content::text(format!(
            "✅ <b>System online</b>\n\n\
             🕒 <b>Server time:</b> {}\n\
             🌐 <b>Telegram time:</b> {telegram_time}\n\
             📡 <b>Message filter:</b> {}s",
            Local::now().format(FORMAT),
            self.services.config.bridge.max_message_age_secs,
        ))
    }

    fn request_export(&self, user: &User, subscription_id: i64) -> Option<Content> {
        if user.subscriptions.find(subscription_id).is_none() {
            warn!(chat_id = user.chat_id, subscription_id, "export of unknown subscription");
            return Some(Content::text(format!(
                "Subscription #{subscription_id} not found."
            )));
        }
        self.exports.submit(ExportRequest {
            chat_id: user.chat_id,
            subscription_id,
        });
        None
    }

    async fn send(&self, notification: Notification) {
        let chat_id = notification.chat_id;
        if let Err(e) = deliver(self.services.platform.as_ref(), notification).await {
            error!(chat_id, error = %e, "failed to send reply");
        }
    }
}

/// Parse the positive id following `prefix`, ignoring trailing text such
/// as a `@bot` suffix.
fn parse_id(text: &str, prefix: &str) -> Option<i64> {
    let rest = text.trim().strip_prefix(prefix)?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<i64>().ok().filter(|id| *id > 0)
}
