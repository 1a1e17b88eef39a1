use std::time::Duration;

use {
    mqtg_bridge::ChatEvent,
    mqtg_config::TelegramConfig,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    convert::{callback_event, message_event},
    error::Result,
};

/// Long-polling timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Build a bot whose HTTP client outlives the long-polling timeout.
pub fn build_bot(config: &TelegramConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
        .build()?;
    Ok(Bot::with_client(config.token.expose_secret(), client))
}

/// Verify the token, clear any webhook and start polling.
///
/// Every text, photo and callback update is converted and pushed into
/// `events`. The loop ends when `cancel` fires, when the receiver goes away
/// or when another instance starts polling with the same token.
pub async fn start_polling(
    bot: Bot,
    events: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "Open the menu"),
        BotCommand::new("status", "Show bridge status"),
        BotCommand::new("connect", "Connect to an MQTT broker"),
        BotCommand::new(
            "subscribe",
            "Subscribe to a topic: <topic> [qos=] [type=] [path=]",
        ),
        BotCommand::new("list", "List subscriptions"),
        BotCommand::new("publish", "Publish a message"),
        BotCommand::new("cancel", "Cancel the current prompt"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?me.username, "telegram bot connected (webhook cleared)");

    Ok(tokio::spawn(poll_updates(bot, events, cancel)))
}

async fn poll_updates(bot: Bot, events: mpsc::Sender<ChatEvent>, cancel: CancellationToken) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .send();
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = request => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let event = match update.kind {
                        UpdateKind::Message(msg) => {
                            let event = message_event(&msg);
                            if event.is_none() {
                                debug!(chat_id = msg.chat.id.0, "ignoring unsupported message");
                            }
                            event
                        },
                        UpdateKind::CallbackQuery(query) => {
                            let event = callback_event(&query);
                            if event.is_none() {
                                debug!(callback_data = ?query.data, "ignoring callback without chat");
                            }
                            event
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                            None
                        },
                    };
                    if let Some(event) = event
                        && events.send(event).await.is_err()
                    {
                        info!("chat event receiver closed, telegram polling stopped");
                        return;
                    }
                }
            },
            Err(e) => {
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    error!(
                        "telegram polling disabled: another instance is already running with this token"
                    );
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(5)) => {},
                }
            },
        }
    }
    info!("telegram polling stopped");
}
