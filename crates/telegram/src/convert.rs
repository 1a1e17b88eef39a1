//! Conversions between Bot API types and bridge types.

use {
    mqtg_bridge::{Button, ChatEvent},
    teloxide::types::{
        CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage,
        MediaKind, Message, MessageKind, User,
    },
};

/// Text and photo messages from a user. Everything else is ignored.
pub fn message_event(msg: &Message) -> Option<ChatEvent> {
    let sender = msg.from.as_ref()?;
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let (text, photo_file_id) = match &common.media_kind {
        MediaKind::Text(t) => (t.text.clone(), None),
        // The last size is the largest.
        MediaKind::Photo(p) => (
            p.caption.clone().unwrap_or_default(),
            Some(p.photo.last()?.file.id.clone()),
        ),
        _ => return None,
    };
    Some(ChatEvent::Message {
        chat_id: msg.chat.id.0,
        sender_id: user_id(sender)?,
        username: sender.username.clone(),
        sent_at: Some(msg.date),
        text,
        photo_file_id,
    })
}

/// Button presses on a message the bot sent.
pub fn callback_event(query: &CallbackQuery) -> Option<ChatEvent> {
    let data = query.data.clone()?;
    let message = query.message.as_ref()?;
    let message_sent_at = match message {
        MaybeInaccessibleMessage::Regular(m) => Some(m.date),
        MaybeInaccessibleMessage::Inaccessible(_) => None,
    };
    Some(ChatEvent::Callback {
        id: query.id.clone(),
        chat_id: message.chat().id.0,
        sender_id: user_id(&query.from)?,
        username: query.from.username.clone(),
        data,
        message_sent_at,
    })
}

pub fn keyboard_markup(keyboard: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.text.clone(), button.data.clone()))
    }))
}

fn user_id(user: &User) -> Option<i64> {
    i64::try_from(user.id.0).ok()
}
