//! The seam between the dispatcher and a chat platform.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::error::Result;

/// An inbound event from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message {
        chat_id: i64,
        sender_id: i64,
        username: Option<String>,
        sent_at: Option<DateTime<Utc>>,
        /// Message text, or the caption of a photo.
        text: String,
        /// Platform file id of the largest photo size, if any.
        photo_file_id: Option<String>,
    },
    Callback {
        id: String,
        chat_id: i64,
        sender_id: i64,
        username: Option<String>,
        data: String,
        /// Date of the message the button belongs to.
        message_sent_at: Option<DateTime<Utc>>,
    },
}

impl ChatEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => *chat_id,
        }
    }

    pub fn sender_id(&self) -> i64 {
        match self {
            Self::Message { sender_id, .. } | Self::Callback { sender_id, .. } => *sender_id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Message { username, .. } | Self::Callback { username, .. } => username.as_deref(),
        }
    }

    /// When the originating message was sent.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Message { sent_at, .. } => *sent_at,
            Self::Callback {
                message_sent_at, ..
            } => *message_sent_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Inline keyboard, one inner vector per row.
pub type Keyboard = Vec<Vec<Button>>;

/// Body of an outgoing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    Image {
        caption: String,
        bytes: Vec<u8>,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Content addressed to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub chat_id: i64,
    pub content: Content,
}

/// Outbound operations the bridge needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()>;
    async fn send_image(&self, chat_id: i64, caption: &str, bytes: Vec<u8>) -> Result<()>;
    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        caption: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
    async fn download_photo(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Send a notification through `platform`.
pub async fn deliver(platform: &dyn ChatPlatform, notification: Notification) -> Result<()> {
    match notification.content {
        Content::Text { text, keyboard } => {
            platform
                .send_text(notification.chat_id, &text, keyboard.as_ref())
                .await
        },
        Content::Image { caption, bytes } => {
            platform
                .send_image(notification.chat_id, &caption, bytes)
                .await
        },
    }
}
