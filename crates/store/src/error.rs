#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid stored value for {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("user {chat_id} not found")]
    UserNotFound { chat_id: i64 },
}

impl Error {
    #[must_use]
    pub fn invalid_value(column: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            column,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
