use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    mqtg_bridge::{ChatPlatform, Keyboard},
    teloxide::{
        RequestError,
        payloads::{
            AnswerCallbackQuerySetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
        },
        prelude::*,
        types::{ChatId, InputFile, ParseMode},
    },
    tracing::{debug, warn},
};

use crate::{
    convert::keyboard_markup,
    error::{Error, Result},
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Outbound side of the bridge over the Bot API.
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send as HTML first and fall back to plain text when Telegram rejects
    /// the markup.
    async fn send_text_with_fallback(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let bot = &self.bot;
        let chat = ChatId(chat_id);
        let markup = keyboard.map(|k| keyboard_markup(k.as_slice()));

        let html = run_telegram_request_with_retry(chat_id, "send message (html)", || {
            let mut req = bot.send_message(chat, text).parse_mode(ParseMode::Html);
            if let Some(markup) = &markup {
                req = req.reply_markup(markup.clone());
            }
            async move { req.await }
        })
        .await;

        if let Err(e) = html {
            warn!(
                chat_id,
                error = %e,
                "telegram HTML send failed, retrying as plain text"
            );
            run_telegram_request_with_retry(chat_id, "send message (plain)", || {
                let mut req = bot.send_message(chat, text);
                if let Some(markup) = &markup {
                    req = req.reply_markup(markup.clone());
                }
                async move { req.await }
            })
            .await?;
        }
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, caption: &str, bytes: Vec<u8>) -> Result<()> {
        let bot = &self.bot;
        run_telegram_request_with_retry(chat_id, "send photo", || {
            let input = InputFile::memory(bytes.clone()).file_name("image.jpg");
            let req = bot
                .send_photo(ChatId(chat_id), input)
                .caption(caption)
                .parse_mode(ParseMode::Html);
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: i64,
        file_name: &str,
        caption: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let bot = &self.bot;
        run_telegram_request_with_retry(chat_id, "send document", || {
            let input = InputFile::memory(bytes.clone()).file_name(file_name.to_string());
            let req = bot.send_document(ChatId(chat_id), input).caption(caption);
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let bot = &self.bot;
        run_telegram_request_with_retry(0, "answer callback", || {
            let mut req = bot.answer_callback_query(callback_id);
            if let Some(text) = text {
                req = req.text(text);
            }
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    /// Download a file by id through the bot's file endpoint.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let bot = &self.bot;
        let file = run_telegram_request_with_retry(0, "get file", || {
            let req = bot.get_file(file_id);
            async move { req.await }
        })
        .await?;

        let url = bot
            .api_url()
            .join(&format!("file/bot{}/{}", bot.token(), file.path))
            .map_err(|e| Error::external("invalid file url", e))?;
        let response = bot.client().get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::message(format!(
                "failed to download file: HTTP {}",
                response.status()
            )));
        }
        let data = response.bytes().await?.to_vec();
        debug!(file_id, size = data.len(), "downloaded telegram file");
        Ok(data)
    }
}

fn platform_error(error: Error) -> mqtg_bridge::Error {
    mqtg_bridge::Error::external("telegram", error)
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> mqtg_bridge::Result<()> {
        self.send_text_with_fallback(chat_id, text, keyboard)
            .await
            .map_err(platform_error)
    }

    async fn send_image(&self, chat_id: i64, caption: &str, bytes: Vec<u8>) -> mqtg_bridge::Result<()> {
        self.send_photo(chat_id, caption, bytes)
            .await
            .map_err(platform_error)
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        caption: &str,
        bytes: Vec<u8>,
    ) -> mqtg_bridge::Result<()> {
        self.send_file(chat_id, file_name, caption, bytes)
            .await
            .map_err(platform_error)
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> mqtg_bridge::Result<()> {
        self.answer(callback_id, text).await.map_err(platform_error)
    }

    async fn download_photo(&self, file_id: &str) -> mqtg_bridge::Result<Vec<u8>> {
        self.download(file_id).await.map_err(platform_error)
    }
}

/// Run `request`, sleeping and retrying while Telegram answers with
/// `RetryAfter`. Other errors are returned immediately.
async fn run_telegram_request_with_retry<T, F, Fut>(
    chat_id: i64,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        mqtg_bridge::Button,
        serde_json::{Value, json},
        std::sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[derive(Clone, Default)]
    struct MockTelegramApi {
        requests: Arc<Mutex<Vec<(String, Value)>>>,
        reject_html: bool,
        rate_limited: Arc<AtomicUsize>,
    }

    async fn telegram_api_handler(
        State(api): State<MockTelegramApi>,
        uri: Uri,
        body: Bytes,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let html = body["parse_mode"] == "HTML";
        api.requests.lock().unwrap().push((method.clone(), body));

        if api
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 0",
                "parameters": { "retry_after": 0 }
            }));
        }

        match method.as_str() {
            "SendMessage" if api.reject_html && html => Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: Unsupported start tag \"x\" at byte offset 0"
            })),
            "SendMessage" => Json(json!({
                "ok": true,
                "result": {
                    "message_id": 1,
                    "date": 0,
                    "chat": { "id": 42, "type": "private" },
                    "text": "ok"
                }
            })),
            _ => Json(json!({ "ok": true, "result": true })),
        }
    }

    async fn platform(api: MockTelegramApi) -> TelegramPlatform {
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock telegram api");
        });

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        TelegramPlatform::new(Bot::new("test-token").set_api_url(api_url))
    }

    #[tokio::test]
    async fn text_is_sent_as_html_with_keyboard() {
        let api = MockTelegramApi::default();
        let platform = platform(api.clone()).await;

        platform
            .send_text(42, "<b>hi</b>", Some(&vec![vec![Button::new("List", "menu:list")]]))
            .await
            .unwrap();

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (method, body) = &requests[0];
        assert_eq!(method, "SendMessage");
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "menu:list"
        );
    }

    #[tokio::test]
    async fn rejected_html_falls_back_to_plain_text() {
        let api = MockTelegramApi {
            reject_html: true,
            ..Default::default()
        };
        let platform = platform(api.clone()).await;

        platform.send_text(42, "<x>broken", None).await.unwrap();

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1["parse_mode"], "HTML");
        assert!(requests[1].1.get("parse_mode").is_none());
        assert_eq!(requests[1].1["text"], "<x>broken");
    }

    #[tokio::test]
    async fn rate_limited_requests_are_retried() {
        let api = MockTelegramApi {
            rate_limited: Arc::new(AtomicUsize::new(2)),
            ..Default::default()
        };
        let platform = platform(api.clone()).await;

        platform
            .answer_callback("cb-1", Some("Generating CSV…"))
            .await
            .unwrap();

        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        let (method, body) = &requests[2];
        assert_eq!(method, "AnswerCallbackQuery");
        assert_eq!(body["callback_query_id"], "cb-1");
        assert_eq!(body["text"], "Generating CSV…");
    }

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_duration_ignores_other_errors() {
        let err = RequestError::Io(std::io::Error::other("boom"));
        assert_eq!(retry_after_duration(&err), None);
    }
}
