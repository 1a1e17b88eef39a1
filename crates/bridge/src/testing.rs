//! In-crate fakes for the broker and chat platform seams.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    mqtg_config::MqtgConfig,
    mqtg_mqtt::{BusConnection, BusConnector, ConnectError, RecoverySource, Registration},
    mqtg_store::SqliteStore,
    sqlx::SqlitePool,
    tokio::sync::mpsc,
};

use crate::{
    chat::{ChatEvent, ChatPlatform, Keyboard},
    directory::UserDirectory,
    dispatch::{BridgeEvent, Dispatcher},
    error::{Error, Result},
    export::ExportQueue,
    services::Services,
    session::MenuSessions,
    user::SubscriptionRef,
};

#[derive(Default)]
pub struct FakeBus {
    pub subscribed: Mutex<Vec<(i64, String)>>,
    pub unsubscribed: Mutex<Vec<(i64, String)>>,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub connected: AtomicBool,
    pub disconnected: AtomicBool,
}

impl FakeBus {
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl BusConnection<SubscriptionRef> for FakeBus {
    fn subscribe(&self, registration: Registration<SubscriptionRef>) {
        self.subscribed
            .lock()
            .unwrap()
            .push((registration.id, registration.filter));
    }

    fn unsubscribe(&self, id: i64, filter: &str) {
        self.unsubscribed
            .lock()
            .unwrap()
            .push((id, filter.to_string()));
    }

    fn publish(&self, topic: &str, _qos: u8, _retained: bool, payload: Vec<u8>) {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub urls: Mutex<Vec<String>>,
    pub buses: Mutex<Vec<Arc<FakeBus>>>,
    pub recoveries: Mutex<Vec<Arc<dyn RecoverySource<SubscriptionRef>>>>,
    pub fail: AtomicBool,
}

impl FakeConnector {
    pub fn last_bus(&self) -> Arc<FakeBus> {
        Arc::clone(self.buses.lock().unwrap().last().unwrap())
    }

    /// Simulate a broker reconnect of the latest connection: snapshot the
    /// owner's subscriptions and subscribe them again.
    pub async fn reconnect(&self) -> Arc<FakeBus> {
        let recovery = Arc::clone(self.recoveries.lock().unwrap().last().unwrap());
        let bus = self.last_bus();
        bus.subscribed.lock().unwrap().clear();
        for registration in recovery.snapshot().await {
            bus.subscribe(registration);
        }
        bus
    }
}

#[async_trait]
impl BusConnector<SubscriptionRef> for FakeConnector {
    async fn connect(
        &self,
        url: &str,
        recovery: Arc<dyn RecoverySource<SubscriptionRef>>,
    ) -> mqtg_mqtt::Result<Arc<dyn BusConnection<SubscriptionRef>>> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnectError::Timeout(Duration::from_secs(10)).into());
        }
        let bus = Arc::new(FakeBus::default());
        bus.connected.store(true, Ordering::SeqCst);
        self.buses.lock().unwrap().push(Arc::clone(&bus));
        self.recoveries.lock().unwrap().push(recovery);
        Ok(bus as Arc<dyn BusConnection<SubscriptionRef>>)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Image {
        chat_id: i64,
        caption: String,
        bytes: Vec<u8>,
    },
    Document {
        chat_id: i64,
        file_name: String,
        caption: String,
        bytes: Vec<u8>,
    },
    Answer {
        id: String,
        text: Option<String>,
    },
}

#[derive(Default)]
pub struct FakePlatform {
    pub sent: Mutex<Vec<Sent>>,
    pub photo: Mutex<Option<Vec<u8>>>,
}

impl FakePlatform {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to chats, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn send_image(&self, chat_id: i64, caption: &str, bytes: Vec<u8>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Image {
            chat_id,
            caption: caption.to_string(),
            bytes,
        });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        caption: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Document {
            chat_id,
            file_name: file_name.to_string(),
            caption: caption.to_string(),
            bytes,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Answer {
            id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn download_photo(&self, _file_id: &str) -> Result<Vec<u8>> {
        self.photo
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::message("download failed"))
    }
}

pub struct Harness {
    pub services: Arc<Services>,
    pub store: Arc<SqliteStore>,
    pub connector: Arc<FakeConnector>,
    pub platform: Arc<FakePlatform>,
    pub directory: Arc<UserDirectory>,
}

pub async fn harness(config: MqtgConfig) -> Harness {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    mqtg_store::run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let connector = Arc::new(FakeConnector::default());
    let platform = Arc::new(FakePlatform::default());
    let services = Arc::new(Services {
        config: Arc::new(config),
        store: Arc::clone(&store) as _,
        connector: Arc::clone(&connector) as _,
        platform: Arc::clone(&platform) as _,
        sessions: Arc::new(MenuSessions),
    });
    let directory = Arc::new(UserDirectory::new(Arc::clone(&services)));
    Harness {
        services,
        store,
        connector,
        platform,
        directory,
    }
}

impl Harness {
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with_queues().0
    }

    /// A dispatcher together with the senders of its bus and chat queues.
    pub fn dispatcher_with_queues(
        &self,
    ) -> (Dispatcher, mpsc::Sender<BridgeEvent>, mpsc::Sender<ChatEvent>) {
        let (exports, _worker) = ExportQueue::start(
            &self.services.config.export,
            Arc::clone(&self.store) as _,
            Arc::clone(&self.platform) as _,
        );
        let (bus_tx, bus_rx) = mpsc::channel(16);
        let (chat_tx, chat_rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.services),
            Arc::clone(&self.directory),
            exports,
            bus_rx,
            chat_rx,
        );
        (dispatcher, bus_tx, chat_tx)
    }
}

pub fn text_event(chat_id: i64, text: &str) -> ChatEvent {
    ChatEvent::Message {
        chat_id,
        sender_id: chat_id,
        username: None,
        sent_at: Some(chrono::Utc::now()),
        text: text.to_string(),
        photo_file_id: None,
    }
}

pub fn callback_event(chat_id: i64, data: &str) -> ChatEvent {
    ChatEvent::Callback {
        id: "cb-1".into(),
        chat_id,
        sender_id: chat_id,
        username: None,
        data: data.to_string(),
        message_sent_at: Some(chrono::Utc::now()),
    }
}
