use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    mqtg_config::MqttConfig,
    rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS},
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    backoff::Backoff,
    error::{ConnectError, Result},
    options::{BrokerUrl, client_id},
    router::{BusEvent, BusMessage, Registration, Router},
};

/// Bounded wait for the DISCONNECT packet and the polling task to finish.
const DISCONNECT_WAIT: Duration = Duration::from_millis(100);
/// Capacity of the client → event loop request channel.
const REQUEST_CAPACITY: usize = 64;

/// Supplies the registrations to restore after every (re)connect.
#[async_trait]
pub trait RecoverySource<T>: Send + Sync {
    async fn snapshot(&self) -> Vec<Registration<T>>;
}

/// Opens broker connections.
#[async_trait]
pub trait BusConnector<T: Send + 'static>: Send + Sync {
    /// Connect with a bounded wait. Failures after this call returns are
    /// absorbed by the connection's reconnect policy.
    async fn connect(
        &self,
        url: &str,
        recovery: Arc<dyn RecoverySource<T>>,
    ) -> Result<Arc<dyn BusConnection<T>>>;
}

/// A live broker connection. Network calls are issued in the background;
/// none of these methods wait for the broker.
#[async_trait]
pub trait BusConnection<T>: Send + Sync {
    fn subscribe(&self, registration: Registration<T>);
    /// Drop a registration. Events already queued for it may still arrive.
    fn unsubscribe(&self, id: i64, filter: &str);
    fn publish(&self, topic: &str, qos: u8, retained: bool, payload: Vec<u8>);
    fn is_connected(&self) -> bool;
    async fn disconnect(&self);
}

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// [`BusConnector`] backed by `rumqttc`.
pub struct MqttConnector<T> {
    config: MqttConfig,
    events: mpsc::Sender<BusEvent<T>>,
}

impl<T> MqttConnector<T> {
    /// Every connection opened by this connector forwards matched messages
    /// into `events`.
    pub fn new(config: MqttConfig, events: mpsc::Sender<BusEvent<T>>) -> Self {
        Self { config, events }
    }
}

#[async_trait]
impl<T> BusConnector<T> for MqttConnector<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn connect(
        &self,
        url: &str,
        recovery: Arc<dyn RecoverySource<T>>,
    ) -> Result<Arc<dyn BusConnection<T>>> {
        let broker = BrokerUrl::parse(url)?;
        let client_id = client_id(&self.config);
        let options = broker.to_options(&self.config, &client_id);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let wait = Duration::from_secs(self.config.connect_timeout_secs);
        match tokio::time::timeout(wait, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ConnectError::Timeout(wait).into()),
        }
        info!(host = %broker.host, port = broker.port, client_id = %client_id, "connected to broker");

        let max_backoff = Duration::from_secs(self.config.max_reconnect_interval_secs);
        let connection: Arc<dyn BusConnection<T>> = MqttConnection::start(
            client,
            eventloop,
            self.events.clone(),
            recovery,
            Backoff::new(max_backoff),
        );
        Ok(connection)
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), ConnectError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(ConnectError::Rejected(format!("{code:?}"))),
                };
            },
            Ok(_) => {},
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectError::Rejected(format!("{code:?}")));
            },
            Err(e) => return Err(ConnectError::Transport(e.to_string())),
        }
    }
}

struct Shared<T> {
    router: Mutex<Router<T>>,
    connected: AtomicBool,
}

impl<T> Shared<T> {
    fn router(&self) -> MutexGuard<'_, Router<T>> {
        self.router.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One broker connection with its background polling task.
pub struct MqttConnection<T> {
    client: AsyncClient,
    shared: Arc<Shared<T>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> MqttConnection<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn start(
        client: AsyncClient,
        eventloop: EventLoop,
        events: mpsc::Sender<BusEvent<T>>,
        recovery: Arc<dyn RecoverySource<T>>,
        backoff: Backoff,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            router: Mutex::new(Router::default()),
            connected: AtomicBool::new(true),
        });
        let cancel = CancellationToken::new();

        // The initial CONNACK was consumed by the bounded connect.
        tokio::spawn(recover(client.clone(), Arc::clone(&shared), Arc::clone(&recovery)));

        let poller = Poller {
            client: client.clone(),
            shared: Arc::clone(&shared),
            events,
            recovery,
            backoff,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(poller.run(eventloop));

        Arc::new(Self {
            client,
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }
}

#[async_trait]
impl<T> BusConnection<T> for MqttConnection<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, registration: Registration<T>) {
        let filter = registration.filter.clone();
        let level = registration.qos;
        if !self.shared.router().insert(registration) {
            debug!(topic = %filter, "filter already subscribed on broker");
            return;
        }
        // Queued in call order; a full request queue is recovered by the
        // re-subscribe that follows the next reconnect.
        match self.client.try_subscribe(filter.as_str(), qos(level)) {
            Ok(()) => info!(topic = %filter, qos = level, "subscribed"),
            Err(e) => warn!(topic = %filter, error = %e, "subscribe failed"),
        }
    }

    fn unsubscribe(&self, id: i64, filter: &str) {
        if !self.shared.router().remove(id, filter) {
            return;
        }
        match self.client.try_unsubscribe(filter) {
            Ok(()) => info!(topic = %filter, "unsubscribed"),
            Err(e) => warn!(topic = %filter, error = %e, "unsubscribe failed"),
        }
    }

    fn publish(&self, topic: &str, level: u8, retained: bool, payload: Vec<u8>) {
        let client = self.client.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            let len = payload.len();
            match client.publish(topic.as_str(), qos(level), retained, payload).await {
                Ok(()) => debug!(topic = %topic, bytes = len, "published"),
                Err(e) => warn!(topic = %topic, error = %e, "publish failed"),
            }
        });
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        match tokio::time::timeout(DISCONNECT_WAIT, self.client.disconnect()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => debug!(error = %e, "disconnect request failed"),
            Err(_) => debug!("disconnect request timed out"),
        }
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task
            && tokio::time::timeout(DISCONNECT_WAIT, task).await.is_err()
        {
            debug!("event loop did not stop in time");
        }
        self.cancel.cancel();
        info!("disconnected from broker");
    }
}

impl<T> Drop for MqttConnection<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Re-subscribe every registration of the snapshot.
async fn recover<T: Clone>(
    client: AsyncClient,
    shared: Arc<Shared<T>>,
    recovery: Arc<dyn RecoverySource<T>>,
) {
    shared.router().begin_restore();
    let snapshot = recovery.snapshot().await;
    let filters = shared.router().restore(snapshot);
    let count = filters.len();
    for (filter, level) in filters {
        if let Err(e) = client.subscribe(filter.as_str(), qos(level)).await {
            warn!(topic = %filter, error = %e, "re-subscribe failed");
        }
    }
    if count > 0 {
        info!(count, "subscriptions restored");
    }
}

struct Poller<T> {
    client: AsyncClient,
    shared: Arc<Shared<T>>,
    events: mpsc::Sender<BusEvent<T>>,
    recovery: Arc<dyn RecoverySource<T>>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self, mut eventloop: EventLoop) {
        loop {
            let polled = tokio::select! {
                () = self.cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.backoff.reset();
                    self.shared.connected.store(true, Ordering::SeqCst);
                    info!("reconnected to broker");
                    tokio::spawn(recover(
                        self.client.clone(),
                        Arc::clone(&self.shared),
                        Arc::clone(&self.recovery),
                    ));
                },
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = BusMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        retained: publish.retain,
                    };
                    self.forward(message).await;
                },
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.shared.connected.store(false, Ordering::SeqCst);
                },
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {},
                Err(e) => {
                    self.shared.connected.store(false, Ordering::SeqCst);
                    let delay = self.backoff.next_delay();
                    warn!(error = %e, retry_in_secs = delay.as_secs_f32(), "broker connection lost");
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {},
                    }
                },
            }
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("mqtt event loop stopped");
    }

    async fn forward(&self, message: BusMessage) {
        let targets = self.shared.router().route(&message.topic);
        if targets.is_empty() {
            debug!(topic = %message.topic, "no registration for message");
            return;
        }
        for target in targets {
            let event = BusEvent {
                message: message.clone(),
                target,
            };
            if self.events.send(event).await.is_err() {
                debug!("events queue closed, dropping message");
                return;
            }
        }
    }
}
