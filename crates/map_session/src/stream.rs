use std::{
    collections::HashMap,
    error::Error,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::{stream::BoxStream, StreamExt};
use model::vehicle::VehiclePosition;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TOPIC: &str = "/topic/locations";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

/// Failure of the feed connection. Never fatal, the client reconnects.
#[derive(Debug)]
pub enum TransportError {
    Connect(Box<dyn Error + Send + Sync>),
    Rejected { status: u16 },
    UnknownTopic(String),
    Io(Box<dyn Error + Send + Sync>),
}

impl TransportError {
    pub fn connect<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Connect(Box::new(why))
    }

    pub fn io<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Io(Box::new(why))
    }
}

impl Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Connect(why) => write!(f, "could not connect: {why}"),
            Self::Rejected { status } => write!(f, "subscription rejected with status {status}"),
            Self::UnknownTopic(topic) => write!(f, "unknown topic {topic}"),
            Self::Io(why) => write!(f, "connection lost: {why}"),
        }
    }
}

/// Raw message bodies of one subscription, in arrival order.
pub type MessageStream = BoxStream<'static, Result<String, TransportError>>;

/// A connection to the position feed. The auth token, if any, is only
/// presented while subscribing.
#[async_trait]
pub trait PositionTransport: Send + Sync + 'static {
    async fn subscribe(
        &self,
        topic: &str,
        auth_token: Option<&str>,
    ) -> Result<MessageStream, TransportError>;
}

/// Receives parsed positions. Called from the stream task, one message at a
/// time.
#[async_trait]
pub trait PositionConsumer: Send + 'static {
    async fn consume(&mut self, position: VehiclePosition);
}

#[async_trait]
impl PositionConsumer for mpsc::UnboundedSender<VehiclePosition> {
    async fn consume(&mut self, position: VehiclePosition) {
        if self.send(position).is_err() {
            log::debug!("position receiver is gone");
        }
    }
}

#[async_trait]
impl PositionConsumer for mpsc::Sender<VehiclePosition> {
    async fn consume(&mut self, position: VehiclePosition) {
        if self.send(position).await.is_err() {
            log::debug!("position receiver is gone");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub topic: String,
    pub auth_token: Option<String>,
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_owned(),
            auth_token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

#[derive(Debug)]
pub struct MalformedMessage(String);

impl Error for MalformedMessage {}

impl fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed position message: {}", self.0)
    }
}

pub fn parse_position(body: &str) -> Result<VehiclePosition, MalformedMessage> {
    let position: VehiclePosition =
        serde_json::from_str(body).map_err(|why| MalformedMessage(why.to_string()))?;
    if !position.is_plausible() {
        return Err(MalformedMessage(format!(
            "implausible position of vehicle {:?}",
            position.vehicle_id
        )));
    }
    Ok(position)
}

/// Last delivered timestamp per vehicle. A message that repeats it is a
/// redelivery.
#[derive(Debug, Default)]
struct Deliveries {
    last: HashMap<String, DateTime<Local>>,
}

impl Deliveries {
    fn is_redelivery(&self, position: &VehiclePosition) -> bool {
        self.last.get(&position.vehicle_id) == Some(&position.timestamp)
    }

    fn record(&mut self, position: &VehiclePosition) {
        self.last
            .insert(position.vehicle_id.clone(), position.timestamp);
    }
}

/// Keeps one subscription to the position feed alive and hands every
/// position to a consumer.
pub struct PositionStreamClient<T: PositionTransport> {
    config: StreamConfig,
    transport: Arc<T>,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: PositionTransport> PositionStreamClient<T> {
    pub fn new(config: StreamConfig, transport: T) -> Self {
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            config,
            transport: Arc::new(transport),
            state,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Starts the subscription task. The consumer is registered once and
    /// kept across reconnects. Returns `false` if the client is already
    /// active.
    pub fn activate<C: PositionConsumer>(&mut self, consumer: C) -> bool {
        if self.task.is_some() {
            log::warn!("position stream is already active");
            return false;
        }
        self.cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            self.config.clone(),
            self.transport.clone(),
            consumer,
            self.state.clone(),
            self.cancel.clone(),
        ));
        self.task = Some(task);
        true
    }

    /// Stops the subscription. Once this returns the consumer is not called
    /// again. Calling it on an inactive client does nothing.
    pub async fn deactivate(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.cancel.cancel();
        if let Err(why) = task.await {
            log::error!("position stream task failed: {why}");
        }
        self.state.send_replace(StreamState::Disconnected);
        log::info!("position stream deactivated");
    }
}

impl<T: PositionTransport> Drop for PositionStreamClient<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise<T, C>(
    config: StreamConfig,
    transport: Arc<T>,
    mut consumer: C,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
) where
    T: PositionTransport,
    C: PositionConsumer,
{
    let mut deliveries = Deliveries::default();
    loop {
        state.send_replace(StreamState::Connecting);
        let subscription = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            subscription = transport.subscribe(&config.topic, config.auth_token.as_deref()) => subscription,
        };

        match subscription {
            Ok(mut messages) => {
                state.send_replace(StreamState::Connected);
                log::info!("subscribed to {}", config.topic);
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            state.send_replace(StreamState::Disconnected);
                            return;
                        }
                        message = messages.next() => message,
                    };
                    match message {
                        Some(Ok(body)) => match parse_position(&body) {
                            Ok(position) if deliveries.is_redelivery(&position) => {
                                log::debug!(
                                    "dropping redelivered position of vehicle {}",
                                    position.vehicle_id
                                );
                            }
                            Ok(position) => {
                                deliveries.record(&position);
                                consumer.consume(position).await;
                            }
                            Err(why) => log::warn!("{why}"),
                        },
                        Some(Err(why)) => {
                            log::warn!("position stream failed: {why}");
                            break;
                        }
                        None => {
                            log::warn!("position stream closed by the server");
                            break;
                        }
                    }
                }
            }
            Err(why) => log::warn!("could not subscribe to {}: {why}", config.topic),
        }

        state.send_replace(StreamState::Disconnected);
        log::info!(
            "reconnecting to position stream in {:?}",
            config.reconnect_delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(config.reconnect_delay) => {}
        }
    }
    state.send_replace(StreamState::Disconnected);
}

/// In-process feed. Every subscriber of the broker's topic sees every
/// message published after it subscribed.
#[derive(Debug, Clone)]
pub struct LocalBroker {
    topic: String,
    sender: Arc<Mutex<broadcast::Sender<String>>>,
    capacity: usize,
}

impl LocalBroker {
    pub fn new<S: Into<String>>(topic: S, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            topic: topic.into(),
            sender: Arc::new(Mutex::new(sender)),
            capacity,
        }
    }

    fn sender(&self) -> broadcast::Sender<String> {
        match self.sender.lock() {
            Ok(sender) => sender.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the number of subscribers that will see the message.
    pub fn publish<S: Into<String>>(&self, body: S) -> usize {
        self.sender().send(body.into()).unwrap_or(0)
    }

    pub fn subscribers(&self) -> usize {
        self.sender().receiver_count()
    }

    /// Ends every open subscription, as a server restart would.
    pub fn disconnect_all(&self) {
        let (fresh, _) = broadcast::channel(self.capacity);
        let mut sender = match self.sender.lock() {
            Ok(sender) => sender,
            Err(poisoned) => poisoned.into_inner(),
        };
        *sender = fresh;
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC, 256)
    }
}

#[async_trait]
impl PositionTransport for LocalBroker {
    async fn subscribe(
        &self,
        topic: &str,
        _auth_token: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        if topic != self.topic {
            return Err(TransportError::UnknownTopic(topic.to_owned()));
        }
        let messages = BroadcastStream::new(self.sender().subscribe())
            .map(|message| message.map_err(TransportError::io));
        Ok(messages.boxed())
    }
}
