use std::{error::Error, fmt};

use async_trait::async_trait;
use model::vehicle::VehiclePosition;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    backend::Backend,
    coordinator::{Dispatch, Finished},
    session::{Command, MapSession, MapSnapshot, Notification},
    stream::PositionConsumer,
    viewport::ViewTransition,
};

const MAILBOX_SIZE: usize = 64;

/// Everything that can happen to a running session.
#[derive(Debug)]
pub enum SessionEvent {
    Command(Command),
    Position(VehiclePosition),
    Finished(Finished),
    Snapshot(oneshot::Sender<MapSnapshot>),
    TakeNotifications(oneshot::Sender<Vec<Notification>>),
    TakeViewTransition(oneshot::Sender<Option<ViewTransition>>),
    Shutdown,
}

#[derive(Debug)]
pub struct SessionClosed;

impl Error for SessionClosed {}

impl fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "map session is no longer running")
    }
}

impl<T> From<mpsc::error::SendError<T>> for SessionClosed {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self
    }
}

impl From<oneshot::error::RecvError> for SessionClosed {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self
    }
}

/// Address of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn command(&self, command: Command) -> Result<(), SessionClosed> {
        Ok(self.sender.send(SessionEvent::Command(command)).await?)
    }

    pub async fn position(&self, position: VehiclePosition) -> Result<(), SessionClosed> {
        Ok(self.sender.send(SessionEvent::Position(position)).await?)
    }

    async fn ask<R>(
        &self,
        event: impl FnOnce(oneshot::Sender<R>) -> SessionEvent,
    ) -> Result<R, SessionClosed> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender.send(event(response_tx)).await?;
        Ok(response_rx.await?)
    }

    pub async fn snapshot(&self) -> Result<MapSnapshot, SessionClosed> {
        self.ask(SessionEvent::Snapshot).await
    }

    pub async fn take_notifications(&self) -> Result<Vec<Notification>, SessionClosed> {
        self.ask(SessionEvent::TakeNotifications).await
    }

    pub async fn take_view_transition(&self) -> Result<Option<ViewTransition>, SessionClosed> {
        self.ask(SessionEvent::TakeViewTransition).await
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionEvent::Shutdown).await;
    }
}

#[async_trait]
impl PositionConsumer for SessionHandle {
    async fn consume(&mut self, position: VehiclePosition) {
        if self.position(position).await.is_err() {
            log::debug!("dropping position, session is closed");
        }
    }
}

/// Moves `session` onto its own task. Backend calls run in tasks of their
/// own and report back through the mailbox, so the session is never blocked
/// by the network. The task ends on shutdown or when every handle is gone,
/// and yields the session back.
pub fn spawn<B: Backend>(mut session: MapSession, backend: B) -> (SessionHandle, JoinHandle<MapSession>) {
    let (sender, mut receiver) = mpsc::channel(MAILBOX_SIZE);
    let completions = sender.downgrade();

    let dispatch = move |dispatches: Vec<Dispatch>| {
        for dispatch in dispatches {
            let backend = backend.clone();
            let completions = completions.clone();
            tokio::spawn(async move {
                let finished = dispatch.run(&backend).await;
                match completions.upgrade() {
                    Some(mailbox) => {
                        if mailbox.send(SessionEvent::Finished(finished)).await.is_err() {
                            log::debug!("session closed before a response arrived");
                        }
                    }
                    None => log::debug!("session closed before a response arrived"),
                }
            });
        }
    };

    let task = tokio::spawn(async move {
        dispatch(session.start());
        while let Some(event) = receiver.recv().await {
            match event {
                SessionEvent::Command(command) => dispatch(session.handle(command)),
                SessionEvent::Position(position) => session.on_position(position),
                SessionEvent::Finished(finished) => dispatch(session.complete(finished)),
                SessionEvent::Snapshot(respond_to) => {
                    let _ = respond_to.send(session.snapshot());
                }
                SessionEvent::TakeNotifications(respond_to) => {
                    let _ = respond_to.send(session.take_notifications());
                }
                SessionEvent::TakeViewTransition(respond_to) => {
                    let _ = respond_to.send(session.take_view_transition());
                }
                SessionEvent::Shutdown => break,
            }
        }
        log::info!("map session stopped");
        session
    });

    (SessionHandle { sender }, task)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use model::{
        geometry::{Geometry, GeometryKind, Wgs84},
        ExampleData,
    };

    use super::*;
    use crate::{
        codec,
        config::SessionConfig,
        feature_index::Layer,
        session::Severity,
        stream::{LocalBroker, PositionStreamClient, StreamConfig, StreamState},
        testing::MockBackend,
    };

    async fn notifications(handle: &SessionHandle, wanted: usize) -> Vec<Notification> {
        let mut collected = Vec::new();
        for _ in 0..200 {
            collected.extend(handle.take_notifications().await.unwrap());
            if collected.len() >= wanted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        collected
    }

    #[tokio::test]
    async fn start_loads_live_vehicles() {
        let backend = MockBackend::default().with_live(vec![VehiclePosition::example_data()]);
        let (handle, task) = spawn(MapSession::new(&SessionConfig::default()), backend.clone());

        let received = notifications(&handle, 1).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].severity, Severity::Info);

        let snapshot = handle.snapshot().await.unwrap();
        let vehicles = snapshot.layer(Layer::Vehicles).unwrap();
        assert_eq!(vehicles.features.len(), 2);

        handle.shutdown().await;
        let session = task.await.unwrap();
        assert_eq!(session.state().roster.len(), 1);
        assert_eq!(backend.count("live_vehicles"), 1);
    }

    #[tokio::test]
    async fn commands_flow_through_the_mailbox() {
        let backend = MockBackend::default();
        let (handle, task) = spawn(MapSession::new(&SessionConfig::default()), backend.clone());
        notifications(&handle, 1).await;

        let polygon = codec::to_display_geometry(&Geometry::<Wgs84>::example_data());
        handle.command(Command::Draw(GeometryKind::Polygon)).await.unwrap();
        handle.command(Command::DrawEnd(polygon)).await.unwrap();
        handle.command(Command::Save).await.unwrap();

        // saved, then live vehicles refreshed
        let received = notifications(&handle, 2).await;
        assert_eq!(received.len(), 2);
        assert_eq!(backend.count("save_shape"), 1);
        assert_eq!(backend.count("live_vehicles"), 2);
        assert!(!handle.snapshot().await.unwrap().can_save);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stream_positions_reach_the_vehicle_layer() {
        let (handle, task) = spawn(
            MapSession::new(&SessionConfig::default()),
            MockBackend::default(),
        );
        notifications(&handle, 1).await;
        let broker = LocalBroker::default();
        let mut client = PositionStreamClient::new(
            StreamConfig {
                reconnect_delay: Duration::from_millis(10),
                ..StreamConfig::default()
            },
            broker.clone(),
        );
        let mut state = client.watch_state();
        client.activate(handle.clone());
        state
            .wait_for(|state| *state == StreamState::Connected)
            .await
            .unwrap();

        let position = VehiclePosition::example_data();
        broker.publish(serde_json::to_string(&position).unwrap());

        let mut found = false;
        for _ in 0..200 {
            let snapshot = handle.snapshot().await.unwrap();
            let vehicles = snapshot.layer(Layer::Vehicles).unwrap();
            if vehicles.features.iter().any(|(key, _)| key == "icon-1") {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(found);

        client.deactivate().await;
        handle.shutdown().await;
        task.await.unwrap();
    }
}
