use std::{collections::VecDeque, fmt};

use chrono::NaiveDate;
use model::{
    geometry::{Geometry, GeometryKind, WebMercator},
    shape::PersistedShape,
    vehicle::VehiclePosition,
};
use utility::id::Id;

use crate::{
    backend::Backend,
    config::SessionConfig,
    coordinator::{Dispatch, Finished, Outcome, QueryCoordinator},
    feature_index::{Layer, RenderedFeature},
    interaction::{Interaction, InteractionHandle, InteractionState},
    layers,
    state::{MapState, VehicleFilter},
    viewport::{View, ViewTransition},
    MapError, MapResult,
};

/// One per UI control or map gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetVehicleNumber(String),
    SetFromDate(Option<NaiveDate>),
    SetToDate(Option<NaiveDate>),
    ShowPath,
    ShowAll,
    Draw(GeometryKind),
    Save,
    ViewAll,
    Reset,
    EnableEdit,
    SaveEdit,
    Discard,
    Delete,
    RefreshVehicles,
    DrawEnd(Geometry<WebMercator>),
    Select(Id<PersistedShape>),
    ModifyEnd(Geometry<WebMercator>),
    ViewSettled(View),
    Resize { width: f64, height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{prefix}] {}", self.message)
    }
}

impl From<&MapError> for Severity {
    fn from(value: &MapError) -> Self {
        match value {
            MapError::Validation(_)
            | MapError::EmptyResult(_)
            | MapError::PreconditionViolation(_) => Severity::Warning,
            MapError::Request(_) | MapError::UnsupportedGeometryKind(_) => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub layer: Layer,
    pub features: Vec<(String, RenderedFeature)>,
}

/// Everything the render layer needs to draw the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub filter: VehicleFilter,
    pub interaction: InteractionState,
    pub can_save: bool,
    pub can_edit: bool,
    pub attached: Vec<(InteractionHandle, Interaction)>,
    pub layers: Vec<LayerSnapshot>,
    pub view: View,
    pub pending_view: Option<ViewTransition>,
    pub notifications: Vec<Notification>,
}

impl MapSnapshot {
    pub fn layer(&self, layer: Layer) -> Option<&LayerSnapshot> {
        self.layers.iter().find(|snapshot| snapshot.layer == layer)
    }
}

/// The map context: state, flows and the queue of user messages. All
/// mutation goes through `&mut self`, one event at a time.
#[derive(Debug)]
pub struct MapSession {
    state: MapState,
    coordinator: QueryCoordinator,
    notifications: VecDeque<Notification>,
}

impl MapSession {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: MapState::new(config),
            coordinator: QueryCoordinator::new(config),
            notifications: VecDeque::new(),
        }
    }

    /// Requests to issue when the map opens.
    pub fn start(&mut self) -> Vec<Dispatch> {
        vec![self.coordinator.refresh_live_vehicles()]
    }

    pub fn state(&self) -> &MapState {
        &self.state
    }

    pub fn coordinator(&self) -> &QueryCoordinator {
        &self.coordinator
    }

    fn notify<S: Into<String>>(&mut self, severity: Severity, message: S) {
        self.notifications.push_back(Notification {
            severity,
            message: message.into(),
        });
    }

    fn report(&mut self, why: MapError) {
        let severity = Severity::from(&why);
        match severity {
            Severity::Error => log::error!("{why}"),
            _ => log::warn!("{why}"),
        }
        self.notify(severity, why.to_string());
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    pub fn take_view_transition(&mut self) -> Option<ViewTransition> {
        self.state.viewport.take_pending()
    }

    /// Applies a command and returns the backend requests it starts.
    pub fn handle(&mut self, command: Command) -> Vec<Dispatch> {
        log::debug!("handling {command:?}");
        match self.apply(command) {
            Ok(dispatch) => dispatch.into_iter().collect(),
            Err(why) => {
                self.report(why);
                Vec::new()
            }
        }
    }

    fn apply(&mut self, command: Command) -> MapResult<Option<Dispatch>> {
        let state = &mut self.state;
        match command {
            Command::SetVehicleNumber(vehicle_number) => {
                state.filter.vehicle_number = vehicle_number;
            }
            Command::SetFromDate(date) => state.filter.from_date = date,
            Command::SetToDate(date) => state.filter.to_date = date,
            Command::ShowPath => return self.coordinator.show_path(state),
            Command::ShowAll => self.coordinator.show_all(state),
            Command::Draw(kind) => state.interactions.start_draw(kind)?,
            Command::Save => return self.coordinator.save(state).map(Some),
            Command::SaveEdit => return self.coordinator.save_edit(state).map(Some),
            Command::ViewAll => return Ok(Some(self.coordinator.view_all())),
            Command::RefreshVehicles => return Ok(Some(self.coordinator.refresh_live_vehicles())),
            Command::Delete => return self.coordinator.delete_selected(state).map(Some),
            Command::Reset => {
                self.coordinator.reset(state);
                self.notify(Severity::Info, "Map reset");
            }
            Command::EnableEdit => state.interactions.enable_edit()?,
            Command::Discard => {
                let discarded = state.interactions.discard();
                if let Some(original) = &discarded.restored {
                    state.shapes.upsert(layers::shape_feature(original));
                }
                if discarded.dropped_drawing {
                    state.shapes.remove(layers::DRAWN_KEY);
                }
            }
            Command::DrawEnd(geometry) => {
                let drawn = state.interactions.finish_draw(geometry)?;
                state.shapes.upsert(layers::drawn_feature(drawn));
            }
            Command::Select(id) => {
                let feature = state
                    .shapes
                    .get(&layers::shape_key(&id))
                    .ok_or_else(|| {
                        MapError::precondition(format!("there is no saved feature {id}"))
                    })?;
                let shape = PersistedShape::new(id, feature.geometry.clone());
                state.interactions.select(shape)?;
            }
            Command::ModifyEnd(geometry) => {
                let shape = state.interactions.update_edit(geometry)?;
                state.shapes.upsert(layers::shape_feature(&shape));
            }
            Command::ViewSettled(view) => state.viewport.settle(view),
            Command::Resize { width, height } => state.viewport.resize(width, height),
        }
        Ok(None)
    }

    /// Handles one message of the position feed.
    pub fn on_position(&mut self, position: VehiclePosition) {
        if !position.is_plausible() {
            log::warn!("ignoring implausible position {position:?}");
            return;
        }
        if self.state.roster.upsert(position) {
            self.state.refresh_vehicle_layer();
        }
    }

    /// Applies a backend response and returns follow-up requests.
    pub fn complete(&mut self, finished: Finished) -> Vec<Dispatch> {
        let completion = self.coordinator.complete(finished, &mut self.state);
        match completion.outcome {
            Outcome::Applied(Ok(notice)) => {
                log::info!("{notice}");
                self.notify(Severity::Info, notice.to_string());
            }
            Outcome::Applied(Err(why)) => self.report(why),
            Outcome::Stale => {}
        }
        completion.follow_up.into_iter().collect()
    }

    /// Runs `dispatches` and all their follow-ups one after another.
    pub async fn run<B: Backend>(&mut self, backend: &B, dispatches: Vec<Dispatch>) {
        let mut queue = VecDeque::from(dispatches);
        while let Some(dispatch) = queue.pop_front() {
            let finished = dispatch.run(backend).await;
            queue.extend(self.complete(finished));
        }
    }

    /// Handles `command` and waits for every request it causes.
    pub async fn execute<B: Backend>(&mut self, backend: &B, command: Command) {
        let dispatches = self.handle(command);
        self.run(backend, dispatches).await;
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let state = &self.state;
        let layers = [Layer::Vehicles, Layer::Path, Layer::Shapes]
            .into_iter()
            .map(|layer| LayerSnapshot {
                layer,
                features: state
                    .layer(layer)
                    .iter()
                    .map(|(key, feature)| (key.to_owned(), feature.clone()))
                    .collect(),
            })
            .collect();
        MapSnapshot {
            filter: state.filter.clone(),
            interaction: state.interactions.state(),
            can_save: state.interactions.can_save(),
            can_edit: state.interactions.can_edit(),
            attached: state
                .interactions
                .attached()
                .map(|(handle, interaction)| (handle, interaction.clone()))
                .collect(),
            layers,
            view: state.viewport.current(),
            pending_view: state.viewport.pending().copied(),
            notifications: self.notifications.iter().cloned().collect(),
        }
    }
}
