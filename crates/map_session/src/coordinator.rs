use std::{collections::HashMap, fmt, time::Duration};

use itertools::{Either, Itertools};
use model::{
    geometry::{Geometry, WebMercator},
    path::{Path, PathQuery, PathResponse},
    shape::{EditShapeRequest, PersistedShape, SavedShape, ShapeRecord, ShapeRequest},
    vehicle::VehiclePosition,
};
use utility::id::Id;

use crate::{
    backend::Backend,
    codec,
    config::SessionConfig,
    layers,
    state::MapState,
    viewport::View,
    BackendResult, MapError, MapResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Path,
    Save,
    ViewAll,
    LiveVehicles,
    Delete,
}

/// Identifies one dispatched request. Only the newest ticket of a flow is
/// accepted, and only within the epoch it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub flow: Flow,
    pub sequence: u64,
    pub epoch: u64,
}

/// A backend call to be made on behalf of a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    FetchPath(PathQuery),
    CreateShape(ShapeRequest),
    EditShape {
        id: Id<PersistedShape>,
        request: EditShapeRequest,
    },
    LoadShapes,
    LoadLiveVehicles,
    DeleteShape(Id<PersistedShape>),
}

#[derive(Debug)]
pub enum JobOutput {
    Path(BackendResult<Option<PathResponse>>),
    Created(BackendResult<SavedShape>),
    Edited(BackendResult<()>),
    Shapes(BackendResult<Vec<ShapeRecord>>),
    LiveVehicles(BackendResult<Vec<VehiclePosition>>),
    Deleted(BackendResult<()>),
}

impl Job {
    pub async fn run<B: Backend>(self, backend: &B) -> JobOutput {
        match self {
            Self::FetchPath(query) => JobOutput::Path(backend.vehicle_path(&query).await),
            Self::CreateShape(request) => JobOutput::Created(backend.save_shape(&request).await),
            Self::EditShape { id, request } => {
                JobOutput::Edited(backend.edit_shape(&id, &request).await)
            }
            Self::LoadShapes => JobOutput::Shapes(backend.all_shapes().await),
            Self::LoadLiveVehicles => JobOutput::LiveVehicles(backend.live_vehicles().await),
            Self::DeleteShape(id) => JobOutput::Deleted(backend.delete_shape(&id).await),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub ticket: Ticket,
    pub job: Job,
}

impl Dispatch {
    pub async fn run<B: Backend>(self, backend: &B) -> Finished {
        Finished {
            ticket: self.ticket,
            output: self.job.run(backend).await,
        }
    }
}

#[derive(Debug)]
pub struct Finished {
    pub ticket: Ticket,
    pub output: JobOutput,
}

/// Successful outcome of a flow, shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PathShown { vehicle_number: String, points: usize },
    ShapeCreated { id: Option<String> },
    ShapeEdited { id: String },
    ShapesLoaded { count: usize, skipped: usize },
    VehiclesRefreshed { count: usize, dropped: usize },
    ShapeDeleted { id: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PathShown {
                vehicle_number,
                points,
            } => write!(f, "Showing path of {vehicle_number} ({points} points)"),
            Self::ShapeCreated { id: Some(id) } => write!(f, "Feature saved with id {id}"),
            Self::ShapeCreated { id: None } => write!(f, "Feature saved"),
            Self::ShapeEdited { id } => write!(f, "Feature {id} updated"),
            Self::ShapesLoaded { count: 0, .. } => write!(f, "No saved features"),
            Self::ShapesLoaded { count, skipped: 0 } => write!(f, "Loaded {count} features"),
            Self::ShapesLoaded { count, skipped } => {
                write!(f, "Loaded {count} features, {skipped} unreadable")
            }
            Self::VehiclesRefreshed { count, dropped: 0 } => write!(f, "{count} vehicles live"),
            Self::VehiclesRefreshed { count, dropped } => {
                write!(f, "{count} vehicles live, {dropped} unusable positions dropped")
            }
            Self::ShapeDeleted { id } => write!(f, "Feature {id} deleted"),
        }
    }
}

/// What applying a completion did.
#[derive(Debug)]
pub enum Outcome {
    Applied(MapResult<Notice>),
    /// The response belonged to a superseded request and was dropped.
    Stale,
}

#[derive(Debug)]
pub struct Completion {
    pub outcome: Outcome,
    pub follow_up: Option<Dispatch>,
}

impl Completion {
    fn applied(result: MapResult<Notice>) -> Self {
        Self {
            outcome: Outcome::Applied(result),
            follow_up: None,
        }
    }
}

/// Runs the request/response flows against a [`MapState`].
///
/// Starting a flow yields a [`Dispatch`] for the caller to run; the
/// [`Finished`] result is handed back to [`QueryCoordinator::complete`].
/// The coordinator never awaits anything itself.
#[derive(Debug)]
pub struct QueryCoordinator {
    epoch: u64,
    sequence: u64,
    active: HashMap<Flow, (Ticket, Job)>,
    fit_padding_px: f64,
    fit_duration: Duration,
    default_view: View,
}

impl QueryCoordinator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            epoch: 0,
            sequence: 0,
            active: HashMap::new(),
            fit_padding_px: config.fit_padding_px,
            fit_duration: config.fit_duration(),
            default_view: config.default_view(),
        }
    }

    fn issue(&mut self, flow: Flow, job: Job) -> Dispatch {
        self.sequence += 1;
        let ticket = Ticket {
            flow,
            sequence: self.sequence,
            epoch: self.epoch,
        };
        if let Some((superseded, _)) = self.active.insert(flow, (ticket, job.clone())) {
            log::debug!("{flow:?} request {} superseded", superseded.sequence);
        }
        Dispatch { ticket, job }
    }

    fn take_active(&mut self, ticket: Ticket) -> Option<Job> {
        if ticket.epoch != self.epoch {
            return None;
        }
        match self.active.get(&ticket.flow) {
            Some((active, _)) if *active == ticket => {
                self.active.remove(&ticket.flow).map(|(_, job)| job)
            }
            _ => None,
        }
    }

    pub fn is_pending(&self, flow: Flow) -> bool {
        self.active.contains_key(&flow)
    }

    /// Starts the path flow. Returns `Ok(None)` while inputs are missing.
    pub fn show_path(&mut self, state: &MapState) -> MapResult<Option<Dispatch>> {
        let vehicle_number = state.filter.vehicle_number.trim();
        let (Some(from), Some(to)) = (state.filter.from_date, state.filter.to_date) else {
            log::debug!("path requested without a date range");
            return Ok(None);
        };
        if vehicle_number.is_empty() {
            log::debug!("path requested without a vehicle number");
            return Ok(None);
        }
        if from > to {
            return Err(MapError::validation(format!(
                "Start date {from} is after end date {to}"
            )));
        }
        let query = PathQuery::for_days(vehicle_number, from, to);
        log::info!(
            "requesting path of {} from {} to {}",
            query.vehicle_number,
            query.from,
            query.to
        );
        Ok(Some(self.issue(Flow::Path, Job::FetchPath(query))))
    }

    /// The payload that saves `geometry`. Also used to tell whether a
    /// geometry is the one a request carried.
    fn payload(geometry: &Geometry<WebMercator>) -> MapResult<ShapeRequest> {
        codec::to_request_payload(&codec::to_storage(geometry), geometry.kind())
    }

    fn was_sent(geometry: &Geometry<WebMercator>, request: &ShapeRequest) -> bool {
        Self::payload(geometry).is_ok_and(|payload| payload == *request)
    }

    /// Saves the selected shape, or else the drawn geometry.
    pub fn save(&mut self, state: &MapState) -> MapResult<Dispatch> {
        if let Some(selection) = state.interactions.selection() {
            let geometry = Self::payload(&selection.geometry)?;
            return Ok(self.issue(
                Flow::Save,
                Job::EditShape {
                    id: selection.id().clone(),
                    request: EditShapeRequest { geometry },
                },
            ));
        }
        self.save_drawn(state)
    }

    /// Saves the edited shape; there has to be one.
    pub fn save_edit(&mut self, state: &MapState) -> MapResult<Dispatch> {
        if state.interactions.selection().is_none() {
            return Err(MapError::precondition("no shape selected for editing"));
        }
        self.save(state)
    }

    fn save_drawn(&mut self, state: &MapState) -> MapResult<Dispatch> {
        let Some(drawn) = state.interactions.drawn() else {
            return Err(MapError::validation("Nothing to save, draw a feature first"));
        };
        let request = Self::payload(&drawn.geometry)?;
        Ok(self.issue(Flow::Save, Job::CreateShape(request)))
    }

    pub fn view_all(&mut self) -> Dispatch {
        self.issue(Flow::ViewAll, Job::LoadShapes)
    }

    pub fn refresh_live_vehicles(&mut self) -> Dispatch {
        self.issue(Flow::LiveVehicles, Job::LoadLiveVehicles)
    }

    pub fn delete_selected(&mut self, state: &MapState) -> MapResult<Dispatch> {
        let Some(selection) = state.interactions.selection() else {
            return Err(MapError::precondition("no shape selected"));
        };
        Ok(self.issue(Flow::Delete, Job::DeleteShape(selection.id().clone())))
    }

    /// Back to the initial map. Responses to earlier requests are ignored
    /// from now on.
    pub fn reset(&mut self, state: &mut MapState) {
        self.epoch += 1;
        self.active.clear();
        state.path.clear();
        state.shapes.clear();
        state.interactions.teardown();
        state.filter.clear();
        state.rebuild_vehicle_layer();
        state
            .viewport
            .recenter(self.default_view.center, self.default_view.zoom);
        log::info!("map reset");
    }

    /// Shows every vehicle again and drops a shown path.
    pub fn show_all(&mut self, state: &mut MapState) {
        self.active.remove(&Flow::Path);
        state.filter.show_all = true;
        state.filter.vehicle_number.clear();
        state.path.clear();
        state.rebuild_vehicle_layer();
    }

    pub fn complete(&mut self, finished: Finished, state: &mut MapState) -> Completion {
        let Finished { ticket, output } = finished;
        let Some(job) = self.take_active(ticket) else {
            log::info!(
                "discarding stale {:?} response (request {}, epoch {})",
                ticket.flow,
                ticket.sequence,
                ticket.epoch
            );
            return Completion {
                outcome: Outcome::Stale,
                follow_up: None,
            };
        };

        match (job, output) {
            (Job::FetchPath(query), JobOutput::Path(result)) => {
                Completion::applied(self.apply_path(query, result, state))
            }
            (Job::CreateShape(request), JobOutput::Created(result)) => match result {
                Ok(saved) => Completion {
                    outcome: Outcome::Applied(Ok(Self::apply_created(&request, saved, state))),
                    follow_up: Some(self.refresh_live_vehicles()),
                },
                Err(why) => Completion::applied(Err(why.into())),
            },
            (Job::EditShape { id, request }, JobOutput::Edited(result)) => {
                Completion::applied(Self::apply_edited(id, request, result, state))
            }
            (Job::LoadShapes, JobOutput::Shapes(result)) => {
                Completion::applied(Self::apply_shapes(result, state))
            }
            (Job::LoadLiveVehicles, JobOutput::LiveVehicles(result)) => {
                Completion::applied(Self::apply_live_vehicles(result, state))
            }
            (Job::DeleteShape(id), JobOutput::Deleted(result)) => {
                Completion::applied(Self::apply_deleted(id, result, state))
            }
            (job, output) => {
                log::error!("response {output:?} does not belong to {job:?}");
                Completion::applied(Err(MapError::precondition(
                    "response does not match its request",
                )))
            }
        }
    }

    fn apply_path(
        &self,
        query: PathQuery,
        result: BackendResult<Option<PathResponse>>,
        state: &mut MapState,
    ) -> MapResult<Notice> {
        let Some(response) = result? else {
            return Err(MapError::EmptyResult(format!(
                "No vehicle with number {}",
                query.vehicle_number
            )));
        };
        let path = Path::from_response(query.vehicle_number, response);
        let end = match path.end() {
            Some(end) if !path.is_degenerate() => codec::to_display(end),
            _ => {
                return Err(MapError::EmptyResult(format!(
                    "No path for {} in the selected range",
                    path.vehicle_number
                )))
            }
        };
        let line = path.coordinates.iter().copied().map(codec::to_display).collect();

        state.path.reconcile([layers::path_line_feature(line)]);
        state.filter.show_all = false;
        state.filter.vehicle_number = path.vehicle_number.clone();
        state.vehicles.clear();
        state
            .vehicles
            .reconcile(layers::path_end_features(&path.vehicle_number, end));
        state.viewport.fit_to_extent(
            &state.path.extent(),
            self.fit_padding_px,
            self.fit_duration,
        );

        Ok(Notice::PathShown {
            vehicle_number: path.vehicle_number,
            points: path.coordinates.len(),
        })
    }

    fn apply_created(request: &ShapeRequest, saved: SavedShape, state: &mut MapState) -> Notice {
        let drawing_saved = state
            .interactions
            .drawn()
            .is_some_and(|drawn| Self::was_sent(&drawn.geometry, request));
        if drawing_saved {
            state.interactions.take_drawn();
        }
        state.filter.clear();
        state.path.clear();
        state.shapes.clear();
        if let Some(drawn) = state.interactions.drawn() {
            log::info!("keeping a drawing that was finished while saving");
            state.shapes.upsert(layers::drawn_feature(drawn));
        }
        state.rebuild_vehicle_layer();
        log::info!("created shape {:?}", saved.id);
        Notice::ShapeCreated { id: saved.id }
    }

    fn apply_edited(
        id: Id<PersistedShape>,
        request: EditShapeRequest,
        result: BackendResult<()>,
        state: &mut MapState,
    ) -> MapResult<Notice> {
        result?;
        let saved = PersistedShape::new(
            id.clone(),
            codec::to_display_geometry(&codec::from_request_payload(&request.geometry)),
        );
        let unchanged = state
            .interactions
            .selection()
            .filter(|selection| *selection.id() == id)
            .map(|selection| Self::was_sent(&selection.geometry, &request.geometry));
        match unchanged {
            Some(true) => {
                if let Some(shape) = state.interactions.commit_edit() {
                    state.shapes.upsert(layers::shape_feature(&shape));
                }
            }
            Some(false) => {
                log::info!("shape {id} changed while saving, keeping the edit");
                state.interactions.rebase_edit(saved);
            }
            None if state.shapes.contains(&layers::shape_key(&id)) => {
                state.shapes.upsert(layers::shape_feature(&saved));
            }
            None => log::debug!("shape {id} is no longer shown"),
        }
        Ok(Notice::ShapeEdited { id: id.into_raw() })
    }

    fn apply_shapes(
        result: BackendResult<Vec<ShapeRecord>>,
        state: &mut MapState,
    ) -> MapResult<Notice> {
        let (shapes, unreadable): (Vec<_>, Vec<_>) = result?
            .into_iter()
            .filter_map(|record| match record.geometry {
                Some(dto) => Some((record.id, dto)),
                None => {
                    log::debug!("shape {} has no geometry", record.id);
                    None
                }
            })
            .partition_map(|(id, dto)| match codec::from_response(&dto) {
                Ok(geometry) => Either::Left(PersistedShape::new(Id::new(id), geometry)),
                Err(why) => Either::Right((id, why)),
            });
        for (id, why) in &unreadable {
            log::warn!("skipping shape {id}: {why}");
        }

        state.shapes.clear();
        state
            .shapes
            .reconcile(shapes.iter().map(layers::shape_feature));
        if let Some(drawn) = state.interactions.drawn() {
            state.shapes.upsert(layers::drawn_feature(drawn));
        }
        state.interactions.enable_selection();

        Ok(Notice::ShapesLoaded {
            count: shapes.len(),
            skipped: unreadable.len(),
        })
    }

    fn apply_live_vehicles(
        result: BackendResult<Vec<VehiclePosition>>,
        state: &mut MapState,
    ) -> MapResult<Notice> {
        let (usable, unusable): (Vec<_>, Vec<_>) = result?
            .into_iter()
            .partition(VehiclePosition::is_plausible);
        if !unusable.is_empty() {
            log::warn!(
                "dropped {} live vehicles with unusable positions",
                unusable.len()
            );
        }
        state.roster.replace_all(usable);
        state.refresh_vehicle_layer();
        Ok(Notice::VehiclesRefreshed {
            count: state.roster.len(),
            dropped: unusable.len(),
        })
    }

    fn apply_deleted(
        id: Id<PersistedShape>,
        result: BackendResult<()>,
        state: &mut MapState,
    ) -> MapResult<Notice> {
        result?;
        state.shapes.remove(&layers::shape_key(&id));
        let selected = state
            .interactions
            .selection()
            .is_some_and(|selection| *selection.id() == id);
        if selected {
            state.interactions.deselect();
        }
        Ok(Notice::ShapeDeleted { id: id.into_raw() })
    }
}
