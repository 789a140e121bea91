use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use model::{
    geometry::{Geometry, Wgs84},
    path::{PathQuery, PathResponse},
    shape::{EditShapeRequest, PersistedShape, SavedShape, ShapeRecord, ShapeRequest},
    vehicle::VehiclePosition,
};
use utility::id::Id;

use crate::{backend::Backend, codec, BackendError, BackendResult};

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<&'static str>,
    live: Vec<VehiclePosition>,
    paths: HashMap<String, PathResponse>,
    last_path_query: Option<PathQuery>,
    records: Vec<ShapeRecord>,
    next_id: u64,
    failing: bool,
}

/// In-memory backend that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MockBackend {
    pub fn with_live(self, positions: Vec<VehiclePosition>) -> Self {
        self.inner.lock().unwrap().live = positions;
        self
    }

    pub fn with_path(self, vehicle_number: &str, response: PathResponse) -> Self {
        self.inner
            .lock()
            .unwrap()
            .paths
            .insert(vehicle_number.to_owned(), response);
        self
    }

    pub fn with_shape(self, id: &str, geometry: Geometry<Wgs84>) -> Self {
        self.inner.lock().unwrap().records.push(ShapeRecord {
            id: id.to_owned(),
            geometry: Some(codec::to_response(&geometry)),
        });
        self
    }

    pub fn with_shapeless_record(self, id: &str) -> Self {
        self.inner.lock().unwrap().records.push(ShapeRecord {
            id: id.to_owned(),
            geometry: None,
        });
        self
    }

    pub fn fail_requests(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn count(&self, call: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|name| **name == call)
            .count()
    }

    pub fn records(&self) -> Vec<ShapeRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn last_path_query(&self) -> Option<PathQuery> {
        self.inner.lock().unwrap().last_path_query.clone()
    }

    fn call(&self, name: &'static str) -> BackendResult<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(name);
        if inner.failing {
            return Err(BackendError::Rejected {
                status: 500,
                url: format!("mock://{name}"),
                body: None,
            });
        }
        Ok(inner)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn live_vehicles(&self) -> BackendResult<Vec<VehiclePosition>> {
        Ok(self.call("live_vehicles")?.live.clone())
    }

    async fn vehicle_path(&self, query: &PathQuery) -> BackendResult<Option<PathResponse>> {
        let mut inner = self.call("vehicle_path")?;
        inner.last_path_query = Some(query.clone());
        Ok(inner.paths.get(&query.vehicle_number).cloned())
    }

    async fn save_shape(&self, request: &ShapeRequest) -> BackendResult<SavedShape> {
        let mut inner = self.call("save_shape")?;
        inner.next_id += 1;
        let id = format!("new-{}", inner.next_id);
        inner.records.push(ShapeRecord {
            id: id.clone(),
            geometry: Some(codec::to_response(&codec::from_request_payload(request))),
        });
        Ok(SavedShape { id: Some(id) })
    }

    async fn edit_shape(
        &self,
        id: &Id<PersistedShape>,
        request: &EditShapeRequest,
    ) -> BackendResult<()> {
        let mut inner = self.call("edit_shape")?;
        let record = inner
            .records
            .iter_mut()
            .find(|record| record.id == id.as_str())
            .ok_or(BackendError::NotFound)?;
        record.geometry = Some(codec::to_response(&codec::from_request_payload(
            &request.geometry,
        )));
        Ok(())
    }

    async fn all_shapes(&self) -> BackendResult<Vec<ShapeRecord>> {
        Ok(self.call("all_shapes")?.records.clone())
    }

    async fn delete_shape(&self, id: &Id<PersistedShape>) -> BackendResult<()> {
        let mut inner = self.call("delete_shape")?;
        let before = inner.records.len();
        inner.records.retain(|record| record.id != id.as_str());
        if inner.records.len() == before {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }
}
