use async_trait::async_trait;
use model::{
    path::{PathQuery, PathResponse},
    shape::{EditShapeRequest, PersistedShape, SavedShape, ShapeRecord, ShapeRequest},
    vehicle::VehiclePosition,
};
use utility::id::Id;

use crate::BackendResult;

/// The tracking backend. All coordinates crossing this seam are WGS84.
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    async fn live_vehicles(&self) -> BackendResult<Vec<VehiclePosition>>;

    /// `Ok(None)` when the server knows no vehicle with that number.
    async fn vehicle_path(&self, query: &PathQuery) -> BackendResult<Option<PathResponse>>;

    async fn save_shape(&self, request: &ShapeRequest) -> BackendResult<SavedShape>;

    async fn edit_shape(
        &self,
        id: &Id<PersistedShape>,
        request: &EditShapeRequest,
    ) -> BackendResult<()>;

    async fn all_shapes(&self) -> BackendResult<Vec<ShapeRecord>>;

    async fn delete_shape(&self, id: &Id<PersistedShape>) -> BackendResult<()>;
}
