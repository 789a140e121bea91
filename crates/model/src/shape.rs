use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::geometry::{Geometry, GeometryKind, WebMercator};

/// A user drawn shape that is stored on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedShape {
    pub id: Id<PersistedShape>,
    pub geometry: Geometry<WebMercator>,
}

impl HasId for PersistedShape {
    type IdType = String;
}

impl PersistedShape {
    pub fn new(id: Id<PersistedShape>, geometry: Geometry<WebMercator>) -> Self {
        Self { id, geometry }
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }
}

/// Result of a finished draw gesture that has not been saved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnGeometry {
    pub geometry: Geometry<WebMercator>,
}

impl DrawnGeometry {
    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }
}

/// Create/edit payload. Tagged with its kind so the backend can dispatch;
/// positions are `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "featureType")]
pub enum ShapeRequest {
    Point {
        point: [f64; 2],
    },
    LineString {
        #[serde(rename = "lineString")]
        line_string: Vec<[f64; 2]>,
    },
    Polygon {
        polygon: Vec<Vec<[f64; 2]>>,
    },
}

impl ShapeRequest {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point { .. } => GeometryKind::Point,
            Self::LineString { .. } => GeometryKind::LineString,
            Self::Polygon { .. } => GeometryKind::Polygon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditShapeRequest {
    pub geometry: ShapeRequest,
}

/// Answer of the save endpoint.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedShape {
    #[serde(
        default,
        alias = "featureTypeId",
        deserialize_with = "utility::serde::string_or_number::deserialize_option"
    )]
    pub id: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    #[serde(
        alias = "featureTypeId",
        deserialize_with = "utility::serde::string_or_number::deserialize"
    )]
    pub id: String,
    /// GeoJSON geometry object, decoded per record. Coordinates are
    /// `[longitude, latitude]`.
    #[serde(default)]
    pub geometry: Option<geojson::JsonObject>,
}
