//! Conversions between display geometry (Web Mercator), storage geometry
//! (WGS84) and the wire DTOs of the backend.

use geo::{LineString, Polygon};
use geojson::{JsonObject, Position, Value};
use model::{
    geometry::{
        Coordinate, Geometry, GeometryKind, Primitive, UnsupportedGeometryKind, WebMercator, Wgs84,
    },
    shape::ShapeRequest,
};
use utility::geo as projection;

use crate::{BackendError, MapError, MapResult};

pub fn to_display(coordinate: Coordinate<Wgs84>) -> Coordinate<WebMercator> {
    let (x, y) = projection::lon_lat_to_web_mercator(coordinate.x, coordinate.y);
    Coordinate::new(x, y)
}

pub fn to_storage_coordinate(coordinate: Coordinate<WebMercator>) -> Coordinate<Wgs84> {
    let (longitude, latitude) = projection::web_mercator_to_lon_lat(coordinate.x, coordinate.y);
    Coordinate::new(longitude, latitude)
}

pub fn to_storage(geometry: &Geometry<WebMercator>) -> Geometry<Wgs84> {
    geometry.map(to_storage_coordinate)
}

pub fn to_display_geometry(geometry: &Geometry<Wgs84>) -> Geometry<WebMercator> {
    geometry.map(to_display)
}

/// Encodes a storage geometry as create payload. `kind` is the kind the
/// caller believes it is sending; a mismatch is refused.
pub fn to_request_payload(geometry: &Geometry<Wgs84>, kind: GeometryKind) -> MapResult<ShapeRequest> {
    if geometry.kind() != kind {
        return Err(MapError::precondition(format!(
            "geometry is a {} but a {kind} was requested",
            geometry.kind()
        )));
    }
    Ok(encode(geometry))
}

/// Inverse of [`to_request_payload`].
pub fn from_request_payload(request: &ShapeRequest) -> Geometry<Wgs84> {
    match request {
        ShapeRequest::Point { point } => Geometry::point(Coordinate::from_array(*point)),
        ShapeRequest::LineString { line_string } => {
            Geometry::line_string(line_string.iter().copied().map(Coordinate::from_array))
        }
        ShapeRequest::Polygon { polygon } => Geometry::from_rings(
            polygon
                .iter()
                .map(|ring| ring.iter().copied().map(Coordinate::from_array)),
        ),
    }
}

fn rings(polygon: &Polygon) -> impl Iterator<Item = &LineString> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

fn encode(geometry: &Geometry<Wgs84>) -> ShapeRequest {
    let position = |coord: &geo::Coord| [coord.x, coord.y];
    match geometry.primitive() {
        Primitive::Point(point) => ShapeRequest::Point {
            point: [point.x(), point.y()],
        },
        Primitive::LineString(line) => ShapeRequest::LineString {
            line_string: line.coords().map(position).collect(),
        },
        Primitive::Polygon(polygon) => ShapeRequest::Polygon {
            polygon: rings(polygon)
                .map(|ring| ring.coords().map(position).collect())
                .collect(),
        },
    }
}

/// Renders a storage geometry the way the list endpoint returns it.
pub fn to_response(geometry: &Geometry<Wgs84>) -> JsonObject {
    let position = |coord: &geo::Coord| vec![coord.x, coord.y];
    let value = match geometry.primitive() {
        Primitive::Point(point) => Value::Point(vec![point.x(), point.y()]),
        Primitive::LineString(line) => Value::LineString(line.coords().map(position).collect()),
        Primitive::Polygon(polygon) => Value::Polygon(
            rings(polygon)
                .map(|ring| ring.coords().map(position).collect())
                .collect(),
        ),
    };
    JsonObject::from(&geojson::Geometry::new(value))
}

fn malformed<S: Into<String>>(message: S) -> MapError {
    MapError::Request(BackendError::Decode(message.into().into()))
}

fn coordinate(position: &Position) -> MapResult<Coordinate<Wgs84>> {
    // a third value is the altitude
    match position.as_slice() {
        [longitude, latitude, ..] => Ok(Coordinate::new(*longitude, *latitude)),
        _ => Err(malformed(format!("position {position:?} has no longitude and latitude"))),
    }
}

fn coordinates(positions: &[Position]) -> MapResult<Vec<Coordinate<Wgs84>>> {
    positions.iter().map(coordinate).collect()
}

fn unsupported(kind: &str) -> MapError {
    UnsupportedGeometryKind(kind.to_owned()).into()
}

/// Decodes a geometry of the list endpoint into display projection.
pub fn from_response(object: &JsonObject) -> MapResult<Geometry<WebMercator>> {
    let geometry = geojson::Geometry::from_json_object(object.clone()).map_err(|why| match why {
        geojson::Error::GeometryUnknownType(kind) => unsupported(&kind),
        why => MapError::Request(BackendError::decode(why)),
    })?;
    let storage = match &geometry.value {
        Value::Point(position) => Geometry::point(coordinate(position)?),
        Value::LineString(line) => Geometry::line_string(coordinates(line)?),
        Value::Polygon(polygon) if polygon.is_empty() => {
            return Err(malformed("polygon without rings"))
        }
        Value::Polygon(polygon) => Geometry::from_rings(
            polygon
                .iter()
                .map(|ring| coordinates(ring))
                .collect::<MapResult<Vec<_>>>()?,
        ),
        Value::MultiPoint(_) => return Err(unsupported("MultiPoint")),
        Value::MultiLineString(_) => return Err(unsupported("MultiLineString")),
        Value::MultiPolygon(_) => return Err(unsupported("MultiPolygon")),
        Value::GeometryCollection(_) => return Err(unsupported("GeometryCollection")),
    };
    Ok(to_display_geometry(&storage))
}
