use std::{error, fmt, marker::PhantomData, str::FromStr};

use geo::{BoundingRect, Coord, CoordsIter, LineString, MapCoords, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::ExampleData;

/// Coordinate reference system marker. Coordinates and geometries carry
/// their projection in the type, so display and storage coordinates can not
/// be mixed up.
pub trait Projection:
    fmt::Debug + Clone + Copy + Default + PartialEq + Send + Sync + 'static
{
}

/// Display projection of the map (EPSG:3857), in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WebMercator;

impl Projection for WebMercator {}

/// Storage projection of the backend (EPSG:4326), x = longitude and
/// y = latitude in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Wgs84;

impl Projection for Wgs84 {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate<P: Projection> {
    pub x: f64,
    pub y: f64,
    projection: PhantomData<P>,
}

impl<P: Projection> Coordinate<P> {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            projection: PhantomData,
        }
    }

    pub fn from_array([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }

    pub fn from_coord(coord: Coord) -> Self {
        Self::new(coord.x, coord.y)
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl<P: Projection> From<Coordinate<P>> for Coord {
    fn from(value: Coordinate<P>) -> Self {
        Coord {
            x: value.x,
            y: value.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 3] = [Self::Point, Self::LineString, Self::Polygon];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A geometry type name that is none of `Point`, `LineString` or `Polygon`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedGeometryKind(pub String);

impl error::Error for UnsupportedGeometryKind {}

impl fmt::Display for UnsupportedGeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unsupported geometry type: {}", self.0)
    }
}

impl FromStr for GeometryKind {
    type Err = UnsupportedGeometryKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnsupportedGeometryKind(s.to_owned()))
    }
}

/// The geometry types a shape can have.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
}

/// A [`Primitive`] in projection `P`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry<P: Projection> {
    primitive: Primitive,
    projection: PhantomData<P>,
}

impl<P: Projection> Geometry<P> {
    fn from_primitive(primitive: Primitive) -> Self {
        Self {
            primitive,
            projection: PhantomData,
        }
    }

    pub fn point(coordinate: Coordinate<P>) -> Self {
        Self::from_primitive(Primitive::Point(Point::from(Coord::from(coordinate))))
    }

    pub fn line_string<I>(coordinates: I) -> Self
    where
        I: IntoIterator<Item = Coordinate<P>>,
    {
        Self::from_primitive(Primitive::LineString(ring(coordinates)))
    }

    /// A polygon without holes. The ring is closed if it is not already.
    pub fn polygon<I>(exterior: I) -> Self
    where
        I: IntoIterator<Item = Coordinate<P>>,
    {
        Self::from_rings([exterior])
    }

    /// A polygon from its rings, the first one is the exterior.
    pub fn from_rings<R, I>(rings: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = Coordinate<P>>,
    {
        let mut rings = rings.into_iter().map(ring);
        let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Self::from_primitive(Primitive::Polygon(Polygon::new(exterior, rings.collect())))
    }

    pub fn primitive(&self) -> &Primitive {
        &self.primitive
    }

    pub fn kind(&self) -> GeometryKind {
        match self.primitive {
            Primitive::Point(_) => GeometryKind::Point,
            Primitive::LineString(_) => GeometryKind::LineString,
            Primitive::Polygon(_) => GeometryKind::Polygon,
        }
    }

    pub fn coordinates(&self) -> Vec<Coordinate<P>> {
        match &self.primitive {
            Primitive::Point(point) => point.coords_iter().map(Coordinate::from_coord).collect(),
            Primitive::LineString(line) => line.coords_iter().map(Coordinate::from_coord).collect(),
            Primitive::Polygon(polygon) => {
                polygon.coords_iter().map(Coordinate::from_coord).collect()
            }
        }
    }

    /// Applies `f` to every coordinate, keeping the structure.
    pub fn map<Q, F>(&self, f: F) -> Geometry<Q>
    where
        Q: Projection,
        F: Fn(Coordinate<P>) -> Coordinate<Q>,
    {
        let f = &f;
        let convert = move |coord: Coord| Coord::from(f(Coordinate::from_coord(coord)));
        Geometry::from_primitive(match &self.primitive {
            Primitive::Point(point) => Primitive::Point(point.map_coords(convert)),
            Primitive::LineString(line) => Primitive::LineString(line.map_coords(convert)),
            Primitive::Polygon(polygon) => Primitive::Polygon(polygon.map_coords(convert)),
        })
    }

    pub fn extent(&self) -> Extent<P> {
        Extent::from_rect(match &self.primitive {
            Primitive::Point(point) => Some(point.bounding_rect()),
            Primitive::LineString(line) => line.bounding_rect(),
            Primitive::Polygon(polygon) => polygon.bounding_rect(),
        })
    }
}

fn ring<P, I>(coordinates: I) -> LineString
where
    P: Projection,
    I: IntoIterator<Item = Coordinate<P>>,
{
    coordinates.into_iter().map(Coord::from).collect()
}

/// Axis aligned bounding box. An extent without coordinates is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent<P: Projection> {
    rect: Option<Rect>,
    projection: PhantomData<P>,
}

impl<P: Projection> Default for Extent<P> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<P: Projection> Extent<P> {
    pub fn empty() -> Self {
        Self::from_rect(None)
    }

    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::from_rect(Some(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        )))
    }

    pub fn from_rect(rect: Option<Rect>) -> Self {
        Self {
            rect,
            projection: PhantomData,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.rect = match (self.rect, other.rect) {
            (Some(a), Some(b)) => Some(Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )),
            (a, b) => a.or(b),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_none()
    }

    pub fn width(&self) -> f64 {
        self.rect.map_or(0.0, |rect| rect.width())
    }

    pub fn height(&self) -> f64 {
        self.rect.map_or(0.0, |rect| rect.height())
    }

    pub fn min(&self) -> Option<Coordinate<P>> {
        self.rect.map(|rect| Coordinate::from_coord(rect.min()))
    }

    pub fn max(&self) -> Option<Coordinate<P>> {
        self.rect.map(|rect| Coordinate::from_coord(rect.max()))
    }

    pub fn center(&self) -> Option<Coordinate<P>> {
        self.rect.map(|rect| Coordinate::from_coord(rect.center()))
    }
}

impl ExampleData for Geometry<Wgs84> {
    fn example_data() -> Self {
        Geometry::polygon([
            Coordinate::new(85.30, 27.70),
            Coordinate::new(85.35, 27.70),
            Coordinate::new(85.35, 27.74),
            Coordinate::new(85.30, 27.74),
            Coordinate::new(85.30, 27.70),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("polygon".parse::<GeometryKind>(), Ok(GeometryKind::Polygon));
        assert_eq!("LineString".parse::<GeometryKind>(), Ok(GeometryKind::LineString));
        assert_eq!(
            "Circle".parse::<GeometryKind>(),
            Err(UnsupportedGeometryKind("Circle".to_owned()))
        );
    }

    #[test]
    fn extent_of_polygon() {
        let extent = Geometry::<Wgs84>::example_data().extent();
        assert!(!extent.is_empty());
        assert!((extent.width() - 0.05).abs() < 1e-9);
        assert!((extent.height() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn empty_extent_has_no_center() {
        let extent = Extent::<WebMercator>::empty();
        assert!(extent.is_empty());
        assert_eq!(extent.width(), 0.0);
        assert!(extent.center().is_none());
    }

    #[test]
    fn point_extent_is_not_empty() {
        let extent = Geometry::point(Coordinate::<WebMercator>::new(1.0, 2.0)).extent();
        assert!(!extent.is_empty());
        assert_eq!(extent.width(), 0.0);
        assert_eq!(extent.center(), Some(Coordinate::new(1.0, 2.0)));
    }

    #[test]
    fn merged_extent_covers_both() {
        let mut extent = Extent::<WebMercator>::empty();
        extent.merge(&Extent::new(0.0, 0.0, 1.0, 1.0));
        extent.merge(&Extent::empty());
        extent.merge(&Extent::new(-2.0, 0.5, 0.5, 3.0));
        assert_eq!(extent.min(), Some(Coordinate::new(-2.0, 0.0)));
        assert_eq!(extent.max(), Some(Coordinate::new(1.0, 3.0)));
    }

    #[test]
    fn polygons_are_closed() {
        let polygon = Geometry::<Wgs84>::polygon([
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 1.0),
        ]);
        let coordinates = polygon.coordinates();
        assert_eq!(coordinates.len(), 4);
        assert_eq!(coordinates.first(), coordinates.last());
    }

    #[test]
    fn map_keeps_structure() {
        let polygon = Geometry::<Wgs84>::example_data();
        let shifted: Geometry<WebMercator> =
            polygon.map(|c| Coordinate::new(c.x + 1.0, c.y));
        assert_eq!(shifted.kind(), GeometryKind::Polygon);
        assert_eq!(shifted.coordinates().len(), polygon.coordinates().len());
        assert!((shifted.extent().width() - 0.05).abs() < 1e-9);
    }
}
