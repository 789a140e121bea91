use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::geometry::{Coordinate, Wgs84};

/// A historical path request. The window is inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathQuery {
    pub vehicle_number: String,
    #[serde(with = "utility::serde::local_date_time")]
    pub from: NaiveDateTime,
    #[serde(with = "utility::serde::local_date_time")]
    pub to: NaiveDateTime,
}

impl PathQuery {
    /// Builds a query covering the full local calendar days `from` to `to`,
    /// i.e. `from 00:00:00` to `to 23:59:59`.
    pub fn for_days<S: Into<String>>(vehicle_number: S, from: NaiveDate, to: NaiveDate) -> Self {
        let start = from.and_time(NaiveTime::MIN);
        let end = to.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1);
        Self {
            vehicle_number: vehicle_number.into(),
            from: start,
            to: end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
}

/// Body of the path endpoint. The server answers with an empty body when
/// the vehicle is unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathResponse {
    #[serde(default)]
    pub coordinates: Vec<PathPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub vehicle_number: String,
    pub coordinates: Vec<Coordinate<Wgs84>>,
}

impl Path {
    pub fn from_response<S: Into<String>>(vehicle_number: S, response: PathResponse) -> Self {
        Self {
            vehicle_number: vehicle_number.into(),
            coordinates: response
                .coordinates
                .into_iter()
                .map(|point| Coordinate::new(point.x, point.y))
                .collect(),
        }
    }

    /// A path needs at least two points to be drawn as a line.
    pub fn is_degenerate(&self) -> bool {
        self.coordinates.len() < 2
    }

    pub fn end(&self) -> Option<Coordinate<Wgs84>> {
        self.coordinates.last().copied()
    }
}
