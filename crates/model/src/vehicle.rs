use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{
    geometry::{Coordinate, Wgs84},
    ExampleData,
};

/// Last known position of a vehicle as sent by the live feed and by the
/// live-vehicles endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    #[serde(deserialize_with = "utility::serde::string_or_number::deserialize")]
    pub vehicle_id: String,
    /// Display label, not unique over time.
    pub vehicle_number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "utility::serde::instant")]
    pub timestamp: DateTime<Local>,
}

impl VehiclePosition {
    pub fn coordinate(&self) -> Coordinate<Wgs84> {
        Coordinate::new(self.longitude, self.latitude)
    }

    /// Whether the position is a usable geographic coordinate.
    pub fn is_plausible(&self) -> bool {
        !self.vehicle_id.is_empty()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl ExampleData for VehiclePosition {
    fn example_data() -> Self {
        Self {
            vehicle_id: "1".to_owned(),
            vehicle_number: "BA 2 KHA 1234".to_owned(),
            latitude: 27.7172,
            longitude: 85.324,
            timestamp: Local
                .with_ymd_and_hms(2024, 1, 5, 10, 0, 0)
                .earliest()
                .unwrap_or_else(Local::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_message() {
        let position: VehiclePosition = serde_json::from_str(
            r#"{"vehicleId":12,"vehicleNumber":"BA 1 PA 42","latitude":27.7,"longitude":85.3,"timestamp":"2024-01-05T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(position.vehicle_id, "12");
        assert_eq!(position.vehicle_number, "BA 1 PA 42");
        assert!(position.is_plausible());
        assert_eq!(position.coordinate(), Coordinate::new(85.3, 27.7));
    }

    #[test]
    fn rejects_out_of_range_positions() {
        let mut position = VehiclePosition::example_data();
        position.latitude = 123.0;
        assert!(!position.is_plausible());
    }
}
