//! Builders for the features of each layer.

use model::{
    geometry::{Coordinate, Geometry, WebMercator},
    shape::{DrawnGeometry, PersistedShape},
    vehicle::VehiclePosition,
};
use utility::id::Id;

use crate::{
    codec,
    feature_index::{Feature, FeatureStyle},
};

// Server ids only ever appear behind a prefix, fixed keys carry none of
// those prefixes.
pub const PATH_END_ICON_KEY: &str = "path-end-icon";
pub const PATH_END_LABEL_KEY: &str = "path-end-label";
pub const PATH_LINE_KEY: &str = "path-line";
pub const DRAWN_KEY: &str = "drawn";

pub fn icon_key(vehicle_id: &str) -> String {
    format!("icon-{vehicle_id}")
}

pub fn label_key(vehicle_id: &str) -> String {
    format!("label-{vehicle_id}")
}

pub fn shape_key(id: &Id<PersistedShape>) -> String {
    format!("shape-{id}")
}

/// Keys in the vehicle layer that survive pruning.
pub fn protected_vehicle_keys() -> [&'static str; 2] {
    [PATH_END_ICON_KEY, PATH_END_LABEL_KEY]
}

pub fn vehicle_features(position: &VehiclePosition) -> [Feature; 2] {
    let point = Geometry::point(codec::to_display(position.coordinate()));
    [
        Feature::new(
            icon_key(&position.vehicle_id),
            point.clone(),
            FeatureStyle::VehicleIcon,
        ),
        Feature::new(
            label_key(&position.vehicle_id),
            point,
            FeatureStyle::VehicleLabel {
                text: position.vehicle_number.clone(),
            },
        ),
    ]
}

pub fn path_end_features(vehicle_number: &str, end: Coordinate<WebMercator>) -> [Feature; 2] {
    let point = Geometry::point(end);
    [
        Feature::new(PATH_END_ICON_KEY, point.clone(), FeatureStyle::PathEnd),
        Feature::new(
            PATH_END_LABEL_KEY,
            point,
            FeatureStyle::PathEndLabel {
                text: vehicle_number.to_owned(),
            },
        ),
    ]
}

pub fn path_line_feature(line: Vec<Coordinate<WebMercator>>) -> Feature {
    Feature::new(PATH_LINE_KEY, Geometry::line_string(line), FeatureStyle::PathLine)
}

pub fn shape_feature(shape: &PersistedShape) -> Feature {
    Feature::new(shape_key(&shape.id), shape.geometry.clone(), FeatureStyle::Shape)
}

pub fn drawn_feature(drawn: &DrawnGeometry) -> Feature {
    Feature::new(DRAWN_KEY, drawn.geometry.clone(), FeatureStyle::Drawn)
}

#[cfg(test)]
mod tests {
    use model::ExampleData;

    use super::*;

    #[test]
    fn vehicles_render_as_icon_and_label() {
        let position = VehiclePosition::example_data();
        let [icon, label] = vehicle_features(&position);
        assert_eq!(icon.key, "icon-1");
        assert_eq!(label.key, "label-1");
        assert_eq!(icon.geometry, label.geometry);
        assert_eq!(
            label.style,
            FeatureStyle::VehicleLabel {
                text: "BA 2 KHA 1234".to_owned()
            }
        );
    }

    #[test]
    fn path_end_keys_are_protected() {
        let [icon, label] = path_end_features("X", Coordinate::new(0.0, 0.0));
        let protected = protected_vehicle_keys();
        assert!(protected.contains(&icon.key.as_str()));
        assert!(protected.contains(&label.key.as_str()));
    }

    #[test]
    fn server_ids_can_not_hit_fixed_keys() {
        let position = VehiclePosition {
            vehicle_id: "path-end".to_owned(),
            ..VehiclePosition::example_data()
        };
        let [end_icon, end_label] = path_end_features("X", Coordinate::new(0.0, 0.0));
        for vehicle in vehicle_features(&position) {
            assert_ne!(vehicle.key, end_icon.key);
            assert_ne!(vehicle.key, end_label.key);
        }

        let shape = PersistedShape::new(
            Id::from(DRAWN_KEY),
            Geometry::point(Coordinate::new(0.0, 0.0)),
        );
        assert_ne!(shape_feature(&shape).key, DRAWN_KEY);
        assert_eq!(shape_feature(&shape).key, "shape-drawn");
    }
}
