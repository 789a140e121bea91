use chrono::NaiveDate;
use indexmap::IndexMap;
use model::vehicle::VehiclePosition;
use serde::Serialize;

use crate::{
    config::SessionConfig,
    feature_index::{FeatureIndex, Layer},
    interaction::InteractionStateMachine,
    layers,
    viewport::ViewportController,
};

/// Latest known position per vehicle, in order of first appearance.
#[derive(Debug, Default, Clone)]
pub struct VehicleRoster {
    positions: IndexMap<String, VehiclePosition>,
}

impl VehicleRoster {
    /// Stores `position` unless the roster already has a newer one for the
    /// same vehicle. Returns whether the roster changed.
    pub fn upsert(&mut self, position: VehiclePosition) -> bool {
        match self.positions.get_mut(&position.vehicle_id) {
            Some(known) if known.timestamp > position.timestamp => false,
            Some(known) if *known == position => false,
            Some(known) => {
                *known = position;
                true
            }
            None => {
                self.positions.insert(position.vehicle_id.clone(), position);
                true
            }
        }
    }

    pub fn replace_all<I: IntoIterator<Item = VehiclePosition>>(&mut self, positions: I) {
        self.positions = positions
            .into_iter()
            .map(|position| (position.vehicle_id.clone(), position))
            .collect();
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&VehiclePosition> {
        self.positions.get(vehicle_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehiclePosition> {
        self.positions.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFilter {
    pub show_all: bool,
    pub vehicle_number: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl Default for VehicleFilter {
    fn default() -> Self {
        Self {
            show_all: true,
            vehicle_number: String::new(),
            from_date: None,
            to_date: None,
        }
    }
}

impl VehicleFilter {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, position: &VehiclePosition) -> bool {
        self.show_all || position.vehicle_number == self.vehicle_number.trim()
    }
}

/// Everything shown on the map. Owned by exactly one session and handed to
/// the components by `&mut`.
#[derive(Debug)]
pub struct MapState {
    pub roster: VehicleRoster,
    pub filter: VehicleFilter,
    pub vehicles: FeatureIndex,
    pub path: FeatureIndex,
    pub shapes: FeatureIndex,
    pub interactions: InteractionStateMachine,
    pub viewport: ViewportController,
}

impl MapState {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            roster: VehicleRoster::default(),
            filter: VehicleFilter::default(),
            vehicles: FeatureIndex::new(Layer::Vehicles)
                .with_protected(layers::protected_vehicle_keys()),
            path: FeatureIndex::new(Layer::Path),
            shapes: FeatureIndex::new(Layer::Shapes),
            interactions: InteractionStateMachine::new(Layer::Shapes),
            viewport: ViewportController::new(
                config.default_view(),
                config.viewport_width,
                config.viewport_height,
                config.min_zoom,
                config.max_zoom,
            ),
        }
    }

    /// Brings the vehicle layer in line with roster and filter. A path end
    /// marker stays until the layer is cleared.
    pub fn refresh_vehicle_layer(&mut self) {
        let filter = &self.filter;
        let desired = self
            .roster
            .iter()
            .filter(|position| filter.matches(position))
            .flat_map(layers::vehicle_features);
        self.vehicles.reconcile(desired);
    }

    /// Drops the path end marker and rebuilds the vehicle layer.
    pub fn rebuild_vehicle_layer(&mut self) {
        self.vehicles.clear();
        self.refresh_vehicle_layer();
    }

    pub fn layer(&self, layer: Layer) -> &FeatureIndex {
        match layer {
            Layer::Vehicles => &self.vehicles,
            Layer::Path => &self.path,
            Layer::Shapes => &self.shapes,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use model::ExampleData;

    use super::*;

    #[test]
    fn roster_keeps_latest_position() {
        let mut roster = VehicleRoster::default();
        let first = VehiclePosition::example_data();
        let mut later = first.clone();
        later.latitude += 0.01;
        later.timestamp = first.timestamp + Duration::seconds(5);

        assert!(roster.upsert(first.clone()));
        assert!(roster.upsert(later.clone()));
        assert!(!roster.upsert(first));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("1"), Some(&later));
    }

    #[test]
    fn filter_narrows_by_vehicle_number() {
        let position = VehiclePosition::example_data();
        let mut filter = VehicleFilter::default();
        assert!(filter.matches(&position));

        filter.show_all = false;
        filter.vehicle_number = "other".to_owned();
        assert!(!filter.matches(&position));

        filter.vehicle_number = position.vehicle_number.clone();
        assert!(filter.matches(&position));
    }

    #[test]
    fn vehicle_layer_follows_filter() {
        let mut state = MapState::new(&SessionConfig::default());
        let a = VehiclePosition::example_data();
        let mut b = a.clone();
        b.vehicle_id = "2".to_owned();
        b.vehicle_number = "BA 3 PA 7".to_owned();
        state.roster.replace_all([a, b]);

        state.refresh_vehicle_layer();
        assert_eq!(state.vehicles.len(), 4);

        state.filter.show_all = false;
        state.filter.vehicle_number = "BA 3 PA 7".to_owned();
        state.refresh_vehicle_layer();
        assert_eq!(state.vehicles.keys().collect::<Vec<_>>(), ["icon-2", "label-2"]);
    }
}
