use std::collections::HashSet;

use indexmap::IndexMap;
use model::geometry::{Extent, Geometry, WebMercator};

/// The three vector layers of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Vehicles,
    Path,
    Shapes,
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vehicles => "vehicles",
            Self::Path => "path",
            Self::Shapes => "shapes",
        }
    }
}

/// Identity of a feature on the render side. Assigned once when a key is
/// first inserted and kept for as long as the key stays in the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureStyle {
    VehicleIcon,
    VehicleLabel { text: String },
    PathLine,
    PathEnd,
    PathEndLabel { text: String },
    Shape,
    Drawn,
}

/// A feature as requested by the session, not yet rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub key: String,
    pub geometry: Geometry<WebMercator>,
    pub style: FeatureStyle,
}

impl Feature {
    pub fn new<S: Into<String>>(key: S, geometry: Geometry<WebMercator>, style: FeatureStyle) -> Self {
        Self {
            key: key.into(),
            geometry,
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub handle: RenderHandle,
    pub geometry: Geometry<WebMercator>,
    pub style: FeatureStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Added,
    Updated,
    Unchanged,
}

/// Keyed store of the features of one layer, in insertion order.
///
/// Keys listed as protected are never pruned by [`FeatureIndex::reconcile`],
/// but [`FeatureIndex::clear`] removes them like any other feature. The
/// protection itself outlives both.
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    layer: Layer,
    features: IndexMap<String, RenderedFeature>,
    protected: HashSet<String>,
    next_handle: u64,
}

impl FeatureIndex {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            features: IndexMap::new(),
            protected: HashSet::new(),
            next_handle: 0,
        }
    }

    pub fn with_protected<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn is_protected(&self, key: &str) -> bool {
        self.protected.contains(key)
    }

    pub fn upsert(&mut self, feature: Feature) -> Upserted {
        let Feature {
            key,
            geometry,
            style,
        } = feature;
        if let Some(existing) = self.features.get_mut(&key) {
            if existing.geometry == geometry && existing.style == style {
                return Upserted::Unchanged;
            }
            existing.geometry = geometry;
            existing.style = style;
            return Upserted::Updated;
        }
        let handle = RenderHandle(self.next_handle);
        self.next_handle += 1;
        self.features.insert(
            key,
            RenderedFeature {
                handle,
                geometry,
                style,
            },
        );
        Upserted::Added
    }

    /// Makes the layer contain exactly `desired`, plus whatever protected
    /// features it already holds.
    pub fn reconcile<I>(&mut self, desired: I) -> ReconcileStats
    where
        I: IntoIterator<Item = Feature>,
    {
        let mut stats = ReconcileStats::default();
        let mut seen = HashSet::new();
        for feature in desired {
            seen.insert(feature.key.clone());
            match self.upsert(feature) {
                Upserted::Added => stats.added += 1,
                Upserted::Updated => stats.updated += 1,
                Upserted::Unchanged => {}
            }
        }

        let before = self.features.len();
        self.features
            .retain(|key, _| seen.contains(key) || self.protected.contains(key));
        stats.removed = before - self.features.len();

        if stats != ReconcileStats::default() {
            log::debug!(
                "reconciled {} layer: {} added, {} updated, {} removed",
                self.layer.name(),
                stats.added,
                stats.updated,
                stats.removed
            );
        }
        stats
    }

    pub fn remove(&mut self, key: &str) -> Option<RenderedFeature> {
        self.features.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.features.clear();
    }

    pub fn get(&self, key: &str) -> Option<&RenderedFeature> {
        self.features.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RenderedFeature)> {
        self.features.iter().map(|(key, feature)| (key.as_str(), feature))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn extent(&self) -> Extent<WebMercator> {
        let mut extent = Extent::empty();
        for feature in self.features.values() {
            extent.merge(&feature.geometry.extent());
        }
        extent
    }
}

#[cfg(test)]
mod tests {
    use model::geometry::Coordinate;

    use super::*;

    fn point(key: &str, x: f64) -> Feature {
        Feature::new(key, Geometry::point(Coordinate::new(x, 0.0)), FeatureStyle::VehicleIcon)
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut index = FeatureIndex::new(Layer::Vehicles);
        let desired = vec![point("a", 1.0), point("b", 2.0)];

        let first = index.reconcile(desired.clone());
        assert_eq!(first.added, 2);
        let snapshot: Vec<_> = index.iter().map(|(k, f)| (k.to_owned(), f.clone())).collect();

        let second = index.reconcile(desired);
        assert_eq!(second, ReconcileStats::default());
        let again: Vec<_> = index.iter().map(|(k, f)| (k.to_owned(), f.clone())).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn moving_a_feature_keeps_its_handle() {
        let mut index = FeatureIndex::new(Layer::Vehicles);
        index.reconcile(vec![point("a", 1.0)]);
        let handle = index.get("a").unwrap().handle;

        let stats = index.reconcile(vec![point("a", 5.0)]);
        assert_eq!(stats.updated, 1);
        assert_eq!(index.len(), 1);
        let feature = index.get("a").unwrap();
        assert_eq!(feature.handle, handle);
        assert_eq!(feature.geometry, Geometry::point(Coordinate::new(5.0, 0.0)));
    }

    #[test]
    fn absent_keys_are_pruned_but_protected_survive() {
        let mut index = FeatureIndex::new(Layer::Vehicles).with_protected(["end"]);
        index.reconcile(vec![point("a", 1.0), point("b", 2.0), point("end", 3.0)]);

        let stats = index.reconcile(vec![point("a", 1.0)]);
        assert_eq!(stats.removed, 1);
        assert!(index.contains("a"));
        assert!(!index.contains("b"));
        assert!(index.contains("end"));
    }

    #[test]
    fn clear_removes_protected_but_keeps_protection() {
        let mut index = FeatureIndex::new(Layer::Vehicles).with_protected(["end"]);
        index.reconcile(vec![point("end", 3.0)]);
        index.clear();
        assert!(index.is_empty());
        assert!(index.is_protected("end"));

        index.reconcile(vec![point("end", 3.0)]);
        index.reconcile(Vec::new());
        assert!(index.contains("end"));
    }

    #[test]
    fn extent_covers_all_features() {
        let mut index = FeatureIndex::new(Layer::Path);
        assert!(index.extent().is_empty());
        index.reconcile(vec![point("a", -2.0), point("b", 4.0)]);
        let extent = index.extent();
        assert_eq!(extent.min(), Some(Coordinate::new(-2.0, 0.0)));
        assert_eq!(extent.max(), Some(Coordinate::new(4.0, 0.0)));
    }

    #[test]
    fn handles_are_not_reused_after_removal() {
        let mut index = FeatureIndex::new(Layer::Shapes);
        index.upsert(point("a", 1.0));
        let old = index.remove("a").unwrap().handle;
        index.upsert(point("a", 1.0));
        assert_ne!(index.get("a").unwrap().handle, old);
    }
}
