use std::{error::Error, fs, path::Path, time::Duration};

use model::geometry::Coordinate;
use serde::Deserialize;

use crate::{codec, viewport::View};

/// Tunables of a map session. Every field has a default, so a partial JSON
/// file is fine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// `[longitude, latitude]`
    pub default_center: [f64; 2],
    pub default_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub fit_padding_px: f64,
    pub fit_duration_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_center: [85.324, 27.7172],
            default_zoom: 14.0,
            min_zoom: 0.0,
            max_zoom: 19.0,
            viewport_width: 1024.0,
            viewport_height: 768.0,
            fit_padding_px: 50.0,
            fit_duration_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn default_view(&self) -> View {
        View {
            center: codec::to_display(Coordinate::from_array(self.default_center)),
            zoom: self.default_zoom,
        }
    }

    pub fn fit_duration(&self) -> Duration {
        Duration::from_millis(self.fit_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"defaultZoom": 12}"#).unwrap();
        assert_eq!(config.default_zoom, 12.0);
        assert_eq!(config.fit_padding_px, 50.0);
        assert_eq!(config.default_center, [85.324, 27.7172]);
    }
}
