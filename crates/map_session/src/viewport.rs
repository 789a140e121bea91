use std::time::Duration;

use model::geometry::{Coordinate, Extent, WebMercator};
use utility::geo as projection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub center: Coordinate<WebMercator>,
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransition {
    pub target: View,
    pub duration: Duration,
}

/// Computes view changes; the renderer animates them.
///
/// Requests are fire-and-forget. Only the latest one is kept until the
/// renderer takes it, so bursts of requests collapse into one transition.
#[derive(Debug)]
pub struct ViewportController {
    current: View,
    pending: Option<ViewTransition>,
    width_px: f64,
    height_px: f64,
    min_zoom: f64,
    max_zoom: f64,
}

impl ViewportController {
    pub fn new(initial: View, width_px: f64, height_px: f64, min_zoom: f64, max_zoom: f64) -> Self {
        let mut viewport = Self {
            current: initial,
            pending: None,
            width_px: 1.0,
            height_px: 1.0,
            min_zoom: min_zoom.min(max_zoom),
            max_zoom: max_zoom.max(min_zoom),
        };
        viewport.resize(width_px, height_px);
        viewport
    }

    pub fn resize(&mut self, width_px: f64, height_px: f64) {
        if width_px.is_finite() && width_px >= 1.0 {
            self.width_px = width_px;
        }
        if height_px.is_finite() && height_px >= 1.0 {
            self.height_px = height_px;
        }
    }

    fn request(&mut self, target: View, duration: Duration) {
        if let Some(superseded) = self.pending.replace(ViewTransition { target, duration }) {
            log::debug!("view transition to {:?} superseded", superseded.target);
        }
    }

    pub fn recenter(&mut self, center: Coordinate<WebMercator>, zoom: f64) {
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.request(View { center, zoom }, Duration::ZERO);
    }

    /// Requests a view that shows all of `extent` with `padding_px` around
    /// it. Returns the target view, or `None` for an empty extent.
    pub fn fit_to_extent(
        &mut self,
        extent: &Extent<WebMercator>,
        padding_px: f64,
        duration: Duration,
    ) -> Option<View> {
        let Some(center) = extent.center() else {
            log::debug!("not fitting to an empty extent");
            return None;
        };

        let padding = if padding_px.is_finite() { padding_px.max(0.0) } else { 0.0 };
        let mut available_width = self.width_px - 2.0 * padding;
        let mut available_height = self.height_px - 2.0 * padding;
        if available_width < 1.0 || available_height < 1.0 {
            available_width = self.width_px;
            available_height = self.height_px;
        }

        let resolution = (extent.width() / available_width).max(extent.height() / available_height);
        let zoom = if resolution > 0.0 && resolution.is_finite() {
            projection::zoom_for_resolution(resolution).clamp(self.min_zoom, self.max_zoom)
        } else {
            self.max_zoom
        };

        let target = View { center, zoom };
        self.request(target, duration);
        Some(target)
    }

    /// Hands the latest requested transition to the renderer.
    pub fn take_pending(&mut self) -> Option<ViewTransition> {
        self.pending.take()
    }

    /// Called by the renderer once a transition has finished.
    pub fn settle(&mut self, view: View) {
        self.current = view;
    }

    pub fn current(&self) -> View {
        self.current
    }

    pub fn pending(&self) -> Option<&ViewTransition> {
        self.pending.as_ref()
    }

    /// Where the view is heading: the pending target or the current view.
    pub fn target(&self) -> View {
        self.pending.map(|pending| pending.target).unwrap_or(self.current)
    }
}
