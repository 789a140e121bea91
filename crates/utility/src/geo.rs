use std::f64::consts::PI;

/// Semi-major axis of the WGS84 ellipsoid, used as sphere radius by the
/// spherical Web Mercator projection.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes a square world.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Half of the world extent in Web Mercator meters.
pub const HALF_WORLD_M: f64 = PI * EARTH_RADIUS_M;

/// Map resolution (meters per pixel) at zoom level 0 for 256px tiles.
pub const RESOLUTION_AT_ZOOM_0: f64 = 2.0 * HALF_WORLD_M / 256.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

pub fn clamp_latitude(latitude: f64) -> f64 {
    latitude.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
}

/// Projects a WGS84 longitude/latitude pair (degrees) to Web Mercator meters.
pub fn lon_lat_to_web_mercator(longitude: f64, latitude: f64) -> (f64, f64) {
    let x = EARTH_RADIUS_M * to_radians(longitude);
    let lat_rad = to_radians(clamp_latitude(latitude));
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat_rad / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`lon_lat_to_web_mercator`].
pub fn web_mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let longitude = to_degrees(x / EARTH_RADIUS_M);
    let latitude = to_degrees(2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0);
    (longitude, latitude)
}

pub fn resolution_for_zoom(zoom: f64) -> f64 {
    RESOLUTION_AT_ZOOM_0 / 2f64.powf(zoom)
}

pub fn zoom_for_resolution(resolution: f64) -> f64 {
    (RESOLUTION_AT_ZOOM_0 / resolution).log2()
}
