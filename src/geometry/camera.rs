//! Camera state and pan/zoom computations.

use serde::{Deserialize, Serialize};

use super::{GeometryError, Point, Size};

/// Inclusive zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    min: f64,
    max: f64,
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self { min: 0.2, max: 4.0 }
    }
}

impl ZoomBounds {
    pub fn new(min: f64, max: f64) -> Result<Self, GeometryError> {
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
            return Err(GeometryError::InvalidZoomBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.min;
        }
        zoom.clamp(self.min, self.max)
    }

    pub fn contains(&self, zoom: f64) -> bool {
        zoom >= self.min && zoom <= self.max
    }
}

/// Zoom and pan of the map inside its container.
///
/// `pan` is expressed in map pixels and applied after scaling, matching a
/// `scale(zoom) translate(pan)` transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    zoom: f64,
    pan: Point,
}

impl Camera {
    pub fn new(zoom: f64, pan: Point) -> Result<Self, GeometryError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(GeometryError::InvalidZoom(zoom));
        }
        Ok(Self { zoom, pan })
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn with_pan(self, pan: Point) -> Self {
        Self { pan, ..self }
    }

    /// Screen position of the map's top-left corner.
    pub fn origin(&self) -> Point {
        self.pan * self.zoom
    }
}

/// `map = (screen - origin) / zoom`
pub fn screen_to_map(screen: Point, camera: &Camera) -> Point {
    (screen - camera.origin()) / camera.zoom()
}

/// Inverse of [`screen_to_map`].
pub fn map_to_screen(map: Point, camera: &Camera) -> Point {
    (map + camera.pan()) * camera.zoom()
}

/// Apply a zoom step and clamp the result into `bounds`.
pub fn compute_zoom(current: f64, delta: f64, bounds: ZoomBounds) -> f64 {
    bounds.clamp(current + delta)
}

/// Zoom the camera by `delta`.
///
/// With an `anchor` (a screen point, typically the cursor) the pan is recomputed
/// so the map point under the anchor stays put. Pan is not clamped here.
pub fn zoom_camera(camera: &Camera, delta: f64, bounds: ZoomBounds, anchor: Option<Point>) -> Camera {
    let old_zoom = camera.zoom();
    let new_zoom = compute_zoom(old_zoom, delta, bounds);

    let pan = match anchor {
        Some(cursor) => {
            let anchor_map = cursor / old_zoom - camera.pan();
            -anchor_map + cursor / new_zoom
        }
        None => camera.pan(),
    };

    Camera {
        zoom: new_zoom,
        pan,
    }
}

/// Keep the map inside the container.
///
/// On each axis: when the scaled map is larger than the container the pan is
/// clamped so no empty space shows past the map edge; otherwise the map is
/// centred on that axis.
pub fn clamp_pan(pan: Point, zoom: f64, container: Size, map: Size) -> Result<Point, GeometryError> {
    if !zoom.is_finite() || zoom <= 0.0 {
        return Err(GeometryError::InvalidZoom(zoom));
    }
    let container = container.validate()?;
    let map = map.validate()?;

    Ok(Point::new(
        clamp_axis(pan.x, zoom, container.width, map.width),
        clamp_axis(pan.y, zoom, container.height, map.height),
    ))
}

fn clamp_axis(pan: f64, zoom: f64, container: f64, map: f64) -> f64 {
    let slack = container / zoom - map;
    if map * zoom > container {
        pan.clamp(slack, 0.0)
    } else {
        slack / 2.0
    }
}

/// Camera at `zoom` with the map centred in the container.
pub fn reset_view(container: Size, map: Size, zoom: f64) -> Result<Camera, GeometryError> {
    let camera = Camera::new(zoom, Point::ORIGIN)?;
    let container = container.validate()?;
    let map = map.validate()?;

    Ok(camera.with_pan(Point::new(
        (container.width / zoom - map.width) / 2.0,
        (container.height / zoom - map.height) / 2.0,
    )))
}

/// Largest zoom (within bounds) that shows the whole map, centred.
pub fn fit_view(container: Size, map: Size, bounds: ZoomBounds) -> Result<Camera, GeometryError> {
    let container = container.validate()?;
    let map = map.validate()?;
    let zoom = bounds.clamp((container.width / map.width).min(container.height / map.height));

    let camera = reset_view(container, map, zoom)?;
    let pan = clamp_pan(camera.pan(), zoom, container, map)?;
    Ok(camera.with_pan(pan))
}

/// Recentre on `target` (a map point) when it sits within `margin` screen
/// pixels of the container edge; otherwise leave the camera alone.
pub fn focus_on(camera: &Camera, target: Point, container: Size, margin: f64) -> Result<Camera, GeometryError> {
    let container = container.validate()?;
    let screen = map_to_screen(target, camera);

    let outside_x = screen.x < margin || screen.x > container.width - margin;
    let outside_y = screen.y < margin || screen.y > container.height - margin;
    if !(outside_x || outside_y) {
        return Ok(*camera);
    }

    let zoom = camera.zoom();
    Ok(camera.with_pan(Point::new(
        container.width / (2.0 * zoom) - target.x,
        container.height / (2.0 * zoom) - target.y,
    )))
}

/// Where a drag started, relative to the map origin on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragAnchor {
    start: Point,
}

impl DragAnchor {
    pub fn begin(cursor: Point, camera: &Camera) -> Self {
        Self {
            start: cursor - camera.origin(),
        }
    }

    /// Unclamped pan that keeps the grabbed map point under `cursor`.
    pub fn pan_for(&self, cursor: Point, zoom: f64) -> Point {
        (cursor - self.start) / zoom
    }
}
