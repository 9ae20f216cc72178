//! Coordinate engine.
//!
//! Three spaces are involved:
//!
//! * **screen**: pixels relative to the map container element;
//! * **map**: pixels of the unscaled background image;
//! * **logical**: the persisted coordinate system, offset from the map origin,
//!   y growing upward and scaled by a fixed factor.
//!
//! The camera renders map space as `scale(zoom) translate(pan)`, so
//! `screen = (map + pan) * zoom`. Everything here is pure arithmetic.

mod camera;
mod overlap;

pub use camera::*;
pub use overlap::*;

use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Map pixels per logical unit of the stock background image.
pub const SCALE_FACTOR: f64 = 1.664;

/// Errors raised by coordinate and camera computations.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Zoom must be finite and strictly positive
    InvalidZoom(f64),
    /// Zoom bounds must satisfy `0 < min <= max`
    InvalidZoomBounds { min: f64, max: f64 },
    /// Scale factor must be finite and strictly positive
    InvalidScale(f64),
    /// A container or map with no area has no centre
    DegenerateSize { width: f64, height: f64 },
    /// A logical coordinate string that is not `[+-]digits`
    MalformedCoordinate(String),
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryError::InvalidZoom(zoom) => write!(f, "Invalid zoom level {}", zoom),
            GeometryError::InvalidZoomBounds { min, max } => {
                write!(f, "Invalid zoom bounds [{}, {}]", min, max)
            }
            GeometryError::InvalidScale(scale) => write!(f, "Invalid scale factor {}", scale),
            GeometryError::DegenerateSize { width, height } => {
                write!(f, "Degenerate size {}x{}", width, height)
            }
            GeometryError::MalformedCoordinate(raw) => {
                write!(f, "Malformed coordinate '{}'", raw)
            }
        }
    }
}

impl std::error::Error for GeometryError {}

/// A 2D point or offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Ensure both dimensions are finite and positive.
    pub fn validate(&self) -> Result<Size, GeometryError> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if usable(self.width) && usable(self.height) {
            Ok(*self)
        } else {
            Err(GeometryError::DegenerateSize {
                width: self.width,
                height: self.height,
            })
        }
    }

    pub fn center(&self) -> Result<Point, GeometryError> {
        let size = self.validate()?;
        Ok(Point::new(size.width / 2.0, size.height / 2.0))
    }
}

/// Calibration of the background image against the logical system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFrame {
    pub width: f64,
    pub height: f64,
    /// Logical origin, in map pixels measured from the bottom-left corner.
    pub offset: Point,
    pub scale_factor: f64,
}

impl Default for MapFrame {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 1430.0,
            offset: Point::new(200.0, 300.0),
            scale_factor: SCALE_FACTOR,
        }
    }
}

impl MapFrame {
    pub fn new(size: Size, offset: Point, scale_factor: f64) -> Result<Self, GeometryError> {
        let size = size.validate()?;
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(GeometryError::InvalidScale(scale_factor));
        }
        Ok(Self {
            width: size.width,
            height: size.height,
            offset,
            scale_factor,
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Convert a map pixel into logical coordinates (y flipped to grow upward).
    pub fn map_to_logical(&self, map: Point) -> Point {
        Point::new(
            (map.x - self.offset.x) * self.scale_factor,
            (self.height - map.y - self.offset.y) * self.scale_factor,
        )
    }

    /// Exact inverse of [`MapFrame::map_to_logical`].
    pub fn logical_to_map(&self, logical: Point) -> Point {
        Point::new(
            logical.x / self.scale_factor + self.offset.x,
            self.height - self.offset.y - logical.y / self.scale_factor,
        )
    }
}

/// Render a logical value as a signed, 4-digit zero-padded integer (`+0602`, `-0012`).
///
/// Values are rounded to the nearest unit; magnitudes above 9999 keep all their digits.
pub fn format_logical(value: f64) -> String {
    let rounded = value.round() as i64;
    let sign = if rounded < 0 { '-' } else { '+' };
    format!("{}{:04}", sign, rounded.unsigned_abs())
}

/// Parse a logical value written as `[+|-]digits`. A missing sign means positive.
pub fn parse_logical(raw: &str) -> Result<i32, GeometryError> {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'+') => (false, &trimmed[1..]),
        Some(b'-') => (true, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GeometryError::MalformedCoordinate(raw.to_string()));
    }

    let magnitude: i32 = digits
        .parse()
        .map_err(|_| GeometryError::MalformedCoordinate(raw.to_string()))?;

    Ok(if negative { -magnitude } else { magnitude })
}
