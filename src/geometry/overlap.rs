//! Stacked-pin detection.

use super::{map_to_screen, Camera, MapFrame, Point};

/// Anything with a position in logical coordinates.
pub trait Placed {
    fn logical_position(&self) -> Point;
}

/// Screen position of a placed item under the given camera.
pub fn project<P: Placed + ?Sized>(item: &P, camera: &Camera, frame: &MapFrame) -> Point {
    map_to_screen(frame.logical_to_map(item.logical_position()), camera)
}

/// Items whose projected screen position lies within `threshold` pixels of
/// `point` on both axes independently (a square, not a circle).
pub fn find_overlapping<'a, P, I>(
    point: Point,
    items: I,
    camera: &Camera,
    frame: &MapFrame,
    threshold: f64,
) -> Vec<&'a P>
where
    P: Placed + 'a,
    I: IntoIterator<Item = &'a P>,
{
    items
        .into_iter()
        .filter(|item| {
            let screen = project(*item, camera, frame);
            (screen.x - point.x).abs() <= threshold && (screen.y - point.y).abs() <= threshold
        })
        .collect()
}
