//! Mapping between the display size advertised to the model and the real
//! surface size.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ActionError;
use crate::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Canonical resolutions models are calibrated against, in preference order.
pub const SCALING_PRESETS: &[(&str, Resolution)] = &[
    ("XGA", Resolution::new(1024, 768)),
    ("WXGA", Resolution::new(1280, 800)),
    ("FWXGA", Resolution::new(1366, 768)),
];

const ASPECT_TOLERANCE: f64 = 0.02;

/// Picks the logical resolution for a physical surface: the first preset with
/// a matching aspect ratio that is narrower than the surface, else the
/// physical size itself.
pub fn logical_for(physical: Resolution) -> Resolution {
    if physical.width == 0 || physical.height == 0 {
        return physical;
    }
    let ratio = physical.aspect();
    SCALING_PRESETS
        .iter()
        .map(|(_, preset)| *preset)
        .find(|preset| {
            (preset.aspect() - ratio).abs() < ASPECT_TOLERANCE && preset.width < physical.width
        })
        .unwrap_or(physical)
}

/// Converts coordinates between logical (model) and physical (surface) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaler {
    logical: Resolution,
    physical: Resolution,
}

impl Scaler {
    pub fn for_physical(physical: Resolution) -> Self {
        Self {
            logical: logical_for(physical),
            physical,
        }
    }

    /// A scaler that reports the physical size to the model unchanged.
    pub fn identity(physical: Resolution) -> Self {
        Self {
            logical: physical,
            physical,
        }
    }

    pub fn logical(&self) -> Resolution {
        self.logical
    }

    pub fn physical(&self) -> Resolution {
        self.physical
    }

    pub fn is_scaled(&self) -> bool {
        self.logical != self.physical
    }

    /// Rejects coordinates outside the logical display.
    pub fn check_bounds(&self, x: i64, y: i64) -> Result<(), ActionError> {
        if x < 0 || y < 0 || x > self.logical.width as i64 || y > self.logical.height as i64 {
            return Err(ActionError::OutOfBounds {
                x,
                y,
                width: self.logical.width,
                height: self.logical.height,
            });
        }
        Ok(())
    }

    /// Logical → physical. Bounds are checked before any arithmetic.
    pub fn denormalize(&self, x: i64, y: i64) -> Result<Point, ActionError> {
        self.check_bounds(x, y)?;
        Ok(Point {
            x: scale(x, self.physical.width, self.logical.width),
            y: scale(y, self.physical.height, self.logical.height),
        })
    }

    /// Physical → logical, for values reported back to the model.
    pub fn normalize(&self, p: Point) -> Point {
        Point {
            x: scale(p.x, self.logical.width, self.physical.width),
            y: scale(p.y, self.logical.height, self.physical.height),
        }
    }
}

fn scale(v: i64, to: u32, from: u32) -> i64 {
    if from == 0 || to == from {
        return v;
    }
    (v as f64 * to as f64 / from as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_wxga_for_sixteen_by_ten() {
        let logical = logical_for(Resolution::new(1920, 1200));
        assert_eq!(logical, Resolution::new(1280, 800));
    }

    #[test]
    fn picks_xga_for_four_by_three() {
        assert_eq!(logical_for(Resolution::new(2048, 1536)), Resolution::new(1024, 768));
    }

    #[test]
    fn keeps_physical_when_no_preset_matches() {
        // Aspect matches FWXGA but the preset is not narrower than the surface.
        assert_eq!(logical_for(Resolution::new(1366, 768)), Resolution::new(1366, 768));
        assert_eq!(logical_for(Resolution::new(1000, 1000)), Resolution::new(1000, 1000));
    }

    #[test]
    fn sixteen_by_nine_uses_fwxga() {
        assert_eq!(logical_for(Resolution::new(1920, 1080)), Resolution::new(1366, 768));
    }

    #[test]
    fn denormalizes_center_of_scaled_display() {
        let scaler = Scaler::for_physical(Resolution::new(1920, 1200));
        assert_eq!(scaler.denormalize(640, 400).unwrap(), Point::new(960, 600));
    }

    #[test]
    fn rejects_out_of_bounds_before_scaling() {
        let scaler = Scaler::for_physical(Resolution::new(1920, 1200));
        let err = scaler.denormalize(1281, 10).unwrap_err();
        assert!(matches!(err, ActionError::OutOfBounds { x: 1281, .. }));
        assert!(scaler.denormalize(10, 801).is_err());
        assert!(scaler.denormalize(-1, 10).is_err());
        // The edge itself is allowed.
        assert!(scaler.denormalize(1280, 800).is_ok());
    }

    #[test]
    fn round_trip_stays_within_one_pixel() {
        for physical in [
            Resolution::new(1920, 1200),
            Resolution::new(1920, 1080),
            Resolution::new(2560, 1600),
            Resolution::new(1024, 768),
        ] {
            let scaler = Scaler::for_physical(physical);
            let logical = scaler.logical();
            for x in (0..=logical.width as i64).step_by(7) {
                for y in (0..=logical.height as i64).step_by(13) {
                    let back = scaler.normalize(scaler.denormalize(x, y).unwrap());
                    assert!((back.x - x).abs() <= 1, "x {} -> {} on {}", x, back.x, physical);
                    assert!((back.y - y).abs() <= 1, "y {} -> {} on {}", y, back.y, physical);
                }
            }
        }
    }

    #[test]
    fn identity_scaler_passes_through() {
        let scaler = Scaler::identity(Resolution::new(1920, 1200));
        assert!(!scaler.is_scaled());
        assert_eq!(scaler.denormalize(640, 400).unwrap(), Point::new(640, 400));
        assert_eq!(scaler.normalize(Point::new(7, 9)), Point::new(7, 9));
    }
}
