use anyhow::anyhow;

use crate::crs::crs_utils::Crs;

/// Axis-aligned bounding box in a given CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    crs: Crs,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> anyhow::Result<Self> {
        if [min_x, min_y, max_x, max_y].iter().any(|value| !value.is_finite()) {
            return Err(anyhow!("Bounding box coordinates must be finite"));
        }
        if min_x > max_x || min_y > max_y {
            return Err(anyhow!(
                "Bounding box minimum ({}, {}) exceeds its maximum ({}, {})",
                min_x,
                min_y,
                max_x,
                max_y
            ));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        })
    }

    pub fn from_rect(rect: geo::Rect, crs: Crs) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
            crs,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn to_rect(&self) -> geo::Rect {
        geo::Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        )
    }

    /// The four corners, counter-clockwise from the minimum corner.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
        ]
    }
}
