use serde::{Deserialize, Serialize};

use crate::vision::Segment;

#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Point in normalised frame coordinates, `(0, 0)` top left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Maps pixel coordinates of an analysed raster into normalised space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
}

impl Frame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1) as f32,
            height: height.max(1) as f32,
        }
    }

    pub fn point(&self, x: f32, y: f32) -> Point {
        Point::new(x / self.width, y / self.height)
    }

    pub fn min_dimension(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn segment(&self, segment: &Segment) -> LineSegment {
        LineSegment {
            start: self.point(segment.x1, segment.y1),
            end: self.point(segment.x2, segment.y2),
        }
    }
}

/// Line segment in normalised coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

impl LineSegment {
    pub fn length(&self) -> f32 {
        self.start.distance(&self.end)
    }

    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) * 0.5,
            (self.start.y + self.end.y) * 0.5,
        )
    }

    /// Direction from `start` to `end` in radians, image y axis pointing down.
    pub fn angle(&self) -> f32 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }
}
