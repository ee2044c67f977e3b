//! Geometry primitives.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Point or vector in 3D space, coordinates in meters (or m/s for velocities).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    #[serde(default)]
    pub z: f64,
}

impl Vector {
    /// Creates a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns the Euclidean length.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Returns the Euclidean distance to another point.
    pub fn distance(&self, other: &Vector) -> f64 {
        (*self - *other).length()
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned rectangle in the XY plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Minimum X coordinate.
    pub x_min: f64,
    /// Maximum X coordinate.
    pub x_max: f64,
    /// Minimum Y coordinate.
    pub y_min: f64,
    /// Maximum Y coordinate.
    pub y_max: f64,
}

impl Rectangle {
    /// Creates a new rectangle. Bounds are swapped if given in reverse order.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min: x_min.min(x_max),
            x_max: x_min.max(x_max),
            y_min: y_min.min(y_max),
            y_max: y_min.max(y_max),
        }
    }

    /// Returns width along the X axis.
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Returns height along the Y axis.
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Checks whether the point lies inside the rectangle or on its border.
    pub fn contains(&self, point: &Vector) -> bool {
        point.x >= self.x_min && point.x <= self.x_max && point.y >= self.y_min && point.y <= self.y_max
    }

    /// Returns the closest point inside the rectangle, Z is preserved.
    pub fn clamp(&self, point: &Vector) -> Vector {
        Vector::new(
            point.x.clamp(self.x_min, self.x_max),
            point.y.clamp(self.y_min, self.y_max),
            point.z,
        )
    }

    /// Returns the times after which a point moving with given velocity reaches the border
    /// along the X and Y axes, `f64::INFINITY` for an axis without movement.
    pub fn border_times(&self, point: &Vector, velocity: &Vector) -> (f64, f64) {
        let axis_time = |pos: f64, v: f64, min: f64, max: f64| {
            if v > 0. {
                ((max - pos) / v).max(0.)
            } else if v < 0. {
                ((min - pos) / v).max(0.)
            } else {
                f64::INFINITY
            }
        };
        (
            axis_time(point.x, velocity.x, self.x_min, self.x_max),
            axis_time(point.y, velocity.y, self.y_min, self.y_max),
        )
    }

    /// Returns the time after which a point moving with given velocity reaches the border,
    /// or `f64::INFINITY` if it never does.
    pub fn time_to_border(&self, point: &Vector, velocity: &Vector) -> f64 {
        let (tx, ty) = self.border_times(point, velocity);
        tx.min(ty)
    }
}
