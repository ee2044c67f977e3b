//! Mobility models.
//!
//! A mobility model describes the position of a node over time. Models are advanced explicitly
//! with [`MobilityModel::advance`], and [`Mobility`] keeps the time the model was advanced to,
//! so that positions can be queried for absolute simulation times.

mod constant;
mod random_direction;
mod random_walk;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::{Rectangle, Vector};

pub use constant::{ConstantPosition, ConstantVelocity};
pub use random_direction::RandomDirection2d;
pub use random_walk::{RandomWalk2d, WalkMode};

/// Trait for mobility models.
pub trait MobilityModel {
    /// Returns the current position.
    fn position(&self) -> Vector;
    /// Returns the current velocity.
    fn velocity(&self) -> Vector;
    /// Moves the model forward by `dt` seconds.
    fn advance(&mut self, dt: f64);
}

/// Range of speeds in m/s from which random models draw uniformly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    /// Minimum speed.
    pub min: f64,
    /// Maximum speed.
    pub max: f64,
}

impl SpeedRange {
    /// Creates a range containing a single speed value.
    pub fn constant(speed: f64) -> Self {
        Self { min: speed, max: speed }
    }

    pub(crate) fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

/// Mobility model bound to the simulation clock.
pub struct Mobility {
    model: Box<dyn MobilityModel>,
    time: f64,
}

impl Mobility {
    /// Wraps the model, which is considered to be at time 0.
    pub fn new(model: Box<dyn MobilityModel>) -> Self {
        Self { model, time: 0. }
    }

    /// Returns the position at the given time.
    ///
    /// Time never goes backwards: querying a time earlier than the last one returns the last position.
    pub fn position_at(&mut self, time: f64) -> Vector {
        if time > self.time {
            self.model.advance(time - self.time);
            self.time = time;
        }
        self.model.position()
    }

    /// Returns the velocity as of the last queried time.
    pub fn velocity(&self) -> Vector {
        self.model.velocity()
    }

    /// Returns the time the model was last advanced to.
    pub fn time(&self) -> f64 {
        self.time
    }
}

/// Mobility model selected in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum MobilityConfig {
    /// [`ConstantPosition`].
    ConstantPosition,
    /// [`ConstantVelocity`].
    ConstantVelocity {
        /// Velocity in m/s.
        velocity: Vector,
    },
    /// [`RandomWalk2d`].
    RandomWalk {
        /// Area the node moves in.
        bounds: Rectangle,
        /// Speed range.
        speed: SpeedRange,
        /// When to change the direction and speed.
        mode: WalkMode,
    },
    /// [`RandomDirection2d`].
    RandomDirection {
        /// Area the node moves in.
        bounds: Rectangle,
        /// Speed range.
        speed: SpeedRange,
        /// Pause at the border in seconds.
        pause: f64,
    },
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self::ConstantPosition
    }
}

impl MobilityConfig {
    /// Creates the configured model starting at `initial` position.
    ///
    /// Random models use their own generator seeded with `seed`.
    pub fn build(&self, initial: Vector, seed: u64) -> Box<dyn MobilityModel> {
        match self {
            Self::ConstantPosition => Box::new(ConstantPosition::new(initial)),
            Self::ConstantVelocity { velocity } => Box::new(ConstantVelocity::new(initial, *velocity)),
            Self::RandomWalk { bounds, speed, mode } => {
                Box::new(RandomWalk2d::new(initial, *bounds, *speed, *mode, seed))
            }
            Self::RandomDirection { bounds, speed, pause } => {
                Box::new(RandomDirection2d::new(initial, *bounds, *speed, *pause, seed))
            }
        }
    }

    /// Checks whether the model moves nodes.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::ConstantPosition)
    }
}
