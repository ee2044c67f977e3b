use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::geometry::{Rectangle, Vector};
use crate::mobility::{MobilityModel, SpeedRange};

/// Condition for choosing a new direction and speed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum WalkMode {
    /// Change after the given time in seconds.
    Time(f64),
    /// Change after travelling the given distance in meters.
    Distance(f64),
}

/// 2D random walk.
///
/// The node moves with a random direction and speed, which are re-chosen after a fixed time or distance.
/// When the node hits the border of the bounding rectangle it is reflected back.
pub struct RandomWalk2d {
    position: Vector,
    velocity: Vector,
    bounds: Rectangle,
    speed: SpeedRange,
    mode: WalkMode,
    leg_remaining: f64,
    rng: Pcg64,
}

impl RandomWalk2d {
    /// Creates the model, the initial position is clamped to the bounds.
    pub fn new(initial: Vector, bounds: Rectangle, speed: SpeedRange, mode: WalkMode, seed: u64) -> Self {
        let mut model = Self {
            position: bounds.clamp(&initial),
            velocity: Vector::zero(),
            bounds,
            speed,
            mode,
            leg_remaining: 0.,
            rng: Pcg64::seed_from_u64(seed),
        };
        model.start_leg();
        model
    }

    fn start_leg(&mut self) {
        let speed = self.speed.sample(&mut self.rng);
        let angle = self.rng.gen_range(0.0..2. * PI);
        self.velocity = Vector::new(speed * angle.cos(), speed * angle.sin(), 0.);
        // no movement along degenerate axes
        if self.bounds.width() <= 0. {
            self.velocity.x = 0.;
        }
        if self.bounds.height() <= 0. {
            self.velocity.y = 0.;
        }
        let duration = match self.mode {
            WalkMode::Time(time) => time,
            WalkMode::Distance(distance) if speed > 0. => distance / speed,
            WalkMode::Distance(_) => f64::INFINITY,
        };
        self.leg_remaining = if duration > 0. { duration } else { f64::INFINITY };
    }

    fn move_reflecting(&mut self, duration: f64) {
        let mut left = duration;
        while left > 0. {
            let (tx, ty) = self.bounds.border_times(&self.position, &self.velocity);
            let t = tx.min(ty);
            if t >= left {
                self.position = self.position + self.velocity * left;
                break;
            }
            self.position = self.position + self.velocity * t;
            if tx <= t {
                self.position.x = if self.velocity.x > 0. {
                    self.bounds.x_max
                } else {
                    self.bounds.x_min
                };
                self.velocity.x = -self.velocity.x;
            }
            if ty <= t {
                self.position.y = if self.velocity.y > 0. {
                    self.bounds.y_max
                } else {
                    self.bounds.y_min
                };
                self.velocity.y = -self.velocity.y;
            }
            left -= t;
        }
        self.position = self.bounds.clamp(&self.position);
    }
}

impl MobilityModel for RandomWalk2d {
    fn position(&self) -> Vector {
        self.position
    }

    fn velocity(&self) -> Vector {
        self.velocity
    }

    fn advance(&mut self, dt: f64) {
        let mut left = dt;
        while left > 0. {
            if self.leg_remaining <= 0. {
                self.start_leg();
            }
            let step = left.min(self.leg_remaining);
            self.move_reflecting(step);
            self.leg_remaining -= step;
            left -= step;
        }
    }
}
