use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::geometry::{Rectangle, Vector};
use crate::mobility::{MobilityModel, SpeedRange};

const BORDER_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
enum Phase {
    Moving { remaining: f64 },
    Paused { remaining: f64 },
}

/// 2D random direction model.
///
/// The node moves in a random direction until it reaches the border of the bounding rectangle,
/// pauses there, then picks a new random direction pointing inside the rectangle.
pub struct RandomDirection2d {
    position: Vector,
    velocity: Vector,
    bounds: Rectangle,
    speed: SpeedRange,
    pause: f64,
    phase: Phase,
    rng: Pcg64,
}

impl RandomDirection2d {
    /// Creates the model, the initial position is clamped to the bounds.
    pub fn new(initial: Vector, bounds: Rectangle, speed: SpeedRange, pause: f64, seed: u64) -> Self {
        let mut model = Self {
            position: bounds.clamp(&initial),
            velocity: Vector::zero(),
            bounds,
            speed,
            pause: pause.max(0.),
            phase: Phase::Paused { remaining: 0. },
            rng: Pcg64::seed_from_u64(seed),
        };
        model.start_move();
        model
    }

    fn start_move(&mut self) {
        let speed = self.speed.sample(&mut self.rng);
        let angle = self.rng.gen_range(0.0..2. * PI);
        let mut velocity = Vector::new(speed * angle.cos(), speed * angle.sin(), 0.);
        let b = &self.bounds;
        let p = &self.position;
        // a node standing at the border must not leave the area
        if (p.x >= b.x_max - BORDER_TOLERANCE && velocity.x > 0.)
            || (p.x <= b.x_min + BORDER_TOLERANCE && velocity.x < 0.)
        {
            velocity.x = -velocity.x;
        }
        if (p.y >= b.y_max - BORDER_TOLERANCE && velocity.y > 0.)
            || (p.y <= b.y_min + BORDER_TOLERANCE && velocity.y < 0.)
        {
            velocity.y = -velocity.y;
        }
        if b.width() <= 0. {
            velocity.x = 0.;
        }
        if b.height() <= 0. {
            velocity.y = 0.;
        }
        self.velocity = velocity;
        self.phase = Phase::Moving {
            remaining: self.bounds.time_to_border(&self.position, &self.velocity),
        };
    }

    /// Checks whether the node is currently paused at the border.
    pub fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused { .. })
    }
}

impl MobilityModel for RandomDirection2d {
    fn position(&self) -> Vector {
        self.position
    }

    fn velocity(&self) -> Vector {
        self.velocity
    }

    fn advance(&mut self, dt: f64) {
        let mut left = dt;
        while left > 0. {
            match self.phase {
                Phase::Moving { remaining } => {
                    let step = left.min(remaining);
                    self.position = self.bounds.clamp(&(self.position + self.velocity * step));
                    left -= step;
                    if step >= remaining {
                        self.velocity = Vector::zero();
                        self.phase = Phase::Paused { remaining: self.pause };
                    } else {
                        self.phase = Phase::Moving {
                            remaining: remaining - step,
                        };
                    }
                }
                Phase::Paused { remaining } => {
                    let step = left.min(remaining);
                    left -= step;
                    if step >= remaining {
                        self.start_move();
                    } else {
                        self.phase = Phase::Paused {
                            remaining: remaining - step,
                        };
                    }
                }
            }
        }
    }
}
