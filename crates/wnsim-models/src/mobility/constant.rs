use crate::geometry::Vector;
use crate::mobility::MobilityModel;

/// Node stays at a fixed position.
pub struct ConstantPosition {
    position: Vector,
}

impl ConstantPosition {
    /// Creates the model.
    pub fn new(position: Vector) -> Self {
        Self { position }
    }
}

impl MobilityModel for ConstantPosition {
    fn position(&self) -> Vector {
        self.position
    }

    fn velocity(&self) -> Vector {
        Vector::zero()
    }

    fn advance(&mut self, _dt: f64) {}
}

/// Node moves along a straight line with constant velocity.
pub struct ConstantVelocity {
    position: Vector,
    velocity: Vector,
}

impl ConstantVelocity {
    /// Creates the model.
    pub fn new(position: Vector, velocity: Vector) -> Self {
        Self { position, velocity }
    }
}

impl MobilityModel for ConstantVelocity {
    fn position(&self) -> Vector {
        self.position
    }

    fn velocity(&self) -> Vector {
        self.velocity
    }

    fn advance(&mut self, dt: f64) {
        self.position = self.position + self.velocity * dt;
    }
}
