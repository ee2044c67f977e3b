//! Propagation loss and delay models.
//!
//! Loss models compute the attenuation in dB between two points at a given distance and carrier
//! frequency. Delay models compute the signal travel time.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::Vector;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Trait for propagation loss models.
pub trait PropagationLossModel {
    /// Returns the loss in dB for given distance (m) and frequency (Hz). The loss is never negative.
    fn loss(&self, distance: f64, frequency: f64) -> f64;

    /// Returns the received power in dBm for a signal transmitted with `tx_power` dBm.
    fn compute_reception(&self, tx_position: &Vector, rx_position: &Vector, tx_power: f64, frequency: f64) -> f64 {
        tx_power - self.loss(tx_position.distance(rx_position), frequency)
    }
}

/// Trait for propagation delay models.
pub trait PropagationDelayModel {
    /// Returns the signal travel time in seconds over given distance (m).
    fn delay(&self, distance: f64) -> f64;
}

fn wavelength(frequency: f64) -> f64 {
    SPEED_OF_LIGHT / frequency
}

///////////////////////////////////////////////////////////////////////////////

/// Free space (Friis) propagation loss.
///
/// `L = 20 log10(4 pi d / lambda) + system_loss`.
#[derive(Clone, Debug)]
pub struct FriisLoss {
    /// Additional system loss in dB.
    pub system_loss: f64,
}

impl Default for FriisLoss {
    fn default() -> Self {
        Self { system_loss: 0. }
    }
}

impl PropagationLossModel for FriisLoss {
    fn loss(&self, distance: f64, frequency: f64) -> f64 {
        if distance <= 0. {
            return 0.;
        }
        let lambda = wavelength(frequency);
        (20. * (4. * PI * distance / lambda).log10() + self.system_loss).max(0.)
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Two-ray ground reflection loss.
///
/// Up to the crossover distance `4 pi h_t h_r / lambda` the loss equals the Friis loss,
/// beyond it `L = 40 log10(d) - 20 log10(h_t h_r)`.
#[derive(Clone, Debug)]
pub struct TwoRayGroundLoss {
    /// Transmitter antenna height in meters.
    pub tx_height: f64,
    /// Receiver antenna height in meters.
    pub rx_height: f64,
    friis: FriisLoss,
}

impl TwoRayGroundLoss {
    /// Creates the model with given antenna heights.
    pub fn new(tx_height: f64, rx_height: f64) -> Self {
        Self {
            tx_height,
            rx_height,
            friis: FriisLoss::default(),
        }
    }

    /// Returns the distance beyond which the ground reflection dominates.
    pub fn crossover_distance(&self, frequency: f64) -> f64 {
        4. * PI * self.tx_height * self.rx_height / wavelength(frequency)
    }
}

impl PropagationLossModel for TwoRayGroundLoss {
    fn loss(&self, distance: f64, frequency: f64) -> f64 {
        if distance <= self.crossover_distance(frequency) || self.tx_height <= 0. || self.rx_height <= 0. {
            return self.friis.loss(distance, frequency);
        }
        (40. * distance.log10() - 20. * (self.tx_height * self.rx_height).log10()).max(0.)
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Log-distance path loss.
///
/// `L = L0 + 10 n log10(d / d0)`, distances below `d0` get the reference loss `L0`.
#[derive(Clone, Debug)]
pub struct LogDistanceLoss {
    /// Path loss exponent `n`.
    pub exponent: f64,
    /// Reference distance `d0` in meters.
    pub reference_distance: f64,
    /// Loss `L0` at the reference distance in dB.
    pub reference_loss: f64,
}

impl Default for LogDistanceLoss {
    fn default() -> Self {
        Self {
            exponent: 3.,
            reference_distance: 1.,
            reference_loss: 46.6777,
        }
    }
}

impl PropagationLossModel for LogDistanceLoss {
    fn loss(&self, distance: f64, _frequency: f64) -> f64 {
        if distance <= self.reference_distance {
            return self.reference_loss;
        }
        self.reference_loss + 10. * self.exponent * (distance / self.reference_distance).log10()
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Signal travels with constant speed.
#[derive(Clone, Debug)]
pub struct ConstantSpeedDelay {
    /// Propagation speed in m/s.
    pub speed: f64,
}

impl Default for ConstantSpeedDelay {
    fn default() -> Self {
        Self { speed: SPEED_OF_LIGHT }
    }
}

impl PropagationDelayModel for ConstantSpeedDelay {
    fn delay(&self, distance: f64) -> f64 {
        distance.max(0.) / self.speed
    }
}

/// Signal arrives instantly.
#[derive(Clone, Debug, Default)]
pub struct ZeroDelay {}

impl PropagationDelayModel for ZeroDelay {
    fn delay(&self, _distance: f64) -> f64 {
        0.
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Propagation loss model selected in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum PropagationLossConfig {
    /// [`FriisLoss`].
    Friis {
        /// Additional system loss in dB.
        #[serde(default)]
        system_loss: f64,
    },
    /// [`TwoRayGroundLoss`].
    TwoRayGround {
        /// Transmitter antenna height in meters.
        tx_height: f64,
        /// Receiver antenna height in meters.
        rx_height: f64,
    },
    /// [`LogDistanceLoss`].
    LogDistance {
        /// Path loss exponent.
        exponent: f64,
        /// Reference distance in meters.
        reference_distance: f64,
        /// Loss at the reference distance in dB.
        reference_loss: f64,
    },
}

impl Default for PropagationLossConfig {
    fn default() -> Self {
        Self::Friis { system_loss: 0. }
    }
}

impl PropagationLossConfig {
    /// Creates the configured model.
    pub fn build(&self) -> Box<dyn PropagationLossModel> {
        match *self {
            Self::Friis { system_loss } => Box::new(FriisLoss { system_loss }),
            Self::TwoRayGround { tx_height, rx_height } => Box::new(TwoRayGroundLoss::new(tx_height, rx_height)),
            Self::LogDistance {
                exponent,
                reference_distance,
                reference_loss,
            } => Box::new(LogDistanceLoss {
                exponent,
                reference_distance,
                reference_loss,
            }),
        }
    }
}

/// Propagation delay model selected in configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationDelayConfig {
    /// [`ConstantSpeedDelay`] with the speed of light.
    #[default]
    ConstantSpeed,
    /// [`ZeroDelay`].
    Zero,
}

impl PropagationDelayConfig {
    /// Creates the configured model.
    pub fn build(&self) -> Box<dyn PropagationDelayModel> {
        match self {
            Self::ConstantSpeed => Box::new(ConstantSpeedDelay::default()),
            Self::Zero => Box::new(ZeroDelay::default()),
        }
    }
}
