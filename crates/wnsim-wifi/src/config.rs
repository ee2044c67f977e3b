//! Device configuration.

use serde::{Deserialize, Serialize};

use crate::rate::RateManagerConfig;

/// PHY parameters of a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    /// Transmission power in dBm.
    pub tx_power_dbm: f64,
    /// Transmitter antenna gain in dB.
    pub tx_gain_db: f64,
    /// Receiver antenna gain in dB.
    pub rx_gain_db: f64,
    /// Receiver noise figure in dB.
    pub noise_figure_db: f64,
    /// Signals weaker than this (dBm) are not detected and do not make the medium busy.
    pub energy_detection_dbm: f64,
    /// Channel width in Hz.
    pub channel_width: f64,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 10.,
            tx_gain_db: 0.,
            rx_gain_db: 0.,
            noise_figure_db: 10.,
            energy_detection_dbm: -76.,
            channel_width: 20e6,
        }
    }
}

/// MAC parameters of a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacConfig {
    /// Minimum contention window.
    pub cw_min: u32,
    /// Maximum contention window.
    pub cw_max: u32,
    /// Number of retransmissions before a packet is dropped.
    pub retry_limit: u32,
    /// Capacity of the transmit queue in packets.
    pub queue_capacity: usize,
    /// Data frames of this size (bytes) or larger are protected by RTS/CTS, `None` disables RTS/CTS.
    pub rts_threshold: Option<u32>,
    /// Propagation delay accounted in response timeouts.
    pub max_propagation_delay: f64,
    /// Rate adaptation policy.
    pub rate_manager: RateManagerConfig,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            cw_min: 15,
            cw_max: 1023,
            retry_limit: 7,
            queue_capacity: 100,
            rts_threshold: None,
            max_propagation_delay: 3.34e-6,
            rate_manager: RateManagerConfig::default(),
        }
    }
}
