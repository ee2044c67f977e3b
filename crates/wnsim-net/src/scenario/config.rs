//! Scenario configuration.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wnsim_models::mobility::MobilityConfig;
use wnsim_models::propagation::{PropagationDelayConfig, PropagationLossConfig};
use wnsim_wifi::{MacConfig, PhyConfig, RateManagerConfig};

use crate::address::AddressError;
use crate::app::Period;
use crate::stack::StackError;
use crate::trace::TraceError;

/// Error of scenario configuration or setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file cannot be read.
    #[error("can't read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid YAML or has wrong structure.
    #[error("can't parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A parameter has invalid value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Parameter name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },
    /// Address assignment failed.
    #[error(transparent)]
    Address(#[from] AddressError),
    /// Application setup failed.
    #[error(transparent)]
    Stack(#[from] StackError),
    /// Trace file cannot be created.
    #[error(transparent)]
    Trace(#[from] TraceError),
}

fn positive(value: f64) -> bool {
    value > 0. && value.is_finite()
}

fn non_negative(value: f64) -> bool {
    value >= 0. && value.is_finite()
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// DATA RATE ///////////////////////////////////////////////////////////////////

/// Error of parsing a data rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid data rate {0:?}")]
pub struct ParseDataRateError(String);

/// Data rate in bits per second, written as `100Mbps`, `500kb/s`, `1Gbps` or a plain number.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(f64);

impl DataRate {
    /// Creates data rate from bits per second.
    pub fn from_bps(bps: f64) -> Self {
        Self(bps)
    }

    /// Returns the rate in bits per second.
    pub fn bps(&self) -> f64 {
        self.0
    }

    /// Returns the rate in Mbit/s.
    pub fn mbps(&self) -> f64 {
        self.0 / 1e6
    }
}

impl FromStr for DataRate {
    type Err = ParseDataRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseDataRateError(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '-' || c == '+'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let value: f64 = number.parse().map_err(|_| error())?;
        let multiplier = match unit.trim() {
            "" | "bps" | "b/s" => 1.,
            "kbps" | "Kbps" | "kb/s" | "Kb/s" => 1e3,
            "Mbps" | "Mb/s" => 1e6,
            "Gbps" | "Gb/s" => 1e9,
            "Bps" | "B/s" => 8.,
            "KBps" | "kBps" | "KB/s" | "kB/s" => 8e3,
            "MBps" | "MB/s" => 8e6,
            "GBps" | "GB/s" => 8e9,
            _ => return Err(error()),
        };
        if !value.is_finite() || value < 0. {
            return Err(error());
        }
        Ok(Self(value * multiplier))
    }
}

impl TryFrom<String> for DataRate {
    type Error = ParseDataRateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

impl Display for DataRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 >= 1e9 && self.0 % 1e9 == 0. {
            write!(f, "{}Gbps", self.0 / 1e9)
        } else if self.0 >= 1e6 && self.0 % 1e6 == 0. {
            write!(f, "{}Mbps", self.0 / 1e6)
        } else if self.0 >= 1e3 && self.0 % 1e3 == 0. {
            write!(f, "{}kbps", self.0 / 1e3)
        } else {
            write!(f, "{}bps", self.0)
        }
    }
}

// TRAFFIC /////////////////////////////////////////////////////////////////////

/// Traffic pattern of the source applications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Traffic {
    /// [`BulkSend`](crate::app::BulkSend) sources.
    Bulk {
        /// Packets outstanding at the first hop.
        #[serde(default = "default_window")]
        window: u32,
        /// Payload bytes to send per source, unlimited if absent.
        #[serde(default)]
        max_bytes: Option<u64>,
    },
    /// [`OnOffApp`](crate::app::OnOffApp) sources sending at the configured data rate.
    OnOff {
        /// On period.
        on: Period,
        /// Off period.
        off: Period,
    },
    /// [`EchoClient`](crate::app::EchoClient) sources with echo servers at the destinations.
    Echo {
        /// Interval between requests in seconds.
        interval: f64,
        /// Requests per client, unlimited if absent.
        #[serde(default)]
        max_requests: Option<u64>,
    },
}

fn default_window() -> u32 {
    4
}

impl Default for Traffic {
    fn default() -> Self {
        Self::Bulk {
            window: default_window(),
            max_bytes: None,
        }
    }
}

/// Direction of the traffic relative to the stations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// From every station to the sink access point.
    #[default]
    Uplink,
    /// From the sink access point to every station.
    Downlink,
    /// Both directions.
    Both,
}

impl Direction {
    /// Checks whether stations send traffic.
    pub fn uplink(&self) -> bool {
        matches!(self, Self::Uplink | Self::Both)
    }

    /// Checks whether stations receive traffic.
    pub fn downlink(&self) -> bool {
        matches!(self, Self::Downlink | Self::Both)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uplink" | "up" => Ok(Self::Uplink),
            "downlink" | "down" => Ok(Self::Downlink),
            "both" => Ok(Self::Both),
            _ => Err(format!("unknown direction {:?}", s)),
        }
    }
}

/// Algorithm used to compute static routes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingKind {
    /// [`ShortestPathDijkstra`](crate::routing::ShortestPathDijkstra).
    #[default]
    Dijkstra,
    /// [`ShortestPathFloydWarshall`](crate::routing::ShortestPathFloydWarshall).
    FloydWarshall,
}

// CONFIG //////////////////////////////////////////////////////////////////////

/// Scenario parameters.
///
/// Access points are placed along the x axis, each with its stations on a grid below it.
/// Stations associate with the nearest access point and the access points are connected by a
/// wired backbone. Every field has a default, so a YAML file needs to list only the changed ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Random seed.
    pub seed: u64,
    /// Number of access points.
    pub aps: u32,
    /// Number of stations per access point.
    pub stations_per_ap: u32,
    /// Distance between neighbouring access points in meters.
    pub ap_spacing: f64,
    /// Distance between neighbouring stations of the grid in meters.
    pub station_spacing: f64,
    /// Number of stations in a grid row.
    pub grid_width: u32,
    /// Subnet the addresses are assigned from.
    pub subnet: Ipv4Addr,
    /// Prefix length of the subnet.
    pub prefix_len: u8,
    /// Application payload size in bytes.
    pub payload_size: u32,
    /// Sending rate of on/off sources.
    pub data_rate: DataRate,
    /// Traffic pattern.
    pub traffic: Traffic,
    /// Traffic direction.
    pub direction: Direction,
    /// Port of sinks and echo servers.
    pub port: u16,
    /// Time when source applications start.
    pub app_start: f64,
    /// Duration of traffic, the simulation stops at `app_start + duration`.
    pub duration: f64,
    /// Time of the first throughput sample.
    pub sample_start: f64,
    /// Interval between throughput samples.
    pub sample_interval: f64,
    /// Channel frequency in Hz.
    pub frequency: f64,
    /// Propagation loss model.
    pub propagation: PropagationLossConfig,
    /// Propagation delay model.
    pub propagation_delay: PropagationDelayConfig,
    /// PHY parameters of all devices.
    pub phy: PhyConfig,
    /// MAC parameters of all devices. Rate adaptation and RTS/CTS are set by the fields below.
    pub mac: MacConfig,
    /// Rate adaptation policy.
    pub rate_manager: RateManagerConfig,
    /// Enables RTS/CTS protection.
    pub rts_cts: bool,
    /// Frames of this size or larger are protected when RTS/CTS is enabled.
    pub rts_threshold: u32,
    /// Mobility of stations.
    pub station_mobility: MobilityConfig,
    /// Bandwidth of backbone links.
    pub backbone_rate: DataRate,
    /// Latency of backbone links in seconds.
    pub backbone_latency: f64,
    /// Routing algorithm.
    pub routing: RoutingKind,
    /// Records packet events.
    pub packet_trace: bool,
    /// Records node positions.
    pub mobility_trace: bool,
    /// Interval between recorded positions.
    pub mobility_trace_interval: f64,
    /// Directory for trace files, traces are kept in memory if absent.
    pub trace_dir: Option<PathBuf>,
    /// Runs with lower average throughput are reported as failed validation.
    pub min_expected_throughput_mbps: Option<f64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            aps: 1,
            stations_per_ap: 4,
            ap_spacing: 20.,
            station_spacing: 5.,
            grid_width: 1,
            subnet: Ipv4Addr::new(192, 168, 0, 0),
            prefix_len: 24,
            payload_size: 1472,
            data_rate: DataRate::from_bps(100e6),
            traffic: Traffic::default(),
            direction: Direction::default(),
            port: 9,
            app_start: 1.,
            duration: 5.,
            sample_start: 1.1,
            sample_interval: 0.1,
            frequency: 5e9,
            propagation: PropagationLossConfig::default(),
            propagation_delay: PropagationDelayConfig::default(),
            phy: PhyConfig::default(),
            mac: MacConfig::default(),
            rate_manager: RateManagerConfig::default(),
            rts_cts: false,
            rts_threshold: 10,
            station_mobility: MobilityConfig::default(),
            backbone_rate: DataRate::from_bps(100e6),
            backbone_latency: 1e-5,
            routing: RoutingKind::default(),
            packet_trace: false,
            mobility_trace: false,
            mobility_trace_interval: 1.,
            trace_dir: None,
            min_expected_throughput_mbps: None,
        }
    }
}

/// Largest UDP payload of an IPv4 packet.
pub const MAX_PAYLOAD_SIZE: u32 = 65507;

impl ScenarioConfig {
    /// Reads the config from YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Parses the config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Returns the simulation stop time.
    pub fn stop_time(&self) -> f64 {
        self.app_start + self.duration
    }

    /// Returns the total number of nodes.
    pub fn node_count(&self) -> u32 {
        self.aps + self.aps * self.stations_per_ap
    }

    /// Returns the MAC parameters with rate adaptation and RTS/CTS settings applied.
    pub fn effective_mac(&self) -> MacConfig {
        MacConfig {
            rate_manager: self.rate_manager.clone(),
            rts_threshold: if self.rts_cts { Some(self.rts_threshold) } else { None },
            ..self.mac.clone()
        }
    }

    /// Checks the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aps == 0 {
            return Err(invalid("aps", "at least one access point is required"));
        }
        if self.stations_per_ap == 0 {
            return Err(invalid("stations_per_ap", "at least one station is required"));
        }
        if self.grid_width == 0 {
            return Err(invalid("grid_width", "must be positive"));
        }
        if !positive(self.ap_spacing) {
            return Err(invalid("ap_spacing", "must be positive"));
        }
        if !positive(self.station_spacing) {
            return Err(invalid("station_spacing", "must be positive"));
        }
        if self.payload_size == 0 || self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(invalid(
                "payload_size",
                format!("must be in 1..={}, got {}", MAX_PAYLOAD_SIZE, self.payload_size),
            ));
        }
        if !positive(self.data_rate.bps()) {
            return Err(invalid("data_rate", "must be positive"));
        }
        if !positive(self.duration) {
            return Err(invalid("duration", format!("must be positive, got {}", self.duration)));
        }
        if !non_negative(self.app_start) {
            return Err(invalid("app_start", "must be non-negative"));
        }
        if !positive(self.sample_interval) {
            return Err(invalid("sample_interval", "must be positive"));
        }
        if !non_negative(self.sample_start) {
            return Err(invalid("sample_start", "must be non-negative"));
        }
        if !positive(self.frequency) {
            return Err(invalid("frequency", "must be positive"));
        }
        if self.mac.cw_min > self.mac.cw_max {
            return Err(invalid(
                "mac.cw_min",
                format!("{} exceeds cw_max {}", self.mac.cw_min, self.mac.cw_max),
            ));
        }
        if self.mac.queue_capacity == 0 {
            return Err(invalid("mac.queue_capacity", "must be positive"));
        }
        if !positive(self.backbone_rate.bps()) {
            return Err(invalid("backbone_rate", "must be positive"));
        }
        if !non_negative(self.backbone_latency) {
            return Err(invalid("backbone_latency", "must be non-negative"));
        }
        if self.mobility_trace && !positive(self.mobility_trace_interval) {
            return Err(invalid("mobility_trace_interval", "must be positive"));
        }
        match &self.traffic {
            Traffic::Bulk { window, .. } => {
                if *window == 0 {
                    return Err(invalid("traffic.window", "must be positive"));
                }
            }
            Traffic::OnOff { on, off } => {
                if !on.is_valid() || !off.is_valid() {
                    return Err(invalid("traffic", "on/off periods must be non-negative"));
                }
                if let Period::Constant { value } = on {
                    if *value <= 0. {
                        return Err(invalid("traffic.on", "on period must be positive"));
                    }
                }
            }
            Traffic::Echo { interval, .. } => {
                if !positive(*interval) {
                    return Err(invalid("traffic.interval", "must be positive"));
                }
            }
        }
        if let Some(threshold) = self.min_expected_throughput_mbps {
            if !non_negative(threshold) {
                return Err(invalid("min_expected_throughput_mbps", "must be non-negative"));
            }
        }
        let stations = self.stations_per_ap as u64 * self.aps as u64;
        let source_ports = 49152u64 + stations;
        if source_ports > u16::MAX as u64 {
            return Err(invalid("stations_per_ap", "too many stations"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("100Mbps", 100e6)]
    #[case("500kb/s", 500e3)]
    #[case("1Gbps", 1e9)]
    #[case("54 Mb/s", 54e6)]
    #[case("1.5Mbps", 1.5e6)]
    #[case("2MBps", 16e6)]
    #[case("1200", 1200.)]
    fn test_parse_data_rate(#[case] s: &str, #[case] bps: f64) {
        assert_eq!(s.parse::<DataRate>().unwrap().bps(), bps);
    }

    #[rstest]
    #[case("")]
    #[case("fast")]
    #[case("10 parsecs")]
    #[case("-5Mbps")]
    fn test_parse_data_rate_errors(#[case] s: &str) {
        assert!(s.parse::<DataRate>().is_err());
    }

    #[test]
    fn test_data_rate_display() {
        assert_eq!(DataRate::from_bps(100e6).to_string(), "100Mbps");
        assert_eq!(DataRate::from_bps(1e9).to_string(), "1Gbps");
        assert_eq!(DataRate::from_bps(1500.).to_string(), "1500bps");
    }

    #[test]
    fn test_defaults() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stop_time(), 6.);
        assert_eq!(config.node_count(), 5);
        assert_eq!(config.effective_mac().rts_threshold, None);
    }

    #[test]
    fn test_partial_yaml() {
        let config = ScenarioConfig::from_yaml(
            r#"
aps: 2
stations_per_ap: 3
data_rate: 20Mbps
rts_cts: true
rate_manager: Ideal
direction: Both
traffic:
  type: OnOff
  on: {type: Constant, value: 1.0}
  off: {type: Exponential, mean: 0.5}
propagation:
  model: LogDistance
  exponent: 3.0
  reference_distance: 1.0
  reference_loss: 46.6777
mac:
  retry_limit: 4
min_expected_throughput_mbps: 5.0
"#,
        )
        .unwrap();
        assert_eq!(config.aps, 2);
        assert_eq!(config.node_count(), 8);
        assert_eq!(config.data_rate.mbps(), 20.);
        assert_eq!(config.direction, Direction::Both);
        assert_eq!(config.payload_size, 1472);
        assert_eq!(config.mac.retry_limit, 4);
        assert_eq!(config.mac.cw_min, 15);
        let mac = config.effective_mac();
        assert_eq!(mac.rts_threshold, Some(10));
        assert_eq!(mac.rate_manager, RateManagerConfig::Ideal);
        assert!(matches!(config.traffic, Traffic::OnOff { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            ScenarioConfig::from_yaml("data_rate: fast"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ScenarioConfig::from_yaml("aps: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[rstest]
    #[case("aps: 0", "aps")]
    #[case("stations_per_ap: 0", "stations_per_ap")]
    #[case("payload_size: 0", "payload_size")]
    #[case("payload_size: 70000", "payload_size")]
    #[case("duration: 0", "duration")]
    #[case("duration: -1", "duration")]
    #[case("sample_interval: 0", "sample_interval")]
    #[case("mac: {cw_min: 63, cw_max: 31}", "mac.cw_min")]
    #[case("data_rate: 0bps", "data_rate")]
    #[case("traffic: {type: Echo, interval: 0}", "traffic.interval")]
    #[case("traffic: {type: Bulk, window: 0}", "traffic.window")]
    fn test_validation(#[case] yaml: &str, #[case] expected_field: &str) {
        let config = ScenarioConfig::from_yaml(yaml).unwrap();
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
