//! End-of-run report.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use wnsim_wifi::DeviceCounters;

use crate::app::echo::EchoStats;
use crate::monitor::FlowStats;
use crate::sampler::{FlowSample, ThroughputSample};
use crate::stack::StackCounters;

/// Counters of a single device.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceReport {
    /// Node name.
    pub node: String,
    /// Device counters.
    pub counters: DeviceCounters,
}

/// Round-trip statistics of an echo client.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EchoReport {
    /// Node name of the client.
    pub node: String,
    /// Client statistics.
    pub stats: EchoStats,
    /// Mean round-trip time in seconds.
    pub mean_rtt: f64,
}

/// Outcome of the throughput check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Validation {
    /// Expected minimum of the average throughput in Mbit/s.
    pub min_expected_throughput_mbps: Option<f64>,
    /// Whether the run satisfies the expectation.
    pub passed: bool,
}

impl Validation {
    /// Checks the average throughput against the expected minimum, passes without expectation.
    pub fn check(min_expected_throughput_mbps: Option<f64>, average_throughput_mbps: f64) -> Self {
        Self {
            min_expected_throughput_mbps,
            passed: min_expected_throughput_mbps.map_or(true, |min| average_throughput_mbps >= min),
        }
    }
}

/// Results of a scenario run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    /// Random seed.
    pub seed: u64,
    /// Traffic duration used for average throughputs.
    pub duration: f64,
    /// Simulation time at the end of the run.
    pub end_time: f64,
    /// Number of processed events.
    pub processed_events: u64,
    /// Per-flow statistics ordered by flow id.
    pub flows: Vec<FlowStats>,
    /// Bytes sent by all flows.
    pub total_tx_bytes: u64,
    /// Bytes received by all flows.
    pub total_rx_bytes: u64,
    /// Average aggregate throughput over the traffic duration in Mbit/s.
    pub average_throughput_mbps: f64,
    /// Aggregate throughput series.
    pub throughput: Vec<ThroughputSample>,
    /// Per-flow received bytes series.
    pub flow_series: Vec<FlowSample>,
    /// Sum of the counters of all devices.
    pub mac: DeviceCounters,
    /// Per-device counters.
    pub devices: Vec<DeviceReport>,
    /// Sum of the counters of all stacks.
    pub stack: StackCounters,
    /// Echo clients statistics.
    pub echo: Vec<EchoReport>,
    /// Packets discarded from device queues at teardown.
    pub flushed_packets: usize,
    /// Throughput check.
    pub validation: Validation,
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for flow in &self.flows {
            writeln!(f, "Flow {} ({})", flow.flow_id, flow.key)?;
            writeln!(f, "  Tx Packets: {}", flow.tx_packets)?;
            writeln!(f, "  Tx Bytes:   {}", flow.tx_bytes)?;
            writeln!(f, "  Rx Packets: {}", flow.rx_packets)?;
            writeln!(f, "  Rx Bytes:   {}", flow.rx_bytes)?;
            writeln!(f, "  Lost:       {} ({:.2}%)", flow.lost_packets, flow.loss_ratio * 100.)?;
            writeln!(f, "  Mean delay: {:.3} ms", flow.mean_delay * 1e3)?;
            writeln!(f, "  Throughput: {:.3} Mbit/s", flow.throughput_mbps)?;
        }
        for echo in &self.echo {
            writeln!(
                f,
                "Echo {}: {} requests, {} replies, mean RTT {:.3} ms",
                echo.node,
                echo.stats.requests,
                echo.stats.replies,
                echo.mean_rtt * 1e3
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Collisions: {}", self.mac.collisions)?;
        writeln!(f, "MAC drops: {}", self.mac.mac_drops)?;
        writeln!(f, "Queue drops: {}", self.mac.queue_drops)?;
        writeln!(
            f,
            "PHY: tx {}, rx_ok {}, rx_error {}",
            self.mac.phy_tx, self.mac.rx_ok, self.mac.rx_error
        )?;
        writeln!(f, "Packets flushed at teardown: {}", self.flushed_packets)?;
        writeln!(f)?;
        write!(f, "Average throughput: {:.3} Mbit/s", self.average_throughput_mbps)?;
        if !self.validation.passed {
            if let Some(min) = self.validation.min_expected_throughput_mbps {
                write!(f, "\nObtained throughput is below the expected {:.3} Mbit/s", min)?;
            }
        }
        Ok(())
    }
}
