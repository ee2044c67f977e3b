//! Per-flow statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use wnsim_wifi::FlowKey;

/// Returns the fraction of lost packets, 0 if nothing was sent.
///
/// # Examples
///
/// ```rust
/// use wnsim_net::monitor::loss_ratio;
///
/// assert_eq!(loss_ratio(100, 80), 0.2);
/// assert_eq!(loss_ratio(0, 0), 0.);
/// ```
pub fn loss_ratio(tx_packets: u64, rx_packets: u64) -> f64 {
    if tx_packets == 0 {
        0.
    } else {
        tx_packets.saturating_sub(rx_packets) as f64 / tx_packets as f64
    }
}

/// Returns the throughput in Mbit/s of `bytes` transferred during `duration` seconds, 0 for an
/// empty interval.
pub fn throughput_mbps(bytes: u64, duration: f64) -> f64 {
    if duration <= 0. {
        0.
    } else {
        bytes as f64 * 8. / duration / 1e6
    }
}

/// Counters of a single flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowRecord {
    /// Flow id, assigned sequentially from 1 in order of first appearance.
    pub flow_id: u32,
    /// Five-tuple of the flow.
    pub key: FlowKey,
    /// Bytes sent by the source.
    pub tx_bytes: u64,
    /// Bytes received by the destination.
    pub rx_bytes: u64,
    /// Packets sent by the source.
    pub tx_packets: u64,
    /// Packets received by the destination.
    pub rx_packets: u64,
    /// Time of the first sent packet.
    pub first_tx: Option<f64>,
    /// Time of the last sent packet.
    pub last_tx: Option<f64>,
    /// Time of the first received packet.
    pub first_rx: Option<f64>,
    /// Time of the last received packet.
    pub last_rx: Option<f64>,
    /// Sum of one-way delays of received packets.
    pub delay_sum: f64,
    /// Number of delay samples.
    pub delay_samples: u64,
}

impl FlowRecord {
    fn new(flow_id: u32, key: FlowKey) -> Self {
        Self {
            flow_id,
            key,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_packets: 0,
            rx_packets: 0,
            first_tx: None,
            last_tx: None,
            first_rx: None,
            last_rx: None,
            delay_sum: 0.,
            delay_samples: 0,
        }
    }

    /// Returns the number of sent packets that were not received.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }

    /// Returns the mean one-way delay or 0 if there are no samples.
    pub fn mean_delay(&self) -> f64 {
        if self.delay_samples == 0 {
            0.
        } else {
            self.delay_sum / self.delay_samples as f64
        }
    }

    /// Returns the throughput from the first sent to the last received packet.
    pub fn active_throughput_mbps(&self) -> f64 {
        match (self.first_tx, self.last_rx) {
            (Some(start), Some(end)) => throughput_mbps(self.rx_bytes, end - start),
            _ => 0.,
        }
    }
}

/// Summary of a flow included in reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowStats {
    /// Flow id.
    pub flow_id: u32,
    /// Five-tuple of the flow.
    pub key: FlowKey,
    /// Bytes sent.
    pub tx_bytes: u64,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Packets sent.
    pub tx_packets: u64,
    /// Packets received.
    pub rx_packets: u64,
    /// Packets lost.
    pub lost_packets: u64,
    /// Fraction of lost packets.
    pub loss_ratio: f64,
    /// Mean one-way delay in seconds.
    pub mean_delay: f64,
    /// Throughput in Mbit/s.
    pub throughput_mbps: f64,
}

impl FlowStats {
    fn from_record(record: &FlowRecord, throughput_mbps: f64) -> Self {
        Self {
            flow_id: record.flow_id,
            key: record.key,
            tx_bytes: record.tx_bytes,
            rx_bytes: record.rx_bytes,
            tx_packets: record.tx_packets,
            rx_packets: record.rx_packets,
            lost_packets: record.lost_packets(),
            loss_ratio: loss_ratio(record.tx_packets, record.rx_packets),
            mean_delay: record.mean_delay(),
            throughput_mbps,
        }
    }
}

/// Collects per-flow counters from packet events.
#[derive(Default)]
pub struct FlowMonitor {
    flows: BTreeMap<FlowKey, FlowRecord>,
    total_rx_bytes: u64,
}

impl FlowMonitor {
    /// Creates an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, key: &FlowKey) -> &mut FlowRecord {
        let next_id = self.flows.len() as u32 + 1;
        self.flows
            .entry(*key)
            .or_insert_with(|| FlowRecord::new(next_id, *key))
    }

    /// Accounts a packet of `size` bytes sent by the flow source.
    pub fn on_packet_sent(&mut self, key: &FlowKey, size: u64, time: f64) {
        let record = self.record(key);
        record.tx_packets += 1;
        record.tx_bytes += size;
        record.first_tx.get_or_insert(time);
        record.last_tx = Some(time);
    }

    /// Accounts a packet of `size` bytes received by the flow destination.
    pub fn on_packet_received(&mut self, key: &FlowKey, size: u64, time: f64) {
        let record = self.record(key);
        record.rx_packets += 1;
        record.rx_bytes += size;
        record.first_rx.get_or_insert(time);
        record.last_rx = Some(time);
        self.total_rx_bytes += size;
    }

    /// Accounts the one-way delay of a received packet.
    pub fn on_packet_delay(&mut self, key: &FlowKey, delay: f64) {
        let record = self.record(key);
        record.delay_sum += delay;
        record.delay_samples += 1;
    }

    /// Returns the record of the flow.
    pub fn flow(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.flows.get(key)
    }

    /// Returns the flow records ordered by flow id.
    pub fn flows(&self) -> Vec<&FlowRecord> {
        let mut flows: Vec<_> = self.flows.values().collect();
        flows.sort_by_key(|record| record.flow_id);
        flows
    }

    /// Returns the number of flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Returns the bytes received by all flows.
    pub fn total_rx_bytes(&self) -> u64 {
        self.total_rx_bytes
    }

    /// Returns the summary of all flows ordered by flow id, with throughput computed over the
    /// active period of each flow (from its first sent to its last received packet).
    pub fn snapshot(&self) -> Vec<FlowStats> {
        self.flows()
            .into_iter()
            .map(|record| FlowStats::from_record(record, record.active_throughput_mbps()))
            .collect()
    }

    /// Returns the summary of all flows ordered by flow id, with throughput computed over the
    /// given measurement duration.
    pub fn snapshot_over(&self, duration: f64) -> Vec<FlowStats> {
        self.flows()
            .into_iter()
            .map(|record| FlowStats::from_record(record, throughput_mbps(record.rx_bytes, duration)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use approx::assert_relative_eq;

    use super::*;

    fn key(src: u8, dst_port: u16) -> FlowKey {
        FlowKey {
            src: Ipv4Addr::new(192, 168, 0, src),
            dst: Ipv4Addr::new(192, 168, 0, 1),
            src_port: 49153,
            dst_port,
            protocol: 17,
        }
    }

    #[test]
    fn test_loss_ratio() {
        assert_relative_eq!(loss_ratio(100, 80), 0.2);
        assert_eq!(loss_ratio(0, 0), 0.);
        assert_eq!(loss_ratio(10, 10), 0.);
        // receptions never exceed transmissions in a consistent trace, but the ratio stays sane
        assert_eq!(loss_ratio(5, 7), 0.);
    }

    #[test]
    fn test_empty_monitor() {
        let monitor = FlowMonitor::new();
        assert!(monitor.snapshot().is_empty());
        assert!(monitor.snapshot_over(1.).is_empty());
        assert_eq!(monitor.total_rx_bytes(), 0);
    }

    #[test]
    fn test_flow_ids_in_order_of_appearance() {
        let mut monitor = FlowMonitor::new();
        // the flow with the largest key appears first
        monitor.on_packet_sent(&key(9, 9), 100, 1.);
        monitor.on_packet_sent(&key(2, 9), 100, 1.1);
        monitor.on_packet_received(&key(5, 9), 100, 1.2);
        monitor.on_packet_sent(&key(9, 9), 100, 1.3);

        let ids: Vec<_> = monitor.snapshot().iter().map(|s| (s.flow_id, s.key)).collect();
        assert_eq!(ids, vec![(1, key(9, 9)), (2, key(2, 9)), (3, key(5, 9))]);
    }

    #[test]
    fn test_single_flow() {
        let mut monitor = FlowMonitor::new();
        let flow = key(2, 9);
        for i in 0..100 {
            let time = 1. + i as f64 * 0.01;
            monitor.on_packet_sent(&flow, 1000, time);
            if i % 5 != 0 {
                monitor.on_packet_received(&flow, 1000, time + 0.002);
                monitor.on_packet_delay(&flow, 0.002);
            }
        }
        let record = monitor.flow(&flow).unwrap();
        assert_eq!(record.tx_packets, 100);
        assert_eq!(record.rx_packets, 80);
        assert_eq!(record.lost_packets(), 20);
        assert_eq!(record.first_tx, Some(1.));

        let stats = &monitor.snapshot_over(2.)[0];
        assert_eq!(stats.flow_id, 1);
        assert_eq!(stats.rx_bytes, 80_000);
        assert_relative_eq!(stats.loss_ratio, 0.2);
        assert_relative_eq!(stats.mean_delay, 0.002, epsilon = 1e-12);
        assert_relative_eq!(stats.throughput_mbps, 0.32);
        assert_eq!(monitor.total_rx_bytes(), 80_000);

        // from 1.0 to 1.99 + 0.002
        let active = &monitor.snapshot()[0];
        assert_relative_eq!(active.throughput_mbps, 80_000. * 8. / 0.992 / 1e6, epsilon = 1e-9);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let mut monitor = FlowMonitor::new();
        let flow = key(3, 9);
        let mut prev = 0;
        for i in 0..10 {
            monitor.on_packet_received(&flow, 100 + i, i as f64);
            let rx = monitor.flow(&flow).unwrap().rx_bytes;
            assert!(rx > prev);
            prev = rx;
        }
        let stats = &monitor.snapshot()[0];
        // nothing was sent
        assert_eq!(stats.loss_ratio, 0.);
        assert_eq!(stats.throughput_mbps, 0.);
    }
}
