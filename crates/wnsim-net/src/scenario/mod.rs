//! Multi-AP wifi scenario.
//!
//! [`Scenario::build`] creates the nodes, devices, stacks, routes and applications described by a
//! [`ScenarioConfig`], [`Scenario::run`] simulates the traffic period and [`Scenario::teardown`]
//! stops the traffic and releases the packets still held by devices. Access points are placed on a
//! line and chained by wired links, stations are placed on a grid next to their access point and
//! associate with the nearest one.

pub mod config;
pub mod report;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use serde::Serialize;
use sugars::{rc, refcell};

use wnsim_core::{log_debug, log_info, log_warn, Id, Simulation, SimulationContext};
use wnsim_models::geometry::Vector;
use wnsim_models::mobility::{ConstantPosition, Mobility, MobilityModel};
use wnsim_wifi::{DeviceCounters, MacAddress, WifiDevice, WirelessChannel};

use crate::address::AddressAllocator;
use crate::app::{
    AppStart, AppStop, BulkSend, EchoClient, EchoServer, Endpoints, OnOffApp, PacketSink, SourceStats,
};
use crate::link::WiredLink;
use crate::monitor::{throughput_mbps, FlowMonitor};
use crate::routing::{build_routing_tables, RoutingAlgorithm, ShortestPathDijkstra, ShortestPathFloydWarshall};
use crate::sampler::ThroughputSampler;
use crate::stack::{IpStack, NextHop, PacketEventKind, StackCounters};
use crate::topology::{LinkId, LinkKind, Topology};
use crate::trace::{
    CsvTrace, MemoryTrace, MobilityTracer, PacketRecord, PacketTracer, PositionRecord, SharedPacketTrace,
    TraceError, TraceSink,
};

pub use config::{ConfigError, DataRate, Direction, RoutingKind, ScenarioConfig, Traffic};
pub use report::{DeviceReport, EchoReport, RunReport, Validation};
pub use wnsim_wifi::RateManagerConfig;

/// First port assigned to source applications.
pub const FIRST_SOURCE_PORT: u16 = 49153;

/// Shared position trace sink.
pub type SharedPositionTrace = Rc<RefCell<dyn TraceSink<PositionRecord>>>;

/// Role of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NodeRole {
    /// Access point.
    AccessPoint,
    /// Station associated with an access point.
    Station,
}

/// Node of the scenario with its device and stack.
pub struct Node {
    /// Node index, also the topology node id.
    pub index: usize,
    /// Node name.
    pub name: String,
    /// Node role.
    pub role: NodeRole,
    /// IP address.
    pub address: Ipv4Addr,
    /// Index of the associated access point, `None` for access points.
    pub access_point: Option<usize>,
    /// Mobility of the node.
    pub mobility: Rc<RefCell<Mobility>>,
    /// Wifi device.
    pub device: Rc<RefCell<WifiDevice>>,
    /// Network stack.
    pub stack: Rc<RefCell<IpStack>>,
}

enum Source {
    Bulk(Rc<RefCell<BulkSend>>),
    OnOff(Rc<RefCell<OnOffApp>>),
    Echo(Rc<RefCell<EchoClient>>),
}

struct SourceApp {
    id: Id,
    node: usize,
    app: Source,
}

impl SourceApp {
    fn stop(&self) {
        match &self.app {
            Source::Bulk(app) => app.borrow_mut().stop(),
            Source::OnOff(app) => app.borrow_mut().stop(),
            Source::Echo(app) => app.borrow_mut().stop(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.app {
            Source::Bulk(app) => app.borrow().stats().clone(),
            Source::OnOff(app) => app.borrow().stats().clone(),
            Source::Echo(app) => app.borrow().source_stats().clone(),
        }
    }
}

/// Configured simulation ready to run.
pub struct Scenario {
    config: ScenarioConfig,
    sim: Simulation,
    ctx: SimulationContext,
    topology: Topology,
    nodes: Vec<Node>,
    links: Vec<Rc<RefCell<WiredLink>>>,
    sources: Vec<SourceApp>,
    sinks: Vec<Rc<RefCell<PacketSink>>>,
    echo_servers: Vec<Rc<RefCell<EchoServer>>>,
    monitor: Rc<RefCell<FlowMonitor>>,
    sampler: Rc<RefCell<ThroughputSampler>>,
    packet_trace: Option<SharedPacketTrace>,
    mobility_trace: Option<SharedPositionTrace>,
    mobility_tracer: Option<Rc<RefCell<MobilityTracer>>>,
    flushed_packets: Option<usize>,
}

impl Scenario {
    /// Validates the config and sets up the simulation.
    pub fn build(config: ScenarioConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut sim = Simulation::new(config.seed);
        let ctx = sim.create_context("scenario");
        let stop_time = config.stop_time();

        let channel = rc!(refcell!(WirelessChannel::new(
            config.frequency,
            config.propagation.build(),
            config.propagation_delay.build(),
            sim.create_context("channel"),
        )));
        let mac = config.effective_mac();
        let mut allocator = AddressAllocator::new(config.subnet, config.prefix_len)?;
        let mut topology = Topology::new();

        // NODES ///////////////////////////////////////////////////////////////

        let mut placements = Vec::with_capacity(config.node_count() as usize);
        for ap in 0..config.aps {
            placements.push((format!("ap{}", ap), NodeRole::AccessPoint, ap_position(&config, ap)));
        }
        for ap in 0..config.aps {
            for j in 0..config.stations_per_ap {
                let name = format!("sta{}", ap * config.stations_per_ap + j);
                placements.push((name, NodeRole::Station, station_position(&config, ap, j)));
            }
        }
        let ap_positions: Vec<Vector> = (0..config.aps).map(|ap| ap_position(&config, ap)).collect();

        let mut nodes: Vec<Node> = Vec::with_capacity(placements.len());
        for (name, role, position) in placements {
            let index = topology.add_node(&name);
            let address = allocator.assign_address(index)?;
            let (model, access_point): (Box<dyn MobilityModel>, _) = match role {
                NodeRole::AccessPoint => (Box::new(ConstantPosition::new(position)), None),
                NodeRole::Station => (
                    config.station_mobility.build(position, ctx.gen_seed()),
                    Some(nearest(&ap_positions, &position)),
                ),
            };
            let mobility = rc!(refcell!(Mobility::new(model)));

            let device_name = format!("{}-wifi", name);
            let device = rc!(refcell!(WifiDevice::new(
                MacAddress::new(index as u64 + 1),
                index,
                config.phy.clone(),
                mac.clone(),
                channel.clone(),
                sim.create_context(&device_name),
            )));
            let device_id = sim.add_handler(&device_name, device.clone());
            channel.borrow_mut().attach(device_id, mobility.clone());

            let stack_name = format!("{}-ip", name);
            let stack = rc!(refcell!(IpStack::new(index, address, sim.create_context(&stack_name))));
            let stack_id = sim.add_handler(&stack_name, stack.clone());
            device.borrow_mut().set_upper_layer(stack_id);

            log_debug!(
                ctx,
                "{} at ({:.1}, {:.1}, {:.1}) has address {}",
                name,
                position.x,
                position.y,
                position.z,
                address
            );
            nodes.push(Node {
                index,
                name,
                role,
                address,
                access_point,
                mobility,
                device,
                stack,
            });
        }

        // LINKS ///////////////////////////////////////////////////////////////

        let mut link_components: BTreeMap<LinkId, Id> = BTreeMap::new();
        let mut links = Vec::new();
        for ap in 1..config.aps as usize {
            let bandwidth = config.backbone_rate.bps();
            let latency = config.backbone_latency;
            let link_id = topology.add_link(ap - 1, ap, LinkKind::Wired { bandwidth, latency });
            let name = format!("backbone{}", ap - 1);
            let link = rc!(refcell!(WiredLink::new(
                nodes[ap - 1].stack.borrow().id(),
                nodes[ap].stack.borrow().id(),
                bandwidth,
                latency,
                sim.create_context(&name),
            )));
            link_components.insert(link_id, sim.add_handler(&name, link.clone()));
            links.push(link);
        }
        for node in nodes.iter() {
            if let Some(ap) = node.access_point {
                topology.add_link(node.index, ap, LinkKind::Wireless);
            }
        }

        // ROUTES //////////////////////////////////////////////////////////////

        let mut algorithm: Box<dyn RoutingAlgorithm> = match config.routing {
            RoutingKind::Dijkstra => Box::<ShortestPathDijkstra>::default(),
            RoutingKind::FloydWarshall => Box::<ShortestPathFloydWarshall>::default(),
        };
        let tables = build_routing_tables(&topology, algorithm.as_mut());
        for (src, table) in tables.iter().enumerate() {
            let mut stack = nodes[src].stack.borrow_mut();
            for (&dst, route) in table.iter() {
                let next_hop = match topology.link(route.link).kind {
                    LinkKind::Wireless => NextHop::Wifi {
                        device: nodes[src].device.borrow().id(),
                        address: nodes[route.next_hop].device.borrow().address(),
                    },
                    LinkKind::Wired { .. } => match link_components.get(&route.link) {
                        Some(&link) => NextHop::Wired { link },
                        None => continue,
                    },
                };
                stack.add_route(nodes[dst].address, next_hop);
            }
        }

        // MONITOR /////////////////////////////////////////////////////////////

        let monitor = rc!(refcell!(FlowMonitor::new()));
        for node in nodes.iter() {
            let monitor = monitor.clone();
            node.stack.borrow_mut().subscribe(move |n| {
                let key = n.packet.flow_key();
                let size = n.packet.payload_size as u64;
                match n.kind {
                    PacketEventKind::Sent => monitor.borrow_mut().on_packet_sent(&key, size, n.time),
                    PacketEventKind::Received => {
                        let mut monitor = monitor.borrow_mut();
                        monitor.on_packet_received(&key, size, n.time);
                        monitor.on_packet_delay(&key, n.time - n.packet.created_at);
                    }
                    _ => {}
                }
            });
        }

        // APPLICATIONS ////////////////////////////////////////////////////////

        let mut scenario_apps = Apps::default();
        let stations: Vec<usize> = nodes
            .iter()
            .filter(|node| node.role == NodeRole::Station)
            .map(|node| node.index)
            .collect();
        if config.direction.uplink() {
            scenario_apps.add_receiver(&mut sim, &config, &nodes[0])?;
        }
        if config.direction.downlink() {
            for &sta in stations.iter() {
                scenario_apps.add_receiver(&mut sim, &config, &nodes[sta])?;
            }
        }
        for (k, &sta) in stations.iter().enumerate() {
            let src_port = FIRST_SOURCE_PORT + k as u16;
            if config.direction.uplink() {
                scenario_apps.add_source(&mut sim, &config, &nodes[sta], &nodes[0], src_port)?;
            }
            if config.direction.downlink() {
                scenario_apps.add_source(&mut sim, &config, &nodes[0], &nodes[sta], src_port)?;
            }
        }
        for source in scenario_apps.sources.iter() {
            ctx.emit(AppStart {}, source.id, config.app_start);
            ctx.emit(AppStop {}, source.id, stop_time);
        }

        // SAMPLER & TRACES ////////////////////////////////////////////////////

        let sampler = rc!(refcell!(ThroughputSampler::new(
            monitor.clone(),
            config.sample_interval,
            sim.create_context("sampler"),
        )));
        sim.add_handler("sampler", sampler.clone());
        sampler.borrow_mut().start(config.sample_start, stop_time);

        if let Some(dir) = &config.trace_dir {
            if config.packet_trace || config.mobility_trace {
                std::fs::create_dir_all(dir)?;
            }
        }

        let packet_trace = if config.packet_trace {
            let sink: SharedPacketTrace = match &config.trace_dir {
                Some(dir) => rc!(refcell!(CsvTrace::create(dir.join("packets.csv"))?)),
                None => rc!(refcell!(MemoryTrace::<PacketRecord>::new())),
            };
            let tracer = PacketTracer::new(sink.clone());
            for node in nodes.iter() {
                tracer.attach_stack(&mut node.stack.borrow_mut());
                tracer.attach_device(&mut node.device.borrow_mut());
            }
            Some(sink)
        } else {
            None
        };

        let (mobility_trace, mobility_tracer) = if config.mobility_trace {
            let sink: SharedPositionTrace = match &config.trace_dir {
                Some(dir) => rc!(refcell!(CsvTrace::create(dir.join("mobility.csv"))?)),
                None => rc!(refcell!(MemoryTrace::<PositionRecord>::new())),
            };
            let tracer = rc!(refcell!(MobilityTracer::new(
                sink.clone(),
                config.mobility_trace_interval,
                sim.create_context("mobility-trace"),
            )));
            sim.add_handler("mobility-trace", tracer.clone());
            for node in nodes.iter() {
                tracer.borrow_mut().add_node(node.index, node.mobility.clone());
            }
            tracer.borrow_mut().start();
            (Some(sink), Some(tracer))
        } else {
            (None, None)
        };

        log_info!(
            ctx,
            "{} access points, {} stations, {} flows planned",
            config.aps,
            stations.len(),
            scenario_apps.sources.len()
        );

        Ok(Self {
            config,
            sim,
            ctx,
            topology,
            nodes,
            links,
            sources: scenario_apps.sources,
            sinks: scenario_apps.sinks,
            echo_servers: scenario_apps.echo_servers,
            monitor,
            sampler,
            packet_trace,
            mobility_trace,
            mobility_tracer,
            flushed_packets: None,
        })
    }

    /// Runs the simulation until the end of the traffic period.
    pub fn run(&mut self) {
        let stop_time = self.config.stop_time();
        log_info!(self.ctx, "running until {:.3} s", stop_time);
        self.sim.step_until_time(stop_time);
        log_info!(
            self.ctx,
            "stopped after {} events, {} pending",
            self.sim.processed_event_count(),
            self.sim.pending_event_count()
        );
    }

    /// Stops the applications and samplers, cancels pending events and discards packets held by
    /// devices. Returns the number of discarded packets.
    pub fn teardown(&mut self) -> usize {
        for source in self.sources.iter() {
            source.stop();
        }
        self.sampler.borrow_mut().stop();
        if let Some(tracer) = &self.mobility_tracer {
            tracer.borrow_mut().stop();
        }
        let cancelled = self.sim.cancel_events(|_| true);
        let flushed: usize = self.nodes.iter().map(|node| node.device.borrow_mut().flush()).sum();
        log_info!(self.ctx, "teardown: cancelled {} events, flushed {} packets", cancelled, flushed);
        self.flushed_packets = Some(flushed);
        flushed
    }

    /// Flushes the traces.
    pub fn finish_traces(&mut self) -> Result<(), TraceError> {
        if let Some(trace) = &self.packet_trace {
            trace.borrow_mut().finish()?;
        }
        if let Some(trace) = &self.mobility_trace {
            trace.borrow_mut().finish()?;
        }
        Ok(())
    }

    /// Collects the results.
    pub fn report(&self) -> RunReport {
        let duration = self.config.duration;
        let monitor = self.monitor.borrow();
        let flows = monitor.snapshot_over(duration);
        let total_tx_bytes = flows.iter().map(|flow| flow.tx_bytes).sum();
        let total_rx_bytes = monitor.total_rx_bytes();
        let average_throughput_mbps = throughput_mbps(total_rx_bytes, duration);

        let mut mac = DeviceCounters::default();
        let mut stack = StackCounters::default();
        let mut devices = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.iter() {
            let device = node.device.borrow();
            mac += device.counters();
            stack += node.stack.borrow().counters();
            devices.push(DeviceReport {
                node: node.name.clone(),
                counters: device.counters().clone(),
            });
        }

        let echo = self
            .sources
            .iter()
            .filter_map(|source| match &source.app {
                Source::Echo(client) => {
                    let client = client.borrow();
                    Some(EchoReport {
                        node: self.nodes[source.node].name.clone(),
                        stats: client.stats().clone(),
                        mean_rtt: client.stats().mean_rtt(),
                    })
                }
                _ => None,
            })
            .collect();

        let validation = Validation::check(self.config.min_expected_throughput_mbps, average_throughput_mbps);
        if !validation.passed {
            log_warn!(
                self.ctx,
                "average throughput {:.3} Mbit/s is below the expected {:.3} Mbit/s",
                average_throughput_mbps,
                self.config.min_expected_throughput_mbps.unwrap_or_default()
            );
        }

        let sampler = self.sampler.borrow();
        RunReport {
            seed: self.config.seed,
            duration,
            end_time: self.sim.time(),
            processed_events: self.sim.processed_event_count(),
            flows,
            total_tx_bytes,
            total_rx_bytes,
            average_throughput_mbps,
            throughput: sampler.samples().to_vec(),
            flow_series: sampler.flow_samples().to_vec(),
            mac,
            devices,
            stack,
            echo,
            flushed_packets: self.flushed_packets.unwrap_or(0),
            validation,
        }
    }

    /// Returns the config.
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Returns the simulation.
    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// Returns the network topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the nodes, access points first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the backbone links.
    pub fn links(&self) -> &[Rc<RefCell<WiredLink>>] {
        &self.links
    }

    /// Returns the flow monitor.
    pub fn monitor(&self) -> &Rc<RefCell<FlowMonitor>> {
        &self.monitor
    }

    /// Returns the throughput sampler.
    pub fn sampler(&self) -> &Rc<RefCell<ThroughputSampler>> {
        &self.sampler
    }

    /// Returns the packet sinks.
    pub fn sinks(&self) -> &[Rc<RefCell<PacketSink>>] {
        &self.sinks
    }

    /// Returns the echo servers.
    pub fn echo_servers(&self) -> &[Rc<RefCell<EchoServer>>] {
        &self.echo_servers
    }

    /// Returns the send counters of the source applications.
    pub fn source_stats(&self) -> Vec<SourceStats> {
        self.sources.iter().map(|source| source.stats()).collect()
    }

    /// Returns the packet trace if enabled.
    pub fn packet_trace(&self) -> Option<&SharedPacketTrace> {
        self.packet_trace.as_ref()
    }

    /// Returns the mobility trace if enabled.
    pub fn mobility_trace(&self) -> Option<&SharedPositionTrace> {
        self.mobility_trace.as_ref()
    }

    /// Returns the number of packets still held by devices.
    pub fn packets_in_flight(&self) -> usize {
        self.nodes.iter().map(|node| node.device.borrow().in_flight()).sum()
    }
}

/// Builds, runs and tears down the scenario, then returns its report.
pub fn execute(config: ScenarioConfig) -> Result<RunReport, ConfigError> {
    let mut scenario = Scenario::build(config)?;
    scenario.run();
    scenario.teardown();
    scenario.finish_traces()?;
    Ok(scenario.report())
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Default)]
struct Apps {
    sources: Vec<SourceApp>,
    sinks: Vec<Rc<RefCell<PacketSink>>>,
    echo_servers: Vec<Rc<RefCell<EchoServer>>>,
}

impl Apps {
    fn add_receiver(&mut self, sim: &mut Simulation, config: &ScenarioConfig, node: &Node) -> Result<(), ConfigError> {
        let id = match config.traffic {
            Traffic::Echo { .. } => {
                let name = format!("{}-echo-server", node.name);
                let server = rc!(refcell!(EchoServer::new(
                    node.stack.borrow().id(),
                    sim.create_context(&name)
                )));
                self.echo_servers.push(server.clone());
                sim.add_handler(&name, server)
            }
            _ => {
                let name = format!("{}-sink", node.name);
                let sink = rc!(refcell!(PacketSink::new(config.port, sim.create_context(&name))));
                self.sinks.push(sink.clone());
                sim.add_handler(&name, sink)
            }
        };
        node.stack.borrow_mut().bind(config.port, id)?;
        Ok(())
    }

    fn add_source(
        &mut self,
        sim: &mut Simulation,
        config: &ScenarioConfig,
        from: &Node,
        to: &Node,
        src_port: u16,
    ) -> Result<(), ConfigError> {
        let endpoints = Endpoints {
            stack: from.stack.borrow().id(),
            src: from.address,
            src_port,
            dst: to.address,
            dst_port: config.port,
        };
        let payload_size = config.payload_size;
        let (id, app) = match &config.traffic {
            Traffic::Bulk { window, max_bytes } => {
                let name = format!("{}-bulk-{}", from.name, to.name);
                let app = rc!(refcell!(BulkSend::new(
                    endpoints,
                    payload_size,
                    *window,
                    *max_bytes,
                    sim.create_context(&name)
                )));
                (sim.add_handler(&name, app.clone()), Source::Bulk(app))
            }
            Traffic::OnOff { on, off } => {
                let name = format!("{}-onoff-{}", from.name, to.name);
                let app = rc!(refcell!(OnOffApp::new(
                    endpoints,
                    payload_size,
                    config.data_rate.bps(),
                    on.clone(),
                    off.clone(),
                    sim.create_context(&name)
                )));
                (sim.add_handler(&name, app.clone()), Source::OnOff(app))
            }
            Traffic::Echo { interval, max_requests } => {
                let name = format!("{}-echo-{}", from.name, to.name);
                let app = rc!(refcell!(EchoClient::new(
                    endpoints,
                    payload_size,
                    *interval,
                    *max_requests,
                    sim.create_context(&name)
                )));
                let id = sim.add_handler(&name, app.clone());
                from.stack.borrow_mut().bind(src_port, id)?;
                (id, Source::Echo(app))
            }
        };
        self.sources.push(SourceApp {
            id,
            node: from.index,
            app,
        });
        Ok(())
    }
}

fn ap_position(config: &ScenarioConfig, ap: u32) -> Vector {
    Vector::new(ap as f64 * config.ap_spacing, 0., 0.)
}

fn station_position(config: &ScenarioConfig, ap: u32, j: u32) -> Vector {
    let origin = ap_position(config, ap);
    let column = (j % config.grid_width) as f64;
    let row = (j / config.grid_width + 1) as f64;
    Vector::new(
        origin.x + column * config.station_spacing,
        origin.y + row * config.station_spacing,
        origin.z,
    )
}

fn nearest(aps: &[Vector], position: &Vector) -> usize {
    aps.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.distance(position).total_cmp(&b.distance(position)))
        .map_or(0, |(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_grid() {
        let config = ScenarioConfig {
            aps: 2,
            stations_per_ap: 4,
            grid_width: 2,
            ap_spacing: 20.,
            station_spacing: 5.,
            ..Default::default()
        };
        assert_eq!(station_position(&config, 0, 0), Vector::new(0., 5., 0.));
        assert_eq!(station_position(&config, 0, 1), Vector::new(5., 5., 0.));
        assert_eq!(station_position(&config, 0, 2), Vector::new(0., 10., 0.));
        assert_eq!(station_position(&config, 1, 3), Vector::new(25., 10., 0.));
    }

    #[test]
    fn test_nearest_access_point() {
        let aps = vec![Vector::new(0., 0., 0.), Vector::new(20., 0., 0.)];
        assert_eq!(nearest(&aps, &Vector::new(5., 5., 0.)), 0);
        assert_eq!(nearest(&aps, &Vector::new(15., 5., 0.)), 1);
        // ties go to the first access point
        assert_eq!(nearest(&aps, &Vector::new(10., 5., 0.)), 0);
    }
}
