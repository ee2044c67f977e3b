use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use approx::assert_relative_eq;
use sugars::{rc, refcell};

use wnsim_core::{cast, Event, EventHandler, Id, Simulation, SimulationContext};
use wnsim_net::app::{AppStart, EchoClient, EchoServer, Endpoints, PacketSink};
use wnsim_net::link::WiredLink;
use wnsim_net::stack::{DropReason, IpStack, NextHop, PacketEventKind, SendPacket, StackError};
use wnsim_wifi::{Packet, TxDone};

const BANDWIDTH: f64 = 1e6;
const LATENCY: f64 = 1e-3;
// 1000 bytes with headers, 8 ms at 1 Mbit/s
const PAYLOAD: u32 = 972;
const HOP_TIME: f64 = 0.009;

#[derive(Default)]
struct Recorder {
    done: Vec<(u64, bool, f64)>,
}

struct RecorderHandler {
    recorder: Rc<RefCell<Recorder>>,
    ctx: SimulationContext,
}

impl EventHandler for RecorderHandler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TxDone { packet_uid, success } => {
                self.recorder.borrow_mut().done.push((packet_uid, success, self.ctx.time()));
            }
        })
    }
}

/// Three stacks chained by wired links: a - b - c.
struct Chain {
    sim: Simulation,
    stacks: Vec<Rc<RefCell<IpStack>>>,
    recorder: Rc<RefCell<Recorder>>,
    recorder_id: Id,
    driver: SimulationContext,
    next_seq: u32,
}

fn address(index: usize) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, index as u8 + 1)
}

impl Chain {
    fn new() -> Self {
        let mut sim = Simulation::new(123);
        let mut stacks = Vec::new();
        for (index, name) in ["a", "b", "c"].iter().enumerate() {
            let name = format!("{}-ip", name);
            let stack = rc!(refcell!(IpStack::new(index, address(index), sim.create_context(&name))));
            sim.add_handler(&name, stack.clone());
            stacks.push(stack);
        }
        let mut links = Vec::new();
        for i in 0..2 {
            let name = format!("link{}", i);
            let link = rc!(refcell!(WiredLink::new(
                stacks[i].borrow().id(),
                stacks[i + 1].borrow().id(),
                BANDWIDTH,
                LATENCY,
                sim.create_context(&name),
            )));
            links.push(sim.add_handler(&name, link));
        }
        let routes = [
            (0, 1, links[0]),
            (0, 2, links[0]),
            (1, 0, links[0]),
            (1, 2, links[1]),
            (2, 0, links[1]),
            (2, 1, links[1]),
        ];
        for (src, dst, link) in routes {
            stacks[src].borrow_mut().add_route(address(dst), NextHop::Wired { link });
        }

        let recorder = rc!(refcell!(Recorder::default()));
        let handler = rc!(refcell!(RecorderHandler {
            recorder: recorder.clone(),
            ctx: sim.create_context("app"),
        }));
        let recorder_id = sim.add_handler("app", handler);
        let driver = sim.create_context("driver");
        Self {
            sim,
            stacks,
            recorder,
            recorder_id,
            driver,
            next_seq: 0,
        }
    }

    fn add_sink(&mut self, node: usize, port: u16) -> Rc<RefCell<PacketSink>> {
        let name = format!("sink{}-{}", node, port);
        let sink = rc!(refcell!(PacketSink::new(port, self.sim.create_context(&name))));
        let id = self.sim.add_handler(&name, sink.clone());
        self.stacks[node].borrow_mut().bind(port, id).unwrap();
        sink
    }

    fn packet(&mut self, from: usize, dst: Ipv4Addr, dst_port: u16) -> Packet {
        let mut packet = Packet::udp(
            self.recorder_id,
            self.next_seq,
            address(from),
            49153,
            dst,
            dst_port,
            PAYLOAD,
            self.sim.time(),
        );
        packet.origin_app = Some(self.recorder_id);
        self.next_seq += 1;
        packet
    }

    fn send(&mut self, from: usize, packet: Packet) -> u64 {
        let uid = packet.uid;
        self.driver.emit_now(SendPacket { packet }, self.stacks[from].borrow().id());
        uid
    }
}

#[test]
fn test_forwarding_over_two_hops() {
    let mut chain = Chain::new();
    let sink = chain.add_sink(2, 9);
    let packet = chain.packet(0, address(2), 9);
    let uid = chain.send(0, packet);
    chain.sim.step_until_no_events();

    let stats = sink.borrow().stats().clone();
    assert_eq!(stats.rx_packets, 1);
    assert_eq!(stats.rx_bytes, PAYLOAD as u64);
    assert_relative_eq!(stats.last_rx.unwrap(), 2. * HOP_TIME, epsilon = 1e-9);

    // first hop reports the end of its transmission
    let done = chain.recorder.borrow().done.clone();
    assert_eq!(done.len(), 1);
    assert_eq!((done[0].0, done[0].1), (uid, true));
    assert_relative_eq!(done[0].2, HOP_TIME - LATENCY, epsilon = 1e-9);

    assert_eq!(chain.stacks[0].borrow().counters().sent, 1);
    assert_eq!(chain.stacks[1].borrow().counters().forwarded, 1);
    assert_eq!(chain.stacks[2].borrow().counters().delivered, 1);
}

#[test]
fn test_packets_queue_on_link() {
    let mut chain = Chain::new();
    let sink = chain.add_sink(1, 9);
    for _ in 0..3 {
        let packet = chain.packet(0, address(1), 9);
        chain.send(0, packet);
    }
    chain.sim.step_until_no_events();

    let stats = sink.borrow().stats().clone();
    assert_eq!(stats.rx_packets, 3);
    assert_relative_eq!(stats.first_rx.unwrap(), HOP_TIME, epsilon = 1e-9);
    assert_relative_eq!(stats.last_rx.unwrap(), HOP_TIME + 2. * (HOP_TIME - LATENCY), epsilon = 1e-9);
}

#[test]
fn test_no_route() {
    let mut chain = Chain::new();
    let packet = chain.packet(0, Ipv4Addr::new(10, 0, 0, 99), 9);
    let uid = chain.send(0, packet);
    chain.sim.step_until_no_events();

    assert_eq!(chain.stacks[0].borrow().counters().no_route, 1);
    let done = chain.recorder.borrow().done.clone();
    assert_eq!(done.len(), 1);
    assert_eq!((done[0].0, done[0].1), (uid, false));
}

#[test]
fn test_ttl_expired() {
    let mut chain = Chain::new();
    let sink = chain.add_sink(2, 9);
    let drops = rc!(refcell!(Vec::new()));
    let drops_clone = drops.clone();
    chain.stacks[1].borrow_mut().subscribe(move |n| {
        if let PacketEventKind::Dropped(reason) = n.kind {
            drops_clone.borrow_mut().push(reason);
        }
    });

    let mut packet = chain.packet(0, address(2), 9);
    packet.ttl = 1;
    chain.send(0, packet);
    chain.sim.step_until_no_events();

    assert_eq!(sink.borrow().total_rx(), 0);
    assert_eq!(chain.stacks[1].borrow().counters().ttl_expired, 1);
    assert_eq!(*drops.borrow(), vec![DropReason::TtlExpired]);
    // the first hop itself succeeded
    assert_eq!(chain.recorder.borrow().done.len(), 1);
    assert!(chain.recorder.borrow().done[0].1);
}

#[test]
fn test_no_sink() {
    let mut chain = Chain::new();
    chain.add_sink(2, 9);
    let packet = chain.packet(0, address(2), 10);
    chain.send(0, packet);
    chain.sim.step_until_no_events();

    let counters = chain.stacks[2].borrow().counters().clone();
    assert_eq!(counters.no_sink, 1);
    assert_eq!(counters.delivered, 0);
}

#[test]
fn test_local_delivery() {
    let mut chain = Chain::new();
    let sink = chain.add_sink(0, 9);
    let packet = chain.packet(0, address(0), 9);
    let uid = chain.send(0, packet);
    chain.sim.step_until_no_events();

    assert_eq!(sink.borrow().stats().rx_packets, 1);
    assert_eq!(chain.recorder.borrow().done[0].0, uid);
    assert_eq!(chain.sim.time(), 0.);
}

#[test]
fn test_port_in_use() {
    let mut chain = Chain::new();
    chain.add_sink(1, 9);
    let result = chain.stacks[1].borrow_mut().bind(9, chain.recorder_id);
    assert!(matches!(result, Err(StackError::PortInUse(9))));
    assert!(chain.stacks[1].borrow_mut().unbind(9).is_some());
    assert!(chain.stacks[1].borrow_mut().bind(9, chain.recorder_id).is_ok());
}

#[test]
fn test_echo_over_chain() {
    let mut chain = Chain::new();
    let server = rc!(refcell!(EchoServer::new(
        chain.stacks[2].borrow().id(),
        chain.sim.create_context("server")
    )));
    let server_id = chain.sim.add_handler("server", server.clone());
    chain.stacks[2].borrow_mut().bind(7, server_id).unwrap();

    let endpoints = Endpoints {
        stack: chain.stacks[0].borrow().id(),
        src: address(0),
        src_port: 49153,
        dst: address(2),
        dst_port: 7,
    };
    let client = rc!(refcell!(EchoClient::new(
        endpoints,
        PAYLOAD,
        0.1,
        Some(3),
        chain.sim.create_context("client")
    )));
    let client_id = chain.sim.add_handler("client", client.clone());
    chain.stacks[0].borrow_mut().bind(49153, client_id).unwrap();
    chain.driver.emit_now(AppStart {}, client_id);
    chain.sim.step_until_no_events();

    assert_eq!(server.borrow().echoed(), 3);
    let client = client.borrow();
    let stats = client.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.replies, 3);
    assert_eq!(client.unanswered(), 0);
    assert_relative_eq!(stats.min_rtt.unwrap(), 4. * HOP_TIME, epsilon = 1e-9);
    assert_relative_eq!(stats.mean_rtt(), 4. * HOP_TIME, epsilon = 1e-9);
}
