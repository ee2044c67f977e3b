//! Packet and mobility traces.
//!
//! Tracers convert simulation notifications into records and pass them to a [`TraceSink`], which
//! keeps them in memory ([`MemoryTrace`]) or writes them as CSV ([`CsvTrace`]).

use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use wnsim_core::{cast, Event, EventHandler, EventId, SimulationContext};
use wnsim_models::mobility::Mobility;
use wnsim_wifi::{MacDrop, MacDropReason, WifiDevice};

use crate::stack::{DropReason, IpStack, PacketEventKind, PacketNotification};

/// Error of writing a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// I/O error.
    #[error("trace i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV encoding error.
    #[error("trace encoding error: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination of trace records.
pub trait TraceSink<R> {
    /// Appends the record.
    fn record(&mut self, record: &R);
    /// Returns the number of appended records.
    fn len(&self) -> usize;
    /// Checks whether no records were appended.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Flushes buffered records and reports the first error that occurred while writing.
    fn finish(&mut self) -> Result<(), TraceError>;
}

/// Keeps records in memory.
pub struct MemoryTrace<R> {
    records: Vec<R>,
}

impl<R> Default for MemoryTrace<R> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<R> MemoryTrace<R> {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records.
    pub fn records(&self) -> &[R] {
        &self.records
    }
}

impl<R: Clone> TraceSink<R> for MemoryTrace<R> {
    fn record(&mut self, record: &R) {
        self.records.push(record.clone());
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Writes records as CSV rows with a header.
pub struct CsvTrace<W: Write> {
    writer: csv::Writer<W>,
    count: usize,
    error: Option<TraceError>,
}

impl CsvTrace<File> {
    /// Creates the file and writes records to it.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> CsvTrace<W> {
    /// Writes records to the writer.
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            count: 0,
            error: None,
        }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, TraceError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.writer.into_inner().map_err(|e| TraceError::Io(e.into_error()))
    }
}

impl<W: Write, R: Serialize> TraceSink<R> for CsvTrace<W> {
    fn record(&mut self, record: &R) {
        if self.error.is_some() {
            return;
        }
        match self.writer.serialize(record) {
            Ok(()) => self.count += 1,
            Err(e) => self.error = Some(e.into()),
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.writer.flush()?;
        Ok(())
    }
}

// PACKET TRACE ////////////////////////////////////////////////////////////////

/// Packet trace event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PacketTraceEvent {
    /// Sent by application.
    Tx,
    /// Forwarded by intermediate node.
    Forward,
    /// Delivered to application.
    Rx,
    /// Dropped.
    Drop,
}

/// Reason recorded for dropped packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PacketDropCause {
    /// No route to destination.
    NoRoute,
    /// Hop limit reached.
    TtlExpired,
    /// No application on the port.
    NoSink,
    /// MAC retry limit exceeded.
    RetryLimit,
    /// MAC queue full.
    QueueFull,
}

/// Line of the packet trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketRecord {
    /// Event time.
    pub time: f64,
    /// Node index.
    pub node: usize,
    /// What happened.
    pub event: PacketTraceEvent,
    /// Packet uid.
    pub uid: u64,
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// Packet size with headers.
    pub size: u32,
    /// Drop reason for dropped packets.
    pub cause: Option<PacketDropCause>,
}

impl PacketRecord {
    fn from_stack(n: &PacketNotification) -> Self {
        let (event, cause) = match n.kind {
            PacketEventKind::Sent => (PacketTraceEvent::Tx, None),
            PacketEventKind::Forwarded => (PacketTraceEvent::Forward, None),
            PacketEventKind::Received => (PacketTraceEvent::Rx, None),
            PacketEventKind::Dropped(reason) => (
                PacketTraceEvent::Drop,
                Some(match reason {
                    DropReason::NoRoute => PacketDropCause::NoRoute,
                    DropReason::TtlExpired => PacketDropCause::TtlExpired,
                    DropReason::NoSink => PacketDropCause::NoSink,
                }),
            ),
        };
        Self {
            time: n.time,
            node: n.node,
            event,
            uid: n.packet.uid,
            src: n.packet.src,
            dst: n.packet.dst,
            size: n.packet.size(),
            cause,
        }
    }

    fn from_mac_drop(node: usize, drop: &MacDrop) -> Self {
        Self {
            time: drop.time,
            node,
            event: PacketTraceEvent::Drop,
            uid: drop.packet.uid,
            src: drop.packet.src,
            dst: drop.packet.dst,
            size: drop.packet.size(),
            cause: Some(match drop.reason {
                MacDropReason::RetryLimit => PacketDropCause::RetryLimit,
                MacDropReason::QueueFull => PacketDropCause::QueueFull,
            }),
        }
    }
}

/// Shared packet trace sink.
pub type SharedPacketTrace = Rc<RefCell<dyn TraceSink<PacketRecord>>>;

/// Records packet events of stacks and packet drops of devices.
pub struct PacketTracer {
    sink: SharedPacketTrace,
}

impl PacketTracer {
    /// Creates a tracer writing to the sink.
    pub fn new(sink: SharedPacketTrace) -> Self {
        Self { sink }
    }

    /// Records packet events of the stack.
    pub fn attach_stack(&self, stack: &mut IpStack) {
        let sink = self.sink.clone();
        stack.subscribe(move |n| sink.borrow_mut().record(&PacketRecord::from_stack(n)));
    }

    /// Records packets dropped by the device.
    pub fn attach_device(&self, device: &mut WifiDevice) {
        let sink = self.sink.clone();
        let node = device.node();
        device.subscribe_drops(move |drop| sink.borrow_mut().record(&PacketRecord::from_mac_drop(node, drop)));
    }

    /// Returns the sink.
    pub fn sink(&self) -> &SharedPacketTrace {
        &self.sink
    }
}

// MOBILITY TRACE //////////////////////////////////////////////////////////////

/// Line of the mobility trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionRecord {
    /// Time.
    pub time: f64,
    /// Node index.
    pub node: usize,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Speed in m/s.
    pub speed: f64,
}

#[derive(Clone, Serialize)]
struct TraceTick {}

/// Periodically records positions of nodes.
pub struct MobilityTracer {
    nodes: Vec<(usize, Rc<RefCell<Mobility>>)>,
    sink: Rc<RefCell<dyn TraceSink<PositionRecord>>>,
    interval: f64,
    tick_event: Option<EventId>,
    ctx: SimulationContext,
}

impl MobilityTracer {
    /// Creates a tracer recording positions every `interval` seconds.
    pub fn new(sink: Rc<RefCell<dyn TraceSink<PositionRecord>>>, interval: f64, ctx: SimulationContext) -> Self {
        assert!(interval > 0., "Trace interval must be > 0");
        Self {
            nodes: Vec::new(),
            sink,
            interval,
            tick_event: None,
            ctx,
        }
    }

    /// Adds the node to the trace.
    pub fn add_node(&mut self, node: usize, mobility: Rc<RefCell<Mobility>>) {
        self.nodes.push((node, mobility));
    }

    /// Records the positions now and then every interval.
    pub fn start(&mut self) {
        self.tick_event = Some(self.ctx.emit_self_now(TraceTick {}));
    }

    /// Cancels further recording.
    pub fn stop(&mut self) {
        if let Some(id) = self.tick_event.take() {
            self.ctx.cancel_event(id);
        }
    }

    fn record_positions(&mut self) {
        let now = self.ctx.time();
        let mut sink = self.sink.borrow_mut();
        for (node, mobility) in self.nodes.iter() {
            let mut mobility = mobility.borrow_mut();
            let position = mobility.position_at(now);
            sink.record(&PositionRecord {
                time: now,
                node: *node,
                x: position.x,
                y: position.y,
                z: position.z,
                speed: mobility.velocity().length(),
            });
        }
    }
}

impl EventHandler for MobilityTracer {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TraceTick {} => {
                self.record_positions();
                self.tick_event = Some(self.ctx.emit_self(TraceTick {}, self.interval));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uid: u64, cause: Option<PacketDropCause>) -> PacketRecord {
        PacketRecord {
            time: 1.5,
            node: 2,
            event: if cause.is_some() {
                PacketTraceEvent::Drop
            } else {
                PacketTraceEvent::Tx
            },
            uid,
            src: Ipv4Addr::new(192, 168, 0, 2),
            dst: Ipv4Addr::new(192, 168, 0, 1),
            size: 1500,
            cause,
        }
    }

    #[test]
    fn test_memory_trace() {
        let mut trace: MemoryTrace<PacketRecord> = MemoryTrace::new();
        assert!(TraceSink::<PacketRecord>::is_empty(&trace));
        trace.record(&record(1, None));
        trace.record(&record(2, Some(PacketDropCause::QueueFull)));
        assert_eq!(TraceSink::<PacketRecord>::len(&trace), 2);
        assert_eq!(trace.records()[1].uid, 2);
        assert!(TraceSink::<PacketRecord>::finish(&mut trace).is_ok());
    }

    #[test]
    fn test_csv_trace() {
        let mut trace = CsvTrace::from_writer(Vec::new());
        trace.record(&record(1, None));
        trace.record(&record(2, Some(PacketDropCause::RetryLimit)));
        assert_eq!(TraceSink::<PacketRecord>::len(&trace), 2);
        let data = String::from_utf8(trace.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = data.lines().collect();
        assert_eq!(lines[0], "time,node,event,uid,src,dst,size,cause");
        assert_eq!(lines[1], "1.5,2,Tx,1,192.168.0.2,192.168.0.1,1500,");
        assert_eq!(lines[2], "1.5,2,Drop,2,192.168.0.2,192.168.0.1,1500,RetryLimit");
    }

    #[test]
    fn test_position_csv() {
        let mut trace = CsvTrace::from_writer(Vec::new());
        trace.record(&PositionRecord {
            time: 0.5,
            node: 0,
            x: 1.,
            y: 2.5,
            z: 0.,
            speed: 1.,
        });
        let data = String::from_utf8(trace.into_inner().unwrap()).unwrap();
        assert_eq!(data, "time,node,x,y,z,speed\n0.5,0,1.0,2.5,0.0,1.0\n");
    }
}
