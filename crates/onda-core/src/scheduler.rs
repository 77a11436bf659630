//! Availability-gated tick scheduler.
//!
//! Each [`Scheduler::tick`] visits every block once, in topological order, and
//! runs it on the largest chunk that is satisfiable right now:
//!
//! ```text
//! periods = min(available input / M,          (every input edge)
//!               free output     / L,          (every output edge)
//!               quantum / max(L, M),
//!               ready           / M)          (hardware-gated sinks)
//! n_in  = periods * M
//! n_out = periods * L
//! ```
//!
//! Sources are sized by free output space, the quantum and their own
//! [`ready`](crate::Block::ready) bound. A block with nothing satisfiable is
//! skipped for this tick; that is not an error.
//!
//! Because chunk sizes are always whole rate periods, blocks at 48 kHz and
//! 480 kHz share one graph without block authors tracking anything. Real-time
//! sinks that must never stall (a transmitting radio, a speaker) live behind a
//! [`SharedRing`](crate::SharedRing): the scheduler only fills the ring, and the
//! device thread zero-fills when it runs dry.

use std::fmt;

use num_complex::Complex32;

use crate::block::{Block, BlockError, RateRatio, SampleKind, Samples};
use crate::buffer::SampleBuffer;
use crate::graph::{FlowGraph, GraphError, RatePlan, Tap};

/// Default samples per block invocation.
pub const DEFAULT_QUANTUM: usize = 4096;
/// Default minimum edge capacity.
pub const DEFAULT_MIN_BUFFER: usize = 16384;

/// Scheduler sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on samples a block reads or writes per tick.
    pub quantum: usize,
    /// Minimum capacity of every edge ring.
    pub min_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            min_buffer: DEFAULT_MIN_BUFFER,
        }
    }
}

/// Work done by one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Blocks that ran.
    pub blocks_run: usize,
    /// Samples read from edges.
    pub consumed: usize,
    /// Samples written to edges (sources included).
    pub produced: usize,
}

impl TickReport {
    /// Returns true if any block made forward progress.
    pub fn progressed(&self) -> bool {
        self.blocks_run > 0
    }
}

enum EdgeRing {
    Real(SampleBuffer<f32>),
    Complex(SampleBuffer<Complex32>),
}

impl EdgeRing {
    fn new(kind: SampleKind, capacity: usize) -> Self {
        match kind {
            SampleKind::Real => Self::Real(SampleBuffer::with_capacity(capacity)),
            SampleKind::Complex => Self::Complex(SampleBuffer::with_capacity(capacity)),
        }
    }

    fn available(&self) -> usize {
        match self {
            Self::Real(r) => r.available(),
            Self::Complex(r) => r.available(),
        }
    }

    fn free(&self) -> usize {
        match self {
            Self::Real(r) => r.free(),
            Self::Complex(r) => r.free(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Self::Real(r) => r.capacity(),
            Self::Complex(r) => r.capacity(),
        }
    }

    /// Copies `count` samples into `dst` without consuming them.
    fn peek_into(&self, dst: &mut Samples, count: usize) -> Result<(), BlockError> {
        dst.reset(count);
        match (self, dst) {
            (Self::Real(r), Samples::Real(v)) => {
                r.read_into(v);
            }
            (Self::Complex(r), Samples::Complex(v)) => {
                r.read_into(v);
            }
            (ring, dst) => {
                return Err(BlockError::KindMismatch {
                    expected: ring.kind(),
                    found: dst.kind(),
                });
            }
        }
        Ok(())
    }

    fn consume(&mut self, count: usize) {
        match self {
            Self::Real(r) => r.consume(count),
            Self::Complex(r) => r.consume(count),
        }
    }

    fn write(&mut self, src: &Samples) -> Result<usize, BlockError> {
        match (self, src) {
            (Self::Real(r), Samples::Real(v)) => Ok(r.write(v)),
            (Self::Complex(r), Samples::Complex(v)) => Ok(r.write(v)),
            (ring, src) => Err(BlockError::KindMismatch {
                expected: ring.kind(),
                found: src.kind(),
            }),
        }
    }

    fn kind(&self) -> SampleKind {
        match self {
            Self::Real(_) => SampleKind::Real,
            Self::Complex(_) => SampleKind::Complex,
        }
    }
}

struct Slot {
    block: Box<dyn Block>,
    label: String,
    ratio: RateRatio,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    in_bufs: Vec<Samples>,
    out_bufs: Vec<Samples>,
    taps: Vec<(usize, Tap)>,
}

impl Slot {
    fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Occupancy of one edge ring, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeStatus {
    /// Producing block label.
    pub from: String,
    /// Consuming block label.
    pub to: String,
    /// Samples waiting.
    pub available: usize,
    /// Ring capacity.
    pub capacity: usize,
}

/// Executes a validated [`FlowGraph`].
///
/// Owns every block and edge ring. Not shared across threads: the lifecycle
/// controller moves it onto its own execution context.
pub struct Scheduler {
    slots: Vec<Slot>,
    edges: Vec<EdgeRing>,
    edge_labels: Vec<(String, String)>,
    plan: RatePlan,
    quantum: usize,
    ticks: u64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("blocks", &self.slots.len())
            .field("edges", &self.edges.len())
            .field("quantum", &self.quantum)
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl Scheduler {
    pub(crate) fn new(
        graph: FlowGraph,
        plan: RatePlan,
        config: SchedulerConfig,
    ) -> Result<Self, GraphError> {
        if config.quantum == 0 {
            return Err(GraphError::InvalidParameter(
                "scheduler quantum must be non-zero".into(),
            ));
        }
        let quantum = config.quantum;

        let labels: Vec<String> = (0..graph.nodes.len())
            .map(|i| graph.label(crate::graph::BlockId(i as u32)))
            .collect();

        // Each edge must hold two full chunks from the producer and two full
        // rate periods for the consumer, so both sides can always make progress.
        let edges: Vec<EdgeRing> = graph
            .edges
            .iter()
            .map(|e| {
                let producer = graph.nodes[e.from.block.index()].block.rate_ratio();
                let consumer = graph.nodes[e.to.block.index()].block.rate_ratio();
                let capacity = config
                    .min_buffer
                    .max(2 * quantum)
                    .max(2 * producer.interpolation() as usize)
                    .max(2 * consumer.decimation() as usize);
                EdgeRing::new(e.kind, capacity)
            })
            .collect();
        let edge_labels: Vec<(String, String)> = graph
            .edges
            .iter()
            .map(|e| {
                (
                    labels[e.from.block.index()].clone(),
                    labels[e.to.block.index()].clone(),
                )
            })
            .collect();

        let mut nodes: Vec<Option<_>> = graph.nodes.into_iter().map(Some).collect();
        let mut slots = Vec::with_capacity(nodes.len());
        for &id in plan.order() {
            let Some(node) = nodes[id.index()].take() else {
                return Err(GraphError::BlockNotFound(id));
            };
            let inputs: Vec<usize> = node.incoming.iter().flatten().map(|e| e.index()).collect();
            let outputs: Vec<usize> = node.outgoing.iter().flatten().map(|e| e.index()).collect();
            let in_bufs = node
                .block
                .input_ports()
                .iter()
                .map(|&k| Samples::with_capacity(k, quantum))
                .collect();
            let out_bufs = node
                .block
                .output_ports()
                .iter()
                .map(|&k| Samples::with_capacity(k, quantum))
                .collect();
            let taps = graph
                .taps
                .iter()
                .filter(|(port, _)| port.block == id)
                .map(|(port, tap)| (port.port, tap.clone()))
                .collect();
            slots.push(Slot {
                ratio: node.block.rate_ratio(),
                label: labels[id.index()].clone(),
                block: node.block,
                inputs,
                outputs,
                in_bufs,
                out_bufs,
                taps,
            });
        }

        #[cfg(feature = "tracing")]
        for (ring, (from, to)) in edges.iter().zip(&edge_labels) {
            tracing::debug!(capacity = ring.capacity(), "edge {from} → {to}");
        }

        Ok(Self {
            slots,
            edges,
            edge_labels,
            plan,
            quantum,
            ticks: 0,
        })
    }

    /// Runs every block once on whatever is satisfiable.
    ///
    /// Returns the work done; an idle report means every block was starved
    /// or blocked by backpressure.
    pub fn tick(&mut self) -> Result<TickReport, GraphError> {
        let mut report = TickReport::default();
        let edges = &mut self.edges;

        for slot in &mut self.slots {
            if slot.is_source() && slot.block.is_finished() {
                continue;
            }
            let l = slot.ratio.interpolation() as usize;
            let m = slot.ratio.decimation() as usize;
            let ready = slot.block.ready().unwrap_or(usize::MAX);
            let free = slot.outputs.iter().map(|&e| edges[e].free()).min();

            let (n_in, n_out) = if slot.is_source() {
                let n = free.unwrap_or(0).min(self.quantum).min(ready);
                (0, n)
            } else {
                let avail = slot
                    .inputs
                    .iter()
                    .map(|&e| edges[e].available())
                    .min()
                    .unwrap_or(0);
                let mut periods = (avail / m)
                    .min((self.quantum / l.max(m)).max(1))
                    .min(ready / m);
                if let Some(free) = free {
                    periods = periods.min(free / l);
                }
                (periods * m, if slot.outputs.is_empty() { 0 } else { periods * l })
            };
            if n_in == 0 && n_out == 0 {
                continue;
            }

            let fail = |source: BlockError| GraphError::Block {
                block: slot.label.clone(),
                source,
            };
            for (buf, &e) in slot.in_bufs.iter_mut().zip(&slot.inputs) {
                edges[e].peek_into(buf, n_in).map_err(fail)?;
            }
            for buf in &mut slot.out_bufs {
                buf.reset(n_out);
            }
            slot.block
                .process(&slot.in_bufs, &mut slot.out_bufs)
                .map_err(fail)?;

            for &e in &slot.inputs {
                edges[e].consume(n_in);
            }
            for (buf, &e) in slot.out_bufs.iter().zip(&slot.outputs) {
                let written = edges[e].write(buf).map_err(fail)?;
                if written != buf.len() {
                    return Err(fail(BlockError::RateViolation {
                        expected: n_out,
                        produced: written,
                    }));
                }
            }
            for (port, tap) in &slot.taps {
                if let Some(buf) = slot.out_bufs.get(*port) {
                    tap.offer(buf);
                }
            }

            report.blocks_run += 1;
            report.consumed += n_in * slot.inputs.len();
            report.produced += n_out * slot.outputs.len();
        }

        self.ticks += 1;
        Ok(report)
    }

    /// Ticks until a tick makes no progress or `max_ticks` is reached.
    ///
    /// Meant for offline graphs built from finite sources. Returns the number
    /// of ticks executed.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> Result<u64, GraphError> {
        let mut ran = 0;
        while ran < max_ticks {
            ran += 1;
            if !self.tick()?.progressed() {
                break;
            }
        }
        Ok(ran)
    }

    /// Returns true when the graph has sources and all of them are exhausted.
    pub fn sources_finished(&self) -> bool {
        let mut sources = self.slots.iter().filter(|s| s.is_source()).peekable();
        sources.peek().is_some() && sources.all(|s| s.block.is_finished())
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Samples per block invocation.
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Rates and execution order computed at validation.
    pub fn plan(&self) -> &RatePlan {
        &self.plan
    }

    /// Current fill level of every edge.
    pub fn edge_status(&self) -> Vec<EdgeStatus> {
        self.edges
            .iter()
            .zip(&self.edge_labels)
            .map(|(ring, (from, to))| EdgeStatus {
                from: from.clone(),
                to: to.clone(),
                available: ring.available(),
                capacity: ring.capacity(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{MultiplyConst, RationalResampler, Tee, ToneSource, VectorSink, VectorSource};

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn passes_samples_through_in_order() {
        let mut g = FlowGraph::new();
        let src = g.add_block(VectorSource::new(ramp(10_000), 48_000.0));
        let gain = g.add_block(MultiplyConst::<f32>::new(2.0));
        let (sink, captured) = VectorSink::<f32>::new();
        let sink = g.add_block(sink);
        g.connect(src.output(0), gain.input(0)).unwrap();
        g.connect(gain.output(0), sink.input(0)).unwrap();

        let mut s = g.into_scheduler(SchedulerConfig::default()).unwrap();
        s.run_until_idle(100).unwrap();
        assert!(s.sources_finished());
        let out = captured.snapshot();
        assert_eq!(out.len(), 10_000);
        assert!(out.iter().enumerate().all(|(i, &y)| y == 2.0 * i as f32));
    }

    #[test]
    fn decimator_waits_for_full_period() {
        let mut g = FlowGraph::new();
        let src = g.add_block(VectorSource::new(vec![1.0; 25], 1_000.0));
        let dec = g.add_block(RationalResampler::<f32>::new(1, 10).unwrap());
        let (sink, captured) = VectorSink::<f32>::new();
        let sink = g.add_block(sink);
        g.connect(src.output(0), dec.input(0)).unwrap();
        g.connect(dec.output(0), sink.input(0)).unwrap();

        let mut s = g.into_scheduler(SchedulerConfig::default()).unwrap();
        s.run_until_idle(10).unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(s.edge_status()[0].available, 5);
    }

    #[test]
    fn backpressure_bounds_edge_fill() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let gain = g.add_block(MultiplyConst::<f32>::new(1.0));
        let (sink, _) = VectorSink::<f32>::new();
        let sink = g.add_block(sink);
        g.connect(tone.output(0), gain.input(0)).unwrap();
        g.connect(gain.output(0), sink.input(0)).unwrap();

        let config = SchedulerConfig {
            quantum: 64,
            min_buffer: 128,
        };
        let mut s = g.into_scheduler(config).unwrap();
        for _ in 0..20 {
            let report = s.tick().unwrap();
            assert!(report.produced <= 2 * 64);
        }
        for status in s.edge_status() {
            assert!(status.available <= status.capacity);
        }
    }

    #[test]
    fn interpolator_output_matches_ratio() {
        let mut g = FlowGraph::new();
        let src = g.add_block(VectorSource::new(vec![0.0; 4_800], 48_000.0));
        let up = g.add_block(RationalResampler::<f32>::new(10, 1).unwrap());
        let (sink, captured) = VectorSink::<f32>::new();
        let sink = g.add_block(sink);
        g.connect(src.output(0), up.input(0)).unwrap();
        g.connect(up.output(0), sink.input(0)).unwrap();

        let mut s = g.into_scheduler(SchedulerConfig::default()).unwrap();
        s.run_until_idle(1_000).unwrap();
        assert_eq!(captured.len(), 48_000);
    }

    #[test]
    fn tee_feeds_both_branches_and_tap() {
        let mut g = FlowGraph::new();
        let src = g.add_block(VectorSource::new(ramp(100), 1_000.0));
        let tee = g.add_block(Tee::<f32>::new(2));
        let (a, got_a) = VectorSink::<f32>::new();
        let (b, got_b) = VectorSink::<f32>::new();
        let a = g.add_block(a);
        let b = g.add_block(b);
        g.connect(src.output(0), tee.input(0)).unwrap();
        g.connect(tee.output(0), a.input(0)).unwrap();
        g.connect(tee.output(1), b.input(0)).unwrap();
        let tap = g.tap(src.output(0), 16).unwrap();

        let mut s = g.into_scheduler(SchedulerConfig::default()).unwrap();
        s.run_until_idle(10).unwrap();
        assert_eq!(got_a.snapshot(), ramp(100));
        assert_eq!(got_b.snapshot(), ramp(100));
        let mut latest = [0.0f32; 4];
        assert_eq!(tap.latest_real(&mut latest), 4);
        assert_eq!(latest, [96.0, 97.0, 98.0, 99.0]);
    }

    #[test]
    fn zero_quantum_is_rejected() {
        let mut g = FlowGraph::new();
        let src = g.add_block(VectorSource::new(vec![0.0f32; 4], 1_000.0));
        let (sink, _) = VectorSink::<f32>::new();
        let sink = g.add_block(sink);
        g.connect(src.output(0), sink.input(0)).unwrap();
        let config = SchedulerConfig {
            quantum: 0,
            min_buffer: 16,
        };
        assert!(g.into_scheduler(config).is_err());
    }
}
