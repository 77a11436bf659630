//! Flow graph builder, configuration errors and rate propagation.

use std::collections::VecDeque;
use std::fmt;

use crate::block::{Block, BlockError, SampleKind};
use crate::scheduler::{Scheduler, SchedulerConfig};

use super::edge::{Edge, EdgeId, Tap};
use super::node::{BlockId, InputPort, OutputPort};

/// Which side of a block a port is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// An input port.
    Input,
    /// An output port.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Errors raised while building, validating or running a graph.
///
/// Every variant except [`Block`](Self::Block) is a configuration error:
/// it is reported before streaming starts and leaves the graph untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The handle does not belong to this graph.
    BlockNotFound(BlockId),
    /// The port index exceeds the block's port count.
    PortOutOfRange {
        /// Block label.
        block: String,
        /// Requested port.
        port: usize,
        /// Port side.
        direction: Direction,
    },
    /// The port already has an edge.
    AlreadyConnected {
        /// Block label.
        block: String,
        /// Port index.
        port: usize,
        /// Port side.
        direction: Direction,
    },
    /// Producer and consumer carry different sample kinds.
    TypeMismatch {
        /// Producer label.
        from: String,
        /// Consumer label.
        to: String,
        /// Kind the producer emits.
        produced: SampleKind,
        /// Kind the consumer accepts.
        expected: SampleKind,
    },
    /// The edge would close a cycle.
    CycleDetected,
    /// A port was left without an edge.
    UnconnectedPort {
        /// Block label.
        block: String,
        /// Port index.
        port: usize,
        /// Port side.
        direction: Direction,
    },
    /// A block receives a different rate than it was configured for.
    RateMismatch {
        /// Upstream block label.
        from: String,
        /// Downstream block label.
        to: String,
        /// Rate arriving on the edge, in Hz.
        produced: f64,
        /// Rate the downstream block expects, in Hz.
        expected: f64,
    },
    /// A source block does not declare its output rate.
    UnknownRate(String),
    /// A block was constructed with unusable parameters.
    InvalidParameter(String),
    /// The graph has no blocks.
    EmptyGraph,
    /// A block failed while processing.
    Block {
        /// Block label.
        block: String,
        /// Underlying failure.
        source: BlockError,
    },
}

impl GraphError {
    /// Returns true for errors raised at configuration time.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Block { .. })
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockNotFound(id) => write!(f, "block {id} not found"),
            Self::PortOutOfRange {
                block,
                port,
                direction,
            } => write!(f, "{block} has no {direction} port {port}"),
            Self::AlreadyConnected {
                block,
                port,
                direction,
            } => write!(f, "{direction} port {port} of {block} is already connected"),
            Self::TypeMismatch {
                from,
                to,
                produced,
                expected,
            } => write!(
                f,
                "{from} produces {produced} samples but {to} expects {expected}"
            ),
            Self::CycleDetected => write!(f, "adding this edge would create a cycle"),
            Self::UnconnectedPort {
                block,
                port,
                direction,
            } => write!(f, "{direction} port {port} of {block} is not connected"),
            Self::RateMismatch {
                from,
                to,
                produced,
                expected,
            } => write!(
                f,
                "rate mismatch: {from} delivers {produced} Hz but {to} expects {expected} Hz"
            ),
            Self::UnknownRate(block) => write!(f, "source {block} does not declare a sample rate"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::EmptyGraph => write!(f, "graph has no blocks"),
            Self::Block { block, source } => write!(f, "{block} failed: {source}"),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Block { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(crate) struct BlockNode {
    pub(crate) block: Box<dyn Block>,
    pub(crate) incoming: Vec<Option<EdgeId>>,
    pub(crate) outgoing: Vec<Option<EdgeId>>,
}

/// Result of a successful [`FlowGraph::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct RatePlan {
    order: Vec<BlockId>,
    input_rates: Vec<Option<f64>>,
    output_rates: Vec<Option<f64>>,
}

impl RatePlan {
    /// Blocks in a valid execution order (every producer before its consumers).
    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    /// Rate arriving at a block's inputs (`None` for sources).
    pub fn input_rate(&self, id: BlockId) -> Option<f64> {
        self.input_rates.get(id.index()).copied().flatten()
    }

    /// Rate leaving a block's outputs (`None` for sinks).
    pub fn output_rate(&self, id: BlockId) -> Option<f64> {
        self.output_rates.get(id.index()).copied().flatten()
    }
}

fn rates_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

/// Directed acyclic graph of processing blocks.
///
/// # Usage
///
/// 1. Create a graph with [`new()`](Self::new)
/// 2. Add blocks with [`add_block()`](Self::add_block)
/// 3. Wire ports with [`connect()`](Self::connect)
/// 4. Optionally attach display taps with [`tap()`](Self::tap)
/// 5. Check it with [`validate()`](Self::validate), or go straight to
///    [`into_scheduler()`](Self::into_scheduler), which validates first
#[derive(Default)]
pub struct FlowGraph {
    pub(crate) nodes: Vec<BlockNode>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) taps: Vec<(OutputPort, Tap)>,
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGraph")
            .field("blocks", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("taps", &self.taps.len())
            .finish()
    }
}

impl FlowGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block and returns its handle.
    pub fn add_block(&mut self, block: impl Block + 'static) -> BlockId {
        self.add_boxed(Box::new(block))
    }

    /// Adds an already boxed block.
    pub fn add_boxed(&mut self, block: Box<dyn Block>) -> BlockId {
        let id = BlockId(self.nodes.len() as u32);
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add_block: {} → {id}", block.name());
        self.nodes.push(BlockNode {
            incoming: vec![None; block.input_ports().len()],
            outgoing: vec![None; block.output_ports().len()],
            block,
        });
        id
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Borrows a block.
    pub fn block(&self, id: BlockId) -> Option<&dyn Block> {
        self.nodes.get(id.index()).map(|n| n.block.as_ref())
    }

    /// Iterates over all edges.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeId(i as u32), e))
    }

    /// Label used in errors and logs: block name plus its index.
    pub fn label(&self, id: BlockId) -> String {
        match self.nodes.get(id.index()) {
            Some(node) => format!("{}#{}", node.block.name(), id.0),
            None => format!("<missing>#{}", id.0),
        }
    }

    fn node(&self, id: BlockId) -> Result<&BlockNode, GraphError> {
        self.nodes
            .get(id.index())
            .ok_or(GraphError::BlockNotFound(id))
    }

    fn output_kind(&self, port: OutputPort) -> Result<SampleKind, GraphError> {
        let node = self.node(port.block)?;
        node.block
            .output_ports()
            .get(port.port)
            .copied()
            .ok_or_else(|| GraphError::PortOutOfRange {
                block: self.label(port.block),
                port: port.port,
                direction: Direction::Output,
            })
    }

    fn input_kind(&self, port: InputPort) -> Result<SampleKind, GraphError> {
        let node = self.node(port.block)?;
        node.block
            .input_ports()
            .get(port.port)
            .copied()
            .ok_or_else(|| GraphError::PortOutOfRange {
                block: self.label(port.block),
                port: port.port,
                direction: Direction::Input,
            })
    }

    /// Connects an output port to an input port.
    ///
    /// Fails if either port does not exist, if either port already has an edge,
    /// if the sample kinds differ, or if the edge would create a cycle.
    pub fn connect(&mut self, from: OutputPort, to: InputPort) -> Result<EdgeId, GraphError> {
        let produced = self.output_kind(from)?;
        let expected = self.input_kind(to)?;

        if self.nodes[from.block.index()].outgoing[from.port].is_some() {
            return Err(GraphError::AlreadyConnected {
                block: self.label(from.block),
                port: from.port,
                direction: Direction::Output,
            });
        }
        if self.nodes[to.block.index()].incoming[to.port].is_some() {
            return Err(GraphError::AlreadyConnected {
                block: self.label(to.block),
                port: to.port,
                direction: Direction::Input,
            });
        }
        if produced != expected {
            return Err(GraphError::TypeMismatch {
                from: self.label(from.block),
                to: self.label(to.block),
                produced,
                expected,
            });
        }
        // A cycle exists if `to` can already reach `from` via existing edges.
        if from.block == to.block || self.can_reach(to.block, from.block) {
            return Err(GraphError::CycleDetected);
        }

        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            from,
            to,
            kind: produced,
        });
        self.nodes[from.block.index()].outgoing[from.port] = Some(id);
        self.nodes[to.block.index()].incoming[to.port] = Some(id);

        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {from} → {to} ({produced})");
        Ok(id)
    }

    /// Attaches a best-effort tap holding the latest `capacity` samples of an
    /// output port. Tapping does not count as a connection.
    pub fn tap(&mut self, port: OutputPort, capacity: usize) -> Result<Tap, GraphError> {
        let kind = self.output_kind(port)?;
        let tap = Tap::new(kind, capacity);
        self.taps.push((port, tap.clone()));
        Ok(tap)
    }

    /// Depth-first search along existing edges.
    fn can_reach(&self, from: BlockId, to: BlockId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            let idx = current.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            for edge_id in self.nodes[idx].outgoing.iter().flatten() {
                stack.push(self.edges[edge_id.index()].to.block);
            }
        }
        false
    }

    /// Kahn's algorithm over block-level adjacency.
    pub fn topological_order(&self) -> Result<Vec<BlockId>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| n.incoming.iter().flatten().count())
            .collect();
        let mut queue: VecDeque<BlockId> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| BlockId(i as u32))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge_id in self.nodes[id.index()].outgoing.iter().flatten() {
                let next = self.edges[edge_id.index()].to.block;
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(GraphError::CycleDetected)
        }
    }

    fn check_connected(&self) -> Result<(), GraphError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let id = BlockId(idx as u32);
            let sides = [
                (&node.incoming, Direction::Input),
                (&node.outgoing, Direction::Output),
            ];
            for (ports, direction) in sides {
                if let Some(port) = ports.iter().position(Option::is_none) {
                    return Err(GraphError::UnconnectedPort {
                        block: self.label(id),
                        port,
                        direction,
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks connectivity, acyclicity and rate consistency.
    ///
    /// Rates are propagated from each source's declared rate through every
    /// block's [`declare_rate`](Block::declare_rate). A block with several
    /// inputs must see the same rate on all of them, and a block that declares
    /// an [`expected_input_rate`](Block::expected_input_rate) must receive
    /// exactly that rate.
    pub fn validate(&self) -> Result<RatePlan, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }
        self.check_connected()?;
        let order = self.topological_order()?;

        let mut input_rates = vec![None; self.nodes.len()];
        let mut output_rates: Vec<Option<f64>> = vec![None; self.nodes.len()];

        for &id in &order {
            let node = &self.nodes[id.index()];
            let block = node.block.as_ref();

            if node.incoming.is_empty() {
                let rate = block
                    .source_rate()
                    .ok_or_else(|| GraphError::UnknownRate(self.label(id)))?;
                output_rates[id.index()] = Some(rate);
                continue;
            }

            let mut arriving: Option<(f64, BlockId)> = None;
            for edge_id in node.incoming.iter().flatten() {
                let upstream = self.edges[edge_id.index()].from.block;
                let Some(rate) = output_rates[upstream.index()] else {
                    return Err(GraphError::UnknownRate(self.label(upstream)));
                };
                match arriving {
                    None => arriving = Some((rate, upstream)),
                    Some((first, _)) if !rates_match(first, rate) => {
                        return Err(GraphError::RateMismatch {
                            from: self.label(upstream),
                            to: self.label(id),
                            produced: rate,
                            expected: first,
                        });
                    }
                    Some(_) => {}
                }
            }

            let Some((rate, upstream)) = arriving else {
                continue;
            };
            if let Some(expected) = block.expected_input_rate()
                && !rates_match(rate, expected)
            {
                return Err(GraphError::RateMismatch {
                    from: self.label(upstream),
                    to: self.label(id),
                    produced: rate,
                    expected,
                });
            }
            input_rates[id.index()] = Some(rate);
            if !node.outgoing.is_empty() {
                output_rates[id.index()] = Some(block.declare_rate(rate));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            blocks = self.nodes.len(),
            edges = self.edges.len(),
            "graph validated"
        );

        Ok(RatePlan {
            order,
            input_rates,
            output_rates,
        })
    }

    /// Validates the graph and freezes it into a [`Scheduler`].
    pub fn into_scheduler(self, config: SchedulerConfig) -> Result<Scheduler, GraphError> {
        let plan = self.validate()?;
        Scheduler::new(self, plan, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{FloatToComplex, MultiplyConst, RationalResampler, ToneSource, VectorSink, WfmTx};
    use num_complex::Complex32;

    #[test]
    fn connect_rejects_type_mismatch() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let (sink, _) = VectorSink::<Complex32>::new();
        let sink = g.add_block(sink);
        let err = g.connect(tone.output(0), sink.input(0)).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn explicit_conversion_bridges_kinds() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let conv = g.add_block(FloatToComplex::new());
        let (sink, _) = VectorSink::<Complex32>::new();
        let sink = g.add_block(sink);
        g.connect(tone.output(0), conv.input(0)).unwrap();
        g.connect(conv.output(0), sink.input(0)).unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn connect_rejects_second_edge_on_port() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let a = g.add_block(MultiplyConst::<f32>::new(1.0));
        let b = g.add_block(MultiplyConst::<f32>::new(1.0));
        g.connect(tone.output(0), a.input(0)).unwrap();
        let err = g.connect(tone.output(0), b.input(0)).unwrap_err();
        assert!(matches!(
            err,
            GraphError::AlreadyConnected {
                direction: Direction::Output,
                ..
            }
        ));
    }

    #[test]
    fn connect_rejects_cycle() {
        let mut g = FlowGraph::new();
        let a = g.add_block(MultiplyConst::<f32>::new(1.0));
        let b = g.add_block(MultiplyConst::<f32>::new(1.0));
        g.connect(a.output(0), b.input(0)).unwrap();
        assert_eq!(
            g.connect(b.output(0), a.input(0)).unwrap_err(),
            GraphError::CycleDetected
        );
    }

    #[test]
    fn connect_rejects_self_loop() {
        let mut g = FlowGraph::new();
        let a = g.add_block(MultiplyConst::<f32>::new(1.0));
        assert_eq!(
            g.connect(a.output(0), a.input(0)).unwrap_err(),
            GraphError::CycleDetected
        );
    }

    #[test]
    fn connect_rejects_missing_port() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let a = g.add_block(MultiplyConst::<f32>::new(1.0));
        assert!(matches!(
            g.connect(tone.output(1), a.input(0)).unwrap_err(),
            GraphError::PortOutOfRange { .. }
        ));
        assert!(matches!(
            g.connect(tone.output(0), BlockId(9).input(0)).unwrap_err(),
            GraphError::BlockNotFound(_)
        ));
    }

    #[test]
    fn validate_reports_unconnected_port() {
        let mut g = FlowGraph::new();
        g.add_block(MultiplyConst::<f32>::new(1.0));
        assert!(matches!(
            g.validate().unwrap_err(),
            GraphError::UnconnectedPort { .. }
        ));
    }

    #[test]
    fn validate_propagates_tx_rates() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let interp = g.add_block(
            RationalResampler::<f32>::new(10, 1)
                .unwrap()
                .with_input_rate(48_000.0),
        );
        let tx = g.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3).unwrap());
        let (sink, _) = VectorSink::<Complex32>::new();
        let sink = g.add_block(sink.with_rate(480_000.0));
        g.connect(tone.output(0), interp.input(0)).unwrap();
        g.connect(interp.output(0), tx.input(0)).unwrap();
        g.connect(tx.output(0), sink.input(0)).unwrap();

        let plan = g.validate().unwrap();
        assert_eq!(plan.order(), &[tone, interp, tx, sink]);
        assert_eq!(plan.output_rate(interp), Some(480_000.0));
        assert_eq!(plan.input_rate(sink), Some(480_000.0));
    }

    #[test]
    fn validate_rejects_rate_mismatch() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
        let tx = g.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3).unwrap());
        let (sink, _) = VectorSink::<Complex32>::new();
        let sink = g.add_block(sink);
        g.connect(tone.output(0), tx.input(0)).unwrap();
        g.connect(tx.output(0), sink.input(0)).unwrap();

        let err = g.validate().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(
            err,
            GraphError::RateMismatch {
                from: "tone_source#0".into(),
                to: "wfm_tx#1".into(),
                produced: 48_000.0,
                expected: 480_000.0,
            }
        );
    }

    #[test]
    fn empty_graph_is_invalid() {
        assert_eq!(FlowGraph::new().validate(), Err(GraphError::EmptyGraph));
    }

    #[test]
    fn tap_requires_existing_output() {
        let mut g = FlowGraph::new();
        let tone = g.add_block(ToneSource::complex(1e6, 100e3, 0.5));
        let tap = g.tap(tone.output(0), 1024).unwrap();
        assert_eq!(tap.kind(), SampleKind::Complex);
        assert!(g.tap(tone.output(3), 1024).is_err());
    }
}
