//! Flow graph construction and validation.
//!
//! A [`FlowGraph`] is assembled on the configuring thread: add blocks, wire
//! output ports to input ports with [`FlowGraph::connect`], optionally attach
//! display [`Tap`]s, then hand it to the [`Scheduler`](crate::Scheduler). Once
//! converted, the topology is frozen; rewiring means building a new graph.
//!
//! # Architecture
//!
//! - [`node`]: [`BlockId`] and the typed port handles [`OutputPort`] / [`InputPort`]
//! - [`edge`]: [`EdgeId`], edge records and best-effort display [`Tap`]s
//! - [`flow`]: [`FlowGraph`], [`GraphError`] and the [`RatePlan`] produced by
//!   validation
//!
//! # Validation
//!
//! [`FlowGraph::validate`] runs three passes:
//!
//! 1. Every port is connected
//! 2. Kahn topological sort (the graph is a DAG by construction, since
//!    `connect` refuses edges that would close a cycle)
//! 3. Rate propagation from sources downstream; any block whose upstream rate
//!    differs from the rate it was configured for fails with
//!    [`GraphError::RateMismatch`]

pub mod edge;
pub mod flow;
pub mod node;

pub use edge::{EdgeId, Tap};
pub use flow::{Direction, FlowGraph, GraphError, RatePlan};
pub use node::{BlockId, InputPort, OutputPort};
