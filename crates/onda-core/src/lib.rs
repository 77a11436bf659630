//! Onda Core - multi-rate dataflow engine for software-defined radio
//!
//! This crate holds everything a flowgraph needs that is independent of real
//! hardware: sample rings, the block interface, the concrete DSP blocks used by
//! the FM transmit/receive chains, the graph builder with its validation passes,
//! and the availability-gated scheduler that drives it.
//!
//! # Core Abstractions
//!
//! ## Buffers
//!
//! - [`SampleBuffer`] - Fixed-capacity SPSC ring with peek/consume reads
//! - [`SharedRing`] - Thread-shared ring with underrun/overrun accounting, used
//!   at device boundaries and for display taps
//!
//! ## Blocks
//!
//! - [`Block`] - Object-safe trait implemented by every processing node
//! - [`RateRatio`] - Rational interpolation/decimation factor
//! - [`blocks`] - Tone source, rational resampler, wideband FM modulator and
//!   demodulator, converters, fan-out and vector endpoints
//!
//! ## Graph and Scheduling
//!
//! - [`FlowGraph`] - Typed graph builder: `connect()`, `validate()`, `tap()`
//! - [`Scheduler`] - Tick loop executor built from a validated graph
//!
//! # Example
//!
//! ```rust,ignore
//! use onda_core::{FlowGraph, SchedulerConfig};
//! use onda_core::blocks::{RationalResampler, ToneSource, VectorSink, WfmTx};
//!
//! let mut graph = FlowGraph::new();
//! let tone = graph.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
//! let interp = graph.add_block(RationalResampler::<f32>::new(10, 1)?);
//! let modulator = graph.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3)?);
//! let (sink, captured) = VectorSink::<Complex32>::new();
//! let sink = graph.add_block(sink);
//!
//! graph.connect(tone.output(0), interp.input(0))?;
//! graph.connect(interp.output(0), modulator.input(0))?;
//! graph.connect(modulator.output(0), sink.input(0))?;
//!
//! let mut scheduler = graph.into_scheduler(SchedulerConfig::default())?;
//! scheduler.tick()?;
//! ```

pub mod block;
pub mod blocks;
pub mod buffer;
pub mod firdes;
pub mod graph;
pub mod scheduler;

pub use block::{Block, BlockError, RateRatio, Sample, SampleKind, Samples};
pub use buffer::{SampleBuffer, SharedRing};
pub use graph::{
    BlockId, Direction, EdgeId, FlowGraph, GraphError, InputPort, OutputPort, RatePlan, Tap,
};
pub use num_complex::Complex32;
pub use scheduler::{EdgeStatus, Scheduler, SchedulerConfig, TickReport};
