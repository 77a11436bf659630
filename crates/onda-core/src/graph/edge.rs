//! Edges and display taps.
//!
//! An edge records which output feeds which input and the sample kind it
//! carries. The ring buffer itself is allocated by the scheduler, sized from
//! the rate ratios of both endpoints.
//!
//! A [`Tap`] is a read-only copy of whatever an output port produces. The
//! scheduler offers each chunk to the tap without waiting; when the reader is
//! slow, old samples are overwritten and the producing block never notices.

use std::fmt;

use num_complex::Complex32;

use crate::block::{SampleKind, Samples};
use crate::buffer::SharedRing;

use super::node::{InputPort, OutputPort};

/// Identifier of an edge inside a [`FlowGraph`](super::FlowGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub(crate) u32);

impl EdgeId {
    /// Index into the graph's edge storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// A directed, typed connection.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// Producing port.
    pub from: OutputPort,
    /// Consuming port.
    pub to: InputPort,
    /// Sample kind carried.
    pub kind: SampleKind,
}

/// Best-effort read-only view of an output port's stream.
#[derive(Debug, Clone)]
pub enum Tap {
    /// Tap on a real port.
    Real(SharedRing<f32>),
    /// Tap on a complex port.
    Complex(SharedRing<Complex32>),
}

impl Tap {
    pub(crate) fn new(kind: SampleKind, capacity: usize) -> Self {
        match kind {
            SampleKind::Real => Self::Real(SharedRing::with_capacity(capacity)),
            SampleKind::Complex => Self::Complex(SharedRing::with_capacity(capacity)),
        }
    }

    /// Sample kind seen by the tap.
    pub fn kind(&self) -> SampleKind {
        match self {
            Self::Real(_) => SampleKind::Real,
            Self::Complex(_) => SampleKind::Complex,
        }
    }

    /// Samples currently held.
    pub fn available(&self) -> usize {
        match self {
            Self::Real(r) => r.available(),
            Self::Complex(r) => r.available(),
        }
    }

    /// Offers a chunk without blocking; mismatched kinds are ignored.
    pub(crate) fn offer(&self, samples: &Samples) {
        match (self, samples) {
            (Self::Real(ring), Samples::Real(v)) => ring.offer(v),
            (Self::Complex(ring), Samples::Complex(v)) => ring.offer(v),
            _ => {}
        }
    }

    /// Copies the newest samples into `out` as complex values, clearing the tap.
    ///
    /// Real streams are widened with a zero imaginary part so a single spectrum
    /// routine can serve both kinds.
    pub fn latest_complex(&self, out: &mut [Complex32]) -> usize {
        match self {
            Self::Complex(ring) => ring.drain_latest(out),
            Self::Real(ring) => {
                let mut scratch = vec![0.0f32; out.len()];
                let n = ring.drain_latest(&mut scratch);
                for (dst, &re) in out.iter_mut().zip(&scratch[..n]) {
                    *dst = Complex32::new(re, 0.0);
                }
                n
            }
        }
    }

    /// Copies the newest samples' real parts into `out`, clearing the tap.
    pub fn latest_real(&self, out: &mut [f32]) -> usize {
        match self {
            Self::Real(ring) => ring.drain_latest(out),
            Self::Complex(ring) => {
                let mut scratch = vec![Complex32::default(); out.len()];
                let n = ring.drain_latest(&mut scratch);
                for (dst, c) in out.iter_mut().zip(&scratch[..n]) {
                    *dst = c.re;
                }
                n
            }
        }
    }
}
