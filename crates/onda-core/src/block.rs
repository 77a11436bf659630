//! The processing block interface.
//!
//! A [`Block`] advertises typed ports and a rational rate relation, and turns
//! one chunk of input into the matching chunk of output. The scheduler sizes
//! every chunk so that `outputs = inputs * L / M` holds exactly; blocks never
//! see a partial rate period.
//!
//! Sample data moves through the scheduler as [`Samples`], a tagged vector that
//! is either real (`f32`) or complex ([`Complex32`]). Generic blocks work over
//! both through the [`Sample`] trait.

use std::fmt;
use std::ops::{Add, Mul};

use num_complex::Complex32;

/// Element type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// Real-valued `f32` samples (audio, discriminator output).
    Real,
    /// Complex baseband samples (`Complex32`).
    Complex,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// A chunk of samples of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Real samples.
    Real(Vec<f32>),
    /// Complex samples.
    Complex(Vec<Complex32>),
}

impl Samples {
    /// Empty chunk of the given kind with room for `capacity` samples.
    pub fn with_capacity(kind: SampleKind, capacity: usize) -> Self {
        match kind {
            SampleKind::Real => Self::Real(Vec::with_capacity(capacity)),
            SampleKind::Complex => Self::Complex(Vec::with_capacity(capacity)),
        }
    }

    /// Kind of the contained samples.
    pub fn kind(&self) -> SampleKind {
        match self {
            Self::Real(_) => SampleKind::Real,
            Self::Complex(_) => SampleKind::Complex,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }

    /// Returns true if the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resizes to `len` samples, zeroing the whole chunk.
    pub fn reset(&mut self, len: usize) {
        match self {
            Self::Real(v) => {
                v.clear();
                v.resize(len, 0.0);
            }
            Self::Complex(v) => {
                v.clear();
                v.resize(len, Complex32::new(0.0, 0.0));
            }
        }
    }

    /// Borrows the samples as `T`, failing if the kind differs.
    pub fn slice<T: Sample>(&self) -> Result<&[T], BlockError> {
        T::view(self).map(Vec::as_slice).ok_or(BlockError::KindMismatch {
            expected: T::KIND,
            found: self.kind(),
        })
    }

    /// Mutably borrows the samples as `T`, failing if the kind differs.
    pub fn slice_mut<T: Sample>(&mut self) -> Result<&mut [T], BlockError> {
        let found = self.kind();
        T::view_mut(self)
            .map(Vec::as_mut_slice)
            .ok_or(BlockError::KindMismatch {
                expected: T::KIND,
                found,
            })
    }

    /// Borrows real samples.
    pub fn as_real(&self) -> Result<&[f32], BlockError> {
        self.slice::<f32>()
    }

    /// Borrows complex samples.
    pub fn as_complex(&self) -> Result<&[Complex32], BlockError> {
        self.slice::<Complex32>()
    }
}

impl From<Vec<f32>> for Samples {
    fn from(v: Vec<f32>) -> Self {
        Self::Real(v)
    }
}

impl From<Vec<Complex32>> for Samples {
    fn from(v: Vec<Complex32>) -> Self {
        Self::Complex(v)
    }
}

/// Scalar sample types a port can carry.
///
/// Implemented for `f32` and [`Complex32`]; lets filters and routing blocks be
/// written once for both kinds.
pub trait Sample:
    Copy + Default + Send + Sync + 'static + Add<Output = Self> + Mul<f32, Output = Self>
{
    /// Port kind for this element type.
    const KIND: SampleKind;

    /// Returns the backing vector if `samples` is of this kind.
    fn view(samples: &Samples) -> Option<&Vec<Self>>;

    /// Mutable counterpart of [`view`](Self::view).
    fn view_mut(samples: &mut Samples) -> Option<&mut Vec<Self>>;
}

impl Sample for f32 {
    const KIND: SampleKind = SampleKind::Real;

    fn view(samples: &Samples) -> Option<&Vec<Self>> {
        match samples {
            Samples::Real(v) => Some(v),
            Samples::Complex(_) => None,
        }
    }

    fn view_mut(samples: &mut Samples) -> Option<&mut Vec<Self>> {
        match samples {
            Samples::Real(v) => Some(v),
            Samples::Complex(_) => None,
        }
    }
}

impl Sample for Complex32 {
    const KIND: SampleKind = SampleKind::Complex;

    fn view(samples: &Samples) -> Option<&Vec<Self>> {
        match samples {
            Samples::Complex(v) => Some(v),
            Samples::Real(_) => None,
        }
    }

    fn view_mut(samples: &mut Samples) -> Option<&mut Vec<Self>> {
        match samples {
            Samples::Complex(v) => Some(v),
            Samples::Real(_) => None,
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Output/input sample-count relation of a block: `out = in * L / M`.
///
/// Always stored in lowest terms so that the scheduler's chunk sizes are as
/// small as the ratio allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateRatio {
    interpolation: u32,
    decimation: u32,
}

impl RateRatio {
    /// One output per input.
    pub const IDENTITY: Self = Self {
        interpolation: 1,
        decimation: 1,
    };

    /// Builds `interpolation / decimation`, reduced. Returns `None` if either is zero.
    pub fn new(interpolation: u32, decimation: u32) -> Option<Self> {
        if interpolation == 0 || decimation == 0 {
            return None;
        }
        let g = gcd(interpolation, decimation);
        Some(Self {
            interpolation: interpolation / g,
            decimation: decimation / g,
        })
    }

    /// Interpolation factor `L`.
    pub fn interpolation(&self) -> u32 {
        self.interpolation
    }

    /// Decimation factor `M`.
    pub fn decimation(&self) -> u32 {
        self.decimation
    }

    /// Output rate for a given input rate.
    pub fn apply(&self, input_rate: f64) -> f64 {
        input_rate * f64::from(self.interpolation) / f64::from(self.decimation)
    }

    /// Output samples produced by `input` samples (`input` must be a multiple of `M`).
    pub fn output_len(&self, input: usize) -> usize {
        input / self.decimation as usize * self.interpolation as usize
    }

    /// Returns true for a 1:1 ratio.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for RateRatio {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for RateRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interpolation, self.decimation)
    }
}

/// Runtime failures reported by a block's `process`.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockError {
    /// A port carried the wrong sample kind.
    KindMismatch {
        /// Kind the block expected.
        expected: SampleKind,
        /// Kind it received.
        found: SampleKind,
    },
    /// The block was invoked with the wrong number of port buffers.
    PortCount {
        /// Ports the block declares.
        expected: usize,
        /// Buffers it received.
        found: usize,
    },
    /// A block produced a different number of samples than its ratio requires.
    RateViolation {
        /// Samples the ratio demanded.
        expected: usize,
        /// Samples actually produced.
        produced: usize,
    },
    /// The collaborator behind an endpoint block failed.
    Device(String),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch { expected, found } => {
                write!(f, "expected {expected} samples, got {found}")
            }
            Self::PortCount { expected, found } => {
                write!(f, "expected {expected} port buffers, got {found}")
            }
            Self::RateViolation { expected, produced } => {
                write!(f, "produced {produced} samples where {expected} were due")
            }
            Self::Device(msg) => write!(f, "device failure: {msg}"),
        }
    }
}

impl std::error::Error for BlockError {}

/// One real port.
pub const REAL: &[SampleKind] = &[SampleKind::Real];
/// One complex port.
pub const COMPLEX: &[SampleKind] = &[SampleKind::Complex];
/// No ports.
pub const NONE: &[SampleKind] = &[];

/// Returns the port signature carrying one stream of `T`.
pub(crate) fn single<T: Sample>() -> &'static [SampleKind] {
    match T::KIND {
        SampleKind::Real => REAL,
        SampleKind::Complex => COMPLEX,
    }
}

/// A node of the flow graph.
///
/// Blocks with no input ports are sources, blocks with no output ports are
/// sinks. All state a block needs (filter history, oscillator phase) lives in
/// the block itself; `process` must be a deterministic function of that state
/// and the input chunk.
///
/// # Chunk contract
///
/// For a block with ratio `L/M` the scheduler calls `process` with every input
/// buffer holding the same `n` samples, `n` a multiple of `M`, and every output
/// buffer pre-sized (zeroed) to `n * L / M`. Sources receive output buffers sized
/// to what the downstream edge and [`ready`](Self::ready) allow; sinks receive
/// input bounded by `ready`.
pub trait Block: Send {
    /// Human-readable identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Sample kinds of the input ports, in port order.
    fn input_ports(&self) -> &[SampleKind];

    /// Sample kinds of the output ports, in port order.
    fn output_ports(&self) -> &[SampleKind];

    /// Output/input sample-count relation.
    fn rate_ratio(&self) -> RateRatio {
        RateRatio::IDENTITY
    }

    /// Output sample rate for a given input sample rate.
    fn declare_rate(&self, input_rate: f64) -> f64 {
        self.rate_ratio().apply(input_rate)
    }

    /// Input rate this block was configured for, if it cares.
    ///
    /// Validation rejects graphs where the upstream rate differs.
    fn expected_input_rate(&self) -> Option<f64> {
        None
    }

    /// Output rate of a source block. Non-source blocks return `None`.
    fn source_rate(&self) -> Option<f64> {
        None
    }

    /// Hardware-gated limit on the next chunk.
    ///
    /// For a source, the samples it can deliver right now; for a sink, the
    /// samples it can accept right now. `None` means unbounded.
    fn ready(&self) -> Option<usize> {
        None
    }

    /// Returns true once a finite source has nothing more to produce.
    fn is_finished(&self) -> bool {
        false
    }

    /// Transforms one chunk. See the trait docs for the sizing contract.
    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError>;
}

/// Checks port buffer counts before a block indexes into them.
pub fn expect_ports(
    inputs: &[Samples],
    outputs: &[Samples],
    n_in: usize,
    n_out: usize,
) -> Result<(), BlockError> {
    if inputs.len() != n_in {
        return Err(BlockError::PortCount {
            expected: n_in,
            found: inputs.len(),
        });
    }
    if outputs.len() != n_out {
        return Err(BlockError::PortCount {
            expected: n_out,
            found: outputs.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_reduces_to_lowest_terms() {
        let r = RateRatio::new(480_000, 48_000).unwrap();
        assert_eq!(r.interpolation(), 10);
        assert_eq!(r.decimation(), 1);
        assert_eq!(r.apply(48_000.0), 480_000.0);
    }

    #[test]
    fn ratio_rejects_zero() {
        assert!(RateRatio::new(0, 3).is_none());
        assert!(RateRatio::new(3, 0).is_none());
    }

    #[test]
    fn output_len_follows_ratio() {
        let r = RateRatio::new(3, 2).unwrap();
        assert_eq!(r.output_len(8), 12);
        assert_eq!(RateRatio::new(1, 10).unwrap().output_len(4_000), 400);
    }

    #[test]
    fn slice_rejects_wrong_kind() {
        let s = Samples::Real(vec![1.0, 2.0]);
        assert!(s.as_real().is_ok());
        assert_eq!(
            s.as_complex().unwrap_err(),
            BlockError::KindMismatch {
                expected: SampleKind::Complex,
                found: SampleKind::Real
            }
        );
    }

    #[test]
    fn reset_zeroes_and_resizes() {
        let mut s = Samples::Complex(vec![Complex32::new(1.0, 1.0)]);
        s.reset(3);
        assert_eq!(s.len(), 3);
        assert!(s.as_complex().unwrap().iter().all(|c| c.norm() == 0.0));
    }
}
