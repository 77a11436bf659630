//! Concrete processing blocks.
//!
//! | Block | Ports | Ratio |
//! |-------|-------|-------|
//! | [`ToneSource`] | → real / complex | source |
//! | [`RationalResampler`] | T → T | L/M |
//! | [`WfmTx`] | real → complex | quad/audio |
//! | [`WfmRcv`] | complex → real | 1/decimation |
//! | [`FloatToComplex`] | real → complex | 1 |
//! | [`MultiplyConst`] | T → T | 1 |
//! | [`Tee`] | T → T × n | 1 |
//! | [`VectorSource`] / [`VectorSink`] / [`NullSink`] | in-memory endpoints | 1 |

mod convert;
mod fm;
mod resampler;
mod tee;
mod tone;
mod vector;

pub use convert::{FloatToComplex, MultiplyConst};
pub use fm::{BROADCAST_DEVIATION, DEFAULT_TAU, WfmRcv, WfmTx};
pub use resampler::RationalResampler;
pub use tee::Tee;
pub use tone::ToneSource;
pub use vector::{Captured, NullSink, VectorSink, VectorSource};
