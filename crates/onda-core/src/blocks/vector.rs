//! In-memory endpoints.
//!
//! [`VectorSource`] replays a fixed set of samples and then reports itself
//! finished; [`VectorSink`] collects everything it receives behind a shared
//! [`Captured`] handle; [`NullSink`] throws samples away. They are used for
//! offline runs and for testing graphs without hardware.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use crate::block::{Block, BlockError, NONE, Sample, SampleKind, Samples, expect_ports, single};

/// Source that emits a fixed vector once (or forever, when repeating).
#[derive(Debug, Clone)]
pub struct VectorSource<T: Sample> {
    data: Vec<T>,
    pos: usize,
    repeat: bool,
    sample_rate: f64,
}

impl<T: Sample> VectorSource<T> {
    /// Emits `data` once at `sample_rate`.
    pub fn new(data: Vec<T>, sample_rate: f64) -> Self {
        Self {
            data,
            pos: 0,
            repeat: false,
            sample_rate,
        }
    }

    /// Loops over `data` indefinitely.
    pub fn repeating(data: Vec<T>, sample_rate: f64) -> Self {
        Self {
            repeat: !data.is_empty(),
            ..Self::new(data, sample_rate)
        }
    }

    /// Samples left before the end of the data.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl<T: Sample> Block for VectorSource<T> {
    fn name(&self) -> &str {
        "vector_source"
    }

    fn input_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn output_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn source_rate(&self) -> Option<f64> {
        Some(self.sample_rate)
    }

    fn ready(&self) -> Option<usize> {
        if self.repeat {
            None
        } else {
            Some(self.remaining())
        }
    }

    fn is_finished(&self) -> bool {
        !self.repeat && self.pos >= self.data.len()
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 0, 1)?;
        let out = outputs[0].slice_mut::<T>()?;
        let mut filled = 0;
        while filled < out.len() {
            if self.pos == self.data.len() {
                if !self.repeat {
                    return Err(BlockError::RateViolation {
                        expected: out.len(),
                        produced: filled,
                    });
                }
                self.pos = 0;
            }
            let n = (out.len() - filled).min(self.data.len() - self.pos);
            out[filled..filled + n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            filled += n;
        }
        Ok(())
    }
}

/// Shared view of the samples a [`VectorSink`] has received.
#[derive(Debug)]
pub struct Captured<T> {
    data: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Captured<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone> Captured<T> {
    /// Copy of everything received so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of samples received so far.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink that appends every chunk to a shared vector.
#[derive(Debug)]
pub struct VectorSink<T: Sample> {
    data: Arc<Mutex<Vec<T>>>,
    expected_rate: Option<f64>,
    _kind: PhantomData<T>,
}

impl<T: Sample> VectorSink<T> {
    /// Creates the sink and the handle used to read what it collects.
    pub fn new() -> (Self, Captured<T>) {
        let data = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                data: Arc::clone(&data),
                expected_rate: None,
                _kind: PhantomData,
            },
            Captured { data },
        )
    }

    /// Declares the rate the sink expects, for validation.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.expected_rate = Some(rate);
        self
    }
}

impl<T: Sample> Block for VectorSink<T> {
    fn name(&self) -> &str {
        "vector_sink"
    }

    fn input_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn output_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn expected_input_rate(&self) -> Option<f64> {
        self.expected_rate
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 0)?;
        let input = inputs[0].slice::<T>()?;
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(input);
        Ok(())
    }
}

/// Sink that discards everything it receives.
#[derive(Debug, Clone, Default)]
pub struct NullSink<T: Sample> {
    _kind: PhantomData<T>,
}

impl<T: Sample> NullSink<T> {
    /// Creates the sink.
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<T: Sample> Block for NullSink<T> {
    fn name(&self) -> &str {
        "null_sink"
    }

    fn input_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn output_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 0)
    }
}
