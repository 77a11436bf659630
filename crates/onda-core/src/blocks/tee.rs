//! Fan-out of one stream to several consumers.
//!
//! Every port carries at most one edge, so a stream that feeds both a
//! demodulator and a display goes through a `Tee`.

use std::marker::PhantomData;

use crate::block::{Block, BlockError, Sample, SampleKind, Samples, expect_ports, single};

/// Copies its single input to `fanout` identical outputs.
#[derive(Debug, Clone)]
pub struct Tee<T: Sample> {
    outputs: Vec<SampleKind>,
    _kind: PhantomData<T>,
}

impl<T: Sample> Tee<T> {
    /// Creates a tee with `fanout` outputs (at least one).
    pub fn new(fanout: usize) -> Self {
        Self {
            outputs: vec![T::KIND; fanout.max(1)],
            _kind: PhantomData,
        }
    }
}

impl<T: Sample> Block for Tee<T> {
    fn name(&self) -> &str {
        "tee"
    }

    fn input_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn output_ports(&self) -> &[SampleKind] {
        &self.outputs
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, self.outputs.len())?;
        let input = inputs[0].slice::<T>()?;
        for out in outputs.iter_mut() {
            out.slice_mut::<T>()?.copy_from_slice(input);
        }
        Ok(())
    }
}
