//! Stateless scaling and format conversion.

use num_complex::Complex32;

use crate::block::{Block, BlockError, COMPLEX, REAL, Sample, SampleKind, Samples, expect_ports, single};

/// Packs real samples into complex ones with a zero imaginary part.
///
/// This is the only sanctioned way to feed a real stream into a complex port.
#[derive(Debug, Clone, Default)]
pub struct FloatToComplex;

impl FloatToComplex {
    /// Creates the converter.
    pub fn new() -> Self {
        Self
    }
}

impl Block for FloatToComplex {
    fn name(&self) -> &str {
        "float_to_complex"
    }

    fn input_ports(&self) -> &[SampleKind] {
        REAL
    }

    fn output_ports(&self) -> &[SampleKind] {
        COMPLEX
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 1)?;
        let input = inputs[0].as_real()?;
        let out = outputs[0].slice_mut::<Complex32>()?;
        for (y, &x) in out.iter_mut().zip(input) {
            *y = Complex32::new(x, 0.0);
        }
        Ok(())
    }
}

/// Multiplies every sample by a fixed real gain.
#[derive(Debug, Clone)]
pub struct MultiplyConst<T: Sample> {
    gain: f32,
    _kind: std::marker::PhantomData<T>,
}

impl<T: Sample> MultiplyConst<T> {
    /// Creates a scaler with the given linear gain.
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            _kind: std::marker::PhantomData,
        }
    }

    /// Linear gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl<T: Sample> Block for MultiplyConst<T> {
    fn name(&self) -> &str {
        "multiply_const"
    }

    fn input_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn output_ports(&self) -> &[SampleKind] {
        single::<T>()
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 1)?;
        let input = inputs[0].slice::<T>()?;
        let out = outputs[0].slice_mut::<T>()?;
        for (y, &x) in out.iter_mut().zip(input) {
            *y = x * self.gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_with_zero_imaginary() {
        let mut conv = FloatToComplex::new();
        let inputs = [Samples::Real(vec![0.5, -1.0])];
        let mut outputs = [Samples::Complex(vec![Complex32::default(); 2])];
        conv.process(&inputs, &mut outputs).unwrap();
        assert_eq!(
            outputs[0].as_complex().unwrap(),
            &[Complex32::new(0.5, 0.0), Complex32::new(-1.0, 0.0)]
        );
    }

    #[test]
    fn scales_complex() {
        let mut gain = MultiplyConst::<Complex32>::new(2.0);
        let inputs = [Samples::Complex(vec![Complex32::new(1.0, -0.5)])];
        let mut outputs = [Samples::Complex(vec![Complex32::default()])];
        gain.process(&inputs, &mut outputs).unwrap();
        assert_eq!(outputs[0].as_complex().unwrap()[0], Complex32::new(2.0, -1.0));
    }

    #[test]
    fn scaler_rejects_wrong_kind() {
        let mut gain = MultiplyConst::<f32>::new(2.0);
        let inputs = [Samples::Complex(vec![Complex32::default()])];
        let mut outputs = [Samples::Real(vec![0.0])];
        assert!(gain.process(&inputs, &mut outputs).is_err());
    }
}
