//! Audio collaborators and the graph blocks that wrap them.
//!
//! An [`AudioInput`] is pulled by [`AudioSourceBlock`]; an [`AudioOutput`] is
//! pushed by [`AudioSinkBlock`]. Implementations exist for cpal devices
//! ([`CpalInput`](crate::CpalInput), [`CpalOutput`](crate::CpalOutput)) and
//! WAV files ([`WavInput`](crate::WavInput), [`WavOutput`](crate::WavOutput)).
//!
//! [`open_source_or_tone`] implements the microphone fallback: only
//! [`Error::DeviceUnavailable`] is replaced by a test tone, every other error
//! (a malformed rate, an unreadable file) is returned to the caller.

use onda_core::block::{NONE, REAL, expect_ports};
use onda_core::blocks::ToneSource;
use onda_core::{Block, BlockError, SampleKind, Samples};

use crate::{Error, Result};

/// Pull-style audio producer.
pub trait AudioInput: Send {
    /// Samples per second delivered by `read`.
    fn sample_rate(&self) -> f64;

    /// Fills up to `out.len()` mono samples and returns the count.
    ///
    /// Returns [`Error::DeviceUnavailable`] if the device went away.
    fn read(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Samples that `read` can deliver without waiting, if known.
    fn available(&self) -> Option<usize> {
        None
    }

    /// True once a finite input is exhausted.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Push-style audio consumer.
pub trait AudioOutput: Send {
    /// Samples per second accepted by `write`.
    fn sample_rate(&self) -> f64;

    /// Queues mono samples and returns how many were accepted.
    fn write(&mut self, samples: &[f32]) -> Result<usize>;

    /// Samples `write` can accept without dropping, if known.
    fn free(&self) -> Option<usize> {
        None
    }

    /// Flushes buffered data. Called once when the graph stops.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Graph source reading from an [`AudioInput`].
pub struct AudioSourceBlock {
    input: Box<dyn AudioInput>,
}

impl AudioSourceBlock {
    /// Wraps an input.
    pub fn new(input: Box<dyn AudioInput>) -> Self {
        Self { input }
    }
}

impl Block for AudioSourceBlock {
    fn name(&self) -> &str {
        "audio_source"
    }

    fn input_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn output_ports(&self) -> &[SampleKind] {
        REAL
    }

    fn source_rate(&self) -> Option<f64> {
        Some(self.input.sample_rate())
    }

    fn ready(&self) -> Option<usize> {
        self.input.available()
    }

    fn is_finished(&self) -> bool {
        self.input.is_finished()
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> std::result::Result<(), BlockError> {
        expect_ports(inputs, outputs, 0, 1)?;
        let out = outputs[0].slice_mut::<f32>()?;
        let mut filled = 0;
        while filled < out.len() {
            let n = self
                .input
                .read(&mut out[filled..])
                .map_err(|e| BlockError::Device(e.to_string()))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < out.len() {
            if !self.input.is_finished() {
                return Err(BlockError::RateViolation {
                    expected: out.len(),
                    produced: filled,
                });
            }
            // A finite input that ran out mid-chunk pads with silence.
            out[filled..].fill(0.0);
        }
        Ok(())
    }
}

/// Graph sink writing into an [`AudioOutput`].
pub struct AudioSinkBlock {
    output: Box<dyn AudioOutput>,
}

impl AudioSinkBlock {
    /// Wraps an output.
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self { output }
    }
}

impl Block for AudioSinkBlock {
    fn name(&self) -> &str {
        "audio_sink"
    }

    fn input_ports(&self) -> &[SampleKind] {
        REAL
    }

    fn output_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn expected_input_rate(&self) -> Option<f64> {
        Some(self.output.sample_rate())
    }

    fn ready(&self) -> Option<usize> {
        self.output.free()
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> std::result::Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 0)?;
        let input = inputs[0].slice::<f32>()?;
        self.output
            .write(input)
            .map_err(|e| BlockError::Device(e.to_string()))?;
        Ok(())
    }
}

impl Drop for AudioSinkBlock {
    fn drop(&mut self) {
        if let Err(e) = self.output.finish() {
            tracing::warn!(error = %e, "audio output did not finish cleanly");
        }
    }
}

/// Which source a fallback-aware open produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChoice {
    /// The requested audio input.
    Device,
    /// The test tone, because the input was unavailable.
    Tone,
}

/// Opens an audio input, substituting a real tone when it is unavailable.
///
/// `open` is called once. [`Error::DeviceUnavailable`] yields a
/// [`ToneSource`] at `sample_rate` (logged as a warning); any other error is
/// returned unchanged. A device whose rate differs from `sample_rate` is a
/// configuration error.
pub fn open_source_or_tone<F>(
    open: F,
    sample_rate: f64,
    tone_freq: f64,
    tone_amplitude: f32,
) -> Result<(Box<dyn Block>, SourceChoice)>
where
    F: FnOnce(f64) -> Result<Box<dyn AudioInput>>,
{
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(Error::Configuration(format!(
            "audio rate {sample_rate} Hz must be positive"
        )));
    }
    match open(sample_rate) {
        Ok(input) => {
            if (input.sample_rate() - sample_rate).abs() > 1e-6 * sample_rate {
                return Err(Error::Configuration(format!(
                    "audio input runs at {} Hz, chain expects {sample_rate} Hz",
                    input.sample_rate()
                )));
            }
            Ok((Box::new(AudioSourceBlock::new(input)), SourceChoice::Device))
        }
        Err(Error::DeviceUnavailable(reason)) => {
            tracing::warn!(
                %reason,
                tone_hz = tone_freq,
                "audio input unavailable, using test tone"
            );
            Ok((
                Box::new(ToneSource::real(sample_rate, tone_freq, tone_amplitude)),
                SourceChoice::Tone,
            ))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        rate: f64,
        next: f32,
    }

    impl AudioInput for Counting {
        fn sample_rate(&self) -> f64 {
            self.rate
        }

        fn read(&mut self, out: &mut [f32]) -> Result<usize> {
            for y in out.iter_mut() {
                *y = self.next;
                self.next += 1.0;
            }
            Ok(out.len())
        }
    }

    struct Finite {
        left: Vec<f32>,
    }

    impl AudioInput for Finite {
        fn sample_rate(&self) -> f64 {
            8_000.0
        }

        fn read(&mut self, out: &mut [f32]) -> Result<usize> {
            let n = out.len().min(self.left.len());
            out[..n].copy_from_slice(&self.left[..n]);
            self.left.drain(..n);
            Ok(n)
        }

        fn is_finished(&self) -> bool {
            self.left.is_empty()
        }
    }

    #[test]
    fn unavailable_falls_back_to_tone() {
        let (block, choice) = open_source_or_tone(
            |_| Err(Error::DeviceUnavailable("hw:0,0 busy".into())),
            48_000.0,
            1_000.0,
            0.5,
        )
        .unwrap();
        assert_eq!(choice, SourceChoice::Tone);
        assert_eq!(block.name(), "tone_source");
        assert_eq!(block.source_rate(), Some(48_000.0));
    }

    #[test]
    fn other_errors_stay_fatal() {
        let result = open_source_or_tone(
            |_| Err(Error::Configuration("bad channel map".into())),
            48_000.0,
            1_000.0,
            0.5,
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn rate_mismatch_is_configuration_error() {
        let result = open_source_or_tone(
            |_| {
                Ok(Box::new(Counting {
                    rate: 44_100.0,
                    next: 0.0,
                }) as Box<dyn AudioInput>)
            },
            48_000.0,
            1_000.0,
            0.5,
        );
        assert!(matches!(result, Err(ref e) if e.is_configuration()));
    }

    #[test]
    fn source_block_reads_input() {
        let mut block = AudioSourceBlock::new(Box::new(Counting {
            rate: 8_000.0,
            next: 0.0,
        }));
        let mut out = [Samples::Real(vec![0.0; 4])];
        block.process(&[], &mut out).unwrap();
        assert_eq!(out[0].as_real().unwrap(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn exhausted_input_pads_tail_with_silence() {
        let mut block = AudioSourceBlock::new(Box::new(Finite {
            left: vec![0.25, -0.5],
        }));
        let mut out = [Samples::Real(vec![9.0; 5])];
        block.process(&[], &mut out).unwrap();
        assert_eq!(out[0].as_real().unwrap(), &[0.25, -0.5, 0.0, 0.0, 0.0]);
        assert!(block.is_finished());
    }
}
