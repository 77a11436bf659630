//! WAV file audio collaborators.
//!
//! [`WavInput`] replays a file as a finite mono source, [`WavOutput`] records
//! a mono sink. Both use the file's own sample rate, so a chain that expects a
//! different rate fails validation instead of playing at the wrong pitch.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};

use crate::audio::{AudioInput, AudioOutput};
use crate::Result;

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample; 32 means IEEE float.
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Reads a WAV file as mono `f32`, averaging channels.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<f32> = match reader.spec().sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };
    Ok((mono, spec))
}

/// Writes mono `f32` samples; integer depths are scaled and clipped.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], spec: WavSpec) -> Result<()> {
    let mut writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
    write_samples(&mut writer, samples, spec.bits_per_sample)?;
    writer.finalize()?;
    Ok(())
}

fn write_samples<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    samples: &[f32],
    bits_per_sample: u16,
) -> Result<()> {
    if bits_per_sample == 32 {
        for &sample in samples {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i64 << (bits_per_sample - 1)) as f32;
        for &sample in samples {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }
    Ok(())
}

/// Finite audio input backed by a WAV file loaded into memory.
#[derive(Debug, Clone)]
pub struct WavInput {
    samples: Vec<f32>,
    pos: usize,
    sample_rate: f64,
}

impl WavInput {
    /// Loads `path`, mixing down to mono.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (samples, spec) = read_wav(path)?;
        tracing::info!(
            samples = samples.len(),
            sample_rate = spec.sample_rate,
            "wav input loaded"
        );
        Ok(Self {
            samples,
            pos: 0,
            sample_rate: f64::from(spec.sample_rate),
        })
    }
}

impl AudioInput for WavInput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        let n = out.len().min(self.samples.len() - self.pos);
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn available(&self) -> Option<usize> {
        Some(self.samples.len() - self.pos)
    }

    fn is_finished(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

/// Audio output streaming into a mono WAV file.
pub struct WavOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: WavSpec,
    written: u64,
}

impl WavOutput {
    /// Creates `path` for mono audio at `sample_rate` with the given bit depth.
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32, bits_per_sample: u16) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample,
        };
        let writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
        Ok(Self {
            writer: Some(writer),
            spec,
            written: 0,
        })
    }

    /// Samples written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AudioOutput for WavOutput {
    fn sample_rate(&self) -> f64 {
        f64::from(self.spec.sample_rate)
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };
        write_samples(writer, samples, self.spec.bits_per_sample)?;
        self.written += samples.len() as u64;
        Ok(samples.len())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!(samples = self.written, "wav output finalized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_roundtrip_f32() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0).sin()).collect();
        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &samples, WavSpec::default()).unwrap();

        let (loaded, spec) = read_wav(file.path()).unwrap();
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(loaded.len(), samples.len());
        for (a, b) in samples.iter().zip(&loaded) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_roundtrip_i16() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0).sin() * 0.9).collect();
        let spec = WavSpec {
            bits_per_sample: 16,
            ..WavSpec::default()
        };
        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &samples, spec).unwrap();

        let (loaded, _) = read_wav(file.path()).unwrap();
        for (a, b) in samples.iter().zip(&loaded) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn stereo_is_mixed_down() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels: 2,
            ..WavSpec::default()
        };
        write_wav(file.path(), &[1.0, 0.0, 0.5, 0.5], spec).unwrap();
        let (mono, _) = read_wav(file.path()).unwrap();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn wav_input_is_finite() {
        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &[0.25; 10], WavSpec::default()).unwrap();
        let mut input = WavInput::open(file.path()).unwrap();
        assert_eq!(input.sample_rate(), 48_000.0);
        let mut buf = [0.0; 8];
        assert_eq!(input.read(&mut buf).unwrap(), 8);
        assert_eq!(input.available(), Some(2));
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert!(input.is_finished());
    }

    #[test]
    fn wav_output_finalizes() {
        let file = NamedTempFile::new().unwrap();
        let mut output = WavOutput::create(file.path(), 50_000, 16).unwrap();
        output.write(&[0.5; 100]).unwrap();
        output.finish().unwrap();
        let (loaded, spec) = read_wav(file.path()).unwrap();
        assert_eq!(spec.sample_rate, 50_000);
        assert_eq!(loaded.len(), 100);
    }
}
