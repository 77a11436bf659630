//! Simulated radio hardware.
//!
//! [`SimulatedRadio`] implements [`RadioDriver`] without any hardware: it paces
//! itself to the configured sample rate, captures what is transmitted,
//! synthesizes what is received, and can be paired into an over-the-air
//! loopback. Faults (an unplugged device, a stall, a mid-stream disconnect)
//! can be injected to exercise the failure paths of endpoints and stations.

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use onda_core::{Complex32, SharedRing};

use crate::device::{
    CpuFormat, DeviceCapabilities, DeviceSettings, Interrupt, RadioDriver, StreamDirection,
};
use crate::{Error, Result};

/// Default number of transmitted samples kept by the probe.
pub const DEFAULT_CAPTURE_LIMIT: usize = 1 << 20;

/// What a simulated receiver hears.
#[derive(Debug, Clone)]
pub enum SimSignal {
    /// All zeros.
    Silence,
    /// A carrier `offset` Hz from the tuned frequency.
    Tone {
        /// Baseband offset in Hz.
        offset: f64,
        /// Peak amplitude.
        amplitude: f32,
    },
    /// A carrier at the tuned frequency, frequency-modulated by a sine.
    FmTone {
        /// Modulating tone in Hz.
        audio_freq: f64,
        /// Peak deviation in Hz.
        deviation: f64,
        /// Peak amplitude.
        amplitude: f32,
    },
    /// Whatever the paired transmitter put on the air.
    Air(SharedRing<Complex32>),
}

/// One settings snapshot as the device applied it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSettings {
    /// Samples streamed before the snapshot took effect.
    pub at_sample: u64,
    /// The snapshot.
    pub settings: DeviceSettings,
}

#[derive(Debug, Default)]
struct SimState {
    opens: u32,
    closes: u32,
    applied: Vec<AppliedSettings>,
    captured: Vec<Complex32>,
    capture_limit: usize,
    transmitted: u64,
    received: u64,
}

/// Read-only view of a [`SimulatedRadio`] that outlives moving the driver
/// into an endpoint.
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transmitted samples, up to the capture limit.
    pub fn captured(&self) -> Vec<Complex32> {
        self.lock().captured.clone()
    }

    /// Total samples accepted for transmission.
    pub fn transmitted(&self) -> u64 {
        self.lock().transmitted
    }

    /// Total samples delivered by `receive`.
    pub fn received(&self) -> u64 {
        self.lock().received
    }

    /// Every settings snapshot applied, starting with the one used at open.
    pub fn applied(&self) -> Vec<AppliedSettings> {
        self.lock().applied.clone()
    }

    /// True between `open` and `close`.
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        state.opens > state.closes
    }

    /// Number of completed `close` calls.
    pub fn closes(&self) -> u32 {
        self.lock().closes
    }
}

/// Software stand-in for a radio front end.
#[derive(Debug)]
pub struct SimulatedRadio {
    capabilities: DeviceCapabilities,
    signal: SimSignal,
    air: Option<SharedRing<Complex32>>,
    realtime: bool,
    stalled: bool,
    unplugged: bool,
    fail_after: Option<u64>,
    state: Arc<Mutex<SimState>>,
    direction: Option<StreamDirection>,
    settings: DeviceSettings,
    clock: Option<Instant>,
    since_clock: u64,
    streamed: u64,
    phase: f64,
    audio_phase: f64,
}

impl SimulatedRadio {
    /// Creates a silent, real-time paced radio and its probe.
    pub fn new(capabilities: DeviceCapabilities) -> (Self, SimProbe) {
        let state = Arc::new(Mutex::new(SimState {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            ..SimState::default()
        }));
        let radio = Self {
            capabilities,
            signal: SimSignal::Silence,
            air: None,
            realtime: true,
            stalled: false,
            unplugged: false,
            fail_after: None,
            state: Arc::clone(&state),
            direction: None,
            settings: DeviceSettings::default(),
            clock: None,
            since_clock: 0,
            streamed: 0,
            phase: 0.0,
            audio_phase: 0.0,
        };
        (radio, SimProbe { state })
    }

    /// A transmitter and receiver sharing one simulated channel.
    ///
    /// Everything the first radio transmits is received by the second.
    pub fn loopback(
        capabilities: DeviceCapabilities,
        air_capacity: usize,
    ) -> ((Self, SimProbe), (Self, SimProbe)) {
        let air = SharedRing::with_capacity(air_capacity);
        let (mut tx, tx_probe) = Self::new(capabilities.clone());
        tx.air = Some(air.clone());
        let (rx, rx_probe) = Self::new(capabilities);
        ((tx, tx_probe), (rx.with_signal(SimSignal::Air(air)), rx_probe))
    }

    /// Sets what the receiver hears.
    pub fn with_signal(mut self, signal: SimSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Runs as fast as the caller pulls instead of at the sample rate.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Every I/O call blocks until interrupted, like a wedged USB transfer.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// `open` reports the device as unavailable.
    pub fn unplugged(mut self) -> Self {
        self.unplugged = true;
        self
    }

    /// Fails with a device error once `samples` have streamed.
    pub fn failing_after(mut self, samples: u64) -> Self {
        self.fail_after = Some(samples);
        self
    }

    /// Keeps at most `limit` transmitted samples in the probe.
    pub fn with_capture_limit(self, limit: usize) -> Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capture_limit = limit;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self) -> Result<()> {
        match self.fail_after {
            Some(limit) if self.streamed >= limit => Err(Error::Device(format!(
                "{} disconnected after {} samples",
                self.capabilities.name, self.streamed
            ))),
            _ => Ok(()),
        }
    }

    /// Sleeps until the wall clock catches up with the samples streamed.
    fn pace(&mut self, samples: usize, interrupt: &Interrupt) {
        self.streamed += samples as u64;
        if !self.realtime {
            return;
        }
        let clock = *self.clock.get_or_insert_with(Instant::now);
        self.since_clock += samples as u64;
        let due =
            clock + Duration::from_secs_f64(self.since_clock as f64 / self.settings.sample_rate);
        let now = Instant::now();
        if due > now {
            interrupt.wait_timeout(due - now);
        }
    }

    fn synthesize(&mut self, buf: &mut [Complex32]) {
        let rate = self.settings.sample_rate;
        match &self.signal {
            SimSignal::Silence => buf.fill(Complex32::default()),
            SimSignal::Tone { offset, amplitude } => {
                let inc = TAU * offset / rate;
                for y in buf.iter_mut() {
                    *y = Complex32::from_polar(*amplitude, self.phase as f32);
                    self.phase = (self.phase + inc).rem_euclid(TAU);
                }
            }
            SimSignal::FmTone {
                audio_freq,
                deviation,
                amplitude,
            } => {
                let audio_inc = TAU * audio_freq / rate;
                for y in buf.iter_mut() {
                    *y = Complex32::from_polar(*amplitude, self.phase as f32);
                    self.phase =
                        (self.phase + TAU * deviation * self.audio_phase.sin() / rate).rem_euclid(TAU);
                    self.audio_phase = (self.audio_phase + audio_inc).rem_euclid(TAU);
                }
            }
            SimSignal::Air(ring) => {
                ring.pull_or_zero(buf);
            }
        }
        if self.settings.cpu_format == CpuFormat::RealFloat {
            for y in buf.iter_mut() {
                y.im = 0.0;
            }
        }
    }
}

impl RadioDriver for SimulatedRadio {
    fn name(&self) -> &str {
        &self.capabilities.name
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn open(&mut self, direction: StreamDirection, settings: &DeviceSettings) -> Result<()> {
        if self.unplugged {
            return Err(Error::DeviceUnavailable(format!(
                "no {} found",
                self.capabilities.name
            )));
        }
        self.direction = Some(direction);
        self.settings = settings.clone();
        self.clock = None;
        self.since_clock = 0;
        let streamed = self.streamed;
        let mut state = self.lock();
        state.opens += 1;
        state.applied.push(AppliedSettings {
            at_sample: streamed,
            settings: settings.clone(),
        });
        Ok(())
    }

    fn apply(&mut self, settings: &DeviceSettings) -> Result<()> {
        self.settings = settings.clone();
        // Restart pacing from now so a rate change does not burst or stall.
        self.clock = None;
        self.since_clock = 0;
        let streamed = self.streamed;
        self.lock().applied.push(AppliedSettings {
            at_sample: streamed,
            settings: settings.clone(),
        });
        Ok(())
    }

    fn receive(&mut self, buf: &mut [Complex32], interrupt: &Interrupt) -> Result<usize> {
        if self.direction != Some(StreamDirection::Receive) {
            return Err(Error::InvalidState("receive on a stream not opened for rx".into()));
        }
        if self.stalled {
            interrupt.wait();
            return Ok(0);
        }
        self.check_fault()?;
        self.synthesize(buf);
        self.lock().received += buf.len() as u64;
        self.pace(buf.len(), interrupt);
        Ok(buf.len())
    }

    fn transmit(&mut self, buf: &[Complex32], interrupt: &Interrupt) -> Result<usize> {
        if self.direction != Some(StreamDirection::Transmit) {
            return Err(Error::InvalidState("transmit on a stream not opened for tx".into()));
        }
        if self.stalled {
            interrupt.wait();
            return Ok(0);
        }
        self.check_fault()?;
        let real_only = self.settings.cpu_format == CpuFormat::RealFloat;
        {
            let mut state = self.lock();
            let room = state.capture_limit.saturating_sub(state.captured.len());
            state.captured.extend(
                buf.iter()
                    .take(room)
                    .map(|&c| if real_only { Complex32::new(c.re, 0.0) } else { c }),
            );
            state.transmitted += buf.len() as u64;
        }
        if let Some(air) = &self.air {
            air.push(buf);
        }
        self.pace(buf.len(), interrupt);
        Ok(buf.len())
    }

    fn close(&mut self) {
        self.direction = None;
        self.lock().closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(direction: StreamDirection, radio: &mut SimulatedRadio) {
        radio.open(direction, &DeviceSettings::default()).unwrap();
    }

    #[test]
    fn unplugged_radio_is_unavailable() {
        let (mut radio, _) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
        radio = radio.unplugged();
        let err = radio
            .open(StreamDirection::Receive, &DeviceSettings::default())
            .unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }

    #[test]
    fn transmit_is_captured_up_to_limit() {
        let (radio, probe) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
        let mut radio = radio.unpaced().with_capture_limit(6);
        open(StreamDirection::Transmit, &mut radio);
        let interrupt = Interrupt::new();
        radio.transmit(&[Complex32::new(1.0, 1.0); 4], &interrupt).unwrap();
        radio.transmit(&[Complex32::new(2.0, 0.0); 4], &interrupt).unwrap();
        assert_eq!(probe.transmitted(), 8);
        assert_eq!(probe.captured().len(), 6);
    }

    #[test]
    fn tone_has_requested_offset() {
        let (radio, _) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
        let mut radio = radio.unpaced().with_signal(SimSignal::Tone {
            offset: 125e3,
            amplitude: 1.0,
        });
        open(StreamDirection::Receive, &mut radio);
        let mut buf = vec![Complex32::default(); 8];
        radio.receive(&mut buf, &Interrupt::new()).unwrap();
        // 125 kHz at 500 kS/s is a quarter turn per sample.
        let step = (buf[1] * buf[0].conj()).arg();
        assert!((step - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
    }

    #[test]
    fn fault_fires_after_limit() {
        let (radio, _) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
        let mut radio = radio.unpaced().failing_after(8);
        open(StreamDirection::Receive, &mut radio);
        let mut buf = vec![Complex32::default(); 8];
        let interrupt = Interrupt::new();
        assert!(radio.receive(&mut buf, &interrupt).is_ok());
        assert!(matches!(radio.receive(&mut buf, &interrupt), Err(Error::Device(_))));
    }

    #[test]
    fn loopback_carries_samples() {
        let ((tx, _), (rx, _)) = SimulatedRadio::loopback(DeviceCapabilities::usrp1_rfx900(), 64);
        let (mut tx, mut rx) = (tx.unpaced(), rx.unpaced());
        open(StreamDirection::Transmit, &mut tx);
        open(StreamDirection::Receive, &mut rx);
        let interrupt = Interrupt::new();
        tx.transmit(&[Complex32::new(0.25, -0.5); 16], &interrupt).unwrap();
        let mut buf = vec![Complex32::default(); 16];
        rx.receive(&mut buf, &interrupt).unwrap();
        assert!(buf.iter().all(|c| *c == Complex32::new(0.25, -0.5)));
    }

    #[test]
    fn real_format_drops_imaginary() {
        let (radio, _) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
        let mut radio = radio.unpaced().with_signal(SimSignal::Tone {
            offset: 10e3,
            amplitude: 1.0,
        });
        let settings = DeviceSettings {
            cpu_format: CpuFormat::RealFloat,
            ..DeviceSettings::default()
        };
        radio.open(StreamDirection::Receive, &settings).unwrap();
        let mut buf = vec![Complex32::default(); 32];
        radio.receive(&mut buf, &Interrupt::new()).unwrap();
        assert!(buf.iter().all(|c| c.im == 0.0));
    }
}
