//! Radio device model: settings, capability ranges, and the driver seam.
//!
//! A [`RadioDriver`] is the vendor boundary. It is only ever called from one
//! endpoint I/O thread, receives the current [`DeviceSettings`] between
//! submissions, and must return promptly once its [`Interrupt`] fires, even
//! when blocked waiting for hardware.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use onda_core::Complex32;

use crate::{Error, Result};

/// Which way samples flow through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Hardware → graph.
    Receive,
    /// Graph → hardware.
    Transmit,
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => write!(f, "rx"),
            Self::Transmit => write!(f, "tx"),
        }
    }
}

/// Host-side sample representation requested from the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CpuFormat {
    /// Interleaved complex `f32` (`fc32`).
    #[default]
    ComplexFloat,
    /// Real `f32`; the imaginary part is zero on receive and discarded on transmit.
    RealFloat,
}

impl CpuFormat {
    /// Short driver-style name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComplexFloat => "fc32",
            Self::RealFloat => "f32",
        }
    }
}

/// Radio parameters applied as one unit per hardware submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Complex samples per second exchanged with the host.
    pub sample_rate: f64,
    /// RF center frequency in Hz.
    pub center_freq: f64,
    /// Gain in dB.
    pub gain: f64,
    /// Antenna port name, e.g. `"TX/RX"` or `"RX2"`.
    pub antenna: String,
    /// Host sample format.
    pub cpu_format: CpuFormat,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            sample_rate: 500e3,
            center_freq: 915e6,
            gain: 20.0,
            antenna: "TX/RX".to_string(),
            cpu_format: CpuFormat::ComplexFloat,
        }
    }
}

/// Supported parameter ranges of a radio front end.
///
/// Every setter on an endpoint is checked against these ranges; values outside
/// them are rejected, never clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// Human-readable device name.
    pub name: String,
    /// Host sample rate range in Hz.
    pub sample_rate: RangeInclusive<f64>,
    /// Tunable RF range in Hz.
    pub center_freq: RangeInclusive<f64>,
    /// Gain range in dB.
    pub gain: RangeInclusive<f64>,
    /// Antennas selectable for receive.
    pub rx_antennas: Vec<String>,
    /// Antennas selectable for transmit.
    pub tx_antennas: Vec<String>,
}

impl DeviceCapabilities {
    /// USRP1 motherboard with an RFX900 daughterboard.
    ///
    /// 750–1050 MHz tuning, up to 8 MS/s over USB, and the two RFX ports:
    /// `TX/RX` for both directions and `RX2` for receive only.
    pub fn usrp1_rfx900() -> Self {
        Self {
            name: "USRP1 + RFX900".to_string(),
            sample_rate: 125e3..=8e6,
            center_freq: 750e6..=1050e6,
            gain: 0.0..=70.0,
            rx_antennas: vec!["TX/RX".to_string(), "RX2".to_string()],
            tx_antennas: vec!["TX/RX".to_string()],
        }
    }

    /// Antennas valid for `direction`.
    pub fn antennas(&self, direction: StreamDirection) -> &[String] {
        match direction {
            StreamDirection::Receive => &self.rx_antennas,
            StreamDirection::Transmit => &self.tx_antennas,
        }
    }

    /// Rejects a sample rate outside the supported range.
    pub fn check_sample_rate(&self, rate: f64) -> Result<()> {
        check_range("sample rate", rate, &self.sample_rate, "Hz")
    }

    /// Rejects a center frequency outside the tunable range.
    pub fn check_center_freq(&self, freq: f64) -> Result<()> {
        check_range("center frequency", freq, &self.center_freq, "Hz")
    }

    /// Rejects a gain outside the supported range.
    pub fn check_gain(&self, gain: f64) -> Result<()> {
        check_range("gain", gain, &self.gain, "dB")
    }

    /// Rejects an antenna not available in `direction`.
    pub fn check_antenna(&self, direction: StreamDirection, antenna: &str) -> Result<()> {
        let valid = self.antennas(direction);
        if valid.iter().any(|a| a == antenna) {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "antenna {antenna:?} not available for {direction} on {} (valid: {})",
                self.name,
                valid.join(", ")
            )))
        }
    }

    /// Checks every field of `settings`.
    pub fn check(&self, direction: StreamDirection, settings: &DeviceSettings) -> Result<()> {
        self.check_sample_rate(settings.sample_rate)?;
        self.check_center_freq(settings.center_freq)?;
        self.check_gain(settings.gain)?;
        self.check_antenna(direction, &settings.antenna)
    }
}

fn check_range(what: &str, value: f64, range: &RangeInclusive<f64>, unit: &str) -> Result<()> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{what} {value} {unit} outside supported range {}..={} {unit}",
            range.start(),
            range.end()
        )))
    }
}

/// Wakeable stop flag shared between a controller and a blocking I/O call.
///
/// `trigger()` is sticky: once set, every current and future wait returns
/// immediately until [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Interrupt {
    /// Creates an untriggered interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter.
    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Returns true once triggered.
    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the flag.
    pub fn reset(&self) {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Sleeps up to `timeout`, returning early (with `true`) if triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Blocks until triggered.
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = cvar
            .wait_while(guard, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Hot-swappable settings snapshot.
///
/// Writers publish a whole new snapshot through `ArcSwap`; the I/O thread
/// loads it once per submission and reapplies only when the pointer moved.
/// Readers never see half of an update and never take a lock.
#[derive(Debug)]
pub struct HotSettings {
    current: ArcSwap<DeviceSettings>,
}

impl HotSettings {
    /// Wraps the initial settings.
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<DeviceSettings> {
        self.current.load_full()
    }

    /// Publishes a modified copy of the current snapshot.
    ///
    /// Concurrent writers each see the other's change (`rcu` retries).
    pub fn update(&self, modify: impl Fn(&mut DeviceSettings)) {
        self.current.rcu(|current| {
            let mut next = DeviceSettings::clone(current);
            modify(&mut next);
            next
        });
    }
}

/// Vendor driver for one radio stream.
///
/// All methods run on the endpoint's I/O thread. `receive` and `transmit`
/// may block waiting for hardware but must return (possibly with a short
/// count) promptly after `interrupt` fires.
pub trait RadioDriver: Send {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Parameter ranges of this device.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Acquires the streaming session.
    ///
    /// Returns [`Error::DeviceUnavailable`] when the hardware is absent or busy.
    fn open(&mut self, direction: StreamDirection, settings: &DeviceSettings) -> Result<()>;

    /// Applies a new settings snapshot between submissions.
    fn apply(&mut self, settings: &DeviceSettings) -> Result<()>;

    /// Fills `buf` with received samples; returns how many were written.
    fn receive(&mut self, buf: &mut [Complex32], interrupt: &Interrupt) -> Result<usize>;

    /// Submits `buf` for transmission; returns how many were accepted.
    fn transmit(&mut self, buf: &[Complex32], interrupt: &Interrupt) -> Result<usize>;

    /// Releases the streaming session. Called once, even after a failure.
    fn close(&mut self);
}
