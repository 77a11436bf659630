//! Device endpoints: the graph's boundary with radio hardware.
//!
//! A [`DeviceEndpoint`] owns a [`RadioDriver`] and, while started, a dedicated
//! I/O thread. The thread and the scheduler meet at a [`SharedRing`]:
//!
//! ```text
//! receive:   driver.receive ─push──▶ ring ──▶ RadioSource ──▶ graph
//! transmit:  graph ──▶ RadioSink ──▶ ring ─pull_or_zero──▶ driver.transmit
//! ```
//!
//! A transmitting endpoint never waits for the graph: when the ring runs dry
//! the submission is zero-padded and an underrun is counted. A receiving
//! endpoint never waits either: samples that do not fit are dropped and
//! counted as an overrun.
//!
//! Parameters change through an [`EndpointHandle`] at any time. Every change
//! is validated against the device's [`DeviceCapabilities`] first and then
//! published as a whole new [`DeviceSettings`] snapshot, which the I/O thread
//! picks up between submissions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use onda_core::block::{COMPLEX, NONE, expect_ports};
use onda_core::{Block, BlockError, Complex32, SampleKind, Samples, SharedRing};

use crate::device::{
    DeviceCapabilities, DeviceSettings, HotSettings, Interrupt, RadioDriver, StreamDirection,
};
use crate::{Error, Result};

/// Samples per hardware submission.
pub const DEFAULT_CHUNK: usize = 4096;
/// Capacity of the ring between the I/O thread and the graph.
pub const DEFAULT_RING: usize = 65536;

/// First fatal error reported by an I/O thread.
#[derive(Debug, Default)]
pub(crate) struct FailureSlot {
    failed: AtomicBool,
    message: Mutex<Option<String>>,
}

impl FailureSlot {
    pub(crate) fn record(&self, message: String) {
        let mut slot = self.message.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message);
        }
        self.failed.store(true, Ordering::Release);
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn message(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cloneable parameter control for a running or idle endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    label: Arc<str>,
    direction: StreamDirection,
    capabilities: Arc<DeviceCapabilities>,
    settings: Arc<HotSettings>,
}

impl EndpointHandle {
    /// Endpoint label, e.g. `"tx"`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stream direction of the endpoint.
    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> DeviceSettings {
        DeviceSettings::clone(&self.settings.snapshot())
    }

    /// Changes the hardware sample rate.
    ///
    /// Graph rates are fixed at validation, so on a running graph this only
    /// retunes the converter; the chain's own rates do not follow.
    pub fn set_sample_rate(&self, rate: f64) -> Result<()> {
        self.capabilities.check_sample_rate(rate)?;
        self.settings.update(|s| s.sample_rate = rate);
        tracing::info!(endpoint = %self.label, sample_rate = rate, "sample rate set");
        Ok(())
    }

    /// Retunes the RF center frequency.
    pub fn set_center_freq(&self, freq: f64) -> Result<()> {
        self.capabilities.check_center_freq(freq)?;
        self.settings.update(|s| s.center_freq = freq);
        tracing::info!(endpoint = %self.label, center_freq = freq, "center frequency set");
        Ok(())
    }

    /// Changes the gain in dB.
    pub fn set_gain(&self, gain: f64) -> Result<()> {
        self.capabilities.check_gain(gain)?;
        self.settings.update(|s| s.gain = gain);
        tracing::info!(endpoint = %self.label, gain, "gain set");
        Ok(())
    }

    /// Selects an antenna port.
    pub fn set_antenna(&self, antenna: &str) -> Result<()> {
        self.capabilities.check_antenna(self.direction, antenna)?;
        self.settings.update(|s| s.antenna = antenna.to_string());
        tracing::info!(endpoint = %self.label, antenna, "antenna set");
        Ok(())
    }
}

/// Radio source or sink with its own I/O thread.
pub struct DeviceEndpoint {
    handle: EndpointHandle,
    ring: SharedRing<Complex32>,
    interrupt: Interrupt,
    failure: Arc<FailureSlot>,
    submitted: Arc<AtomicU64>,
    chunk: usize,
    driver: Option<Box<dyn RadioDriver>>,
    worker: Option<JoinHandle<Box<dyn RadioDriver>>>,
}

impl std::fmt::Debug for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEndpoint")
            .field("label", &self.handle.label)
            .field("direction", &self.handle.direction)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DeviceEndpoint {
    /// Creates a receiving endpoint (hardware → graph).
    ///
    /// Settings are checked against the driver's capabilities here, so a bad
    /// configuration fails before anything streams.
    pub fn source(label: &str, driver: Box<dyn RadioDriver>, settings: DeviceSettings) -> Result<Self> {
        Self::new(label, StreamDirection::Receive, driver, settings)
    }

    /// Creates a transmitting endpoint (graph → hardware).
    pub fn sink(label: &str, driver: Box<dyn RadioDriver>, settings: DeviceSettings) -> Result<Self> {
        Self::new(label, StreamDirection::Transmit, driver, settings)
    }

    fn new(
        label: &str,
        direction: StreamDirection,
        driver: Box<dyn RadioDriver>,
        settings: DeviceSettings,
    ) -> Result<Self> {
        let capabilities = driver.capabilities().clone();
        capabilities.check(direction, &settings)?;
        Ok(Self {
            handle: EndpointHandle {
                label: Arc::from(label),
                direction,
                capabilities: Arc::new(capabilities),
                settings: Arc::new(HotSettings::new(settings)),
            },
            ring: SharedRing::with_capacity(DEFAULT_RING),
            interrupt: Interrupt::new(),
            failure: Arc::new(FailureSlot::default()),
            submitted: Arc::new(AtomicU64::new(0)),
            chunk: DEFAULT_CHUNK,
            driver: Some(driver),
            worker: None,
        })
    }

    /// Overrides the submission size and ring capacity.
    ///
    /// The ring is replaced, so call this before creating the graph block.
    pub fn with_buffers(mut self, chunk: usize, ring_capacity: usize) -> Self {
        self.chunk = chunk.max(1);
        self.ring = SharedRing::with_capacity(ring_capacity.max(self.chunk));
        self
    }

    /// Endpoint label.
    pub fn label(&self) -> &str {
        self.handle.label()
    }

    /// Stream direction.
    pub fn direction(&self) -> StreamDirection {
        self.handle.direction
    }

    /// Parameter control usable from any thread.
    pub fn handle(&self) -> EndpointHandle {
        self.handle.clone()
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> DeviceSettings {
        self.handle.settings()
    }

    /// Graph block that delivers received samples. Receive endpoints only.
    pub fn source_block(&self) -> Result<RadioSource> {
        self.require(StreamDirection::Receive)?;
        Ok(RadioSource {
            ring: self.ring.clone(),
            sample_rate: self.handle.settings.snapshot().sample_rate,
        })
    }

    /// Graph block that queues samples for transmission. Transmit endpoints only.
    pub fn sink_block(&self) -> Result<RadioSink> {
        self.require(StreamDirection::Transmit)?;
        Ok(RadioSink {
            ring: self.ring.clone(),
            sample_rate: self.handle.settings.snapshot().sample_rate,
        })
    }

    fn require(&self, direction: StreamDirection) -> Result<()> {
        if self.handle.direction == direction {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "endpoint {} streams {}, not {direction}",
                self.label(),
                self.handle.direction
            )))
        }
    }

    /// True while the I/O thread exists.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Message of the fatal I/O error, if one occurred.
    pub fn failure(&self) -> Option<String> {
        self.failure.message()
    }

    pub(crate) fn failure_slot(&self) -> Arc<FailureSlot> {
        Arc::clone(&self.failure)
    }

    pub(crate) fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub(crate) fn ring(&self) -> SharedRing<Complex32> {
        self.ring.clone()
    }

    pub(crate) fn streamed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.submitted)
    }

    /// Transmit submissions that had to be zero-padded.
    pub fn underruns(&self) -> u64 {
        self.ring.underruns()
    }

    /// Receive submissions that did not fit in the ring.
    pub fn overruns(&self) -> u64 {
        self.ring.overruns()
    }

    /// Samples exchanged with the driver so far.
    pub fn samples_streamed(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Opens the driver and spawns the I/O thread.
    pub fn start(&mut self) -> Result<()> {
        let Some(mut driver) = self.driver.take() else {
            return Err(Error::InvalidState(format!(
                "endpoint {} is already streaming",
                self.label()
            )));
        };

        let snapshot = self.handle.settings.snapshot();
        let opened = self
            .handle
            .capabilities
            .check(self.handle.direction, &snapshot)
            .and_then(|()| driver.open(self.handle.direction, &snapshot));
        if let Err(e) = opened {
            self.driver = Some(driver);
            return Err(e);
        }

        self.interrupt.reset();
        let ctx = IoContext {
            label: Arc::clone(&self.handle.label),
            direction: self.handle.direction,
            settings: Arc::clone(&self.handle.settings),
            ring: self.ring.clone(),
            interrupt: self.interrupt.clone(),
            failure: Arc::clone(&self.failure),
            submitted: Arc::clone(&self.submitted),
            chunk: self.chunk,
            applied: Arc::clone(&snapshot),
        };
        let spawned = thread::Builder::new()
            .name(format!("onda-{}", self.label()))
            .spawn(move || io_thread(driver, ctx));
        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                tracing::info!(
                    endpoint = %self.label(),
                    direction = %self.handle.direction,
                    sample_rate = snapshot.sample_rate,
                    center_freq = snapshot.center_freq,
                    antenna = %snapshot.antenna,
                    format = snapshot.cpu_format.as_str(),
                    "device stream started"
                );
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Waits until the transmit ring is empty, `timeout` passes or `halt` fires.
    ///
    /// Returns true if the ring drained.
    pub fn wait_drained(&self, timeout: Duration, halt: &Interrupt) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.ring.available() == 0 {
                return true;
            }
            if self.failure.is_failed() || !self.is_running() || Instant::now() >= deadline {
                return false;
            }
            if halt.wait_timeout(Duration::from_millis(2)) {
                return false;
            }
        }
    }

    /// Interrupts any blocked I/O, joins the I/O thread and releases the device.
    ///
    /// Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        self.interrupt.trigger();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(driver) => {
                self.driver = Some(driver);
                tracing::info!(
                    endpoint = %self.label(),
                    underruns = self.ring.underruns(),
                    overruns = self.ring.overruns(),
                    "device stream stopped"
                );
                Ok(())
            }
            Err(_) => Err(Error::Device(format!(
                "I/O thread of endpoint {} panicked",
                self.label()
            ))),
        }
    }
}

impl Drop for DeviceEndpoint {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

struct IoContext {
    label: Arc<str>,
    direction: StreamDirection,
    settings: Arc<HotSettings>,
    ring: SharedRing<Complex32>,
    interrupt: Interrupt,
    failure: Arc<FailureSlot>,
    submitted: Arc<AtomicU64>,
    chunk: usize,
    applied: Arc<DeviceSettings>,
}

fn io_thread(mut driver: Box<dyn RadioDriver>, mut ctx: IoContext) -> Box<dyn RadioDriver> {
    if let Err(e) = stream(driver.as_mut(), &mut ctx) {
        tracing::error!(endpoint = %ctx.label, device = driver.name(), error = %e, "device failure");
        ctx.failure.record(e.to_string());
    }
    driver.close();
    driver
}

fn stream(driver: &mut dyn RadioDriver, ctx: &mut IoContext) -> Result<()> {
    let mut buf = vec![Complex32::default(); ctx.chunk];
    let mut underruns = ctx.ring.underruns();
    let mut overruns = ctx.ring.overruns();

    while !ctx.interrupt.is_triggered() {
        let snapshot = ctx.settings.snapshot();
        if !Arc::ptr_eq(&snapshot, &ctx.applied) {
            driver.apply(&snapshot)?;
            tracing::debug!(
                endpoint = %ctx.label,
                center_freq = snapshot.center_freq,
                gain = snapshot.gain,
                antenna = %snapshot.antenna,
                "settings applied"
            );
            ctx.applied = snapshot;
        }

        let moved = match ctx.direction {
            StreamDirection::Receive => {
                let n = driver.receive(&mut buf, &ctx.interrupt)?;
                ctx.ring.push(&buf[..n]);
                n
            }
            StreamDirection::Transmit => {
                ctx.ring.pull_or_zero(&mut buf);
                let mut sent = 0;
                while sent < buf.len() {
                    let n = driver.transmit(&buf[sent..], &ctx.interrupt)?;
                    if n == 0 {
                        break;
                    }
                    sent += n;
                }
                sent
            }
        };
        ctx.submitted.fetch_add(moved as u64, Ordering::Relaxed);

        let now_under = ctx.ring.underruns();
        if now_under != underruns {
            if underruns == 0 {
                tracing::warn!(endpoint = %ctx.label, "transmit underrun, padding with zeros");
            } else {
                tracing::trace!(endpoint = %ctx.label, underruns = now_under, "underrun");
            }
            underruns = now_under;
        }
        let now_over = ctx.ring.overruns();
        if now_over != overruns {
            tracing::warn!(
                endpoint = %ctx.label,
                overruns = now_over,
                dropped = ctx.ring.dropped(),
                "receive overrun, samples dropped"
            );
            overruns = now_over;
        }
    }
    Ok(())
}

/// Graph source fed by a receiving endpoint.
#[derive(Debug)]
pub struct RadioSource {
    ring: SharedRing<Complex32>,
    sample_rate: f64,
}

impl Block for RadioSource {
    fn name(&self) -> &str {
        "radio_source"
    }

    fn input_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn output_ports(&self) -> &[SampleKind] {
        COMPLEX
    }

    fn source_rate(&self) -> Option<f64> {
        Some(self.sample_rate)
    }

    fn ready(&self) -> Option<usize> {
        Some(self.ring.available())
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> std::result::Result<(), BlockError> {
        expect_ports(inputs, outputs, 0, 1)?;
        let out = outputs[0].slice_mut::<Complex32>()?;
        let got = self.ring.pop_into(out);
        if got != out.len() {
            return Err(BlockError::RateViolation {
                expected: out.len(),
                produced: got,
            });
        }
        Ok(())
    }
}

/// Graph sink draining into a transmitting endpoint.
#[derive(Debug)]
pub struct RadioSink {
    ring: SharedRing<Complex32>,
    sample_rate: f64,
}

impl Block for RadioSink {
    fn name(&self) -> &str {
        "radio_sink"
    }

    fn input_ports(&self) -> &[SampleKind] {
        COMPLEX
    }

    fn output_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn expected_input_rate(&self) -> Option<f64> {
        Some(self.sample_rate)
    }

    fn ready(&self) -> Option<usize> {
        Some(self.ring.free())
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> std::result::Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 0)?;
        let input = inputs[0].slice::<Complex32>()?;
        let written = self.ring.write(input);
        if written != input.len() {
            return Err(BlockError::RateViolation {
                expected: input.len(),
                produced: written,
            });
        }
        Ok(())
    }
}
