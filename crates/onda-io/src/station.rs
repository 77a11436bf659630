//! Lifecycle control for a flowgraph and its device endpoints.
//!
//! ```text
//! Configured ──start()──▶ Running ──stop() / failure / sources done──▶ Stopping ──joined──▶ Stopped
//! ```
//!
//! `start()` validates the graph and opens every endpoint before spawning the
//! scheduler thread; any failure there leaves the station `Configured`.
//! `stop()` fires the halt interrupt (which also wakes endpoint threads blocked
//! in hardware I/O), joins the scheduler thread, and returns once every
//! endpoint has released its device. `wait()` blocks until the same point and
//! reports a fatal device failure, if one ended the run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use onda_core::{Complex32, FlowGraph, Scheduler, SchedulerConfig, SharedRing};

use crate::device::{Interrupt, StreamDirection};
use crate::endpoint::{DeviceEndpoint, EndpointHandle, FailureSlot};
use crate::{Error, Result};

/// Scheduler back-off when a tick makes no progress.
const IDLE_WAIT: Duration = Duration::from_millis(1);
/// Idle ticks after the sources finish before leftover samples are abandoned.
const FINISH_GRACE_TICKS: u32 = 200;
/// Default time allowed for transmit rings to empty after the sources finish.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built, not yet started.
    Configured,
    /// Scheduler and endpoint threads are streaming.
    Running,
    /// Halt requested or the run ended; threads are winding down.
    Stopping,
    /// Every thread joined and every device released.
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStats {
    /// Endpoint label.
    pub label: String,
    /// Zero-padded transmit submissions.
    pub underruns: u64,
    /// Receive submissions that overflowed.
    pub overruns: u64,
    /// Samples exchanged with the driver.
    pub streamed: u64,
}

/// Snapshot of run counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Lifecycle state at the time of the snapshot.
    pub state: State,
    /// Scheduler ticks executed.
    pub ticks: u64,
    /// Per-endpoint counters.
    pub endpoints: Vec<EndpointStats>,
}

struct Meter {
    label: String,
    ring: SharedRing<Complex32>,
    streamed: Arc<AtomicU64>,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    halt: Interrupt,
    interrupts: Mutex<Vec<Interrupt>>,
    failure: Mutex<Option<String>>,
    ticks: AtomicU64,
    meters: Mutex<Vec<Meter>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn set_state(&self, next: State) {
        *lock(&self.state) = next;
        self.changed.notify_all();
    }

    fn record_failure(&self, message: String) {
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(message);
        }
    }

    /// Moves a running station to `Stopping` and wakes everything blocked.
    fn request_stop(&self) {
        {
            let mut state = lock(&self.state);
            if *state == State::Running {
                *state = State::Stopping;
            }
        }
        self.halt.trigger();
        for interrupt in lock(&self.interrupts).iter() {
            interrupt.trigger();
        }
        self.changed.notify_all();
    }
}

/// Cloneable, non-blocking stop trigger for signal handlers and other threads.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Requests a halt without waiting for it. Safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle").finish_non_exhaustive()
    }
}

struct Pending {
    graph: FlowGraph,
    endpoints: Vec<DeviceEndpoint>,
}

/// A flowgraph plus the device endpoints it streams through.
///
/// Every method takes `&self`, so a station can be shared (e.g. in an `Arc`)
/// between a thread that waits and one that stops it.
pub struct Station {
    shared: Arc<Shared>,
    pending: Mutex<Option<Pending>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    handles: Vec<EndpointHandle>,
    config: SchedulerConfig,
    drain_timeout: Duration,
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Station")
            .field("state", &self.state())
            .field("endpoints", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl Station {
    /// Wraps a built graph and its endpoints in the `Configured` state.
    pub fn configure(graph: FlowGraph, endpoints: Vec<DeviceEndpoint>) -> Self {
        let handles = endpoints.iter().map(DeviceEndpoint::handle).collect();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Configured),
                changed: Condvar::new(),
                halt: Interrupt::new(),
                interrupts: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
                ticks: AtomicU64::new(0),
                meters: Mutex::new(Vec::new()),
            }),
            pending: Mutex::new(Some(Pending { graph, endpoints })),
            worker: Mutex::new(None),
            handles,
            config: SchedulerConfig::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Overrides scheduler sizing.
    pub fn with_scheduler(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Time allowed for transmit rings to empty once finite sources finish.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        *lock(&self.shared.state)
    }

    /// Parameter handles of every endpoint, in configuration order.
    pub fn endpoints(&self) -> &[EndpointHandle] {
        &self.handles
    }

    /// Handle of the endpoint labeled `label`.
    pub fn endpoint(&self, label: &str) -> Option<&EndpointHandle> {
        self.handles.iter().find(|h| h.label() == label)
    }

    /// Non-blocking stop trigger.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Message of the failure that ended the run, if any.
    pub fn failure(&self) -> Option<String> {
        lock(&self.shared.failure).clone()
    }

    /// Current counters.
    pub fn stats(&self) -> RunStats {
        let endpoints = lock(&self.shared.meters)
            .iter()
            .map(|m| EndpointStats {
                label: m.label.clone(),
                underruns: m.ring.underruns(),
                overruns: m.ring.overruns(),
                streamed: m.streamed.load(Ordering::Relaxed),
            })
            .collect();
        RunStats {
            state: self.state(),
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            endpoints,
        }
    }

    /// Validates, opens every endpoint and starts the scheduler thread.
    ///
    /// On error nothing is left running and the station stays `Configured`.
    pub fn start(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if *state != State::Configured {
            return Err(Error::InvalidState(format!("cannot start a {} station", *state)));
        }
        let mut pending = lock(&self.pending);
        let Some(Pending {
            graph,
            mut endpoints,
        }) = pending.take()
        else {
            return Err(Error::InvalidState("station has no graph".into()));
        };

        if self.config.quantum == 0 {
            *pending = Some(Pending { graph, endpoints });
            return Err(Error::Configuration("scheduler quantum must be non-zero".into()));
        }
        let plan = match graph.validate() {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "flowgraph validation failed");
                *pending = Some(Pending { graph, endpoints });
                return Err(e.into());
            }
        };

        for i in 0..endpoints.len() {
            if let Err(e) = endpoints[i].start() {
                for started in &mut endpoints[..i] {
                    let _ = started.stop();
                }
                *pending = Some(Pending { graph, endpoints });
                return Err(e);
            }
        }

        let scheduler = match graph.into_scheduler(self.config) {
            Ok(s) => s,
            Err(e) => {
                for ep in &mut endpoints {
                    let _ = ep.stop();
                }
                *state = State::Stopped;
                self.shared.changed.notify_all();
                return Err(e.into());
            }
        };

        *lock(&self.shared.interrupts) = endpoints.iter().map(DeviceEndpoint::interrupt).collect();
        *lock(&self.shared.meters) = endpoints
            .iter()
            .map(|ep| Meter {
                label: ep.label().to_string(),
                ring: ep.ring(),
                streamed: ep.streamed_counter(),
            })
            .collect();
        self.shared.halt.reset();

        let shared = Arc::clone(&self.shared);
        let drain = self.drain_timeout;
        let spawned = thread::Builder::new()
            .name("onda-scheduler".into())
            .spawn(move || run_scheduler(scheduler, endpoints, &shared, drain));
        match spawned {
            Ok(worker) => {
                *lock(&self.worker) = Some(worker);
                *state = State::Running;
                self.shared.changed.notify_all();
                tracing::info!(
                    blocks = plan.order().len(),
                    endpoints = self.handles.len(),
                    "station started"
                );
                Ok(())
            }
            Err(e) => {
                *state = State::Stopped;
                self.shared.changed.notify_all();
                Err(Error::Io(e))
            }
        }
    }

    /// Halts the run and returns once every thread is joined.
    ///
    /// Idempotent, and valid in every state: a station that never started
    /// releases its endpoints and moves straight to `Stopped`.
    pub fn stop(&self) -> Result<()> {
        let unstarted = {
            let mut state = lock(&self.shared.state);
            if *state == State::Configured {
                let pending = lock(&self.pending).take();
                if pending.is_some() {
                    *state = State::Stopped;
                    self.shared.changed.notify_all();
                }
                pending
            } else {
                None
            }
        };
        if let Some(mut p) = unstarted {
            for ep in &mut p.endpoints {
                ep.stop()?;
            }
            return Ok(());
        }
        self.shared.request_stop();
        self.finish();
        Ok(())
    }

    /// Blocks until the station is `Stopped`.
    ///
    /// Returns [`Error::Device`] if a device or block failure ended the run.
    /// Idempotent; returns immediately for a station that was never started.
    pub fn wait(&self) -> Result<()> {
        {
            let state = lock(&self.shared.state);
            if *state == State::Configured {
                return Ok(());
            }
            let _state = self
                .shared
                .changed
                .wait_while(state, |s| *s == State::Running)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.finish();
        match self.failure() {
            Some(message) => Err(Error::Device(message)),
            None => Ok(()),
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if the station is still running when the timeout
    /// elapses, `Ok(true)` once it has stopped cleanly.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        {
            let state = lock(&self.shared.state);
            if *state == State::Configured {
                return Ok(true);
            }
            let (state, _) = self
                .shared
                .changed
                .wait_timeout_while(state, timeout, |s| *s == State::Running)
                .unwrap_or_else(PoisonError::into_inner);
            if *state == State::Running {
                return Ok(false);
            }
        }
        self.wait().map(|()| true)
    }

    /// Starts, then waits for the run to end.
    pub fn run(&self) -> Result<()> {
        self.start()?;
        self.wait()
    }

    /// Joins the scheduler thread, or waits for whoever is joining it.
    fn finish(&self) {
        let worker = lock(&self.worker).take();
        match worker {
            Some(worker) => {
                if worker.join().is_err() {
                    self.shared
                        .record_failure("scheduler thread panicked".to_string());
                }
                self.shared.set_state(State::Stopped);
            }
            None => {
                let state = lock(&self.shared.state);
                let _state = self
                    .shared
                    .changed
                    .wait_while(state, |s| *s != State::Stopped && *s != State::Configured)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        if lock(&self.worker).is_some() {
            self.shared.request_stop();
            self.finish();
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Halted,
    Finished,
    Failed,
}

fn run_scheduler(
    mut scheduler: Scheduler,
    mut endpoints: Vec<DeviceEndpoint>,
    shared: &Shared,
    drain: Duration,
) {
    let failures: Vec<(String, Arc<FailureSlot>)> = endpoints
        .iter()
        .map(|ep| (ep.label().to_string(), ep.failure_slot()))
        .collect();
    let outcome = drive(&mut scheduler, &failures, shared);

    if matches!(outcome, Outcome::Finished) {
        for ep in endpoints
            .iter()
            .filter(|ep| ep.direction() == StreamDirection::Transmit)
        {
            if !ep.wait_drained(drain, &shared.halt) {
                tracing::warn!(endpoint = ep.label(), "transmit queue not drained before stop");
            }
        }
    }

    for ep in &mut endpoints {
        if let Err(e) = ep.stop() {
            shared.record_failure(e.to_string());
        }
    }
    // Dropping the blocks flushes file-backed sinks before the run is reported done.
    drop(scheduler);

    {
        let mut state = lock(&shared.state);
        if *state == State::Running {
            *state = State::Stopping;
        }
    }
    shared.changed.notify_all();
    tracing::info!(
        outcome = ?outcome,
        ticks = shared.ticks.load(Ordering::Relaxed),
        "station stopped"
    );
}

fn drive(scheduler: &mut Scheduler, failures: &[(String, Arc<FailureSlot>)], shared: &Shared) -> Outcome {
    let mut idle_after_finish = 0u32;
    loop {
        if shared.halt.is_triggered() {
            return Outcome::Halted;
        }
        if let Some((label, slot)) = failures.iter().find(|(_, slot)| slot.is_failed()) {
            let message = slot
                .message()
                .unwrap_or_else(|| "unknown device failure".to_string());
            shared.record_failure(format!("endpoint {label}: {message}"));
            return Outcome::Failed;
        }

        match scheduler.tick() {
            Ok(report) => {
                shared.ticks.store(scheduler.ticks(), Ordering::Relaxed);
                if report.progressed() {
                    idle_after_finish = 0;
                    continue;
                }
                if scheduler.sources_finished() {
                    let drained = scheduler.edge_status().iter().all(|e| e.available == 0);
                    idle_after_finish += 1;
                    if drained || idle_after_finish >= FINISH_GRACE_TICKS {
                        return Outcome::Finished;
                    }
                }
                shared.halt.wait_timeout(IDLE_WAIT);
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduler failure");
                shared.record_failure(e.to_string());
                return Outcome::Failed;
            }
        }
    }
}
