//! Sample rings for graph edges and device boundaries.
//!
//! [`SampleBuffer`] is the fixed-capacity circular buffer every edge owns. Writes
//! are partial when the ring is full (the shortfall is the backpressure signal),
//! reads are split into a non-destructive peek ([`SampleBuffer::read`]) and an
//! explicit [`SampleBuffer::consume`], so a block can look at history before
//! committing to it.
//!
//! [`SharedRing`] wraps a `SampleBuffer` for use across threads. It sits between
//! the scheduler and a device I/O thread (or a display), and keeps the underrun
//! and overrun counters those boundaries report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Fixed-capacity single-producer/single-consumer ring of samples.
///
/// # Invariants
///
/// - `len <= capacity`: the write cursor never laps the read cursor
/// - `write` never blocks and never overwrites unread samples
#[derive(Debug, Clone)]
pub struct SampleBuffer<T> {
    data: Vec<T>,
    read_pos: usize,
    len: usize,
}

impl<T: Copy + Default> SampleBuffer<T> {
    /// Creates an empty ring holding up to `capacity` samples (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity.max(1)],
            read_pos: 0,
            len: 0,
        }
    }

    /// Total number of samples the ring can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of samples waiting to be read.
    pub fn available(&self) -> usize {
        self.len
    }

    /// Number of samples that can be written without loss.
    pub fn free(&self) -> usize {
        self.data.len() - self.len
    }

    /// Returns true when no samples are waiting.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true when a write would store nothing.
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Appends as many of `samples` as fit and returns how many were stored.
    ///
    /// A return value smaller than `samples.len()` means the ring is full; the
    /// caller decides whether to retry later or drop the remainder.
    pub fn write(&mut self, samples: &[T]) -> usize {
        let cap = self.data.len();
        let count = samples.len().min(self.free());
        let write_pos = (self.read_pos + self.len) % cap;
        let first = count.min(cap - write_pos);
        self.data[write_pos..write_pos + first].copy_from_slice(&samples[..first]);
        self.data[..count - first].copy_from_slice(&samples[first..count]);
        self.len += count;
        count
    }

    /// Peeks at up to `max_count` samples without removing them.
    ///
    /// Returns the view as two slices; the second is non-empty only when the
    /// readable region wraps past the end of storage.
    pub fn read(&self, max_count: usize) -> (&[T], &[T]) {
        let cap = self.data.len();
        let count = max_count.min(self.len);
        let first = count.min(cap - self.read_pos);
        (
            &self.data[self.read_pos..self.read_pos + first],
            &self.data[..count - first],
        )
    }

    /// Copies up to `out.len()` samples into `out` without consuming them.
    pub fn read_into(&self, out: &mut [T]) -> usize {
        let (head, tail) = self.read(out.len());
        out[..head.len()].copy_from_slice(head);
        out[head.len()..head.len() + tail.len()].copy_from_slice(tail);
        head.len() + tail.len()
    }

    /// Advances the read cursor by `count` samples (clamped to what is available).
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len);
        self.read_pos = (self.read_pos + count) % self.data.len();
        self.len -= count;
        if self.len == 0 {
            self.read_pos = 0;
        }
    }

    /// Copies and consumes up to `out.len()` samples.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        let n = self.read_into(out);
        self.consume(n);
        n
    }

    /// Discards every buffered sample.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }
}

struct RingInner<T> {
    ring: Mutex<SampleBuffer<T>>,
    underruns: AtomicU64,
    overruns: AtomicU64,
    dropped: AtomicU64,
}

/// A [`SampleBuffer`] shared between two threads, with boundary accounting.
///
/// Cloning yields another handle to the same ring. The lock is only held for
/// the duration of a copy, never across device I/O.
pub struct SharedRing<T> {
    inner: Arc<RingInner<T>>,
}

impl<T> Clone for SharedRing<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for SharedRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRing")
            .field("underruns", &self.inner.underruns.load(Ordering::Relaxed))
            .field("overruns", &self.inner.overruns.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Copy + Default> SharedRing<T> {
    /// Creates a shared ring with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RingInner {
                ring: Mutex::new(SampleBuffer::with_capacity(capacity)),
                underruns: AtomicU64::new(0),
                overruns: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SampleBuffer<T>> {
        self.inner.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity of the underlying ring.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Samples currently buffered.
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Free space in samples.
    pub fn free(&self) -> usize {
        self.lock().free()
    }

    /// Writes what fits and returns the count, without touching the counters.
    ///
    /// Used by producers that respect backpressure and retry the remainder.
    pub fn write(&self, samples: &[T]) -> usize {
        self.lock().write(samples)
    }

    /// Writes what fits and drops the rest, counting one overrun per short write.
    ///
    /// Used by real-time producers (a receiving radio, a microphone callback)
    /// that cannot wait for space.
    pub fn push(&self, samples: &[T]) -> usize {
        let written = self.lock().write(samples);
        if written < samples.len() {
            self.inner.overruns.fetch_add(1, Ordering::Relaxed);
            self.inner
                .dropped
                .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }

    /// Reads and consumes up to `out.len()` samples; never zero-fills.
    pub fn pop_into(&self, out: &mut [T]) -> usize {
        self.lock().pop_into(out)
    }

    /// Fills `out` completely, padding with `T::default()` on underrun.
    ///
    /// Returns the number of real samples delivered. A short pull counts as a
    /// single underrun regardless of how many samples were missing.
    pub fn pull_or_zero(&self, out: &mut [T]) -> usize {
        let got = self.lock().pop_into(out);
        if got < out.len() {
            out[got..].fill(T::default());
            self.inner.underruns.fetch_add(1, Ordering::Relaxed);
        }
        got
    }

    /// Best-effort write for read-only taps.
    ///
    /// Never waits on the lock. When the ring is full the oldest samples are
    /// discarded so the tap always holds the most recent data.
    pub fn offer(&self, samples: &[T]) {
        let Ok(mut ring) = self.inner.ring.try_lock() else {
            self.inner
                .dropped
                .fetch_add(samples.len() as u64, Ordering::Relaxed);
            return;
        };
        let cap = ring.capacity();
        let samples = &samples[samples.len().saturating_sub(cap)..];
        let excess = samples.len().saturating_sub(ring.free());
        ring.consume(excess);
        ring.write(samples);
    }

    /// Copies the newest `out.len()` samples (or fewer) and clears the ring.
    pub fn drain_latest(&self, out: &mut [T]) -> usize {
        let mut ring = self.lock();
        let skip = ring.available().saturating_sub(out.len());
        ring.consume(skip);
        let n = ring.pop_into(out);
        ring.clear();
        n
    }

    /// Discards every buffered sample.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pulls that had to be zero-padded.
    pub fn underruns(&self) -> u64 {
        self.inner.underruns.load(Ordering::Relaxed)
    }

    /// Number of pushes that could not be stored in full.
    pub fn overruns(&self) -> u64 {
        self.inner.overruns.load(Ordering::Relaxed)
    }

    /// Total samples discarded by overruns and contended taps.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_write_when_full() {
        let mut ring = SampleBuffer::<f32>::with_capacity(4);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.write(&[4.0, 5.0]), 1);
        assert!(ring.is_full());
        assert_eq!(ring.write(&[6.0]), 0);
    }

    #[test]
    fn read_is_non_destructive() {
        let mut ring = SampleBuffer::<f32>::with_capacity(8);
        ring.write(&[1.0, 2.0, 3.0]);
        let (head, tail) = ring.read(2);
        assert_eq!(head, &[1.0, 2.0]);
        assert!(tail.is_empty());
        assert_eq!(ring.available(), 3);
        ring.consume(2);
        assert_eq!(ring.read(8).0, &[3.0]);
    }

    #[test]
    fn wrapped_view_splits_in_two() {
        let mut ring = SampleBuffer::<i32>::with_capacity(4);
        ring.write(&[1, 2, 3]);
        ring.consume(2);
        ring.write(&[4, 5, 6]);
        let (head, tail) = ring.read(4);
        assert_eq!(head, &[3, 4]);
        assert_eq!(tail, &[5, 6]);
    }

    #[test]
    fn consume_clamps_to_available() {
        let mut ring = SampleBuffer::<f32>::with_capacity(4);
        ring.write(&[1.0]);
        ring.consume(10);
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 4);
    }

    #[test]
    fn pull_or_zero_counts_one_underrun() {
        let ring = SharedRing::<f32>::with_capacity(16);
        ring.write(&[0.5, 0.25]);
        let mut out = [9.0f32; 6];
        assert_eq!(ring.pull_or_zero(&mut out), 2);
        assert_eq!(out, [0.5, 0.25, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(ring.underruns(), 1);
    }

    #[test]
    fn push_counts_overrun_and_dropped() {
        let ring = SharedRing::<f32>::with_capacity(2);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0, 4.0]), 2);
        assert_eq!(ring.overruns(), 1);
        assert_eq!(ring.dropped(), 2);
    }

    #[test]
    fn offer_keeps_newest_samples() {
        let tap = SharedRing::<i32>::with_capacity(4);
        tap.offer(&[1, 2, 3]);
        tap.offer(&[4, 5, 6]);
        let mut out = [0; 4];
        assert_eq!(tap.pop_into(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn offer_larger_than_capacity() {
        let tap = SharedRing::<i32>::with_capacity(3);
        tap.offer(&[1, 2, 3, 4, 5]);
        let mut out = [0; 3];
        tap.pop_into(&mut out);
        assert_eq!(out, [3, 4, 5]);
    }

    #[test]
    fn drain_latest_returns_tail() {
        let tap = SharedRing::<i32>::with_capacity(8);
        tap.offer(&[1, 2, 3, 4, 5]);
        let mut out = [0; 2];
        assert_eq!(tap.drain_latest(&mut out), 2);
        assert_eq!(out, [4, 5]);
        assert_eq!(tap.available(), 0);
    }

    #[test]
    fn debug_shows_counters() {
        let ring = SharedRing::<f32>::with_capacity(2);
        let mut out = [1.0; 4];
        ring.pull_or_zero(&mut out);
        let shown = format!("{ring:?}");
        assert!(shown.contains("underruns: 1"), "{shown}");
        assert!(shown.contains("overruns: 0"), "{shown}");
    }
}
