//! Spectrum Publisher
//!
//! Bounded, lossy hand-off of spectrum snapshots from the audio thread to a
//! visualization consumer.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────── pool (free buffers) ◀───────────┐
//!              ▼                                             │
//! audio thread: try_publish ──▶ queue (capacity N) ──▶ try_take ──▶ SpectrumSnapshot
//!                                                                  (returns its buffer
//!                                                                   to the pool on drop)
//! ```
//!
//! Both queues are bounded crossbeam channels; every operation is `try_*`, so
//! neither side ever blocks. All buffers are allocated up front, so
//! publishing never allocates.
//!
//! Overload policy: when the queue is full the NEWEST snapshot is dropped and
//! the queued ones are kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::fft::rfft_frequencies;

/// Buffers beyond the queue capacity: one being read by the consumer, one
/// being filled by the producer
const POOL_HEADROOM: usize = 2;

/// One block's magnitude spectrum
///
/// Dropping the snapshot hands its buffer back to the channel it came from.
pub struct SpectrumSnapshot {
    frequencies: Arc<[f32]>,
    magnitudes_db: Vec<f32>,
    pool: Sender<Vec<f32>>,
}

impl SpectrumSnapshot {
    /// Bin frequencies in Hz, ascending
    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    /// Magnitude in dB, parallel to [`Self::frequencies`]
    pub fn magnitudes_db(&self) -> &[f32] {
        &self.magnitudes_db
    }

    pub fn len(&self) -> usize {
        self.magnitudes_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes_db.is_empty()
    }

    /// Loudest bin as `(frequency_hz, magnitude_db)`
    pub fn peak(&self) -> Option<(f32, f32)> {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes_db.iter().copied())
            .fold(None, |best, (f, db)| match best {
                Some((_, best_db)) if best_db >= db => best,
                _ => Some((f, db)),
            })
    }

    /// Bins whose frequency lies in `[low_hz, high_hz]`
    pub fn bins_between(&self, low_hz: f32, high_hz: f32) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes_db.iter().copied())
            .filter(move |(f, _)| (low_hz..=high_hz).contains(f))
    }

    /// Copy out `(frequencies, magnitudes_db)` for consumers that keep data
    /// beyond the snapshot's lifetime
    pub fn to_vecs(&self) -> (Vec<f32>, Vec<f32>) {
        (self.frequencies.to_vec(), self.magnitudes_db.clone())
    }
}

impl std::fmt::Debug for SpectrumSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumSnapshot")
            .field("bins", &self.len())
            .field("peak", &self.peak())
            .finish()
    }
}

impl Drop for SpectrumSnapshot {
    fn drop(&mut self) {
        // Pool is sized for every buffer, so this only fails once the
        // channel itself is gone
        let _ = self.pool.try_send(std::mem::take(&mut self.magnitudes_db));
    }
}

/// Bounded non-blocking FIFO of spectrum snapshots
pub struct SpectrumChannel {
    frequencies: Arc<[f32]>,
    queue_tx: Sender<Vec<f32>>,
    queue_rx: Receiver<Vec<f32>>,
    pool_tx: Sender<Vec<f32>>,
    pool_rx: Receiver<Vec<f32>>,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl SpectrumChannel {
    /// Create a channel holding up to `capacity` snapshots over the given
    /// bin frequencies. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize, frequencies: Vec<f32>) -> Self {
        let capacity = capacity.max(1);
        let pool_size = capacity + POOL_HEADROOM;
        let bins = frequencies.len();

        let (queue_tx, queue_rx) = bounded(capacity);
        let (pool_tx, pool_rx) = bounded(pool_size);
        for _ in 0..pool_size {
            // Cannot fail: the pool channel was sized for exactly these buffers
            let _ = pool_tx.try_send(vec![0.0; bins]);
        }

        Self {
            frequencies: frequencies.into(),
            queue_tx,
            queue_rx,
            pool_tx,
            pool_rx,
            capacity,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Channel for blocks of `block_size` frames at `sample_rate`
    pub fn for_block(capacity: usize, block_size: usize, sample_rate: f64) -> Self {
        Self::new(capacity, rfft_frequencies(block_size, sample_rate))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bins per snapshot
    pub fn bin_count(&self) -> usize {
        self.frequencies.len()
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    /// Snapshots currently queued
    pub fn len(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue_rx.is_empty()
    }

    /// Total snapshots accepted
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total snapshots dropped because the queue or pool was exhausted
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueue a copy of `magnitudes_db`, or drop it if the queue is full.
    ///
    /// Returns `true` if the snapshot was queued. A slice whose length is not
    /// [`Self::bin_count`] is dropped.
    ///
    /// # Real-time Safety
    /// Never blocks and never allocates.
    pub fn try_publish(&self, magnitudes_db: &[f32]) -> bool {
        if magnitudes_db.len() != self.bin_count() || self.queue_tx.is_full() {
            return self.drop_one();
        }

        let Ok(mut buffer) = self.pool_rx.try_recv() else {
            // Consumer is holding every spare buffer
            return self.drop_one();
        };
        buffer.copy_from_slice(magnitudes_db);

        match self.queue_tx.try_send(buffer) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                let _ = self.pool_tx.try_send(err.into_inner());
                self.drop_one()
            }
        }
    }

    /// Dequeue the oldest snapshot without blocking
    pub fn try_take(&self) -> Option<SpectrumSnapshot> {
        self.queue_rx.try_recv().ok().map(|buffer| self.wrap(buffer))
    }

    /// Dequeue everything and keep only the newest snapshot
    pub fn take_latest(&self) -> Option<SpectrumSnapshot> {
        let mut latest = None;
        while let Some(snapshot) = self.try_take() {
            latest = Some(snapshot);
        }
        latest
    }

    /// Discard all queued snapshots
    pub fn clear(&self) {
        while self.try_take().is_some() {}
    }

    fn wrap(&self, buffer: Vec<f32>) -> SpectrumSnapshot {
        SpectrumSnapshot {
            frequencies: Arc::clone(&self.frequencies),
            magnitudes_db: buffer,
            pool: self.pool_tx.clone(),
        }
    }

    fn drop_one(&self) -> bool {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }
}

impl std::fmt::Debug for SpectrumChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumChannel")
            .field("capacity", &self.capacity)
            .field("bins", &self.bin_count())
            .field("queued", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}
