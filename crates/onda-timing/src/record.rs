//! Timing record layout and the producer/consumer protocol.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of `u64` words in a timing record.
pub const TIMING_RECORD_WORDS: usize = 6;

/// Magic constant identifying an initialized timing record (`b"onda-tm1"`).
pub const TIMING_MAGIC: u64 = 0x6f6e_6461_2d74_6d31;

/// A borrowed view of the shared word region backing a timing record.
///
/// The embedding allocates the region (typically in shared memory) and
/// hands the atomic view to exactly one producer and any number of
/// consumers.
pub type TimingRecordView<'a> = &'a [AtomicU64];

// Word offsets within the record.
const WORD_MAGIC: usize = 0;
const WORD_SEQUENCE: usize = 1;
const WORD_PLAYED_FRAMES: usize = 2;
const WORD_RING_READ_FRAMES: usize = 3;
const WORD_SERVER_TIME_NS: usize = 4;
const WORD_UNDERRUN_COUNT: usize = 5;

/// Maximum reader attempts before reporting "no snapshot available".
const MAX_SNAPSHOT_ATTEMPTS: usize = 3;

/// Allocates an in-process region sized for one timing record.
///
/// Convenience for tests and single-process embeddings; a multi-process
/// embedding allocates the region in shared memory instead.
pub fn allocate_region() -> Vec<AtomicU64> {
    (0..TIMING_RECORD_WORDS).map(|_| AtomicU64::new(0)).collect()
}

/// Errors validating a timing region at attach time.
///
/// Attach failures are recoverable - the caller reports them and carries
/// on without timing, it never crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    /// The backing region is smaller than one record.
    #[error("timing region too small: need {required} words, got {actual}")]
    RegionTooSmall {
        /// Required word count ([`TIMING_RECORD_WORDS`]).
        required: usize,
        /// Actual word count of the supplied region.
        actual: usize,
    },
    /// The magic word does not identify an initialized record.
    #[error("timing region magic mismatch: expected {expected:#018x}, found {found:#018x}")]
    BadMagic {
        /// The expected magic ([`TIMING_MAGIC`]).
        expected: u64,
        /// The value actually found in word 0.
        found: u64,
    },
}

/// One consistent snapshot of the timing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingSnapshot {
    /// Frames the output device has played for this stream.
    pub device_played_frames: u64,
    /// Cumulative frames consumed from the stream's transport ring.
    pub ring_read_frames: u64,
    /// Server-side monotonic time of the update, in nanoseconds.
    pub server_monotonic_ns: u64,
    /// Cumulative underrun count.
    pub underrun_count: u64,
}

fn check_size(region: TimingRecordView<'_>) -> Result<(), AttachError> {
    if region.len() < TIMING_RECORD_WORDS {
        return Err(AttachError::RegionTooSmall {
            required: TIMING_RECORD_WORDS,
            actual: region.len(),
        });
    }
    Ok(())
}

fn check_magic(region: TimingRecordView<'_>) -> Result<(), AttachError> {
    let found = region[WORD_MAGIC].load(Ordering::Acquire);
    if found != TIMING_MAGIC {
        return Err(AttachError::BadMagic {
            expected: TIMING_MAGIC,
            found,
        });
    }
    Ok(())
}

/// The single realtime writer of a timing record.
///
/// Exactly one producer per record, by protocol; [`publish()`](Self::publish)
/// never blocks and never allocates.
pub struct TimingProducer<'r> {
    words: TimingRecordView<'r>,
}

impl<'r> TimingProducer<'r> {
    /// Initializes a fresh region and attaches to it.
    ///
    /// Zeroes all fields, resets the sequence, and writes the magic last so
    /// that a concurrent attacher never sees the magic before the record is
    /// in a defined state.
    pub fn initialize(region: TimingRecordView<'r>) -> Result<Self, AttachError> {
        check_size(region)?;
        region[WORD_SEQUENCE].store(0, Ordering::Relaxed);
        region[WORD_PLAYED_FRAMES].store(0, Ordering::Relaxed);
        region[WORD_RING_READ_FRAMES].store(0, Ordering::Relaxed);
        region[WORD_SERVER_TIME_NS].store(0, Ordering::Relaxed);
        region[WORD_UNDERRUN_COUNT].store(0, Ordering::Relaxed);
        region[WORD_MAGIC].store(TIMING_MAGIC, Ordering::Release);
        Ok(Self { words: region })
    }

    /// Attaches to an already-initialized region.
    pub fn attach(region: TimingRecordView<'r>) -> Result<Self, AttachError> {
        check_size(region)?;
        check_magic(region)?;
        Ok(Self { words: region })
    }

    /// Publishes one timing update from the realtime callback.
    ///
    /// `device_played_frames` and `server_monotonic_ns` are absolute;
    /// `additional_ring_read_frames` and `additional_underruns` are deltas
    /// accumulated into the stored totals. While the update is in flight
    /// the sequence word is odd, which readers use to discard torn reads.
    pub fn publish(
        &self,
        device_played_frames: u64,
        server_monotonic_ns: u64,
        additional_ring_read_frames: u64,
        additional_underruns: u64,
    ) {
        self.words[WORD_SEQUENCE].fetch_add(1, Ordering::AcqRel);

        let ring_read_frames = self.words[WORD_RING_READ_FRAMES].load(Ordering::Relaxed)
            + additional_ring_read_frames;
        let underrun_count =
            self.words[WORD_UNDERRUN_COUNT].load(Ordering::Relaxed) + additional_underruns;

        self.words[WORD_PLAYED_FRAMES].store(device_played_frames, Ordering::Release);
        self.words[WORD_RING_READ_FRAMES].store(ring_read_frames, Ordering::Release);
        self.words[WORD_SERVER_TIME_NS].store(server_monotonic_ns, Ordering::Release);
        self.words[WORD_UNDERRUN_COUNT].store(underrun_count, Ordering::Release);

        self.words[WORD_SEQUENCE].fetch_add(1, Ordering::Release);
    }
}

/// A non-realtime reader of a timing record.
#[derive(Debug)]
pub struct TimingConsumer<'r> {
    words: TimingRecordView<'r>,
}

impl<'r> TimingConsumer<'r> {
    /// Attaches to an initialized region, validating size and magic.
    pub fn attach(region: TimingRecordView<'r>) -> Result<Self, AttachError> {
        check_size(region)?;
        check_magic(region)?;
        Ok(Self { words: region })
    }

    /// Attempts to read one consistent snapshot.
    ///
    /// Retries up to a small fixed bound when the writer is mid-update or
    /// raced past us; returns `None` when no consistent snapshot could be
    /// taken. Never blocks the writer and never spins unboundedly.
    pub fn try_snapshot(&self) -> Option<TimingSnapshot> {
        for _ in 0..MAX_SNAPSHOT_ATTEMPTS {
            let before = self.words[WORD_SEQUENCE].load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let snapshot = TimingSnapshot {
                device_played_frames: self.words[WORD_PLAYED_FRAMES].load(Ordering::Acquire),
                ring_read_frames: self.words[WORD_RING_READ_FRAMES].load(Ordering::Acquire),
                server_monotonic_ns: self.words[WORD_SERVER_TIME_NS].load(Ordering::Acquire),
                underrun_count: self.words[WORD_UNDERRUN_COUNT].load(Ordering::Acquire),
            };

            let after = self.words[WORD_SEQUENCE].load(Ordering::Acquire);
            if after == before {
                return Some(snapshot);
            }
        }
        None
    }
}
