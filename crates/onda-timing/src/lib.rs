//! Seqlock playback-timing channel.
//!
//! The realtime output callback publishes playback timing (frames played,
//! ring read position, server monotonic time, underrun count) into a small
//! shared record once per callback. Arbitrary non-realtime readers poll it.
//! Neither side may block the other:
//!
//! - the producer never takes a lock and never waits on readers
//! - readers never take a lock; a torn read is detected and retried a
//!   bounded number of times, then reported as "no snapshot available"
//!
//! The protocol is a classic optimistic-concurrency seqlock: the producer
//! increments a sequence counter before and after writing the fields, so
//! the counter is odd exactly while an update is in flight. A reader
//! accepts a snapshot only if the sequence was even and unchanged across
//! its field reads.
//!
//! The record lives in an externally allocated shared region, modelled here
//! as a `u64` word array ([`TimingRecordView`]); the embedding maps the
//! shared memory and hands out the atomic view. Attach validates a magic
//! constant and the region size before any field is trusted.

pub mod record;

pub use record::{
    AttachError, TIMING_MAGIC, TIMING_RECORD_WORDS, TimingConsumer, TimingProducer,
    TimingRecordView, TimingSnapshot, allocate_region,
};
