//! The script-processor host bridge.
//!
//! A script-processor node accumulates render quanta into one
//! `buffer_size` block, then needs a user-level script callback to run
//! synchronously against that block - but the callback may only execute on
//! the control thread, while `process()` runs on the render thread.
//!
//! [`ScriptProcessorHost`] is that bridge. Two implementations:
//!
//! - [`OfflineScriptHost`] - the caller already is the control thread;
//!   callbacks run inline with no cross-thread hop.
//! - [`RealtimeScriptHost`] - the render thread copies the block into a
//!   preallocated per-node request slot, enqueues the node id for the
//!   control thread, and blocks on a condition variable with a bounded
//!   timeout. The control thread drains the queue, runs the callback, and
//!   signals completion. A timeout marks the request stale and yields
//!   silence for that block only - the render thread never waits
//!   unboundedly, and a late completion is discarded.
//!
//! Each request is an immutable record used by exactly one producer and
//! one consumer; no state is shared beyond the slot's lifetime.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::description::NodeId;
use crate::threads::{self, ThreadRole};

/// One script invocation: the accumulated input block and the output block
/// the callback fills in.
pub struct ScriptEvent<'a> {
    /// Time at which the produced block will be played, in seconds.
    pub playback_time: f64,
    /// Frames per channel in this block.
    pub buffer_size: usize,
    /// Planar input samples, one `Vec` of `buffer_size` frames per channel.
    pub input: &'a [Vec<f32>],
    /// Planar output samples, zeroed before the callback runs.
    pub output: &'a mut [Vec<f32>],
}

/// A user-level script callback, invoked once per completed block.
pub type ScriptCallback = Box<dyn FnMut(&mut ScriptEvent<'_>) + Send>;

/// Synchronous block-processing contract between script-processor nodes
/// and their host.
///
/// Callable from any thread; the implementation guarantees the script
/// callback itself executes only on the designated control thread. Returns
/// `false` on any failure (unregistered node, callback panic, timeout) -
/// the caller fills silence and carries on.
pub trait ScriptProcessorHost: Sync {
    /// Processes one completed block for `node_id`.
    ///
    /// `input_channels` and `output_channels` reference caller-owned
    /// storage of `buffer_size` frames per channel.
    fn process_script_processor(
        &self,
        node_id: NodeId,
        playback_time: f64,
        buffer_size: usize,
        input_channels: &[Vec<f32>],
        output_channels: &mut [Vec<f32>],
    ) -> bool;
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn zero_channels(channels: &mut [Vec<f32>]) {
    for channel in channels.iter_mut() {
        channel.fill(0.0);
    }
}

/// Runs a callback with panics contained; a panicking callback counts as a
/// failed block, not a dead engine.
fn run_callback(callback: &mut ScriptCallback, event: &mut ScriptEvent<'_>) -> bool {
    catch_unwind(AssertUnwindSafe(|| callback(event))).is_ok()
}

// ---------------------------------------------------------------------------
// Offline host
// ---------------------------------------------------------------------------

/// Script host for offline rendering: the caller is the control thread and
/// callbacks run inline, synchronously.
#[derive(Default)]
pub struct OfflineScriptHost {
    callbacks: Mutex<HashMap<NodeId, ScriptCallback>>,
}

impl OfflineScriptHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the callback for a node, replacing any previous one.
    pub fn register_script_processor(&self, node_id: NodeId, callback: ScriptCallback) {
        lock_ignoring_poison(&self.callbacks).insert(node_id, callback);
    }

    /// Removes a node's callback.
    pub fn remove_script_processor(&self, node_id: NodeId) {
        lock_ignoring_poison(&self.callbacks).remove(&node_id);
    }
}

impl ScriptProcessorHost for OfflineScriptHost {
    fn process_script_processor(
        &self,
        node_id: NodeId,
        playback_time: f64,
        buffer_size: usize,
        input_channels: &[Vec<f32>],
        output_channels: &mut [Vec<f32>],
    ) -> bool {
        threads::debug_assert_control_thread();

        let mut callbacks = lock_ignoring_poison(&self.callbacks);
        let Some(callback) = callbacks.get_mut(&node_id) else {
            debug!(node = node_id.0, "script processor has no registered callback");
            return false;
        };

        zero_channels(output_channels);
        let mut event = ScriptEvent {
            playback_time,
            buffer_size,
            input: input_channels,
            output: &mut *output_channels,
        };
        let ok = run_callback(callback, &mut event);
        if !ok {
            zero_channels(output_channels);
        }
        ok
    }
}

// ---------------------------------------------------------------------------
// Realtime host
// ---------------------------------------------------------------------------

/// Phase of a node's single in-flight request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestPhase {
    Idle,
    Pending,
    Done { ok: bool },
}

/// The one-shot request record shared by a node's render and control sides.
struct RequestSlot {
    sequence: u64,
    playback_time: f64,
    phase: RequestPhase,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

struct NodeBridge {
    buffer_size: usize,
    slot: Mutex<RequestSlot>,
    done_signal: Condvar,
    /// Invoked only on the control thread (or inline when the caller is the
    /// control thread).
    callback: Mutex<ScriptCallback>,
}

/// Rate-limits realtime-path warnings to one per second.
struct LogThrottle {
    start: Instant,
    last_ms: AtomicU64,
}

impl LogThrottle {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn should_log(&self) -> bool {
        // 0 is the never-logged sentinel.
        let now_ms = (self.start.elapsed().as_millis() as u64).max(1);
        let last_ms = self.last_ms.load(Ordering::Relaxed);
        (last_ms == 0 || now_ms.saturating_sub(last_ms) >= 1000)
            && self
                .last_ms
                .compare_exchange(last_ms, now_ms, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }
}

struct HostShared {
    nodes: Mutex<HashMap<NodeId, Arc<NodeBridge>>>,
    queue: Mutex<VecDeque<NodeId>>,
    queue_signal: Condvar,
    shutdown: AtomicBool,
    control_thread: Mutex<Option<ThreadId>>,
    timeout_throttle: LogThrottle,
}

/// Script host for realtime rendering.
///
/// The render thread hands each completed block to the control thread and
/// waits with a bounded timeout - the single place the render path may
/// block. Clone handles share one bridge.
#[derive(Clone)]
pub struct RealtimeScriptHost {
    shared: Arc<HostShared>,
    timeout: Duration,
}

impl RealtimeScriptHost {
    /// Creates a host with the given realtime wait timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(HostShared {
                nodes: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                queue_signal: Condvar::new(),
                shutdown: AtomicBool::new(false),
                control_thread: Mutex::new(None),
                timeout_throttle: LogThrottle::new(),
            }),
            timeout,
        }
    }

    /// Registers a node's callback and preallocates its request slot.
    ///
    /// Control thread, graph-build time. Replaces any previous
    /// registration for the id.
    pub fn register_script_processor(
        &self,
        node_id: NodeId,
        buffer_size: usize,
        input_channel_count: usize,
        output_channel_count: usize,
        callback: ScriptCallback,
    ) {
        threads::debug_assert_control_thread();
        let bridge = Arc::new(NodeBridge {
            buffer_size,
            slot: Mutex::new(RequestSlot {
                sequence: 0,
                playback_time: 0.0,
                phase: RequestPhase::Idle,
                input: vec![vec![0.0; buffer_size]; input_channel_count],
                output: vec![vec![0.0; buffer_size]; output_channel_count],
            }),
            done_signal: Condvar::new(),
            callback: Mutex::new(callback),
        });
        lock_ignoring_poison(&self.shared.nodes).insert(node_id, bridge);
    }

    /// Removes a node's registration. An in-flight request for the node
    /// still completes against the old bridge.
    pub fn remove_script_processor(&self, node_id: NodeId) {
        threads::debug_assert_control_thread();
        lock_ignoring_poison(&self.shared.nodes).remove(&node_id);
    }

    /// Marks the calling thread as the designated control thread and
    /// processes deferred requests until [`shutdown()`](Self::shutdown).
    pub fn run_control_thread(&self) {
        *lock_ignoring_poison(&self.shared.control_thread) = Some(thread::current().id());
        while !self.shared.shutdown.load(Ordering::Acquire) {
            self.pump_one(Duration::from_millis(50));
        }
    }

    /// Waits up to `wait` for one deferred request and processes it.
    /// Returns true when a request was processed.
    pub fn pump_one(&self, wait: Duration) -> bool {
        {
            let mut control = lock_ignoring_poison(&self.shared.control_thread);
            if control.is_none() {
                *control = Some(thread::current().id());
            }
        }

        let node_id = {
            let queue = lock_ignoring_poison(&self.shared.queue);
            let (mut queue, _) = self
                .shared
                .queue_signal
                .wait_timeout_while(queue, wait, |queue| queue.is_empty())
                .unwrap_or_else(PoisonError::into_inner);
            queue.pop_front()
        };

        match node_id {
            Some(node_id) => {
                self.process_deferred(node_id);
                true
            }
            None => false,
        }
    }

    /// Signals the control pump to exit.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue_signal.notify_all();
    }

    /// Spawns a named control thread running
    /// [`run_control_thread()`](Self::run_control_thread), with the
    /// [`ThreadRole::Control`] role registered.
    pub fn spawn_control_thread(&self) -> std::io::Result<ControlThreadHandle> {
        let host = self.clone();
        let join = thread::Builder::new()
            .name("onda-script-control".into())
            .spawn(move || {
                threads::register_thread_role(ThreadRole::Control);
                host.run_control_thread();
            })?;
        Ok(ControlThreadHandle {
            host: self.clone(),
            join: Some(join),
        })
    }

    fn current_thread_is_control(&self) -> bool {
        *lock_ignoring_poison(&self.shared.control_thread) == Some(thread::current().id())
    }

    /// Control-thread side: execute the callback for one deferred request.
    fn process_deferred(&self, node_id: NodeId) {
        let Some(bridge) = lock_ignoring_poison(&self.shared.nodes).get(&node_id).cloned() else {
            return;
        };

        // Lock order: callback before slot, here and on the inline path.
        let mut callback = lock_ignoring_poison(&bridge.callback);
        let mut slot = lock_ignoring_poison(&bridge.slot);
        if slot.phase != RequestPhase::Pending {
            // The render side timed out and invalidated this request.
            return;
        }

        zero_channels(&mut slot.output);
        let RequestSlot {
            playback_time,
            input,
            output,
            ..
        } = &mut *slot;
        let mut event = ScriptEvent {
            playback_time: *playback_time,
            buffer_size: bridge.buffer_size,
            input: input.as_slice(),
            output: output.as_mut_slice(),
        };
        let ok = run_callback(&mut callback, &mut event);
        if !ok {
            zero_channels(&mut slot.output);
        }
        debug!(node = node_id.0, request = slot.sequence, ok, "script block processed");
        slot.phase = RequestPhase::Done { ok };
        drop(slot);
        bridge.done_signal.notify_all();
    }

    /// Render-thread side: publish the request and wait, bounded.
    fn process_deferred_from_render_thread(
        &self,
        bridge: &NodeBridge,
        node_id: NodeId,
        playback_time: f64,
        input_channels: &[Vec<f32>],
        output_channels: &mut [Vec<f32>],
    ) -> bool {
        {
            let mut slot = lock_ignoring_poison(&bridge.slot);
            if slot.phase != RequestPhase::Idle {
                // Per-node requests are sequential by contract; a non-idle
                // slot means a stale completion raced us. Fail this block.
                slot.phase = RequestPhase::Idle;
                zero_channels(output_channels);
                return false;
            }
            if slot.input.len() != input_channels.len()
                || slot.output.len() != output_channels.len()
            {
                zero_channels(output_channels);
                return false;
            }
            for (dst, src) in slot.input.iter_mut().zip(input_channels.iter()) {
                dst.copy_from_slice(src);
            }
            slot.playback_time = playback_time;
            slot.sequence = slot.sequence.wrapping_add(1);
            slot.phase = RequestPhase::Pending;
        }

        {
            let mut queue = lock_ignoring_poison(&self.shared.queue);
            queue.push_back(node_id);
        }
        self.shared.queue_signal.notify_one();

        let slot = lock_ignoring_poison(&bridge.slot);
        let (mut slot, _timeout) = bridge
            .done_signal
            .wait_timeout_while(slot, self.timeout, |slot| {
                !matches!(slot.phase, RequestPhase::Done { .. })
            })
            .unwrap_or_else(PoisonError::into_inner);

        match slot.phase {
            RequestPhase::Done { ok } => {
                if ok {
                    for (dst, src) in output_channels.iter_mut().zip(slot.output.iter()) {
                        dst.copy_from_slice(src);
                    }
                } else {
                    zero_channels(output_channels);
                }
                slot.phase = RequestPhase::Idle;
                ok
            }
            _ => {
                // Bounded wait expired. Invalidate the request so a late
                // control-thread completion is discarded, emit silence, and
                // keep rendering - this must never hang the audio thread.
                slot.phase = RequestPhase::Idle;
                slot.sequence = slot.sequence.wrapping_add(1);
                drop(slot);
                if self.shared.timeout_throttle.should_log() {
                    warn!(
                        node = node_id.0,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "script processor block timed out; emitting silence"
                    );
                }
                zero_channels(output_channels);
                false
            }
        }
    }
}

impl ScriptProcessorHost for RealtimeScriptHost {
    fn process_script_processor(
        &self,
        node_id: NodeId,
        playback_time: f64,
        buffer_size: usize,
        input_channels: &[Vec<f32>],
        output_channels: &mut [Vec<f32>],
    ) -> bool {
        let Some(bridge) = lock_ignoring_poison(&self.shared.nodes).get(&node_id).cloned() else {
            debug!(node = node_id.0, "script processor not registered with host");
            zero_channels(output_channels);
            return false;
        };

        if bridge.buffer_size != buffer_size {
            debug!(
                node = node_id.0,
                expected = bridge.buffer_size,
                got = buffer_size,
                "script processor buffer size mismatch"
            );
            zero_channels(output_channels);
            return false;
        }

        if self.current_thread_is_control() {
            // Already on the control thread: run the callback inline.
            let mut callback = lock_ignoring_poison(&bridge.callback);
            zero_channels(output_channels);
            let mut event = ScriptEvent {
                playback_time,
                buffer_size,
                input: input_channels,
                output: &mut *output_channels,
            };
            let ok = run_callback(&mut callback, &mut event);
            if !ok {
                zero_channels(output_channels);
            }
            return ok;
        }

        self.process_deferred_from_render_thread(
            &bridge,
            node_id,
            playback_time,
            input_channels,
            output_channels,
        )
    }
}

/// Handle to a spawned control thread; shuts the pump down on drop.
pub struct ControlThreadHandle {
    host: RealtimeScriptHost,
    join: Option<thread::JoinHandle<()>>,
}

impl ControlThreadHandle {
    /// Signals shutdown and joins the control thread.
    pub fn shutdown(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.host.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ControlThreadHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
