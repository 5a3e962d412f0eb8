//! The legacy script-processor node.
//!
//! Script code sees blocks of `buffer_size` frames (a power of two,
//! 256..=16384), while the graph runs in much smaller quanta. This node
//! decouples the two: it accumulates quanta into an input block, hands each
//! completed block to the [`crate::ScriptProcessorHost`], and replays the
//! returned blocks one quantum at a time - keeping output continuous even
//! when the script is occasionally slow. A queue of pending output blocks
//! absorbs jitter; starvation degrades to silence, never to blocking.

use std::any::Any;
use std::collections::VecDeque;

use onda_core::AudioBus;

use crate::context::RenderContext;
use crate::description::{GraphNodeDescription, NodeId};
use crate::node::RenderNode;

/// Completed output blocks held at most; beyond this the oldest is dropped
/// so the newest data wins.
const MAX_PENDING_BLOCKS: usize = 4;

/// Planar block storage: `output_channel_count` channels of `buffer_size`
/// frames.
type Block = Vec<Vec<f32>>;

/// Accumulates quanta into script-visible blocks and replays the script's
/// output, one block of latency behind.
pub struct ScriptProcessorRenderNode {
    node_id: NodeId,
    buffer_size: usize,
    input_channel_count: usize,
    output_channel_count: usize,
    /// Set when the configured buffer size is unusable; the node then
    /// outputs silence permanently instead of faulting.
    degraded: bool,

    input_accum: Vec<Vec<f32>>,
    input_offset: usize,

    current_block: Option<Block>,
    pending_blocks: VecDeque<Block>,
    free_blocks: Vec<Block>,
    output_offset: usize,
    block_index: u64,
    silent_blocks_remaining: usize,
}

impl ScriptProcessorRenderNode {
    /// Creates a script-processor node.
    ///
    /// `buffer_size` must be a power of two in 256..=16384 and a multiple
    /// of `quantum_size`; any violation forces the node into the degraded
    /// (permanently silent) mode.
    pub fn new(
        node_id: NodeId,
        buffer_size: usize,
        input_channel_count: usize,
        output_channel_count: usize,
        quantum_size: usize,
        initial_silent_blocks: usize,
    ) -> Self {
        let degraded = quantum_size == 0
            || buffer_size % quantum_size != 0
            || !buffer_size.is_power_of_two()
            || !(256..=16384).contains(&buffer_size);
        if degraded {
            tracing::warn!(
                node = node_id.0,
                buffer_size,
                quantum_size,
                "illegal script processor buffer size; node will render silence"
            );
        }

        // Block storage is preallocated here and recycled through the free
        // list; the render path never allocates.
        let storage = if degraded { 0 } else { buffer_size };
        let free_blocks = (0..=MAX_PENDING_BLOCKS)
            .map(|_| vec![vec![0.0; storage]; output_channel_count])
            .collect();

        Self {
            node_id,
            buffer_size,
            input_channel_count,
            output_channel_count,
            degraded,
            input_accum: vec![vec![0.0; storage]; input_channel_count],
            input_offset: 0,
            current_block: None,
            pending_blocks: VecDeque::with_capacity(MAX_PENDING_BLOCKS + 1),
            free_blocks,
            output_offset: 0,
            block_index: 0,
            silent_blocks_remaining: initial_silent_blocks,
        }
    }

    /// True when the node was configured with an unusable buffer size.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Blocks completed so far.
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    /// Copies one quantum of the mixed input into the accumulation buffer.
    fn accumulate_input(&mut self, input: Option<&AudioBus>, quantum_size: usize) {
        let offset = self.input_offset;
        for ch in 0..self.input_channel_count {
            let dest = &mut self.input_accum[ch][offset..offset + quantum_size];
            match input {
                Some(bus) if bus.channel_count() > ch => {
                    dest.copy_from_slice(bus.channel(ch));
                }
                // A mono input feeds every captured channel.
                Some(bus) if bus.channel_count() == 1 => {
                    dest.copy_from_slice(bus.channel(0));
                }
                _ => dest.fill(0.0),
            }
        }
        self.input_offset += quantum_size;
    }

    /// Hands the completed input block to the host and enqueues the result.
    fn dispatch_block(&mut self, context: &RenderContext<'_>) {
        let mut block = match self.free_blocks.pop() {
            Some(block) => block,
            // Free list starved: steal the oldest pending block.
            None => match self.pending_blocks.pop_front() {
                Some(block) => block,
                None => return,
            },
        };

        // The block's output starts playing one full buffer after the
        // frames that produced it finished accumulating.
        let playback_time = (context.current_frame + context.quantum_size as u64) as f64
            / f64::from(context.sample_rate)
            + self.buffer_size as f64 / f64::from(context.sample_rate);

        let ok = match context.script_host {
            Some(host) => host.process_script_processor(
                self.node_id,
                playback_time,
                self.buffer_size,
                &self.input_accum,
                &mut block,
            ),
            None => false,
        };
        if !ok {
            for channel in block.iter_mut() {
                channel.fill(0.0);
            }
        }

        if self.pending_blocks.len() >= MAX_PENDING_BLOCKS
            && let Some(dropped) = self.pending_blocks.pop_front()
        {
            self.free_blocks.push(dropped);
        }
        self.pending_blocks.push_back(block);
    }

    /// Copies one quantum from the current output block (or silence).
    fn emit_output(&mut self, output: &mut AudioBus, quantum_size: usize) {
        let channels = self
            .output_channel_count
            .min(output.channel_capacity())
            .max(1);
        output.set_channel_count(channels);

        match &self.current_block {
            Some(block) => {
                let offset = self.output_offset;
                for ch in 0..channels {
                    let dest = output.channel_mut(ch);
                    match block.get(ch) {
                        Some(source) => {
                            dest.copy_from_slice(&source[offset..offset + quantum_size]);
                        }
                        None => dest.fill(0.0),
                    }
                }
            }
            None => output.zero(),
        }
        self.output_offset += quantum_size;
    }

    /// Wraps the output offset and advances to the next output block,
    /// consuming owed initial silent blocks first.
    fn advance_output_block(&mut self) {
        self.output_offset = 0;
        if let Some(block) = self.current_block.take() {
            self.free_blocks.push(block);
        }
        if self.silent_blocks_remaining > 0 {
            self.silent_blocks_remaining -= 1;
        } else {
            self.current_block = self.pending_blocks.pop_front();
        }
    }
}

impl RenderNode for ScriptProcessorRenderNode {
    fn process(
        &mut self,
        context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        if self.degraded {
            let channels = self
                .output_channel_count
                .min(output.channel_capacity())
                .max(1);
            output.set_channel_count(channels);
            output.zero();
            return;
        }

        self.accumulate_input(input, context.quantum_size);
        if self.input_offset >= self.buffer_size {
            self.dispatch_block(context);
            self.input_offset = 0;
            self.block_index += 1;
        }

        self.emit_output(output, context.quantum_size);
        if self.output_offset >= self.buffer_size {
            self.advance_output_block();
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
