//! Fixed-buffer playback source.

use std::any::Any;

use onda_core::AudioBus;

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;
use crate::node::RenderNode;

/// Plays a planar sample buffer from frame 0, then emits silence.
///
/// The minimal source node the engine needs; scheduling and playback-rate
/// control live with the node object model, outside this engine.
pub struct BufferSourceRenderNode {
    channels: Vec<Vec<f32>>,
    position: usize,
}

impl BufferSourceRenderNode {
    /// Creates a source over the given planar buffer.
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self {
            channels,
            position: 0,
        }
    }

    fn buffer_len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

impl RenderNode for BufferSourceRenderNode {
    fn process(
        &mut self,
        context: &RenderContext<'_>,
        _input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        let channel_count = self.channels.len().min(output.channel_capacity()).max(1);
        output.set_channel_count(channel_count);
        output.zero();

        let len = self.buffer_len();
        if self.channels.is_empty() || self.position >= len {
            return;
        }

        let frames = context.quantum_size.min(len - self.position);
        for ch in 0..channel_count.min(self.channels.len()) {
            let source = &self.channels[ch][self.position..self.position + frames];
            output.channel_mut(ch)[..frames].copy_from_slice(source);
        }
        self.position += context.quantum_size;
    }

    fn apply_description(&mut self, description: &GraphNodeDescription) {
        if let GraphNodeDescription::BufferSource { channels } = description {
            self.channels = channels.clone();
            self.position = 0;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(quantum: usize) -> RenderContext<'static> {
        RenderContext {
            sample_rate: 48000.0,
            quantum_size: quantum,
            current_frame: 0,
            script_host: None,
        }
    }

    #[test]
    fn plays_buffer_then_silence() {
        let mut node = BufferSourceRenderNode::new(vec![vec![1.0; 6]]);
        let mut output = AudioBus::new(1, 4);

        node.process(&context(4), None, &mut output);
        assert_eq!(output.channel(0), &[1.0; 4]);

        // Second quantum: only 2 frames remain, the tail is zero-padded.
        node.process(&context(4), None, &mut output);
        assert_eq!(output.channel(0), &[1.0, 1.0, 0.0, 0.0]);

        node.process(&context(4), None, &mut output);
        assert!(output.is_silent());
    }

    #[test]
    fn empty_buffer_is_silence() {
        let mut node = BufferSourceRenderNode::new(Vec::new());
        let mut output = AudioBus::new(2, 4);
        node.process(&context(4), None, &mut output);
        assert_eq!(output.channel_count(), 1);
        assert!(output.is_silent());
    }

    #[test]
    fn description_restarts_playback() {
        let mut node = BufferSourceRenderNode::new(vec![vec![1.0; 4]]);
        let mut output = AudioBus::new(1, 4);
        node.process(&context(4), None, &mut output);

        node.apply_description(&GraphNodeDescription::BufferSource {
            channels: vec![vec![2.0; 4]],
        });
        node.process(&context(4), None, &mut output);
        assert_eq!(output.channel(0), &[2.0; 4]);
    }
}
