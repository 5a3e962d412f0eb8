//! The graph's terminal sink.

use std::any::Any;

use onda_core::{AudioBus, mix_into};

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;
use crate::node::RenderNode;

/// Collects the mixed graph output at a fixed channel count.
pub struct DestinationRenderNode {
    channel_count: usize,
}

impl DestinationRenderNode {
    /// Creates a destination with the given output channel count.
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count: channel_count.max(1),
        }
    }
}

impl RenderNode for DestinationRenderNode {
    fn process(
        &mut self,
        _context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        let channels = self.channel_count.min(output.channel_capacity());
        output.set_channel_count(channels);
        output.zero();
        if let Some(input) = input {
            mix_into(output, &[input]);
        }
    }

    fn apply_description(&mut self, description: &GraphNodeDescription) {
        if let GraphNodeDescription::Destination { channel_count } = description {
            self.channel_count = (*channel_count).max(1);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
