//! Constant-gain node.

use std::any::Any;

use onda_core::AudioBus;

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;
use crate::node::RenderNode;

/// Scales its input by a constant linear gain.
pub struct GainRenderNode {
    gain: f32,
}

impl GainRenderNode {
    /// Creates a gain node.
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl RenderNode for GainRenderNode {
    fn process(
        &mut self,
        _context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        let Some(input) = input else {
            output.set_channel_count(1.min(output.channel_capacity()));
            output.zero();
            return;
        };

        output.copy_from(input);
        for ch in 0..output.channel_count() {
            for sample in output.channel_mut(ch) {
                *sample *= self.gain;
            }
        }
    }

    fn apply_description(&mut self, description: &GraphNodeDescription) {
        if let GraphNodeDescription::Gain { gain } = description {
            self.gain = *gain;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
