//! The render node interface.

use std::any::Any;

use onda_core::AudioBus;

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;

/// A per-node realtime processing state machine.
///
/// The graph driver calls [`process()`](Self::process) exactly once per
/// node per quantum, in dependency order. `input` is the node's mixed
/// upstream bus (`None` when nothing is connected); `output` is the node's
/// own output bus, reused every quantum.
///
/// Implementations must not allocate, block, or panic on the process path -
/// every runtime failure degrades to silence. The one sanctioned exception
/// is the script processor's bounded wait inside the host bridge.
pub trait RenderNode: Send + Any {
    /// Renders one quantum.
    fn process(
        &mut self,
        context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    );

    /// Applies a parameter-only description update from the control thread.
    ///
    /// Updates are committed between quanta by the driver; a node ignores
    /// descriptions of the wrong kind.
    fn apply_description(&mut self, description: &GraphNodeDescription) {
        let _ = description;
    }

    /// Applies a description during offline rendering, where the caller
    /// owns both thread roles. Defaults to the realtime behaviour.
    fn apply_description_offline(&mut self, description: &GraphNodeDescription) {
        self.apply_description(description);
    }

    /// Downcast support for node-specific accessors (analyser data taps).
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
