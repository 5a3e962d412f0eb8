//! Per-quantum render context.

use crate::host::ScriptProcessorHost;

/// State the graph driver threads through every `process()` call.
pub struct RenderContext<'a> {
    /// Sample rate of the graph, in Hz.
    pub sample_rate: f32,
    /// Frames per render quantum.
    pub quantum_size: usize,
    /// First frame of the current quantum since rendering started.
    pub current_frame: u64,
    /// The active script-processor bridge, if any. Script nodes fall back
    /// to silence when rendering without one.
    pub script_host: Option<&'a dyn ScriptProcessorHost>,
}

impl RenderContext<'_> {
    /// The current frame expressed as seconds since rendering started.
    pub fn playback_time(&self) -> f64 {
        self.current_frame as f64 / f64::from(self.sample_rate)
    }
}
