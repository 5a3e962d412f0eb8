//! The closed set of render node implementations.
//!
//! Each node is a per-quantum processing state machine behind the
//! [`crate::RenderNode`] trait, constructed once from its
//! [`crate::GraphNodeDescription`] at graph-build time.

mod analyser;
mod buffer_source;
mod destination;
mod gain;
mod script_processor;
mod waveshaper;

pub use analyser::AnalyserRenderNode;
pub use buffer_source::BufferSourceRenderNode;
pub use destination::DestinationRenderNode;
pub use gain::GainRenderNode;
pub use script_processor::ScriptProcessorRenderNode;
pub use waveshaper::WaveShaperRenderNode;
