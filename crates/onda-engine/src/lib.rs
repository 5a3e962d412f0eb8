//! Onda Engine - the realtime audio render graph.
//!
//! The engine executes a graph of audio-processing nodes in fixed-size time
//! quanta on a dedicated render thread, bridges synchronous script-callback
//! nodes across the realtime/control thread boundary without glitching, and
//! keeps the render path free of locks, allocation, and unbounded waits.
//!
//! # Components
//!
//! - [`RenderGraph`] - compiles a [`GraphDescription`] into render nodes and
//!   buses, then drives one `process()` call per node per quantum in
//!   dependency order
//! - [`RenderNode`] - the closed set of node implementations in
//!   [`nodes`]: destination, gain, buffer source, waveshaper, analyser, and
//!   script processor
//! - [`ScriptProcessorHost`] - the cross-thread bridge that turns a block of
//!   realtime quanta into one synchronous script invocation:
//!   [`OfflineScriptHost`] runs callbacks inline, [`RealtimeScriptHost`]
//!   defers them to a control thread behind a bounded wait
//! - [`EngineConfig`] - TOML-loadable tuning (quantum size, script wait
//!   timeout, initial silent blocks, channel ceiling)
//! - [`threads`] - debug-only thread-role diagnostics
//!
//! # Thread roles
//!
//! Two roles are load-bearing: the *control* thread builds graphs, applies
//! descriptions, and runs user script; the *render* thread calls
//! [`RenderGraph::render_quantum`]. The render thread may block in exactly
//! one place - the realtime script host's bounded wait - and every failure
//! there degrades to silence, never to a hang or a crash.

pub mod config;
pub mod context;
pub mod description;
pub mod graph;
pub mod host;
pub mod node;
pub mod nodes;
pub mod threads;

pub use config::{ConfigError, EngineConfig};
pub use context::RenderContext;
pub use description::{Connection, GraphDescription, GraphNodeDescription, NodeId};
pub use graph::{GraphError, RenderGraph};
pub use host::{
    ControlThreadHandle, OfflineScriptHost, RealtimeScriptHost, ScriptCallback, ScriptEvent,
    ScriptProcessorHost,
};
pub use node::RenderNode;
pub use threads::ThreadRole;
