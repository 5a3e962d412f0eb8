//! Graph and node descriptions.
//!
//! The node object model lives outside this engine; it hands over a
//! [`GraphDescription`] - a closed set of node variants plus a connection
//! list - which [`crate::RenderGraph::build`] compiles into render nodes
//! once, on the control thread. Parameter changes arrive as fresh
//! descriptions through the `apply_description` entry points.

use core::fmt;

use onda_core::OversampleFactor;

/// Stable identifier a description uses to refer to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// One directed audio connection between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    /// Node whose output feeds the connection.
    pub source: NodeId,
    /// Node whose input receives the connection.
    pub destination: NodeId,
}

/// Description of a single render node.
#[derive(Clone, Debug)]
pub enum GraphNodeDescription {
    /// The graph's terminal sink.
    Destination {
        /// Output channel count of the destination.
        channel_count: usize,
    },
    /// Scales its input by a constant gain.
    Gain {
        /// Linear gain factor.
        gain: f32,
    },
    /// Plays a fixed planar buffer from frame 0, then silence.
    BufferSource {
        /// Planar sample data, one `Vec` per channel.
        channels: Vec<Vec<f32>>,
    },
    /// Nonlinear waveshaper with optional oversampling.
    WaveShaper {
        /// Transfer curve table; `None` (or fewer than 2 points) is the
        /// identity.
        curve: Option<Vec<f32>>,
        /// Oversampling factor for the shaping stage.
        oversample: OversampleFactor,
    },
    /// Legacy synchronous script-processing node.
    ScriptProcessor {
        /// Script-visible block size in frames; a power of two in
        /// 256..=16384 and a multiple of the quantum size.
        buffer_size: usize,
        /// Channels captured from the input.
        input_channel_count: usize,
        /// Channels produced by the script.
        output_channel_count: usize,
    },
    /// Passthrough analysis tap with spectral accessors.
    Analyser {
        /// FFT size; a power of two in 32..=32768.
        fft_size: usize,
        /// Exponential smoothing constant in 0..=1.
        smoothing_time_constant: f32,
        /// dB value mapped to byte 0.
        min_decibels: f32,
        /// dB value mapped to byte 255.
        max_decibels: f32,
    },
}

impl GraphNodeDescription {
    /// Stable name of the variant, used to reject kind-changing updates.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Destination { .. } => "destination",
            Self::Gain { .. } => "gain",
            Self::BufferSource { .. } => "buffer-source",
            Self::WaveShaper { .. } => "waveshaper",
            Self::ScriptProcessor { .. } => "script-processor",
            Self::Analyser { .. } => "analyser",
        }
    }
}

/// A complete graph: nodes, connections, and the destination node.
#[derive(Clone, Debug)]
pub struct GraphDescription {
    /// Node descriptions keyed by id. Ids must be unique.
    pub nodes: Vec<(NodeId, GraphNodeDescription)>,
    /// Audio connections. Multiple connections into one node are summed at
    /// the graph edge.
    pub connections: Vec<Connection>,
    /// The terminal node whose output the driver returns each quantum.
    pub destination: NodeId,
}

impl GraphDescription {
    /// Creates an empty description with the given destination id.
    pub fn with_destination(destination: NodeId) -> Self {
        Self {
            nodes: Vec::new(),
            connections: Vec::new(),
            destination,
        }
    }

    /// Adds a node description.
    pub fn add_node(&mut self, id: NodeId, description: GraphNodeDescription) -> &mut Self {
        self.nodes.push((id, description));
        self
    }

    /// Connects `source` to `destination`.
    pub fn connect(&mut self, source: NodeId, destination: NodeId) -> &mut Self {
        self.connections.push(Connection {
            source,
            destination,
        });
        self
    }
}
