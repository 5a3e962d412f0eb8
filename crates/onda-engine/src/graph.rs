//! Graph compilation and the per-quantum render driver.
//!
//! [`RenderGraph::build`] runs on the control thread: it turns a
//! [`GraphDescription`] into render nodes, computes a topological
//! processing order, and allocates one mix bus and one output bus per
//! node. [`RenderGraph::render_quantum`] runs on the render thread: it
//! mixes each node's incoming connections into its mix bus, calls the
//! node's `process()`, and returns the destination's output - with no
//! allocation and (outside the script host's bounded wait) no blocking.

use std::collections::HashMap;

use onda_core::{AudioBus, mix_into};
use tracing::debug;

use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::description::{GraphDescription, GraphNodeDescription, NodeId};
use crate::host::ScriptProcessorHost;
use crate::node::RenderNode;
use crate::nodes::{
    AnalyserRenderNode, BufferSourceRenderNode, DestinationRenderNode, GainRenderNode,
    ScriptProcessorRenderNode, WaveShaperRenderNode,
};
use crate::threads;

/// Errors compiling a [`GraphDescription`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A connection references a node id that is not in the description.
    #[error("node {0} not found")]
    UnknownNode(NodeId),
    /// Two node descriptions share an id.
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    /// The connection set contains a cycle.
    #[error("graph contains a cycle")]
    CycleDetected,
    /// The destination id is not in the description.
    #[error("destination node {0} is not part of the graph")]
    UnknownDestination(NodeId),
}

/// A compiled, executable render graph.
pub struct RenderGraph {
    nodes: Vec<Box<dyn RenderNode>>,
    kinds: Vec<&'static str>,
    index_by_id: HashMap<NodeId, usize>,
    sources_by_node: Vec<Vec<usize>>,
    processing_order: Vec<usize>,
    mix_buses: Vec<AudioBus>,
    output_buses: Vec<AudioBus>,
    destination: usize,
    sample_rate: f32,
    quantum_size: usize,
    max_channels: usize,
    current_frame: u64,
}

impl RenderGraph {
    /// Compiles a description into an executable graph. Control thread.
    pub fn build(
        description: &GraphDescription,
        config: &EngineConfig,
        sample_rate: f32,
    ) -> Result<Self, GraphError> {
        threads::debug_assert_control_thread();

        let mut index_by_id = HashMap::with_capacity(description.nodes.len());
        for (index, (id, _)) in description.nodes.iter().enumerate() {
            if index_by_id.insert(*id, index).is_some() {
                return Err(GraphError::DuplicateNode(*id));
            }
        }

        let destination = *index_by_id
            .get(&description.destination)
            .ok_or(GraphError::UnknownDestination(description.destination))?;

        let node_count = description.nodes.len();
        let mut sources_by_node: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for connection in &description.connections {
            let source = *index_by_id
                .get(&connection.source)
                .ok_or(GraphError::UnknownNode(connection.source))?;
            let dest = *index_by_id
                .get(&connection.destination)
                .ok_or(GraphError::UnknownNode(connection.destination))?;
            sources_by_node[dest].push(source);
        }

        let processing_order = topological_order(&sources_by_node)?;

        let mut nodes = Vec::with_capacity(node_count);
        let mut kinds = Vec::with_capacity(node_count);
        let mut mix_buses = Vec::with_capacity(node_count);
        let mut output_buses = Vec::with_capacity(node_count);
        for (id, desc) in &description.nodes {
            nodes.push(build_node(*id, desc, config));
            kinds.push(desc.kind_name());
            mix_buses.push(AudioBus::new(
                input_capacity_for(desc),
                config.quantum_size,
            ));
            output_buses.push(AudioBus::new(
                output_capacity_for(desc),
                config.quantum_size,
            ));
        }

        debug!(
            nodes = node_count,
            connections = description.connections.len(),
            quantum = config.quantum_size,
            "compiled render graph"
        );

        Ok(Self {
            nodes,
            kinds,
            index_by_id,
            sources_by_node,
            processing_order,
            mix_buses,
            output_buses,
            destination,
            sample_rate,
            quantum_size: config.quantum_size,
            max_channels: config.max_channels,
            current_frame: 0,
        })
    }

    /// Frames per quantum.
    pub fn quantum_size(&self) -> usize {
        self.quantum_size
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// First frame of the next quantum.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Renders one quantum and returns the destination's output bus.
    ///
    /// Render thread. Nodes are processed in dependency order; within a
    /// node quanta are strictly sequential.
    pub fn render_quantum(&mut self, host: Option<&dyn ScriptProcessorHost>) -> &AudioBus {
        threads::debug_assert_render_thread();

        let context = RenderContext {
            sample_rate: self.sample_rate,
            quantum_size: self.quantum_size,
            current_frame: self.current_frame,
            script_host: host,
        };

        for &index in &self.processing_order {
            let has_signal = {
                // Mix all incoming connections at the graph edge.
                let sources = &self.sources_by_node[index];
                let mix = &mut self.mix_buses[index];
                let mut desired = 0;
                for &source in sources {
                    desired = desired.max(self.output_buses[source].channel_count());
                }
                desired = desired
                    .min(mix.channel_capacity())
                    .min(self.max_channels);
                mix.set_channel_count(desired);
                mix.zero();
                for &source in sources {
                    mix_into(mix, &[&self.output_buses[source]]);
                }
                desired > 0
            };

            let input = has_signal.then(|| &self.mix_buses[index]);
            self.nodes[index].process(&context, input, &mut self.output_buses[index]);
        }

        self.current_frame += self.quantum_size as u64;
        &self.output_buses[self.destination]
    }

    /// Offline render loop: renders `quanta` quanta on the calling thread
    /// and returns the destination output as planar channel vectors.
    pub fn render_to_vec(
        &mut self,
        quanta: usize,
        host: Option<&dyn ScriptProcessorHost>,
    ) -> Vec<Vec<f32>> {
        let mut captured: Vec<Vec<f32>> = Vec::new();
        for _ in 0..quanta {
            let bus = self.render_quantum(host);
            captured.resize_with(captured.len().max(bus.channel_count()), Vec::new);
            for ch in 0..bus.channel_count() {
                captured[ch].extend_from_slice(bus.channel(ch));
            }
        }
        captured
    }

    /// Applies a parameter-only description update to a live node.
    ///
    /// Unknown ids and kind-changing updates are ignored with a debug log;
    /// topology changes require a rebuild.
    pub fn apply_description(&mut self, node_id: NodeId, description: &GraphNodeDescription) {
        let Some(&index) = self.index_by_id.get(&node_id) else {
            debug!(node = node_id.0, "description update for unknown node");
            return;
        };
        if self.kinds[index] != description.kind_name() {
            debug!(
                node = node_id.0,
                expected = self.kinds[index],
                got = description.kind_name(),
                "description update changes node kind; ignored"
            );
            return;
        }
        self.nodes[index].apply_description(description);
    }

    /// Offline variant of [`apply_description`](Self::apply_description).
    pub fn apply_description_offline(
        &mut self,
        node_id: NodeId,
        description: &GraphNodeDescription,
    ) {
        let Some(&index) = self.index_by_id.get(&node_id) else {
            debug!(node = node_id.0, "description update for unknown node");
            return;
        };
        if self.kinds[index] != description.kind_name() {
            return;
        }
        self.nodes[index].apply_description_offline(description);
    }

    /// Copies an analyser's recent time-domain window. False when the id
    /// is not an analyser.
    pub fn analyser_time_domain_data(&mut self, node_id: NodeId, output: &mut [f32]) -> bool {
        match self.analyser_mut(node_id) {
            Some(analyser) => {
                analyser.time_domain_data(output);
                true
            }
            None => false,
        }
    }

    /// Copies an analyser's smoothed frequency data in dB. False when the
    /// id is not an analyser.
    pub fn analyser_frequency_data_db(&mut self, node_id: NodeId, output: &mut [f32]) -> bool {
        self.analyser_mut(node_id)
            .is_some_and(|analyser| analyser.frequency_data_db(output))
    }

    /// Copies an analyser's byte-scaled frequency data. False when the id
    /// is not an analyser.
    pub fn analyser_byte_frequency_data(&mut self, node_id: NodeId, output: &mut [u8]) -> bool {
        self.analyser_mut(node_id)
            .is_some_and(|analyser| analyser.byte_frequency_data(output))
    }

    fn analyser_mut(&mut self, node_id: NodeId) -> Option<&mut AnalyserRenderNode> {
        let &index = self.index_by_id.get(&node_id)?;
        self.nodes[index]
            .as_any_mut()
            .downcast_mut::<AnalyserRenderNode>()
    }
}

/// Kahn's algorithm over the connection lists; build-time only.
fn topological_order(sources_by_node: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
    let node_count = sources_by_node.len();
    let mut in_degree = vec![0usize; node_count];
    for (dest, sources) in sources_by_node.iter().enumerate() {
        in_degree[dest] = sources.len();
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for (dest, sources) in sources_by_node.iter().enumerate() {
        for &source in sources {
            dependents[source].push(dest);
        }
    }

    let mut ready: Vec<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);
    while let Some(index) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if order.len() != node_count {
        return Err(GraphError::CycleDetected);
    }
    Ok(order)
}

fn build_node(
    id: NodeId,
    description: &GraphNodeDescription,
    config: &EngineConfig,
) -> Box<dyn RenderNode> {
    match description {
        GraphNodeDescription::Destination { channel_count } => {
            Box::new(DestinationRenderNode::new(*channel_count))
        }
        GraphNodeDescription::Gain { gain } => Box::new(GainRenderNode::new(*gain)),
        GraphNodeDescription::BufferSource { channels } => {
            Box::new(BufferSourceRenderNode::new(channels.clone()))
        }
        GraphNodeDescription::WaveShaper { curve, oversample } => {
            Box::new(WaveShaperRenderNode::new(curve.clone(), *oversample))
        }
        GraphNodeDescription::ScriptProcessor {
            buffer_size,
            input_channel_count,
            output_channel_count,
        } => Box::new(ScriptProcessorRenderNode::new(
            id,
            *buffer_size,
            *input_channel_count,
            *output_channel_count,
            config.quantum_size,
            config.initial_silent_blocks,
        )),
        GraphNodeDescription::Analyser {
            fft_size,
            smoothing_time_constant,
            min_decibels,
            max_decibels,
        } => Box::new(AnalyserRenderNode::new(
            *fft_size,
            *smoothing_time_constant,
            *min_decibels,
            *max_decibels,
        )),
    }
}

/// Channel capacity of a node's mix (input) bus.
fn input_capacity_for(description: &GraphNodeDescription) -> usize {
    match description {
        GraphNodeDescription::Destination { channel_count } => (*channel_count).max(1),
        GraphNodeDescription::ScriptProcessor {
            input_channel_count,
            ..
        } => (*input_channel_count).max(1),
        GraphNodeDescription::BufferSource { .. } => 1,
        _ => 2,
    }
}

/// Channel capacity of a node's output bus.
fn output_capacity_for(description: &GraphNodeDescription) -> usize {
    match description {
        GraphNodeDescription::Destination { channel_count } => (*channel_count).max(1),
        GraphNodeDescription::ScriptProcessor {
            output_channel_count,
            ..
        } => (*output_channel_count).max(1),
        GraphNodeDescription::BufferSource { channels } => channels.len().max(1),
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::Connection;

    fn config() -> EngineConfig {
        EngineConfig {
            quantum_size: 128,
            ..EngineConfig::default()
        }
    }

    fn chain_description() -> GraphDescription {
        let mut description = GraphDescription::with_destination(NodeId(0));
        description
            .add_node(NodeId(0), GraphNodeDescription::Destination { channel_count: 1 })
            .add_node(
                NodeId(1),
                GraphNodeDescription::BufferSource {
                    channels: vec![vec![0.5; 1024]],
                },
            )
            .add_node(NodeId(2), GraphNodeDescription::Gain { gain: 2.0 })
            .connect(NodeId(1), NodeId(2))
            .connect(NodeId(2), NodeId(0));
        description
    }

    #[test]
    fn chain_renders_in_dependency_order() {
        let mut graph = RenderGraph::build(&chain_description(), &config(), 48000.0).unwrap();
        let output = graph.render_quantum(None);
        assert_eq!(output.channel_count(), 1);
        assert_eq!(output.channel(0), &[1.0; 128]);
        assert_eq!(graph.current_frame(), 128);
    }

    #[test]
    fn fan_in_sums_at_the_graph_edge() {
        let mut description = GraphDescription::with_destination(NodeId(0));
        description
            .add_node(NodeId(0), GraphNodeDescription::Destination { channel_count: 1 })
            .add_node(
                NodeId(1),
                GraphNodeDescription::BufferSource {
                    channels: vec![vec![0.25; 256]],
                },
            )
            .add_node(
                NodeId(2),
                GraphNodeDescription::BufferSource {
                    channels: vec![vec![0.5; 256]],
                },
            )
            .connect(NodeId(1), NodeId(0))
            .connect(NodeId(2), NodeId(0));

        let mut graph = RenderGraph::build(&description, &config(), 48000.0).unwrap();
        let output = graph.render_quantum(None);
        assert_eq!(output.channel(0), &[0.75; 128]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut description = GraphDescription::with_destination(NodeId(0));
        description
            .add_node(NodeId(0), GraphNodeDescription::Destination { channel_count: 1 })
            .add_node(NodeId(1), GraphNodeDescription::Gain { gain: 1.0 })
            .add_node(NodeId(2), GraphNodeDescription::Gain { gain: 1.0 })
            .connect(NodeId(1), NodeId(2))
            .connect(NodeId(2), NodeId(1))
            .connect(NodeId(2), NodeId(0));

        assert!(matches!(
            RenderGraph::build(&description, &config(), 48000.0),
            Err(GraphError::CycleDetected)
        ));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let mut description = GraphDescription::with_destination(NodeId(0));
        description
            .add_node(NodeId(0), GraphNodeDescription::Destination { channel_count: 1 })
            .add_node(NodeId(0), GraphNodeDescription::Gain { gain: 1.0 });
        assert!(matches!(
            RenderGraph::build(&description, &config(), 48000.0),
            Err(GraphError::DuplicateNode(NodeId(0)))
        ));
    }

    #[test]
    fn unknown_connection_endpoint_is_rejected() {
        let mut description = GraphDescription::with_destination(NodeId(0));
        description
            .add_node(NodeId(0), GraphNodeDescription::Destination { channel_count: 1 })
            .connect(NodeId(7), NodeId(0));
        assert!(matches!(
            RenderGraph::build(&description, &config(), 48000.0),
            Err(GraphError::UnknownNode(NodeId(7)))
        ));
    }

    #[test]
    fn unknown_destination_is_rejected() {
        let description = GraphDescription::with_destination(NodeId(42));
        assert!(matches!(
            RenderGraph::build(&description, &config(), 48000.0),
            Err(GraphError::UnknownDestination(NodeId(42)))
        ));
    }

    #[test]
    fn description_update_changes_parameters_between_quanta() {
        let mut graph = RenderGraph::build(&chain_description(), &config(), 48000.0).unwrap();
        assert_eq!(graph.render_quantum(None).channel(0), &[1.0; 128]);

        graph.apply_description(NodeId(2), &GraphNodeDescription::Gain { gain: 4.0 });
        assert_eq!(graph.render_quantum(None).channel(0), &[2.0; 128]);

        // Kind-changing updates are ignored.
        graph.apply_description(
            NodeId(2),
            &GraphNodeDescription::Destination { channel_count: 2 },
        );
        assert_eq!(graph.render_quantum(None).channel(0), &[2.0; 128]);
    }

    #[test]
    fn render_to_vec_concatenates_quanta() {
        let mut graph = RenderGraph::build(&chain_description(), &config(), 48000.0).unwrap();
        let captured = graph.render_to_vec(4, None);
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].len(), 512);
        assert!(captured[0].iter().all(|&s| s == 1.0));
    }
}
