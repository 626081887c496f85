//! The node-constructor capability and the default recording graph.
//!
//! The compiler never executes anything. It describes each stage as a
//! [`StageSpec`] and hands it to a [`LayerFactory`], which returns an opaque
//! handle; the compiler only threads handles back into further constructor
//! calls. [`Graph`] is the default factory: an append-only arena of typed
//! nodes, stored in construction (and therefore topological) order.

use serde::{Deserialize, Serialize};

use crate::params::{Activation, Padding, PoolMode};

/// Identifier of a node in the default [`Graph`] factory.
pub type NodeId = usize;

/// Parameters of one graph stage, as handed to the node constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageKind {
    /// Learned local aggregation.
    Conv {
        filters: usize,
        kernel: usize,
        pad: Padding,
    },
    /// Normalization wrapped around every conv/deconv stage.
    BatchNorm,
    /// Expanding convolution; padding is always full.
    Deconv { filters: usize, kernel: usize },
    /// Terminal reconstruction convolution; padding is always full.
    FinalConv { channels: usize, kernel: usize },
    /// Downsampling.
    Pool { size: usize, mode: PoolMode },
    /// Upsampling, mirroring a prior pool.
    Unpool { size: usize },
    /// Spatial transform driven by a localization head (second incoming).
    Transform,
    /// Element-wise sum of a registered tap with the frontier.
    SkipSum,
    /// Regularizing dropout.
    Dropout { p: f32 },
    /// Shape collapse to one feature vector per sample.
    Flatten,
    /// Channel-wise concatenation of parallel streams.
    Concat,
    /// Fully-connected projection.
    Dense { units: usize, activation: Activation },
}

/// A named stage specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique-by-convention stage name (e.g. `conv2`, `avg_pool1_0`).
    pub name: String,
    /// Stage parameters.
    pub kind: StageKind,
}

impl StageSpec {
    /// Create a stage specification.
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The execution engine's node-constructor capability.
///
/// Implementations receive the stage parameters and the incoming handles and
/// return a handle for the constructed element. The compiler never inspects
/// a handle's contents.
pub trait LayerFactory {
    /// Opaque node handle.
    type Handle: Clone;

    /// Construct an input node.
    fn input(&mut self, name: &str, channels: usize, spatial: &[usize]) -> Self::Handle;

    /// Construct one stage from the given incoming nodes.
    fn stage(&mut self, spec: StageSpec, incoming: &[Self::Handle]) -> Self::Handle;
}

/// What a recorded node is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// An input declaration.
    Input { channels: usize, spatial: Vec<usize> },
    /// A constructed stage.
    Stage(StageKind),
}

/// A node recorded by the default [`Graph`] factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Arena index, identical to the handle the factory returned.
    pub id: NodeId,
    /// Stage name.
    pub name: String,
    /// Node contents.
    pub kind: NodeKind,
    /// Incoming node ids, always lower than `id`.
    pub incoming: Vec<NodeId>,
}

/// Default recording factory.
///
/// Every constructor call appends one typed node, so the arena order is a
/// topological order and structural queries (counts, depth) are linear scans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded nodes, inputs included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes, in construction order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Find a node by its stage name.
    pub fn find(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Count stages whose kind satisfies a predicate (inputs excluded).
    pub fn stage_count(&self, pred: impl Fn(&StageKind) -> bool) -> usize {
        self.nodes
            .iter()
            .filter(|n| match &n.kind {
                NodeKind::Stage(kind) => pred(kind),
                NodeKind::Input { .. } => false,
            })
            .count()
    }

    /// Number of input nodes.
    pub fn input_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Input { .. }))
            .count()
    }

    /// Longest node-hop path from any input to any node.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max = 0;
        for node in &self.nodes {
            let depth = node
                .incoming
                .iter()
                .map(|&i| depths[i] + 1)
                .max()
                .unwrap_or(0);
            depths[node.id] = depth;
            max = max.max(depth);
        }
        max
    }
}

impl LayerFactory for Graph {
    type Handle = NodeId;

    fn input(&mut self, name: &str, channels: usize, spatial: &[usize]) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            id,
            name: name.to_string(),
            kind: NodeKind::Input {
                channels,
                spatial: spatial.to_vec(),
            },
            incoming: Vec::new(),
        });
        id
    }

    fn stage(&mut self, spec: StageSpec, incoming: &[NodeId]) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            id,
            name: spec.name,
            kind: NodeKind::Stage(spec.kind),
            incoming: incoming.to_vec(),
        });
        id
    }
}
