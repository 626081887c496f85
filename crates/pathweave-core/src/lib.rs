//! Pathweave: a pathway-grammar compiler for layered network topologies.
//!
//! A *pathway* is a short symbolic string over a closed alphabet in which
//! every character is one structural operator - convolution, pooling,
//! residual skip, channel union - of an encoder/decoder network. This crate
//! compiles such a string, in one left-to-right walk, into a fully-wired
//! graph of typed nodes. Key properties:
//!
//! - **Closed grammar** - a token enum, not character dispatch; anything
//!   outside the alphabet is rejected at parse time
//! - **Deterministic single walk** - one token sequence in, one graph (plus
//!   tap registry) out, no hidden state between calls
//! - **Structural mirroring** - the decoder half of a topology is derived
//!   from the encoder half by token-sequence rewriting
//! - **Opaque execution** - actual layer construction happens behind the
//!   [`LayerFactory`] capability; the compiler never inspects node handles
//!
//! # Example
//!
//! ```
//! use pathweave_core::{
//!     back_pathway, compile, ChannelMode, Graph, InputShape, NetParams, Pathway,
//! };
//!
//! // Encoder half: conv, avg-pool, conv, avg-pool, conv.
//! let forward: Pathway = "cacac".parse().unwrap();
//!
//! // Derive the mirrored decoder half.
//! let back = back_pathway(&forward, ChannelMode::Joined).unwrap();
//! assert_eq!(back.to_string(), "duduf");
//!
//! // Full autoencoder sequence, flattened at the end.
//! let mut full = forward.clone();
//! full.extend(&back);
//! full.extend(&"r".parse().unwrap());
//!
//! let shape = InputShape::new(1, vec![32, 32, 32]);
//! let compiled = compile(Graph::new(), &full, &shape, NetParams::default()).unwrap();
//!
//! assert!(compiled.factory.find("unpool1").is_some());
//! assert!(compiled.output.is_joined());
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub mod mirror;
pub mod params;
pub mod pathway;
pub mod token;

pub use builder::{compile, Builder, Compiled, Frontier, TapRegistry};
pub use error::CompileError;
pub use graph::{Graph, GraphNode, LayerFactory, NodeId, NodeKind, StageKind, StageSpec};
pub use mirror::{back_pathway, shortcut_pathway};
pub use params::{Activation, ChannelMode, InputShape, NetParams, Padding, PoolMode};
pub use pathway::Pathway;
pub use token::Token;
