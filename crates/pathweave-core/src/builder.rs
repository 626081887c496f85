//! The pathway interpreter: a single left-to-right walk that wires stages.
//!
//! The builder consumes tokens one-by-one, threading the whole build state
//! (frontier, stage counters, tap registry) through the walk and emitting
//! one constructor call per stage. Every structural error of the grammar is
//! detected during this walk; there is no separate validation pass.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CompileError;
use crate::graph::{LayerFactory, StageKind, StageSpec};
use crate::params::{Activation, ChannelMode, InputShape, NetParams, PoolMode};
use crate::pathway::Pathway;
use crate::token::Token;

/// The open end of the graph under construction.
///
/// This is the only representation of channel fan-out in the crate: a stage
/// either extends one joined stream or all N per-channel streams, and only
/// the `U` token may move a build from `Split` to `Joined`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frontier<H> {
    /// One node shared across all input channels.
    Joined(H),
    /// One node per input channel, in channel order.
    Split(Vec<H>),
}

impl<H> Frontier<H> {
    /// Number of parallel streams.
    pub fn width(&self) -> usize {
        match self {
            Frontier::Joined(_) => 1,
            Frontier::Split(nodes) => nodes.len(),
        }
    }

    /// True once the build operates on a single stream.
    pub fn is_joined(&self) -> bool {
        matches!(self, Frontier::Joined(_))
    }

    /// The single handle of a joined frontier.
    pub fn as_joined(&self) -> Option<&H> {
        match self {
            Frontier::Joined(node) => Some(node),
            Frontier::Split(_) => None,
        }
    }
}

/// Intermediate nodes retained for later skip joins and diagnostics.
///
/// Entries are added at convolution stages and never removed; they live for
/// the whole build and stay available on the compiled result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRegistry<H> {
    convs: BTreeMap<usize, Frontier<H>>,
    localizations: Vec<Frontier<H>>,
}

impl<H> Default for TapRegistry<H> {
    fn default() -> Self {
        Self {
            convs: BTreeMap::new(),
            localizations: Vec::new(),
        }
    }
}

impl<H> TapRegistry<H> {
    /// The tap registered at a convolution stage index, if any.
    pub fn conv(&self, stage: usize) -> Option<&Frontier<H>> {
        self.convs.get(&stage)
    }

    /// Registered convolution stage indices, ascending.
    pub fn conv_stages(&self) -> impl Iterator<Item = usize> + '_ {
        self.convs.keys().copied()
    }

    /// The most recent localization-network tap, for downstream
    /// transform-parameter extraction.
    pub fn localization(&self) -> Option<&Frontier<H>> {
        self.localizations.last()
    }

    /// All localization-network taps, in construction order.
    pub fn localizations(&self) -> &[Frontier<H>] {
        &self.localizations
    }

    fn register_conv(&mut self, stage: usize, tap: Frontier<H>) {
        self.convs.insert(stage, tap);
    }

    fn register_localization(&mut self, tap: Frontier<H>) {
        self.localizations.push(tap);
    }
}

/// Where the walk stands relative to terminal tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TerminalState {
    /// No terminal consumed yet.
    #[default]
    Open,
    /// `f` consumed; only `U`, `r` and dense heads may follow.
    AfterFinal,
    /// A dense head consumed; nothing may follow.
    Closed,
}

/// The result of a compile walk.
pub struct Compiled<F: LayerFactory> {
    /// The factory, with every constructed node inside it.
    pub factory: F,
    /// The final frontier: the compiled graph's terminal node(s).
    pub output: Frontier<F::Handle>,
    /// Conv-stage and localization taps retained from the walk.
    pub taps: TapRegistry<F::Handle>,
}

impl<F> fmt::Debug for Compiled<F>
where
    F: LayerFactory + fmt::Debug,
    F::Handle: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiled")
            .field("factory", &self.factory)
            .field("output", &self.output)
            .field("taps", &self.taps)
            .finish()
    }
}

/// Deterministic interpreter for pathway token sequences.
///
/// Construction creates the input node(s) per the channel mode; each
/// [`push`](Builder::push) dispatches one token; [`finish`](Builder::finish)
/// hands back the factory, terminal frontier and tap registry. Mirrored
/// architectures additionally call
/// [`finish_balanced`](Builder::finish_balanced) to assert that both stage
/// counters returned to their start value.
pub struct Builder<F: LayerFactory> {
    factory: F,
    params: NetParams,
    shape: InputShape,
    frontier: Frontier<F::Handle>,
    taps: TapRegistry<F::Handle>,
    conv_index: usize,
    pool_index: usize,
    terminal: TerminalState,
    position: usize,
}

impl<F: LayerFactory> Builder<F> {
    /// Start a build: constructs the input node (joined mode) or one input
    /// node per channel (independent mode).
    pub fn new(mut factory: F, shape: &InputShape, params: NetParams) -> Self {
        let frontier = match params.channel_mode {
            ChannelMode::Joined => {
                Frontier::Joined(factory.input("input", shape.channels, &shape.spatial))
            }
            ChannelMode::Independent => Frontier::Split(
                (0..shape.channels)
                    .map(|i| factory.input(&format!("input_{i}"), 1, &shape.spatial))
                    .collect(),
            ),
        };
        Self {
            factory,
            params,
            shape: shape.clone(),
            frontier,
            taps: TapRegistry::default(),
            conv_index: 1,
            pool_index: 1,
            terminal: TerminalState::Open,
            position: 0,
        }
    }

    /// Current width of the frontier.
    pub fn width(&self) -> usize {
        self.frontier.width()
    }

    /// True if both stage counters are back at their start value.
    pub fn is_balanced(&self) -> bool {
        self.conv_index == 1 && self.pool_index == 1
    }

    /// Feed a single token to the builder.
    pub fn push(&mut self, token: Token) -> Result<(), CompileError> {
        let position = self.position;
        self.check_terminal(token, position)?;
        match token {
            Token::Conv => self.conv(),
            Token::AvgPool => self.pool(PoolMode::Average),
            Token::MaxPool => self.pool(PoolMode::Max),
            Token::Unpool => self.unpool(position)?,
            Token::Transform => self.transform()?,
            Token::Skip => self.skip(position)?,
            Token::Deconv => self.deconv(position)?,
            Token::Dropout => self.dropout(),
            Token::Final => self.final_conv(position)?,
            Token::Reshape => self.reshape(),
            Token::Union => self.union(position)?,
            Token::Dense => self.dense("dense", self.params.dense_units),
            Token::SpatialOut => self.dense("spatial_out", self.shape.spatial_volume()),
            Token::ClassOut => self.dense("class_out", 2),
        }
        self.position += 1;
        Ok(())
    }

    /// Feed a whole pathway.
    pub fn push_all(&mut self, pathway: &Pathway) -> Result<(), CompileError> {
        for token in pathway.iter() {
            self.push(token)?;
        }
        Ok(())
    }

    /// Finalize the build.
    pub fn finish(self) -> Compiled<F> {
        Compiled {
            factory: self.factory,
            output: self.frontier,
            taps: self.taps,
        }
    }

    /// Finalize a mirrored build, asserting structural balance: both stage
    /// counters must have returned to their start value.
    pub fn finish_balanced(self) -> Result<Compiled<F>, CompileError> {
        if self.conv_index != 1 {
            return Err(CompileError::UnbalancedPathway {
                counter: "conv",
                position: self.position,
            });
        }
        if self.pool_index != 1 {
            return Err(CompileError::UnbalancedPathway {
                counter: "pool",
                position: self.position,
            });
        }
        Ok(self.finish())
    }

    fn check_terminal(&self, token: Token, position: usize) -> Result<(), CompileError> {
        let allowed = match self.terminal {
            TerminalState::Open => true,
            TerminalState::AfterFinal => {
                matches!(token, Token::Union | Token::Reshape) || token.is_head()
            }
            TerminalState::Closed => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(CompileError::InvalidTerminal {
                token: token.as_char(),
                position,
            })
        }
    }

    /// Apply one single-input stage to the frontier, uniformly in joined or
    /// independent mode, and advance it.
    fn advance(&mut self, base: &str, kind: StageKind) {
        let current = std::mem::replace(&mut self.frontier, Frontier::Split(Vec::new()));
        self.frontier = self.fan_out(current, base, kind);
    }

    /// Construct one single-input stage per stream of `incoming`.
    fn fan_out(
        &mut self,
        incoming: Frontier<F::Handle>,
        base: &str,
        kind: StageKind,
    ) -> Frontier<F::Handle> {
        match incoming {
            Frontier::Joined(node) => {
                Frontier::Joined(self.factory.stage(StageSpec::new(base, kind), &[node]))
            }
            Frontier::Split(nodes) => Frontier::Split(
                nodes
                    .into_iter()
                    .enumerate()
                    .map(|(i, node)| {
                        self.factory
                            .stage(StageSpec::new(format!("{base}_{i}"), kind.clone()), &[node])
                    })
                    .collect(),
            ),
        }
    }

    /// Construct one two-input stage per stream, pairing `left` and `right`
    /// channel by channel. Both sides must have the same width.
    fn join(
        &mut self,
        left: Frontier<F::Handle>,
        right: Frontier<F::Handle>,
        base: &str,
        kind: StageKind,
    ) -> Result<Frontier<F::Handle>, CompileError> {
        match (left, right) {
            (Frontier::Joined(a), Frontier::Joined(b)) => Ok(Frontier::Joined(
                self.factory.stage(StageSpec::new(base, kind), &[a, b]),
            )),
            (Frontier::Split(a), Frontier::Split(b)) => {
                if a.len() != b.len() {
                    return Err(CompileError::ChannelCountMismatch {
                        expected: a.len(),
                        found: b.len(),
                    });
                }
                Ok(Frontier::Split(
                    a.into_iter()
                        .zip(b)
                        .enumerate()
                        .map(|(i, (l, r))| {
                            self.factory.stage(
                                StageSpec::new(format!("{base}_{i}"), kind.clone()),
                                &[l, r],
                            )
                        })
                        .collect(),
                ))
            }
            (Frontier::Joined(_), Frontier::Split(b)) => Err(CompileError::ChannelCountMismatch {
                expected: 1,
                found: b.len(),
            }),
            (Frontier::Split(a), Frontier::Joined(_)) => Err(CompileError::ChannelCountMismatch {
                expected: a.len(),
                found: 1,
            }),
        }
    }

    fn conv(&mut self) {
        let index = self.conv_index;
        self.advance(
            &format!("conv{index}"),
            StageKind::Conv {
                filters: self.params.filters,
                kernel: self.params.kernel_size,
                pad: self.params.padding,
            },
        );
        self.advance(&format!("norm{index}"), StageKind::BatchNorm);
        self.taps.register_conv(index, self.frontier.clone());
        self.conv_index += 1;
    }

    fn pool(&mut self, mode: PoolMode) {
        let index = self.pool_index;
        let base = match mode {
            PoolMode::Average => format!("avg_pool{index}"),
            PoolMode::Max => format!("max_pool{index}"),
        };
        self.advance(
            &base,
            StageKind::Pool {
                size: self.params.pool_size,
                mode,
            },
        );
        self.pool_index += 1;
    }

    fn unpool(&mut self, position: usize) -> Result<(), CompileError> {
        if self.pool_index <= 1 {
            return Err(CompileError::UnbalancedPathway {
                counter: "pool",
                position,
            });
        }
        self.pool_index -= 1;
        let index = self.pool_index;
        self.advance(
            &format!("unpool{index}"),
            StageKind::Unpool {
                size: self.params.pool_size,
            },
        );
        Ok(())
    }

    fn transform(&mut self) -> Result<(), CompileError> {
        let incoming = self.frontier.clone();
        let localization = self.fan_out(
            incoming.clone(),
            "loc_net",
            StageKind::Dense {
                units: 12,
                activation: Activation::Linear,
            },
        );
        self.taps.register_localization(localization.clone());
        self.frontier = self.join(incoming, localization, "transform", StageKind::Transform)?;
        Ok(())
    }

    fn skip(&mut self, position: usize) -> Result<(), CompileError> {
        let stage = self.conv_index - 1;
        let tap = self
            .taps
            .conv(stage)
            .cloned()
            .ok_or(CompileError::DanglingSkip { stage, position })?;
        let current = self.frontier.clone();
        self.frontier = self.join(tap, current, &format!("short{stage}"), StageKind::SkipSum)?;
        Ok(())
    }

    fn deconv(&mut self, position: usize) -> Result<(), CompileError> {
        if self.conv_index <= 1 {
            return Err(CompileError::UnbalancedPathway {
                counter: "conv",
                position,
            });
        }
        self.conv_index -= 1;
        let index = self.conv_index;
        self.advance(
            &format!("deconv{index}"),
            StageKind::Deconv {
                filters: self.params.filters,
                kernel: self.params.kernel_size,
            },
        );
        self.advance(&format!("denorm{index}"), StageKind::BatchNorm);
        Ok(())
    }

    fn dropout(&mut self) {
        let index = self.conv_index.saturating_sub(1);
        self.advance(
            &format!("drop{index}"),
            StageKind::Dropout {
                p: self.params.dropout,
            },
        );
    }

    fn final_conv(&mut self, position: usize) -> Result<(), CompileError> {
        if self.conv_index <= 1 {
            return Err(CompileError::UnbalancedPathway {
                counter: "conv",
                position,
            });
        }
        self.conv_index -= 1;
        // One reconstruction filter per original channel in joined mode;
        // per-channel streams each reconstruct their single channel.
        let channels = if self.frontier.is_joined() {
            self.shape.channels
        } else {
            1
        };
        self.advance(
            "final",
            StageKind::FinalConv {
                channels,
                kernel: self.params.kernel_size,
            },
        );
        self.terminal = TerminalState::AfterFinal;
        Ok(())
    }

    fn reshape(&mut self) {
        self.advance("reshape", StageKind::Flatten);
    }

    fn union(&mut self, position: usize) -> Result<(), CompileError> {
        let nodes = match std::mem::replace(&mut self.frontier, Frontier::Split(Vec::new())) {
            Frontier::Joined(node) => {
                self.frontier = Frontier::Joined(node);
                return Err(CompileError::DoubleUnion { position });
            }
            Frontier::Split(nodes) => nodes,
        };
        let joined = self
            .factory
            .stage(StageSpec::new("union", StageKind::Concat), &nodes);
        self.frontier = Frontier::Joined(joined);
        Ok(())
    }

    fn dense(&mut self, base: &str, units: usize) {
        self.advance(
            base,
            StageKind::Dense {
                units,
                activation: Activation::Softmax,
            },
        );
        self.terminal = TerminalState::Closed;
    }
}

/// Compile a full pathway against a node factory.
///
/// This is the top-level entry point: it walks the token sequence once and
/// returns the terminal frontier plus the tap registry. Balance of the
/// stage counters is not asserted here - encoder-only architectures are
/// legitimate; mirrored builds go through [`Builder::finish_balanced`].
pub fn compile<F: LayerFactory>(
    factory: F,
    pathway: &Pathway,
    shape: &InputShape,
    params: NetParams,
) -> Result<Compiled<F>, CompileError> {
    let mut builder = Builder::new(factory, shape, params);
    builder.push_all(pathway)?;
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, NodeKind};

    fn shape() -> InputShape {
        InputShape::new(1, vec![16, 16, 16])
    }

    fn shape3() -> InputShape {
        InputShape::new(3, vec![16, 16, 16])
    }

    fn compile_str(pathway: &str, shape: &InputShape, params: NetParams) -> Compiled<Graph> {
        compile(Graph::new(), &pathway.parse().unwrap(), shape, params).unwrap()
    }

    fn compile_err(pathway: &str, shape: &InputShape, params: NetParams) -> CompileError {
        compile(Graph::new(), &pathway.parse().unwrap(), shape, params).unwrap_err()
    }

    #[test]
    fn test_joined_conv_emits_conv_and_norm() {
        let compiled = compile_str("c", &shape(), NetParams::default());
        let graph = &compiled.factory;
        assert!(graph.find("conv1").is_some());
        assert!(graph.find("norm1").is_some());
        assert_eq!(graph.node_count(), 3); // input, conv1, norm1
        assert_eq!(compiled.output.width(), 1);
    }

    #[test]
    fn test_tap_registered_per_conv_stage() {
        let compiled = compile_str("cc", &shape(), NetParams::default());
        assert_eq!(compiled.taps.conv_stages().collect::<Vec<_>>(), vec![1, 2]);
        // Taps point at the normalized conv outputs.
        let tap = compiled.taps.conv(1).unwrap().as_joined().copied().unwrap();
        assert_eq!(compiled.factory.get(tap).unwrap().name, "norm1");
    }

    #[test]
    fn test_balanced_unet_walk() {
        let mut builder = Builder::new(Graph::new(), &shape(), NetParams::default());
        builder.push_all(&"cacacdudufrS".parse().unwrap()).unwrap();
        assert!(builder.is_balanced());
        let compiled = builder.finish_balanced().unwrap();
        assert!(compiled.factory.find("unpool1").is_some());
        assert!(compiled.factory.find("deconv2").is_some());
        assert!(compiled.factory.find("final").is_some());
    }

    #[test]
    fn test_encoder_only_is_not_balanced() {
        let mut builder = Builder::new(Graph::new(), &shape(), NetParams::default());
        builder.push_all(&"ca".parse().unwrap()).unwrap();
        assert!(!builder.is_balanced());
        assert!(matches!(
            builder.finish_balanced(),
            Err(CompileError::UnbalancedPathway { counter: "conv", .. })
        ));
    }

    #[test]
    fn test_unpool_underrun() {
        assert_eq!(
            compile_err("u", &shape(), NetParams::default()),
            CompileError::UnbalancedPathway {
                counter: "pool",
                position: 0
            }
        );
        assert_eq!(
            compile_err("cauu", &shape(), NetParams::default()),
            CompileError::UnbalancedPathway {
                counter: "pool",
                position: 3
            }
        );
    }

    #[test]
    fn test_deconv_underrun() {
        assert_eq!(
            compile_err("d", &shape(), NetParams::default()),
            CompileError::UnbalancedPathway {
                counter: "conv",
                position: 0
            }
        );
    }

    #[test]
    fn test_dangling_skip() {
        assert_eq!(
            compile_err("s", &shape(), NetParams::default()),
            CompileError::DanglingSkip {
                stage: 0,
                position: 0
            }
        );
    }

    #[test]
    fn test_skip_joins_matching_conv_stage() {
        // After one deconv the skip must join the tap whose index mirrors
        // the current decoder stage.
        let compiled = compile_str("cmcdus", &shape(), NetParams::default());
        let short = compiled.factory.find("short1").unwrap();
        let tap = compiled.taps.conv(1).unwrap().as_joined().copied().unwrap();
        assert_eq!(short.incoming[0], tap);
    }

    #[test]
    fn test_skip_rejects_width_mismatch_across_union() {
        // The tap at stage 1 was recorded while the walk was still split;
        // after the union the frontier is joined, so the skip cannot pair
        // them channel by channel.
        assert_eq!(
            compile_err("cUs", &shape3(), NetParams::independent()),
            CompileError::ChannelCountMismatch {
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn test_double_union_in_joined_mode() {
        assert_eq!(
            compile_err("cU", &shape(), NetParams::default()),
            CompileError::DoubleUnion { position: 1 }
        );
    }

    #[test]
    fn test_second_union_in_independent_mode() {
        assert_eq!(
            compile_err("cUU", &shape3(), NetParams::independent()),
            CompileError::DoubleUnion { position: 2 }
        );
    }

    #[test]
    fn test_independent_fan_out_until_union() {
        let compiled = compile_str("cU", &shape3(), NetParams::independent());
        let graph = &compiled.factory;
        assert_eq!(graph.input_count(), 3);
        assert_eq!(graph.stage_count(|k| matches!(k, StageKind::Conv { .. })), 3);
        assert_eq!(graph.stage_count(|k| matches!(k, StageKind::Concat)), 1);
        assert!(graph.find("conv1_0").is_some());
        assert!(graph.find("conv1_2").is_some());
        assert!(compiled.output.is_joined());
    }

    #[test]
    fn test_joined_after_union_stays_joined() {
        let compiled = compile_str("cUc", &shape3(), NetParams::independent());
        let graph = &compiled.factory;
        // conv2 runs once, on the joined stream.
        assert_eq!(graph.stage_count(|k| matches!(k, StageKind::Conv { .. })), 4);
        assert!(graph.find("conv2").is_some());
        assert!(graph.find("conv2_0").is_none());
    }

    #[test]
    fn test_frontier_width_invariant_in_split_mode() {
        let mut builder = Builder::new(Graph::new(), &shape3(), NetParams::independent());
        for token in "camc".parse::<Pathway>().unwrap().iter() {
            builder.push(token).unwrap();
            assert_eq!(builder.width(), 3);
        }
        builder.push(Token::Union).unwrap();
        assert_eq!(builder.width(), 1);
    }

    #[test]
    fn test_structural_token_after_final_rejected() {
        assert_eq!(
            compile_err("ccfc", &shape(), NetParams::default()),
            CompileError::InvalidTerminal {
                token: 'c',
                position: 3
            }
        );
    }

    #[test]
    fn test_second_final_rejected() {
        assert_eq!(
            compile_err("ccff", &shape(), NetParams::default()),
            CompileError::InvalidTerminal {
                token: 'f',
                position: 3
            }
        );
    }

    #[test]
    fn test_nothing_follows_a_dense_head() {
        assert_eq!(
            compile_err("crCr", &shape(), NetParams::default()),
            CompileError::InvalidTerminal {
                token: 'r',
                position: 3
            }
        );
        assert_eq!(
            compile_err("crCD", &shape(), NetParams::default()),
            CompileError::InvalidTerminal {
                token: 'D',
                position: 3
            }
        );
    }

    #[test]
    fn test_final_then_flatten_then_head_is_legal() {
        let compiled = compile_str("ccfrC", &shape(), NetParams::default());
        let head = compiled.factory.find("class_out").unwrap();
        match &head.kind {
            NodeKind::Stage(StageKind::Dense { units, activation }) => {
                assert_eq!(*units, 2);
                assert_eq!(*activation, Activation::Softmax);
            }
            other => panic!("unexpected head kind {:?}", other),
        }
    }

    #[test]
    fn test_spatial_head_units_equal_spatial_volume() {
        let compiled = compile_str("crS", &shape(), NetParams::default());
        let head = compiled.factory.find("spatial_out").unwrap();
        match &head.kind {
            NodeKind::Stage(StageKind::Dense { units, .. }) => {
                assert_eq!(*units, 16 * 16 * 16)
            }
            other => panic!("unexpected head kind {:?}", other),
        }
    }

    #[test]
    fn test_transform_branches_localization_head() {
        let compiled = compile_str("ct", &shape(), NetParams::default());
        let graph = &compiled.factory;
        let loc = graph.find("loc_net").unwrap();
        let transform = graph.find("transform").unwrap();
        assert_eq!(transform.incoming.len(), 2);
        assert!(transform.incoming.contains(&loc.id));
        let tap = compiled.taps.localization().unwrap();
        assert_eq!(tap.as_joined().copied(), Some(loc.id));
    }

    #[test]
    fn test_final_channels_match_input_channels() {
        let shape = InputShape::new(4, vec![8, 8]);
        let compiled = compile_str("ccf", &shape, NetParams::default());
        let fin = compiled.factory.find("final").unwrap();
        match &fin.kind {
            NodeKind::Stage(StageKind::FinalConv { channels, .. }) => assert_eq!(*channels, 4),
            other => panic!("unexpected final kind {:?}", other),
        }
    }

    #[test]
    fn test_dropout_named_after_current_conv_stage() {
        let compiled = compile_str("co", &shape(), NetParams::default());
        assert!(compiled.factory.find("drop1").is_some());
    }
}
