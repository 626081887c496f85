//! Error types for pathway parsing, mirroring and compilation.

use thiserror::Error;

/// Errors detected while parsing a pathway string or during the single
/// compile walk.
///
/// All of these are non-recoverable for the current compile call: there is no
/// partial or best-effort graph, and the only recovery path is a corrected
/// pathway string from the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Character outside the grammar alphabet.
    #[error("unknown token '{token}' at position {position}")]
    UnknownToken { token: char, position: usize },

    /// Pool/unpool or conv/deconv counts do not return to their start value.
    #[error("unbalanced pathway: {counter} counter under-ran or never returned to its start value (position {position})")]
    UnbalancedPathway {
        counter: &'static str,
        position: usize,
    },

    /// `s` token with no registered convolution tap at the required index.
    #[error("dangling skip at position {position}: no convolution registered at stage {stage}")]
    DanglingSkip { stage: usize, position: usize },

    /// A token following a terminal token that may not follow it.
    #[error("invalid terminal: token '{token}' at position {position} follows a terminal stage")]
    InvalidTerminal { token: char, position: usize },

    /// `U` token while the frontier is already a single joined stream.
    #[error("double union at position {position}: channels are already joined")]
    DoubleUnion { position: usize },

    /// An operation expecting N channel-parallel nodes received another count.
    #[error("channel count mismatch: expected {expected} parallel streams, found {found}")]
    ChannelCountMismatch { expected: usize, found: usize },

    /// A mirror input token outside the encoder alphabet `{c,a,m,t}`.
    #[error("token '{token}' at position {position} is not valid in a forward pathway")]
    NonEncoderToken { token: char, position: usize },
}
