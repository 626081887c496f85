//! Token vocabulary for pathway strings.
//!
//! This module defines the closed, finite set of structural operators a
//! pathway string is made of. Each operator is written as one
//! case-significant character (`u` and `U` are unrelated tokens), and the
//! table here is the single source of truth for what each one does to the
//! build: the interpreter dispatches on these variants and nothing else.

use serde::{Deserialize, Serialize};

/// One structural operator of the pathway grammar - closed, finite set.
///
/// A parser constrained to this alphabet rejects anything outside it up
/// front, so the graph builder never sees a character it cannot dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    /// `c` - learned local-aggregation (convolution) stage; increments the
    /// conv counter and registers its output as a tap.
    Conv,
    /// `a` - average-downsampling stage; increments the pool counter.
    AvgPool,
    /// `m` - max-downsampling stage; increments the pool counter.
    MaxPool,
    /// `u` - upsampling (unpooling) stage; decrements the pool counter and
    /// must mirror a prior `a`/`m`.
    Unpool,
    /// `t` - learned spatial-transform stage whose parameters are predicted
    /// by an auxiliary dense head branching off the current frontier.
    Transform,
    /// `s` - residual join with the tap registered at the matching earlier
    /// convolution stage.
    Skip,
    /// `d` - expanding (decoder) convolution stage; decrements the conv
    /// counter.
    Deconv,
    /// `o` - dropout stage at the current conv stage index.
    Dropout,
    /// `f` - terminal reconstruction stage producing as many output channels
    /// as the original input; decrements the conv counter.
    Final,
    /// `r` - flatten the frontier into one feature vector per sample.
    Reshape,
    /// `U` - concatenate all per-channel frontier streams into one joined
    /// stream; only meaningful leaving independent-channel mode.
    Union,
    /// `D` - dense projection with a configurable unit count and softmax
    /// output.
    Dense,
    /// `S` - dense spatial-reconstruction head; unit count equals the
    /// flattened spatial volume of the original input.
    SpatialOut,
    /// `C` - binary-classification head (exactly 2 units, softmax).
    ClassOut,
}

impl Token {
    /// Parse a single grammar character. Returns `None` for anything outside
    /// the alphabet.
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'c' => Some(Token::Conv),
            'a' => Some(Token::AvgPool),
            'm' => Some(Token::MaxPool),
            'u' => Some(Token::Unpool),
            't' => Some(Token::Transform),
            's' => Some(Token::Skip),
            'd' => Some(Token::Deconv),
            'o' => Some(Token::Dropout),
            'f' => Some(Token::Final),
            'r' => Some(Token::Reshape),
            'U' => Some(Token::Union),
            'D' => Some(Token::Dense),
            'S' => Some(Token::SpatialOut),
            'C' => Some(Token::ClassOut),
            _ => None,
        }
    }

    /// The grammar character for this token.
    pub fn as_char(self) -> char {
        match self {
            Token::Conv => 'c',
            Token::AvgPool => 'a',
            Token::MaxPool => 'm',
            Token::Unpool => 'u',
            Token::Transform => 't',
            Token::Skip => 's',
            Token::Deconv => 'd',
            Token::Dropout => 'o',
            Token::Final => 'f',
            Token::Reshape => 'r',
            Token::Union => 'U',
            Token::Dense => 'D',
            Token::SpatialOut => 'S',
            Token::ClassOut => 'C',
        }
    }

    /// Tokens allowed in a forward (encoder) pathway.
    pub fn is_encoder(self) -> bool {
        matches!(
            self,
            Token::Conv | Token::AvgPool | Token::MaxPool | Token::Transform
        )
    }

    /// Downsampling tokens. Each must be mirrored by exactly one `u`.
    pub fn is_pool(self) -> bool {
        matches!(self, Token::AvgPool | Token::MaxPool)
    }

    /// Dense output heads. Nothing may follow one of these.
    pub fn is_head(self) -> bool {
        matches!(self, Token::Dense | Token::SpatialOut | Token::ClassOut)
    }

    /// Tokens that produce the graph's final output node.
    pub fn is_terminal(self) -> bool {
        self == Token::Final || self.is_head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHABET: &str = "camutsdofrUDSC";

    #[test]
    fn test_char_round_trip() {
        for ch in ALPHABET.chars() {
            let token = Token::from_char(ch).expect("alphabet character");
            assert_eq!(token.as_char(), ch);
        }
    }

    #[test]
    fn test_unknown_characters_rejected() {
        for ch in ['q', 'x', 'A', 'M', ' ', '1'] {
            assert_eq!(Token::from_char(ch), None, "char {:?}", ch);
        }
    }

    #[test]
    fn test_case_is_significant() {
        assert_eq!(Token::from_char('u'), Some(Token::Unpool));
        assert_eq!(Token::from_char('U'), Some(Token::Union));
        assert_eq!(Token::from_char('d'), Some(Token::Deconv));
        assert_eq!(Token::from_char('D'), Some(Token::Dense));
        assert_eq!(Token::from_char('s'), Some(Token::Skip));
        assert_eq!(Token::from_char('S'), Some(Token::SpatialOut));
        assert_eq!(Token::from_char('c'), Some(Token::Conv));
        assert_eq!(Token::from_char('C'), Some(Token::ClassOut));
    }

    #[test]
    fn test_encoder_classification() {
        for ch in "camt".chars() {
            assert!(Token::from_char(ch).unwrap().is_encoder());
        }
        for ch in "usdofrUDSC".chars() {
            assert!(!Token::from_char(ch).unwrap().is_encoder());
        }
    }

    #[test]
    fn test_terminal_classification() {
        for ch in "fDSC".chars() {
            assert!(Token::from_char(ch).unwrap().is_terminal());
        }
        assert!(!Token::Final.is_head());
        assert!(Token::ClassOut.is_head());
        assert!(!Token::Conv.is_terminal());
    }
}
