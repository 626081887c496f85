//! Pathway strings: the order-significant token-sequence surface format.
//!
//! A pathway is the textual interface of the whole crate - a short string
//! over the grammar alphabet describing one architecture half (encoder or
//! decoder) or a complete compiled sequence. Parsing rejects the first
//! character outside the alphabet; serialization round-trips through the
//! exact string form so pathways can live in config files unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CompileError;
use crate::token::Token;

/// An ordered token sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pathway(Vec<Token>);

impl Pathway {
    /// Create an empty pathway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token sequence.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    /// The tokens, in order.
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the pathway has no tokens.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one token.
    pub fn push(&mut self, token: Token) {
        self.0.push(token);
    }

    /// Append all tokens of another pathway.
    pub fn extend(&mut self, other: &Pathway) {
        self.0.extend_from_slice(&other.0);
    }

    /// Iterate over the tokens by value.
    pub fn iter(&self) -> impl Iterator<Item = Token> + '_ {
        self.0.iter().copied()
    }

    /// Count tokens satisfying a predicate.
    pub fn count(&self, pred: impl Fn(Token) -> bool) -> usize {
        self.0.iter().filter(|&&t| pred(t)).count()
    }

    /// True if the three tokens appear adjacently anywhere in the sequence.
    pub fn contains_triple(&self, triple: [Token; 3]) -> bool {
        self.0.windows(3).any(|w| w == triple)
    }
}

impl FromStr for Pathway {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .enumerate()
            .map(|(position, ch)| {
                Token::from_char(ch).ok_or(CompileError::UnknownToken {
                    token: ch,
                    position,
                })
            })
            .collect()
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            write!(f, "{}", token.as_char())?;
        }
        Ok(())
    }
}

impl From<Vec<Token>> for Pathway {
    fn from(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }
}

impl FromIterator<Token> for Pathway {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Pathway {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pathway {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
