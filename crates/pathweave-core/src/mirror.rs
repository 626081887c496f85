//! Decoder-pathway derivation from a forward (encoder) pathway.
//!
//! Both rewrites here are pure functions over the enumerated token sequence;
//! no raw character substitution is involved, so illegal intermediate
//! strings are unrepresentable.

use crate::error::CompileError;
use crate::params::ChannelMode;
use crate::pathway::Pathway;
use crate::token::Token;

/// Derive the decoder half mirroring a forward pathway.
///
/// The forward sequence is reversed, with convolutions rewritten to
/// expanding convolutions (`c` → `d`) and both pooling variants rewritten to
/// the single unpooling token (`a`/`m` → `u`) - the downsampling method is
/// not distinguishable on the way back up. Spatial transforms (`t`) mirror
/// to themselves; they are counter-neutral on both sides.
///
/// The last `d` of the result (the mirror of the first forward convolution)
/// becomes the terminal reconstruction stage: `f` in joined mode, or `f U`
/// in independent-channel mode so the per-channel streams are re-merged.
///
/// The result pairs every `a`/`m` of the input with exactly one `u`, at the
/// mirrored position, so `forward + back` is always structurally balanced.
pub fn back_pathway(forward: &Pathway, mode: ChannelMode) -> Result<Pathway, CompileError> {
    let mut back = Vec::with_capacity(forward.len() + 1);
    for (position, token) in forward.iter().enumerate() {
        let mirrored = match token {
            Token::Conv => Token::Deconv,
            Token::AvgPool | Token::MaxPool => Token::Unpool,
            Token::Transform => Token::Transform,
            other => {
                return Err(CompileError::NonEncoderToken {
                    token: other.as_char(),
                    position,
                })
            }
        };
        back.push(mirrored);
    }
    back.reverse();

    if let Some(last) = back.iter().rposition(|&t| t == Token::Deconv) {
        back[last] = Token::Final;
        if mode == ChannelMode::Independent {
            back.insert(last + 1, Token::Union);
        }
    }

    Ok(Pathway::from_tokens(back))
}

/// Full `forward + back` sequence with a residual skip inserted before every
/// expanding stage and before the terminal reconstruction.
///
/// A skip immediately wrapping a convolution with no intervening downsample
/// would join a stage to itself, so every adjacent `(c, s, d)` triple is
/// collapsed back to `(c, d)`. The collapse only ever applies to adjacent
/// triples of the token sequence; it cannot mis-fire on unrelated
/// characters the way a substring rewrite could.
pub fn shortcut_pathway(forward: &Pathway, mode: ChannelMode) -> Result<Pathway, CompileError> {
    let back = back_pathway(forward, mode)?;

    let mut full: Vec<Token> = forward.iter().collect();
    for token in back.iter() {
        if matches!(token, Token::Deconv | Token::Final) {
            full.push(Token::Skip);
        }
        full.push(token);
    }

    Ok(Pathway::from_tokens(collapse_self_skips(full)))
}

/// Drop the skip of every adjacent `(c, s, d)` triple.
fn collapse_self_skips(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let n = out.len();
        if token == Token::Deconv
            && n >= 2
            && out[n - 1] == Token::Skip
            && out[n - 2] == Token::Conv
        {
            out.pop();
        }
        out.push(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn back(s: &str, mode: ChannelMode) -> String {
        back_pathway(&s.parse().unwrap(), mode).unwrap().to_string()
    }

    fn shortcut(s: &str, mode: ChannelMode) -> Pathway {
        shortcut_pathway(&s.parse().unwrap(), mode).unwrap()
    }

    #[test]
    fn test_joined_mirror_reference() {
        assert_eq!(back("cacac", ChannelMode::Joined), "duduf");
    }

    #[test]
    fn test_both_pool_kinds_mirror_to_unpool() {
        assert_eq!(back("cac", ChannelMode::Joined), "duf");
        assert_eq!(back("cmc", ChannelMode::Joined), "duf");
    }

    #[test]
    fn test_independent_mirror_re_merges_channels() {
        assert_eq!(back("cacac", ChannelMode::Independent), "dudufU");
        assert_eq!(back("c", ChannelMode::Independent), "fU");
    }

    #[test]
    fn test_transform_mirrors_to_itself() {
        assert_eq!(back("ctac", ChannelMode::Joined), "dutf");
    }

    #[test]
    fn test_single_conv() {
        assert_eq!(back("c", ChannelMode::Joined), "f");
    }

    #[test]
    fn test_pool_unpool_counts_match() {
        for forward in ["c", "ca", "cacac", "cmcmc", "camtc", "ccammcc"] {
            let pathway: Pathway = forward.parse().unwrap();
            let mirrored = back_pathway(&pathway, ChannelMode::Joined).unwrap();
            assert_eq!(
                pathway.count(Token::is_pool),
                mirrored.count(|t| t == Token::Unpool),
                "forward {:?}",
                forward
            );
        }
    }

    #[test]
    fn test_mirror_is_pure() {
        let forward: Pathway = "camc".parse().unwrap();
        let first = back_pathway(&forward, ChannelMode::Joined).unwrap();
        let second = back_pathway(&forward, ChannelMode::Joined).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_encoder_tokens_rejected() {
        let err = back_pathway(&"cad".parse().unwrap(), ChannelMode::Joined).unwrap_err();
        assert_eq!(
            err,
            CompileError::NonEncoderToken {
                token: 'd',
                position: 2
            }
        );
    }

    #[test]
    fn test_shortcut_collapses_boundary_skip() {
        // "cmc" mirrors to "duf"; skip insertion yields "sdusf" and the
        // boundary triple c,s,d collapses, leaving one real skip.
        let full = shortcut("cmc", ChannelMode::Joined);
        assert_eq!(full.to_string(), "cmcdusf");
    }

    #[test]
    fn test_no_self_skip_survives_collapse() {
        for forward in ["c", "cc", "cmc", "cacac", "ccmcc"] {
            let full = shortcut(forward, ChannelMode::Joined);
            assert!(
                !full.contains_triple([Token::Conv, Token::Skip, Token::Deconv]),
                "forward {:?} produced {}",
                forward,
                full
            );
        }
    }

    #[test]
    fn test_shortcut_keeps_interior_skips() {
        // Two pooling levels: the deeper deconv keeps its skip.
        let full = shortcut("cacac", ChannelMode::Joined);
        assert_eq!(full.to_string(), "cacacdusdusf");
    }

    #[test]
    fn test_empty_forward() {
        assert_eq!(back("", ChannelMode::Joined), "");
        assert!(shortcut("", ChannelMode::Joined).is_empty());
    }
}
