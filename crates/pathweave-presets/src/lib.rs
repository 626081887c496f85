//! Ready-made pathway generators for the standard architecture family.
//!
//! Each generator takes the encoder half of a topology and produces the
//! complete token sequence for one architecture: symmetric autoencoder,
//! u-net with a detection or segmentation head, or a plain convolutional
//! classifier. Generators are pure; compiling the result is the caller's
//! business (usually via [`pathweave_core::compile`]).

use pathweave_core::{
    back_pathway, shortcut_pathway, ChannelMode, CompileError, Pathway, Token,
};

/// Symmetric autoencoder: encoder, mirrored decoder, flatten.
pub fn autoencoder(forward: &Pathway, mode: ChannelMode) -> Result<Pathway, CompileError> {
    let mut full = forward.clone();
    full.extend(&back_pathway(forward, mode)?);
    full.push(Token::Reshape);
    Ok(full)
}

/// U-net with a binary-classification head.
///
/// With `shortcuts` set, every decoder stage is joined with its mirrored
/// encoder stage by a residual skip.
pub fn unet_detection(
    forward: &Pathway,
    mode: ChannelMode,
    shortcuts: bool,
) -> Result<Pathway, CompileError> {
    let mut full = unet_body(forward, mode, shortcuts)?;
    full.push(Token::Reshape);
    full.push(Token::ClassOut);
    Ok(full)
}

/// U-net with a dense spatial-reconstruction head.
pub fn unet_segmentation(
    forward: &Pathway,
    mode: ChannelMode,
    shortcuts: bool,
) -> Result<Pathway, CompileError> {
    let mut full = unet_body(forward, mode, shortcuts)?;
    full.push(Token::Reshape);
    full.push(Token::SpatialOut);
    Ok(full)
}

/// Plain convolutional classifier: dropout after every pooling stage, then
/// flatten (re-merging channels first in independent mode) and classify.
pub fn cnn_detection(forward: &Pathway, mode: ChannelMode) -> Result<Pathway, CompileError> {
    let mut full = Pathway::new();
    for (position, token) in forward.iter().enumerate() {
        if !token.is_encoder() {
            return Err(CompileError::NonEncoderToken {
                token: token.as_char(),
                position,
            });
        }
        full.push(token);
        if token.is_pool() {
            full.push(Token::Dropout);
        }
    }
    full.push(Token::Reshape);
    if mode == ChannelMode::Independent {
        full.push(Token::Union);
    }
    full.push(Token::ClassOut);
    Ok(full)
}

fn unet_body(
    forward: &Pathway,
    mode: ChannelMode,
    shortcuts: bool,
) -> Result<Pathway, CompileError> {
    if shortcuts {
        shortcut_pathway(forward, mode)
    } else {
        let mut full = forward.clone();
        full.extend(&back_pathway(forward, mode)?);
        Ok(full)
    }
}
