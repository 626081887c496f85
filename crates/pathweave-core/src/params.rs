//! Structural parameters shared by every stage the compiler emits.

use serde::{Deserialize, Serialize};

/// Whether the build operates on one merged stream or N per-channel streams.
///
/// Joined mode shares one node per stage across all input channels, so
/// channels mix information from the first convolution onward. Independent
/// mode evolves N parallel sub-graphs with no cross-channel mixing until an
/// explicit `U` token concatenates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMode {
    /// One stream shared by all input channels.
    Joined,
    /// One independent stream per input channel.
    Independent,
}

/// Spatial padding policy for convolution stages.
///
/// Forward convolutions use the configured policy; expanding (`d`) and
/// terminal (`f`) convolutions always use [`Padding::Full`] so the decoder
/// recovers the spatial extent the encoder consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    Valid,
    Full,
    Same,
}

/// Downsampling method for pooling stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolMode {
    Average,
    Max,
}

/// Output activation for dense stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// No nonlinearity (localization heads).
    Linear,
    /// Probability-simplex output (dense heads).
    Softmax,
}

/// Structural parameters for graph compilation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetParams {
    /// Convolution kernel width (applied along every spatial dim).
    pub kernel_size: usize,
    /// Pooling/unpooling factor.
    pub pool_size: usize,
    /// Unit count of the configurable `D` dense head.
    pub dense_units: usize,
    /// Filter count of every convolution stage.
    pub filters: usize,
    /// Drop probability of `o` stages.
    pub dropout: f32,
    /// Joined vs independent-channel construction.
    pub channel_mode: ChannelMode,
    /// Padding policy for forward convolutions.
    pub padding: Padding,
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            pool_size: 2,
            dense_units: 256,
            filters: 32,
            dropout: 0.5,
            channel_mode: ChannelMode::Joined,
            padding: Padding::Valid,
        }
    }
}

impl NetParams {
    /// Default parameters in independent-channel mode.
    pub fn independent() -> Self {
        Self {
            channel_mode: ChannelMode::Independent,
            ..Self::default()
        }
    }

    /// Set the convolution kernel width.
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Set the pooling factor.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the `D` head width.
    pub fn with_dense_units(mut self, dense_units: usize) -> Self {
        self.dense_units = dense_units;
        self
    }

    /// Set the per-stage filter count.
    pub fn with_filters(mut self, filters: usize) -> Self {
        self.filters = filters;
        self
    }

    /// Set the channel fan-out mode.
    pub fn with_channel_mode(mut self, channel_mode: ChannelMode) -> Self {
        self.channel_mode = channel_mode;
        self
    }

    /// Set the forward-convolution padding policy.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }
}

/// Input tensor shape. The batch dimension is symbolic and not recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    /// Number of input channels (independent streams in split mode).
    pub channels: usize,
    /// Spatial extents, any dimensionality.
    pub spatial: Vec<usize>,
}

impl InputShape {
    /// Create an input shape.
    pub fn new(channels: usize, spatial: Vec<usize>) -> Self {
        Self { channels, spatial }
    }

    /// Flattened spatial volume: the unit count of the `S` head.
    pub fn spatial_volume(&self) -> usize {
        self.spatial.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_configuration() {
        let params = NetParams::default();
        assert_eq!(params.kernel_size, 3);
        assert_eq!(params.pool_size, 2);
        assert_eq!(params.dense_units, 256);
        assert_eq!(params.filters, 32);
        assert_eq!(params.channel_mode, ChannelMode::Joined);
        assert_eq!(params.padding, Padding::Valid);
    }

    #[test]
    fn test_builder_style_overrides() {
        let params = NetParams::independent()
            .with_filters(16)
            .with_kernel_size(5)
            .with_dense_units(64);
        assert_eq!(params.channel_mode, ChannelMode::Independent);
        assert_eq!(params.filters, 16);
        assert_eq!(params.kernel_size, 5);
        assert_eq!(params.dense_units, 64);
        assert_eq!(params.pool_size, 2);
    }

    #[test]
    fn test_spatial_volume() {
        assert_eq!(InputShape::new(4, vec![32, 32, 32]).spatial_volume(), 32768);
        assert_eq!(InputShape::new(1, vec![]).spatial_volume(), 1);
    }
}
