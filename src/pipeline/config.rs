//! Pipeline configuration.

use image::Rgba;

use crate::error::{Error, Result};
use crate::image::TensorCodec;
use crate::tiling::GridConfig;

/// How content tiles are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileStrategy {
    /// Stream when the content covers a whole tile, tile eagerly otherwise.
    #[default]
    Auto,
    /// Read one tile region at a time and reconstruct as tiles arrive.
    /// Content smaller than a tile is rejected.
    Streaming,
    /// Load the content once, pad it if undersized, and patch all tiles at the end.
    Eager,
}

/// Configuration for the style transfer pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Width of the transfer network's input.
    pub tile_width: u32,

    /// Height of the transfer network's input.
    pub tile_height: u32,

    /// Rows/columns shared by neighbouring tiles.
    pub overlap: u32,

    /// Side of the square style encoder input.
    pub encoder_size: u32,

    /// Length of the style bottleneck.
    pub embedding_len: usize,

    /// Longest content side processed; larger content is downscaled first. `None` keeps full size.
    pub max_content_size: Option<u32>,

    /// Tensor normalization mean.
    pub tensor_mean: f32,

    /// Tensor normalization scale.
    pub tensor_scale: f32,

    /// Streaming or eager tiling.
    pub tile_strategy: TileStrategy,

    /// Fill for padding content smaller than a tile.
    pub pad_color: Rgba<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tile_width: 384,
            tile_height: 384,
            overlap: 50,
            encoder_size: 256,
            embedding_len: 100,
            max_content_size: Some(1440),
            tensor_mean: 0.0,
            tensor_scale: 255.0,
            tile_strategy: TileStrategy::Auto,
            pad_color: Rgba([255, 255, 255, 255]),
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unusable tile geometry and
    /// [`Error::InvalidParameter`] for any other out-of-range value.
    pub fn validate(&self) -> Result<()> {
        GridConfig::validate_tile(self.tile_width, self.tile_height, self.overlap)?;

        if self.encoder_size == 0 {
            return Err(Error::InvalidParameter {
                name: "encoder_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.embedding_len == 0 {
            return Err(Error::InvalidParameter {
                name: "embedding_len".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.max_content_size == Some(0) {
            return Err(Error::InvalidParameter {
                name: "max_content_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        self.codec().map(|_| ())
    }

    /// Tensor codec for this normalization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the scale is zero or not finite.
    pub fn codec(&self) -> Result<TensorCodec> {
        TensorCodec::new(self.tensor_mean, self.tensor_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_overlap_exceeding_tile() {
        let config = Config {
            tile_width: 40,
            overlap: 50,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_embedding_len() {
        let config = Config {
            embedding_len: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_zero_scale() {
        let config = Config {
            tensor_scale: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
