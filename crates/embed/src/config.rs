use serde::{Deserialize, Serialize};

use crate::EmbedError;

/// Largest histogram resolution per channel; 16³ = 4096 histogram cells.
pub const MAX_HISTOGRAM_BINS: u32 = 16;

/// Settings for the bundled [`PixelEmbedder`](crate::PixelEmbedder).
///
/// # Example
/// ```
/// use embed::EmbedConfig;
///
/// let cfg = EmbedConfig {
///     thumbnail_side: 8,
///     ..Default::default()
/// };
/// assert_eq!(cfg.dimension(), 3 * 8 * 8 + 4 * 4 * 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbedConfig {
    /// Friendly label surfaced on every [`Embedding`](crate::Embedding).
    pub model_name: String,
    /// Images are resized to `thumbnail_side x thumbnail_side` before the pixel features
    /// are read.
    pub thumbnail_side: u32,
    /// Buckets per colour channel for the joint RGB histogram.
    pub histogram_bins: u32,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "pixel-rgb-hist-v1".into(),
            thumbnail_side: 12,
            histogram_bins: 4,
        }
    }
}

impl EmbedConfig {
    /// Length of the vectors this configuration produces.
    pub fn dimension(&self) -> usize {
        let side = self.thumbnail_side as usize;
        let bins = self.histogram_bins as usize;
        3 * side * side + bins * bins * bins
    }

    pub fn validate(&self) -> Result<(), EmbedError> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::InvalidConfig("model_name must not be empty".into()));
        }
        if self.thumbnail_side == 0 {
            return Err(EmbedError::InvalidConfig(
                "thumbnail_side must be at least 1".into(),
            ));
        }
        if self.histogram_bins == 0 || self.histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(EmbedError::InvalidConfig(format!(
                "histogram_bins must be between 1 and {MAX_HISTOGRAM_BINS}, got {}",
                self.histogram_bins
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let cfg = EmbedConfig::default();
        assert_eq!(cfg.model_name, "pixel-rgb-hist-v1");
        assert_eq!(cfg.thumbnail_side, 12);
        assert_eq!(cfg.histogram_bins, 4);
        assert_eq!(cfg.dimension(), 496);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_rejects_zero_side() {
        let cfg = EmbedConfig {
            thumbnail_side: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(EmbedError::InvalidConfig(_))));
    }

    #[test]
    fn config_rejects_out_of_range_bins() {
        for bins in [0, MAX_HISTOGRAM_BINS + 1] {
            let cfg = EmbedConfig {
                histogram_bins: bins,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "bins={bins}");
        }
    }

    #[test]
    fn config_partial_json_uses_defaults() {
        let cfg: EmbedConfig = serde_json::from_str(r#"{"thumbnail_side": 16}"#).unwrap();
        assert_eq!(cfg.thumbnail_side, 16);
        assert_eq!(cfg.histogram_bins, 4);
        assert_eq!(cfg.model_name, "pixel-rgb-hist-v1");
    }
}
