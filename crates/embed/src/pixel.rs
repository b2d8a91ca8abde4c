use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::normalize::{l2_norm, l2_normalize_in_place};
use crate::{EmbedConfig, EmbedError, Embedder, Embedding};

/// Deterministic embedder built from raw pixel content.
///
/// The vector is the centred RGB intensities of a fixed-size thumbnail followed by a
/// normalized joint colour histogram of the full image, scaled to unit length. Visually
/// similar images (same layout, same palette) land close together under L2 distance.
#[derive(Debug, Clone)]
pub struct PixelEmbedder {
    cfg: EmbedConfig,
}

impl PixelEmbedder {
    pub fn new(cfg: EmbedConfig) -> Result<Self, EmbedError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.cfg
    }

    fn decode(&self, image_bytes: &[u8]) -> Result<RgbImage, EmbedError> {
        if image_bytes.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| EmbedError::Decode(e.to_string()))?;
        if img.width() == 0 || img.height() == 0 {
            return Err(EmbedError::Decode("image has zero area".into()));
        }
        Ok(img.to_rgb8())
    }

    fn features(&self, rgb: &RgbImage) -> Vec<f32> {
        let side = self.cfg.thumbnail_side;
        let bins = self.cfg.histogram_bins as usize;
        let mut out = Vec::with_capacity(self.cfg.dimension());

        let thumb = imageops::resize(rgb, side, side, FilterType::Triangle);
        for pixel in thumb.pixels() {
            out.extend(pixel.0.iter().map(|&c| c as f32 / 255.0 - 0.5));
        }

        let mut histogram = vec![0f32; bins * bins * bins];
        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0.map(|c| c as usize * bins / 256);
            histogram[(r * bins + g) * bins + b] += 1.0;
        }
        let total = (rgb.width() as f32) * (rgb.height() as f32);
        out.extend(histogram.into_iter().map(|count| count / total));
        out
    }
}

impl Default for PixelEmbedder {
    fn default() -> Self {
        Self {
            cfg: EmbedConfig::default(),
        }
    }
}

impl Embedder for PixelEmbedder {
    fn model_name(&self) -> &str {
        &self.cfg.model_name
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension()
    }

    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding, EmbedError> {
        let rgb = self.decode(image_bytes)?;
        let mut vector = self.features(&rgb);

        let norm = l2_norm(&vector);
        if !norm.is_finite() || norm == 0.0 {
            return Err(EmbedError::Degenerate);
        }
        l2_normalize_in_place(&mut vector);

        tracing::trace!(
            width = rgb.width(),
            height = rgb.height(),
            dim = vector.len(),
            "embedded image"
        );
        Ok(Embedding {
            embedding_dim: vector.len(),
            vector,
            model_name: self.cfg.model_name.clone(),
            normalized: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb(f(x, y)));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn embeds_to_unit_vector_of_configured_dimension() {
        let embedder = PixelEmbedder::default();
        let e = embedder.embed(&png(40, 30, |x, y| [x as u8 * 6, y as u8 * 8, 90])).unwrap();

        assert_eq!(e.embedding_dim, 496);
        assert_eq!(e.vector.len(), embedder.dimension());
        assert!(e.normalized);
        assert_eq!(e.model_name, "pixel-rgb-hist-v1");
        assert!((l2_norm(&e.vector) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn same_bytes_same_vector() {
        let embedder = PixelEmbedder::default();
        let bytes = png(16, 16, |x, y| [(x * y) as u8, x as u8, y as u8]);
        assert_eq!(embedder.embed(&bytes).unwrap(), embedder.embed(&bytes).unwrap());
    }

    #[test]
    fn similar_images_are_closer_than_different_ones() {
        let embedder = PixelEmbedder::default();
        let red = embedder.embed(&png(32, 32, |_, _| [220, 20, 20])).unwrap();
        let dark_red = embedder.embed(&png(32, 32, |_, _| [200, 30, 25])).unwrap();
        let blue = embedder.embed(&png(32, 32, |_, _| [20, 20, 220])).unwrap();

        assert!(distance(&red.vector, &dark_red.vector) < distance(&red.vector, &blue.vector));
    }

    #[test]
    fn rejects_empty_payload() {
        let embedder = PixelEmbedder::default();
        assert_eq!(embedder.embed(&[]).unwrap_err(), EmbedError::EmptyInput);
    }

    #[test]
    fn rejects_non_image_bytes() {
        let embedder = PixelEmbedder::default();
        let err = embedder.embed(b"definitely not a picture").unwrap_err();
        assert!(matches!(err, EmbedError::Decode(_)));
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = EmbedConfig {
            histogram_bins: 0,
            ..Default::default()
        };
        assert!(matches!(
            PixelEmbedder::new(cfg),
            Err(EmbedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn custom_config_changes_dimension() {
        let embedder = PixelEmbedder::new(EmbedConfig {
            thumbnail_side: 4,
            histogram_bins: 2,
            ..Default::default()
        })
        .unwrap();
        let e = embedder.embed(&png(5, 7, |_, _| [1, 2, 3])).unwrap();
        assert_eq!(e.vector.len(), 3 * 16 + 8);
    }
}
