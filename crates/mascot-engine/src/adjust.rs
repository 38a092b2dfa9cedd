use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use mascot_contracts::media::EncodedImage;

/// Brightness / contrast / saturation in percent, 100 meaning unchanged.
///
/// Applied in that order with CSS filter semantics, clamping after each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageAdjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

impl Default for ImageAdjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
        }
    }
}

impl ImageAdjustments {
    pub fn new(brightness: f64, contrast: f64, saturation: f64) -> Self {
        Self {
            brightness: brightness.clamp(0.0, 400.0),
            contrast: contrast.clamp(0.0, 400.0),
            saturation: saturation.clamp(0.0, 400.0),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn apply_pixel(&self, pixel: Rgba<u8>) -> Rgba<u8> {
        let [r, g, b, a] = pixel.0;
        let mut rgb = [f64::from(r), f64::from(g), f64::from(b)];

        let brightness = self.brightness / 100.0;
        if brightness != 1.0 {
            rgb = rgb.map(|channel| clamp_channel(channel * brightness));
        }

        let contrast = self.contrast / 100.0;
        if contrast != 1.0 {
            let intercept = (0.5 - 0.5 * contrast) * 255.0;
            rgb = rgb.map(|channel| clamp_channel(channel * contrast + intercept));
        }

        let s = self.saturation / 100.0;
        if s != 1.0 {
            let [r, g, b] = rgb;
            rgb = [
                (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
                (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
                (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
            ]
            .map(clamp_channel);
        }

        Rgba([
            rgb[0].round() as u8,
            rgb[1].round() as u8,
            rgb[2].round() as u8,
            a,
        ])
    }

    pub fn apply_raster(&self, image: &mut RgbaImage) {
        for pixel in image.pixels_mut() {
            *pixel = self.apply_pixel(*pixel);
        }
    }

    /// Returns a PNG with the adjustments baked in; identity returns `source` as is.
    pub fn apply(&self, source: &EncodedImage) -> Result<EncodedImage> {
        if self.is_identity() {
            return Ok(source.clone());
        }
        let mut raster = image::load_from_memory(&source.bytes)
            .context("adjustment source decode failed")?
            .to_rgba8();
        self.apply_raster(&mut raster);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(raster)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("adjusted image encode failed")?;
        Ok(EncodedImage::png(bytes))
    }
}

fn clamp_channel(value: f64) -> f64 {
    value.clamp(0.0, 255.0)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use mascot_contracts::media::EncodedImage;

    use super::ImageAdjustments;

    #[test]
    fn identity_leaves_pixels_and_bytes_alone() {
        let adjustments = ImageAdjustments::default();
        assert!(adjustments.is_identity());
        let pixel = Rgba([12, 200, 99, 128]);
        assert_eq!(adjustments.apply_pixel(pixel), pixel);

        let source = EncodedImage::new(b"not decoded".to_vec(), "image/png");
        assert_eq!(adjustments.apply(&source).unwrap(), source);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let brighter = ImageAdjustments::new(200.0, 100.0, 100.0);
        assert_eq!(brighter.apply_pixel(Rgba([100, 200, 0, 255])).0, [200, 255, 0, 255]);
        let dark = ImageAdjustments::new(0.0, 100.0, 100.0);
        assert_eq!(dark.apply_pixel(Rgba([100, 200, 50, 7])).0, [0, 0, 0, 7]);
    }

    #[test]
    fn zero_contrast_flattens_to_mid_gray() {
        let flat = ImageAdjustments::new(100.0, 0.0, 100.0);
        let [r, g, b, _] = flat.apply_pixel(Rgba([10, 240, 90, 255])).0;
        assert_eq!([r, g, b], [128, 128, 128]);
    }

    #[test]
    fn zero_saturation_produces_gray() {
        let gray = ImageAdjustments::new(100.0, 100.0, 0.0);
        let [r, g, b, a] = gray.apply_pixel(Rgba([255, 0, 0, 200])).0;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 200);
    }

    #[test]
    fn apply_raster_preserves_alpha() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([50, 60, 70, 0]));
        ImageAdjustments::new(150.0, 120.0, 80.0).apply_raster(&mut image);
        assert!(image.pixels().all(|pixel| pixel.0[3] == 0));
    }
}
