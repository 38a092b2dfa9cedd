//! Background removal for model-generated stickers.
//!
//! The upstream model is prompted for a single character on a flat,
//! near-uniform background. Removal happens in two passes over an owned
//! RGBA buffer:
//!
//! 1. a connectivity-based flood fill seeded from all four corners clears
//!    every pixel reachable through background-similar neighbors;
//! 2. a single erosion pass clears light pixels bordering that transparency
//!    (compression halos) while leaving dark outline pixels alone.
//!
//! Both passes only ever write the alpha channel.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use mascot_contracts::media::EncodedImage;
use tracing::{debug, warn};

pub const BACKGROUND_TOLERANCE: u8 = 60;
pub const WHITE_SNAP_THRESHOLD: u8 = 200;
pub const HALO_BRIGHTNESS: u8 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingOptions {
    /// A channel is background-similar when it differs from the reference by
    /// strictly less than this.
    pub tolerance: u8,
    /// A reference pixel with every channel above this is treated as pure white.
    pub white_snap_threshold: u8,
    /// Boundary pixels with a mean channel value above this are eroded.
    pub halo_brightness: u8,
}

impl Default for MattingOptions {
    fn default() -> Self {
        Self {
            tolerance: BACKGROUND_TOLERANCE,
            white_snap_threshold: WHITE_SNAP_THRESHOLD,
            halo_brightness: HALO_BRIGHTNESS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MattingReport {
    pub cleared: usize,
    pub eroded: usize,
}

/// Samples the background reference color from the top-left pixel.
pub fn reference_color(image: &RgbaImage, options: &MattingOptions) -> Option<[u8; 3]> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }
    let [r, g, b, _] = image.get_pixel(0, 0).0;
    let snap = options.white_snap_threshold;
    if r > snap && g > snap && b > snap {
        return Some([255, 255, 255]);
    }
    Some([r, g, b])
}

fn is_similar(rgb: [u8; 3], reference: [u8; 3], tolerance: u8) -> bool {
    rgb.iter()
        .zip(reference.iter())
        .all(|(channel, base)| channel.abs_diff(*base) < tolerance)
}

/// Clears alpha on every pixel reachable from a corner through 4-connected
/// background-similar pixels. Returns the number of pixels cleared.
pub fn matte_background(image: &mut RgbaImage, options: &MattingOptions) -> usize {
    let Some(reference) = reference_color(image, options) else {
        return 0;
    };
    let (width, height) = image.dimensions();
    let mut visited = vec![false; width as usize * height as usize];
    let mut stack: Vec<(u32, u32)> = Vec::new();

    let mut visit = |x: i64, y: i64, image: &RgbaImage, stack: &mut Vec<(u32, u32)>| {
        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        let idx = y as usize * width as usize + x as usize;
        if visited[idx] {
            return;
        }
        let [r, g, b, _] = image.get_pixel(x, y).0;
        if is_similar([r, g, b], reference, options.tolerance) {
            visited[idx] = true;
            stack.push((x, y));
        }
    };

    let (max_x, max_y) = (i64::from(width) - 1, i64::from(height) - 1);
    for (x, y) in [(0, 0), (max_x, 0), (0, max_y), (max_x, max_y)] {
        visit(x, y, image, &mut stack);
    }

    let mut cleared = 0;
    while let Some((x, y)) = stack.pop() {
        image.get_pixel_mut(x, y).0[3] = 0;
        cleared += 1;

        let (x, y) = (i64::from(x), i64::from(y));
        visit(x + 1, y, image, &mut stack);
        visit(x - 1, y, image, &mut stack);
        visit(x, y + 1, image, &mut stack);
        visit(x, y - 1, image, &mut stack);
    }
    cleared
}

/// Clears light pixels that touch a fully transparent 4-neighbor.
///
/// Candidates are collected over the whole image before any alpha changes,
/// so one call erodes exactly one pixel deep.
pub fn erode_halo(image: &mut RgbaImage, options: &MattingOptions) -> usize {
    let (width, height) = image.dimensions();
    let threshold = u32::from(options.halo_brightness) * 3;
    let is_transparent = |image: &RgbaImage, x: i64, y: i64| {
        x >= 0
            && y >= 0
            && x < i64::from(width)
            && y < i64::from(height)
            && image.get_pixel(x as u32, y as u32).0[3] == 0
    };

    let mut marked = Vec::new();
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        let (sx, sy) = (i64::from(x), i64::from(y));
        let on_boundary = is_transparent(image, sx + 1, sy)
            || is_transparent(image, sx - 1, sy)
            || is_transparent(image, sx, sy + 1)
            || is_transparent(image, sx, sy - 1);
        if !on_boundary {
            continue;
        }
        // mean(r, g, b) > threshold / 3, kept in integers
        if u32::from(r) + u32::from(g) + u32::from(b) > threshold {
            marked.push((x, y));
        }
    }

    for (x, y) in &marked {
        image.get_pixel_mut(*x, *y).0[3] = 0;
    }
    marked.len()
}

/// Runs the fill and the erosion pass over one buffer.
pub fn matte_raster(image: &mut RgbaImage, options: &MattingOptions) -> MattingReport {
    let cleared = matte_background(image, options);
    let eroded = erode_halo(image, options);
    MattingReport { cleared, eroded }
}

/// Decodes `source`, removes its background and re-encodes it as PNG.
///
/// Removal is best-effort: anything that cannot be decoded or re-encoded is
/// returned unchanged.
pub fn remove_background(source: &EncodedImage, options: &MattingOptions) -> EncodedImage {
    let decoded = match decode(source) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(mime_type = %source.mime_type, error = %err, "background removal skipped: decode failed");
            return source.clone();
        }
    };
    let mut raster = decoded.to_rgba8();
    let report = matte_raster(&mut raster, options);
    debug!(
        width = raster.width(),
        height = raster.height(),
        cleared = report.cleared,
        eroded = report.eroded,
        "background removed"
    );

    let mut bytes = Vec::new();
    match DynamicImage::ImageRgba8(raster).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    {
        Ok(()) => EncodedImage::png(bytes),
        Err(err) => {
            warn!(error = %err, "background removal skipped: png encode failed");
            source.clone()
        }
    }
}

fn decode(source: &EncodedImage) -> image::ImageResult<DynamicImage> {
    match ImageFormat::from_mime_type(&source.mime_type) {
        Some(format) => image::load_from_memory_with_format(&source.bytes, format)
            .or_else(|_| image::load_from_memory(&source.bytes)),
        None => image::load_from_memory(&source.bytes),
    }
}
