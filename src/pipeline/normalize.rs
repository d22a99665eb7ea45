//! Image normalization: arbitrary raster bytes → PNG no larger than the budget.
//!
//! The remote service rejects payloads over a hard ceiling. Rather than turn
//! large screenshots away, each stage below gives up a little more fidelity
//! and only runs if the previous one did not fit:
//!
//! ```text
//! decode ─▶ PNG ≤ budget? ──yes──▶ pass through untouched
//!              │ no
//!              ▼
//!        to RGB/RGBA ─▶ auto-crop ─▶ fit 500×500 (Lanczos3) ─▶ encode
//!              │ over budget
//!              ▼
//!        fit 400 ─▶ 300 ─▶ 200 (first that fits wins)
//!              │ none fit
//!              ▼
//!        grayscale at the 500 cap ─▶ encode ─▶ fits, or BudgetExceeded
//! ```
//!
//! Colour and content are kept before resolution: we crop before we shrink,
//! and shrink before we drop colour. An image that is still over budget after
//! the grayscale pass is a hard failure; an oversized payload is never returned.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Colour layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
}

/// A decoded image plus the format it was decoded from.
pub struct RasterImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl RasterImage {
    /// Sniff the format from magic bytes and decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, AnalysisError> {
        let format = image::guess_format(bytes).map_err(|e| AnalysisError::ImageDecode {
            detail: e.to_string(),
        })?;
        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            AnalysisError::ImageDecode {
                detail: format!("{} ({})", e, format_name(format)),
            }
        })?;
        Ok(Self { image, format })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn color_mode(&self) -> ColorMode {
        color_mode(&self.image)
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Which stage produced the final bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizeStage {
    /// Input was already a PNG within budget; bytes returned unchanged.
    Passthrough,
    /// Cropped and fitted to the primary cap.
    Resized { cap: u32 },
    /// Fitted to one of the fallback caps.
    Compressed { cap: u32 },
    /// Single-channel re-encode at the primary cap.
    Grayscale,
}

impl fmt::Display for NormalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeStage::Passthrough => f.write_str("unchanged"),
            NormalizeStage::Resized { cap } => write!(f, "resized to fit {cap}×{cap}"),
            NormalizeStage::Compressed { cap } => write!(f, "compressed to fit {cap}×{cap}"),
            NormalizeStage::Grayscale => f.write_str("converted to grayscale"),
        }
    }
}

/// One PNG encode the pipeline tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodeAttempt {
    pub stage: NormalizeStage,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// A PNG guaranteed to be within the encoded-size budget.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedImage {
    /// PNG bytes.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stage: NormalizeStage,
    /// Format detected in the input, e.g. "PNG", "JPEG".
    pub source_format: String,
    pub original_bytes: usize,
    /// Every encode tried, in order. Empty for a pass-through.
    pub attempts: Vec<EncodeAttempt>,
}

impl NormalizedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` when the output is smaller than what the caller gave us.
    pub fn was_compressed(&self) -> bool {
        self.bytes.len() < self.original_bytes
    }
}

/// Summary of an input image, without normalizing it.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    pub bytes: usize,
}

/// Decode `bytes` and report format, dimensions and colour mode.
pub fn describe_image(bytes: &[u8]) -> Result<ImageInfo, AnalysisError> {
    let raster = RasterImage::decode(bytes)?;
    Ok(ImageInfo {
        format: format_name(raster.format()),
        width: raster.width(),
        height: raster.height(),
        color: raster.color_mode(),
        bytes: bytes.len(),
    })
}

/// The staged normalization pipeline.
#[derive(Debug, Clone)]
pub struct Normalizer {
    limit: usize,
    max_dimension: u32,
    fallback_dimensions: Vec<u32>,
}

impl Normalizer {
    pub fn new(limit: usize, max_dimension: u32, fallback_dimensions: Vec<u32>) -> Self {
        Self {
            limit,
            max_dimension,
            fallback_dimensions,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.budget.encoded,
            config.max_dimension,
            config.fallback_dimensions.clone(),
        )
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run the pipeline over raw image bytes.
    ///
    /// # Errors
    /// * [`AnalysisError::ImageDecode`]: bytes are not a decodable image
    /// * [`AnalysisError::BudgetExceeded`]: every stage ran and none fit
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedImage, AnalysisError> {
        let raster = RasterImage::decode(bytes)?;
        let source_format = format_name(raster.format());
        let original_bytes = bytes.len();
        debug!(
            "Decoded {} {}x{} ({:?}), {} bytes",
            source_format,
            raster.width(),
            raster.height(),
            raster.color_mode(),
            original_bytes
        );

        if raster.format() == ImageFormat::Png && original_bytes <= self.limit {
            debug!("PNG already within {} bytes, passing through", self.limit);
            return Ok(NormalizedImage {
                bytes: bytes.to_vec(),
                width: raster.width(),
                height: raster.height(),
                stage: NormalizeStage::Passthrough,
                source_format,
                original_bytes,
                attempts: Vec::new(),
            });
        }

        let mut run = Run {
            limit: self.limit,
            source_format,
            original_bytes,
            attempts: Vec::new(),
        };

        let image = normalize_color(raster.into_image());
        let image = auto_crop(image);
        let image = fit_within(image, self.max_dimension, FilterType::Lanczos3);

        let png = encode_png(&image)?;
        let stage = NormalizeStage::Resized {
            cap: self.max_dimension,
        };
        if let Some(done) = run.attempt(stage, &image, png) {
            return Ok(done);
        }

        warn!(
            "Image is {} bytes after resize, attempting further compression",
            run.last_size()
        );
        for &cap in &self.fallback_dimensions {
            if image.width() <= cap && image.height() <= cap {
                debug!("Skipping {cap}px fallback: image is already {}x{}", image.width(), image.height());
                continue;
            }
            let smaller = fit_within(image.clone(), cap, FilterType::CatmullRom);
            let png = encode_png(&smaller)?;
            if let Some(done) = run.attempt(NormalizeStage::Compressed { cap }, &smaller, png) {
                return Ok(done);
            }
        }

        let gray = DynamicImage::ImageLuma8(image.to_luma8());
        let png = encode_png(&gray)?;
        if let Some(done) = run.attempt(NormalizeStage::Grayscale, &gray, png) {
            return Ok(done);
        }

        let smallest = run.attempts.iter().map(|a| a.bytes).min().unwrap_or(0);
        warn!(
            "Image could not be reduced below {} bytes after {} attempts",
            self.limit,
            run.attempts.len()
        );
        Err(AnalysisError::BudgetExceeded {
            size: smallest,
            limit: self.limit,
            attempts: run.attempts.len(),
        })
    }
}

/// Bookkeeping for one normalization call.
struct Run {
    limit: usize,
    source_format: String,
    original_bytes: usize,
    attempts: Vec<EncodeAttempt>,
}

impl Run {
    /// Record an encode; return the finished image if it fits.
    fn attempt(
        &mut self,
        stage: NormalizeStage,
        image: &DynamicImage,
        png: Vec<u8>,
    ) -> Option<NormalizedImage> {
        let attempt = EncodeAttempt {
            stage,
            width: image.width(),
            height: image.height(),
            bytes: png.len(),
        };
        debug!(
            "{:?}: {}x{} → {} bytes (limit {})",
            stage, attempt.width, attempt.height, attempt.bytes, self.limit
        );
        self.attempts.push(attempt);

        if png.len() > self.limit {
            return None;
        }
        info!(
            "Normalized {} → {} bytes ({})",
            self.original_bytes,
            png.len(),
            stage
        );
        Some(NormalizedImage {
            bytes: png,
            width: attempt.width,
            height: attempt.height,
            stage,
            source_format: std::mem::take(&mut self.source_format),
            original_bytes: self.original_bytes,
            attempts: std::mem::take(&mut self.attempts),
        })
    }

    fn last_size(&self) -> usize {
        self.attempts.last().map(|a| a.bytes).unwrap_or(0)
    }
}

fn color_mode(image: &DynamicImage) -> ColorMode {
    let color = image.color();
    match (color.has_color(), color.has_alpha()) {
        (false, false) => ColorMode::Grayscale,
        (false, true) => ColorMode::GrayscaleAlpha,
        (true, false) => ColorMode::Rgb,
        (true, true) => ColorMode::Rgba,
    }
}

/// 8-bit RGB and RGBA pass through; RGBA at other depths becomes 8-bit RGBA;
/// everything else becomes 8-bit RGB.
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Bounding box `(x, y, width, height)` of non-empty content.
///
/// With an alpha channel a pixel is empty when fully transparent; without one
/// it is empty when every channel is zero. `None` when nothing is non-empty.
pub fn content_bbox(image: &DynamicImage) -> Option<(u32, u32, u32, u32)> {
    let has_alpha = image.color().has_alpha();
    let mut min = (u32::MAX, u32::MAX);
    let mut max = (0u32, 0u32);
    let mut found = false;

    for (x, y, pixel) in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let filled = if has_alpha { a != 0 } else { (r | g | b) != 0 };
        if filled {
            found = true;
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
    }

    found.then(|| (min.0, min.1, max.0 - min.0 + 1, max.1 - min.1 + 1))
}

/// Crop to [`content_bbox`]; unchanged when there is no box or it is the whole image.
pub fn auto_crop(image: DynamicImage) -> DynamicImage {
    match content_bbox(&image) {
        Some((x, y, w, h)) if (w, h) != (image.width(), image.height()) => {
            debug!(
                "Auto-crop {}x{} → {}x{} at ({}, {})",
                image.width(),
                image.height(),
                w,
                h,
                x,
                y
            );
            image.crop_imm(x, y, w, h)
        }
        _ => image,
    }
}

/// Downscale so neither side exceeds `cap`, keeping aspect ratio. Never upscales.
pub fn fit_within(image: DynamicImage, cap: u32, filter: FilterType) -> DynamicImage {
    if image.width() <= cap && image.height() <= cap {
        return image;
    }
    image.resize(cap, cap, filter)
}

/// PNG-encode with maximum compression and adaptive row filters.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, AnalysisError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| AnalysisError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_uppercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("test image should encode");
        buf
    }

    /// Deterministic RGB noise: incompressible, so PNG size tracks pixel count.
    pub(crate) fn noise_png(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x9E37_79B9;
        let img = RgbImage::from_fn(width, height, |_, _| {
            let mut channel = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xFF) as u8
            };
            Rgb([channel(), channel(), channel()])
        });
        encode_as(&DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    fn default_normalizer() -> Normalizer {
        Normalizer::from_config(&AnalysisConfig::default())
    }

    #[test]
    fn small_png_passes_through_byte_identical() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let input = encode_as(&img, ImageFormat::Png);

        let out = default_normalizer().normalize(&input).unwrap();
        assert_eq!(out.bytes, input);
        assert_eq!(out.stage, NormalizeStage::Passthrough);
        assert!(out.attempts.is_empty());
        assert_eq!(out.source_format, "PNG");
    }

    #[test]
    fn jpeg_is_reencoded_as_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([200, 120, 40])));
        let input = encode_as(&img, ImageFormat::Jpeg);

        let out = default_normalizer().normalize(&input).unwrap();
        assert!(out.bytes.starts_with(PNG_MAGIC));
        assert_eq!(out.stage, NormalizeStage::Resized { cap: 500 });
        assert_eq!((out.width, out.height), (64, 48), "small images are never upscaled");
        assert_eq!(out.source_format, "JPEG");
    }

    #[test]
    fn large_image_is_fitted_to_cap() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(1200, 800, |x, y| {
            Rgb([(x % 200 + 30) as u8, (y % 200 + 30) as u8, 90])
        }));
        let input = encode_as(&img, ImageFormat::Jpeg);

        let out = default_normalizer().normalize(&input).unwrap();
        assert_eq!(out.width, 500);
        assert!(out.height <= 500 && out.height >= 330, "aspect kept: {}", out.height);
        assert!(out.len() <= 250_000);
    }

    #[test]
    fn undecodable_input_is_a_decode_error() {
        let err = default_normalizer()
            .normalize(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ImageDecode { .. }), "got {err:?}");
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])));
        let mut input = encode_as(&img, ImageFormat::Png);
        input.truncate(40);
        let err = default_normalizer().normalize(&input).unwrap_err();
        assert!(matches!(err, AnalysisError::ImageDecode { .. }), "got {err:?}");
    }

    #[test]
    fn grayscale_input_becomes_rgb() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([128])));
        let input = encode_as(&img, ImageFormat::Jpeg);

        let out = default_normalizer().normalize(&input).unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn oversized_noise_degrades_in_decreasing_caps() {
        let input = noise_png(500, 500);
        assert!(input.len() > 250_000, "fixture must start over budget");

        let out = default_normalizer().normalize(&input).unwrap();
        assert!(out.len() <= 250_000);
        assert!(out.bytes.starts_with(PNG_MAGIC));
        assert!(matches!(out.stage, NormalizeStage::Compressed { .. }));

        let caps: Vec<u32> = out
            .attempts
            .iter()
            .map(|a| match a.stage {
                NormalizeStage::Resized { cap } | NormalizeStage::Compressed { cap } => cap,
                other => panic!("unexpected stage {other:?}"),
            })
            .collect();
        assert_eq!(caps[0], 500);
        assert!(caps.windows(2).all(|w| w[0] > w[1]), "caps: {caps:?}");
        assert!([400, 300, 200].starts_with(&caps[1..]), "caps: {caps:?}");

        let (last, earlier) = out.attempts.split_last().unwrap();
        assert!(last.bytes <= 250_000);
        assert!(earlier.iter().all(|a| a.bytes > 250_000));
    }

    #[test]
    fn budget_exceeded_after_grayscale() {
        let normalizer = Normalizer::new(100, 500, vec![400, 300, 200]);
        let err = normalizer.normalize(&noise_png(500, 500)).unwrap_err();
        match err {
            AnalysisError::BudgetExceeded {
                size,
                limit,
                attempts,
            } => {
                assert_eq!(limit, 100);
                assert!(size > 100);
                // 500, 400, 300, 200, then grayscale exactly once.
                assert_eq!(attempts, 5);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
    }

    #[test]
    fn grayscale_is_last_resort_that_fits() {
        // Noise at 500² is ~750 KB as RGB and ~470 KB at 400², but ~250 KB
        // as a single channel at 500².
        let limit = 260_000;
        let normalizer = Normalizer::new(limit, 500, vec![400]);
        let out = normalizer.normalize(&noise_png(500, 500)).unwrap();

        assert_eq!(out.stage, NormalizeStage::Grayscale);
        assert!(out.len() <= limit, "got {} bytes", out.len());
        assert!(out.bytes.starts_with(PNG_MAGIC));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!((out.width, out.height), (500, 500));

        let stages: Vec<NormalizeStage> = out.attempts.iter().map(|a| a.stage).collect();
        assert_eq!(
            stages,
            vec![
                NormalizeStage::Resized { cap: 500 },
                NormalizeStage::Compressed { cap: 400 },
                NormalizeStage::Grayscale,
            ]
        );
        let (last, earlier) = out.attempts.split_last().unwrap();
        assert_eq!(last.bytes, out.len());
        assert!(earlier.iter().all(|a| a.bytes > limit));
    }

    #[test]
    fn bbox_finds_content_on_black() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(100, 100, |x, y| {
            if (20..40).contains(&x) && (30..50).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        assert_eq!(content_bbox(&img), Some((20, 30, 20, 20)));
        let cropped = auto_crop(img);
        assert_eq!((cropped.width(), cropped.height()), (20, 20));
    }

    #[test]
    fn bbox_uses_alpha_when_present() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(60, 60, |x, y| {
            if (10..20).contains(&x) && (5..15).contains(&y) {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 0])
            }
        }));
        assert_eq!(content_bbox(&img), Some((10, 5, 10, 10)));
    }

    #[test]
    fn all_black_image_is_left_alone() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(30, 20));
        assert_eq!(content_bbox(&img), None);
        let out = auto_crop(img);
        assert_eq!((out.width(), out.height()), (30, 20));
    }

    #[test]
    fn fit_within_keeps_aspect_and_never_upscales() {
        let wide = DynamicImage::ImageRgb8(RgbImage::new(1000, 250));
        let fitted = fit_within(wide, 500, FilterType::Lanczos3);
        assert_eq!((fitted.width(), fitted.height()), (500, 125));

        let small = DynamicImage::ImageRgb8(RgbImage::new(80, 40));
        let same = fit_within(small, 500, FilterType::Lanczos3);
        assert_eq!((same.width(), same.height()), (80, 40));
    }

    #[test]
    fn describe_reports_format_and_mode() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(7, 3));
        let info = describe_image(&encode_as(&img, ImageFormat::Png)).unwrap();
        assert_eq!(info.format, "PNG");
        assert_eq!((info.width, info.height), (7, 3));
        assert_eq!(info.color, ColorMode::Rgba);
    }
}
