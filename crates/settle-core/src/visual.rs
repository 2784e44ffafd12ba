//! Thresholded visual comparison against stored reference images.
//!
//! Scores are zero-mean normalized cross-correlation on 8-bit luma, the
//! same measure as OpenCV's `TM_CCOEFF_NORMED`: 1.0 for identical images,
//! unaffected by uniform brightness or contrast changes, and near 0.0 for
//! unrelated content. When the two images differ in size the smaller one is
//! slid over the larger one and the best alignment wins, so a reference
//! captured with a slightly different crop still matches.

use std::sync::Arc;

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, GrayImage, ImageEncoder};
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

use crate::driver::MobileDriver;
use crate::element::{ElementHandle, Rect};
use crate::error::MatchError;
use crate::reference::ReferenceStore;

/// Minimum score for a region to count as matching.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Upper bound on `alignments * template pixels` for one search. The cross
/// term is computed directly per alignment, so a full-screen frame against
/// a small reference would run for minutes.
pub const MAX_SEARCH_WORK: u64 = 1_000_000_000;

/// What to compare against the reference.
#[derive(Debug, Clone, Copy)]
pub enum CaptureSource<'a> {
    /// Capture the screen and crop it to this element.
    Element(&'a ElementHandle),
    /// Already-encoded image bytes (PNG or JPEG), used as-is.
    Encoded(&'a [u8]),
}

/// Outcome of a comparison. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    /// Best similarity score over all alignments, in `[-1.0, 1.0]`.
    pub score: f64,
    /// Whether `score >= threshold`.
    pub passed: bool,
}

impl MatchResult {
    pub fn new(score: f64, threshold: f64) -> Self {
        Self {
            score,
            passed: score >= threshold,
        }
    }
}

/// Decodes PNG or JPEG bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, MatchError> {
    if bytes.is_empty() {
        return Err(MatchError::Decode("empty image buffer".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Encodes an image as RGBA PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, MatchError> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buffer)
}

/// Crops `frame` to `rect`, clamped to the frame bounds.
pub fn crop_to_rect(frame: &DynamicImage, rect: &Rect) -> Result<DynamicImage, MatchError> {
    let (width, height) = frame.dimensions();
    let (left, top, w, h) = rect
        .clip_to(width, height)
        .ok_or(MatchError::EmptyRegion { width, height })?;
    Ok(frame.crop_imm(left, top, w, h))
}

/// Captures the full screen and crops it to the element's rectangle.
pub async fn capture_element(
    driver: &dyn MobileDriver,
    element: &ElementHandle,
) -> Result<DynamicImage, MatchError> {
    let rect = driver.rect(element).await?;
    let frame = decode(&driver.capture_frame().await?)?;
    debug!(
        element = %element,
        frame_width = frame.width(),
        frame_height = frame.height(),
        "cropping element from frame"
    );
    crop_to_rect(&frame, &rect)
}

/// Summed-area tables of pixel values and squared pixel values.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sq = vec![0u64; stride * (height + 1)];
        let raw = image.as_raw();

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width {
                let v = u64::from(raw[y * width + x]);
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    /// `(sum, sum of squares)` over the `w` x `h` window at `(x, y)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (u64, u64) {
        let a = y * self.stride + x;
        let b = a + w;
        let c = (y + h) * self.stride + x;
        let d = c + w;
        (
            self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c],
            self.sq[d] + self.sq[a] - self.sq[b] - self.sq[c],
        )
    }
}

/// Best normalized cross-correlation of the smaller image over the larger.
///
/// Zero-variance (flat) patches score 1.0 against a flat patch of the same
/// intensity and 0.0 against anything else.
///
/// Cost grows with the number of alignments times the template area.
/// Pass an element crop, not a whole screen, when the reference is small.
///
/// # Errors
///
/// - [`MatchError::Dimensions`] if neither image fits inside the other, or
///   either is empty.
/// - [`MatchError::SearchTooLarge`] if the search exceeds
///   [`MAX_SEARCH_WORK`].
pub fn match_template(captured: &GrayImage, reference: &GrayImage) -> Result<f64, MatchError> {
    let (cw, ch) = captured.dimensions();
    let (rw, rh) = reference.dimensions();
    let dimensions = MatchError::Dimensions {
        captured_width: cw,
        captured_height: ch,
        reference_width: rw,
        reference_height: rh,
    };
    if cw == 0 || ch == 0 || rw == 0 || rh == 0 {
        return Err(dimensions);
    }
    let (image, template) = if rw <= cw && rh <= ch {
        (captured, reference)
    } else if cw <= rw && ch <= rh {
        (reference, captured)
    } else {
        return Err(dimensions);
    };

    let alignments = u64::from(image.width() - template.width() + 1)
        * u64::from(image.height() - template.height() + 1);
    let template_pixels = u64::from(template.width()) * u64::from(template.height());
    if alignments.saturating_mul(template_pixels) > MAX_SEARCH_WORK {
        return Err(MatchError::SearchTooLarge {
            template_width: template.width(),
            template_height: template.height(),
            alignments,
            limit: MAX_SEARCH_WORK,
        });
    }

    let iw = image.width() as usize;
    let ih = image.height() as usize;
    let tw = template.width() as usize;
    let th = template.height() as usize;
    let n = (tw * th) as i128;

    let t = template.as_raw();
    let t_sum: i128 = t.iter().map(|&v| i128::from(v)).sum();
    let t_sq: i128 = t.iter().map(|&v| i128::from(v) * i128::from(v)).sum();
    let t_var = n * t_sq - t_sum * t_sum;

    let pixels = image.as_raw();
    let integral = Integral::new(image);
    let mut best = f64::NEG_INFINITY;

    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let (w_sum, w_sq) = integral.window(x, y, tw, th);
            let w_sum = i128::from(w_sum);
            let w_var = n * i128::from(w_sq) - w_sum * w_sum;

            let score = if t_var == 0 || w_var == 0 {
                if t_var == 0 && w_var == 0 && t_sum == w_sum {
                    1.0
                } else {
                    0.0
                }
            } else {
                let mut cross = 0u64;
                for j in 0..th {
                    let t_row = &t[j * tw..(j + 1) * tw];
                    let i_row = &pixels[(y + j) * iw + x..(y + j) * iw + x + tw];
                    cross += t_row
                        .iter()
                        .zip(i_row)
                        .map(|(&a, &b)| u64::from(a) * u64::from(b))
                        .sum::<u64>();
                }
                let numerator = n * i128::from(cross) - t_sum * w_sum;
                let denominator = (t_var as f64).sqrt() * (w_var as f64).sqrt();
                (numerator as f64 / denominator).clamp(-1.0, 1.0)
            };

            if score > best {
                best = score;
                if best >= 1.0 {
                    return Ok(best);
                }
            }
        }
    }
    Ok(best)
}

/// Compares screen regions against a [`ReferenceStore`].
pub struct VisualMatcher {
    driver: Arc<dyn MobileDriver>,
    references: ReferenceStore,
}

impl VisualMatcher {
    pub fn new(driver: Arc<dyn MobileDriver>, references: ReferenceStore) -> Self {
        Self { driver, references }
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    /// Produces the luma image to compare: the cropped element, or the
    /// decoded bytes.
    pub async fn capture_region(&self, source: CaptureSource<'_>) -> Result<GrayImage, MatchError> {
        let image = match source {
            CaptureSource::Element(element) => {
                capture_element(self.driver.as_ref(), element).await?
            }
            CaptureSource::Encoded(bytes) => decode(bytes)?,
        };
        Ok(image.to_luma8())
    }

    /// Scores `source` against the named reference. A low score is reported
    /// in the result, not as an error.
    pub async fn compare(
        &self,
        source: CaptureSource<'_>,
        reference: &str,
        threshold: f64,
    ) -> Result<MatchResult, MatchError> {
        let span = info_span!("compare", reference = reference);
        async {
            let expected = self.references.load(reference)?;
            let captured = self.capture_region(source).await?;
            let score = match_template(&captured, &expected)?;
            let result = MatchResult::new(score, threshold);
            info!(score, threshold, passed = result.passed, "visual match");
            Ok::<_, MatchError>(result)
        }
        .instrument(span)
        .await
    }

    /// Like [`compare`](Self::compare), but a score below `threshold` is a
    /// [`MatchError::Verification`].
    pub async fn verify(
        &self,
        source: CaptureSource<'_>,
        reference: &str,
        threshold: f64,
    ) -> Result<MatchResult, MatchError> {
        let result = self.compare(source, reference, threshold).await?;
        if !result.passed {
            return Err(MatchError::Verification {
                reference: reference.to_string(),
                score: result.score,
                threshold,
            });
        }
        Ok(result)
    }
}
