//! # Logo Rasterization
//!
//! Converts an arbitrary bitmap into a `GS v 0` raster command.
//!
//! ## Pipeline
//!
//! ```text
//! Bitmap ─► scale to ≤ min(300, paper_chars × 10) dots ─► composite on white
//!        ─► grayscale (channel mean) ─► threshold ─► pack MSB-first ─► GS v 0
//! ```
//!
//! ## Why a Hard Threshold?
//!
//! Receipt logos are mostly flat marks on a white field. The cutoff sits
//! well above mid-gray (160/255) so that thin strokes and light anti-aliased
//! edges still burn on a low-resolution head. Photos will look harsh; that
//! is accepted.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, RgbaImage, imageops::FilterType};

use crate::error::{PrinterError, Result};
use crate::protocol::raster::{self, pack_row};

/// Upper bound on logo width in dots, regardless of paper width.
pub const MAX_LOGO_DOTS: u32 = 300;

/// Dots allotted per character column when sizing the logo.
pub const DOTS_PER_CHAR: u32 = 10;

/// Default darkness cutoff: channel means below this print black.
pub const DEFAULT_THRESHOLD: u8 = 160;

/// A receipt logo, either already decoded or still in its file encoding.
///
/// Encoded logos are decoded lazily at print time so that a corrupt file
/// surfaces as [`PrinterError::EncodingFailure`] from the print call.
#[derive(Clone)]
pub enum Logo {
    Image(Arc<DynamicImage>),
    Encoded(Arc<[u8]>),
}

impl Logo {
    pub fn from_image(image: DynamicImage) -> Self {
        Logo::Image(Arc::new(image))
    }

    /// Wrap PNG/JPEG/... bytes without decoding them.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Logo::Encoded(Arc::from(bytes.into()))
    }

    /// Read an image file without decoding it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// Decode (if needed) into a pixel buffer.
    pub fn decode(&self) -> Result<Arc<DynamicImage>> {
        match self {
            Logo::Image(image) => Ok(Arc::clone(image)),
            Logo::Encoded(bytes) => image::load_from_memory(bytes)
                .map(Arc::new)
                .map_err(|e| PrinterError::EncodingFailure(format!("Failed to decode logo: {}", e))),
        }
    }
}

impl fmt::Debug for Logo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logo::Image(image) => write!(f, "Logo::Image({}x{})", image.width(), image.height()),
            Logo::Encoded(bytes) => write!(f, "Logo::Encoded({} bytes)", bytes.len()),
        }
    }
}

/// A packed 1-bit bitmap ready for the raster command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeBitmap {
    pub width: u16,
    pub height: u16,
    /// Row-major packed rows, `width_bytes()` per row.
    pub data: Vec<u8>,
}

impl MonochromeBitmap {
    /// Row stride in bytes: `ceil(width / 8)`.
    #[inline]
    pub fn width_bytes(&self) -> u16 {
        self.width.div_ceil(8)
    }

    /// Whether the dot at `(x, y)` prints black.
    pub fn is_black(&self, x: u16, y: u16) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y as usize * self.width_bytes() as usize + x as usize / 8;
        self.data[idx] & (1 << (7 - (x % 8))) != 0
    }

    /// Wrap the bitmap in a `GS v 0` command.
    pub fn to_command(&self) -> Vec<u8> {
        raster::raster_image(self.width_bytes(), self.height, &self.data)
    }
}

/// Target logo width in dots for a paper width given in characters.
///
/// ```
/// use blethermal::render::logo::max_width_dots;
///
/// assert_eq!(max_width_dots(24), 240);
/// assert_eq!(max_width_dots(35), 300);
/// ```
#[inline]
pub fn max_width_dots(paper_chars: usize) -> u32 {
    let by_paper = u32::try_from(paper_chars)
        .unwrap_or(u32::MAX)
        .saturating_mul(DOTS_PER_CHAR);
    by_paper.min(MAX_LOGO_DOTS)
}

/// Scale and threshold an image into a monochrome bitmap.
///
/// Images narrower than the target are not upscaled.
pub fn to_monochrome(
    image: &DynamicImage,
    paper_chars: usize,
    threshold: u8,
) -> Result<MonochromeBitmap> {
    let (src_w, src_h) = (image.width(), image.height());
    if src_w == 0 || src_h == 0 {
        return Err(PrinterError::EncodingFailure(format!(
            "Logo has no pixels ({}x{})",
            src_w, src_h
        )));
    }

    let bound = max_width_dots(paper_chars);
    if bound == 0 {
        return Err(PrinterError::EncodingFailure(
            "Paper width leaves no room for a logo".to_string(),
        ));
    }

    let width = src_w.min(bound);
    let height = ((src_h as f64 * width as f64 / src_w as f64).round() as u32).max(1);
    let height = u16::try_from(height).map_err(|_| {
        PrinterError::EncodingFailure(format!("Scaled logo is too tall ({} rows)", height))
    })?;

    let rgba = image.to_rgba8();
    let scaled: RgbaImage = if (width, height as u32) == (src_w, src_h) {
        rgba
    } else {
        image::imageops::resize(&rgba, width, height as u32, FilterType::Triangle)
    };

    let mut data = Vec::with_capacity(width.div_ceil(8) as usize * height as usize);
    let mut row = Vec::with_capacity(width as usize);
    for y in 0..height as u32 {
        row.clear();
        for x in 0..width {
            let [r, g, b, a] = scaled.get_pixel(x, y).0;
            row.push(gray_on_white(r, g, b, a) < threshold);
        }
        data.extend(pack_row(&row));
    }

    Ok(MonochromeBitmap {
        // width ≤ MAX_LOGO_DOTS, always fits
        width: width as u16,
        height,
        data,
    })
}

/// Scale, threshold and wrap a logo in a raster command.
///
/// Output length is always `8 + ceil(width / 8) * height`.
pub fn encode_logo(logo: &Logo, paper_chars: usize, threshold: u8) -> Result<Vec<u8>> {
    let image = logo.decode()?;
    let bitmap = to_monochrome(&image, paper_chars, threshold)?;
    tracing::debug!(
        width = bitmap.width,
        height = bitmap.height,
        bytes = bitmap.data.len(),
        "Rasterized logo"
    );
    Ok(bitmap.to_command())
}

/// Channel mean after compositing onto a white background.
#[inline]
fn gray_on_white(r: u8, g: u8, b: u8, a: u8) -> u8 {
    let blend = |c: u8| (c as u32 * a as u32 + 255 * (255 - a as u32)) / 255;
    ((blend(r) + blend(g) + blend(b)) / 3) as u8
}

// ============================================================================
// TESTS
// ============================================================================
