//! PDF Shrinking Library
//!
//! Reduces PDF size by re-encoding oversized embedded raster images as JPEG.
//! Text, vector content, fonts and page structure are left as they are.
//!
//! An image is considered when one side is at least 1000 px and its payload is
//! at least 100 KiB. Images wider than 1200 px are downscaled to 1200 px wide
//! and re-encoded at JPEG quality 60; the result replaces the original only if
//! it is strictly smaller. The document is then garbage-collected, its
//! remaining streams deflated, and saved.

pub mod document;
pub mod engine;
pub mod error;
pub mod policy;
pub mod scan;
pub mod transcode;
pub mod writer;

use lopdf::{dictionary, Document, Object, Stream};

pub use document::{DocumentStore, ImageCandidate};
pub use engine::{CompressionEngine, ImageVerdict};
pub use error::{CompressError, ImageError};
pub use transcode::{RasterTranscoder, Transcode, TranscodeResult};

/// Images with both sides below this many pixels are left alone
pub const MIN_DIMENSION: u32 = 1000;
/// Images with smaller payloads are left alone
pub const MIN_IMAGE_BYTES: usize = 100 * 1024;
/// Images wider than this are downscaled to exactly this width
pub const MAX_WIDTH: u32 = 1200;
/// JPEG quality for re-encoded images
pub const JPEG_QUALITY: u8 = 60;

/// Options for PDF shrinking
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Minimum pixel size of the larger side for an image to be considered
    pub min_dimension: u32,
    /// Minimum encoded size in bytes for an image to be considered
    pub min_image_bytes: usize,
    /// Width images are downscaled to; narrower images are not transcoded
    pub max_width: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Deflate uncompressed streams when saving
    pub compress_streams: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            min_dimension: MIN_DIMENSION,
            min_image_bytes: MIN_IMAGE_BYTES,
            max_width: MAX_WIDTH,
            quality: JPEG_QUALITY,
            compress_streams: true,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.quality == 0 || self.quality > 100 {
            return Err(CompressError::InvalidQuality);
        }
        if self.max_width == 0 || self.max_width > u32::from(u16::MAX) {
            return Err(CompressError::InvalidOptions(format!(
                "max width must be between 1 and {}",
                u16::MAX
            )));
        }
        Ok(())
    }
}

/// Per-run image counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Image occurrences visited, counting shared images once per page
    pub examined: usize,
    pub replaced: usize,
    /// Below the size thresholds
    pub filtered: usize,
    /// Not resized, or the re-encode was not smaller
    pub kept: usize,
    /// Could not be extracted or decoded
    pub failed: usize,
}

impl CompressionStats {
    pub(crate) fn record(&mut self, verdict: ImageVerdict) {
        match verdict {
            ImageVerdict::Filtered => self.filtered += 1,
            ImageVerdict::NotResized | ImageVerdict::Discarded => self.kept += 1,
            ImageVerdict::Replaced { .. } => self.replaced += 1,
        }
    }
}

/// Result of one compression run
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// The rewritten PDF
    pub output: Vec<u8>,
    /// Length of the input in bytes
    pub original_size: usize,
    /// Length of `output` in bytes
    pub compressed_size: usize,
    pub stats: CompressionStats,
}

impl CompressionOutcome {
    pub(crate) fn new(output: Vec<u8>, original_size: usize, stats: CompressionStats) -> Self {
        Self {
            compressed_size: output.len(),
            output,
            original_size,
            stats,
        }
    }

    /// Percentage of the input saved; negative if the output grew
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        let saved = self.original_size as f64 - self.compressed_size as f64;
        saved / self.original_size as f64 * 100.0
    }
}

/// Shrink PDF bytes with the default thresholds
pub fn compress(input: &[u8]) -> Result<CompressionOutcome, CompressError> {
    compress_with_options(input, &CompressOptions::default())
}

/// Shrink PDF bytes
pub fn compress_with_options(
    input: &[u8],
    options: &CompressOptions,
) -> Result<CompressionOutcome, CompressError> {
    CompressionEngine::new(options)?.compress(input)
}

/// Information about a single image in the PDF
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Object ID (number, generation)
    pub object_id: (u32, u16),
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color space
    pub color_space: String,
    /// Bits per component
    pub bits_per_component: u32,
    /// Filter/encoding
    pub filter: String,
    /// Size in bytes
    pub size_bytes: usize,
    /// Passes the size thresholds
    pub eligible: bool,
}

/// Images grouped by page
#[derive(Debug, Clone)]
pub struct PageImages {
    pub page_number: u32,
    pub images: Vec<ImageInfo>,
}

/// Report the images each page uses, without modifying anything
pub fn list_images(
    pdf_bytes: &[u8],
    options: &CompressOptions,
) -> Result<Vec<PageImages>, CompressError> {
    let store = DocumentStore::load(pdf_bytes)?;
    let filter = policy::CandidateFilter {
        min_dimension: options.min_dimension,
        min_bytes: options.min_image_bytes,
    };
    let enumerator = scan::ImageEnumerator::new(&store);

    let mut result = Vec::new();
    for (page_number, page_id) in store.pages() {
        let mut images = Vec::new();
        for id in enumerator.images_on_page(page_id) {
            match store.image_candidate(id) {
                Ok(candidate) => images.push(ImageInfo {
                    object_id: candidate.id,
                    width: candidate.width,
                    height: candidate.height,
                    color_space: candidate.encoding.color.to_string(),
                    bits_per_component: candidate.encoding.bits_per_component,
                    filter: candidate.encoding.filter_label(),
                    size_bytes: candidate.byte_len(),
                    eligible: filter.accepts_candidate(&candidate),
                }),
                Err(e) => log::warn!("[Page {}] {}", page_number, e),
            }
        }
        if !images.is_empty() {
            result.push(PageImages {
                page_number,
                images,
            });
        }
    }

    Ok(result)
}

/// Health check: build a one-page PDF in memory and run it through the
/// engine. Needs no files or network.
pub fn self_test() -> Result<CompressionOutcome, CompressError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"q 0 0 1 rg 72 72 144 144 re f Q\n".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut input = Vec::new();
    doc.save_to(&mut input)
        .map_err(|e| CompressError::Compression(format!("Failed to build test PDF: {}", e)))?;

    let outcome = compress(&input)?;
    let pages = DocumentStore::load(&outcome.output)?.pages().len();
    if pages != 1 {
        return Err(CompressError::Compression(format!(
            "Self-test output has {} pages, expected 1",
            pages
        )));
    }
    Ok(outcome)
}

pub mod file_ops {
    use super::*;
    use std::path::Path;

    /// Shrink a PDF file into another file
    pub fn compress_pdf_file(
        input_path: &Path,
        output_path: &Path,
        options: &CompressOptions,
    ) -> Result<CompressionOutcome, CompressError> {
        let input = std::fs::read(input_path)?;
        let outcome = compress_with_options(&input, options)?;
        std::fs::write(output_path, &outcome.output)?;
        Ok(outcome)
    }
}
