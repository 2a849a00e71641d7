//! Compression run orchestration
//!
//! Pages are visited in document order and images in page order. Each image
//! goes through filter, transcode and replacement policy on its own; a
//! broken image is skipped, anything unexpected aborts the run.

use log::{debug, info, warn};
use lopdf::ObjectId;

use crate::document::DocumentStore;
use crate::error::{CompressError, ImageError};
use crate::policy::{CandidateFilter, ReplacementPolicy};
use crate::scan::ImageEnumerator;
use crate::transcode::{RasterTranscoder, Transcode};
use crate::writer::DocumentWriter;
use crate::{CompressOptions, CompressionOutcome, CompressionStats};

/// What happened to one image occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVerdict {
    /// Too small in pixels or bytes
    Filtered,
    /// Passed the filter but not wide enough to resize
    NotResized,
    /// Transcoded, but the result was not smaller
    Discarded,
    Replaced { original_len: usize, new_len: usize },
}

pub struct CompressionEngine<T = RasterTranscoder> {
    filter: CandidateFilter,
    policy: ReplacementPolicy,
    transcoder: T,
    writer: DocumentWriter,
}

impl CompressionEngine<RasterTranscoder> {
    pub fn new(options: &CompressOptions) -> Result<Self, CompressError> {
        let transcoder = RasterTranscoder::new(options.max_width, options.quality);
        Self::with_transcoder(options, transcoder)
    }
}

impl<T: Transcode> CompressionEngine<T> {
    pub fn with_transcoder(
        options: &CompressOptions,
        transcoder: T,
    ) -> Result<Self, CompressError> {
        options.validate()?;
        Ok(Self {
            filter: CandidateFilter {
                min_dimension: options.min_dimension,
                min_bytes: options.min_image_bytes,
            },
            policy: ReplacementPolicy,
            transcoder,
            writer: DocumentWriter {
                compress_streams: options.compress_streams,
            },
        })
    }

    /// Shrink one PDF. The output is produced only once every page is done.
    pub fn compress(&self, input: &[u8]) -> Result<CompressionOutcome, CompressError> {
        let mut store = DocumentStore::load(input)?;
        let mut stats = CompressionStats::default();

        for (page_number, page_id) in store.pages() {
            let image_ids = ImageEnumerator::new(&store).images_on_page(page_id);
            debug!("[Page {}] {} image references", page_number, image_ids.len());

            for image_id in image_ids {
                stats.examined += 1;
                match self.process_image(&mut store, image_id) {
                    Ok(verdict) => stats.record(verdict),
                    Err(e) if e.is_recoverable() => {
                        warn!("[Page {}] Skipping image {:?}: {}", page_number, image_id, e);
                        stats.failed += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let output = self.writer.serialize(store)?;
        let outcome = CompressionOutcome::new(output, input.len(), stats);

        info!(
            "Examined {} images: {} replaced, {} filtered, {} kept, {} failed; {} -> {} bytes",
            stats.examined,
            stats.replaced,
            stats.filtered,
            stats.kept,
            stats.failed,
            outcome.original_size,
            outcome.compressed_size
        );

        Ok(outcome)
    }

    /// Run one image occurrence against the current state of the store
    pub fn process_image(
        &self,
        store: &mut DocumentStore,
        id: ObjectId,
    ) -> Result<ImageVerdict, ImageError> {
        let (original_len, result) = {
            let candidate = store.image_candidate(id)?;
            if !self.filter.accepts_candidate(&candidate) {
                debug!(
                    "  {:?}: {}x{} px, {} bytes, below thresholds",
                    id,
                    candidate.width,
                    candidate.height,
                    candidate.byte_len()
                );
                return Ok(ImageVerdict::Filtered);
            }

            let Some(result) = self.transcoder.transcode(&candidate)? else {
                debug!("  {:?}: {} px wide, not resized", id, candidate.width);
                return Ok(ImageVerdict::NotResized);
            };
            (candidate.byte_len(), result)
        };

        let new_len = result.bytes.len();
        if !self.policy.should_replace(original_len, new_len) {
            debug!("  {:?}: transcoded to {} bytes, original {} kept", id, new_len, original_len);
            return Ok(ImageVerdict::Discarded);
        }

        store.replace_stream(id, result.bytes)?;
        store.retag_as_jpeg(id, result.width, result.height)?;
        debug!(
            "  {:?}: replaced with {}x{} JPEG, {} -> {} bytes",
            id, result.width, result.height, original_len, new_len
        );

        Ok(ImageVerdict::Replaced {
            original_len,
            new_len,
        })
    }
}
