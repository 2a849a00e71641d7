//! Final serialization: garbage collection, deflation, save.

use log::debug;

use crate::document::DocumentStore;
use crate::error::CompressError;

/// Serializes a store back to PDF bytes
#[derive(Debug, Clone, Copy)]
pub struct DocumentWriter {
    /// Flate-compress streams that carry no filter yet
    pub compress_streams: bool,
}

impl DocumentWriter {
    /// Consume the store and produce the output file. Objects no longer
    /// reachable from the trailer are dropped before writing.
    pub fn serialize(&self, store: DocumentStore) -> Result<Vec<u8>, CompressError> {
        let mut doc = store.into_document();

        let pruned = doc.prune_objects();
        debug!("[Write] Pruned {} unreachable objects", pruned.len());
        doc.renumber_objects();

        if self.compress_streams {
            doc.compress();
        }

        let mut output_bytes = Vec::new();
        doc.save_to(&mut output_bytes)
            .map_err(|e| CompressError::Compression(format!("Failed to save PDF: {}", e)))?;

        Ok(output_bytes)
    }
}
