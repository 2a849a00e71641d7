//! Decisions about which images to touch and which results to keep.

use crate::document::ImageCandidate;

/// Selects images that are large enough to be worth recompressing
#[derive(Debug, Clone, Copy)]
pub struct CandidateFilter {
    /// At least one side must reach this many pixels
    pub min_dimension: u32,
    /// Encoded payload must be at least this many bytes
    pub min_bytes: usize,
}

impl CandidateFilter {
    pub fn accepts(&self, width: u32, height: u32, byte_len: usize) -> bool {
        let small_pixels = width < self.min_dimension && height < self.min_dimension;
        let small_payload = byte_len < self.min_bytes;
        !(small_pixels || small_payload)
    }

    pub fn accepts_candidate(&self, candidate: &ImageCandidate<'_>) -> bool {
        self.accepts(candidate.width, candidate.height, candidate.byte_len())
    }
}

/// Keeps a transcoded image only when it is strictly smaller
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacementPolicy;

impl ReplacementPolicy {
    pub fn should_replace(&self, original_len: usize, new_len: usize) -> bool {
        new_len < original_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTER: CandidateFilter = CandidateFilter {
        min_dimension: 1000,
        min_bytes: 102_400,
    };

    #[test]
    fn test_small_dimensions_rejected() {
        assert!(!FILTER.accepts(999, 999, 10_000_000));
        assert!(FILTER.accepts(1000, 10, 102_400));
        assert!(FILTER.accepts(10, 1000, 102_400));
    }

    #[test]
    fn test_small_payload_rejected() {
        assert!(!FILTER.accepts(5000, 5000, 102_399));
        assert!(FILTER.accepts(5000, 5000, 102_400));
    }

    #[test]
    fn test_replacement_is_strict() {
        let policy = ReplacementPolicy;
        assert!(policy.should_replace(200_000, 199_999));
        assert!(!policy.should_replace(200_000, 200_000));
        assert!(!policy.should_replace(200_000, 250_000));
    }
}
