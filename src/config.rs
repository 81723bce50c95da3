//! Scan configuration, replacing the ambient static registries and process-wide
//! logger pattern the source tooling used (spec §9): a value built by the caller and
//! threaded through the scan entry points instead of global state.

use crate::source::{CancellationToken, ExcludedRanges, NullProgress, ProgressReporter};
use std::sync::Arc;

/// Sliding-window size for the dump scanner (spec §4.4): 16 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Overlap between consecutive chunks, to catch records straddling a chunk boundary.
pub const DEFAULT_CHUNK_OVERLAP: usize = 1024;
/// Safety cap on hash-table chain walks (spec §4.5 step 5).
pub const DEFAULT_CHAIN_WALK_CAP: usize = 1000;
/// Number of buckets sampled during hash-table candidate validation (spec §4.5 step
/// 4).
pub const DEFAULT_VALIDATION_SAMPLE_BUCKETS: usize = 50;

pub struct ScanConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chain_walk_cap: usize,
    pub validation_sample_buckets: usize,
    pub excluded_ranges: ExcludedRanges,
    pub cancellation: CancellationToken,
    pub progress: Arc<dyn ProgressReporter + Send + Sync>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            chain_walk_cap: DEFAULT_CHAIN_WALK_CAP,
            validation_sample_buckets: DEFAULT_VALIDATION_SAMPLE_BUCKETS,
            excluded_ranges: ExcludedRanges::new(),
            cancellation: CancellationToken::new(),
            progress: Arc::new(NullProgress),
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded_ranges(mut self, ranges: ExcludedRanges) -> Self {
        self.excluded_ranges = ranges;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter + Send + Sync>) -> Self {
        self.progress = progress;
        self
    }
}
