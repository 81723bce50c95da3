//! C9: external interface shims - byte source, progress reporter, cancellation.
//!
//! spec §6 calls for an abstraction over `length()` / `read_into(offset, dst)` with
//! two concrete providers (in-memory slice, memory-mapped file view). Only the
//! in-memory provider is implemented here since this crate has no memory-mapping
//! dependency of its own; a host that adds `memmap2` implements [`ByteSource`] for its
//! mapped view the same way.

use crate::error::{ScanError, ScanResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read-only view over the bytes a scan operates on. The core never writes through
/// this trait (spec §5 "the memory-mapped accessor is read-only").
pub trait ByteSource {
    fn length(&self) -> u64;

    /// Reads `dst.len()` bytes starting at `offset` into `dst`. Implementations
    /// return `Err` only for genuine I/O failure (spec §7 Fatal tier); a short read
    /// past the end of the source is reported via the returned count, not an error.
    fn read_into(&self, offset: u64, dst: &mut [u8]) -> ScanResult<usize>;

    /// Convenience: read `len` bytes at `offset`, returning fewer if the source ends
    /// first.
    fn read_vec(&self, offset: u64, len: usize) -> ScanResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.read_into(offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// In-memory byte source: the structured-ESM case and the simplest dump case both
/// hold the whole artifact in one buffer.
pub struct InMemorySource<'a> {
    bytes: &'a [u8],
}

impl<'a> InMemorySource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<'a> ByteSource for InMemorySource<'a> {
    fn length(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> ScanResult<usize> {
        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let available = &self.bytes[offset..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

/// A memory region captured in a dump, with enough information for the runtime
/// hash-table walker to translate a virtual address into a file offset (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapturedRegion {
    pub virtual_address: u64,
    pub size: u64,
    pub file_offset: u64,
    pub writable: bool,
}

impl CapturedRegion {
    pub fn contains(&self, va: u64) -> bool {
        va >= self.virtual_address && va < self.virtual_address + self.size
    }

    pub fn va_to_file_offset(&self, va: u64) -> Option<u64> {
        if self.contains(va) {
            Some(self.file_offset + (va - self.virtual_address))
        } else {
            None
        }
    }
}

/// The game module located inside the captured memory (spec §6).
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleInfo {
    pub base_va: u64,
    pub size: u64,
    pub image_name: String,
}

/// External collaborator's view of captured memory regions (spec §6
/// "Virtual-address resolver"). Implemented by the minidump-like container, which is
/// not part of this crate.
pub trait VirtualAddressResolver {
    fn regions(&self) -> &[CapturedRegion];
    fn va_to_file_offset(&self, va: u64) -> Option<u64> {
        self.regions().iter().find_map(|r| r.va_to_file_offset(va))
    }
    fn locate_module(&self) -> Option<ModuleInfo>;
}

/// Progress reported at most once per 16 MiB chunk and once per hash-table
/// validation step (spec §6).
pub trait ProgressReporter {
    fn report(&self, bytes_processed: u64, total_bytes: u64, records_found_so_far: u64);
}

/// No-op reporter for callers that don't care.
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn report(&self, _bytes_processed: u64, _total_bytes: u64, _records_found_so_far: u64) {}
}

/// Cooperative cancellation token. The scan polls this between 16 MiB chunks and
/// before walking each hash-table bucket (spec §5).
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> ScanResult<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Byte-range exclusions the dump scanner must not dispatch candidates from (spec
/// §4.4 step 1) - typically the captured module's own image range.
#[derive(Clone, Debug, Default)]
pub struct ExcludedRanges {
    ranges: Vec<(u64, u64)>,
}

impl ExcludedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, start: u64, end: u64) {
        self.ranges.push((start, end));
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.ranges.iter().any(|&(s, e)| offset >= s && offset < e)
    }
}
