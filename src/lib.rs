//! Scanning and reconstruction pipeline for Bethesda-engine ESM files and captured
//! process-memory dumps.
//!
//! The crate is organised as one module per spec component: [`binary`] (endian
//! primitives), [`registry`] (record/subrecord signature tables), [`model`] (shared
//! wire-layout types), [`structured`] (whole-file ESM parsing), [`dump`]
//! (unstructured memory-dump scanning), [`hashtable`] (runtime hash-table recovery),
//! [`reconstruct`] (semantic entity reconstruction), [`result`] (aggregate output),
//! [`source`]/[`config`] (host-provided byte access and tuning knobs).

pub mod binary;
pub mod config;
pub mod diagnostics;
pub mod dump;
pub mod entities;
pub mod error;
pub mod hashtable;
pub mod model;
pub mod reconstruct;
pub mod registry;
pub mod result;
pub mod source;
pub mod structured;

use crate::config::ScanConfig;
use crate::error::ScanResult;
use crate::result::{AggregateResult, RawScanResult};

/// Scans a complete in-memory ESM buffer: structured parse followed by semantic
/// reconstruction (spec §4.1, §4.3, §4.6).
pub fn scan_esm_buffer(buf: &[u8], config: &ScanConfig) -> ScanResult<AggregateResult> {
    let mut raw = RawScanResult::new();
    structured::parse_structured(buf, &mut raw)?;
    config.cancellation.check()?;
    let read = |offset: u64, len: usize| buf.get(offset as usize..(offset as usize + len)).map(<[u8]>::to_vec);
    let entities = reconstruct::reconstruct_all(&read, &raw, config);
    Ok(AggregateResult::new(raw, entities))
}

/// Scans an unstructured byte span (a process-memory dump, or an ESM whose
/// structural header is missing/corrupt) via chunked signature detection (spec
/// §4.4), then reconstructs an entity for each known-kind detection by re-reading
/// its data area directly from `source`.
pub fn scan_dump<S: source::ByteSource>(
    source: &S,
    config: &ScanConfig,
) -> ScanResult<AggregateResult> {
    let mut raw = RawScanResult::new();
    dump::scan(source, config, &mut raw)?;
    let read = |offset: u64, len: usize| source.read_vec(offset, len).ok().filter(|v| v.len() == len);
    let entities = reconstruct::reconstruct_all(&read, &raw, config);
    Ok(AggregateResult::new(raw, entities))
}

/// Recovers editor-id <-> form-id associations from a captured PE module image via
/// the runtime hash-table walk (spec §4.5).
pub fn recover_runtime_hash_table<S: source::ByteSource, R: source::VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    config: &ScanConfig,
) -> ScanResult<Vec<result::RuntimeEditorIdEntry>> {
    hashtable::recover(source, resolver, config)
}
