//! C6: runtime hash-table recovery (spec §4.5).
//!
//! The loaded game process keeps every form-keyed object in an open-addressed hash
//! table indexed by editor id, living in a writable data section of the game's own
//! module image. Locating it from a bare memory capture - no symbols, no debug info
//! - means scanning for the table object's own vtable-pointer/size/bucket-array
//! triple, validating the candidate by sampling buckets, then walking every chain.

mod pe;

use crate::config::ScanConfig;
use crate::dump::validators::is_valid_editor_id;
use crate::error::{ScanError, ScanResult};
use crate::model::FormId;
use crate::result::RuntimeEditorIdEntry;
use crate::source::{ByteSource, VirtualAddressResolver};

const MIN_HASH_SIZE: u32 = 64;
const MAX_HASH_SIZE: u32 = 262_144;
const TRIPLE_STRIDE: usize = 4;
const MAX_EDITOR_ID_LEN: usize = 64;

/// Static form-type -> byte-offset table for the display-name pointer inside a
/// hash-bucket's referenced object (spec §4.5 step 6). Types not listed have no
/// cheaply recoverable display name.
fn display_name_offset(form_type: u8) -> Option<usize> {
    const FACTION_LIKE: &[u8] = &[FormTypeTag::FACTION, FormTypeTag::HAIR, FormTypeTag::EYES, FormTypeTag::RACE];
    const ITEM_LIKE: &[u8] = &[
        FormTypeTag::ACTIVATOR,
        FormTypeTag::ARMOR,
        FormTypeTag::BOOK,
        FormTypeTag::DOOR,
        FormTypeTag::MISC,
        FormTypeTag::WEAPON,
        FormTypeTag::AMMO,
        FormTypeTag::KEY,
        FormTypeTag::ALCH,
        FormTypeTag::PROJECTILE,
    ];
    if FACTION_LIKE.contains(&form_type) {
        Some(44)
    } else if ITEM_LIKE.contains(&form_type) {
        Some(68)
    } else if form_type == FormTypeTag::CONTAINER {
        Some(80)
    } else if form_type == FormTypeTag::NPC {
        Some(228)
    } else {
        None
    }
}

/// Form-type byte tags as stored at offset 4 of a hash-bucket value object (spec
/// §4.5 step 5). Values are the engine's own internal tags, not `RecordKind`'s.
struct FormTypeTag;
impl FormTypeTag {
    const FACTION: u8 = 6;
    const HAIR: u8 = 45;
    const EYES: u8 = 44;
    const RACE: u8 = 10;
    const ACTIVATOR: u8 = 5;
    const ARMOR: u8 = 26;
    const BOOK: u8 = 27;
    const DOOR: u8 = 28;
    const MISC: u8 = 32;
    const WEAPON: u8 = 33;
    const AMMO: u8 = 34;
    const KEY: u8 = 40;
    const ALCH: u8 = 41;
    const PROJECTILE: u8 = 50;
    const CONTAINER: u8 = 29;
    const NPC: u8 = 43;
}

fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)?.try_into().ok().map(u32::from_be_bytes)
}

/// A confirmed hash-table candidate: its vtable pointer, bucket count and the file
/// offset of the bucket array itself.
struct TableCandidate {
    hash_size: u32,
    bucket_array_offset: u64,
}

/// Scans `section` bytes for a plausible `{vfptr, hash_size, bucket_ptr}` triple
/// (spec §4.5 steps 2-4): three consecutive non-zero, 4-byte-aligned, big-endian
/// u32 values where the first and third resolve as virtual addresses and the
/// middle one is a believable bucket count.
fn find_candidates<R: VirtualAddressResolver>(section: &[u8], resolver: &R) -> Vec<TableCandidate> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 12 <= section.len() {
        if i % TRIPLE_STRIDE == 0 {
            if let (Some(vfptr), Some(hash_size), Some(bucket_ptr)) = (
                read_u32_be(section, i),
                read_u32_be(section, i + 4),
                read_u32_be(section, i + 8),
            ) {
                if vfptr != 0
                    && bucket_ptr != 0
                    && (MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&hash_size)
                    && resolver.va_to_file_offset(vfptr as u64).is_some()
                {
                    if let Some(bucket_array_offset) = resolver.va_to_file_offset(bucket_ptr as u64) {
                        out.push(TableCandidate { hash_size, bucket_array_offset });
                    }
                }
            }
        }
        i += TRIPLE_STRIDE;
    }
    out
}

/// Samples up to `sample_buckets` buckets of `candidate`, requiring at least 3 to
/// resolve to a plausible editor id before trusting the whole table (spec §4.5
/// step 4).
fn validate_candidate<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    candidate: &TableCandidate,
    sample_buckets: usize,
) -> bool {
    let mut valid = 0usize;
    let sample_count = sample_buckets.min(candidate.hash_size as usize);
    for bucket in 0..sample_count {
        let bucket_offset = candidate.bucket_array_offset + bucket as u64 * 4;
        let Ok(bytes) = source.read_vec(bucket_offset, 4) else { continue };
        let Some(item_va) = read_u32_be(&bytes, 0) else { continue };
        if item_va == 0 {
            continue;
        }
        let Some(item) = read_chain_item(source, resolver, item_va) else { continue };
        let Some((editor_id, _)) = read_editor_id(source, resolver, item.key_va) else { continue };
        if is_valid_editor_id(&editor_id) {
            valid += 1;
            if valid >= 3 {
                return true;
            }
        }
    }
    valid >= 3
}

/// One `{next, key, value}` chain item (spec §4.5 step 5).
struct ChainItem {
    next_va: u32,
    key_va: u32,
    value_va: u32,
}

fn read_chain_item<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    item_va: u32,
) -> Option<ChainItem> {
    let offset = resolver.va_to_file_offset(item_va as u64)?;
    let bytes = source.read_vec(offset, 12).ok()?;
    Some(ChainItem {
        next_va: read_u32_be(&bytes, 0)?,
        key_va: read_u32_be(&bytes, 4)?,
        value_va: read_u32_be(&bytes, 8)?,
    })
}

fn read_editor_id<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    key_va: u32,
) -> Option<(String, u64)> {
    let offset = resolver.va_to_file_offset(key_va as u64)?;
    let bytes = source.read_vec(offset, MAX_EDITOR_ID_LEN).ok()?;
    let end = bytes.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&bytes[..end]).ok()?.to_string();
    Some((s, offset))
}

/// Reads the 24-byte value object's form type (byte 4) and big-endian form id
/// (bytes 12..16), per spec §4.5 step 5.
fn read_value_object<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    value_va: u32,
) -> Option<(u8, FormId, u64)> {
    let offset = resolver.va_to_file_offset(value_va as u64)?;
    let bytes = source.read_vec(offset, 24).ok()?;
    let form_type = *bytes.get(4)?;
    let form_id = FormId(read_u32_be(&bytes, 12)?);
    Some((form_type, form_id, offset))
}

/// Best-effort display name: a pointer at a static per-form-type offset inside the
/// value object, resolved and read as a null-terminated string (spec §4.5 step 6).
fn read_display_name<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    value_file_offset: u64,
    form_type: u8,
) -> Option<String> {
    let field_offset = display_name_offset(form_type)?;
    let bytes = source.read_vec(value_file_offset + field_offset as u64, 4).ok()?;
    let name_va = read_u32_be(&bytes, 0)?;
    if name_va == 0 {
        return None;
    }
    let name_offset = resolver.va_to_file_offset(name_va as u64)?;
    let bytes = source.read_vec(name_offset, 256).ok()?;
    let end = bytes.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if text.is_empty() || !text.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        None
    } else {
        Some(text)
    }
}

/// Dialogue post-detection (spec §4.5 step 7): form-type codes shift across engine
/// builds, so the dialogue kind is found by counting, across every entry emitted in
/// this pass, which `form_type` has the most editor ids containing "Topic"
/// (case-insensitive). If that best count reaches the threshold, every entry of
/// that form type gets its dialogue-line text extracted.
const DIALOGUE_MATCH_THRESHOLD: usize = 5;

/// Byte offset of a further embedded string-handle pointer inside the value
/// object, read only for entries of the detected dialogue form type (spec §4.5
/// step 7). The engine stores the dialogue-response array inline rather than
/// behind its own form-type tag, so this sits past the 24-byte value-object
/// header every other field lookup in this module reads.
const DIALOGUE_STRING_HANDLE_OFFSET: u64 = 96;

/// Counts "Topic"-containing editor ids per `form_type` across `entries` (spec
/// §4.5 step 7, S7) and returns the form type with the most matches if it clears
/// [`DIALOGUE_MATCH_THRESHOLD`].
fn detect_dialogue_form_type(entries: &[RuntimeEditorIdEntry]) -> Option<u8> {
    let mut counts: std::collections::HashMap<u8, usize> = std::collections::HashMap::new();
    for entry in entries {
        if entry.editor_id.to_lowercase().contains("topic") {
            *counts.entry(entry.form_type).or_insert(0) += 1;
        }
    }
    let (&form_type, &count) = counts.iter().max_by_key(|&(_, &count)| count)?;
    (count >= DIALOGUE_MATCH_THRESHOLD).then_some(form_type)
}

/// Dereferences the fixed-offset string handle inside the dialogue form type's
/// value object and reads the null-terminated line it points to.
fn read_dialogue_text<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    value_file_offset: u64,
) -> Option<String> {
    let bytes = source.read_vec(value_file_offset + DIALOGUE_STRING_HANDLE_OFFSET, 4).ok()?;
    let handle_va = read_u32_be(&bytes, 0)?;
    if handle_va == 0 {
        return None;
    }
    let handle_offset = resolver.va_to_file_offset(handle_va as u64)?;
    let bytes = source.read_vec(handle_offset, 256).ok()?;
    let end = bytes.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Walks every bucket of a validated candidate, collecting one [`RuntimeEditorIdEntry`]
/// per chain item whose key is a plausible editor id (spec §4.5 steps 5-7).
fn walk_table<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    candidate: &TableCandidate,
    chain_walk_cap: usize,
) -> Vec<RuntimeEditorIdEntry> {
    let mut out = Vec::new();
    for bucket in 0..candidate.hash_size {
        let bucket_offset = candidate.bucket_array_offset + bucket as u64 * 4;
        let Ok(bytes) = source.read_vec(bucket_offset, 4) else { continue };
        let Some(mut item_va) = read_u32_be(&bytes, 0) else { continue };

        let mut steps = 0usize;
        while item_va != 0 && steps < chain_walk_cap {
            steps += 1;
            let Some(item) = read_chain_item(source, resolver, item_va) else { break };
            if let Some((editor_id, key_offset)) = read_editor_id(source, resolver, item.key_va) {
                if is_valid_editor_id(&editor_id) {
                    if let Some((form_type, form_id, value_offset)) =
                        read_value_object(source, resolver, item.value_va)
                    {
                        let display_name = read_display_name(source, resolver, value_offset, form_type);
                        out.push(RuntimeEditorIdEntry {
                            editor_id,
                            form_id,
                            form_type,
                            display_name,
                            dialogue_text: None,
                            key_file_offset: key_offset,
                            value_file_offset: value_offset,
                        });
                    }
                }
            }
            item_va = item.next_va;
        }
    }
    out
}

/// Recovers editor-id <-> form-id associations from the runtime hash table living
/// in the captured game module's writable data sections (spec §4.5).
pub fn recover<S: ByteSource, R: VirtualAddressResolver>(
    source: &S,
    resolver: &R,
    config: &ScanConfig,
) -> ScanResult<Vec<RuntimeEditorIdEntry>> {
    let module = resolver.locate_module().ok_or(ScanError::ModuleNotFound)?;
    let module_file_offset = resolver
        .va_to_file_offset(module.base_va)
        .ok_or(ScanError::ModuleNotFound)?;

    let sections = pe::read_sections(source, module_file_offset).unwrap_or_default();

    let mut entries = Vec::new();
    for section in sections.iter().filter(|s| s.is_writable_data()) {
        config.cancellation.check()?;
        let section_va = module.base_va + section.virtual_address as u64;
        let Some(section_file_offset) = resolver.va_to_file_offset(section_va) else { continue };
        let Ok(bytes) = source.read_vec(section_file_offset, section.virtual_size as usize) else {
            continue;
        };

        for candidate in find_candidates(&bytes, resolver) {
            config.cancellation.check()?;
            if validate_candidate(source, resolver, &candidate, config.validation_sample_buckets) {
                entries.extend(walk_table(source, resolver, &candidate, config.chain_walk_cap));
            }
        }
    }

    if let Some(dialogue_form_type) = detect_dialogue_form_type(&entries) {
        for entry in entries.iter_mut() {
            if entry.form_type == dialogue_form_type {
                entry.dialogue_text = read_dialogue_text(source, resolver, entry.value_file_offset);
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CapturedRegion, InMemorySource, ModuleInfo};

    struct FixedResolver {
        regions: Vec<CapturedRegion>,
        module: ModuleInfo,
    }

    impl VirtualAddressResolver for FixedResolver {
        fn regions(&self) -> &[CapturedRegion] {
            &self.regions
        }
        fn locate_module(&self) -> Option<ModuleInfo> {
            Some(self.module.clone())
        }
    }

    fn be_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_be_bytes());
    }

    #[test]
    fn walks_single_bucket_chain_and_validates_editor_id() {
        // Layout (all file offsets == virtual addresses, one flat region):
        // 0..4      bucket array (1 bucket) -> item at 100
        // 100..112  chain item {next=0, key_va=200, value_va=300}
        // 200..     key string "TestNpc\0"
        // 300..324  value object: form_type at byte4, form_id (BE) at byte12
        let mut image = vec![0u8; 400];
        image[0..4].copy_from_slice(&100u32.to_be_bytes());
        let mut item = Vec::new();
        be_u32(&mut item, 0);
        be_u32(&mut item, 200);
        be_u32(&mut item, 300);
        image[100..112].copy_from_slice(&item);
        image[200..208].copy_from_slice(b"TestNpc\0");
        image[300 + 4] = FormTypeTag::NPC;
        image[300 + 12..300 + 16].copy_from_slice(&0x0100_0001u32.to_be_bytes());

        let region = CapturedRegion { virtual_address: 0, size: image.len() as u64, file_offset: 0, writable: true };
        let resolver = FixedResolver {
            regions: vec![region],
            module: ModuleInfo { base_va: 0, size: image.len() as u64, image_name: "test.exe".into() },
        };
        let source = InMemorySource::new(&image);

        let candidate = TableCandidate { hash_size: 1, bucket_array_offset: 0 };
        let entries = walk_table(&source, &resolver, &candidate, 1000);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].editor_id, "TestNpc");
        assert_eq!(entries[0].form_id, FormId(0x0100_0001));
        assert_eq!(entries[0].form_type, FormTypeTag::NPC);
    }

    #[test]
    fn chain_walk_cap_bounds_cyclic_chains() {
        // A bucket pointing to an item that points to itself must not loop forever.
        let mut image = vec![0u8; 200];
        image[0..4].copy_from_slice(&100u32.to_be_bytes());
        let mut item = Vec::new();
        be_u32(&mut item, 100); // next -> itself
        be_u32(&mut item, 0); // key_va = 0 reads a leading null byte, an empty (invalid) editor id
        be_u32(&mut item, 0);
        image[100..112].copy_from_slice(&item);

        let region = CapturedRegion { virtual_address: 0, size: image.len() as u64, file_offset: 0, writable: true };
        let resolver = FixedResolver {
            regions: vec![region],
            module: ModuleInfo { base_va: 0, size: image.len() as u64, image_name: "test.exe".into() },
        };
        let source = InMemorySource::new(&image);
        let candidate = TableCandidate { hash_size: 1, bucket_array_offset: 0 };
        let entries = walk_table(&source, &resolver, &candidate, 5);
        assert!(entries.is_empty());
    }

    fn entry(editor_id: &str, form_type: u8) -> RuntimeEditorIdEntry {
        RuntimeEditorIdEntry {
            editor_id: editor_id.to_string(),
            form_id: FormId(0x0100_0001),
            form_type,
            display_name: None,
            dialogue_text: None,
            key_file_offset: 0,
            value_file_offset: 0,
        }
    }

    /// S7: form-type 37 has 12/100 "Topic" editor ids against form-type 40's 3 -
    /// the detector declares 37 the dialogue kind.
    #[test]
    fn dialogue_form_type_detected_by_editor_id_topic_count() {
        let mut entries: Vec<RuntimeEditorIdEntry> = Vec::new();
        for i in 0..12 {
            entries.push(entry(&format!("DIALTopic{i}"), 37));
        }
        for i in 0..3 {
            entries.push(entry(&format!("SomeTopic{i}"), 40));
        }
        for i in 0..85 {
            entries.push(entry(&format!("Unrelated{i}"), 5));
        }
        assert_eq!(detect_dialogue_form_type(&entries), Some(37));
    }

    #[test]
    fn dialogue_form_type_below_threshold_is_not_declared() {
        let mut entries: Vec<RuntimeEditorIdEntry> = Vec::new();
        for i in 0..4 {
            entries.push(entry(&format!("DIALTopic{i}"), 37));
        }
        assert_eq!(detect_dialogue_form_type(&entries), None);
    }

    #[test]
    fn dialogue_form_type_match_is_case_insensitive() {
        let entries: Vec<RuntimeEditorIdEntry> =
            (0..5).map(|i| entry(&format!("dialTOPIC{i}"), 12)).collect();
        assert_eq!(detect_dialogue_form_type(&entries), Some(12));
    }

    #[test]
    fn dialogue_text_dereferences_fixed_offset_handle() {
        let mut image = vec![0u8; 300];
        image[96..100].copy_from_slice(&200u32.to_be_bytes());
        image[200..208].copy_from_slice(b"Hello\0\0\0");

        let region = CapturedRegion { virtual_address: 0, size: image.len() as u64, file_offset: 0, writable: true };
        let resolver = FixedResolver {
            regions: vec![region],
            module: ModuleInfo { base_va: 0, size: image.len() as u64, image_name: "test.exe".into() },
        };
        let source = InMemorySource::new(&image);

        let text = read_dialogue_text(&source, &resolver, 0);
        assert_eq!(text.as_deref(), Some("Hello"));
    }
}
