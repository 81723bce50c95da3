//! C5: chunked dump scanner.
//!
//! Scans an unstructured byte source (no group/record nesting assumed) for main
//! record and subrecord signatures in a single sliding-window pass (spec §4.4).

pub mod validators;

use crate::binary::{read_signature, reverse_signature, Endian};
use crate::config::ScanConfig;
use crate::error::ScanResult;
use crate::model::{GameSettingValue, MainRecordHeader, SubrecordHeader, MAIN_RECORD_HEADER_SIZE};
use crate::registry::records::{self, RecordKind};
use crate::registry::subrecords::{self as schema, SubrecordValue};
use crate::result::{
    AssetPathEntry, CellGridEntry, ConditionEntry, DialogueResponseDataEntry,
    DialogueResponseTextEntry, EditorIdEntry, GameSettingEntry, GenericPathEntry,
    GenericTextEntry, HeightmapEntry, MainRecordDetection, NameEntry, PositionEntry,
    RawScanResult, ScriptTextEntry,
};
use crate::source::ByteSource;

fn zstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Runs a chunked single-pass scan of `source`, writing deduplicated detections into
/// `result` (spec §4.4). Returns `Err` only on fatal byte-source I/O failure or
/// cancellation; speculative candidate failures are silent.
pub fn scan<S: ByteSource>(
    source: &S,
    config: &ScanConfig,
    result: &mut RawScanResult,
) -> ScanResult<()> {
    let total = source.length();
    let chunk_size = config.chunk_size as u64;
    let overlap = config.chunk_overlap as u64;
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunk_start = 0u64;
    loop {
        config.cancellation.check()?;
        let remaining = total.saturating_sub(chunk_start);
        if remaining == 0 {
            break;
        }
        let len = chunk_size.min(remaining) as usize;
        let chunk = source.read_vec(chunk_start, len)?;
        dispatch_chunk(&chunk, chunk_start, config, result);

        let processed = (chunk_start + len as u64).min(total);
        config
            .progress
            .report(processed, total, result.main_records.len() as u64);

        if chunk_start + chunk_size >= total {
            break;
        }
        chunk_start += step;
    }
    Ok(())
}

fn dispatch_chunk(chunk: &[u8], chunk_start: u64, config: &ScanConfig, result: &mut RawScanResult) {
    let mut i = 0usize;
    while i + 4 <= chunk.len() {
        let absolute = chunk_start + i as u64;

        if config.excluded_ranges.contains(absolute) {
            i += 1;
            continue;
        }

        let Some(sig) = read_signature(chunk, i) else {
            break;
        };

        if validators::is_false_positive(sig) {
            i += 1;
            continue;
        }

        let record_candidates = candidate_record_endians(sig);
        if !record_candidates.is_empty() {
            if let Some(consumed) = try_main_record(chunk, i, &record_candidates, absolute, result) {
                i += consumed;
                continue;
            }
        }

        if let Some(endian) = subrecord_endian(sig) {
            if try_subrecord(chunk, i, sig, endian, absolute, result) {
                i += 1;
                continue;
            }
        }

        if texture_set_endian(sig).is_some() && try_texture_path(chunk, i, sig, absolute, result) {
            i += 1;
            continue;
        }

        i += 1;
    }
}

/// Candidate endians for a 4-byte signature read as a main-record magic: a registry
/// hit pins the endian; an unregistered but uppercase-looking signature is tried
/// under both (spec §4.4 "Main-record header validation is strict").
fn candidate_record_endians(sig: [u8; 4]) -> Vec<Endian> {
    if records::is_known_record_kind(sig, Endian::Little) {
        vec![Endian::Little]
    } else if records::is_known_record_kind(sig, Endian::Big) {
        vec![Endian::Big]
    } else if validators::looks_like_unregistered_signature(sig) {
        vec![Endian::Little, Endian::Big]
    } else {
        Vec::new()
    }
}

fn try_main_record(
    chunk: &[u8],
    offset: usize,
    candidates: &[Endian],
    absolute: u64,
    result: &mut RawScanResult,
) -> Option<usize> {
    for &endian in candidates {
        let Some(header) = MainRecordHeader::parse(chunk, offset, endian) else {
            continue;
        };
        if !header.is_plausible() {
            continue;
        }
        let kind = records::lookup(header.signature, endian);
        let is_new = result.add_main_record(MainRecordDetection {
            offset: absolute,
            header: header.clone(),
            kind,
        });
        if is_new && kind == Some(RecordKind::GameSetting) {
            extract_game_setting(chunk, offset, &header, absolute, result);
        }
        // Spec §4.4 step 3: skip ahead by 23 + declared data size so bytes interior
        // to a confirmed record are not re-dispatched as candidates.
        return Some((23 + header.data_size as usize).max(1));
    }
    None
}

fn extract_game_setting(
    chunk: &[u8],
    record_offset: usize,
    header: &MainRecordHeader,
    absolute: u64,
    result: &mut RawScanResult,
) {
    let data_start = record_offset + MAIN_RECORD_HEADER_SIZE;
    let data_end = data_start + header.data_size as usize;
    if data_end > chunk.len() {
        return;
    }
    if let Some(value) = GameSettingValue::decode(&chunk[data_start..data_end], header.endian) {
        result.game_settings.push(GameSettingEntry { offset: absolute, value });
    }
}

/// Candidate endian for a 4-byte signature read as a subrecord magic (spec §4.4
/// step 4): whichever byte order the schema registry recognises.
fn subrecord_endian(sig: [u8; 4]) -> Option<Endian> {
    if schema::shape_of(sig, Endian::Little).is_some() {
        Some(Endian::Little)
    } else if schema::shape_of(sig, Endian::Big).is_some() {
        Some(Endian::Big)
    } else {
        None
    }
}

/// Attempts a subrecord-signature candidate at `offset`: re-reads the 6-byte
/// header and payload, then applies the per-kind semantic validator (spec §4.4
/// step 4). Returns `true` if a new entry was filed.
fn try_subrecord(
    chunk: &[u8],
    offset: usize,
    sig: [u8; 4],
    endian: Endian,
    absolute: u64,
    result: &mut RawScanResult,
) -> bool {
    let Some(header) = SubrecordHeader::parse(chunk, offset, endian) else {
        return false;
    };
    let payload_start = offset + crate::model::SUBRECORD_HEADER_SIZE;
    let payload_end = payload_start + header.length as usize;
    if payload_end > chunk.len() {
        return false;
    }
    let payload = &chunk[payload_start..payload_end];
    let Some(shape) = schema::shape_of(sig, endian) else {
        return false;
    };
    let Some(value) = schema::parse(shape, payload, endian) else {
        return false;
    };

    match value {
        SubrecordValue::EditorId(s) => {
            if !validators::is_valid_editor_id(&s) {
                return false;
            }
            result.add_editor_id(EditorIdEntry { offset: absolute, value: s })
        }
        SubrecordValue::FormId(form_id) => {
            if !schema::validate_form_id_reference(form_id) {
                return false;
            }
            result.add_form_id_ref(crate::result::FormIdRefEntry {
                offset: absolute,
                form_id: crate::model::FormId(form_id),
            })
        }
        SubrecordValue::Position(pose) => {
            if !schema::validate_position(&pose) {
                return false;
            }
            result.positions.push(PositionEntry { offset: absolute, pose });
            true
        }
        SubrecordValue::ActorBaseStats(stats) => {
            if !stats.is_plausible() {
                return false;
            }
            result
                .actor_base_stats
                .push(crate::result::ActorBaseStatsEntry { offset: absolute, stats });
            true
        }
        SubrecordValue::DisplayName(s) => {
            result.names.push(NameEntry { offset: absolute, value: s });
            true
        }
        SubrecordValue::Scale(_) => false,
        SubrecordValue::Heightmap(hm) => {
            result.heightmaps.push(HeightmapEntry { offset: absolute, heightmap: hm });
            true
        }
        SubrecordValue::GameSetting(v) => {
            result.game_settings.push(GameSettingEntry { offset: absolute, value: v });
            true
        }
        SubrecordValue::ScriptText(s) => {
            result.script_texts.push(ScriptTextEntry { offset: absolute, text: s });
            true
        }
        SubrecordValue::DialogueResponseText(s) => {
            result
                .dialogue_response_texts
                .push(DialogueResponseTextEntry { offset: absolute, text: s });
            true
        }
        SubrecordValue::DialogueResponseData(d) => {
            result
                .dialogue_response_data
                .push(DialogueResponseDataEntry { offset: absolute, data: d });
            true
        }
        SubrecordValue::GenericText(s) => {
            result
                .generic_texts
                .push(GenericTextEntry { offset: absolute, signature: sig, text: s });
            true
        }
        SubrecordValue::GenericPath(s) => {
            result
                .generic_paths
                .push(GenericPathEntry { offset: absolute, path: s.clone() });
            result.asset_paths.push(AssetPathEntry { offset: absolute, path: s });
            true
        }
        SubrecordValue::GenericFormId(form_id) => {
            if !schema::validate_form_id_reference(form_id) {
                return false;
            }
            result.generic_form_id_refs.push(crate::result::FormIdRefEntry {
                offset: absolute,
                form_id: crate::model::FormId(form_id),
            });
            true
        }
        SubrecordValue::Condition(c) => {
            result.conditions.push(ConditionEntry { offset: absolute, condition: c });
            true
        }
        SubrecordValue::CellGrid(grid) => {
            result.cell_grids.push(CellGridEntry { offset: absolute, grid });
            true
        }
    }
}

fn is_texture_set_spelling(sig: [u8; 4]) -> bool {
    sig[0] == b'T' && sig[1] == b'X' && sig[2] == b'0' && (b'0'..=b'7').contains(&sig[3])
}

/// Texture-set family "TX00".."TX07" (spec §4.4 step 5): canonical little-endian
/// spelling, or its reversed console spelling.
fn texture_set_endian(sig: [u8; 4]) -> Option<Endian> {
    if is_texture_set_spelling(sig) {
        Some(Endian::Little)
    } else if is_texture_set_spelling(reverse_signature(sig)) {
        Some(Endian::Big)
    } else {
        None
    }
}

fn try_texture_path(
    chunk: &[u8],
    offset: usize,
    sig: [u8; 4],
    absolute: u64,
    result: &mut RawScanResult,
) -> bool {
    let Some(endian) = texture_set_endian(sig) else {
        return false;
    };
    let Some(header) = SubrecordHeader::parse(chunk, offset, endian) else {
        return false;
    };
    let payload_start = offset + crate::model::SUBRECORD_HEADER_SIZE;
    let payload_end = payload_start + header.length as usize;
    if payload_end > chunk.len() {
        return false;
    }
    let path = zstring(&chunk[payload_start..payload_end]);
    if path.is_empty() {
        return false;
    }
    result
        .generic_paths
        .push(GenericPathEntry { offset: absolute, path: path.clone() });
    result.asset_paths.push(AssetPathEntry { offset: absolute, path });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    fn le_record(sig: &[u8; 4], form_id: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(sig);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&form_id.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn s4_false_positive_yields_no_detections() {
        let mut bytes = b"VGT_DEBUG_".to_vec();
        bytes.extend_from_slice(&[0u8; 22]);
        let source = InMemorySource::new(&bytes);
        let config = ScanConfig::new();
        let mut result = RawScanResult::new();
        scan(&source, &config, &mut result).unwrap();
        assert!(result.main_records.is_empty());
    }

    #[test]
    fn s3_ascii_collision_form_id_rejected() {
        let form_id = u32::from_le_bytes(*b"PACK");
        let record = le_record(b"NPC_", form_id, &[0u8; 4]);
        let source = InMemorySource::new(&record);
        let config = ScanConfig::new();
        let mut result = RawScanResult::new();
        scan(&source, &config, &mut result).unwrap();
        assert!(result.main_records.is_empty());
    }

    #[test]
    fn s6_confirmed_record_is_skipped_over_not_rescanned() {
        let mut data = Vec::new();
        data.extend_from_slice(b"EDID");
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(b"TestNpc\0");
        let record = le_record(b"NPC_", 0x0100_0001, &data);
        let source = InMemorySource::new(&record);
        let config = ScanConfig::new();
        let mut result = RawScanResult::new();
        scan(&source, &config, &mut result).unwrap();
        assert_eq!(result.main_records.len(), 1);
        // The EDID subrecord lives inside the confirmed record's span and is never
        // independently re-dispatched (spec §4.4 step 3 skip-ahead).
        assert!(result.editor_ids.is_empty());
    }

    #[test]
    fn fragmented_editor_id_outside_any_record_is_detected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"EDID");
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(b"TestNpc\0");
        let source = InMemorySource::new(&data);
        let config = ScanConfig::new();
        let mut result = RawScanResult::new();
        scan(&source, &config, &mut result).unwrap();
        assert_eq!(result.editor_ids.len(), 1);
        assert_eq!(result.editor_ids[0].value, "TestNpc");
    }
}
