//! C4: structured parser - TES4 header, group recursion, main-record header,
//! subrecord iteration with extended-size marker and per-record zlib decompression
//! (spec §4.3).

mod subrecords;

pub use subrecords::{iterate_subrecords, SubrecordSlice};

use crate::binary::{canonical_signature, read_u32, Endian};
use crate::diagnostics::Diagnostic;
use crate::model::{
    FormId, GroupHeader, GroupType, MainRecordHeader, MAIN_RECORD_HEADER_SIZE,
    MAX_DECOMPRESSED_SIZE,
};
use crate::registry::{records, subrecords as schema};
use crate::result::{
    EditorIdEntry, MainRecordDetection, RawScanResult,
};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Parsed TES4 file header (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct FileHeader {
    pub version: f32,
    pub next_object_id: u32,
    pub author: Option<String>,
    pub description: Option<String>,
    pub masters: Vec<String>,
    pub is_big_endian: bool,
}

/// Detects endianness from the first 4 bytes: canonical spelling -> little-endian,
/// reversed spelling -> big-endian, otherwise `None` (spec §4.3, S1).
pub fn detect_endian(buf: &[u8]) -> Option<Endian> {
    let sig = crate::binary::read_signature(buf, 0)?;
    if sig == *b"TES4" {
        Some(Endian::Little)
    } else if sig == crate::binary::reverse_signature(*b"TES4") {
        Some(Endian::Big)
    } else {
        None
    }
}

fn zstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Parses a structured ESM byte span end to end: the TES4 header followed by the
/// recursive group tree. Returns the decoded header; raw detections and typed
/// subrecord entries are written into `result` as they're found.
///
/// Never panics on malformed input: structural inconsistencies are recorded into
/// `result.diagnostics` and the walk resumes at the next top-level boundary
/// (spec §4.3, §7).
pub fn parse_structured(buf: &[u8], result: &mut RawScanResult) -> crate::error::ScanResult<FileHeader> {
    if buf.len() < MAIN_RECORD_HEADER_SIZE {
        return Err(crate::error::ScanError::TooSmall { len: buf.len() as u64 });
    }
    let endian = detect_endian(buf).ok_or(crate::error::ScanError::UnknownEndian)?;

    let tes4 = MainRecordHeader::parse(buf, 0, endian)
        .filter(|h| canonical_signature(h.signature, endian) == *b"TES4")
        .ok_or(crate::error::ScanError::UnknownEndian)?;

    let data_start = MAIN_RECORD_HEADER_SIZE;
    let data_end = (data_start + tes4.data_size as usize).min(buf.len());
    let header_data = &buf[data_start..data_end];

    let mut version = 0.0f32;
    let mut next_object_id = 0u32;
    let mut author = None;
    let mut description = None;
    let mut masters = Vec::new();

    for sub in &iterate_subrecords(header_data, endian, &mut result.diagnostics, 0) {
        match &sub.signature {
            b"HEDR" => {
                if sub.payload.len() >= 12 {
                    version = crate::binary::read_f32(sub.payload, 0, endian).unwrap_or(0.0);
                    next_object_id = read_u32(sub.payload, 8, endian).unwrap_or(0);
                }
            }
            b"CNAM" => author = Some(zstring(sub.payload)),
            b"SNAM" => description = Some(zstring(sub.payload)),
            b"MAST" => masters.push(zstring(sub.payload)),
            _ => {}
        }
    }

    let header = FileHeader {
        version,
        next_object_id,
        author,
        description,
        masters,
        is_big_endian: endian.is_big(),
    };

    let mut offset = data_start + tes4.data_size as usize;
    while offset + MAIN_RECORD_HEADER_SIZE <= buf.len() {
        match GroupHeader::parse(buf, offset, endian) {
            Some(group) if group.is_plausible() => {
                let declared_end = offset as u64 + group.group_size as u64;
                let world_context = group_world_context(&group, endian, None);
                let actual_end = parse_group_children(
                    buf,
                    offset + crate::model::GROUP_HEADER_SIZE,
                    declared_end.min(buf.len() as u64),
                    endian,
                    result,
                    1,
                    world_context,
                );
                // Console nested-group overrun quirk: advance by whichever end was
                // reached further (spec §3, §4.3 tie-break).
                offset = declared_end.max(actual_end) as usize;
            }
            Some(_) => {
                result.diagnostics.push(Diagnostic::Truncated {
                    offset: offset as u64,
                    reason: "group-size below minimum header size".to_string(),
                });
                break;
            }
            None => {
                // Not a group; try a bare top-level main record (uncommon but the
                // spec doesn't forbid it - treat like any other record boundary).
                match try_parse_main_record(buf, offset, endian, result, None) {
                    Some(next) => offset = next,
                    None => break,
                }
            }
        }
    }

    Ok(header)
}

/// A `World Children` group's 4-byte label is the owning `WRLD`'s form id rather
/// than a record-type signature (spec §3 "Cell"); every other group type's label
/// carries no worldspace information, so the context inherited from the enclosing
/// group passes through unchanged.
fn group_world_context(group: &GroupHeader, endian: Endian, inherited: Option<FormId>) -> Option<FormId> {
    match GroupType::from_raw(group.group_type) {
        Some(GroupType::WorldChildren) => read_u32(&group.label, 0, endian).map(FormId),
        _ => inherited,
    }
}

/// Walks one group's children until `child_offset >= min(declared_end, span_len)`
/// (spec §4.3). Returns the offset actually reached, which may exceed `end` on the
/// console nested-group overrun quirk. `world_context` carries the enclosing
/// `WRLD`'s form id, if any, down to the cells nested inside its children groups.
fn parse_group_children(
    buf: &[u8],
    start: usize,
    end: u64,
    endian: Endian,
    result: &mut RawScanResult,
    depth: usize,
    world_context: Option<FormId>,
) -> u64 {
    let limit = end.min(buf.len() as u64);
    let mut offset = start as u64;
    while offset < limit && (offset as usize) + MAIN_RECORD_HEADER_SIZE <= buf.len() {
        let off = offset as usize;
        match GroupHeader::parse(buf, off, endian) {
            Some(group) if group.is_plausible() => {
                let declared_end = offset + group.group_size as u64;
                let nested_context = group_world_context(&group, endian, world_context);
                let actual_end = parse_group_children(
                    buf,
                    off + crate::model::GROUP_HEADER_SIZE,
                    declared_end.min(buf.len() as u64),
                    endian,
                    result,
                    depth + 1,
                    nested_context,
                );
                offset = declared_end.max(actual_end);
            }
            Some(_) => {
                result.diagnostics.push(Diagnostic::Truncated {
                    offset,
                    reason: "nested group-size below minimum header size".to_string(),
                });
                break;
            }
            None => match try_parse_main_record(buf, off, endian, result, world_context) {
                Some(next) => offset = next as u64,
                None => break,
            },
        }
    }
    offset
}

/// Parses one main record at `offset`: header, then data area (decompressed if
/// needed), then its subrecord stream. Returns the offset immediately after the
/// record on success.
fn try_parse_main_record(
    buf: &[u8],
    offset: usize,
    endian: Endian,
    result: &mut RawScanResult,
    world_context: Option<FormId>,
) -> Option<usize> {
    let header = MainRecordHeader::parse(buf, offset, endian)?;
    if !crate::binary::is_alphanumeric_or_underscore(header.signature) {
        result.diagnostics.push(Diagnostic::Truncated {
            offset: offset as u64,
            reason: "main record signature not alphanumeric/underscore".to_string(),
        });
        return None;
    }

    let data_start = offset + MAIN_RECORD_HEADER_SIZE;
    let data_end = data_start + header.data_size as usize;
    if data_end > buf.len() {
        result.diagnostics.push(Diagnostic::Truncated {
            offset: offset as u64,
            reason: "record data area runs past end of span".to_string(),
        });
        return None;
    }
    let raw_data = &buf[data_start..data_end];
    let kind = records::lookup(header.signature, endian);

    let decoded: std::borrow::Cow<[u8]> = if header.is_compressed() && raw_data.len() > 4 {
        match decompress_record(raw_data, endian) {
            Some(bytes) => std::borrow::Cow::Owned(bytes),
            None => {
                result.diagnostics.push(Diagnostic::DecompressFailed {
                    offset: offset as u64,
                    reason: "zlib inflate failed or exceeded size cap".to_string(),
                });
                std::borrow::Cow::Borrowed(&[][..])
            }
        }
    } else {
        std::borrow::Cow::Borrowed(raw_data)
    };

    result.add_main_record(MainRecordDetection {
        offset: offset as u64,
        header: header.clone(),
        kind,
    });

    record_subrecords(&decoded, endian, header.form_id, offset as u64, kind, result);

    if kind == Some(records::RecordKind::Cell) {
        if let Some(world_form_id) = world_context {
            result.cell_worldspace.insert(offset as u64, world_form_id);
        }
    }
    if kind == Some(records::RecordKind::Land) {
        result.land_records.push(offset as u64);
    }
    if kind.map(|k| k.is_placed_reference()).unwrap_or(false) {
        result.placed_object_records.push(offset as u64);
    }

    Some(data_end)
}

fn decompress_record(raw_data: &[u8], endian: Endian) -> Option<Vec<u8>> {
    let expanded_size = read_u32(raw_data, 0, endian)? as usize;
    if expanded_size > MAX_DECOMPRESSED_SIZE {
        return None;
    }
    let mut decoder = ZlibDecoder::new(&raw_data[4..]);
    let mut out = Vec::with_capacity(expanded_size.min(MAX_DECOMPRESSED_SIZE));
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

/// Iterates `data`'s subrecord stream and files each known subrecord into the
/// typed lists of `result`, populating the form->editor-id map as editor-id
/// subrecords are decoded (spec §3 "Lifecycle" (a)).
///
/// `kind` lets a handful of signatures be reinterpreted per owning record kind
/// instead of by signature alone: `GMST`'s `DATA` is an int/float/short-string
/// value, not the `Position` layout every other kind's `DATA` carries.
fn record_subrecords(
    data: &[u8],
    endian: Endian,
    owner_form_id: FormId,
    record_offset: u64,
    kind: Option<records::RecordKind>,
    result: &mut RawScanResult,
) {
    let entries = iterate_subrecords(data, endian, &mut result.diagnostics, record_offset);
    let mut editor_id: Option<String> = None;
    for sub in entries {
        let is_game_setting_value =
            kind == Some(records::RecordKind::GameSetting) && canonical_signature(sub.signature, endian) == *b"DATA";

        let shape = if is_game_setting_value {
            Some(schema::SubrecordShape::GameSetting)
        } else {
            schema::shape_of(sub.signature, endian)
        };

        let Some(shape) = shape else {
            result.generic_subrecords.push(crate::result::GenericSubrecordEntry {
                offset: sub.absolute_offset,
                signature: sub.signature,
                raw: sub.payload.to_vec(),
            });
            continue;
        };
        let Some(value) = schema::parse(shape, sub.payload, endian) else {
            continue;
        };

        if let schema::SubrecordValue::EditorId(s) = &value {
            editor_id = Some(s.clone());
        }
        let value = match (value, &editor_id) {
            (schema::SubrecordValue::GameSetting(v), Some(eid)) => {
                schema::SubrecordValue::GameSetting(v.retag(eid))
            }
            (other, _) => other,
        };

        file_subrecord_value(sub.absolute_offset, sub.signature, owner_form_id, value, result);
    }
}

fn file_subrecord_value(
    offset: u64,
    signature: [u8; 4],
    owner_form_id: FormId,
    value: schema::SubrecordValue,
    result: &mut RawScanResult,
) {
    use schema::SubrecordValue::*;
    match value {
        EditorId(s) => {
            result.form_editor_ids.insert_if_absent(owner_form_id, s.clone());
            result.add_editor_id(EditorIdEntry { offset, value: s });
        }
        DisplayName(s) => result.names.push(crate::result::NameEntry { offset, value: s }),
        FormId(form_id) => {
            result.add_form_id_ref(crate::result::FormIdRefEntry {
                offset,
                form_id: crate::model::FormId(form_id),
            });
        }
        Position(pose) => result.positions.push(crate::result::PositionEntry { offset, pose }),
        Scale(_) => {}
        Heightmap(hm) => result.heightmaps.push(crate::result::HeightmapEntry { offset, heightmap: hm }),
        ActorBaseStats(stats) => result
            .actor_base_stats
            .push(crate::result::ActorBaseStatsEntry { offset, stats }),
        GameSetting(v) => result
            .game_settings
            .push(crate::result::GameSettingEntry { offset, value: v }),
        ScriptText(s) => result.script_texts.push(crate::result::ScriptTextEntry { offset, text: s }),
        DialogueResponseText(s) => result
            .dialogue_response_texts
            .push(crate::result::DialogueResponseTextEntry { offset, text: s }),
        DialogueResponseData(d) => result
            .dialogue_response_data
            .push(crate::result::DialogueResponseDataEntry { offset, data: d }),
        GenericText(s) => result.generic_texts.push(crate::result::GenericTextEntry {
            offset,
            signature,
            text: s,
        }),
        GenericPath(s) => {
            result.generic_paths.push(crate::result::GenericPathEntry { offset, path: s.clone() });
            result.asset_paths.push(crate::result::AssetPathEntry { offset, path: s });
        }
        GenericFormId(form_id) => result
            .generic_form_id_refs
            .push(crate::result::FormIdRefEntry { offset, form_id: crate::model::FormId(form_id) }),
        Condition(c) => result.conditions.push(crate::result::ConditionEntry { offset, condition: c }),
        CellGrid(grid) => result.cell_grids.push(crate::result::CellGridEntry { offset, grid }),
    }
}

#[allow(dead_code)]
fn group_type_of(group: &GroupHeader) -> Option<GroupType> {
    GroupType::from_raw(group.group_type)
}
