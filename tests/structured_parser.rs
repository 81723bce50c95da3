//! Black-box tests for the structured ESM parser (C4), built from hand-constructed
//! byte fixtures rather than real save/plugin files (spec §8 S1, S2, S5, S6).

use esm_scan::binary::Endian;
use esm_scan::config::ScanConfig;
use esm_scan::model::{FormId, GameSettingValue, GROUP_HEADER_SIZE};
use esm_scan::registry::records::RecordKind;
use esm_scan::result::RawScanResult;
use esm_scan::scan_esm_buffer;
use esm_scan::structured::parse_structured;

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

fn le_sub(sig: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(sig);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn le_group(kind_sig: &[u8; 4], records: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GRUP");
    let size = (GROUP_HEADER_SIZE + records.len()) as u32;
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(kind_sig);
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(records);
    out
}

/// A group header with an explicit `group_type` and 4-byte `label`, unlike
/// [`le_group`] which always writes `Top` (type 0) with the kind signature as label.
fn le_group_typed(label: &[u8; 4], group_type: i32, records: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"GRUP");
    let size = (GROUP_HEADER_SIZE + records.len()) as u32;
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(label);
    out.extend_from_slice(&group_type.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(records);
    out
}

fn minimal_tes4() -> Vec<u8> {
    let mut hedr = Vec::new();
    hedr.extend_from_slice(&0.94f32.to_le_bytes());
    hedr.extend_from_slice(&0i32.to_le_bytes());
    hedr.extend_from_slice(&7u32.to_le_bytes());
    let data = le_sub(b"HEDR", &hedr);
    le_record(b"TES4", 0, &data)
}

#[test]
fn s1_endian_is_detected_from_both_byte_orders() {
    assert_eq!(esm_scan::structured::detect_endian(b"TES4garbage"), Some(Endian::Little));
    assert_eq!(esm_scan::structured::detect_endian(b"4SETgarbage"), Some(Endian::Big));
    assert_eq!(esm_scan::structured::detect_endian(b"ZZZZgarbage"), None);

    let le = minimal_tes4();
    let mut result = RawScanResult::new();
    let header = parse_structured(&le, &mut result).unwrap();
    assert!(!header.is_big_endian);
}

#[test]
fn s2_whole_file_parse_recovers_editor_id_and_counts() {
    let mut buf = minimal_tes4();
    let npc_data = le_sub(b"EDID", b"TestNpc\0");
    let npc_record = le_record(b"NPC_", 0x0100_0001, &npc_data);
    buf.extend_from_slice(&le_group(b"NPC_", &npc_record));

    let config = ScanConfig::default();
    let result = scan_esm_buffer(&buf, &config).unwrap();

    assert_eq!(result.counts().main_record_total, 1);
    assert_eq!(result.raw().editor_ids.len(), 1);
    assert_eq!(result.raw().editor_ids[0].value, "TestNpc");
    assert_eq!(
        result.raw().form_editor_ids.get(esm_scan::model::FormId(0x0100_0001)),
        Some("TestNpc")
    );
    assert_eq!(*result.counts().by_kind.get(&RecordKind::Npc).unwrap(), 1);
}

#[test]
fn s5_compressed_record_payload_is_inflated_before_subrecord_scan() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut buf = minimal_tes4();

    let inner = le_sub(b"EDID", b"CompressedNpc\0");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&inner).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut data = (inner.len() as u32).to_le_bytes().to_vec();
    data.extend_from_slice(&compressed);

    let mut record = Vec::new();
    record.extend_from_slice(b"NPC_");
    record.extend_from_slice(&(data.len() as u32).to_le_bytes());
    record.extend_from_slice(&0x0004_0000u32.to_le_bytes()); // COMPRESSED flag bit
    record.extend_from_slice(&0x0100_0002u32.to_le_bytes());
    record.extend_from_slice(&0u32.to_le_bytes());
    record.extend_from_slice(&0u32.to_le_bytes());
    record.extend_from_slice(&data);

    buf.extend_from_slice(&le_group(b"NPC_", &record));

    let config = ScanConfig::default();
    let result = scan_esm_buffer(&buf, &config).unwrap();
    assert_eq!(result.raw().editor_ids.len(), 1);
    assert_eq!(result.raw().editor_ids[0].value, "CompressedNpc");
}

#[test]
fn s6_console_nested_group_overrun_does_not_truncate_trailing_sibling() {
    // A nested group whose declared size undercounts its actual contents (the
    // console overrun quirk): the parser must still reach the sibling record that
    // follows, advancing by max(declared_end, actual_end).
    let mut buf = minimal_tes4();

    let npc_a = le_record(b"NPC_", 0x0100_0010, &le_sub(b"EDID", b"First\0"));
    let npc_b = le_record(b"NPC_", 0x0100_0011, &le_sub(b"EDID", b"Second\0"));

    let mut inner_records = Vec::new();
    inner_records.extend_from_slice(&npc_a);
    inner_records.extend_from_slice(&npc_b);

    let mut inner_group = Vec::new();
    inner_group.extend_from_slice(b"GRUP");
    // Declare a size that only covers the header plus the first record - shorter
    // than what's actually present - to simulate the overrun quirk.
    let declared_short = (GROUP_HEADER_SIZE + npc_a.len()) as u32;
    inner_group.extend_from_slice(&declared_short.to_le_bytes());
    inner_group.extend_from_slice(b"NPC_");
    inner_group.extend_from_slice(&0i32.to_le_bytes());
    inner_group.extend_from_slice(&0u16.to_le_bytes());
    inner_group.extend_from_slice(&0u16.to_le_bytes());
    inner_group.extend_from_slice(&inner_records);

    let mut outer_group = Vec::new();
    outer_group.extend_from_slice(b"GRUP");
    let outer_size = (GROUP_HEADER_SIZE + inner_group.len()) as u32;
    outer_group.extend_from_slice(&outer_size.to_le_bytes());
    outer_group.extend_from_slice(b"NPC_");
    outer_group.extend_from_slice(&0i32.to_le_bytes());
    outer_group.extend_from_slice(&0u16.to_le_bytes());
    outer_group.extend_from_slice(&0u16.to_le_bytes());
    outer_group.extend_from_slice(&inner_group);

    buf.extend_from_slice(&outer_group);

    let mut result = RawScanResult::new();
    let _ = parse_structured(&buf, &mut result).unwrap();
    assert_eq!(result.main_records.len(), 2);
    assert_eq!(
        result.form_editor_ids.get(esm_scan::model::FormId(0x0100_0010)),
        Some("First")
    );
    assert_eq!(
        result.form_editor_ids.get(esm_scan::model::FormId(0x0100_0011)),
        Some("Second")
    );
}

#[test]
fn gmst_data_subrecord_is_typed_by_record_kind_not_shape_collision() {
    // GMST's DATA subrecord shares a signature with the cell/reference "position"
    // DATA but is only 4 bytes - record-kind-aware dispatch must route it to the
    // GameSetting shape instead of rejecting it as a too-short Position payload.
    let mut buf = minimal_tes4();

    let int_setting = {
        let mut subs = le_sub(b"EDID", b"iTestSetting\0");
        subs.extend_from_slice(&le_sub(b"DATA", &7i32.to_le_bytes()));
        le_record(b"GMST", 0x0100_0020, &subs)
    };
    let float_setting = {
        let mut subs = le_sub(b"EDID", b"fTestSetting\0");
        subs.extend_from_slice(&le_sub(b"DATA", &1.5f32.to_bits().to_le_bytes()));
        le_record(b"GMST", 0x0100_0021, &subs)
    };

    let mut records = int_setting;
    records.extend_from_slice(&float_setting);
    buf.extend_from_slice(&le_group(b"GMST", &records));

    let config = ScanConfig::default();
    let result = scan_esm_buffer(&buf, &config).unwrap();

    assert_eq!(result.raw().game_settings.len(), 2);
    assert_eq!(result.raw().game_settings[0].value, GameSettingValue::Int(7));
    assert_eq!(result.raw().game_settings[1].value, GameSettingValue::Float(1.5));
}

#[test]
fn cell_resolves_owning_worldspace_from_enclosing_world_children_group() {
    // WRLD 0x0100_0030 owns a WorldChildren group (type 1, label = the WRLD's own
    // form id) nested with an ExteriorCellBlock group containing the CELL record.
    let mut buf = minimal_tes4();

    let wrld_record = le_record(b"WRLD", 0x0100_0030, &le_sub(b"EDID", b"TestWorld\0"));
    let cell_record = le_record(b"CELL", 0x0100_0031, &le_sub(b"EDID", b"TestCell\0"));

    let cell_block = le_group_typed(b"\0\0\0\0", 4, &cell_record);
    let world_children = le_group_typed(&0x0100_0030u32.to_le_bytes(), 1, &cell_block);

    let mut wrld_group_children = wrld_record;
    wrld_group_children.extend_from_slice(&world_children);
    buf.extend_from_slice(&le_group(b"WRLD", &wrld_group_children));

    let mut result = RawScanResult::new();
    let _ = parse_structured(&buf, &mut result).unwrap();

    let cell_offset = result
        .main_records
        .iter()
        .find(|r| r.kind == Some(RecordKind::Cell))
        .unwrap()
        .offset;
    assert_eq!(result.cell_worldspace.get(&cell_offset), Some(&FormId(0x0100_0030)));
}

#[test]
fn interior_cell_outside_any_world_children_group_has_no_worldspace() {
    let mut buf = minimal_tes4();
    let cell_record = le_record(b"CELL", 0x0100_0040, &le_sub(b"EDID", b"InteriorCell\0"));
    buf.extend_from_slice(&le_group(b"CELL", &cell_record));

    let mut result = RawScanResult::new();
    let _ = parse_structured(&buf, &mut result).unwrap();

    let cell_offset = result
        .main_records
        .iter()
        .find(|r| r.kind == Some(RecordKind::Cell))
        .unwrap()
        .offset;
    assert_eq!(result.cell_worldspace.get(&cell_offset), None);
}
