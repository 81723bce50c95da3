//! Placed-reference field extraction (`REFR`/`ACHR`/`ACRE`, spec §4.6): `NAME` base
//! form id, `DATA` position/rotation, `XSCL` scale, `XOWN` owner, `XESP` enable
//! parent, and the `XMRK`+`TNAM`+`FULL` map-marker triple.

use crate::binary::Endian;
use crate::entities::PlacedReference;
use crate::model::FormId;
use crate::registry::records::RecordKind;
use crate::result::RawScanResult;
use crate::structured::SubrecordSlice;

pub fn build_placed_reference(
    kind: RecordKind,
    is_persistent: bool,
    subs: &[SubrecordSlice<'_>],
    endian: Endian,
    raw: &RawScanResult,
) -> PlacedReference {
    let base_form_id = find(subs, b"NAME").and_then(|s| form_id(s, endian));
    let base_editor_id = base_form_id.and_then(|id| raw.form_editor_ids.get(id)).map(str::to_owned);

    let position = find(subs, b"DATA").and_then(|s| parse_position(s.payload, endian));

    let scale = find(subs, b"XSCL")
        .and_then(|s| crate::binary::read_f32(s.payload, 0, endian))
        .unwrap_or(1.0);

    let owner = find(subs, b"XOWN").and_then(|s| form_id(s, endian));
    let enable_parent = find(subs, b"XESP").and_then(|s| form_id(s, endian));

    let has_map_marker = subs.iter().any(|s| &s.signature == b"XMRK");
    let (map_marker_type, map_marker_name) = if has_map_marker {
        (
            find(subs, b"TNAM").and_then(|s| crate::binary::read_u16(s.payload, 0, endian)),
            find(subs, b"FULL").map(text),
        )
    } else {
        (None, None)
    };

    PlacedReference {
        kind,
        is_persistent,
        base_form_id,
        base_editor_id,
        position,
        scale,
        owner,
        enable_parent,
        map_marker_type,
        map_marker_name,
    }
}

fn find<'a>(subs: &'a [SubrecordSlice<'a>], sig: &[u8; 4]) -> Option<&'a SubrecordSlice<'a>> {
    subs.iter().find(|s| &s.signature == sig)
}

fn form_id(sub: &SubrecordSlice<'_>, endian: Endian) -> Option<FormId> {
    crate::binary::read_u32(sub.payload, 0, endian).map(FormId)
}

fn text(sub: &SubrecordSlice<'_>) -> String {
    let bytes = sub.payload;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// `DATA` on a placed reference is three position floats followed by three
/// rotation floats, matching [`crate::registry::subrecords::parse_position`]'s
/// layout.
fn parse_position(payload: &[u8], endian: Endian) -> Option<[f32; 6]> {
    if payload.len() < 24 {
        return None;
    }
    let mut out = [0f32; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = crate::binary::read_f32(payload, i * 4, endian)?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticLog;
    use crate::structured::iterate_subrecords;

    fn sub(sig: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(sig);
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn extracts_name_data_and_scale() {
        let mut data = sub(b"NAME", &0x0100_0002u32.to_le_bytes());
        let mut pose = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 0.0, 0.0, 0.0] {
            pose.extend_from_slice(&v.to_le_bytes());
        }
        data.extend(sub(b"DATA", &pose));
        data.extend(sub(b"XSCL", &2.5f32.to_le_bytes()));

        let mut raw = RawScanResult::new();
        raw.form_editor_ids.insert_if_absent(FormId(0x0100_0002), "TestBase");

        let mut log = DiagnosticLog::new();
        let subs = iterate_subrecords(&data, Endian::Little, &mut log, 0);
        let placed = build_placed_reference(RecordKind::PlacedObject, false, &subs, Endian::Little, &raw);

        assert_eq!(placed.base_form_id, Some(FormId(0x0100_0002)));
        assert_eq!(placed.base_editor_id.as_deref(), Some("TestBase"));
        assert_eq!(placed.position, Some([1.0, 2.0, 3.0, 0.0, 0.0, 0.0]));
        assert_eq!(placed.scale, 2.5);
    }
}
