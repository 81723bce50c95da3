//! C3: subrecord schema registry.
//!
//! Fixed layouts for the subrecord kinds spec §3's "Raw scan result" names
//! (editor-id, game-setting, ..., cell-grid), looked up by signature the same way
//! [`crate::registry::records`] looks up record kinds, and used by both the
//! structured parser's iteration and the dump scanner's generic fallback dispatch
//! (spec §4.4 step 5).

use crate::binary::{read_f32, read_u32, reverse_signature, Endian};
use std::collections::HashMap;
use std::sync::LazyLock;

/// A decoded subrecord payload, tagged by the shape the schema registry assigned it.
#[derive(Clone, Debug, PartialEq)]
pub enum SubrecordValue {
    EditorId(String),
    DisplayName(String),
    FormId(u32),
    Position([f32; 6]),
    Scale(f32),
    Heightmap(crate::model::Heightmap),
    ActorBaseStats(crate::model::ActorBaseStats),
    GameSetting(crate::model::GameSettingValue),
    ScriptText(String),
    DialogueResponseText(String),
    DialogueResponseData(crate::model::DialogueResponseData),
    GenericText(String),
    GenericPath(String),
    GenericFormId(u32),
    Condition(crate::model::Condition),
    CellGrid(crate::model::CellGrid),
}

/// The general shape a signature's payload is parsed as, independent of decoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubrecordShape {
    EditorId,
    DisplayName,
    FormId,
    Position,
    Scale,
    Heightmap,
    ActorBaseStats,
    GameSetting,
    ScriptText,
    DialogueResponseText,
    DialogueResponseData,
    GenericText,
    GenericPath,
    GenericFormId,
    Condition,
    CellGrid,
}

fn zstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

struct SchemaRegistry {
    by_canonical: HashMap<[u8; 4], SubrecordShape>,
    by_reversed: HashMap<[u8; 4], SubrecordShape>,
}

const SCHEMA: &[(&[u8; 4], SubrecordShape)] = &[
    (b"EDID", SubrecordShape::EditorId),
    (b"FULL", SubrecordShape::DisplayName),
    (b"FNAM", SubrecordShape::DisplayName),
    (b"NAME", SubrecordShape::FormId),
    (b"DATA", SubrecordShape::Position),
    (b"XSCL", SubrecordShape::Scale),
    (b"VHGT", SubrecordShape::Heightmap),
    (b"ACBS", SubrecordShape::ActorBaseStats),
    (b"XCLC", SubrecordShape::CellGrid),
    (b"CTDA", SubrecordShape::Condition),
    (b"NAM1", SubrecordShape::DialogueResponseText),
    (b"TRDT", SubrecordShape::DialogueResponseData),
    (b"SCTX", SubrecordShape::ScriptText),
    (b"DESC", SubrecordShape::GenericText),
    (b"CNAM", SubrecordShape::GenericText),
    (b"NNAM", SubrecordShape::GenericText),
    (b"ICON", SubrecordShape::GenericPath),
    (b"MICO", SubrecordShape::GenericPath),
    (b"MODL", SubrecordShape::GenericPath),
    (b"XOWN", SubrecordShape::GenericFormId),
    (b"XEZN", SubrecordShape::GenericFormId),
    (b"INAM", SubrecordShape::GenericFormId),
];

static REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(|| {
    let mut by_canonical = HashMap::new();
    let mut by_reversed = HashMap::new();
    for &(sig, shape) in SCHEMA {
        by_canonical.insert(*sig, shape);
        by_reversed.insert(reverse_signature(*sig), shape);
    }
    SchemaRegistry {
        by_canonical,
        by_reversed,
    }
});

/// All known subrecord signatures, canonical spelling, in registration order.
pub fn known_signatures() -> impl Iterator<Item = [u8; 4]> {
    SCHEMA.iter().map(|&(sig, _)| *sig)
}

/// Resolve an on-disk signature (`endian`'s byte order) to its known shape, if any.
pub fn shape_of(signature: [u8; 4], endian: Endian) -> Option<SubrecordShape> {
    match endian {
        Endian::Little => REGISTRY.by_canonical.get(&signature).copied(),
        Endian::Big => REGISTRY.by_reversed.get(&signature).copied(),
    }
}

/// Parse `payload` according to `shape`'s fixed layout, honouring `endian`. Returns
/// `None` on any length or bounds mismatch - the caller treats that as a speculative
/// or record-local failure per spec §7, never a panic.
pub fn parse(shape: SubrecordShape, payload: &[u8], endian: Endian) -> Option<SubrecordValue> {
    match shape {
        SubrecordShape::EditorId => Some(SubrecordValue::EditorId(zstring(payload))),
        SubrecordShape::DisplayName => Some(SubrecordValue::DisplayName(zstring(payload))),
        SubrecordShape::FormId => {
            read_u32(payload, 0, endian).map(SubrecordValue::FormId)
        }
        SubrecordShape::Position => parse_position(payload, endian).map(SubrecordValue::Position),
        SubrecordShape::Scale => read_f32(payload, 0, endian).map(SubrecordValue::Scale),
        SubrecordShape::Heightmap => {
            crate::model::Heightmap::decode(payload, endian).map(SubrecordValue::Heightmap)
        }
        SubrecordShape::ActorBaseStats => {
            crate::model::ActorBaseStats::decode(payload, endian)
                .map(SubrecordValue::ActorBaseStats)
        }
        SubrecordShape::GameSetting => {
            crate::model::GameSettingValue::decode(payload, endian)
                .map(SubrecordValue::GameSetting)
        }
        SubrecordShape::ScriptText => Some(SubrecordValue::ScriptText(zstring(payload))),
        SubrecordShape::DialogueResponseText => {
            Some(SubrecordValue::DialogueResponseText(zstring(payload)))
        }
        SubrecordShape::DialogueResponseData => {
            crate::model::DialogueResponseData::decode(payload, endian)
                .map(SubrecordValue::DialogueResponseData)
        }
        SubrecordShape::GenericText => Some(SubrecordValue::GenericText(zstring(payload))),
        SubrecordShape::GenericPath => Some(SubrecordValue::GenericPath(zstring(payload))),
        SubrecordShape::GenericFormId => {
            read_u32(payload, 0, endian).map(SubrecordValue::GenericFormId)
        }
        SubrecordShape::Condition => {
            crate::model::Condition::decode(payload, endian).map(SubrecordValue::Condition)
        }
        SubrecordShape::CellGrid => {
            crate::model::CellGrid::decode(payload, endian).map(SubrecordValue::CellGrid)
        }
    }
}

fn parse_position(payload: &[u8], endian: Endian) -> Option<[f32; 6]> {
    if payload.len() < 24 {
        return None;
    }
    let mut out = [0f32; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = read_f32(payload, i * 4, endian)?;
    }
    Some(out)
}

/// Validates a position subrecord per spec §4.4 step 4: all six floats finite and
/// within world bounds.
pub fn validate_position(pos: &[f32; 6]) -> bool {
    const WORLD_BOUND: f32 = 500_000.0;
    const ROTATION_BOUND: f32 = 10.0;
    pos[0..3].iter().all(|v| v.is_finite() && v.abs() <= WORLD_BOUND)
        && pos[3..6].iter().all(|v| v.is_finite() && v.abs() <= ROTATION_BOUND)
}

/// Validates the threshold-based plugin-index/nonzero constraint spec §4.4 step 4
/// places on generic form-id subrecords.
pub fn validate_form_id_reference(form_id: u32) -> bool {
    crate::model::FormId(form_id).plugin_index() <= 0x0F && form_id != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_id_truncates_at_null() {
        let payload = b"FooBar\0junk";
        assert_eq!(
            parse(SubrecordShape::EditorId, payload, Endian::Little),
            Some(SubrecordValue::EditorId("FooBar".to_string()))
        );
    }

    #[test]
    fn position_round_trip() {
        let mut payload = Vec::new();
        for v in [1.0f32, 2.0, 3.0, 0.1, 0.2, 0.3] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let parsed = parse(SubrecordShape::Position, &payload, Endian::Little).unwrap();
        assert_eq!(
            parsed,
            SubrecordValue::Position([1.0, 2.0, 3.0, 0.1, 0.2, 0.3])
        );
    }

    #[test]
    fn shape_lookup_both_endians() {
        assert_eq!(shape_of(*b"EDID", Endian::Little), Some(SubrecordShape::EditorId));
        assert_eq!(shape_of(*b"DIDE", Endian::Big), Some(SubrecordShape::EditorId));
    }
}
