//! Shared data model (spec §3): signatures, form ids, headers, and the fixed-layout
//! value types the subrecord schema registry decodes into.

use crate::binary::{is_all_printable_ascii, read_f32, read_i16, read_i32, read_i8, read_u16, read_u32, Endian};
use bitflags::bitflags;

/// 32-bit form identifier. Top 8 bits are the plugin index, low 24 bits the local id
/// (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(pub u32);

impl FormId {
    pub const NONE: FormId = FormId(0);
    pub const SENTINEL: FormId = FormId(0xFFFF_FFFF);

    pub fn plugin_index(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn local_id(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn is_sentinel(self) -> bool {
        self.0 == 0 || self.0 == 0xFFFF_FFFF
    }

    /// Reject random data misread as a form id: base content uses small plugin
    /// indices, so anything above this threshold is suspicious (spec §3).
    pub fn has_plausible_plugin_index(self) -> bool {
        self.plugin_index() <= 0x0F
    }

    /// A form id whose four bytes are all printable ASCII collides with string data
    /// and must be rejected (spec §3, S3).
    pub fn collides_with_ascii(self) -> bool {
        is_all_printable_ascii(self.0.to_be_bytes())
    }

    pub fn is_plausible(self) -> bool {
        !self.is_sentinel() && !self.collides_with_ascii()
    }
}

bitflags! {
    /// Main-record flags (spec §3). Only the bits the spec names are modelled;
    /// unknown bits are preserved via `from_bits_retain` so validation can still
    /// reject the "upper bits set without compressed" case.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RecordFlags: u32 {
        const DELETED = 0x0000_0020;
        const PERSISTENT_REFR = 0x0000_0400;
        const IGNORED = 0x0000_1000;
        const COMPRESSED = 0x0004_0000;
    }
}

impl RecordFlags {
    /// spec §3: "flags with bits 0xFFF00000 set and the compressed bit clear are
    /// invalid".
    pub fn is_structurally_valid(raw: u32) -> bool {
        let high_bits_set = raw & 0xFFF0_0000 != 0;
        let compressed = raw & RecordFlags::COMPRESSED.bits() != 0;
        !high_bits_set || compressed
    }
}

/// 24-byte main-record header (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct MainRecordHeader {
    pub signature: [u8; 4],
    pub data_size: u32,
    pub flags: RecordFlags,
    pub raw_flags: u32,
    pub form_id: FormId,
    pub version_control_info: u32,
    pub version: u32,
    pub endian: Endian,
}

pub const MAIN_RECORD_HEADER_SIZE: usize = 24;
pub const MAX_RECORD_DATA_SIZE: u32 = 10_000_000;
pub const MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

impl MainRecordHeader {
    /// Parses the fixed 24-byte layout at `offset` within `buf`, honouring `endian`.
    /// Returns `None` on bounds failure only; semantic validation is
    /// [`Self::is_plausible`].
    pub fn parse(buf: &[u8], offset: usize, endian: Endian) -> Option<MainRecordHeader> {
        if buf.len() < offset + MAIN_RECORD_HEADER_SIZE {
            return None;
        }
        let signature = crate::binary::read_signature(buf, offset)?;
        let data_size = read_u32(buf, offset + 4, endian)?;
        let raw_flags = read_u32(buf, offset + 8, endian)?;
        let form_id = FormId(read_u32(buf, offset + 12, endian)?);
        let version_control_info = read_u32(buf, offset + 16, endian)?;
        let version = read_u32(buf, offset + 20, endian)?;
        Some(MainRecordHeader {
            signature,
            data_size,
            flags: RecordFlags::from_bits_retain(raw_flags),
            raw_flags,
            form_id,
            version_control_info,
            version,
            endian,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(RecordFlags::COMPRESSED)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(RecordFlags::DELETED)
    }

    /// Whether the record's own header flags mark it a persistent reference (spec
    /// §3 "Placed reference", surfaced on both `CELL` and placed-reference kinds).
    pub fn is_persistent_refr(&self) -> bool {
        self.flags.contains(RecordFlags::PERSISTENT_REFR)
    }

    /// Structural plausibility checks shared by the structured parser and the dump
    /// scanner's strict header validation (spec §3, §4.4).
    pub fn is_plausible(&self) -> bool {
        crate::binary::is_alphanumeric_or_underscore(self.signature)
            && self.data_size > 0
            && self.data_size <= MAX_RECORD_DATA_SIZE
            && RecordFlags::is_structurally_valid(self.raw_flags)
            && !self.form_id.is_sentinel()
            && !self.form_id.collides_with_ascii()
            && self.form_id.plugin_index() <= 0xFF
    }
}

/// 6-byte subrecord header (spec §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubrecordHeader {
    pub signature: [u8; 4],
    pub length: u16,
}

pub const SUBRECORD_HEADER_SIZE: usize = 6;
pub const EXTENDED_SIZE_SIGNATURE: [u8; 4] = *b"XXXX";

impl SubrecordHeader {
    pub fn parse(buf: &[u8], offset: usize, endian: Endian) -> Option<SubrecordHeader> {
        if buf.len() < offset + SUBRECORD_HEADER_SIZE {
            return None;
        }
        let signature = crate::binary::read_signature(buf, offset)?;
        let length = read_u16(buf, offset + 4, endian)?;
        Some(SubrecordHeader { signature, length })
    }

    pub fn is_extended_size_marker(&self) -> bool {
        self.signature == EXTENDED_SIZE_SIGNATURE && self.length == 4
    }
}

/// Group-type values a group's 4-byte label can mean, depending on context
/// (SPEC_FULL.md §3 supplement).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupType {
    Top,
    WorldChildren,
    InteriorCellBlock,
    InteriorCellSubBlock,
    ExteriorCellBlock,
    ExteriorCellSubBlock,
    CellChildren,
    TopicChildren,
    CellPersistentChildren,
    CellTemporaryChildren,
    CellVisibleDistantChildren,
}

impl GroupType {
    pub fn from_raw(raw: i32) -> Option<GroupType> {
        Some(match raw {
            0 => GroupType::Top,
            1 => GroupType::WorldChildren,
            2 => GroupType::InteriorCellBlock,
            3 => GroupType::InteriorCellSubBlock,
            4 => GroupType::ExteriorCellBlock,
            5 => GroupType::ExteriorCellSubBlock,
            6 => GroupType::CellChildren,
            7 => GroupType::TopicChildren,
            8 => GroupType::CellPersistentChildren,
            9 => GroupType::CellTemporaryChildren,
            10 => GroupType::CellVisibleDistantChildren,
            _ => return None,
        })
    }

    /// Whether this group type's label is a record-type signature (as opposed to a
    /// coordinate pair or parent form id).
    pub fn label_is_signature(self) -> bool {
        matches!(self, GroupType::Top)
    }
}

pub const GROUP_HEADER_SIZE: usize = 24;
pub const GROUP_SIGNATURE: [u8; 4] = *b"GRUP";

/// 24-byte group header (spec §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupHeader {
    pub group_size: u32,
    pub label: [u8; 4],
    pub group_type: i32,
    pub stamp: u16,
    pub version_control_info: u16,
}

impl GroupHeader {
    pub fn parse(buf: &[u8], offset: usize, endian: Endian) -> Option<GroupHeader> {
        if buf.len() < offset + GROUP_HEADER_SIZE {
            return None;
        }
        let sig = crate::binary::read_signature(buf, offset)?;
        if crate::binary::canonical_signature(sig, endian) != GROUP_SIGNATURE {
            return None;
        }
        let group_size = read_u32(buf, offset + 4, endian)?;
        let label = crate::binary::read_signature(buf, offset + 8)?;
        let group_type = read_i32(buf, offset + 12, endian)?;
        let stamp = read_u16(buf, offset + 16, endian)?;
        let version_control_info = read_u16(buf, offset + 18, endian)?;
        Some(GroupHeader {
            group_size,
            label,
            group_type,
            stamp,
            version_control_info,
        })
    }

    pub fn is_plausible(&self) -> bool {
        self.group_size >= GROUP_HEADER_SIZE as u32
    }
}

/// Decoded `VHGT` heightmap (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Heightmap {
    pub base_offset: f32,
    /// Cumulative physical heights, row-major, 33x33.
    pub heights: [[f32; 33]; 33],
}

const HEIGHTMAP_PAYLOAD_LEN: usize = 4 + 1089 + 3;

impl Heightmap {
    /// Decodes a `VHGT` payload: `f32` base offset followed by 33x33 signed-byte
    /// deltas, cumulative per row with each row's first column seeding the next
    /// row's accumulator (spec §3, S5).
    pub fn decode(payload: &[u8], endian: Endian) -> Option<Heightmap> {
        if payload.len() < HEIGHTMAP_PAYLOAD_LEN {
            return None;
        }
        let base_offset = read_f32(payload, 0, endian)?;
        let mut heights = [[0f32; 33]; 33];
        let mut row_seed = base_offset;
        for row in 0..33 {
            let mut accumulator = row_seed;
            for col in 0..33 {
                let idx = 4 + row * 33 + col;
                let delta = read_i8(payload, idx)? as f32;
                accumulator += delta * 8.0;
                heights[row][col] = accumulator;
                if col == 0 {
                    row_seed = accumulator;
                }
            }
        }
        Some(Heightmap {
            base_offset,
            heights,
        })
    }
}

/// Decoded `XCLC` cell-grid coordinate (spec §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellGrid {
    pub x: i32,
    pub y: i32,
    pub flags: u8,
}

impl CellGrid {
    pub fn decode(payload: &[u8], endian: Endian) -> Option<CellGrid> {
        if payload.len() < 8 {
            return None;
        }
        let x = read_i32(payload, 0, endian)?;
        let y = read_i32(payload, 4, endian)?;
        let flags = payload.get(8).copied().unwrap_or(0);
        Some(CellGrid { x, y, flags })
    }
}

/// Decoded `ACBS` actor-base-stats block (spec §4.6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActorBaseStats {
    pub flags: u32,
    pub fatigue: u16,
    pub barter_gold: u16,
    pub level: i16,
    pub calc_min: u16,
    pub calc_max: u16,
    pub speed_multiplier: u16,
    pub karma: i16,
    pub disposition: i16,
    pub template_flags: u16,
}

impl ActorBaseStats {
    pub fn decode(payload: &[u8], endian: Endian) -> Option<ActorBaseStats> {
        if payload.len() < 24 {
            return None;
        }
        Some(ActorBaseStats {
            flags: read_u32(payload, 0, endian)?,
            fatigue: read_u16(payload, 4, endian)?,
            barter_gold: read_u16(payload, 6, endian)?,
            level: read_i16(payload, 8, endian)?,
            calc_min: read_u16(payload, 10, endian)?,
            calc_max: read_u16(payload, 12, endian)?,
            speed_multiplier: read_u16(payload, 14, endian)?,
            karma: read_i16(payload, 16, endian)?,
            disposition: read_i16(payload, 18, endian)?,
            template_flags: read_u16(payload, 20, endian)?,
        })
    }

    /// Semantic validation spec §4.4 step 4 places on dump-scanned actor-base
    /// candidates: fatigue <= 1000, level in [-128, 255], speed <= 500,
    /// karma in [-2, 2].
    pub fn is_plausible(&self) -> bool {
        self.fatigue <= 1000
            && (-128..=255).contains(&(self.level as i32))
            && self.speed_multiplier <= 500
            && (-2..=2).contains(&self.karma)
    }
}

/// Decoded `GMST` value. The concrete variant depends on the editor id's first
/// character ('b'=bool/int, 'i'=int, 'f'=float, 's'=string); the schema registry
/// (no editor-id context) defaults to [`Self::from_raw`], and the reconstructor
/// (which does have the editor id) re-tags via [`Self::retag`].
#[derive(Clone, Debug, PartialEq)]
pub enum GameSettingValue {
    Int(i32),
    Float(f32),
    Str(String),
}

impl GameSettingValue {
    pub fn decode(payload: &[u8], endian: Endian) -> Option<GameSettingValue> {
        if payload.len() == 4 {
            Some(GameSettingValue::Int(read_i32(payload, 0, endian)?))
        } else {
            Some(GameSettingValue::Str(
                String::from_utf8_lossy(
                    &payload[..payload.iter().position(|&b| b == 0).unwrap_or(payload.len())],
                )
                .into_owned(),
            ))
        }
    }

    pub fn retag(self, editor_id: &str) -> GameSettingValue {
        match (editor_id.as_bytes().first(), self) {
            (Some(b'f'), GameSettingValue::Int(raw)) => {
                GameSettingValue::Float(f32::from_bits(raw as u32))
            }
            (_, other) => other,
        }
    }
}

/// Decoded `TRDT` dialogue-response emotion data (spec §4.6), 20 bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DialogueResponseData {
    pub emotion_type: i32,
    pub emotion_value: i32,
    pub response_number: u8,
    pub flags: u8,
}

impl DialogueResponseData {
    pub fn decode(payload: &[u8], endian: Endian) -> Option<DialogueResponseData> {
        if payload.len() < 20 {
            return None;
        }
        Some(DialogueResponseData {
            emotion_type: read_i32(payload, 0, endian)?,
            emotion_value: read_i32(payload, 4, endian)?,
            response_number: payload.get(12).copied()?,
            flags: payload.get(16).copied()?,
        })
    }
}

/// Decoded `CTDA` condition (spec §3 "condition" in the raw scan result).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Condition {
    pub operator: u8,
    pub comparison_value: f32,
    pub function_index: u32,
    pub param1: i32,
    pub param2: i32,
    pub run_on: u32,
    pub reference: u32,
}

impl Condition {
    pub fn decode(payload: &[u8], endian: Endian) -> Option<Condition> {
        if payload.len() < 28 {
            return None;
        }
        Some(Condition {
            operator: payload[0],
            comparison_value: read_f32(payload, 4, endian)?,
            function_index: read_u32(payload, 8, endian)?,
            param1: read_i32(payload, 12, endian)?,
            param2: read_i32(payload, 16, endian)?,
            run_on: read_u32(payload, 20, endian)?,
            reference: read_u32(payload, 24, endian)?,
        })
    }
}
