//! C8: aggregate result, and the raw-detection accumulator (spec §3 "Raw scan
//! result") both the structured parser and the dump scanner feed.

use crate::binary::Endian;
use crate::entities::ReconstructedEntity;
use crate::model::{
    ActorBaseStats, CellGrid, Condition, DialogueResponseData, FormId, GameSettingValue, Heightmap,
    MainRecordHeader,
};
use crate::registry::records::RecordKind;
use std::collections::{HashMap, HashSet};

/// A confirmed main-record detection, deduplicated by byte offset (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct MainRecordDetection {
    pub offset: u64,
    pub header: MainRecordHeader,
    pub kind: Option<RecordKind>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorIdEntry {
    pub offset: u64,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GameSettingEntry {
    pub offset: u64,
    pub value: GameSettingValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptTextEntry {
    pub offset: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormIdRefEntry {
    pub offset: u64,
    pub form_id: FormId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NameEntry {
    pub offset: u64,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionEntry {
    pub offset: u64,
    pub pose: [f32; 6],
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorBaseStatsEntry {
    pub offset: u64,
    pub stats: ActorBaseStats,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueResponseTextEntry {
    pub offset: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueResponseDataEntry {
    pub offset: u64,
    pub data: DialogueResponseData,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenericTextEntry {
    pub offset: u64,
    pub signature: [u8; 4],
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenericPathEntry {
    pub offset: u64,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionEntry {
    pub offset: u64,
    pub condition: Condition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeightmapEntry {
    pub offset: u64,
    pub heightmap: Heightmap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CellGridEntry {
    pub offset: u64,
    pub grid: CellGrid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenericSubrecordEntry {
    pub offset: u64,
    pub signature: [u8; 4],
    pub raw: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssetPathEntry {
    pub offset: u64,
    pub path: String,
}

/// An editor-id <-> form-id association recovered by the runtime hash-table walker
/// (spec §4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeEditorIdEntry {
    pub editor_id: String,
    pub form_id: FormId,
    pub form_type: u8,
    pub display_name: Option<String>,
    pub dialogue_text: Option<String>,
    pub key_file_offset: u64,
    pub value_file_offset: u64,
}

/// Global form-id -> editor-id table (spec §3 "Lifecycle"). First writer wins: later
/// writes never overwrite an existing non-absent value.
#[derive(Clone, Debug, Default)]
pub struct FormEditorIdMap {
    entries: HashMap<u32, String>,
}

impl FormEditorIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_if_absent(&mut self, form_id: FormId, editor_id: impl Into<String>) {
        if form_id.is_sentinel() {
            return;
        }
        self.entries.entry(form_id.0).or_insert_with(|| editor_id.into());
    }

    pub fn get(&self, form_id: FormId) -> Option<&str> {
        self.entries.get(&form_id.0).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormId, &str)> {
        self.entries.iter().map(|(&id, name)| (FormId(id), name.as_str()))
    }
}

/// Deduplicated accumulator a single scan writes into (spec §3 "Raw scan result").
/// Owned exclusively by the driving scan (spec §5); never shared across scans.
#[derive(Debug, Default)]
pub struct RawScanResult {
    pub main_records: Vec<MainRecordDetection>,
    seen_offsets: HashSet<u64>,

    pub editor_ids: Vec<EditorIdEntry>,
    seen_editor_ids: HashSet<String>,

    pub game_settings: Vec<GameSettingEntry>,
    pub script_texts: Vec<ScriptTextEntry>,
    pub form_id_refs: Vec<FormIdRefEntry>,
    seen_form_id_refs: HashSet<u32>,
    pub names: Vec<NameEntry>,
    pub positions: Vec<PositionEntry>,
    pub actor_base_stats: Vec<ActorBaseStatsEntry>,
    pub dialogue_response_texts: Vec<DialogueResponseTextEntry>,
    pub dialogue_response_data: Vec<DialogueResponseDataEntry>,
    pub generic_texts: Vec<GenericTextEntry>,
    pub generic_paths: Vec<GenericPathEntry>,
    pub generic_form_id_refs: Vec<FormIdRefEntry>,
    pub conditions: Vec<ConditionEntry>,
    pub heightmaps: Vec<HeightmapEntry>,
    pub cell_grids: Vec<CellGridEntry>,
    pub generic_subrecords: Vec<GenericSubrecordEntry>,
    pub land_records: Vec<u64>,
    pub placed_object_records: Vec<u64>,
    pub asset_paths: Vec<AssetPathEntry>,
    pub runtime_editor_ids: Vec<RuntimeEditorIdEntry>,

    /// Maps a `CELL` record's own byte offset to the form id of the `WRLD` whose
    /// world-children group contains it, keyed during the group-recursion walk
    /// (spec §3 "Cell"). Absent for interior cells, which have no worldspace.
    pub cell_worldspace: HashMap<u64, FormId>,

    pub form_editor_ids: FormEditorIdMap,
    pub diagnostics: crate::diagnostics::DiagnosticLog,
}

impl RawScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a main-record detection, deduplicated by byte offset (spec §3).
    /// Returns `true` if this was a new detection.
    pub fn add_main_record(&mut self, detection: MainRecordDetection) -> bool {
        if !self.seen_offsets.insert(detection.offset) {
            return false;
        }
        self.main_records.push(detection);
        true
    }

    pub fn has_main_record_at(&self, offset: u64) -> bool {
        self.seen_offsets.contains(&offset)
    }

    /// Adds an editor-id entry, deduplicated by string value (spec §3).
    pub fn add_editor_id(&mut self, entry: EditorIdEntry) -> bool {
        if !self.seen_editor_ids.insert(entry.value.clone()) {
            return false;
        }
        self.editor_ids.push(entry);
        true
    }

    /// Adds a form-id reference, deduplicated by form id value (spec §3).
    pub fn add_form_id_ref(&mut self, entry: FormIdRefEntry) -> bool {
        if !self.seen_form_id_refs.insert(entry.form_id.0) {
            return false;
        }
        self.form_id_refs.push(entry);
        true
    }
}

/// Per-record-kind and per-endian histograms, the derived counts spec §4.7 names.
#[derive(Clone, Debug, Default)]
pub struct DerivedCounts {
    pub by_kind: HashMap<RecordKind, u64>,
    pub by_endian: HashMap<Endian, u64>,
    pub main_record_total: u64,
    pub reconstructed_entity_total: u64,
}

impl DerivedCounts {
    fn compute(main_records: &[MainRecordDetection], entities: &[ReconstructedEntity]) -> Self {
        let mut by_kind = HashMap::new();
        let mut by_endian = HashMap::new();
        for rec in main_records {
            if let Some(kind) = rec.kind {
                *by_kind.entry(kind).or_insert(0u64) += 1;
            }
            *by_endian.entry(rec.header.endian).or_insert(0u64) += 1;
        }
        DerivedCounts {
            by_kind,
            by_endian,
            main_record_total: main_records.len() as u64,
            reconstructed_entity_total: entities.len() as u64,
        }
    }
}

/// Read-only aggregate result a scan produces (spec §4.7). The core never exposes
/// mutation after the single pass completes.
#[derive(Debug)]
pub struct AggregateResult {
    raw: RawScanResult,
    entities: Vec<ReconstructedEntity>,
    counts: DerivedCounts,
}

impl AggregateResult {
    pub fn new(raw: RawScanResult, entities: Vec<ReconstructedEntity>) -> Self {
        let counts = DerivedCounts::compute(&raw.main_records, &entities);
        AggregateResult {
            raw,
            entities,
            counts,
        }
    }

    pub fn raw(&self) -> &RawScanResult {
        &self.raw
    }

    pub fn entities(&self) -> &[ReconstructedEntity] {
        &self.entities
    }

    pub fn counts(&self) -> &DerivedCounts {
        &self.counts
    }

    pub fn diagnostics(&self) -> &crate::diagnostics::DiagnosticLog {
        &self.raw.diagnostics
    }
}
