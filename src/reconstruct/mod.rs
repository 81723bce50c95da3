//! C7: semantic reconstructor.
//!
//! For each raw main-record detection of a known kind, re-reads the record's data
//! area (decompressing if needed), walks its subrecord stream again, and builds a
//! typed [`ReconstructedEntity`] per the per-kind contract (spec §4.6).

mod placed;

use crate::binary::Endian;
use crate::config::ScanConfig;
use crate::diagnostics::DiagnosticLog;
use crate::entities::*;
use crate::model::{
    ActorBaseStats, Condition, DialogueResponseData, FormId, GameSettingValue, Heightmap,
    MainRecordHeader, MAIN_RECORD_HEADER_SIZE, MAX_DECOMPRESSED_SIZE,
};
use crate::registry::records::RecordKind;
use crate::result::{MainRecordDetection, RawScanResult};
use crate::structured::{iterate_subrecords, SubrecordSlice};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Reads `len` bytes starting at `offset` from whatever the scan's byte source was;
/// `None` signals the bytes are unavailable (short read, I/O failure already
/// reported elsewhere). Lets the reconstructor run uniformly over an in-memory ESM
/// buffer or a dump-scan [`crate::source::ByteSource`].
pub type ByteReader<'a> = dyn Fn(u64, usize) -> Option<Vec<u8>> + 'a;

/// Builds one reconstructed entity per known-kind main-record detection, then links
/// cells to their heightmap and contained placed references (spec §4.6, §9 "Cyclic
/// cell<->placed-reference graph").
pub fn reconstruct_all(
    read_bytes: &ByteReader,
    raw: &RawScanResult,
    config: &ScanConfig,
) -> Vec<ReconstructedEntity> {
    let mut entities = Vec::new();
    for detection in &raw.main_records {
        config.cancellation.check().ok();
        let Some(kind) = detection.kind else { continue };
        if matches!(kind, RecordKind::Tes4 | RecordKind::Group) {
            continue;
        }
        if let Some(entity) = reconstruct_one(read_bytes, detection, kind, raw) {
            if entity.is_plausible() {
                entities.push(entity);
            }
        }
    }
    link_cells(&mut entities, raw, read_bytes);
    entities
}

fn record_data(read_bytes: &ByteReader, header: &MainRecordHeader, offset: u64) -> Option<Vec<u8>> {
    let raw_data = read_bytes(offset + MAIN_RECORD_HEADER_SIZE as u64, header.data_size as usize)?;
    if header.is_compressed() && raw_data.len() > 4 {
        let expanded_size = crate::binary::read_u32(&raw_data, 0, header.endian)? as usize;
        if expanded_size > MAX_DECOMPRESSED_SIZE {
            return None;
        }
        let mut decoder = ZlibDecoder::new(&raw_data[4..]);
        let mut out = Vec::with_capacity(expanded_size.min(MAX_DECOMPRESSED_SIZE));
        decoder.read_to_end(&mut out).ok()?;
        Some(out)
    } else {
        Some(raw_data)
    }
}

fn reconstruct_one(
    read_bytes: &ByteReader,
    detection: &MainRecordDetection,
    kind: RecordKind,
    raw: &RawScanResult,
) -> Option<ReconstructedEntity> {
    let header = &detection.header;
    let data = record_data(read_bytes, header, detection.offset)?;
    let mut scratch = DiagnosticLog::new();
    let subs = iterate_subrecords(&data, header.endian, &mut scratch, detection.offset + MAIN_RECORD_HEADER_SIZE as u64);

    let mut editor_id = None;
    let mut display_name = None;
    for sub in &subs {
        match &sub.signature {
            b"EDID" => editor_id = Some(zstring(sub.payload)),
            b"FULL" => display_name = Some(zstring(sub.payload)),
            _ => {}
        }
    }

    let entity_header = EntityHeader {
        form_id: header.form_id,
        editor_id,
        display_name,
        endian: header.endian,
        offset: detection.offset,
    };

    let payload = build_payload(kind, &subs, header.endian, header.is_persistent_refr(), detection.offset, raw)?;

    Some(ReconstructedEntity { header: entity_header, payload })
}

fn zstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn find<'a>(subs: &'a [SubrecordSlice<'a>], sig: &[u8; 4]) -> Option<&'a SubrecordSlice<'a>> {
    subs.iter().find(|s| &s.signature == sig)
}

fn find_all<'a>(subs: &'a [SubrecordSlice<'a>], sig: &[u8; 4]) -> impl Iterator<Item = &'a SubrecordSlice<'a>> {
    subs.iter().filter(move |s| &s.signature == sig)
}

fn form_id_at(sub: &SubrecordSlice<'_>, endian: Endian) -> Option<FormId> {
    crate::binary::read_u32(sub.payload, 0, endian).map(FormId)
}

fn text_at(sub: &SubrecordSlice<'_>) -> String {
    zstring(sub.payload)
}

fn build_payload(
    kind: RecordKind,
    subs: &[SubrecordSlice<'_>],
    endian: Endian,
    is_persistent: bool,
    offset: u64,
    raw: &RawScanResult,
) -> Option<EntityPayload> {
    Some(match kind {
        RecordKind::Npc => EntityPayload::Npc(Npc { common: actor_common(subs, endian) }),
        RecordKind::Creature => EntityPayload::Creature(Creature { common: actor_common(subs, endian) }),
        RecordKind::Race => EntityPayload::Race(Race {
            description: find(subs, b"DESC").map(text_at),
        }),
        RecordKind::Faction => EntityPayload::Faction(Faction {
            ranks: find_all(subs, b"RNAM").map(text_at).collect(),
        }),
        RecordKind::Quest => EntityPayload::Quest(build_quest(subs, endian)),
        RecordKind::DialogTopic => EntityPayload::DialogTopic(DialogTopic {
            quest: find(subs, b"QNAM").and_then(|s| form_id_at(s, endian)),
        }),
        RecordKind::DialogueInfo => EntityPayload::DialogueInfo(build_dialogue_info(subs, endian)),
        RecordKind::Note => EntityPayload::Note(Note { text: find(subs, b"DESC").map(text_at) }),
        RecordKind::Book => EntityPayload::Book(Book {
            text: find(subs, b"DESC").map(text_at),
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
        }),
        RecordKind::Terminal => EntityPayload::Terminal(Terminal {
            text: find(subs, b"DESC").map(text_at),
        }),
        RecordKind::Weapon => EntityPayload::Weapon(build_weapon(subs, endian)),
        RecordKind::Armor => EntityPayload::Armor(Armor {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
            weight: find(subs, b"DATA").and_then(|s| crate::binary::read_f32(s.payload, 4, endian)),
            armor_rating: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 8, endian)),
        }),
        RecordKind::Ammo => EntityPayload::Ammo(Ammo {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 4, endian)),
            damage: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 8, endian)),
        }),
        RecordKind::Consumable => EntityPayload::Consumable(Consumable {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
            effects: find_all(subs, b"ENIT").filter_map(|s| form_id_at(s, endian)).collect(),
        }),
        RecordKind::MiscItem => EntityPayload::MiscItem(MiscItem {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
        }),
        RecordKind::Key => EntityPayload::Key(Key {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
        }),
        RecordKind::Container => EntityPayload::Container(Container {
            contents: find_all(subs, b"CNTO").filter_map(|s| inventory_item(s, endian)).collect(),
        }),
        RecordKind::Perk => EntityPayload::Perk(Perk {
            ranks: find_all(subs, b"PRKR").filter_map(|s| s.payload.first().map(|&b| b as i8)).collect(),
        }),
        RecordKind::Spell => EntityPayload::Spell(Spell {
            effects: find_all(subs, b"EFID").filter_map(|s| form_id_at(s, endian)).collect(),
        }),
        RecordKind::Cell => EntityPayload::Cell(build_cell(
            subs,
            endian,
            is_persistent,
            raw.cell_worldspace.get(&offset).copied(),
        )),
        RecordKind::Worldspace => EntityPayload::Worldspace(Worldspace {}),
        RecordKind::Global => EntityPayload::Global(Global {
            value: find(subs, b"FLTV").and_then(|s| crate::binary::read_f32(s.payload, 0, endian)),
        }),
        RecordKind::Enchantment => EntityPayload::Enchantment(Enchantment {
            effects: find_all(subs, b"EFID").filter_map(|s| form_id_at(s, endian)).collect(),
        }),
        RecordKind::BaseEffect => EntityPayload::BaseEffect(BaseEffect {
            school: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
        }),
        RecordKind::WeaponMod => EntityPayload::WeaponMod(WeaponMod {
            base_weapon: find(subs, b"MWD1").and_then(|s| form_id_at(s, endian)),
        }),
        RecordKind::Recipe => EntityPayload::Recipe(Recipe {
            ingredients: find_all(subs, b"CNTO").filter_map(|s| inventory_item(s, endian)).collect(),
            outputs: find(subs, b"CNAM")
                .and_then(|s| form_id_at(s, endian))
                .map(|item| vec![crate::entities::InventoryItem { item, count: 1 }])
                .unwrap_or_default(),
        }),
        RecordKind::Challenge => EntityPayload::Challenge(Challenge {
            value: find(subs, b"DATA").and_then(|s| crate::binary::read_i32(s.payload, 0, endian)),
        }),
        RecordKind::Reputation => EntityPayload::Reputation(Reputation {}),
        RecordKind::Projectile => EntityPayload::Projectile(Projectile {
            speed: find(subs, b"DATA").and_then(|s| crate::binary::read_f32(s.payload, 0, endian)),
        }),
        RecordKind::Explosion => EntityPayload::Explosion(Explosion {
            force: find(subs, b"DATA").and_then(|s| crate::binary::read_f32(s.payload, 0, endian)),
        }),
        RecordKind::Message => EntityPayload::Message(Message {
            text: find(subs, b"DESC").map(text_at),
        }),
        RecordKind::Class => EntityPayload::Class(Class {}),
        RecordKind::GameSetting => {
            let editor_id = find(subs, b"EDID").map(text_at);
            let value = find(subs, b"DATA").and_then(|s| GameSettingValue::decode(s.payload, endian));
            EntityPayload::GameSetting(GameSetting {
                value: match (value, editor_id) {
                    (Some(v), Some(eid)) => Some(v.retag(&eid)),
                    (v, _) => v,
                },
            })
        }
        RecordKind::Land => EntityPayload::Land(build_land(subs, endian)),
        RecordKind::PlacedObject | RecordKind::PlacedNpc | RecordKind::PlacedCreature => {
            EntityPayload::PlacedReference(placed::build_placed_reference(kind, is_persistent, subs, endian, raw))
        }
        RecordKind::Tes4 | RecordKind::Group => return None,
    })
}

fn inventory_item(sub: &SubrecordSlice<'_>, endian: Endian) -> Option<InventoryItem> {
    if sub.payload.len() < 8 {
        return None;
    }
    let item = FormId(crate::binary::read_u32(sub.payload, 0, endian)?);
    let count = crate::binary::read_i32(sub.payload, 4, endian)?;
    Some(InventoryItem { item, count })
}

fn actor_common(subs: &[SubrecordSlice<'_>], endian: Endian) -> ActorCommon {
    ActorCommon {
        stats: find(subs, b"ACBS").and_then(|s| ActorBaseStats::decode(s.payload, endian)),
        race: find(subs, b"RNAM").and_then(|s| form_id_at(s, endian)),
        class: find(subs, b"CNAM").and_then(|s| form_id_at(s, endian)),
        script: find(subs, b"SCRI").and_then(|s| form_id_at(s, endian)),
        voice_type: find(subs, b"VTCK").and_then(|s| form_id_at(s, endian)),
        template: find(subs, b"TPLT").and_then(|s| form_id_at(s, endian)),
        factions: find_all(subs, b"SNAM")
            .filter_map(|s| {
                if s.payload.len() < 5 {
                    return None;
                }
                let faction = FormId(crate::binary::read_u32(s.payload, 0, endian)?);
                let rank = s.payload[4] as i8;
                Some(FactionMembership { faction, rank })
            })
            .collect(),
        spells: find_all(subs, b"SPLO").filter_map(|s| form_id_at(s, endian)).collect(),
        inventory: find_all(subs, b"CNTO").filter_map(|s| inventory_item(s, endian)).collect(),
        packages: find_all(subs, b"PKID").filter_map(|s| form_id_at(s, endian)).collect(),
    }
}

fn build_weapon(subs: &[SubrecordSlice<'_>], endian: Endian) -> Weapon {
    let data = find(subs, b"DATA").and_then(|s| {
        if s.payload.len() < 15 {
            return None;
        }
        Some(WeaponDataBlock {
            value: crate::binary::read_i32(s.payload, 0, endian)?,
            health: crate::binary::read_i32(s.payload, 4, endian)?,
            weight: crate::binary::read_f32(s.payload, 8, endian)?,
            damage: crate::binary::read_u16(s.payload, 12, endian)?,
            clip_size: *s.payload.get(14)?,
        })
    });
    let dnam = find(subs, b"DNAM").and_then(|s| {
        if s.payload.len() < 204 {
            return None;
        }
        Some(WeaponDnam {
            animation_type: *s.payload.get(0)?,
            speed: crate::binary::read_f32(s.payload, 40, endian)?,
            reach: crate::binary::read_f32(s.payload, 44, endian)?,
            ammo_per_shot: crate::binary::read_i32(s.payload, 72, endian)?,
            min_spread: crate::binary::read_f32(s.payload, 8, endian)?,
            spread: crate::binary::read_f32(s.payload, 12, endian)?,
            range: crate::binary::read_f32(s.payload, 88, endian)?,
            shots_per_second: crate::binary::read_f32(s.payload, 112, endian)?,
            action_point_cost: crate::binary::read_f32(s.payload, 116, endian)?,
            strength_requirement: crate::binary::read_u32(s.payload, 100, endian)?,
            skill_requirement: crate::binary::read_u16(s.payload, 192, endian)?,
        })
    });
    let critical = find(subs, b"CRDT").and_then(|s| {
        if s.payload.len() < 16 {
            return None;
        }
        Some(WeaponCritical {
            damage: crate::binary::read_u16(s.payload, 0, endian)?,
            chance_multiplier: crate::binary::read_f32(s.payload, 4, endian)?,
            effect: FormId(crate::binary::read_u32(s.payload, 8, endian)?),
        })
    });
    Weapon {
        model: find(subs, b"MODL").map(text_at),
        data,
        dnam,
        critical,
        projectile: find(subs, b"PROJ").and_then(|s| form_id_at(s, endian)),
        ammo: find(subs, b"AMMO").and_then(|s| form_id_at(s, endian)),
    }
}

fn build_quest(subs: &[SubrecordSlice<'_>], endian: Endian) -> Quest {
    let flags = find(subs, b"DATA").and_then(|s| crate::binary::read_u16(s.payload, 0, endian));
    let priority = find(subs, b"DATA").and_then(|s| s.payload.get(2).copied());
    let script = find(subs, b"SCRI").and_then(|s| form_id_at(s, endian));

    let mut stages: Vec<QuestStage> = Vec::new();
    let mut current_index: Option<u16> = None;
    let mut current_flags: Option<u8> = None;
    for sub in subs {
        match &sub.signature {
            b"INDX" => current_index = crate::binary::read_u16(sub.payload, 0, endian),
            b"QSDT" => current_flags = sub.payload.first().copied(),
            b"CNAM" => {
                if let Some(index) = current_index {
                    stages.push(QuestStage {
                        index,
                        flags: current_flags,
                        log_text: Some(text_at(sub)),
                    });
                }
            }
            _ => {}
        }
    }

    let mut objectives: Vec<QuestObjective> = Vec::new();
    let mut current_obj_index: Option<i32> = None;
    for sub in subs {
        match &sub.signature {
            b"QOBJ" => current_obj_index = crate::binary::read_i32(sub.payload, 0, endian),
            b"NNAM" => {
                if let Some(index) = current_obj_index {
                    objectives.push(QuestObjective { index, text: Some(text_at(sub)) });
                }
            }
            _ => {}
        }
    }

    Quest { flags, priority, script, stages, objectives }
}

fn build_dialogue_info(subs: &[SubrecordSlice<'_>], endian: Endian) -> DialogueInfo {
    let mut responses = Vec::new();
    let mut pending_text: Option<String> = None;
    for sub in subs {
        match &sub.signature {
            b"NAM1" => pending_text = Some(text_at(sub)),
            b"TRDT" => {
                if let Some(text) = pending_text.take() {
                    let data = DialogueResponseData::decode(sub.payload, endian);
                    responses.push(DialogueResponse { text, data });
                }
            }
            _ => {}
        }
    }
    let conditions: Vec<Condition> = find_all(subs, b"CTDA")
        .filter_map(|s| Condition::decode(s.payload, endian))
        .collect();

    DialogueInfo {
        topic: find(subs, b"QSTI").and_then(|s| form_id_at(s, endian)),
        quest: find(subs, b"QNAM").and_then(|s| form_id_at(s, endian)),
        speaker: find(subs, b"ANAM").and_then(|s| form_id_at(s, endian)),
        previous_info: find(subs, b"PNAM").and_then(|s| form_id_at(s, endian)),
        responses,
        conditions,
    }
}

fn build_cell(subs: &[SubrecordSlice<'_>], endian: Endian, is_persistent: bool, worldspace: Option<FormId>) -> Cell {
    Cell {
        is_persistent,
        worldspace,
        grid: find(subs, b"XCLC").and_then(|s| crate::model::CellGrid::decode(s.payload, endian)),
        heightmap: None,
        placed_references: Vec::new(),
    }
}

fn build_land(subs: &[SubrecordSlice<'_>], endian: Endian) -> Land {
    let heightmap = find(subs, b"VHGT").and_then(|s| Heightmap::decode(s.payload, endian));
    let mut texture_layers = Vec::new();
    for sub in find_all(subs, b"ATXT") {
        if sub.payload.len() >= 8 {
            if let Some(form_id) = crate::binary::read_u32(sub.payload, 0, endian) {
                let layer = sub.payload.get(6).copied().unwrap_or(0);
                texture_layers.push((layer, FormId(form_id)));
            }
        }
    }
    Land { heightmap, texture_layers }
}

/// Post-processing pass: attaches each cell's heightmap (nearest `LAND` record
/// within ~500 bytes after its `XCLC`) and the placed references whose byte offset
/// falls between this cell and the next (spec §4.6, §9).
fn link_cells(entities: &mut [ReconstructedEntity], raw: &RawScanResult, read_bytes: &ByteReader) {
    let mut cell_offsets: Vec<u64> = entities
        .iter()
        .filter(|e| matches!(e.payload, EntityPayload::Cell(_)))
        .map(|e| e.header.offset)
        .collect();
    cell_offsets.sort_unstable();

    let mut placed_offsets: Vec<u64> = raw.placed_object_records.clone();
    placed_offsets.sort_unstable();

    for entity in entities.iter_mut() {
        let cell_offset = entity.header.offset;
        let EntityPayload::Cell(cell) = &mut entity.payload else { continue };

        let next_offset = cell_offsets
            .iter()
            .copied()
            .find(|&o| o > cell_offset)
            .unwrap_or(u64::MAX);
        cell.placed_references = placed_offsets
            .iter()
            .copied()
            .filter(|&o| o > cell_offset && o < next_offset)
            .collect();

        if cell.grid.is_some() {
            if let Some(&land_offset) = raw
                .land_records
                .iter()
                .find(|&&o| o >= cell_offset && o <= cell_offset + 500)
            {
                cell.heightmap = decode_land_heightmap(land_offset, raw, read_bytes);
            }
        }
    }
}

fn decode_land_heightmap(land_offset: u64, raw: &RawScanResult, read_bytes: &ByteReader) -> Option<Heightmap> {
    let detection = raw.main_records.iter().find(|d| d.offset == land_offset)?;
    let data = record_data(read_bytes, &detection.header, land_offset)?;
    let mut scratch = DiagnosticLog::new();
    let subs = iterate_subrecords(&data, detection.header.endian, &mut scratch, land_offset + MAIN_RECORD_HEADER_SIZE as u64);
    find(&subs, b"VHGT").and_then(|s| Heightmap::decode(s.payload, detection.header.endian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::result::RawScanResult;

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

    #[test]
    fn reconstructs_simple_note() {
        let data = le_sub(b"DESC", b"Hello\0");
        let record = le_record(b"NOTE", 0x0100_0002, &data);
        let mut raw = RawScanResult::new();
        let header = MainRecordHeader::parse(&record, 0, Endian::Little).unwrap();
        raw.add_main_record(MainRecordDetection {
            offset: 0,
            header,
            kind: Some(RecordKind::Note),
        });
        let read = |offset: u64, len: usize| record.get(offset as usize..offset as usize + len).map(|s| s.to_vec());
        let config = ScanConfig::new();
        let entities = reconstruct_all(&read, &raw, &config);
        assert_eq!(entities.len(), 1);
        match &entities[0].payload {
            EntityPayload::Note(n) => assert_eq!(n.text.as_deref(), Some("Hello")),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
