//! Reconstructed domain entities (spec §3 "Reconstructed entity"), one variant per
//! known kind. Built once per confirmed main record by the semantic reconstructor
//! (C7) and logically immutable afterwards (spec §3 "Lifecycle").

use crate::binary::Endian;
use crate::model::{ActorBaseStats, Condition, DialogueResponseData, FormId, GameSettingValue, Heightmap};

/// Fields every reconstructed entity carries regardless of kind.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityHeader {
    pub form_id: FormId,
    pub editor_id: Option<String>,
    pub display_name: Option<String>,
    pub endian: Endian,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FactionMembership {
    pub faction: FormId,
    pub rank: i8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InventoryItem {
    pub item: FormId,
    pub count: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorCommon {
    pub stats: Option<ActorBaseStats>,
    pub race: Option<FormId>,
    pub class: Option<FormId>,
    pub script: Option<FormId>,
    pub voice_type: Option<FormId>,
    pub template: Option<FormId>,
    pub factions: Vec<FactionMembership>,
    pub spells: Vec<FormId>,
    pub inventory: Vec<InventoryItem>,
    pub packages: Vec<FormId>,
}

impl Default for ActorCommon {
    fn default() -> Self {
        ActorCommon {
            stats: None,
            race: None,
            class: None,
            script: None,
            voice_type: None,
            template: None,
            factions: Vec::new(),
            spells: Vec::new(),
            inventory: Vec::new(),
            packages: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Npc {
    pub common: ActorCommon,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Creature {
    pub common: ActorCommon,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Race {
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Faction {
    pub ranks: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuestStage {
    pub index: u16,
    pub flags: Option<u8>,
    pub log_text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuestObjective {
    pub index: i32,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quest {
    pub flags: Option<u16>,
    pub priority: Option<u8>,
    pub script: Option<FormId>,
    pub stages: Vec<QuestStage>,
    pub objectives: Vec<QuestObjective>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DialogTopic {
    pub quest: Option<FormId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DialogueResponse {
    pub text: String,
    pub data: Option<DialogueResponseData>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DialogueInfo {
    pub topic: Option<FormId>,
    pub quest: Option<FormId>,
    pub speaker: Option<FormId>,
    pub previous_info: Option<FormId>,
    pub responses: Vec<DialogueResponse>,
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Note {
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Book {
    pub text: Option<String>,
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Terminal {
    pub text: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeaponDataBlock {
    pub value: i32,
    pub health: i32,
    pub weight: f32,
    pub damage: u16,
    pub clip_size: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeaponDnam {
    pub animation_type: u8,
    pub speed: f32,
    pub reach: f32,
    pub ammo_per_shot: i32,
    pub min_spread: f32,
    pub spread: f32,
    pub range: f32,
    pub shots_per_second: f32,
    pub action_point_cost: f32,
    pub strength_requirement: u32,
    pub skill_requirement: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeaponCritical {
    pub damage: u16,
    pub chance_multiplier: f32,
    pub effect: FormId,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Weapon {
    pub model: Option<String>,
    pub data: Option<WeaponDataBlock>,
    pub dnam: Option<WeaponDnam>,
    pub critical: Option<WeaponCritical>,
    pub projectile: Option<FormId>,
    pub ammo: Option<FormId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Armor {
    pub value: Option<i32>,
    pub weight: Option<f32>,
    pub armor_rating: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ammo {
    pub damage: Option<i32>,
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Consumable {
    pub value: Option<i32>,
    pub effects: Vec<FormId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MiscItem {
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Key {
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    pub contents: Vec<InventoryItem>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Perk {
    pub ranks: Vec<i8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spell {
    pub effects: Vec<FormId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub is_persistent: bool,
    pub worldspace: Option<FormId>,
    pub grid: Option<crate::model::CellGrid>,
    pub heightmap: Option<Heightmap>,
    pub placed_references: Vec<u64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Worldspace {}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Global {
    pub value: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Enchantment {
    pub effects: Vec<FormId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseEffect {
    pub school: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeaponMod {
    pub base_weapon: Option<FormId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recipe {
    pub ingredients: Vec<InventoryItem>,
    pub outputs: Vec<InventoryItem>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Challenge {
    pub value: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reputation {}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Projectile {
    pub speed: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Explosion {
    pub force: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Class {}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameSetting {
    pub value: Option<GameSettingValue>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Land {
    pub heightmap: Option<Heightmap>,
    pub texture_layers: Vec<(u8, FormId)>,
}

/// Placed reference (`REFR`/`ACHR`/`ACRE`) - spec §3 "Placed reference".
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedReference {
    pub kind: crate::registry::records::RecordKind,
    pub is_persistent: bool,
    pub base_form_id: Option<FormId>,
    pub base_editor_id: Option<String>,
    pub position: Option<[f32; 6]>,
    pub scale: f32,
    pub owner: Option<FormId>,
    pub enable_parent: Option<FormId>,
    pub map_marker_type: Option<u16>,
    pub map_marker_name: Option<String>,
}

impl Default for PlacedReference {
    fn default() -> Self {
        PlacedReference {
            kind: crate::registry::records::RecordKind::PlacedObject,
            is_persistent: false,
            base_form_id: None,
            base_editor_id: None,
            position: None,
            scale: 1.0,
            owner: None,
            enable_parent: None,
            map_marker_type: None,
            map_marker_name: None,
        }
    }
}

impl PlacedReference {
    pub fn is_plausible(&self) -> bool {
        const SCALE_MIN: f32 = 0.001;
        const SCALE_MAX: f32 = 1000.0;
        if !(SCALE_MIN..=SCALE_MAX).contains(&self.scale) {
            return false;
        }
        match self.position {
            Some(pos) => crate::registry::subrecords::validate_position(&pos),
            None => true,
        }
    }
}

/// One variant per known reconstructed kind (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub enum EntityPayload {
    Npc(Npc),
    Creature(Creature),
    Race(Race),
    Faction(Faction),
    Quest(Quest),
    DialogTopic(DialogTopic),
    DialogueInfo(DialogueInfo),
    Note(Note),
    Book(Book),
    Terminal(Terminal),
    Weapon(Weapon),
    Armor(Armor),
    Ammo(Ammo),
    Consumable(Consumable),
    MiscItem(MiscItem),
    Key(Key),
    Container(Container),
    Perk(Perk),
    Spell(Spell),
    Cell(Cell),
    Worldspace(Worldspace),
    Global(Global),
    Enchantment(Enchantment),
    BaseEffect(BaseEffect),
    WeaponMod(WeaponMod),
    Recipe(Recipe),
    Challenge(Challenge),
    Reputation(Reputation),
    Projectile(Projectile),
    Explosion(Explosion),
    Message(Message),
    Class(Class),
    GameSetting(GameSetting),
    Land(Land),
    PlacedReference(PlacedReference),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructedEntity {
    pub header: EntityHeader,
    pub payload: EntityPayload,
}

impl ReconstructedEntity {
    pub fn is_plausible(&self) -> bool {
        if self.header.form_id.is_sentinel() {
            return false;
        }
        match &self.payload {
            EntityPayload::PlacedReference(p) => p.is_plausible(),
            _ => true,
        }
    }
}
