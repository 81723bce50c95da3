//! C2: record-type registry.
//!
//! A process-wide immutable table (spec §4.2), built once behind a `LazyLock` rather
//! than kept as a mutable global - the re-architecture spec §9 calls for.

use crate::binary::{canonical_signature, reverse_signature, Endian};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Every main-record kind this crate knows how to reconstruct (spec §3 "Reconstructed
/// entity") plus the two framing kinds (`TES4`, `GRUP`) that are never reconstructed
/// but must still be recognised during structured parsing and dump scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Tes4,
    Group,
    Npc,
    Creature,
    Race,
    Faction,
    Quest,
    DialogTopic,
    DialogueInfo,
    Note,
    Book,
    Terminal,
    Weapon,
    Armor,
    Ammo,
    Consumable,
    MiscItem,
    Key,
    Container,
    Perk,
    Spell,
    Cell,
    Worldspace,
    Global,
    Enchantment,
    BaseEffect,
    WeaponMod,
    Recipe,
    Challenge,
    Reputation,
    Projectile,
    Explosion,
    Message,
    Class,
    GameSetting,
    Land,
    PlacedObject,
    PlacedNpc,
    PlacedCreature,
}

impl RecordKind {
    /// Canonical (little-endian spelling) four-character signature for this kind.
    pub fn signature(self) -> [u8; 4] {
        match self {
            RecordKind::Tes4 => *b"TES4",
            RecordKind::Group => *b"GRUP",
            RecordKind::Npc => *b"NPC_",
            RecordKind::Creature => *b"CREA",
            RecordKind::Race => *b"RACE",
            RecordKind::Faction => *b"FACT",
            RecordKind::Quest => *b"QUST",
            RecordKind::DialogTopic => *b"DIAL",
            RecordKind::DialogueInfo => *b"INFO",
            RecordKind::Note => *b"NOTE",
            RecordKind::Book => *b"BOOK",
            RecordKind::Terminal => *b"TERM",
            RecordKind::Weapon => *b"WEAP",
            RecordKind::Armor => *b"ARMO",
            RecordKind::Ammo => *b"AMMO",
            RecordKind::Consumable => *b"ALCH",
            RecordKind::MiscItem => *b"MISC",
            RecordKind::Key => *b"KEYM",
            RecordKind::Container => *b"CONT",
            RecordKind::Perk => *b"PERK",
            RecordKind::Spell => *b"SPEL",
            RecordKind::Cell => *b"CELL",
            RecordKind::Worldspace => *b"WRLD",
            RecordKind::Global => *b"GLOB",
            RecordKind::Enchantment => *b"ENCH",
            RecordKind::BaseEffect => *b"MGEF",
            RecordKind::WeaponMod => *b"IMOD",
            RecordKind::Recipe => *b"COBJ",
            RecordKind::Challenge => *b"CHAL",
            RecordKind::Reputation => *b"REPU",
            RecordKind::Projectile => *b"PROJ",
            RecordKind::Explosion => *b"EXPL",
            RecordKind::Message => *b"MESG",
            RecordKind::Class => *b"CLAS",
            RecordKind::GameSetting => *b"GMST",
            RecordKind::Land => *b"LAND",
            RecordKind::PlacedObject => *b"REFR",
            RecordKind::PlacedNpc => *b"ACHR",
            RecordKind::PlacedCreature => *b"ACRE",
        }
    }

    pub fn is_placed_reference(self) -> bool {
        matches!(
            self,
            RecordKind::PlacedObject | RecordKind::PlacedNpc | RecordKind::PlacedCreature
        )
    }

    fn all() -> &'static [RecordKind] {
        use RecordKind::*;
        &[
            Tes4, Group, Npc, Creature, Race, Faction, Quest, DialogTopic, DialogueInfo, Note,
            Book, Terminal, Weapon, Armor, Ammo, Consumable, MiscItem, Key, Container, Perk,
            Spell, Cell, Worldspace, Global, Enchantment, BaseEffect, WeaponMod, Recipe,
            Challenge, Reputation, Projectile, Explosion, Message, Class, GameSetting, Land,
            PlacedObject, PlacedNpc, PlacedCreature,
        ]
    }
}

struct RecordRegistry {
    by_canonical: HashMap<[u8; 4], RecordKind>,
    by_reversed: HashMap<[u8; 4], RecordKind>,
}

static REGISTRY: LazyLock<RecordRegistry> = LazyLock::new(|| {
    let mut by_canonical = HashMap::new();
    let mut by_reversed = HashMap::new();
    for &kind in RecordKind::all() {
        let sig = kind.signature();
        by_canonical.insert(sig, kind);
        by_reversed.insert(reverse_signature(sig), kind);
    }
    RecordRegistry {
        by_canonical,
        by_reversed,
    }
});

/// Is `signature` (in its on-disk byte order for `endian`) a known record kind?
pub fn is_known_record_kind(signature: [u8; 4], endian: Endian) -> bool {
    lookup(signature, endian).is_some()
}

/// Resolve an on-disk signature (in `endian`'s byte order) to its [`RecordKind`].
pub fn lookup(signature: [u8; 4], endian: Endian) -> Option<RecordKind> {
    match endian {
        Endian::Little => REGISTRY.by_canonical.get(&signature).copied(),
        Endian::Big => REGISTRY.by_reversed.get(&signature).copied(),
    }
}

/// Canonical spelling of an on-disk signature, regardless of whether it is a known
/// record kind (spec §4.2 (b)).
pub fn canonicalize(signature: [u8; 4], endian: Endian) -> [u8; 4] {
    canonical_signature(signature, endian)
}

/// Resolve a canonical (already-normalised) signature directly, independent of endian.
pub fn lookup_canonical(signature: [u8; 4]) -> Option<RecordKind> {
    REGISTRY.by_canonical.get(&signature).copied()
}
