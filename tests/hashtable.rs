//! Black-box test for the runtime hash-table walker (C6) through the public
//! `recover_runtime_hash_table` entry point: a hand-built minimal PE image (DOS
//! header, COFF header, one writable section) containing a candidate triple, a
//! 64-bucket array with three populated chains, and named NPC value objects
//! (spec §4.5, §8).

use esm_scan::config::ScanConfig;
use esm_scan::model::FormId;
use esm_scan::recover_runtime_hash_table;
use esm_scan::source::{CapturedRegion, InMemorySource, ModuleInfo, VirtualAddressResolver};

const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;
const NPC_FORM_TYPE: u8 = 43;

// `find_candidates` only trusts a middle value inside this range as a bucket count
// (src/hashtable/mod.rs), and `validate_candidate` requires at least 3 sampled
// buckets to resolve to a plausible editor id before the whole table is trusted.
const HASH_SIZE: u32 = 64;

const TRIPLE_OFFSET: usize = 0x100;
const BUCKET_ARRAY_OFFSET: usize = 0x200;
const SECTION_FILE_OFFSET: usize = 0x100;
const SECTION_SIZE: usize = 0x500;
const IMAGE_SIZE: usize = SECTION_FILE_OFFSET + SECTION_SIZE;

struct FlatResolver {
    region: CapturedRegion,
}

impl VirtualAddressResolver for FlatResolver {
    fn regions(&self) -> &[CapturedRegion] {
        std::slice::from_ref(&self.region)
    }

    fn locate_module(&self) -> Option<ModuleInfo> {
        Some(ModuleInfo { base_va: 0, size: self.region.size, image_name: "test.exe".into() })
    }
}

fn be_u32(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
}

/// One bucket's worth of fixture data: a chain item plus its key string and value
/// object, all addressed (VA == file offset under the identity-mapped resolver
/// below) relative to a caller-chosen base.
fn write_chain(image: &mut [u8], item_offset: usize, key_offset: usize, value_offset: usize, name: &[u8], form_id: u32) {
    be_u32(image, item_offset, 0); // next
    be_u32(image, item_offset + 4, key_offset as u32);
    be_u32(image, item_offset + 8, value_offset as u32);
    image[key_offset..key_offset + name.len()].copy_from_slice(name);
    image[value_offset + 4] = NPC_FORM_TYPE;
    be_u32(image, value_offset + 12, form_id);
}

/// Builds a minimal PE image: DOS header through a single-section table entry,
/// then the section's byte content at the offset named by that entry.
fn build_image() -> Vec<u8> {
    const DOS_HEADER_SIZE: usize = 0x40;
    const E_LFANEW_OFFSET: usize = 0x3C;
    const COFF_HEADER_SIZE: usize = 20;
    const SECTION_ENTRY_SIZE: usize = 40;

    let mut image = vec![0u8; IMAGE_SIZE];
    image[0..2].copy_from_slice(b"MZ");
    let pe_offset = DOS_HEADER_SIZE;
    image[E_LFANEW_OFFSET..E_LFANEW_OFFSET + 4].copy_from_slice(&(pe_offset as u32).to_le_bytes());
    image[pe_offset..pe_offset + 4].copy_from_slice(b"PE\0\0");

    let coff = pe_offset + 4;
    image[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes()); // number_of_sections
    image[coff + 16..coff + 18].copy_from_slice(&0u16.to_le_bytes()); // size_of_optional_header

    let entry = coff + COFF_HEADER_SIZE;
    image[entry + 8..entry + 12].copy_from_slice(&(SECTION_SIZE as u32).to_le_bytes()); // virtual_size
    image[entry + 12..entry + 16].copy_from_slice(&(SECTION_FILE_OFFSET as u32).to_le_bytes()); // virtual_address
    image[entry + 36..entry + 40]
        .copy_from_slice(&(IMAGE_SCN_MEM_WRITE | IMAGE_SCN_CNT_INITIALIZED_DATA).to_le_bytes());
    assert!(entry + SECTION_ENTRY_SIZE <= SECTION_FILE_OFFSET, "section table must not overlap section data");

    // Candidate triple at the very start of the section: {vfptr, hash_size, bucket_array_ptr}.
    be_u32(&mut image, TRIPLE_OFFSET, TRIPLE_OFFSET as u32);
    be_u32(&mut image, TRIPLE_OFFSET + 4, HASH_SIZE);
    be_u32(&mut image, TRIPLE_OFFSET + 8, BUCKET_ARRAY_OFFSET as u32);

    // Populate the first three of the 64 buckets; the rest are left null.
    be_u32(&mut image, BUCKET_ARRAY_OFFSET, 0x300);
    be_u32(&mut image, BUCKET_ARRAY_OFFSET + 4, 0x320);
    be_u32(&mut image, BUCKET_ARRAY_OFFSET + 8, 0x340);

    write_chain(&mut image, 0x300, 0x380, 0x3A0, b"Npc0\0", 0x0100_0001);
    write_chain(&mut image, 0x320, 0x388, 0x3C0, b"Npc1\0", 0x0100_0002);
    write_chain(&mut image, 0x340, 0x390, 0x3E0, b"Npc2\0", 0x0100_0003);

    image
}

#[test]
fn recovers_named_npc_entries_from_a_minimal_module_image() {
    let image = build_image();
    let region = CapturedRegion { virtual_address: 0, size: image.len() as u64, file_offset: 0, writable: true };
    let resolver = FlatResolver { region };
    let source = InMemorySource::new(&image);
    let config = ScanConfig::default();

    let mut entries = recover_runtime_hash_table(&source, &resolver, &config).unwrap();
    entries.sort_by_key(|e| e.form_id);

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].editor_id, "Npc0");
    assert_eq!(entries[0].form_id, FormId(0x0100_0001));
    assert_eq!(entries[0].form_type, NPC_FORM_TYPE);
    assert_eq!(entries[1].editor_id, "Npc1");
    assert_eq!(entries[2].editor_id, "Npc2");
}

#[test]
fn missing_module_is_a_fatal_error() {
    struct NoModuleResolver;
    impl VirtualAddressResolver for NoModuleResolver {
        fn regions(&self) -> &[CapturedRegion] {
            &[]
        }
        fn locate_module(&self) -> Option<ModuleInfo> {
            None
        }
    }

    let image = vec![0u8; 16];
    let source = InMemorySource::new(&image);
    let config = ScanConfig::default();
    let result = recover_runtime_hash_table(&source, &NoModuleResolver, &config);
    assert!(matches!(result, Err(esm_scan::error::ScanError::ModuleNotFound)));
}
