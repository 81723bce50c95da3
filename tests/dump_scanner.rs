//! Black-box tests for the unstructured dump scanner (C5) via the public
//! `scan_dump` entry point (spec §8 S3, S4, S6, S7).

use esm_scan::config::ScanConfig;
use esm_scan::scan_dump;
use esm_scan::source::InMemorySource;

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
fn s4_false_positive_ascii_is_never_reported() {
    let mut bytes = b"VGT_DEBUG_".to_vec();
    bytes.extend_from_slice(&[0u8; 22]);
    let source = InMemorySource::new(&bytes);
    let config = ScanConfig::default();
    let result = scan_dump(&source, &config).unwrap();
    assert_eq!(result.counts().main_record_total, 0);
}

#[test]
fn s3_form_id_colliding_with_ascii_text_is_rejected() {
    let form_id = u32::from_le_bytes(*b"PACK");
    let data = le_sub(b"EDID", b"Whatever\0");
    let record = le_record(b"NPC_", form_id, &data);
    let source = InMemorySource::new(&record);
    let config = ScanConfig::default();
    let result = scan_dump(&source, &config).unwrap();
    assert_eq!(result.counts().main_record_total, 0);
}

#[test]
fn s6_confirmed_record_region_is_skipped_not_rescanned() {
    let data = le_sub(b"EDID", b"TestNpc\0");
    let record = le_record(b"NPC_", 0x0100_0001, &data);
    let source = InMemorySource::new(&record);
    let config = ScanConfig::default();
    let result = scan_dump(&source, &config).unwrap();
    assert_eq!(result.counts().main_record_total, 1);
    // The EDID subrecord lives entirely inside the confirmed record's span and is
    // never independently re-dispatched as a fragment.
    assert!(result.raw().editor_ids.is_empty());
}

#[test]
fn s7_fragmented_editor_id_outside_any_record_is_still_found() {
    let data = le_sub(b"EDID", b"LooseFragment\0");
    let source = InMemorySource::new(&data);
    let config = ScanConfig::default();
    let result = scan_dump(&source, &config).unwrap();
    assert_eq!(result.raw().editor_ids.len(), 1);
    assert_eq!(result.raw().editor_ids[0].value, "LooseFragment");
}

#[test]
fn dump_scan_reconstructs_an_entity_for_a_confirmed_record() {
    let data = le_sub(b"DESC", b"A scrap of paper\0");
    let record = le_record(b"NOTE", 0x0100_0005, &data);
    let source = InMemorySource::new(&record);
    let config = ScanConfig::default();
    let result = scan_dump(&source, &config).unwrap();
    assert_eq!(result.entities().len(), 1);
    match &result.entities()[0].payload {
        esm_scan::entities::EntityPayload::Note(note) => {
            assert_eq!(note.text.as_deref(), Some("A scrap of paper"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}
