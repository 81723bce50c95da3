//! Subrecord stream iteration shared by every main-record data area: 6-byte header,
//! payload, repeat until the data area is exhausted, with the `XXXX` extended-size
//! marker overriding the next subrecord's declared length (spec §3, §4.3, S2).

use crate::binary::Endian;
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::model::{SubrecordHeader, SUBRECORD_HEADER_SIZE};

/// One decoded subrecord: signature, payload slice, and its absolute byte offset in
/// the original source (for entries that carry an offset field downstream).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubrecordSlice<'a> {
    pub signature: [u8; 4],
    pub payload: &'a [u8],
    pub absolute_offset: u64,
}

/// Walks `data`'s subrecord stream end to end. Never panics: a header that doesn't
/// fit, or a payload that runs past the end of `data`, truncates the walk and
/// records a diagnostic rather than propagating an error (spec §7).
pub fn iterate_subrecords<'a>(
    data: &'a [u8],
    endian: Endian,
    diagnostics: &mut DiagnosticLog,
    base_offset: u64,
) -> Vec<SubrecordSlice<'a>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut pending_extended_len: Option<u32> = None;

    while cursor + SUBRECORD_HEADER_SIZE <= data.len() {
        let header_offset = cursor;
        let Some(header) = SubrecordHeader::parse(data, cursor, endian) else {
            break;
        };

        if header.is_extended_size_marker() {
            let len_offset = cursor + SUBRECORD_HEADER_SIZE;
            let Some(len) = crate::binary::read_u32(data, len_offset, endian) else {
                diagnostics.push(Diagnostic::TruncatedExtendedSize {
                    offset: base_offset + header_offset as u64,
                });
                break;
            };
            pending_extended_len = Some(len);
            cursor = len_offset + 4;
            continue;
        }

        let declared_len = pending_extended_len
            .take()
            .unwrap_or(header.length as u32);
        let payload_start = cursor + SUBRECORD_HEADER_SIZE;
        let payload_end = payload_start + declared_len as usize;

        if payload_end > data.len() {
            diagnostics.push(Diagnostic::SubrecordOverrun {
                offset: base_offset + header_offset as u64,
                signature: header.signature,
                declared_len,
                available: data.len().saturating_sub(payload_start),
            });
            break;
        }

        out.push(SubrecordSlice {
            signature: header.signature,
            payload: &data[payload_start..payload_end],
            absolute_offset: base_offset + header_offset as u64,
        });

        cursor = payload_end;
    }

    out
}
