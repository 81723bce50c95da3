//! Minimal PE header walk: just enough to enumerate sections and find the
//! writable/initialized-data ones the hash table lives in (spec §4.5 step 1).
//! Header fields are always little-endian regardless of the console's record
//! endianness - the loader that built this image ran on a little-endian toolchain.

use crate::source::ByteSource;

const DOS_HEADER_SIZE: usize = 0x40;
const E_LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_ENTRY_SIZE: usize = 40;

const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub characteristics: u32,
}

impl Section {
    pub fn is_writable_data(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE != 0
            && self.characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0
    }
}

fn le_u16(buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)?.try_into().ok().map(u32::from_le_bytes)
}

/// Reads the module's header image (DOS header through the section table) and
/// returns its section list. `header_bytes` is read starting at the module's own
/// base file offset; a generous fixed size covers any realistic section count.
pub fn read_sections<S: ByteSource>(source: &S, module_file_offset: u64) -> Option<Vec<Section>> {
    const HEADER_READ_SIZE: usize = 4096;
    let header = source.read_vec(module_file_offset, HEADER_READ_SIZE).ok()?;
    if header.len() < DOS_HEADER_SIZE {
        return None;
    }
    if &header[0..2] != b"MZ" {
        return None;
    }
    let pe_offset = le_u32(&header, E_LFANEW_OFFSET)? as usize;
    if header.len() < pe_offset + 4 + COFF_HEADER_SIZE {
        return None;
    }
    if &header[pe_offset..pe_offset + 4] != b"PE\0\0" {
        return None;
    }
    let coff = pe_offset + 4;
    let number_of_sections = le_u16(&header, coff + 2)? as usize;
    let size_of_optional_header = le_u16(&header, coff + 16)? as usize;

    let section_table_start = coff + COFF_HEADER_SIZE + size_of_optional_header;
    let mut sections = Vec::with_capacity(number_of_sections);
    for i in 0..number_of_sections {
        let entry = section_table_start + i * SECTION_ENTRY_SIZE;
        if header.len() < entry + SECTION_ENTRY_SIZE {
            break;
        }
        let virtual_size = le_u32(&header, entry + 8)?;
        let virtual_address = le_u32(&header, entry + 12)?;
        let characteristics = le_u32(&header, entry + 36)?;
        sections.push(Section { virtual_address, virtual_size, characteristics });
    }
    Some(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    fn build_minimal_pe(sections: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut buf = vec![0u8; DOS_HEADER_SIZE];
        buf[0..2].copy_from_slice(b"MZ");
        let pe_offset = DOS_HEADER_SIZE;
        buf[E_LFANEW_OFFSET..E_LFANEW_OFFSET + 4].copy_from_slice(&(pe_offset as u32).to_le_bytes());
        buf.extend_from_slice(b"PE\0\0");
        let coff_start = buf.len();
        buf.extend_from_slice(&[0u8; COFF_HEADER_SIZE]);
        buf[coff_start + 2..coff_start + 4].copy_from_slice(&(sections.len() as u16).to_le_bytes());
        let size_of_optional_header = 0u16;
        buf[coff_start + 16..coff_start + 18].copy_from_slice(&size_of_optional_header.to_le_bytes());
        for &(va, vsize, chars) in sections {
            let mut entry = vec![0u8; SECTION_ENTRY_SIZE];
            entry[8..12].copy_from_slice(&vsize.to_le_bytes());
            entry[12..16].copy_from_slice(&va.to_le_bytes());
            entry[36..40].copy_from_slice(&chars.to_le_bytes());
            buf.extend_from_slice(&entry);
        }
        buf
    }

    #[test]
    fn parses_section_table() {
        let image = build_minimal_pe(&[
            (0x1000, 0x2000, IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_WRITE),
            (0x4000, 0x1000, 0x6000_0020),
        ]);
        let source = InMemorySource::new(&image);
        let sections = read_sections(&source, 0).unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections[0].is_writable_data());
        assert!(!sections[1].is_writable_data());
    }
}
