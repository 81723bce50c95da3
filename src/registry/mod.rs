//! C2/C3: process-wide signature registries - record kinds and subrecord shapes.

pub mod records;
pub mod subrecords;
