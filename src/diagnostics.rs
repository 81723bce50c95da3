//! Record-local failures (spec §7, "recorded, scan continues" tier).
//!
//! Speculative failures (dump scanner candidates, hash-table pointer follows) are
//! deliberately *not* recorded anywhere - spec §7 calls for silent drop so the
//! scanner isn't swamped with noise from a pass that expects most positions to fail.

#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A compressed record's zlib stream failed to inflate.
    DecompressFailed { offset: u64, reason: String },
    /// A subrecord's declared length ran past the end of its owning record's data area.
    SubrecordOverrun {
        offset: u64,
        signature: [u8; 4],
        declared_len: u32,
        available: usize,
    },
    /// An `XXXX` extended-size marker appeared with nothing following it.
    TruncatedExtendedSize { offset: u64 },
    /// A group or record's structure was inconsistent; the subtree was abandoned.
    Truncated { offset: u64, reason: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::DecompressFailed { offset, reason } => {
                write!(f, "decompress failed at {offset:#x}: {reason}")
            }
            Diagnostic::SubrecordOverrun {
                offset,
                signature,
                declared_len,
                available,
            } => write!(
                f,
                "subrecord {:?} at {offset:#x} declared {declared_len} bytes but only {available} remained",
                String::from_utf8_lossy(signature)
            ),
            Diagnostic::TruncatedExtendedSize { offset } => {
                write!(f, "XXXX extended-size marker at {offset:#x} had no following subrecord")
            }
            Diagnostic::Truncated { offset, reason } => {
                write!(f, "truncated at {offset:#x}: {reason}")
            }
        }
    }
}

/// Scan-local accumulator of non-fatal diagnostics. Owned by the driving scan; never
/// shared across scans (see spec §5 concurrency model).
#[derive(Clone, Debug, Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
