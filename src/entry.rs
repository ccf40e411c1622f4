//! Entry record: the fixed-layout value type stored once per file or
//! directory known to the index.

use bitflags::bitflags;

bitflags! {
    /// Attribute bitset for an [`EntryRecord`]. The teacher's schema tracked
    /// `is_dir` as a lone column; this generalizes it to the full bitset the
    /// evaluator's hidden/system/attribute-mask predicates need.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryAttributes: u8 {
        const DIRECTORY = 0b0000_0001;
        const HIDDEN     = 0b0000_0010;
        const SYSTEM     = 0b0000_0100;
        const READ_ONLY  = 0b0000_1000;
        const SYMLINK    = 0b0001_0000;
    }
}

/// A file or directory known to the index. `Copy`, fixed layout, sized to fit
/// one cache line: 4x u32 (16) + u64 (8) + 3x u64 (24) + u8 + u8 + 6 bytes
/// padding = 56 bytes, rounded to 64 by the compiler's natural alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EntryRecord {
    pub full_path_id: u32,
    pub name_id: u32,
    pub dir_id: u32,
    pub ext_id: u32,
    pub size: u64,
    pub created_utc: u64,
    pub modified_utc: u64,
    pub accessed_utc: u64,
    pub attributes: EntryAttributes,
    pub volume_tag: u8,
    _padding: [u8; 6],
}

impl EntryRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        full_path_id: u32,
        name_id: u32,
        dir_id: u32,
        ext_id: u32,
        size: u64,
        created_utc: u64,
        modified_utc: u64,
        accessed_utc: u64,
        attributes: EntryAttributes,
        volume_tag: u8,
    ) -> Self {
        EntryRecord {
            full_path_id,
            name_id,
            dir_id,
            ext_id,
            size,
            created_utc,
            modified_utc,
            accessed_utc,
            attributes,
            volume_tag,
            _padding: [0; 6],
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(EntryAttributes::DIRECTORY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(EntryAttributes::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.attributes.contains(EntryAttributes::SYSTEM)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(EntryAttributes::READ_ONLY)
    }

    pub fn is_symlink(&self) -> bool {
        self.attributes.contains(EntryAttributes::SYMLINK)
    }
}
