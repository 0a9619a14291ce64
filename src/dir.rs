//! Directory-entry records and recursive directory walking.

use crate::page::PhysPageId;

/// Maximum nesting depth a directory walk will follow before it is
/// considered pathological.
pub const MAX_DIR_DEPTH: usize = 64;

/// On-disk byte size of a single directory-item record.
pub const ITEM_SIZE: usize = 0xC0;

/// Discriminant of a directory-item record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Subfolder,
    ExtFib,
    IntFib,
    Patch,
    Increment,
    Unknown(u32),
}

impl FileType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => FileType::Subfolder,
            2 => FileType::ExtFib,
            3 => FileType::IntFib,
            4 => FileType::Patch,
            5 => FileType::Increment,
            other => FileType::Unknown(other),
        }
    }

    pub fn is_increment(self) -> bool {
        matches!(self, FileType::Patch | FileType::Increment)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Subfolder => write!(f, "Dir"),
            FileType::ExtFib => write!(f, "ExtFib"),
            FileType::IntFib => write!(f, "IntFib"),
            FileType::Patch => write!(f, "Patch"),
            FileType::Increment => write!(f, "Increment"),
            FileType::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// A single decoded directory-item record.
#[derive(Clone, Debug)]
pub struct DirItem {
    pub file_type: FileType,
    pub name: String,
    pub props_loc: PhysPageId,
    pub children_loc: Option<PhysPageId>,
    pub children_num: u64,
    pub blocks_loc: Option<PhysPageId>,
    pub n_blocks: u64,
    pub fib_size: u64,
    pub flags: u8,
    pub inc_size: u64,
}

impl DirItem {
    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Subfolder)
    }

    /// Decodes a single record at `data[offset..offset + ITEM_SIZE]`.
    /// Returns `None` for the all-zero end marker.
    pub fn parse(data: &[u8], offset: usize) -> Option<Self> {
        let raw_type = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        if raw_type == 0 {
            return None;
        }
        let file_type = FileType::from_raw(raw_type);
        let name_len =
            u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap()) as usize;

        let name_bytes = &data[offset + 8..offset + 8 + name_len.min(0x80)];
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();

        let props_loc = PhysPageId::from_bytes(&data[offset + 0x88..offset + 0x90]);

        let mut item = DirItem {
            file_type,
            name,
            props_loc,
            children_loc: None,
            children_num: 0,
            blocks_loc: None,
            n_blocks: 0,
            fib_size: 0,
            flags: 0,
            inc_size: 0,
        };

        if raw_type == 1 {
            item.children_loc = Some(PhysPageId::from_bytes(&data[offset + 0x94..offset + 0x9C]));
            item.children_num =
                u64::from_le_bytes(data[offset + 0x9C..offset + 0xA4].try_into().unwrap());
        } else {
            item.flags = data[offset + 0x97];
            item.blocks_loc = Some(PhysPageId::from_bytes(&data[offset + 0x98..offset + 0xA0]));
            item.n_blocks =
                u64::from_le_bytes(data[offset + 0xA0..offset + 0xA8].try_into().unwrap());
            item.fib_size =
                u64::from_le_bytes(data[offset + 0xA8..offset + 0xB0].try_into().unwrap());
            if item.file_type.is_increment() {
                item.inc_size =
                    u64::from_le_bytes(data[offset + 0xB0..offset + 0xB8].try_into().unwrap());
            }
        }

        Some(item)
    }

    /// `name` has at least one character and no control bytes.
    pub fn valid_name(&self) -> bool {
        !self.name.is_empty() && !self.name.chars().any(|c| (c as u32) < 0x20)
    }

    /// Structural validity of the item, mirroring the on-disk contract.
    pub fn is_valid(&self, max_banks: u32) -> bool {
        if !self.valid_name() {
            return false;
        }
        match self.file_type {
            FileType::Subfolder => {
                let Some(children_loc) = self.children_loc else {
                    return false;
                };
                children_loc.valid()
                    && self.children_num > 0
                    && (max_banks == 0 || (children_loc.bank_id as u32) < max_banks)
            }
            FileType::ExtFib | FileType::IntFib | FileType::Patch | FileType::Increment => {
                if self.fib_size == 0 || self.n_blocks > self.fib_size {
                    return false;
                }
                match self.blocks_loc {
                    Some(loc) if !loc.valid() => false,
                    Some(loc) if max_banks > 0 && (loc.bank_id as u32) >= max_banks => false,
                    _ => true,
                }
            }
            FileType::Unknown(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_record() -> Vec<u8> {
        vec![0u8; ITEM_SIZE]
    }

    #[test]
    fn zero_file_type_is_end_marker() {
        let data = blank_record();
        assert!(DirItem::parse(&data, 0).is_none());
    }

    #[test]
    fn decodes_subfolder_record() {
        let mut data = blank_record();
        data[0..4].copy_from_slice(&1u32.to_le_bytes()); // Subfolder
        let name = b"docs";
        data[4..8].copy_from_slice(&(name.len() as u32).to_le_bytes());
        data[8..8 + name.len()].copy_from_slice(name);
        data[0x94..0x98].copy_from_slice(&5i32.to_le_bytes());
        data[0x98..0x9C].copy_from_slice(&2i32.to_le_bytes());
        data[0x9C..0xA4].copy_from_slice(&3u64.to_le_bytes());

        let item = DirItem::parse(&data, 0).unwrap();
        assert!(item.is_dir());
        assert_eq!(item.name, "docs");
        assert_eq!(item.children_num, 3);
        assert_eq!(item.children_loc.unwrap(), PhysPageId::new(2, 5));
        assert!(item.is_valid(0));
    }

    #[test]
    fn decodes_file_record_with_flags() {
        let mut data = blank_record();
        data[0..4].copy_from_slice(&2u32.to_le_bytes()); // ExtFib
        let name = b"disk.vmdk";
        data[4..8].copy_from_slice(&(name.len() as u32).to_le_bytes());
        data[8..8 + name.len()].copy_from_slice(name);
        data[0x97] = 0x3;
        data[0x98..0x9C].copy_from_slice(&7i32.to_le_bytes());
        data[0x9C..0xA0].copy_from_slice(&1i32.to_le_bytes());
        data[0xA0..0xA8].copy_from_slice(&4u64.to_le_bytes());
        data[0xA8..0xB0].copy_from_slice(&10u64.to_le_bytes());

        let item = DirItem::parse(&data, 0).unwrap();
        assert_eq!(item.flags, 0x3);
        assert_eq!(item.n_blocks, 4);
        assert_eq!(item.fib_size, 10);
        assert!(item.is_valid(0));
    }

    #[test]
    fn rejects_control_characters_in_name() {
        let mut data = blank_record();
        data[0..4].copy_from_slice(&2u32.to_le_bytes());
        data[4..8].copy_from_slice(&1u32.to_le_bytes());
        data[8] = 0x01;
        data[0xA8..0xB0].copy_from_slice(&1u64.to_le_bytes());
        let item = DirItem::parse(&data, 0).unwrap();
        assert!(!item.valid_name());
        assert!(!item.is_valid(0));
    }
}
