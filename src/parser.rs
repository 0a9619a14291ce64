//! The public read-only facade over a backup file.

use std::path::Path;

use log::warn;

use crate::bank::{Bank, BankSlot, BankTable};
use crate::descriptor::{
    self, DataStoreResolver, FibEntry, PatchBlockDescriptor, StorageBlockDescriptor,
};
use crate::dir::{DirItem, ITEM_SIZE, MAX_DIR_DEPTH};
use crate::error::{Result, VbkError};
use crate::header::HeaderInfo;
use crate::metablob;
use crate::metavec::read_page_stack;
use crate::page::PhysPageId;
use crate::props::PropsDictionary;
use crate::slot::{SlotInfo, SLOT0_OFFSET, SLOT1_OFFSET, SLOT_SPAN};

/// An opened, validated backup file.
///
/// Banks are loaded eagerly when the file is opened; everything below
/// that is read lazily, on demand, from the in-memory bank table.
pub struct Parser {
    header: HeaderInfo,
    slots: [SlotInfo; 2],
    active_slot_index: usize,
    bank_table: BankTable,
    datastore: DataStoreResolver,
}

impl Parser {
    /// Opens, validates, and indexes a backup file.
    ///
    /// Fatal on a malformed header, on both slots failing strict
    /// validation, or on an I/O failure; a bank that fails validation
    /// becomes a placeholder rather than aborting the open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < 0x1000 {
            return Err(VbkError::InvalidHeader("file shorter than the header page"));
        }

        let header = HeaderInfo::parse(&bytes[0..0x1000])?;
        let file_size = bytes.len() as u64;

        if bytes.len() < SLOT1_OFFSET as usize + SLOT_SPAN {
            return Err(VbkError::InvalidHeader(
                "file too short to contain both slots",
            ));
        }

        let slot0 = SlotInfo::parse(
            &bytes[SLOT0_OFFSET as usize..SLOT0_OFFSET as usize + SLOT_SPAN],
            SLOT0_OFFSET,
        );
        let slot1 = SlotInfo::parse(
            &bytes[SLOT1_OFFSET as usize..SLOT1_OFFSET as usize + SLOT_SPAN],
            SLOT1_OFFSET,
        );

        let active_slot_index = if slot0.valid_fast() {
            0
        } else {
            warn!("slot 0 failed fast validation, falling back to slot 1");
            1
        };
        let slots = [slot0, slot1];
        let active = &slots[active_slot_index];
        if !active.valid_fast() {
            return Err(VbkError::CorruptSlots);
        }

        let mut bank_slots = Vec::with_capacity(active.bank_infos.len());
        for (bank_id, info) in active.bank_infos.iter().enumerate() {
            if info.is_valid(file_size) {
                bank_slots.push(BankSlot::Loaded(Bank::load(&bytes, *info)));
            } else {
                let reason = "failed BankInfo validation";
                warn!(
                    "{}",
                    VbkError::BadBank {
                        bank_id: bank_id as i32,
                        reason,
                    }
                );
                bank_slots.push(BankSlot::Invalid { reason });
            }
        }
        let bank_table = BankTable::new(bank_slots);

        Ok(Self {
            header,
            slots,
            active_slot_index,
            bank_table,
            datastore: DataStoreResolver::new(),
        })
    }

    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    pub fn slots(&self) -> &[SlotInfo; 2] {
        &self.slots
    }

    pub fn active_slot(&self) -> &SlotInfo {
        &self.slots[self.active_slot_index]
    }

    pub fn active_slot_index(&self) -> usize {
        self.active_slot_index
    }

    /// Returns the raw bytes of a single page, or `None` if it cannot be
    /// resolved.
    pub fn get_page(&self, ppi: PhysPageId) -> Option<&[u8]> {
        self.bank_table.get_page(ppi)
    }

    /// Walks the page chain rooted at `ppi`, auto-detecting MetaVec vs
    /// MetaVec2.
    pub fn read_page_stack(&self, ppi: PhysPageId) -> Vec<PhysPageId> {
        read_page_stack(&self.bank_table, ppi)
    }

    /// Decodes the directory-item records found in the (non-recursive)
    /// page chain rooted at `ppi`.
    ///
    /// A record that fails [`DirItem::is_valid`] is logged and skipped
    /// rather than handed to the caller; this is the lenient half of the
    /// directory-walk validation contract (see [`Self::walk_dir`] for the
    /// strict half, enforced on recursion into a subfolder).
    pub fn read_dir_items(&self, ppi: PhysPageId) -> Vec<DirItem> {
        let max_banks = self.header.max_banks();
        let mut items = Vec::new();
        for page_ppi in self.read_page_stack(ppi) {
            let Some(page) = self.get_page(page_ppi) else {
                warn!("page {page_ppi:?} in directory chain at {ppi:?} is not present");
                continue;
            };
            let mut off = 0;
            while off + ITEM_SIZE <= 0x1000 {
                match DirItem::parse(page, off) {
                    None => break,
                    Some(item) => match validate_dir_item(&item, max_banks) {
                        Ok(()) => items.push(item),
                        Err(err) => {
                            warn!("skipping invalid directory item {:?}: {err}", item.name);
                        }
                    },
                }
                off += ITEM_SIZE;
            }
        }
        items
    }

    /// Recursively walks the directory tree rooted at `ppi`, calling
    /// `visit` for every item with its path depth. Stops early with
    /// [`VbkError::DirectoryTooDeep`] if recursion exceeds
    /// [`MAX_DIR_DEPTH`].
    pub fn walk_dir(
        &self,
        ppi: PhysPageId,
        mut visit: impl FnMut(&DirItem, usize),
    ) -> Result<()> {
        self.walk_dir_inner(ppi, 0, &mut visit)
    }

    fn walk_dir_inner(
        &self,
        ppi: PhysPageId,
        depth: usize,
        visit: &mut impl FnMut(&DirItem, usize),
    ) -> Result<()> {
        if depth >= MAX_DIR_DEPTH {
            return Err(VbkError::DirectoryTooDeep(MAX_DIR_DEPTH));
        }
        for item in self.read_dir_items(ppi) {
            visit(&item, depth);
            if item.is_dir() {
                if let Some(children) = item.children_loc {
                    self.walk_dir_inner(children, depth + 1, visit)?;
                }
            }
        }
        Ok(())
    }

    /// Resolves the regular-file block map of `item`.
    pub fn read_file_block_descriptors(&self, item: &DirItem) -> Vec<FibEntry> {
        descriptor::read_file_block_descriptors(&self.bank_table, item.blocks_loc, item.n_blocks)
    }

    /// Resolves the incremental/patch block map of `item`.
    pub fn read_patch_block_descriptors(&self, item: &DirItem) -> Vec<PatchBlockDescriptor> {
        descriptor::read_patch_block_descriptors(&self.bank_table, item.blocks_loc, item.n_blocks)
    }

    /// Resolves the `index`-th data-store (storage) block descriptor.
    pub fn get_datastore_block(&self, index: u64) -> Option<StorageBlockDescriptor> {
        let root = self.active_slot().snapshot_desc.obj_refs.data_store_root_page;
        self.datastore.get_block(&self.bank_table, root, index)
    }

    /// Reassembles the MetaBlob rooted at `ppi`.
    pub fn read_meta_blob(&self, ppi: PhysPageId) -> Option<Vec<u8>> {
        metablob::read_blob(&self.bank_table, ppi)
    }

    /// Decodes the property dictionary rooted at `ppi`, if any.
    pub fn read_props_dictionary(&self, ppi: PhysPageId) -> Option<PropsDictionary> {
        if !ppi.valid() {
            return None;
        }
        let data = self.read_meta_blob(ppi)?;
        Some(PropsDictionary::parse(&data))
    }
}

/// Strict half of the directory-item validation contract: rejects a
/// record [`DirItem::is_valid`] would reject, surfacing the declared
/// [`VbkError::InvalidDescriptor`] instead of silently accepting it.
fn validate_dir_item(item: &DirItem, max_banks: u32) -> Result<()> {
    if item.is_valid(max_banks) {
        Ok(())
    } else {
        Err(VbkError::InvalidDescriptor(
            "directory item failed structural validation",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header_page() -> Vec<u8> {
        let mut page = vec![0u8; 0x1000];
        page[0..4].copy_from_slice(&1u32.to_le_bytes()); // version
        page[4..8].copy_from_slice(&1u32.to_le_bytes()); // inited
        page[8..12].copy_from_slice(&0u32.to_le_bytes()); // digest_type_len
        page[0x107..0x10B].copy_from_slice(&9u32.to_le_bytes()); // slot_fmt
        page[0x10B..0x10F].copy_from_slice(&0x1000u32.to_le_bytes()); // block size
        page[0x10F..0x113].copy_from_slice(&0x1000u32.to_le_bytes()); // cluster align
        page
    }

    #[test]
    fn open_rejects_file_too_short_for_both_slots_instead_of_panicking() {
        let mut bytes = make_header_page();
        bytes.resize(0x2000, 0); // well short of SLOT1_OFFSET + SLOT_SPAN

        let path = std::env::temp_dir().join(format!(
            "vbkreader-test-{}-{:?}.bin",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, &bytes).unwrap();

        let result = Parser::open(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(VbkError::InvalidHeader(_))));
    }

    #[test]
    fn validate_dir_item_rejects_unknown_file_type() {
        let item = DirItem {
            file_type: crate::dir::FileType::Unknown(42),
            name: "mystery".to_string(),
            props_loc: PhysPageId::EMPTY,
            children_loc: None,
            children_num: 0,
            blocks_loc: None,
            n_blocks: 0,
            fib_size: 0,
            flags: 0,
            inc_size: 0,
        };
        assert!(matches!(
            validate_dir_item(&item, 0),
            Err(VbkError::InvalidDescriptor(_))
        ));
    }
}
