//! Slot parsing and active-slot selection.

use crate::bank::BankInfo;
use crate::page::PhysPageId;

/// Offset of slot 0 from the start of the file.
pub const SLOT0_OFFSET: u64 = 0x1000;
/// Offset of slot 1 from the start of the file.
pub const SLOT1_OFFSET: u64 = 0x81000;
/// On-disk byte size of a single slot record.
pub const SLOT_SPAN: usize = 0x80000;

/// Root pointers of the active snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjRefs {
    pub meta_root_dir_page: PhysPageId,
    pub children_num: u64,
    pub data_store_root_page: PhysPageId,
    pub blocks_count: u64,
    pub free_blocks_root: PhysPageId,
    pub dedup_root: PhysPageId,
    pub crypto_store_root: PhysPageId,
    pub archive_blob_store_root: PhysPageId,
}

impl ObjRefs {
    fn parse(data: &[u8], offset: usize) -> Self {
        let read_ppi = |off: usize| PhysPageId::from_bytes(&data[off..off + 8]);
        let read_u64 = |off: usize| u64::from_le_bytes(data[off..off + 8].try_into().unwrap());
        Self {
            meta_root_dir_page: read_ppi(offset),
            children_num: read_u64(offset + 8),
            data_store_root_page: read_ppi(offset + 16),
            blocks_count: read_u64(offset + 24),
            free_blocks_root: read_ppi(offset + 32),
            dedup_root: read_ppi(offset + 40),
            // offset+48 and offset+56 are reserved/unused.
            crypto_store_root: read_ppi(offset + 64),
            archive_blob_store_root: read_ppi(offset + 72),
        }
    }
}

/// Root descriptor of the active snapshot, embedded in every slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotDescriptor {
    pub version: u64,
    pub storage_eof: u64,
    pub n_banks: u32,
    pub obj_refs: ObjRefs,
}

impl SnapshotDescriptor {
    fn parse(data: &[u8], offset: usize) -> Self {
        let version = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        let storage_eof = u64::from_le_bytes(data[offset + 8..offset + 16].try_into().unwrap());
        let n_banks = u32::from_le_bytes(data[offset + 16..offset + 20].try_into().unwrap());
        let obj_refs = ObjRefs::parse(data, offset + 20);
        Self {
            version,
            storage_eof,
            n_banks,
            obj_refs,
        }
    }
}

/// One of the two redundant control records at the top of a backup file.
#[derive(Clone, Debug)]
pub struct SlotInfo {
    pub crc: u32,
    pub has_snapshot: u32,
    pub snapshot_desc: SnapshotDescriptor,
    pub max_banks: u32,
    pub allocated_banks: u32,
    pub bank_infos: Vec<BankInfo>,
    pub offset: u64,
}

impl SlotInfo {
    /// Parses a slot out of a `0x80000`-byte region of the file.
    pub fn parse(data: &[u8], offset: u64) -> Self {
        let crc = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let has_snapshot = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let snapshot_desc = SnapshotDescriptor::parse(data, 8);

        let max_banks = u32::from_le_bytes(data[0x74..0x78].try_into().unwrap());
        let allocated_banks = u32::from_le_bytes(data[0x78..0x7C].try_into().unwrap());

        let mut bank_infos = Vec::with_capacity(allocated_banks as usize);
        for i in 0..allocated_banks as usize {
            let bi_off = 0x7C + i * BankInfo::SIZE;
            bank_infos.push(BankInfo::from_bytes(&data[bi_off..bi_off + BankInfo::SIZE]));
        }

        Self {
            crc,
            has_snapshot,
            snapshot_desc,
            max_banks,
            allocated_banks,
            bank_infos,
            offset,
        }
    }

    /// Quick validation, cheap enough to run on both slots before picking
    /// which one to trust.
    pub fn valid_fast(&self) -> bool {
        self.crc != 0
            && self.has_snapshot == 1
            && self.max_banks > 0
            && self.max_banks <= 0xFFA0
            && self.allocated_banks <= self.max_banks
    }
}
