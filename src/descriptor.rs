//! Meta-table indirection and the three block-descriptor record formats.

use std::cell::RefCell;
use std::collections::HashMap;

use log::{debug, warn};

use crate::bank::BankTable;
use crate::metavec::read_page_stack;
use crate::page::PhysPageId;

/// Logical block granularity of the meta-table layer.
pub const BLOCK_SIZE: u64 = 0x100_000;

/// Reverses each 8-byte half of a 16-byte digest independently, the
/// endian-swap quirk the format stores digests with on disk.
fn swap_digest(raw: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, b) in raw[0..8].iter().rev().enumerate() {
        out[i] = *b;
    }
    for (i, b) in raw[8..16].iter().rev().enumerate() {
        out[8 + i] = *b;
    }
    out
}

/// Human-readable compression algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Rle,
    ZlibHi,
    ZlibLo,
    Lz4,
    Zstd3,
    Zstd9,
    Unknown(u8),
}

impl CompressionType {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0xFF => CompressionType::None,
            2 => CompressionType::Rle,
            3 => CompressionType::ZlibHi,
            4 => CompressionType::ZlibLo,
            7 => CompressionType::Lz4,
            8 => CompressionType::Zstd3,
            9 => CompressionType::Zstd9,
            other => CompressionType::Unknown(other),
        }
    }

    /// True for `None` and the numeric range `2..=9`, regardless of
    /// whether that range has an assigned name (mirrors the on-disk
    /// format's own validity check, which is wider than its naming table).
    fn is_valid_code(raw: u8) -> bool {
        raw == 0xFF || (2..=9).contains(&raw)
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionType::None => write!(f, "None"),
            CompressionType::Rle => write!(f, "RLE"),
            CompressionType::ZlibHi => write!(f, "ZlibHi"),
            CompressionType::ZlibLo => write!(f, "ZlibLo"),
            CompressionType::Lz4 => write!(f, "LZ4"),
            CompressionType::Zstd3 => write!(f, "Zstd3"),
            CompressionType::Zstd9 => write!(f, "Zstd9"),
            CompressionType::Unknown(raw) => write!(f, "Unknown(0x{raw:02x})"),
        }
    }
}

/// Human-readable storage location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    Normal,
    Sparse,
    Reserved,
    Archived,
    BlockInBlob,
    BlockInBlobReserved,
    Unknown(u8),
}

impl StorageLocation {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => StorageLocation::Normal,
            1 => StorageLocation::Sparse,
            2 => StorageLocation::Reserved,
            3 => StorageLocation::Archived,
            4 => StorageLocation::BlockInBlob,
            5 => StorageLocation::BlockInBlobReserved,
            other => StorageLocation::Unknown(other),
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageLocation::Normal => write!(f, "Normal"),
            StorageLocation::Sparse => write!(f, "Sparse"),
            StorageLocation::Reserved => write!(f, "Reserved"),
            StorageLocation::Archived => write!(f, "Archived"),
            StorageLocation::BlockInBlob => write!(f, "BlockInBlob"),
            StorageLocation::BlockInBlobReserved => write!(f, "BlockInBlobReserved"),
            StorageLocation::Unknown(raw) => write!(f, "Unknown({raw})"),
        }
    }
}

/// Indirection record mapping a range of logical blocks to a FIB page
/// chain, or marking the range sparse.
#[derive(Clone, Copy, Debug)]
pub struct MetaTableDescriptor {
    pub loc: u64,
    pub size: u64,
    pub n_blocks: u64,
}

impl MetaTableDescriptor {
    pub const SIZE: usize = 0x18;
    pub const MAX_BLOCKS: u64 = 0x440;

    pub fn from_bytes(data: &[u8]) -> Self {
        let loc = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let n_blocks = u64::from_le_bytes(data[16..24].try_into().unwrap());
        Self { loc, size, n_blocks }
    }

    pub fn ppi(&self) -> PhysPageId {
        let page_id = (self.loc & 0xFFFF_FFFF) as i32;
        let bank_id = ((self.loc >> 32) & 0xFFFF_FFFF) as i32;
        PhysPageId::new(bank_id, page_id)
    }

    pub fn is_empty(&self) -> bool {
        let ppi = self.ppi();
        ppi.zero() && self.size == 0 && self.n_blocks == 0
    }

    pub fn is_sparse(&self) -> bool {
        let ppi = self.ppi();
        self.n_blocks == 0 && ppi.empty() && self.size == BLOCK_SIZE
    }
}

/// A file-block descriptor, or the synthetic placeholder emitted for a
/// sparse meta-table range.
#[derive(Clone, Debug)]
pub enum FibEntry {
    Real(FibBlockDescriptor),
    Sparse,
}

/// A 0x2E-byte file-in-backup block descriptor.
#[derive(Clone, Debug)]
pub struct FibBlockDescriptor {
    pub size: u32,
    pub loc_type: u8,
    pub digest: [u8; 16],
    pub id: u64,
    pub flags: u8,
    pub keyset_id: [u8; 16],
}

impl FibBlockDescriptor {
    pub const SIZE: usize = 0x2E;

    pub fn from_bytes(data: &[u8]) -> Self {
        let size = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let loc_type = data[4];
        let digest = swap_digest(&data[5..21]);
        let id = u64::from_le_bytes(data[21..29].try_into().unwrap());
        let flags = data[29];
        let mut keyset_id = [0u8; 16];
        keyset_id.copy_from_slice(&data[30..46]);
        Self {
            size,
            loc_type,
            digest,
            id,
            flags,
            keyset_id,
        }
    }

    fn is_end_marker(&self) -> bool {
        self.id == 0 && self.size == 0
    }
}

/// A 0x35-byte incremental/patch block descriptor.
#[derive(Clone, Debug)]
pub struct PatchBlockDescriptor {
    pub size: u32,
    pub loc_type: u8,
    pub digest: [u8; 16],
    pub id: u64,
    pub offset: u64,
    pub keyset_id: [u8; 16],
}

impl PatchBlockDescriptor {
    pub const SIZE: usize = 0x35;

    pub fn from_bytes(data: &[u8]) -> Self {
        let size = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let loc_type = data[4];
        let digest = swap_digest(&data[5..21]);
        let id = u64::from_le_bytes(data[21..29].try_into().unwrap());
        let offset = u64::from_le_bytes(data[29..37].try_into().unwrap());
        let mut keyset_id = [0u8; 16];
        keyset_id.copy_from_slice(&data[37..53]);
        Self {
            size,
            loc_type,
            digest,
            id,
            offset,
            keyset_id,
        }
    }

    fn is_end_marker(&self) -> bool {
        self.size == 0 && self.id == 0
    }
}

/// A 0x3C-byte storage (data-store) block descriptor.
#[derive(Clone, Debug)]
pub struct StorageBlockDescriptor {
    pub location: StorageLocation,
    pub ref_cnt: u32,
    pub offset: u64,
    pub alloc_size: u32,
    pub dedup: u8,
    pub digest: [u8; 16],
    pub comp_type: CompressionType,
    comp_type_raw: u8,
    pub comp_size: u32,
    pub src_size: u32,
    pub keyset_id: [u8; 16],
}

impl StorageBlockDescriptor {
    pub const SIZE: usize = 0x3C;

    pub fn from_bytes(data: &[u8]) -> Self {
        let location = StorageLocation::from_raw(data[0]);
        let ref_cnt = u32::from_le_bytes(data[1..5].try_into().unwrap());
        let offset = u64::from_le_bytes(data[5..13].try_into().unwrap());
        let alloc_size = u32::from_le_bytes(data[13..17].try_into().unwrap());
        let dedup = data[17];
        let digest = swap_digest(&data[18..34]);
        let comp_type_raw = data[34];
        let comp_type = CompressionType::from_raw(comp_type_raw);
        let comp_size = u32::from_le_bytes(data[36..40].try_into().unwrap());
        let src_size = u32::from_le_bytes(data[40..44].try_into().unwrap());
        let mut keyset_id = [0u8; 16];
        keyset_id.copy_from_slice(&data[44..60]);
        Self {
            location,
            ref_cnt,
            offset,
            alloc_size,
            dedup,
            digest,
            comp_type,
            comp_type_raw,
            comp_size,
            src_size,
            keyset_id,
        }
    }

    pub fn has_digest(&self) -> bool {
        self.digest != [0u8; 16]
    }

    /// Whether this record describes real, resolvable data.
    pub fn is_valid(&self) -> bool {
        if self.location != StorageLocation::BlockInBlob || self.alloc_size == 0 {
            return false;
        }
        if self.alloc_size < self.comp_size {
            return false;
        }
        if self.has_digest() {
            self.comp_size != 0
                && self.src_size != 0
                && CompressionType::is_valid_code(self.comp_type_raw)
        } else {
            self.comp_size == 0 && self.src_size == 0 && self.comp_type_raw == 0 && self.dedup == 0
        }
    }
}

/// Decodes a chain of meta-table descriptors rooted at `ppi`, stopping at
/// the first end marker or once `limit` descriptors have been collected.
pub fn read_meta_table_descriptors(
    bank_table: &BankTable,
    ppi: PhysPageId,
    limit: Option<u64>,
) -> Vec<MetaTableDescriptor> {
    let mut descriptors = Vec::new();
    for page_ppi in read_page_stack(bank_table, ppi) {
        let Some(page) = bank_table.get_page(page_ppi) else {
            continue;
        };
        let mut off = 0;
        while off + MetaTableDescriptor::SIZE <= 0x1000 {
            let desc = MetaTableDescriptor::from_bytes(&page[off..off + MetaTableDescriptor::SIZE]);
            if desc.is_empty() {
                return descriptors;
            }
            descriptors.push(desc);
            if let Some(limit) = limit {
                if descriptors.len() as u64 >= limit {
                    return descriptors;
                }
            }
            off += MetaTableDescriptor::SIZE;
        }
    }
    descriptors
}

/// Resolves the regular-file block map of an item whose `blocks_loc` names
/// a meta-table page chain.
pub fn read_file_block_descriptors(
    bank_table: &BankTable,
    blocks_loc: Option<PhysPageId>,
    n_blocks: u64,
) -> Vec<FibEntry> {
    let Some(blocks_loc) = blocks_loc else {
        return Vec::new();
    };
    if !blocks_loc.valid() {
        return Vec::new();
    }

    let meta_tables = read_meta_table_descriptors(bank_table, blocks_loc, Some(n_blocks));
    let mut all_blocks = Vec::new();

    for mt_desc in meta_tables {
        if mt_desc.is_sparse() {
            for _ in 0..MetaTableDescriptor::MAX_BLOCKS {
                all_blocks.push(FibEntry::Sparse);
            }
            continue;
        }
        let mt_ppi = mt_desc.ppi();
        if !mt_ppi.valid() {
            continue;
        }

        'pages: for page_ppi in read_page_stack(bank_table, mt_ppi) {
            let Some(page) = bank_table.get_page(page_ppi) else {
                continue;
            };
            let blocks_per_page = 0x1000 / FibBlockDescriptor::SIZE;
            for i in 0..blocks_per_page {
                let off = i * FibBlockDescriptor::SIZE;
                let fib = FibBlockDescriptor::from_bytes(&page[off..off + FibBlockDescriptor::SIZE]);
                if fib.is_end_marker() {
                    break 'pages;
                }
                all_blocks.push(FibEntry::Real(fib));
                if all_blocks.len() as u64 >= n_blocks {
                    return all_blocks;
                }
            }
        }
    }

    all_blocks
}

/// Resolves the incremental/patch block map of an item whose `blocks_loc`
/// names a MetaVec page chain directly (no meta-table indirection).
pub fn read_patch_block_descriptors(
    bank_table: &BankTable,
    blocks_loc: Option<PhysPageId>,
    n_blocks: u64,
) -> Vec<PatchBlockDescriptor> {
    let Some(blocks_loc) = blocks_loc else {
        return Vec::new();
    };
    if !blocks_loc.valid() {
        return Vec::new();
    }

    let mut all_blocks = Vec::new();
    'pages: for page_ppi in read_page_stack(bank_table, blocks_loc) {
        let Some(page) = bank_table.get_page(page_ppi) else {
            continue;
        };
        let blocks_per_page = 0x1000 / PatchBlockDescriptor::SIZE;
        for i in 0..blocks_per_page {
            let off = i * PatchBlockDescriptor::SIZE;
            let patch = PatchBlockDescriptor::from_bytes(&page[off..off + PatchBlockDescriptor::SIZE]);
            if patch.is_end_marker() {
                break 'pages;
            }
            if patch.size > 0 && u64::from(patch.size) <= BLOCK_SIZE {
                all_blocks.push(patch);
                if all_blocks.len() as u64 >= n_blocks {
                    return all_blocks;
                }
            } else {
                warn!(
                    "skipping patch block descriptor with out-of-range size {}",
                    patch.size
                );
            }
        }
    }
    all_blocks
}

/// Resolves storage (data-store) block descriptors by index, caching
/// already-decoded records since a single walk typically re-resolves the
/// same low-index deduplicated blocks repeatedly.
#[derive(Default)]
pub struct DataStoreResolver {
    cache: RefCell<HashMap<u64, StorageBlockDescriptor>>,
}

impl DataStoreResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the `index`-th storage record reachable from `root_ppi`.
    pub fn get_block(
        &self,
        bank_table: &BankTable,
        root_ppi: PhysPageId,
        index: u64,
    ) -> Option<StorageBlockDescriptor> {
        if let Some(cached) = self.cache.borrow().get(&index) {
            debug!("data-store block {index} served from cache");
            return Some(cached.clone());
        }

        let mut i = 0u64;
        for page_ppi in read_page_stack(bank_table, root_ppi) {
            let Some(page) = bank_table.get_page(page_ppi) else {
                continue;
            };
            let blocks_per_page = 0x1000 / StorageBlockDescriptor::SIZE;
            for b in 0..blocks_per_page {
                let off = b * StorageBlockDescriptor::SIZE;
                let block =
                    StorageBlockDescriptor::from_bytes(&page[off..off + StorageBlockDescriptor::SIZE]);
                self.cache.borrow_mut().insert(i, block.clone());
                if i == index {
                    return Some(block);
                }
                i += 1;
            }
        }
        None
    }
}
