//! Chained-page byte-stream reassembly ("MetaBlob").

use crate::bank::BankTable;
use crate::page::PhysPageId;

/// Maximum number of pages a single blob may span.
pub const MAX_PAGES: usize = 7999;
/// Usable payload bytes per page (4 KiB minus the 12-byte page header).
pub const PAGE_PAYLOAD_SIZE: usize = 0x1000 - 0xC;
/// Upper bound on a blob's declared size.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PAGES * PAGE_PAYLOAD_SIZE;

/// Reads the size-prefixed byte stream rooted at `root_ppi`.
///
/// Returns `None` if the first page is missing or too short, the declared
/// size exceeds [`MAX_PAYLOAD_SIZE`], or any page in the chain is missing
/// before the declared size is reached.
pub fn read_blob(bank_table: &BankTable, root_ppi: PhysPageId) -> Option<Vec<u8>> {
    let first_page = bank_table.get_page(root_ppi)?;
    if first_page.len() < 0xC {
        return None;
    }
    let size = u32::from_le_bytes(first_page[8..12].try_into().unwrap()) as usize;
    if size >= MAX_PAYLOAD_SIZE {
        return None;
    }

    let npages = if size == 0 {
        1
    } else {
        size.div_ceil(PAGE_PAYLOAD_SIZE)
    };

    let mut buffer = vec![0u8; size];
    let mut pos = 0usize;
    let mut current = root_ppi;

    for _ in 0..npages {
        let page = bank_table.get_page(current)?;
        if page.len() < 0xC {
            return None;
        }

        let chunk_size = if pos + PAGE_PAYLOAD_SIZE > size {
            if pos == size {
                break;
            }
            size - pos
        } else {
            PAGE_PAYLOAD_SIZE
        };

        buffer[pos..pos + chunk_size].copy_from_slice(&page[0xC..0xC + chunk_size]);
        pos += chunk_size;

        let next = PhysPageId::from_bytes(&page[0..8]);
        if next.empty() {
            break;
        }
        current = next;
    }

    Some(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{Bank, BankHeader, BankInfo, BankSlot, BankTable};

    fn table_from_pages(pages: Vec<[u8; 0x1000]>) -> BankTable {
        let mut header_data = vec![0u8; 0x1000];
        header_data[0..2].copy_from_slice(&(pages.len() as u16).to_le_bytes());
        let header = BankHeader::parse(&header_data);
        let mut data = Vec::with_capacity(pages.len() * 0x1000);
        for page in pages.iter() {
            data.extend_from_slice(page);
        }
        let bank = Bank {
            info: BankInfo {
                crc: 1,
                offset: 0,
                size: (pages.len() * 0x1000 + 0x1000) as u32,
            },
            header,
            total_pages: pages.len() as u32,
            data,
        };
        BankTable::new(vec![BankSlot::Loaded(bank)])
    }

    #[test]
    fn scenario_g_style_blob_round_trip() {
        let payload: Vec<u8> = (0..(PAGE_PAYLOAD_SIZE + 100))
            .map(|i| (i % 256) as u8)
            .collect();
        let size = payload.len();

        let mut page0 = [0u8; 0x1000];
        page0[0..4].copy_from_slice(&1i32.to_le_bytes()); // next page_id -> page1
        page0[4..8].copy_from_slice(&0i32.to_le_bytes()); // next bank_id
        page0[8..12].copy_from_slice(&(size as u32).to_le_bytes());
        page0[0xC..0x1000].copy_from_slice(&payload[0..PAGE_PAYLOAD_SIZE]);

        let mut page1 = [0u8; 0x1000];
        page1[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        page1[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        let remaining = size - PAGE_PAYLOAD_SIZE;
        page1[0xC..0xC + remaining].copy_from_slice(&payload[PAGE_PAYLOAD_SIZE..]);

        let table = table_from_pages(vec![page0, page1]);
        let data = read_blob(&table, PhysPageId::new(0, 0)).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn rejects_oversized_declared_length() {
        let mut page0 = [0u8; 0x1000];
        page0[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        page0[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        page0[8..12].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32).to_le_bytes());
        let table = table_from_pages(vec![page0]);
        assert!(read_blob(&table, PhysPageId::new(0, 0)).is_none());
    }

    #[test]
    fn zero_length_blob_reads_as_empty() {
        let mut page0 = [0u8; 0x1000];
        page0[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        page0[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        page0[8..12].copy_from_slice(&0u32.to_le_bytes());
        let table = table_from_pages(vec![page0]);
        let data = read_blob(&table, PhysPageId::new(0, 0)).unwrap();
        assert!(data.is_empty());
    }
}
