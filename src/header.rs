//! File header parsing.

use crate::error::{Result, VbkError};

/// The first 4 KiB of a backup file.
#[derive(Clone, Debug)]
pub struct HeaderInfo {
    pub version: u32,
    pub inited: u32,
    pub digest_type: String,
    pub slot_fmt: u32,
    pub standard_block_size: u32,
    pub cluster_align: u32,
}

const DIGEST_NAME_OFFSET: usize = 0xC;
const FORMAT_INFO_OFFSET: usize = 0x107;

impl HeaderInfo {
    /// Parses a header out of the first page of a backup file, validating
    /// every structural contract in the process.
    pub fn parse(page: &[u8]) -> Result<Self> {
        if page.len() < 0x1000 {
            return Err(VbkError::InvalidHeader("header page is shorter than 4 KiB"));
        }

        let version = u32::from_le_bytes(page[0..4].try_into().unwrap());
        let inited = u32::from_le_bytes(page[4..8].try_into().unwrap());
        let digest_type_len = u32::from_le_bytes(page[8..12].try_into().unwrap()) as usize;

        if digest_type_len > 250 {
            return Err(VbkError::InvalidHeader("digest type name too long"));
        }
        let name_bytes = &page[DIGEST_NAME_OFFSET..DIGEST_NAME_OFFSET + digest_type_len];
        let digest_type = std::str::from_utf8(name_bytes)
            .map_err(|_| VbkError::InvalidHeader("digest type name is not valid UTF-8"))?
            .to_string();
        if digest_type.len() != digest_type_len {
            return Err(VbkError::InvalidHeader("digest type length mismatch"));
        }

        let slot_fmt =
            u32::from_le_bytes(page[FORMAT_INFO_OFFSET..FORMAT_INFO_OFFSET + 4].try_into().unwrap());
        let standard_block_size = u32::from_le_bytes(
            page[FORMAT_INFO_OFFSET + 4..FORMAT_INFO_OFFSET + 8]
                .try_into()
                .unwrap(),
        );
        let cluster_align = u32::from_le_bytes(
            page[FORMAT_INFO_OFFSET + 8..FORMAT_INFO_OFFSET + 12]
                .try_into()
                .unwrap(),
        );

        let header = Self {
            version,
            inited,
            digest_type,
            slot_fmt,
            standard_block_size,
            cluster_align,
        };

        if !header.is_valid() {
            return Err(VbkError::InvalidHeader("header failed contract checks"));
        }
        Ok(header)
    }

    fn is_valid(&self) -> bool {
        self.inited == 1
            && self.version != 0
            && self.standard_block_size != 0
            && self.standard_block_size % 512 == 0
            && self.cluster_align != 0
            && self.slot_fmt <= 9
    }

    /// Maximum number of banks addressable by this file's slot format.
    pub fn max_banks(&self) -> u32 {
        match self.slot_fmt {
            0 => 0xF8,
            5 | 9 => 0x7F00,
            _ => 0,
        }
    }

    /// Byte size of a single slot, derived from `max_banks`.
    pub fn slot_size(&self) -> u32 {
        let bank_info_bytes = self.max_banks() * 0x10;
        let aligned = (bank_info_bytes + 120 + 0xFFF) & !0xFFF;
        aligned + 0x1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header_page(
        version: u32,
        inited: u32,
        digest_type: &str,
        slot_fmt: u32,
        standard_block_size: u32,
        cluster_align: u32,
    ) -> Vec<u8> {
        let mut page = vec![0u8; 0x1000];
        page[0..4].copy_from_slice(&version.to_le_bytes());
        page[4..8].copy_from_slice(&inited.to_le_bytes());
        page[8..12].copy_from_slice(&(digest_type.len() as u32).to_le_bytes());
        page[0xC..0xC + digest_type.len()].copy_from_slice(digest_type.as_bytes());
        page[0x107..0x10B].copy_from_slice(&slot_fmt.to_le_bytes());
        page[0x10B..0x10F].copy_from_slice(&standard_block_size.to_le_bytes());
        page[0x10F..0x113].copy_from_slice(&cluster_align.to_le_bytes());
        page
    }

    #[test]
    fn scenario_a_header_selection() {
        let page = make_header_page(0x0105_0000, 1, "md5", 9, 0x10_0000, 0x1000);
        let header = HeaderInfo::parse(&page).unwrap();
        assert_eq!(header.max_banks(), 0x7F00);
        assert_eq!(header.slot_size(), 0x81000);
    }

    #[test]
    fn rejects_uninitialized_header() {
        let page = make_header_page(0x0105_0000, 0, "md5", 9, 0x10_0000, 0x1000);
        assert!(HeaderInfo::parse(&page).is_err());
    }

    #[test]
    fn rejects_misaligned_block_size() {
        let page = make_header_page(0x0105_0000, 1, "md5", 9, 513, 0x1000);
        assert!(HeaderInfo::parse(&page).is_err());
    }

    #[test]
    fn fmt_zero_caps_at_0xf8_banks() {
        let page = make_header_page(1, 1, "md5", 0, 512, 1);
        let header = HeaderInfo::parse(&page).unwrap();
        assert_eq!(header.max_banks(), 0xF8);
    }
}
