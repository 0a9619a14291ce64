//! Page addressing.

use bytemuck::{Pod, Zeroable};

/// Address of a single 4 KiB page: a bank index paired with a page index
/// inside that bank.
///
/// On disk the pair is stored as two little-endian `i32`s with `page_id`
/// first and `bank_id` second; [`Pod`]/[`Zeroable`] let it be read directly
/// out of a raw byte slice at that layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct PhysPageId {
    pub page_id: i32,
    pub bank_id: i32,
}

impl PhysPageId {
    /// The on-disk byte width of a `PhysPageId`.
    pub const SIZE: usize = 8;

    /// The null reference: both fields are `-1`.
    pub const EMPTY: Self = Self {
        page_id: -1,
        bank_id: -1,
    };

    /// The all-zero terminator used in some arrays.
    pub const ZERO: Self = Self {
        page_id: 0,
        bank_id: 0,
    };

    pub const fn new(bank_id: i32, page_id: i32) -> Self {
        Self { page_id, bank_id }
    }

    /// Reads a `PhysPageId` from the first 8 bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let page_id = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let bank_id = i32::from_le_bytes(buf[4..8].try_into().unwrap());
        Self { page_id, bank_id }
    }

    /// `true` if both fields are `-1` (null reference).
    pub fn empty(self) -> bool {
        self == Self::EMPTY
    }

    /// `true` if both fields are `0` (array terminator).
    pub fn zero(self) -> bool {
        self == Self::ZERO
    }

    /// `true` if both fields are non-negative, i.e. this names a real page.
    pub fn valid(self) -> bool {
        self.bank_id >= 0 && self.page_id >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_zero_are_distinct() {
        assert!(PhysPageId::EMPTY.empty());
        assert!(!PhysPageId::EMPTY.zero());
        assert!(PhysPageId::ZERO.zero());
        assert!(!PhysPageId::ZERO.empty());
        // Scenario C: PhysPageId(0, 5) is valid.
        assert!(PhysPageId::new(0, 5).valid());
        assert!(!PhysPageId::EMPTY.valid());
    }

    #[test]
    fn from_bytes_reads_page_id_before_bank_id() {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&7i32.to_le_bytes());
        buf[4..8].copy_from_slice(&3i32.to_le_bytes());
        let ppi = PhysPageId::from_bytes(&buf);
        assert_eq!(ppi.page_id, 7);
        assert_eq!(ppi.bank_id, 3);
    }
}
