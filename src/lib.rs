//! A read-only reader for the Veeam Backup (VBK/VIB) container format.
//!
//! The format is a small page-addressed virtual filesystem: a file header
//! and a pair of redundant slots describe a set of banks, each bank holding
//! a fixed array of 4 KiB pages. Directory entries, file block maps and
//! deduplicated storage blocks are all built on top of two flavors of
//! linked-list-of-pages index structures (see [`metavec`]) and a
//! size-prefixed chained byte stream (see [`metablob`]).
//!
//! [`parser::Parser`] is the entry point: it opens a backup file, selects
//! the active slot, loads the bank table, and exposes the directory tree
//! and block descriptors through a small set of read-only accessors.

pub mod bank;
pub mod descriptor;
pub mod dir;
pub mod error;
pub mod header;
pub mod metablob;
pub mod metavec;
pub mod page;
pub mod parser;
pub mod props;
pub mod slot;

pub use crate::descriptor::{
    CompressionType, FibBlockDescriptor, FibEntry, PatchBlockDescriptor, StorageBlockDescriptor,
    StorageLocation,
};
pub use crate::dir::{DirItem, FileType};
pub use crate::error::VbkError;
pub use crate::header::HeaderInfo;
pub use crate::page::PhysPageId;
pub use crate::parser::Parser;
pub use crate::props::{PropValue, PropsDictionary};
pub use crate::slot::SlotInfo;

/// Size in bytes of a single addressable page.
pub const PAGE_SIZE: usize = 0x1000;

/// Logical block granularity used by the meta-table indirection layer.
pub const BLOCK_SIZE: u64 = 0x100_000;
