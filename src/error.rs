//! Error types shared across every layer of the reader.

use crate::page::PhysPageId;

/// Errors that can arise while reading a VBK/VIB container.
///
/// Variants are split between fatal ones, which abort [`crate::parser::Parser::open`]
/// entirely, and recoverable ones, which are reported to the caller as an
/// empty or absent result for the affected region (directory listing, block
/// map, property dictionary, ...) rather than propagated.
#[derive(Debug, thiserror::Error)]
pub enum VbkError {
    /// The file header failed one of its structural contracts.
    #[error("invalid file header: {0}")]
    InvalidHeader(&'static str),

    /// Neither slot passed strict validation.
    #[error("both slots are corrupt")]
    CorruptSlots,

    /// A bank referenced by the active slot failed validation and was
    /// treated as a placeholder.
    #[error("bank {bank_id} is invalid: {reason}")]
    BadBank { bank_id: i32, reason: &'static str },

    /// A page reference could not be resolved to bytes.
    #[error("page {0:?} is not present")]
    MissingPage(PhysPageId),

    /// A meta-blob's declared size did not match the page chain backing it.
    #[error("meta-blob at {0:?} is truncated")]
    TruncatedBlob(PhysPageId),

    /// The first page of a chain matched neither the MetaVec nor the
    /// MetaVec2 start signature.
    #[error("page stack at {0:?} has an unrecognized layout")]
    UnknownPageStack(PhysPageId),

    /// A directory item or block descriptor violated its contract.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(&'static str),

    /// Directory recursion exceeded the configured depth bound.
    #[error("directory tree exceeds the maximum depth of {0}")]
    DirectoryTooDeep(usize),

    /// Underlying file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VbkError>;
