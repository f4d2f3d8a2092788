//! Loader error taxonomy.
//!
//! Every failure a load can hit is a variant here, so hosts can match on
//! the category (parse, resource, linking) and decide what dies: the
//! process, the module, or nothing.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// A fatal load error. Loads are never retried and never partially
/// succeed; the first problem found aborts the whole load.
#[derive(Debug)]
pub enum Error {
    /// The byte source does not start with the ELF magic.
    BadMagic,
    /// The image is not 32-bit little-endian.
    UnsupportedClass,
    /// The header's machine field is not the supported target.
    UnsupportedMachine(u16),
    /// A header, section, or table extends past the end of the byte source.
    Truncated(&'static str),
    /// A string-table index is invalid, or a name offset falls outside
    /// its string table.
    MalformedStringTable,
    /// A symbol names a defining section that does not exist.
    InvalidSectionIndex(usize),
    /// A relocation names a symbol-table entry that does not exist.
    InvalidSymbolIndex(usize),
    /// The memory provisioner could not satisfy an area request.
    OutOfMemory { name: String, size: usize },
    /// An undefined symbol was not known to the address space or the
    /// external resolver.
    UnresolvedSymbol(String),
    /// A relocation entry carries a type this target does not implement.
    UnsupportedRelocationType(u8),
    /// A relocation's patch site falls outside its section's area.
    RelocationOutOfBounds { offset: u32 },
    /// A section that must have been materialized during layout has no
    /// area. Internal invariant failure.
    AreaMissing(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic => write!(f, "not an ELF image"),
            Error::UnsupportedClass => write!(f, "not a 32-bit little-endian ELF image"),
            Error::UnsupportedMachine(m) => write!(f, "unsupported machine type {m:#06x}"),
            Error::Truncated(what) => write!(f, "image truncated: {what} out of bounds"),
            Error::MalformedStringTable => write!(f, "malformed string table"),
            Error::InvalidSectionIndex(i) => write!(f, "symbol refers to invalid section {i}"),
            Error::InvalidSymbolIndex(i) => write!(f, "relocation refers to invalid symbol {i}"),
            Error::OutOfMemory { name, size } => {
                write!(f, "out of memory allocating {size} bytes for area {name}")
            }
            Error::UnresolvedSymbol(name) => write!(f, "unresolved symbol {name}"),
            Error::UnsupportedRelocationType(t) => write!(f, "unsupported relocation type {t}"),
            Error::RelocationOutOfBounds { offset } => {
                write!(f, "relocation offset {offset:#x} outside its section")
            }
            Error::AreaMissing(name) => write!(f, "no area for section {name}"),
        }
    }
}

impl std::error::Error for Error {}
