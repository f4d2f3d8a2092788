//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates all
//! architecture-specific logic: the machine type an image must declare,
//! and the arithmetic for each relocation type. The loader stays generic
//! while a backend handles the patching.

use crate::error::Result;

pub mod x86;

/// A target architecture backend.
pub trait Architecture {
    /// The ELF machine value images for this architecture declare.
    fn machine(&self) -> u16;

    /// Applies one no-addend relocation to an area's bytes.
    ///
    /// # Arguments
    /// * `kind` - The relocation type from the entry's info word.
    /// * `offset` - The patch site's offset within `data`.
    /// * `p` - The runtime address of the patch site (P).
    /// * `s` - The resolved address of the target symbol (S).
    /// * `data` - The mutable bytes of the area being relocated.
    fn apply_relocation(
        &self,
        kind: u8,
        offset: usize,
        p: u32,
        s: u32,
        data: &mut [u8],
    ) -> Result<()>;
}
