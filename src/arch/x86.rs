//! x86 (i386) architecture backend.
//!
//! Implements the `Architecture` trait for 32-bit x86, the one machine
//! type this loader accepts. Only the two relocation types produced for
//! plain relocatable code are implemented; anything else fails the load
//! rather than silently producing wrong code.

use super::Architecture;
use crate::error::{Error, Result};

pub const EM_386: u16 = 3;

/// Absolute 32-bit: the stored word is a pre-assembled addend.
pub const R_386_32: u8 = 1;
/// PC-relative 32-bit, measured from the end of the 4-byte field.
pub const R_386_PC32: u8 = 2;

/// The i386 backend.
pub struct X86;

impl Architecture for X86 {
    fn machine(&self) -> u16 {
        EM_386
    }

    fn apply_relocation(
        &self,
        kind: u8,
        offset: usize,
        p: u32,
        s: u32,
        data: &mut [u8],
    ) -> Result<()> {
        if offset + 4 > data.len() {
            return Err(Error::RelocationOutOfBounds {
                offset: offset as u32,
            });
        }
        let site: &mut [u8] = &mut data[offset..offset + 4];
        let value = match kind {
            // R_386_PC32: S - (P + 4). The displacement is relative to
            // the instruction pointer after the 4-byte field.
            R_386_PC32 => s.wrapping_sub(p.wrapping_add(4)),
            // R_386_32: A + S, with A read from the patch site.
            R_386_32 => {
                let addend = u32::from_le_bytes(site[..4].try_into().unwrap());
                addend.wrapping_add(s)
            }
            other => return Err(Error::UnsupportedRelocationType(other)),
        };
        tracing::trace!("reloc type {kind} at {p:#010x}: S={s:#010x} -> {value:#010x}");
        site.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}
