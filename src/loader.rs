//! Module loading.
//!
//! This module contains the `ModuleLoader`, which sequences a load:
//! 1. Parse: validate the byte source and build an `Image` view.
//! 2. Layout: allocate one area per loadable section, copy its bytes in.
//! 3. Export: register every function symbol in the address space.
//! 4. Relocate: resolve and patch every relocation entry in place.
//!
//! The phases run strictly in order and the first error aborts the whole
//! load. Areas allocated before the failure stay in the space; there is
//! no rollback and no partial success.

use crate::arch::Architecture;
use crate::error::{Error, Result};
use crate::image::{Image, Symbol, SHT_PROGBITS, STT_FUNC};
use crate::space::AddressSpace;

/// What one successful load produced, for host diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Loaded {
    pub areas: usize,
    pub exports: usize,
    pub relocations: usize,
}

/// Loads relocatable images into an `AddressSpace`. Borrows the space
/// for the duration of one load and owns nothing across loads.
pub struct ModuleLoader<A: Architecture> {
    arch: A,
}

impl<A: Architecture> ModuleLoader<A> {
    pub fn new(arch: A) -> Self {
        Self { arch }
    }

    /// Runs one complete load of `data` into `space`.
    pub fn load(&self, space: &mut AddressSpace, data: &[u8]) -> Result<Loaded> {
        let image = Image::parse(data, self.arch.machine())?;
        let areas = self.layout(&image, space)?;
        let exports = self.export(&image, space)?;
        let relocations = self.relocate(&image, space)?;
        tracing::debug!("load complete: {areas} areas, {exports} exports, {relocations} relocations");
        Ok(Loaded {
            areas,
            exports,
            relocations,
        })
    }

    /// Materializes every non-empty loadable section as an area named
    /// after it, with the section's raw bytes copied in verbatim. Table
    /// sections and empty sections get no area.
    fn layout(&self, image: &Image<'_>, space: &mut AddressSpace) -> Result<usize> {
        let mut placed = 0;
        for section in image.sections_of_type(SHT_PROGBITS) {
            if section.size == 0 {
                continue;
            }
            tracing::debug!("placing {} ({} bytes)", section.name, section.size);
            let area = space.alloc_area(section.name, section.size as usize)?;
            area.bytes_mut()[..section.data.len()].copy_from_slice(section.data);
            placed += 1;
        }
        Ok(placed)
    }

    /// Registers every defined function symbol at its resolved address.
    /// Other symbol types stay private to the image.
    fn export(&self, image: &Image<'_>, space: &mut AddressSpace) -> Result<usize> {
        let mut exported = 0;
        for symbol in image.symbols() {
            let symbol = symbol?;
            if symbol.kind != STT_FUNC || symbol.is_undefined() {
                continue;
            }
            let address = if symbol.is_absolute() {
                symbol.value
            } else {
                let section = image.section(symbol.shndx as usize);
                let area = space
                    .area(section.name)
                    .ok_or_else(|| Error::AreaMissing(section.name.to_string()))?;
                area.base().wrapping_add(symbol.value)
            };
            space.add_symbol(symbol.name, address, symbol.size);
            exported += 1;
        }
        Ok(exported)
    }

    /// Applies every relocation section paired with a loadable section,
    /// entry by entry in file order.
    fn relocate(&self, image: &Image<'_>, space: &mut AddressSpace) -> Result<usize> {
        let mut applied = 0;
        for section in image.sections_of_type(SHT_PROGBITS) {
            let Some(rel_section) = image.relocations_for(&section) else {
                continue;
            };
            tracing::debug!("relocating {} via {}", section.name, rel_section.name());
            for entry in rel_section.entries() {
                let index = entry.symbol_index();
                if index >= image.symbol_count() {
                    return Err(Error::InvalidSymbolIndex(index));
                }
                let symbol = image.symbol(index)?;
                let target = self.resolve_target(image, space, &symbol)?;
                let area = space
                    .area_mut(section.name)
                    .ok_or_else(|| Error::AreaMissing(section.name.to_string()))?;
                let site = area.base().wrapping_add(entry.offset);
                self.arch.apply_relocation(
                    entry.kind(),
                    entry.offset as usize,
                    site,
                    target,
                    area.bytes_mut(),
                )?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Resolves a relocation's target address. Undefined symbols go
    /// through the address space's resolution path by name; defined ones
    /// are their section's area base plus the symbol value, or the value
    /// itself for absolute symbols.
    fn resolve_target(
        &self,
        image: &Image<'_>,
        space: &AddressSpace,
        symbol: &Symbol<'_>,
    ) -> Result<u32> {
        if symbol.is_undefined() {
            return space
                .resolve(symbol.name)
                .ok_or_else(|| Error::UnresolvedSymbol(symbol.name.to_string()));
        }
        if symbol.is_absolute() {
            return Ok(symbol.value);
        }
        let section = image.section(symbol.shndx as usize);
        let area = space
            .area(section.name)
            .ok_or_else(|| Error::AreaMissing(section.name.to_string()))?;
        Ok(area.base().wrapping_add(symbol.value))
    }
}
