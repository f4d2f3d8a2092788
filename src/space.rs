//! Address-space management.
//!
//! An `AddressSpace` owns the named memory areas that hold loaded section
//! bytes, plus the process-wide exported-symbol table. It spans loads: a
//! second module loaded into the same space sees every area and export
//! the first one created. Memory itself comes from a host-injected
//! provisioner; symbols the space does not know are referred to a
//! host-injected resolver.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::symbol::{Export, SymbolSource};

/// A block handed back by the memory provisioner: the address the block
/// is reachable at inside the target address space, plus the owned,
/// writable bytes backing it. For code areas the host is expected to
/// hand out memory it can make executable at `base`.
#[derive(Debug)]
pub struct AreaMemory {
    base: u32,
    bytes: Box<[u8]>,
}

impl AreaMemory {
    /// A zero-filled block of `size` bytes at `base`.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size].into_boxed_slice(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }
}

/// The capability that provisions area memory, injected at construction.
///
/// Given a name and a size it returns writable memory, or `None` when
/// the request cannot be satisfied. Requests are never retried.
pub trait MemoryProvider {
    fn allocate(&mut self, name: &str, size: usize) -> Option<AreaMemory>;
}

impl<F> MemoryProvider for F
where
    F: FnMut(&str, usize) -> Option<AreaMemory>,
{
    fn allocate(&mut self, name: &str, size: usize) -> Option<AreaMemory> {
        self(name, size)
    }
}

/// A named, independently owned memory block holding one loaded
/// section's bytes. Created during layout, never resized, released only
/// when the owning `AddressSpace` is torn down.
#[derive(Debug)]
pub struct Area {
    name: String,
    memory: AreaMemory,
}

impl Area {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u32 {
        self.memory.base
    }

    pub fn size(&self) -> usize {
        self.memory.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.memory.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory.bytes
    }
}

/// Owns every area and the exported-symbol table. Addresses resolved
/// through a space are valid only as long as the space is alive.
///
/// No internal synchronization: concurrent loads into one space must be
/// serialized by the host.
pub struct AddressSpace {
    provider: Box<dyn MemoryProvider>,
    external: Box<dyn SymbolSource>,
    areas: Vec<Area>,
    exports: HashMap<String, Export>,
}

impl AddressSpace {
    pub fn new(
        provider: impl MemoryProvider + 'static,
        external: impl SymbolSource + 'static,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            external: Box::new(external),
            areas: Vec::new(),
            exports: HashMap::new(),
        }
    }

    /// Requests `size` bytes from the provisioner and retains them as a
    /// new area tagged `name`.
    pub fn alloc_area(&mut self, name: &str, size: usize) -> Result<&mut Area> {
        let memory = self
            .provider
            .allocate(name, size)
            .filter(|m| m.bytes.len() >= size)
            .ok_or_else(|| Error::OutOfMemory {
                name: name.to_string(),
                size,
            })?;
        tracing::debug!("area {name}: {size} bytes at {:#010x}", memory.base());
        self.areas.push(Area {
            name: name.to_string(),
            memory,
        });
        Ok(self.areas.last_mut().unwrap())
    }

    /// Looks an area up by name. Sequential loads of different modules
    /// can produce same-named areas; the most recently allocated one
    /// wins, so a module being loaded always sees its own sections.
    pub fn area(&self, name: &str) -> Option<&Area> {
        self.areas.iter().rev().find(|a| a.name == name)
    }

    pub fn area_mut(&mut self, name: &str) -> Option<&mut Area> {
        self.areas.iter_mut().rev().find(|a| a.name == name)
    }

    /// Registers an exported symbol. The most recent registration for a
    /// name wins; an overwrite is worth noticing, so it is logged.
    pub fn add_symbol(&mut self, name: &str, address: u32, size: u32) {
        let export = Export { address, size };
        if let Some(previous) = self.exports.insert(name.to_string(), export) {
            tracing::warn!(
                "symbol {name} redefined: {:#010x} replaces {:#010x}",
                address,
                previous.address
            );
        } else {
            tracing::debug!("export {name} at {address:#010x} ({size} bytes)");
        }
    }

    /// Looks a symbol up in the exported table only.
    pub fn symbol(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    /// Resolves a name: the exported-symbol table first, then the
    /// external resolver. `None` means neither knows it.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        if let Some(export) = self.exports.get(name) {
            return Some(export.address);
        }
        self.external.resolve(name)
    }

    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.iter()
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, &Export)> {
        self.exports.iter().map(|(name, e)| (name.as_str(), e))
    }
}
