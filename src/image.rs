//! ELF32 image reader.
//!
//! This module contains the `Image` type: a validating, read-only view over
//! one relocatable object in a raw byte source. Parsing checks the header,
//! the section-header table bounds, and the section-header string table,
//! and builds a section-name map; everything else (symbols, relocations,
//! program headers) is read on demand through bounds-checked accessors.
//! The view never mutates or copies the byte source.

use std::collections::HashMap;

use crate::error::{Error, Result};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS32: u8 = 1;
pub const ELFDATA2LSB: u8 = 1;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;

pub const SHN_UNDEF: u16 = 0;
pub const SHN_ABS: u16 = 0xfff1;
/// First reserved section index; ordinary indices stop here.
pub const SHN_LORESERVE: u16 = 0xff00;

pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;

/// Relocation sections pair with their target by name: `.rel` + target name.
pub const REL_SECTION_PREFIX: &str = ".rel";

const EHDR_SIZE: usize = 52;
const SHDR_SIZE: usize = 40;
const PHDR_SIZE: usize = 32;
const SYM_SIZE: usize = 16;
const REL_SIZE: usize = 8;

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Reads a NUL-terminated name out of a string table at `offset`.
/// The run must begin and end inside the table.
fn read_name(table: &[u8], offset: usize) -> Result<&str> {
    if offset >= table.len() {
        return Err(Error::MalformedStringTable);
    }
    let run = &table[offset..];
    let len = run
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::MalformedStringTable)?;
    std::str::from_utf8(&run[..len]).map_err(|_| Error::MalformedStringTable)
}

/// One section of the image: header fields plus the raw bytes it covers.
/// `SHT_NOBITS` and `SHT_NULL` sections carry an empty byte slice.
#[derive(Clone, Copy)]
pub struct Section<'a> {
    pub index: usize,
    pub name: &'a str,
    pub kind: u32,
    pub flags: u32,
    pub addr: u32,
    pub offset: u32,
    pub size: u32,
    pub entsize: u32,
    pub data: &'a [u8],
}

impl Section<'_> {
    /// Number of fixed-size entries in this section; only meaningful for
    /// table sections, and zero when the declared entry size is zero.
    pub fn entry_count(&self) -> usize {
        if self.entsize == 0 {
            0
        } else {
            (self.size / self.entsize) as usize
        }
    }
}

/// One symbol-table entry, with its name resolved through the symbol
/// string table.
#[derive(Clone, Copy)]
pub struct Symbol<'a> {
    pub name: &'a str,
    pub value: u32,
    pub size: u32,
    pub kind: u8,
    pub bind: u8,
    pub shndx: u16,
}

impl Symbol<'_> {
    /// Undefined symbols have no defining section and must be resolved
    /// externally.
    pub fn is_undefined(&self) -> bool {
        self.shndx == SHN_UNDEF
    }

    pub fn is_absolute(&self) -> bool {
        self.shndx == SHN_ABS
    }
}

#[derive(Clone, Copy)]
pub struct ProgramHeader {
    pub kind: u32,
    pub offset: u32,
    pub vaddr: u32,
    pub filesz: u32,
    pub memsz: u32,
    pub flags: u32,
    pub align: u32,
}

/// A `SHT_REL` section paired with one loadable section.
#[derive(Clone, Copy)]
pub struct RelocationSection<'a> {
    section: Section<'a>,
}

impl<'a> RelocationSection<'a> {
    pub fn name(&self) -> &'a str {
        self.section.name
    }

    /// Iterates the entries in ascending file order. The stride is the
    /// section's declared entry size.
    pub fn entries(&self) -> impl Iterator<Item = Rel> + 'a {
        let data = self.section.data;
        let stride = self.section.entsize as usize;
        let count = self.section.entry_count();
        (0..count).map_while(move |i| {
            let at = i * stride;
            if stride < REL_SIZE || at + REL_SIZE > data.len() {
                return None;
            }
            Some(Rel {
                offset: read_u32(data, at),
                info: read_u32(data, at + 4),
            })
        })
    }
}

/// One `Elf32_Rel` entry (no explicit addend; the addend is the word
/// already stored at the patch site).
#[derive(Clone, Copy, Debug)]
pub struct Rel {
    pub offset: u32,
    pub info: u32,
}

impl Rel {
    pub fn symbol_index(&self) -> usize {
        (self.info >> 8) as usize
    }

    pub fn kind(&self) -> u8 {
        (self.info & 0xff) as u8
    }
}

/// The parsed, immutable view of one ELF32 relocatable object.
///
/// Built once from a byte source; all accessors derive their bounds from
/// the counts validated at parse time. An index outside those counts is a
/// caller bug and panics rather than returning garbage.
pub struct Image<'a> {
    data: &'a [u8],
    machine: u16,
    entry: u32,
    shoff: usize,
    shentsize: usize,
    shnum: usize,
    phoff: usize,
    phentsize: usize,
    phnum: usize,
    symtab: Option<usize>,
    strtab: Option<usize>,
    names: HashMap<&'a str, usize>,
    section_names: Vec<&'a str>,
}

impl<'a> Image<'a> {
    /// Parses and validates the byte source against the one supported
    /// `machine`. Section headers are fully bounds-checked here and all
    /// section names are resolved through the section-header string
    /// table, so the section accessors below cannot fail afterwards.
    pub fn parse(data: &'a [u8], machine: u16) -> Result<Image<'a>> {
        if data.len() < EHDR_SIZE {
            return Err(Error::Truncated("file header"));
        }
        if data[..4] != ELF_MAGIC {
            return Err(Error::BadMagic);
        }
        if data[4] != ELFCLASS32 || data[5] != ELFDATA2LSB {
            return Err(Error::UnsupportedClass);
        }
        let found = read_u16(data, 18);
        if found != machine {
            return Err(Error::UnsupportedMachine(found));
        }

        let entry = read_u32(data, 24);
        let phoff = read_u32(data, 28) as usize;
        let shoff = read_u32(data, 32) as usize;
        let phentsize = read_u16(data, 42) as usize;
        let phnum = read_u16(data, 44) as usize;
        let shentsize = read_u16(data, 46) as usize;
        let shnum = read_u16(data, 48) as usize;
        let shstrndx = read_u16(data, 50) as usize;

        if shnum > 0 && shentsize < SHDR_SIZE {
            return Err(Error::Truncated("section header entry size"));
        }
        if shoff
            .checked_add(shnum * shentsize)
            .map_or(true, |end| end > data.len())
        {
            return Err(Error::Truncated("section header table"));
        }
        if phnum > 0 && phentsize < PHDR_SIZE {
            return Err(Error::Truncated("program header entry size"));
        }
        if phoff
            .checked_add(phnum * phentsize)
            .map_or(true, |end| end > data.len())
        {
            return Err(Error::Truncated("program header table"));
        }

        // Every section's file extent must lie within the byte source.
        for i in 0..shnum {
            let at = shoff + i * shentsize;
            let kind = read_u32(data, at + 4);
            if kind == SHT_NULL || kind == SHT_NOBITS {
                continue;
            }
            let offset = read_u32(data, at + 16) as usize;
            let size = read_u32(data, at + 20) as usize;
            if offset
                .checked_add(size)
                .map_or(true, |end| end > data.len())
            {
                return Err(Error::Truncated("section contents"));
            }
        }

        let mut image = Image {
            data,
            machine,
            entry,
            shoff,
            shentsize,
            shnum,
            phoff,
            phentsize,
            phnum,
            symtab: None,
            strtab: None,
            names: HashMap::new(),
            section_names: Vec::new(),
        };

        // First scan: locate the symbol table and the symbol string table
        // (the string table that is not the section-header one).
        for i in 0..shnum {
            match image.raw_kind(i) {
                SHT_SYMTAB => image.symtab = Some(i),
                SHT_STRTAB if i != shstrndx => image.strtab = Some(i),
                _ => {}
            }
        }

        // Second scan: resolve every section name through the
        // section-header string table and build the name map. A duplicate
        // name overwrites the earlier entry.
        if shstrndx >= shnum || image.raw_kind(shstrndx) != SHT_STRTAB {
            return Err(Error::MalformedStringTable);
        }
        let shstr = image.raw_data(shstrndx);
        for i in 0..shnum {
            let at = image.shoff + i * image.shentsize;
            let name = read_name(shstr, read_u32(data, at) as usize)?;
            image.section_names.push(name);
            if let Some(previous) = image.names.insert(name, i) {
                tracing::debug!("duplicate section name {name}: {previous} shadowed by {i}");
            }
        }

        tracing::debug!(
            "parsed image: machine {:#06x}, {} sections, {} program headers",
            image.machine,
            image.shnum,
            image.phnum
        );
        Ok(image)
    }

    fn raw_kind(&self, index: usize) -> u32 {
        read_u32(self.data, self.shoff + index * self.shentsize + 4)
    }

    fn raw_data(&self, index: usize) -> &'a [u8] {
        let at = self.shoff + index * self.shentsize;
        let kind = read_u32(self.data, at + 4);
        if kind == SHT_NULL || kind == SHT_NOBITS {
            return &[];
        }
        let offset = read_u32(self.data, at + 16) as usize;
        let size = read_u32(self.data, at + 20) as usize;
        &self.data[offset..offset + size]
    }

    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn section_count(&self) -> usize {
        self.shnum
    }

    pub fn program_header_count(&self) -> usize {
        self.phnum
    }

    /// Number of entries in the symbol table, zero if the image has none.
    pub fn symbol_count(&self) -> usize {
        self.symtab.map_or(0, |i| self.section(i).entry_count())
    }

    /// Returns the section at `index`. `index` must come from this
    /// image's own `section_count`.
    pub fn section(&self, index: usize) -> Section<'a> {
        assert!(index < self.shnum, "section index out of range");
        let at = self.shoff + index * self.shentsize;
        Section {
            index,
            name: self.section_names[index],
            kind: read_u32(self.data, at + 4),
            flags: read_u32(self.data, at + 8),
            addr: read_u32(self.data, at + 12),
            offset: read_u32(self.data, at + 16),
            size: read_u32(self.data, at + 20),
            entsize: read_u32(self.data, at + 36),
            data: self.raw_data(index),
        }
    }

    /// Returns the program header at `index`. `index` must come from this
    /// image's own `program_header_count`.
    pub fn program_header(&self, index: usize) -> ProgramHeader {
        assert!(index < self.phnum, "program header index out of range");
        let at = self.phoff + index * self.phentsize;
        ProgramHeader {
            kind: read_u32(self.data, at),
            offset: read_u32(self.data, at + 4),
            vaddr: read_u32(self.data, at + 8),
            filesz: read_u32(self.data, at + 16),
            memsz: read_u32(self.data, at + 20),
            flags: read_u32(self.data, at + 24),
            align: read_u32(self.data, at + 28),
        }
    }

    /// Returns the symbol at `index`. `index` must come from this image's
    /// own `symbol_count`. The name read is checked against the symbol
    /// string table, and the defining-section index against the section
    /// count; both are image data, so violations are errors, not panics.
    pub fn symbol(&self, index: usize) -> Result<Symbol<'a>> {
        let symtab = self.symtab.expect("image has no symbol table");
        let table = self.section(symtab);
        assert!(index < table.entry_count(), "symbol index out of range");
        let at = index * table.entsize as usize;
        if table.entsize < SYM_SIZE as u32 || at + SYM_SIZE > table.data.len() {
            return Err(Error::Truncated("symbol table entry"));
        }
        let strtab = self.strtab.ok_or(Error::MalformedStringTable)?;
        let name = read_name(self.raw_data(strtab), read_u32(table.data, at) as usize)?;
        let info = table.data[at + 12];
        let shndx = read_u16(table.data, at + 14);
        if shndx >= SHN_LORESERVE && shndx != SHN_ABS {
            return Err(Error::InvalidSectionIndex(shndx as usize));
        }
        if shndx != SHN_UNDEF && shndx != SHN_ABS && shndx as usize >= self.shnum {
            return Err(Error::InvalidSectionIndex(shndx as usize));
        }
        Ok(Symbol {
            name,
            value: read_u32(table.data, at + 4),
            size: read_u32(table.data, at + 8),
            kind: info & 0xf,
            bind: info >> 4,
            shndx,
        })
    }

    /// Looks a section up by name. Absence is a normal result; callers
    /// that need an optional section treat `None` as "not present".
    pub fn section_by_name(&self, name: &str) -> Option<Section<'a>> {
        self.names.get(name).map(|&index| self.section(index))
    }

    /// Finds the relocation section paired with `section` by naming
    /// convention (`.rel` + section name). Yields it only if it uses the
    /// no-addend relocation format; anything else means there is nothing
    /// to relocate here.
    pub fn relocations_for(&self, section: &Section<'_>) -> Option<RelocationSection<'a>> {
        let name = format!("{}{}", REL_SECTION_PREFIX, section.name);
        let companion = self.section_by_name(&name)?;
        if companion.kind != SHT_REL {
            return None;
        }
        Some(RelocationSection { section: companion })
    }

    /// Iterates all sections in ascending index order.
    pub fn sections(&self) -> impl Iterator<Item = Section<'a>> + '_ {
        (0..self.shnum).map(|i| self.section(i))
    }

    /// Iterates the sections of one type, in ascending index order.
    pub fn sections_of_type(&self, kind: u32) -> impl Iterator<Item = Section<'a>> + '_ {
        self.sections().filter(move |s| s.kind == kind)
    }

    /// Iterates all symbols in ascending index order.
    pub fn symbols(&self) -> impl Iterator<Item = Result<Symbol<'a>>> + '_ {
        (0..self.symbol_count()).map(|i| self.symbol(i))
    }
}
