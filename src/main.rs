//! Entry point for the rld loader.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up logging.
//! 2. Map each input file into memory.
//! 3. Build one shared address space: a bump allocator hands out area
//!    memory starting at `--base`, and `--defsym` entries form the
//!    external symbol resolver.
//! 4. Load every object in order with the x86 backend.
//! 5. Print the resulting map of areas and exported symbols.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;

use rld::arch::x86::X86;
use rld::config::Config;
use rld::loader::ModuleLoader;
use rld::space::{AddressSpace, AreaMemory};
use rld::utils::align_up;

const AREA_ALIGN: u32 = 16;

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .context("invalid log level")?,
        )
        .init();

    // Map all inputs up front so a bad path fails before anything loads.
    let mut open_files = Vec::new();
    for path in &config.inputs {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        open_files.push((path.clone(), mmap));
    }

    let mut next_base = config.base;
    let provider = move |_name: &str, size: usize| {
        let base = next_base;
        next_base = align_up(base.checked_add(size as u32)?, AREA_ALIGN);
        Some(AreaMemory::new(base, size))
    };
    let externals: HashMap<String, u32> = config.defsym.iter().cloned().collect();
    let resolver = move |name: &str| externals.get(name).copied();

    let mut space = AddressSpace::new(provider, resolver);
    let loader = ModuleLoader::new(X86);

    for (path, mmap) in &open_files {
        let loaded = loader
            .load(&mut space, mmap)
            .with_context(|| format!("failed to load {}", path.display()))?;
        tracing::info!(
            "{}: {} areas, {} symbols exported, {} relocations applied",
            path.display(),
            loaded.areas,
            loaded.exports,
            loaded.relocations
        );
    }

    println!("areas:");
    for area in space.areas() {
        println!("  {:#010x} {:>8} {}", area.base(), area.size(), area.name());
    }

    let mut exports: Vec<_> = space.exports().collect();
    exports.sort_by_key(|(_, e)| e.address);
    println!("symbols:");
    for (name, export) in exports {
        println!("  {:#010x} {:>8} {}", export.address, export.size, name);
    }

    Ok(())
}
