//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the loader
//! using `clap`. It handles parsing input files, the placement base
//! address, and externally defined symbols.

use clap::Parser;
use std::path::PathBuf;

/// A minimal loader for ELF32 (i386) relocatable objects.
///
/// Loads one or more object files into a single shared address space,
/// resolving cross-module references, then prints the resulting map of
/// areas and exported symbols.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input relocatable object files, loaded in order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Address where the first area is placed
    #[arg(long, default_value = "0x08000000", value_parser = parse_address)]
    pub base: u32,

    /// External symbol definition, as name=address (repeatable)
    #[arg(long = "defsym", value_name = "NAME=ADDR", value_parser = parse_defsym)]
    pub defsym: Vec<(String, u32)>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

fn parse_defsym(s: &str) -> Result<(String, u32), String> {
    let (name, address) = s
        .split_once('=')
        .ok_or_else(|| "expected name=address".to_string())?;
    if name.is_empty() {
        return Err("empty symbol name".to_string());
    }
    Ok((name.to_string(), parse_address(address)?))
}
