//! Processor Module Generator - Disassembler Modules from Opcode Listings
//!
//! This library turns a flat text listing of concrete instruction
//! encodings into a generalized processor module for a
//! specification-driven disassembler. A listing enumerates every
//! encoding explicitly:
//!
//! ```text
//! MOVI 0 | 0001 0000
//! MOVI 1 | 0001 0001
//! MOVI 2 | 0001 0010
//! ADD R0,R1 | 0000000000000001
//! ```
//!
//! The generator combines those rows into a token-and-field model
//! (`MOVI imm` over a 4-bit immediate field, register operands attached
//! to value-indexed symbol lists) and serializes it as a complete
//! module directory.
//!
//! # Pipeline
//!
//! 1. **Parse** the listing into raw entries ([`parser`]).
//! 2. **Combine** in three passes: duplicate elimination, immediate
//!    generalization, register generalization ([`combine`]).
//! 3. **Attach** deduplication groups register variant lists shared by
//!    multiple fields.
//! 4. **Tokenize** the surviving entries into width-keyed tokens and
//!    shared bit fields.
//! 5. **Serialize** the model as a module directory ([`output`]).
//!
//! Conflicts found along the way (ambiguous encodings, register-map
//! collisions) never abort the run; they surface as
//! [`Diagnostic`] values on the result.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use procmodgen::{generate_from_file, GeneratorOptions};
//!
//! fn main() -> Result<(), procmodgen::GeneratorError> {
//!     let options = GeneratorOptions::new();
//!     let model = generate_from_file("listing.txt", &options)?;
//!     for entry in &model.instructions {
//!         println!("{}", entry);
//!     }
//!     let root = procmodgen::output::write_module(&model, ".".as_ref())?;
//!     println!("module written to {}", root.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
pub mod combine;
pub mod error;
pub mod output;
pub mod parser;
pub mod types;

pub use catalog::{Register, RegisterCatalog};
pub use error::{GeneratorError, Result};
pub use types::{
    AttachGroup, BitPattern, BitRange, Diagnostic, DiagnosticKind, DiagnosticLevel, Endianness,
    GeneratedModel, GeneratorOptions, InstructionEntry, Operand, OperandField, PatternBit,
    StageCounts, Token, TokenField, TokenTable,
};

use std::path::Path;

/// Generate the combined instruction model from listing text.
///
/// This is the primary entry point. It builds the register catalog,
/// parses the listing, and runs the full combining pipeline. The
/// serializer is a separate step so callers can inspect the model (or
/// render it as JSON) without touching the filesystem.
pub fn generate(listing: &str, options: &GeneratorOptions) -> Result<GeneratedModel> {
    if options.bitness == 0 || options.bitness % 8 != 0 {
        return Err(GeneratorError::config(format!(
            "bitness must be a nonzero multiple of 8, got {}",
            options.bitness
        )));
    }
    if options.alignment == 0 {
        return Err(GeneratorError::config("alignment must be nonzero"));
    }
    let catalog = RegisterCatalog::with_defaults(options.bitness, &options.additional_registers)?;
    let entries = parser::parse_listing(listing)?;
    Ok(combine::run(entries, &catalog, options))
}

/// Generate the combined instruction model from a listing file.
pub fn generate_from_file<P: AsRef<Path>>(
    path: P,
    options: &GeneratorOptions,
) -> Result<GeneratedModel> {
    let listing = std::fs::read_to_string(path)?;
    generate(&listing, options)
}

/// Resolve the register catalog for a configuration without running the
/// pipeline. Backs the catalog-report mode of the command-line tool.
pub fn resolved_registers(options: &GeneratorOptions) -> Result<Vec<Register>> {
    let catalog = RegisterCatalog::with_defaults(options.bitness, &options.additional_registers)?;
    Ok(catalog.iter().cloned().collect())
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
