//! Register catalog.
//!
//! The catalog is the set of register symbols the register combine pass
//! is allowed to recognize: a built-in baseline covering the register
//! naming conventions of common processor modules, plus any names the
//! caller supplies. It is constructed once per run and never mutated
//! afterwards; every component that needs it takes a shared reference.

use crate::error::{GeneratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A register symbol known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Register name as it appears in operand syntax.
    pub name: String,
    /// Register width in bits.
    pub bits: u32,
}

/// Baseline register names recognized without any caller configuration.
///
/// Covers the general-purpose, pointer, and status naming schemes used
/// across the processor modules this generator targets. Lookup is
/// case-insensitive, so `R0` and `r0` both resolve.
const BASELINE_PREFIXES: &[(&str, u32)] = &[
    // General-purpose banks
    ("r", 32),
    ("er", 8),
    ("x", 32),
    ("w", 32),
    ("a", 8),
    ("d", 8),
    ("g", 8),
    ("v", 32),
    ("f", 32),
    ("s", 32),
    ("t", 8),
    ("gpr", 32),
];

/// Baseline standalone register names.
const BASELINE_NAMES: &[&str] = &[
    "sp", "pc", "lr", "fp", "gp", "ra", "sr", "ccr", "psw", "flags", "acc", "ix", "iy", "usp",
    "ssp", "msp", "psp", "zero",
];

/// Immutable set of known register symbols.
#[derive(Debug, Clone)]
pub struct RegisterCatalog {
    registers: Vec<Register>,
    // Lowercased name -> index into `registers`.
    index: HashMap<String, usize>,
}

impl RegisterCatalog {
    /// Build the catalog: every baseline name plus the caller-supplied
    /// additions, all sized to the processor bitness.
    ///
    /// A caller-supplied name colliding with an existing entry (case
    /// insensitive) is a construction failure, not a silent merge.
    pub fn with_defaults(bitness: u32, additional: &[String]) -> Result<Self> {
        let mut catalog = Self {
            registers: Vec::new(),
            index: HashMap::new(),
        };

        for &(prefix, count) in BASELINE_PREFIXES {
            for n in 0..count {
                // Baseline entries may overlap between banks (e.g. "r1"
                // appears only once); silently skip repeats.
                let _ = catalog.insert(&format!("{}{}", prefix, n), bitness);
            }
        }
        for name in BASELINE_NAMES {
            let _ = catalog.insert(name, bitness);
        }

        for name in additional {
            let name = name.trim();
            if name.is_empty() {
                return Err(GeneratorError::register_init(
                    "additional register name is empty",
                ));
            }
            if !catalog.insert(name, bitness) {
                return Err(GeneratorError::register_init(format!(
                    "register '{}' is already defined",
                    name
                )));
            }
        }

        tracing::debug!(registers = catalog.len(), "register catalog built");
        Ok(catalog)
    }

    fn insert(&mut self, name: &str, bits: u32) -> bool {
        let key = name.to_ascii_lowercase();
        if self.index.contains_key(&key) {
            return false;
        }
        self.registers.push(Register {
            name: name.to_string(),
            bits,
        });
        self.index.insert(key, self.registers.len() - 1);
        true
    }

    /// Look up a register by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Register> {
        let key = name.to_ascii_lowercase();
        self.index.get(&key).map(|&i| &self.registers[i])
    }

    /// Whether `name` resolves to a known register.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of known registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// True when the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Iterate over the registers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.iter()
    }
}

impl fmt::Display for RegisterCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} registers:", self.len())?;
        for reg in &self.registers {
            writeln!(f, "  {} ({} bits)", reg.name, reg.bits)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_lookup() {
        let catalog = RegisterCatalog::with_defaults(32, &[]).unwrap();
        assert!(catalog.contains("r0"));
        assert!(catalog.contains("R15"));
        assert!(catalog.contains("sp"));
        assert!(catalog.contains("PC"));
        assert!(!catalog.contains("bogus"));
    }

    #[test]
    fn test_additional_registers() {
        let extra = vec!["ctl0".to_string(), "ctl1".to_string()];
        let catalog = RegisterCatalog::with_defaults(16, &extra).unwrap();
        assert!(catalog.contains("ctl0"));
        assert_eq!(catalog.get("ctl1").unwrap().bits, 16);
    }

    #[test]
    fn test_collision_rejected() {
        let extra = vec!["R0".to_string()];
        let err = RegisterCatalog::with_defaults(32, &extra).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_empty_addition_rejected() {
        let extra = vec!["  ".to_string()];
        assert!(RegisterCatalog::with_defaults(32, &extra).is_err());
    }
}
