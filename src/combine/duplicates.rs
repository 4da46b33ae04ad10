//! Pass 1: exact-duplicate elimination.
//!
//! Collapses entries sharing an identical `(mnemonic, operands, bit
//! pattern)` key into one entry carrying the lowest source ordinal, so
//! output order is deterministic and stable under re-runs. Entries with
//! an identical pattern under *different* mnemonics indicate
//! contradictory source data: both are retained and flagged, never
//! resolved by preference.

use crate::types::{BitPattern, Diagnostic, DiagnosticKind, InstructionEntry, Operand};
use std::collections::HashMap;

/// Collapse exact duplicates. Idempotent: applying this twice yields the
/// same list as applying it once.
pub fn combine(
    entries: Vec<InstructionEntry>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<InstructionEntry> {
    let mut kept: Vec<InstructionEntry> = Vec::new();
    let mut by_key: HashMap<(String, Vec<Operand>, BitPattern), usize> = HashMap::new();

    for entry in entries {
        let key = (
            entry.mnemonic.clone(),
            entry.operands.clone(),
            entry.pattern.clone(),
        );
        match by_key.get(&key) {
            Some(&idx) => {
                let target = &mut kept[idx];
                target.absorb(&entry);
            }
            None => {
                by_key.insert(key, kept.len());
                kept.push(entry);
            }
        }
    }

    // Input arrives in ordinal order and absorption keeps the minimum,
    // so the kept list is already ordinal-sorted. Re-sort anyway so the
    // invariant does not depend on caller ordering.
    kept.sort_by_key(|e| e.ordinal);

    report_ambiguous(&kept, diagnostics);
    kept
}

/// Flag identical patterns carried by different mnemonics.
fn report_ambiguous(entries: &[InstructionEntry], diagnostics: &mut Vec<Diagnostic>) {
    let mut by_pattern: HashMap<&BitPattern, Vec<&InstructionEntry>> = HashMap::new();
    for entry in entries {
        by_pattern.entry(&entry.pattern).or_default().push(entry);
    }

    let mut flagged: Vec<&Vec<&InstructionEntry>> = by_pattern
        .values()
        .filter(|group| {
            group.len() > 1 && group.iter().any(|e| e.mnemonic != group[0].mnemonic)
        })
        .collect();
    flagged.sort_by_key(|group| group[0].ordinal);

    for group in flagged {
        let names: Vec<&str> = group.iter().map(|e| e.mnemonic.as_str()).collect();
        let ordinals: Vec<usize> = group.iter().map(|e| e.ordinal).collect();
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::AmbiguousEncoding,
            format!(
                "pattern {} is claimed by multiple mnemonics: {}",
                group[0].pattern,
                names.join(", ")
            ),
            ordinals,
        ));
    }
}
