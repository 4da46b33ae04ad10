//! Pass 3: register generalization.
//!
//! Entries that differ only in a bit range whose values each pair with a
//! distinct catalog register collapse into a single entry carrying a
//! register-bound field. The value-to-symbol mapping accumulated for the
//! field must stay injective in both directions; a candidate that would
//! violate that is rejected and reported, never repaired.
//!
//! Runs after the immediate pass so register recognition sees
//! already-minimized candidates. Same partition-then-pairwise-fixpoint
//! strategy as the immediate pass.

use super::{entry_diff, operand_diff, owner_operand};
use crate::catalog::RegisterCatalog;
use crate::types::{
    BitRange, Diagnostic, DiagnosticKind, InstructionEntry, Operand, OperandField, PatternBit,
};
use std::collections::HashMap;

/// Widest register field the engine will form; an attach list
/// enumerates every value in the field's domain.
const MAX_FIELD_BITS: usize = 16;

/// Generalize register enumerations into register-bound fields.
pub fn combine(
    entries: Vec<InstructionEntry>,
    catalog: &RegisterCatalog,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<InstructionEntry> {
    let mut partitions: HashMap<ShapeKey, Vec<InstructionEntry>> = HashMap::new();
    for entry in entries {
        partitions
            .entry(shape_key(&entry, catalog))
            .or_default()
            .push(entry);
    }

    let mut out = Vec::new();
    let mut keys: Vec<ShapeKey> = partitions.keys().cloned().collect();
    keys.sort_by_key(|k| partitions[k].iter().map(|e| e.ordinal).min().unwrap_or(0));

    for key in keys {
        let mut items = partitions.remove(&key).unwrap_or_default();
        items.sort_by_key(|e| e.ordinal);
        merge_to_fixpoint(&mut items, catalog);
        items.sort_by_key(|e| e.ordinal);

        // Rejected candidates are reported once, after the fixpoint
        // settles; pairs that were never candidates stay silent.
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if let MergeOutcome::Rejected(kind, message) =
                    try_merge(&items[i], &items[j], catalog)
                {
                    diagnostics.push(Diagnostic::warning(
                        kind,
                        message,
                        vec![items[i].ordinal, items[j].ordinal],
                    ));
                }
            }
        }
        out.extend(items);
    }

    out.sort_by_key(|e| e.ordinal);
    out
}

/// One masked operand of the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ShapeToken {
    /// Catalog register name or an already-generalized register field.
    Reg,
    /// Anything else, kept verbatim.
    Other(String),
}

type ShapeKey = (String, usize, Vec<ShapeToken>);

fn shape_key(entry: &InstructionEntry, catalog: &RegisterCatalog) -> ShapeKey {
    let shape = entry
        .operands
        .iter()
        .map(|op| match op {
            Operand::Text(t) if catalog.contains(t) => ShapeToken::Reg,
            Operand::Text(t) => ShapeToken::Other(t.clone()),
            Operand::Field(i) => match entry.fields[*i] {
                OperandField::Register { .. } => ShapeToken::Reg,
                OperandField::Immediate { range, signed } => {
                    ShapeToken::Other(format!("<imm {} {} {}>", range.start, range.len, signed))
                }
            },
        })
        .collect();
    (entry.mnemonic.clone(), entry.width(), shape)
}

/// Outcome of one pairwise merge attempt.
enum MergeOutcome {
    /// The pair combined into one entry.
    Merged(InstructionEntry),
    /// The pair was never a merge candidate; nothing to report.
    Incompatible,
    /// The pair was a candidate but failed a merge condition.
    Rejected(DiagnosticKind, String),
}

fn merge_to_fixpoint(items: &mut Vec<InstructionEntry>, catalog: &RegisterCatalog) {
    let mut merged_any = true;
    while merged_any {
        merged_any = false;
        'scan: for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if let MergeOutcome::Merged(merged) = try_merge(&items[i], &items[j], catalog) {
                    items[i] = merged;
                    items.remove(j);
                    merged_any = true;
                    break 'scan;
                }
            }
        }
    }
}

/// Attempt to merge two entries over one register operand.
fn try_merge(
    a: &InstructionEntry,
    b: &InstructionEntry,
    catalog: &RegisterCatalog,
) -> MergeOutcome {
    let vary = operand_diff(a, b);

    if vary.is_empty() {
        if entry_diff(a, b).is_empty() {
            let mut merged = a.clone();
            merged.absorb(b);
            return MergeOutcome::Merged(merged);
        }
        return MergeOutcome::Incompatible;
    }

    if vary.len() != 1 {
        return MergeOutcome::Incompatible;
    }
    let p = vary[0];
    if !register_like(a, p, catalog) || !register_like(b, p, catalog) {
        return MergeOutcome::Incompatible;
    }

    let diff = entry_diff(a, b);
    if diff.is_empty() {
        // Identical encoding claimed by two different register symbols:
        // the mapping could never be a bijection.
        return MergeOutcome::Rejected(
            DiagnosticKind::AttachCollision,
            format!(
                "'{}' and '{}' share one encoding but name different registers",
                a.syntax(),
                b.syntax()
            ),
        );
    }

    let Some(range) = BitRange::from_positions(&diff) else {
        return MergeOutcome::Rejected(
            DiagnosticKind::UnresolvedRegister,
            format!(
                "'{}' and '{}' differ on a non-contiguous bit range",
                a.syntax(),
                b.syntax()
            ),
        );
    };
    if range.len > MAX_FIELD_BITS {
        return MergeOutcome::Rejected(
            DiagnosticKind::UnresolvedRegister,
            format!(
                "register field of '{}' would exceed {} bits",
                a.mnemonic, MAX_FIELD_BITS
            ),
        );
    }
    if overlaps_foreign_field(a, p, range) || overlaps_foreign_field(b, p, range) {
        return MergeOutcome::Incompatible;
    }

    let Some(mut variants) = side_variants(a, p, range, catalog) else {
        return MergeOutcome::Incompatible;
    };
    let Some(other_variants) = side_variants(b, p, range, catalog) else {
        return MergeOutcome::Incompatible;
    };
    variants.extend(other_variants);
    variants.sort();
    variants.dedup();
    for pair in variants.windows(2) {
        if pair[0].0 == pair[1].0 {
            return MergeOutcome::Rejected(
                DiagnosticKind::AttachCollision,
                format!(
                    "register field of '{}' maps value {} to both {} and {}",
                    a.mnemonic, pair[0].0, pair[0].1, pair[1].1
                ),
            );
        }
    }
    let mut names: Vec<&str> = variants.iter().map(|(_, n)| n.as_str()).collect();
    names.sort_unstable();
    if names.windows(2).any(|w| w[0] == w[1]) {
        return MergeOutcome::Rejected(
            DiagnosticKind::AttachCollision,
            format!(
                "register field of '{}' binds one register under two encodings",
                a.mnemonic
            ),
        );
    }

    let (base, other) = if a.ordinal <= b.ordinal { (a, b) } else { (b, a) };
    let mut merged = base.clone();
    let field_idx = match merged.operands[p] {
        Operand::Field(i) => {
            merged.fields[i] = OperandField::Register {
                range,
                variants,
                group: None,
            };
            i
        }
        Operand::Text(_) => {
            merged.fields.push(OperandField::Register {
                range,
                variants,
                group: None,
            });
            let i = merged.fields.len() - 1;
            merged.operands[p] = Operand::Field(i);
            i
        }
    };
    merged.pattern.assign_field(range, field_idx);
    merged.absorb(other);
    MergeOutcome::Merged(merged)
}

/// Whether operand `p` can carry a register field.
fn register_like(entry: &InstructionEntry, p: usize, catalog: &RegisterCatalog) -> bool {
    match &entry.operands[p] {
        Operand::Text(t) => catalog.contains(t),
        Operand::Field(i) => matches!(entry.fields[*i], OperandField::Register { .. }),
    }
}

/// True when `range` touches a field owned by some operand other than `p`.
fn overlaps_foreign_field(entry: &InstructionEntry, p: usize, range: BitRange) -> bool {
    (range.start..range.end()).any(|pos| match entry.pattern.bit(pos) {
        PatternBit::Field(i) => owner_operand(entry, i) != Some(p),
        _ => false,
    })
}

/// The `(value, register)` pairs one side contributes over `range`.
///
/// A literal operand contributes the single pair formed from its range
/// value and its catalog-canonical name. A side that already carries a
/// register field has its variant values widened into the new range,
/// taking the surrounding literal bits from its own pattern.
fn side_variants(
    entry: &InstructionEntry,
    p: usize,
    range: BitRange,
    catalog: &RegisterCatalog,
) -> Option<Vec<(u64, String)>> {
    match &entry.operands[p] {
        Operand::Text(name) => {
            let canonical = catalog.get(name)?.name.clone();
            let value = entry.pattern.literal_value(range)?;
            Some(vec![(value, canonical)])
        }
        Operand::Field(i) => {
            let OperandField::Register {
                range: old_range,
                variants,
                ..
            } = &entry.fields[*i]
            else {
                return None;
            };
            variants
                .iter()
                .map(|(value, name)| {
                    widen_value(entry, *old_range, range, *value).map(|v| (v, name.clone()))
                })
                .collect()
        }
    }
}

/// Recompose a field value from `old_range` into the wider `new_range`,
/// filling the extra positions from the entry's own literal bits.
fn widen_value(
    entry: &InstructionEntry,
    old_range: BitRange,
    new_range: BitRange,
    value: u64,
) -> Option<u64> {
    let mut widened = 0u64;
    for pos in new_range.start..new_range.end() {
        let bit = if old_range.contains(pos) {
            (value >> (old_range.end() - 1 - pos)) & 1
        } else {
            entry.pattern.bit(pos).literal()?
        };
        widened = (widened << 1) | bit;
    }
    Some(widened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitPattern;

    fn raw(mnemonic: &str, operands: &[&str], value: u64, width: usize, ordinal: usize) -> InstructionEntry {
        InstructionEntry::raw(
            mnemonic,
            operands.iter().map(|s| s.to_string()).collect(),
            BitPattern::from_value(value, width),
            ordinal,
        )
    }

    fn catalog() -> RegisterCatalog {
        RegisterCatalog::with_defaults(32, &[]).unwrap()
    }

    #[test]
    fn test_two_register_forms_merge() {
        // ADD R0,R1 and ADD R0,R2 with the second operand encoded in the
        // low bits.
        let entries = vec![
            raw("ADD", &["R0", "R1"], 0b000000_00000_00001, 16, 0),
            raw("ADD", &["R0", "R2"], 0b000000_00000_00010, 16, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 1);
        let entry = &out[0];
        assert_eq!(entry.fields.len(), 1);
        match &entry.fields[0] {
            OperandField::Register { range, variants, .. } => {
                assert_eq!(*range, BitRange::new(14, 2));
                assert_eq!(
                    variants,
                    &vec![(1, "r1".to_string()), (2, "r2".to_string())]
                );
            }
            other => panic!("expected register field, got {:?}", other),
        }
        assert_eq!(entry.absorbed.len(), 2);
    }

    #[test]
    fn test_full_operand_matrix_merges() {
        // ADD Rx,Ry over x,y in 0..4, both operands 2-bit encoded.
        let mut entries = Vec::new();
        let mut ordinal = 0;
        for x in 0..4u64 {
            for y in 0..4u64 {
                entries.push(raw(
                    "ADD",
                    &[&format!("R{}", x), &format!("R{}", y)],
                    0b0000 << 4 | x << 2 | y,
                    8,
                    ordinal,
                ));
                ordinal += 1;
            }
        }
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 1);
        assert!(diags.is_empty());
        let entry = &out[0];
        assert_eq!(entry.fields.len(), 2);
        assert!(entry.fields.iter().all(|f| f.is_register()));
        assert_eq!(entry.absorbed.len(), 16);
        assert_eq!(entry.syntax(), "ADD Ra,Rb");
    }

    #[test]
    fn test_widening_extends_variant_values() {
        // r0..r3 occupy two bits; r4 forces a third.
        let mut entries: Vec<_> = (0..4u64)
            .map(|v| raw("JMP", &[&format!("R{}", v)], v, 8, v as usize))
            .collect();
        entries.push(raw("JMP", &["R4"], 0b100, 8, 4));
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 1);
        match &out[0].fields[0] {
            OperandField::Register { range, variants, .. } => {
                assert_eq!(*range, BitRange::new(5, 3));
                let values: Vec<u64> = variants.iter().map(|(v, _)| *v).collect();
                assert_eq!(values, vec![0, 1, 2, 3, 4]);
            }
            other => panic!("expected register field, got {:?}", other),
        }
    }

    #[test]
    fn test_bijection_violation_rejected() {
        // Same encoding value claimed by two register symbols: the merge
        // must fail with both originals retained.
        let entries = vec![
            raw("ADD", &["R0", "R1"], 0b0000_0001, 8, 0),
            raw("ADD", &["R0", "R2"], 0b0000_0001, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::AttachCollision);
    }

    #[test]
    fn test_unknown_register_not_merged() {
        let entries = vec![
            raw("ADD", &["QQ1"], 0b0000_0001, 8, 0),
            raw("ADD", &["QQ2"], 0b0000_0010, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_non_contiguous_rejected() {
        let entries = vec![
            raw("JMP", &["R0"], 0b0000_0000, 8, 0),
            raw("JMP", &["R9"], 0b1000_0001, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnresolvedRegister);
    }

    #[test]
    fn test_disjoint_clusters_stay_silent() {
        // Two MOV encodings with different opcode prefixes: each cluster
        // merges, the clusters stay apart, and nothing is reported since
        // no candidate merge failed.
        let entries = vec![
            raw("MOV", &["R1"], 0b0000_0001, 8, 0),
            raw("MOV", &["R2"], 0b0000_0010, 8, 1),
            raw("MOV", &["R1"], 0b1000_0001, 8, 2),
            raw("MOV", &["R2"], 0b1000_0010, 8, 3),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.fields.len() == 1));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_wide_field_rejected() {
        let zeros = InstructionEntry::raw(
            "JMP",
            vec!["R0".to_string()],
            BitPattern::new(vec![PatternBit::Zero; 20]),
            0,
        );
        let ones = InstructionEntry::raw(
            "JMP",
            vec!["R1".to_string()],
            BitPattern::new(vec![PatternBit::One; 20]),
            1,
        );
        let mut diags = Vec::new();
        let out = combine(vec![zeros, ones], &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnresolvedRegister);
        assert!(diags[0].message.contains("16 bits"));
    }

    #[test]
    fn test_operand_token_must_be_register() {
        // Mixed register and non-register tokens at the varying position
        // fall into different partitions and stay apart.
        let entries = vec![
            raw("PUSH", &["R1"], 0b0000_0001, 8, 0),
            raw("PUSH", &["11"], 0b0000_0011, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &catalog(), &mut diags);
        assert_eq!(out.len(), 2);
    }
}
