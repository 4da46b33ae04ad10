//! Pass 2: immediate generalization.
//!
//! Entries that differ only in a literal value occupying one contiguous
//! bit range collapse into a single entry whose range becomes an
//! immediate field. Full domain coverage is deliberately not required:
//! the field's legal domain is governed by its width, not by how many
//! literal values were observed in the listing. Every absorbed line
//! must keep a distinct encoding value on the range; a collision means
//! contradictory source data and rejects the merge.
//!
//! Candidates are partitioned by a derived key (mnemonic, encoding
//! width, operand shape with numeric tokens masked) and merged pairwise
//! to a fixpoint inside each partition. The fixpoint handles several
//! disjoint immediate clusters sharing one mnemonic; correctness never
//! depends on input file ordering.

use super::{entry_diff, operand_diff, owner_operand};
use crate::types::{
    BitRange, Diagnostic, DiagnosticKind, InstructionEntry, Operand, OperandField, SourceLine,
};
use std::collections::HashMap;

/// Widest immediate field the engine will form; wider candidate ranges
/// cannot carry their values in the model and are rejected.
const MAX_FIELD_BITS: usize = 64;

/// Generalize literal-value enumerations into immediate fields.
pub fn combine(
    entries: Vec<InstructionEntry>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<InstructionEntry> {
    let mut partitions: HashMap<ShapeKey, Vec<InstructionEntry>> = HashMap::new();
    for entry in entries {
        partitions.entry(shape_key(&entry)).or_default().push(entry);
    }

    let mut out = Vec::new();
    let mut keys: Vec<ShapeKey> = partitions.keys().cloned().collect();
    keys.sort_by_key(|k| partitions[k].iter().map(|e| e.ordinal).min().unwrap_or(0));

    for key in keys {
        let mut items = partitions.remove(&key).unwrap_or_default();
        items.sort_by_key(|e| e.ordinal);
        merge_to_fixpoint(&mut items);
        items.sort_by_key(|e| e.ordinal);

        // Rejected candidates are reported once, after the fixpoint
        // settles; pairs that were never candidates stay silent.
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if let MergeOutcome::Rejected(message) = try_merge(&items[i], &items[j]) {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::UnresolvedImmediate,
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
    /// Numeric literal or an already-generalized immediate field.
    Number,
    /// Anything else, kept verbatim.
    Other(String),
}

type ShapeKey = (String, usize, Vec<ShapeToken>);

fn shape_key(entry: &InstructionEntry) -> ShapeKey {
    let shape = entry
        .operands
        .iter()
        .map(|op| match op {
            Operand::Text(t) if parse_int_token(t).is_some() => ShapeToken::Number,
            Operand::Text(t) => ShapeToken::Other(t.clone()),
            Operand::Field(i) => match entry.fields[*i] {
                OperandField::Immediate { .. } => ShapeToken::Number,
                OperandField::Register { .. } => ShapeToken::Other(format!("<reg{}>", i)),
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
    Rejected(String),
}

fn merge_to_fixpoint(items: &mut Vec<InstructionEntry>) {
    let mut merged_any = true;
    while merged_any {
        merged_any = false;
        'scan: for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if let MergeOutcome::Merged(merged) = try_merge(&items[i], &items[j]) {
                    items[i] = merged;
                    items.remove(j);
                    merged_any = true;
                    break 'scan;
                }
            }
        }
    }
}

/// Attempt to merge two entries over one numeric operand.
fn try_merge(a: &InstructionEntry, b: &InstructionEntry) -> MergeOutcome {
    let vary = operand_diff(a, b);

    // Fully equivalent entries can arise when two merge paths converge;
    // fold one into the other, provided their absorbed lines do not
    // claim any shared encoding value under different text.
    if vary.is_empty() {
        if !entry_diff(a, b).is_empty() {
            return MergeOutcome::Incompatible;
        }
        for field in &a.fields {
            if let OperandField::Immediate { range, .. } = field {
                if let Some(message) = value_collision(a, b, *range) {
                    return MergeOutcome::Rejected(message);
                }
            }
        }
        let mut merged = a.clone();
        merged.absorb(b);
        return MergeOutcome::Merged(merged);
    }

    if vary.len() != 1 {
        return MergeOutcome::Incompatible;
    }
    let p = vary[0];
    if !immediate_like(a, p) || !immediate_like(b, p) {
        return MergeOutcome::Incompatible;
    }

    let diff = entry_diff(a, b);
    if diff.is_empty() {
        // Identical encoding claimed by two different operand literals.
        return MergeOutcome::Rejected(format!(
            "'{}' and '{}' share one encoding",
            a.syntax(),
            b.syntax()
        ));
    }
    let Some(range) = BitRange::from_positions(&diff) else {
        return MergeOutcome::Rejected(format!(
            "'{}' and '{}' differ on a non-contiguous bit range",
            a.syntax(),
            b.syntax()
        ));
    };
    if range.len > MAX_FIELD_BITS {
        return MergeOutcome::Rejected(format!(
            "immediate field of '{}' would exceed {} bits",
            a.mnemonic, MAX_FIELD_BITS
        ));
    }

    if overlaps_foreign_field(a, p, range) || overlaps_foreign_field(b, p, range) {
        return MergeOutcome::Incompatible;
    }
    if let Some(message) = value_collision(a, b, range) {
        return MergeOutcome::Rejected(message);
    }

    let signed = operand_signed(a, p) || operand_signed(b, p);

    let (base, other) = if a.ordinal <= b.ordinal { (a, b) } else { (b, a) };
    let mut merged = base.clone();
    let field_idx = match merged.operands[p] {
        Operand::Field(i) => {
            merged.fields[i] = OperandField::Immediate { range, signed };
            i
        }
        Operand::Text(_) => {
            merged.fields.push(OperandField::Immediate { range, signed });
            let i = merged.fields.len() - 1;
            merged.operands[p] = Operand::Field(i);
            i
        }
    };
    merged.pattern.assign_field(range, field_idx);
    merged.absorb(other);
    MergeOutcome::Merged(merged)
}

/// Whether operand `p` can carry an immediate field.
fn immediate_like(entry: &InstructionEntry, p: usize) -> bool {
    match &entry.operands[p] {
        Operand::Text(t) => parse_int_token(t).is_some(),
        Operand::Field(i) => matches!(entry.fields[*i], OperandField::Immediate { .. }),
    }
}

/// Whether operand `p` contributes a negative literal or signed field.
fn operand_signed(entry: &InstructionEntry, p: usize) -> bool {
    match &entry.operands[p] {
        Operand::Text(t) => parse_int_token(t).is_some_and(|v| v < 0),
        Operand::Field(i) => matches!(entry.fields[*i], OperandField::Immediate { signed: true, .. }),
    }
}

/// True when `range` touches a field owned by some operand other than `p`.
fn overlaps_foreign_field(entry: &InstructionEntry, p: usize, range: BitRange) -> bool {
    use crate::types::PatternBit;
    (range.start..range.end()).any(|pos| match entry.pattern.bit(pos) {
        PatternBit::Field(i) => owner_operand(entry, i) != Some(p),
        _ => false,
    })
}

/// Detect two different source instructions claiming one encoding value
/// on `range`, using the raw bits recorded for every absorbed line.
///
/// Exact repeats of one line (same text, same value) are not collisions;
/// the duplicate pass already folds those.
fn value_collision(a: &InstructionEntry, b: &InstructionEntry, range: BitRange) -> Option<String> {
    let mut pairs: Vec<(u64, &str)> = Vec::new();
    for line in a.absorbed.iter().chain(b.absorbed.iter()) {
        if let Some(value) = line_value(line, range) {
            pairs.push((value, line.text.as_str()));
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    for w in pairs.windows(2) {
        if w[0].0 == w[1].0 {
            return Some(format!(
                "'{}' and '{}' share encoding value {} on the candidate range",
                w[0].1, w[1].1, w[0].0
            ));
        }
    }
    None
}

/// Encoding value an absorbed line carries on `range`.
fn line_value(line: &SourceLine, range: BitRange) -> Option<u64> {
    let bits = line.bits.as_bytes();
    if range.end() > bits.len() || range.len > 64 {
        return None;
    }
    let mut value = 0u64;
    for &c in &bits[range.start..range.end()] {
        value = (value << 1)
            | match c {
                b'0' => 0,
                b'1' => 1,
                _ => return None,
            };
    }
    Some(value)
}

/// Parse an operand token as an integer literal: optional `#` prefix,
/// optional sign, decimal, `0x` hex, or `0b` binary.
pub(crate) fn parse_int_token(token: &str) -> Option<i64> {
    let t = token.strip_prefix('#').unwrap_or(token);
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    if t.is_empty() {
        return None;
    }
    let value = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else if t.bytes().all(|c| c.is_ascii_digit()) {
        t.parse().ok()?
    } else {
        return None;
    };
    Some(if neg { -value } else { value })
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

    #[test]
    fn test_parse_int_token() {
        assert_eq!(parse_int_token("15"), Some(15));
        assert_eq!(parse_int_token("#15"), Some(15));
        assert_eq!(parse_int_token("-4"), Some(-4));
        assert_eq!(parse_int_token("0x1F"), Some(31));
        assert_eq!(parse_int_token("0b101"), Some(5));
        assert_eq!(parse_int_token("R0"), None);
        assert_eq!(parse_int_token(""), None);
    }

    #[test]
    fn test_movi_full_domain() {
        // MOVI 0..15 over patterns 00010000..00011111.
        let entries: Vec<_> = (0..16u64)
            .map(|v| raw("MOVI", &[&v.to_string()], 0b0001_0000 | v, 8, v as usize))
            .collect();
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 1);
        assert!(diags.is_empty());
        let entry = &out[0];
        assert_eq!(entry.fields.len(), 1);
        match &entry.fields[0] {
            OperandField::Immediate { range, signed } => {
                assert_eq!(*range, BitRange::new(4, 4));
                assert!(!signed);
            }
            other => panic!("expected immediate field, got {:?}", other),
        }
        assert_eq!(entry.syntax(), "MOVI #imm4");
        assert_eq!(entry.absorbed.len(), 16);
    }

    #[test]
    fn test_partial_domain_still_merges() {
        // Three of four possible 2-bit values; generalization is governed
        // by width, not observed coverage.
        let entries = vec![
            raw("SETC", &["0"], 0b1100_0000, 8, 0),
            raw("SETC", &["1"], 0b1100_0001, 8, 1),
            raw("SETC", &["2"], 0b1100_0010, 8, 2),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 1);
        match &out[0].fields[0] {
            OperandField::Immediate { range, .. } => assert_eq!(range.len, 2),
            other => panic!("expected immediate field, got {:?}", other),
        }
    }

    #[test]
    fn test_non_contiguous_rejected() {
        // Varying bits 0 and 7 cannot form one immediate field.
        let entries = vec![
            raw("TGL", &["0"], 0b0000_0000, 8, 0),
            raw("TGL", &["1"], 0b1000_0001, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnresolvedImmediate);
    }

    #[test]
    fn test_value_collision_not_absorbed() {
        // The third line re-uses an encoding already claimed by the
        // second; it must stay out of the merged entry and be reported.
        let entries = vec![
            raw("MOVI", &["0"], 0b0001_0000, 8, 0),
            raw("MOVI", &["1"], 0b0001_0001, 8, 1),
            raw("MOVI", &["17"], 0b0001_0001, 8, 2),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 2);
        let merged = &out[0];
        let ordinals: Vec<usize> = merged.absorbed.iter().map(|l| l.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
        assert_eq!(out[1].ordinal, 2);
        assert!(out[1].fields.is_empty());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnresolvedImmediate);
        assert!(diags[0].message.contains("share encoding value 1"));
    }

    #[test]
    fn test_identical_encoding_different_literals_rejected() {
        let entries = vec![
            raw("MOVI", &["3"], 0b0001_0000, 8, 0),
            raw("MOVI", &["4"], 0b0001_0000, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnresolvedImmediate);
    }

    #[test]
    fn test_duplicate_pass_repeats_do_not_collide() {
        // A line the duplicate pass folded appears twice in `absorbed`
        // with one text and one value; that is not a collision.
        let mut repeated = raw("MOVI", &["1"], 0b0001_0001, 8, 1);
        repeated.absorb(&raw("MOVI", &["1"], 0b0001_0001, 8, 3));
        let entries = vec![raw("MOVI", &["0"], 0b0001_0000, 8, 0), repeated];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_wide_field_rejected() {
        use crate::types::PatternBit;
        let zeros = InstructionEntry::raw(
            "LDI",
            vec!["0".to_string()],
            BitPattern::new(vec![PatternBit::Zero; 70]),
            0,
        );
        let ones = InstructionEntry::raw(
            "LDI",
            vec!["1".to_string()],
            BitPattern::new(vec![PatternBit::One; 70]),
            1,
        );
        let mut diags = Vec::new();
        let out = combine(vec![zeros, ones], &mut diags);
        assert_eq!(out.len(), 2);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("64 bits"));
    }

    #[test]
    fn test_disjoint_clusters_merge_separately() {
        // Two MOVI encodings with different opcode prefixes: each cluster
        // merges, the clusters stay apart, and nothing is reported since
        // no candidate merge failed.
        let mut entries = Vec::new();
        for v in 0..4u64 {
            entries.push(raw("MOVI", &[&v.to_string()], 0b0001_0000 | v, 8, v as usize));
        }
        for v in 0..4u64 {
            entries.push(raw(
                "MOVI",
                &[&(v + 16).to_string()],
                0b1001_0000 | v,
                8,
                4 + v as usize,
            ));
        }
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.fields.len() == 1));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_register_operands_untouched() {
        let entries = vec![
            raw("ADD", &["R0", "R1"], 0b0000_0001, 8, 0),
            raw("ADD", &["R0", "R2"], 0b0000_0010, 8, 1),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 2);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_signedness_from_negative_literal() {
        let entries = vec![
            raw("BR", &["-1"], 0b0111_0011, 8, 0),
            raw("BR", &["-2"], 0b0111_0010, 8, 1),
            raw("BR", &["1"], 0b0111_0001, 8, 2),
        ];
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert_eq!(out.len(), 1);
        match &out[0].fields[0] {
            OperandField::Immediate { signed, .. } => assert!(signed),
            other => panic!("expected immediate field, got {:?}", other),
        }
    }

    #[test]
    fn test_monotonic_reduction() {
        let entries: Vec<_> = (0..8u64)
            .map(|v| raw("MOVI", &[&v.to_string()], 0b0001_0000 | v, 8, v as usize))
            .collect();
        let input_len = entries.len();
        let mut diags = Vec::new();
        let out = combine(entries, &mut diags);
        assert!(out.len() <= input_len);
    }
}
