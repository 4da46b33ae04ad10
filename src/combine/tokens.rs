//! Pass 5: token and field layout derivation.
//!
//! The final instruction set is partitioned by total encoding width; one
//! token container is instantiated per width. Within a container every
//! distinct `(bit range, signedness, role)` used by any operand field is
//! declared exactly once and shared by all instructions referencing it.
//! Fixed bit positions stay literal here; only the serializer decides
//! how to constrain them.
//!
//! Field bit coordinates flip from the MSB-first pattern order to the
//! LSB-first numbering the specification language uses.

use crate::types::{
    Diagnostic, DiagnosticKind, FieldKey, FieldRole, InstructionEntry, OperandField, TokenTable,
};

/// Derive the token/field tables for the combined instruction set.
///
/// An operand field whose range falls outside its pattern's width is a
/// programmer-detectable inconsistency: fatal for that entry only, which
/// is dropped with a diagnostic while the run proceeds.
pub fn compute(
    entries: Vec<InstructionEntry>,
    diagnostics: &mut Vec<Diagnostic>,
) -> (TokenTable, Vec<InstructionEntry>) {
    let mut table = TokenTable::default();
    let mut kept = Vec::new();

    'entries: for entry in entries {
        let width = entry.width();
        for field in &entry.fields {
            if field.range().end() > width {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::FieldOutOfRange,
                    format!(
                        "'{}' has a field {} outside its {}-bit encoding",
                        entry.syntax(),
                        field.range(),
                        width
                    ),
                    vec![entry.ordinal],
                ));
                continue 'entries;
            }
        }

        table.ensure_width(width);
        for field in &entry.fields {
            let (key, name) = field_identity(field, width);
            table.declare(key, name);
        }
        kept.push(entry);
    }

    (table, kept)
}

/// Identity and canonical name of the token field backing an operand
/// field of a `width`-bit instruction.
///
/// Names embed the owning token width because field names live in one
/// global namespace in the emitted specification, shared across tokens.
pub fn field_identity(field: &OperandField, width: usize) -> (FieldKey, String) {
    let range = field.range();
    let low = width - range.end();
    let high = width - 1 - range.start;
    match field {
        OperandField::Immediate { signed, .. } => {
            let prefix = if *signed { "simm" } else { "imm" };
            (
                FieldKey {
                    width,
                    low,
                    high,
                    signed: *signed,
                    role: FieldRole::Immediate,
                },
                format!("{}{}_{}_{}", prefix, width, low, high),
            )
        }
        OperandField::Register { group, .. } => {
            let group = group.unwrap_or(0);
            (
                FieldKey {
                    width,
                    low,
                    high,
                    signed: false,
                    role: FieldRole::Register(group),
                },
                format!("reg{}_{}_{}_{}", width, low, high, group),
            )
        }
    }
}
