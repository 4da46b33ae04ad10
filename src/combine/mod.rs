//! The instruction combining engine.
//!
//! A strict five-stage pipeline over the parsed entry list:
//!
//! 1. [`duplicates`] collapses exact duplicates.
//! 2. [`immediates`] generalizes literal-value enumerations into
//!    immediate fields.
//! 3. [`registers`] generalizes register enumerations into
//!    register-bound fields.
//! 4. [`attach`] deduplicates identical value-to-register mappings into
//!    shared attach groups.
//! 5. [`tokens`] derives the minimal token/field declarations.
//!
//! Each stage consumes the previous stage's complete output; later
//! stages rely on invariants established earlier (the register pass
//! assumes duplicates are gone). A stage may refuse to merge, recorded
//! as a [`Diagnostic`], but never drops an entry as a side effect of
//! refusing.

pub mod attach;
pub mod duplicates;
pub mod immediates;
pub mod registers;
pub mod tokens;

use crate::catalog::RegisterCatalog;
use crate::types::{
    Diagnostic, GeneratedModel, GeneratorOptions, InstructionEntry, OperandField, StageCounts,
};

/// Run the full pipeline and produce the final combined model.
pub fn run(
    entries: Vec<InstructionEntry>,
    catalog: &RegisterCatalog,
    options: &GeneratorOptions,
) -> GeneratedModel {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut counts = StageCounts {
        raw: entries.len(),
        ..StageCounts::default()
    };

    let mut entries = entries;
    if options.skip_combining {
        tracing::info!("instruction combining skipped by configuration");
        counts.after_duplicates = entries.len();
        counts.after_immediates = entries.len();
        counts.after_registers = entries.len();
    } else {
        entries = duplicates::combine(entries, &mut diagnostics);
        counts.after_duplicates = entries.len();
        tracing::info!(entries = entries.len(), "duplicate pass complete");

        entries = immediates::combine(entries, &mut diagnostics);
        counts.after_immediates = entries.len();
        tracing::info!(entries = entries.len(), "immediate pass complete");

        entries = registers::combine(entries, catalog, &mut diagnostics);
        counts.after_registers = entries.len();
        tracing::info!(entries = entries.len(), "register pass complete");
    }

    let attach_groups = attach::compute(&mut entries);
    tracing::info!(groups = attach_groups.len(), "attach groups computed");

    let (tokens, entries) = tokens::compute(entries, &mut diagnostics);
    tracing::info!(
        tokens = tokens.tokens.len(),
        fields = tokens.field_count(),
        "token layout computed"
    );

    GeneratedModel {
        instructions: entries,
        attach_groups,
        tokens,
        diagnostics,
        counts,
        options: options.clone(),
    }
}

/// Whether two operand fields are interchangeable for diffing purposes.
///
/// Attach-group ids are ignored: they are assigned after the combine
/// passes finish.
pub(crate) fn fields_equivalent(a: &OperandField, b: &OperandField) -> bool {
    match (a, b) {
        (
            OperandField::Immediate { range: ra, signed: sa },
            OperandField::Immediate { range: rb, signed: sb },
        ) => ra == rb && sa == sb,
        (
            OperandField::Register {
                range: ra,
                variants: va,
                ..
            },
            OperandField::Register {
                range: rb,
                variants: vb,
                ..
            },
        ) => ra == rb && va == vb,
        _ => false,
    }
}

/// Bit positions where two entries genuinely disagree.
///
/// Literal-vs-literal positions agree when equal; field-vs-field
/// positions agree when the referenced fields are equivalent. Everything
/// else disagrees.
pub(crate) fn entry_diff(a: &InstructionEntry, b: &InstructionEntry) -> Vec<usize> {
    debug_assert_eq!(a.width(), b.width());
    use crate::types::PatternBit;
    (0..a.width())
        .filter(|&pos| match (a.pattern.bit(pos), b.pattern.bit(pos)) {
            (PatternBit::Field(i), PatternBit::Field(j)) => {
                !fields_equivalent(&a.fields[i], &b.fields[j])
            }
            (x, y) => x.literal() != y.literal(),
        })
        .collect()
}

/// Operand positions where two entries differ, per [`fields_equivalent`]
/// for field placeholders.
pub(crate) fn operand_diff(a: &InstructionEntry, b: &InstructionEntry) -> Vec<usize> {
    use crate::types::Operand;
    debug_assert_eq!(a.operands.len(), b.operands.len());
    (0..a.operands.len())
        .filter(|&idx| match (&a.operands[idx], &b.operands[idx]) {
            (Operand::Text(x), Operand::Text(y)) => x != y,
            (Operand::Field(i), Operand::Field(j)) => {
                !fields_equivalent(&a.fields[*i], &b.fields[*j])
            }
            _ => true,
        })
        .collect()
}

/// Operand position that references field `field_idx`, if any.
pub(crate) fn owner_operand(entry: &InstructionEntry, field_idx: usize) -> Option<usize> {
    use crate::types::Operand;
    entry
        .operands
        .iter()
        .position(|op| matches!(op, Operand::Field(i) if *i == field_idx))
}
