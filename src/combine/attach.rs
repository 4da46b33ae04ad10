//! Pass 4: attach-group deduplication.
//!
//! Scans every register field across the combined instruction set and
//! assigns two fields the same attach group exactly when their
//! `(bit width, ordered value-to-symbol list)` are identical. Ids are
//! numbered in first-seen order over an ordinal-sorted traversal, so
//! output is reproducible across runs on identical input.

use crate::types::{AttachGroup, InstructionEntry, Operand, OperandField};
use std::collections::HashMap;

/// Deduplicate register-field mappings into shared attach groups and
/// stamp each field with its group id.
pub fn compute(entries: &mut [InstructionEntry]) -> Vec<AttachGroup> {
    let mut groups: Vec<AttachGroup> = Vec::new();
    let mut index: HashMap<(usize, Vec<(u64, String)>), usize> = HashMap::new();

    entries.sort_by_key(|e| e.ordinal);
    for entry in entries.iter_mut() {
        // Walk operands rather than the field list so traversal order is
        // the visible operand order.
        let field_indices: Vec<usize> = entry
            .operands
            .iter()
            .filter_map(|op| match op {
                Operand::Field(i) => Some(*i),
                Operand::Text(_) => None,
            })
            .collect();
        for i in field_indices {
            let OperandField::Register {
                range,
                variants,
                group,
            } = &mut entry.fields[i]
            else {
                continue;
            };
            let key = (range.len, variants.clone());
            let id = match index.get(&key) {
                Some(&id) => id,
                None => {
                    let id = groups.len();
                    groups.push(AttachGroup {
                        id,
                        bits: range.len,
                        variants: variants.clone(),
                    });
                    index.insert(key, id);
                    id
                }
            };
            *group = Some(id);
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BitPattern, BitRange};

    fn entry_with_reg_field(
        mnemonic: &str,
        range: BitRange,
        variants: Vec<(u64, String)>,
        ordinal: usize,
    ) -> InstructionEntry {
        let mut entry = InstructionEntry::raw(
            mnemonic,
            vec!["R0".to_string()],
            BitPattern::from_value(0, 8),
            ordinal,
        );
        entry.fields.push(OperandField::Register {
            range,
            variants,
            group: None,
        });
        entry.operands[0] = Operand::Field(0);
        entry.pattern.assign_field(range, 0);
        entry
    }

    fn variants() -> Vec<(u64, String)> {
        vec![(0, "r0".to_string()), (1, "r1".to_string())]
    }

    #[test]
    fn test_identical_mappings_share_group() {
        let mut entries = vec![
            entry_with_reg_field("ADD", BitRange::new(6, 2), variants(), 0),
            entry_with_reg_field("SUB", BitRange::new(6, 2), variants(), 1),
        ];
        let groups = compute(&mut entries);
        assert_eq!(groups.len(), 1);
        for entry in &entries {
            match &entry.fields[0] {
                OperandField::Register { group, .. } => assert_eq!(*group, Some(0)),
                other => panic!("expected register field, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_different_widths_get_distinct_groups() {
        // Same variant list at a different field width is a different
        // attach declaration.
        let mut entries = vec![
            entry_with_reg_field("ADD", BitRange::new(6, 2), variants(), 0),
            entry_with_reg_field("SUB", BitRange::new(5, 3), variants(), 1),
        ];
        let groups = compute(&mut entries);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_first_seen_order_is_by_ordinal() {
        let other = vec![(2, "r2".to_string()), (3, "r3".to_string())];
        let mut entries = vec![
            entry_with_reg_field("SUB", BitRange::new(6, 2), other.clone(), 7),
            entry_with_reg_field("ADD", BitRange::new(6, 2), variants(), 2),
        ];
        let groups = compute(&mut entries);
        assert_eq!(groups.len(), 2);
        // Ordinal 2 is traversed first, so its mapping takes id 0.
        assert_eq!(groups[0].variants, variants());
        assert_eq!(groups[1].variants, other);
    }

    #[test]
    fn test_group_name() {
        let group = AttachGroup {
            id: 3,
            bits: 2,
            variants: variants(),
        };
        assert_eq!(group.name(), "attach_3");
    }
}
