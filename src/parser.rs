//! Ingestion of the opcode listing.
//!
//! The input file is a newline-delimited enumeration of every concrete
//! opcode/operand encoding of the processor, one entry per line:
//!
//! ```text
//! # comment lines and blank lines are skipped
//! ADD R0,R1 | 000000 00000 00001
//! MOVI 0    | 0001_0000
//! ```
//!
//! The text left of the last `|` is the instruction: the first
//! whitespace-delimited word is the mnemonic, the remainder is split on
//! commas into operand tokens. The right side is the bit pattern;
//! spaces, tabs, and underscores inside it are cosmetic and stripped.
//! The stripped pattern length is the entry's total encoding width.
//!
//! This module performs a mechanical read only: no merging happens here.
//! Any malformed line is a fatal [`GeneratorError::Parse`] carrying the
//! 1-based line number.

use crate::error::{GeneratorError, Result};
use crate::types::{BitPattern, InstructionEntry, PatternBit};

/// Parse a complete listing into raw instruction entries.
///
/// Source ordinals are assigned in file order starting at 0, counting
/// only entry lines (comments and blanks do not consume ordinals).
pub fn parse_listing(input: &str) -> Result<Vec<InstructionEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entry = parse_line(trimmed, line_no + 1, entries.len())?;
        entries.push(entry);
    }
    tracing::info!(entries = entries.len(), "parsed opcode listing");
    Ok(entries)
}

/// Parse one entry line. `line_no` is 1-based for error reporting,
/// `ordinal` is the entry's source ordinal.
fn parse_line(line: &str, line_no: usize, ordinal: usize) -> Result<InstructionEntry> {
    let sep = line
        .rfind('|')
        .ok_or_else(|| GeneratorError::parse(line_no, "missing '|' separator"))?;
    let (text, bits_text) = line.split_at(sep);
    let bits_text = &bits_text[1..];

    let mut words = text.trim().splitn(2, char::is_whitespace);
    let mnemonic = words
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| GeneratorError::parse(line_no, "missing mnemonic"))?
        .to_string();
    let operands: Vec<String> = match words.next() {
        Some(rest) => rest
            .split(',')
            .map(|op| op.trim().to_string())
            .filter(|op| !op.is_empty())
            .collect(),
        None => Vec::new(),
    };

    let pattern = parse_pattern(bits_text, line_no)?;
    Ok(InstructionEntry::raw(mnemonic, operands, pattern, ordinal))
}

/// Parse the bit-pattern section of a line.
fn parse_pattern(text: &str, line_no: usize) -> Result<BitPattern> {
    let mut bits = Vec::new();
    for c in text.chars() {
        match c {
            '0' => bits.push(PatternBit::Zero),
            '1' => bits.push(PatternBit::One),
            ' ' | '\t' | '_' => {}
            other => {
                return Err(GeneratorError::parse(
                    line_no,
                    format!("invalid bit symbol '{}'", other),
                ));
            }
        }
    }
    if bits.is_empty() {
        return Err(GeneratorError::parse(line_no, "empty bit pattern"));
    }
    Ok(BitPattern::new(bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitRange;

    #[test]
    fn test_parse_basic_line() {
        let entries = parse_listing("ADD R0,R1 | 000000 00000 00001").unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.mnemonic, "ADD");
        assert_eq!(entry.operands.len(), 2);
        assert_eq!(entry.width(), 16);
        assert_eq!(entry.pattern.literal_value(BitRange::new(11, 5)), Some(1));
    }

    #[test]
    fn test_parse_no_operands() {
        let entries = parse_listing("NOP | 00000000").unwrap();
        assert_eq!(entries[0].mnemonic, "NOP");
        assert!(entries[0].operands.is_empty());
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let input = "# header\n\nNOP | 00000000\n  # tail\nRET | 00000001\n";
        let entries = parse_listing(input).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ordinal, 0);
        assert_eq!(entries[1].ordinal, 1);
    }

    #[test]
    fn test_underscore_separators() {
        let entries = parse_listing("MOVI 0 | 0001_0000").unwrap();
        assert_eq!(entries[0].width(), 8);
    }

    #[test]
    fn test_missing_separator() {
        let err = parse_listing("ADD R0,R1 00000000").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(err.to_string().contains("'|'"));
    }

    #[test]
    fn test_bad_bit_symbol() {
        let err = parse_listing("ADD R0 | 0000200").unwrap_err();
        assert!(err.to_string().contains("invalid bit symbol"));
    }

    #[test]
    fn test_empty_pattern() {
        let err = parse_listing("ADD R0 |   ").unwrap_err();
        assert!(err.to_string().contains("empty bit pattern"));
    }

    #[test]
    fn test_mixed_widths_allowed() {
        let input = "NOP | 00000000\nADD R0,R1 | 0000000000000001\n";
        let entries = parse_listing(input).unwrap();
        assert_eq!(entries[0].width(), 8);
        assert_eq!(entries[1].width(), 16);
    }
}
