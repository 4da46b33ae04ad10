//! Core types for the processor module generator.
//!
//! This module defines the data model shared by the ingestion parser,
//! the combining engine, and the serializer: bit patterns, instruction
//! entries, operand fields, attach groups, tokens, run options, and the
//! structured diagnostics collected along the way.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Byte ordering (endianness) of the target processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Big-endian byte order.
    #[default]
    Big,
    /// Little-endian byte order.
    Little,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big => write!(f, "big"),
            Endianness::Little => write!(f, "little"),
        }
    }
}

/// A contiguous range of bit positions within a [`BitPattern`].
///
/// Positions are MSB-first: position 0 is the leftmost bit as written in
/// the input listing. `len` is always nonzero for a constructed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitRange {
    /// Index of the leftmost bit covered by the range.
    pub start: usize,
    /// Number of bits covered.
    pub len: usize,
}

impl BitRange {
    /// Create a new range.
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Exclusive end position.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Check whether `pos` falls inside the range.
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end()
    }

    /// Build the smallest contiguous range covering a set of positions,
    /// or `None` if the positions do not form one contiguous run.
    pub fn from_positions(positions: &[usize]) -> Option<Self> {
        let min = *positions.iter().min()?;
        let max = *positions.iter().max()?;
        let len = max - min + 1;
        if positions.len() == len {
            let mut sorted: Vec<usize> = positions.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() == len {
                return Some(Self::new(min, len));
            }
        }
        None
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end() - 1)
    }
}

/// One position of a bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternBit {
    /// Literal 0.
    Zero,
    /// Literal 1.
    One,
    /// Position owned by the operand field with the given index.
    Field(usize),
}

impl PatternBit {
    /// Literal value of the bit, if it is a literal.
    pub fn literal(&self) -> Option<u64> {
        match self {
            PatternBit::Zero => Some(0),
            PatternBit::One => Some(1),
            PatternBit::Field(_) => None,
        }
    }
}

/// Fixed-width bit-level encoding of an instruction entry.
///
/// The width is set at construction and never changes: combining only
/// reinterprets literal runs as field references, it never resizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitPattern {
    bits: Vec<PatternBit>,
}

impl BitPattern {
    /// Build a pattern from raw bits.
    pub fn new(bits: Vec<PatternBit>) -> Self {
        Self { bits }
    }

    /// Build an all-literal pattern from the low `width` bits of `value`,
    /// MSB first. Test and example helper.
    pub fn from_value(value: u64, width: usize) -> Self {
        let bits = (0..width)
            .map(|i| {
                if value >> (width - 1 - i) & 1 == 1 {
                    PatternBit::One
                } else {
                    PatternBit::Zero
                }
            })
            .collect();
        Self { bits }
    }

    /// Total encoding width in bits.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Bit at an MSB-first position.
    pub fn bit(&self, pos: usize) -> PatternBit {
        self.bits[pos]
    }

    /// Iterate over all positions.
    pub fn iter(&self) -> impl Iterator<Item = (usize, PatternBit)> + '_ {
        self.bits.iter().copied().enumerate()
    }

    /// True if no position references a field.
    pub fn is_fully_literal(&self) -> bool {
        self.bits.iter().all(|b| b.literal().is_some())
    }

    /// Interpret the literal bits covered by `range` as an unsigned
    /// value, MSB first. `None` if any covered position is a field
    /// reference, the range exceeds the width, or the value would not
    /// fit in 64 bits.
    pub fn literal_value(&self, range: BitRange) -> Option<u64> {
        if range.end() > self.width() || range.len > 64 {
            return None;
        }
        let mut value = 0u64;
        for pos in range.start..range.end() {
            value = (value << 1) | self.bits[pos].literal()?;
        }
        Some(value)
    }

    /// Rewrite every position in `range` as a reference to field `index`.
    pub fn assign_field(&mut self, range: BitRange, index: usize) {
        for pos in range.start..range.end() {
            self.bits[pos] = PatternBit::Field(index);
        }
    }

    /// Positions where the two patterns disagree. Field references count
    /// as disagreeing with everything, including other field references,
    /// so callers see every position that is not a matching literal.
    pub fn disagreements(&self, other: &BitPattern) -> Vec<usize> {
        debug_assert_eq!(self.width(), other.width());
        self.iter()
            .filter(|&(pos, bit)| match (bit.literal(), other.bits[pos].literal()) {
                (Some(a), Some(b)) => a != b,
                _ => true,
            })
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Check that both patterns carry identical literal bits everywhere
    /// outside `range`.
    pub fn literals_match_outside(&self, other: &BitPattern, range: BitRange) -> bool {
        if self.width() != other.width() {
            return false;
        }
        self.iter().all(|(pos, bit)| {
            range.contains(pos)
                || matches!(
                    (bit.literal(), other.bits[pos].literal()),
                    (Some(a), Some(b)) if a == b
                )
        })
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, bit) in self.iter() {
            match bit {
                PatternBit::Zero => write!(f, "0")?,
                PatternBit::One => write!(f, "1")?,
                PatternBit::Field(i) => {
                    // Field positions print as a..z keyed by field index.
                    let c = (b'a' + (i % 26) as u8) as char;
                    write!(f, "{}", c)?;
                }
            }
        }
        Ok(())
    }
}

/// One operand of an instruction's assembly syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Literal operand text as it appeared in the listing.
    Text(String),
    /// Placeholder for the operand field with the given index.
    Field(usize),
}

impl Operand {
    /// The literal text, if this operand is still literal.
    pub fn text(&self) -> Option<&str> {
        match self {
            Operand::Text(s) => Some(s),
            Operand::Field(_) => None,
        }
    }
}

/// A varying sub-range of a bit pattern produced by a combine pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandField {
    /// Generalized immediate value.
    Immediate {
        /// Covered bit range (MSB-first pattern coordinates).
        range: BitRange,
        /// True when the source syntax used negative literals.
        signed: bool,
    },
    /// Register selector; variants map encoding value to register name.
    Register {
        /// Covered bit range (MSB-first pattern coordinates).
        range: BitRange,
        /// `(encoding value, register name)` in encoding-value order.
        variants: Vec<(u64, String)>,
        /// Attach group id, assigned by the attach-group pass.
        group: Option<usize>,
    },
}

impl OperandField {
    /// The bit range covered by the field.
    pub fn range(&self) -> BitRange {
        match self {
            OperandField::Immediate { range, .. } | OperandField::Register { range, .. } => *range,
        }
    }

    /// True for register-selecting fields.
    pub fn is_register(&self) -> bool {
        matches!(self, OperandField::Register { .. })
    }

    /// Assembly placeholder for this field, used when rendering the
    /// generalized syntax. Register placeholders are lettered in operand
    /// order (`Ra`, `Rb`, ...); immediates render as `#imm<width>`.
    pub fn placeholder(&self, register_index: usize) -> String {
        match self {
            OperandField::Immediate { range, .. } => format!("#imm{}", range.len),
            OperandField::Register { .. } => {
                let c = (b'a' + (register_index % 26) as u8) as char;
                format!("R{}", c)
            }
        }
    }
}

/// One raw source line absorbed into a combined entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// Source ordinal (input file order, 0-based).
    pub ordinal: usize,
    /// The instruction text as written, e.g. `ADD R0,R1`.
    pub text: String,
    /// The raw bit pattern as written, e.g. `0000000000000001`.
    pub bits: String,
}

/// One concrete or generalized encoding of a processor instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionEntry {
    /// Instruction mnemonic.
    pub mnemonic: String,
    /// Operand syntax tokens.
    pub operands: Vec<Operand>,
    /// Bit-level encoding; fixed width across all passes.
    pub pattern: BitPattern,
    /// Operand fields introduced by combining; raw entries have none.
    pub fields: Vec<OperandField>,
    /// Lowest source ordinal among the raw lines this entry represents.
    pub ordinal: usize,
    /// Every raw line this entry covers, in ordinal order.
    pub absorbed: Vec<SourceLine>,
}

impl InstructionEntry {
    /// Create a raw (uncombined) entry from parsed input.
    pub fn raw(
        mnemonic: impl Into<String>,
        operands: Vec<String>,
        pattern: BitPattern,
        ordinal: usize,
    ) -> Self {
        let mnemonic = mnemonic.into();
        let text = if operands.is_empty() {
            mnemonic.clone()
        } else {
            format!("{} {}", mnemonic, operands.join(","))
        };
        let bits = pattern.to_string();
        Self {
            mnemonic,
            operands: operands.into_iter().map(Operand::Text).collect(),
            pattern,
            fields: Vec::new(),
            ordinal,
            absorbed: vec![SourceLine {
                ordinal,
                text,
                bits,
            }],
        }
    }

    /// Total encoding width in bits.
    pub fn width(&self) -> usize {
        self.pattern.width()
    }

    /// Render the (possibly generalized) assembly syntax.
    pub fn syntax(&self) -> String {
        if self.operands.is_empty() {
            return self.mnemonic.clone();
        }
        let mut registers_seen = 0;
        let rendered: Vec<String> = self
            .operands
            .iter()
            .map(|op| match op {
                Operand::Text(s) => s.clone(),
                Operand::Field(i) => {
                    let field = &self.fields[*i];
                    let placeholder = field.placeholder(registers_seen);
                    if field.is_register() {
                        registers_seen += 1;
                    }
                    placeholder
                }
            })
            .collect();
        format!("{} {}", self.mnemonic, rendered.join(","))
    }

    /// Merge another entry's absorbed lines into this one, keeping the
    /// lowest ordinal and ordinal-sorted coverage.
    pub fn absorb(&mut self, other: &InstructionEntry) {
        self.absorbed.extend(other.absorbed.iter().cloned());
        self.absorbed.sort_by_key(|line| line.ordinal);
        self.absorbed.dedup();
        self.ordinal = self.ordinal.min(other.ordinal);
    }
}

impl fmt::Display for InstructionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.syntax(), self.pattern)
    }
}

/// Deduplicated mapping from field-encoding value to register symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachGroup {
    /// Group id, numbered in first-seen order.
    pub id: usize,
    /// Width in bits of the fields bound to this group.
    pub bits: usize,
    /// `(encoding value, register name)` pairs, in encoding-value order.
    pub variants: Vec<(u64, String)>,
}

impl AttachGroup {
    /// Name used for the attach declaration in the emitted specification.
    pub fn name(&self) -> String {
        format!("attach_{}", self.id)
    }
}

/// Role of a token field, part of its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// Immediate operand field.
    Immediate,
    /// Register operand field bound to an attach group.
    Register(usize),
    /// Serializer-owned field constraining a literal opcode run.
    Opcode,
}

/// One field declaration within a token container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenField {
    /// Field name, unique within its token.
    pub name: String,
    /// Least-significant covered bit (LSB-first, as the specification
    /// language numbers bits).
    pub low: usize,
    /// Most-significant covered bit.
    pub high: usize,
    /// Declared signed.
    pub signed: bool,
    /// Field role.
    pub role: FieldRole,
}

/// A named bit container of fixed width from which fields are carved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token name (`tok16`, `tok32`, ...).
    pub name: String,
    /// Container width in bits.
    pub bits: usize,
    /// Declared fields.
    pub fields: Vec<TokenField>,
}

/// Identity of a token field for sharing lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    /// Owning token width.
    pub width: usize,
    /// LSB-first low bit.
    pub low: usize,
    /// LSB-first high bit.
    pub high: usize,
    /// Signedness.
    pub signed: bool,
    /// Role.
    pub role: FieldRole,
}

/// The full set of token declarations plus a sharing index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenTable {
    /// Token containers, one per distinct encoding width, in first-seen
    /// order.
    pub tokens: Vec<Token>,
    #[serde(skip)]
    index: HashMap<FieldKey, (usize, usize)>,
}

impl TokenTable {
    /// Look up the token holding fields of the given width.
    pub fn token_for_width(&self, width: usize) -> Option<&Token> {
        self.tokens.iter().find(|t| t.bits == width)
    }

    /// Find an already-declared field by identity.
    pub fn field(&self, key: FieldKey) -> Option<&TokenField> {
        let (tok, field) = *self.index.get(&key)?;
        Some(&self.tokens[tok].fields[field])
    }

    /// Make sure a token container exists for the given width, creating
    /// an empty one if needed. Returns the token name.
    pub fn ensure_width(&mut self, width: usize) -> String {
        if let Some(token) = self.token_for_width(width) {
            return token.name.clone();
        }
        let token = Token {
            name: format!("tok{}", width),
            bits: width,
            fields: Vec::new(),
        };
        let name = token.name.clone();
        self.tokens.push(token);
        name
    }

    /// Declare a field, sharing any existing declaration with the same
    /// identity. Returns the field name.
    pub fn declare(&mut self, key: FieldKey, name: impl Into<String>) -> String {
        if let Some(existing) = self.field(key) {
            return existing.name.clone();
        }
        let tok = match self.tokens.iter().position(|t| t.bits == key.width) {
            Some(i) => i,
            None => {
                self.tokens.push(Token {
                    name: format!("tok{}", key.width),
                    bits: key.width,
                    fields: Vec::new(),
                });
                self.tokens.len() - 1
            }
        };
        let name = name.into();
        self.tokens[tok].fields.push(TokenField {
            name: name.clone(),
            low: key.low,
            high: key.high,
            signed: key.signed,
            role: key.role,
        });
        self.index.insert(key, (tok, self.tokens[tok].fields.len() - 1));
        name
    }

    /// Total number of declared fields across all tokens.
    pub fn field_count(&self) -> usize {
        self.tokens.iter().map(|t| t.fields.len()).sum()
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Informational.
    Info,
    /// A combine candidate was refused; the run still produces output.
    Warning,
}

/// What kind of combine conflict or inconsistency was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Identical bit pattern under two different mnemonics.
    AmbiguousEncoding,
    /// Immediate candidates whose varying bits are not one contiguous
    /// range, or whose values collide.
    UnresolvedImmediate,
    /// Register candidates that failed catalog lookup or contiguity.
    UnresolvedRegister,
    /// A candidate value-to-register mapping that is not a bijection.
    AttachCollision,
    /// An operand field whose range falls outside its pattern width.
    FieldOutOfRange,
}

/// A recoverable conflict recorded while combining.
///
/// Diagnostics never remove entries: the affected entries are retained
/// unmerged and the run proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub level: DiagnosticLevel,
    /// Conflict kind.
    pub kind: DiagnosticKind,
    /// Human-readable description.
    pub message: String,
    /// Source ordinals of the entries involved.
    pub ordinals: Vec<usize>,
}

impl Diagnostic {
    /// Create a warning diagnostic.
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>, ordinals: Vec<usize>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            kind,
            message: message.into(),
            ordinals,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Run configuration consumed by the engine as plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorOptions {
    /// Target processor name.
    pub processor_name: String,
    /// Target processor family name.
    pub processor_family: String,
    /// Processor endianness.
    pub endianness: Endianness,
    /// Instruction alignment in bytes.
    pub alignment: u32,
    /// Processor bitness.
    pub bitness: u32,
    /// Suppress raw opcode comments in the emitted specification.
    pub omit_opcodes: bool,
    /// Suppress example-instruction comments in the emitted specification.
    pub omit_example_instructions: bool,
    /// Bypass the three combine passes.
    pub skip_combining: bool,
    /// Stop after catalog construction and report the resolved registers.
    pub print_registers_only: bool,
    /// Caller-supplied register names merged into the baseline catalog.
    pub additional_registers: Vec<String>,
}

impl GeneratorOptions {
    /// Options with the documented defaults.
    pub fn new() -> Self {
        Self {
            processor_name: "MyProc".to_string(),
            processor_family: "MyProcFamily".to_string(),
            endianness: Endianness::Big,
            alignment: 1,
            bitness: 32,
            omit_opcodes: false,
            omit_example_instructions: false,
            skip_combining: false,
            print_registers_only: false,
            additional_registers: Vec::new(),
        }
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry counts observed at each pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageCounts {
    /// Raw entries handed to the engine.
    pub raw: usize,
    /// Entries after duplicate elimination.
    pub after_duplicates: usize,
    /// Entries after immediate generalization.
    pub after_immediates: usize,
    /// Entries after register generalization.
    pub after_registers: usize,
}

/// The final combined model handed to the serializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedModel {
    /// Combined instruction entries, ordinal order.
    pub instructions: Vec<InstructionEntry>,
    /// Deduplicated attach groups, id order.
    pub attach_groups: Vec<AttachGroup>,
    /// Token and field declarations.
    pub tokens: TokenTable,
    /// Conflicts recorded while combining.
    pub diagnostics: Vec<Diagnostic>,
    /// Per-stage entry counts.
    pub counts: StageCounts,
    /// Run configuration echo.
    pub options: GeneratorOptions,
}
