//! Serialization of the generated model into a processor-module
//! directory.
//!
//! Renders the combined instruction set into the token-and-field based
//! specification language and the surrounding module files:
//!
//! ```text
//! <ProcessorName>/
//!   Module.manifest
//!   data/languages/
//!     <proc>.ldefs     language definition
//!     <proc>.pspec     processor spec
//!     <proc>.cspec     compiler spec
//!     <proc>.opinion   importer opinions
//!     <proc>.slaspec   instruction specification
//! ```
//!
//! The rendering layer is pure string building over the model; all
//! filesystem access is confined to [`write_module`].

use crate::combine::tokens::field_identity;
use crate::error::{GeneratorError, Result};
use crate::types::{
    FieldKey, FieldRole, GeneratedModel, InstructionEntry, Operand, PatternBit, TokenTable,
};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum example instructions quoted per constructor comment.
const MAX_EXAMPLES: usize = 3;

/// Write the complete module directory under `out_dir`.
///
/// Returns the path of the created module root.
pub fn write_module(model: &GeneratedModel, out_dir: &Path) -> Result<PathBuf> {
    let proc = file_stem(&model.options.processor_name);
    let root = out_dir.join(&model.options.processor_name);
    let languages = root.join("data").join("languages");
    fs::create_dir_all(&languages)
        .map_err(|e| GeneratorError::output(languages.display().to_string(), e.to_string()))?;

    let files = [
        (root.join("Module.manifest"), render_manifest(model)),
        (languages.join(format!("{}.ldefs", proc)), render_ldefs(model)),
        (languages.join(format!("{}.pspec", proc)), render_pspec()),
        (languages.join(format!("{}.cspec", proc)), render_cspec()),
        (
            languages.join(format!("{}.opinion", proc)),
            render_opinion(model),
        ),
        (
            languages.join(format!("{}.slaspec", proc)),
            render_slaspec(model),
        ),
    ];
    for (path, contents) in files {
        fs::write(&path, contents)
            .map_err(|e| GeneratorError::output(path.display().to_string(), e.to_string()))?;
    }

    tracing::info!(module = %root.display(), "processor module written");
    Ok(root)
}

/// Lowercased file stem used for the language files.
fn file_stem(processor_name: &str) -> String {
    processor_name.to_ascii_lowercase()
}

fn render_manifest(model: &GeneratedModel) -> String {
    format!(
        "MODULE NAME: {}\nMODULE FILE LICENSE: NONE\n",
        model.options.processor_name
    )
}

fn render_ldefs(model: &GeneratedModel) -> String {
    let opts = &model.options;
    let proc = file_stem(&opts.processor_name);
    let endian_tag = match opts.endianness {
        crate::types::Endianness::Big => "BE",
        crate::types::Endianness::Little => "LE",
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<language_definitions>
  <language processor="{name}"
            endian="{endian}"
            size="{bits}"
            variant="default"
            version="1.0"
            slafile="{proc}.sla"
            processorspec="{proc}.pspec"
            manualindexfile=""
            id="{name}:{tag}:{bits}:default">
    <description>{family} {name} processor module</description>
    <compiler name="default" spec="{proc}.cspec" id="default"/>
  </language>
</language_definitions>
"#,
        name = opts.processor_name,
        family = opts.processor_family,
        endian = opts.endianness,
        bits = opts.bitness,
        proc = proc,
        tag = endian_tag,
    )
}

fn render_pspec() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<processor_spec>
  <programcounter register="pc"/>
</processor_spec>
"#
    .to_string()
}

fn render_cspec() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<compiler_spec>
  <global>
    <range space="ram"/>
  </global>
  <stackpointer register="sp" space="ram"/>
  <default_proto>
    <prototype name="default" extrapop="0" stackshift="0">
      <input/>
      <output/>
    </prototype>
  </default_proto>
</compiler_spec>
"#
    .to_string()
}

fn render_opinion(model: &GeneratedModel) -> String {
    format!(
        r#"<opinions>
  <constraint loader="Binary Loader" compilerSpecID="default">
    <constraint primary="0" processor="{}" size="{}"/>
  </constraint>
</opinions>
"#,
        model.options.processor_name, model.options.bitness
    )
}

/// Render the `.slaspec` file.
pub fn render_slaspec(model: &GeneratedModel) -> String {
    let opts = &model.options;
    let mut out = String::new();

    let _ = writeln!(out, "# {} instruction specification", opts.processor_name);
    let _ = writeln!(out, "# generated from an enumerated opcode listing\n");
    let _ = writeln!(out, "define endian={};", opts.endianness);
    let _ = writeln!(out, "define alignment={};\n", opts.alignment);

    let addr_size = (opts.bitness / 8).max(1);
    let _ = writeln!(
        out,
        "define space ram type=ram_space size={} default;",
        addr_size
    );
    let _ = writeln!(out, "define space register type=register_space size=4;\n");

    let _ = writeln!(
        out,
        "define register offset=0 size={} [ {} ];\n",
        addr_size,
        referenced_registers(model).join(" ")
    );

    // The serializer owns the opcode fields that constrain literal runs;
    // they live in the same token containers as the operand fields.
    let tokens = tokens_with_opcode_fields(model);
    for token in &tokens.tokens {
        let _ = writeln!(out, "define token {} ({})", token.name, token.bits);
        for field in &token.fields {
            let signed = if field.signed { " signed" } else { "" };
            let _ = writeln!(
                out,
                "    {} = ({}, {}){}",
                field.name, field.low, field.high, signed
            );
        }
        let _ = writeln!(out, ";\n");
    }

    for group in &model.attach_groups {
        let fields = fields_for_group(&tokens, group.id);
        let _ = writeln!(
            out,
            "attach variables [ {} ] [ {} ];",
            fields.join(" "),
            attach_value_list(group.bits, &group.variants).join(" ")
        );
    }
    if !model.attach_groups.is_empty() {
        let _ = writeln!(out);
    }

    for entry in &model.instructions {
        if !opts.omit_opcodes {
            let _ = writeln!(out, "# {}", entry.pattern);
        }
        if !opts.omit_example_instructions {
            let examples: Vec<&str> = entry
                .absorbed
                .iter()
                .take(MAX_EXAMPLES)
                .map(|line| line.text.as_str())
                .collect();
            let more = entry.absorbed.len().saturating_sub(MAX_EXAMPLES);
            let suffix = if more > 0 {
                format!(" (+{} more)", more)
            } else {
                String::new()
            };
            let _ = writeln!(out, "# examples: {}{}", examples.join("; "), suffix);
        }
        let _ = writeln!(out, "{}\n", render_constructor(entry));
    }

    out
}

/// Catalog registers the emitted specification actually names: everything
/// bound by an attach group, plus the program counter and stack pointer
/// referenced by the processor and compiler specs.
fn referenced_registers(model: &GeneratedModel) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    names.insert("pc".to_string());
    names.insert("sp".to_string());
    for group in &model.attach_groups {
        for (_, name) in &group.variants {
            names.insert(name.clone());
        }
    }
    names.into_iter().collect()
}

/// Copy the model's token table and add one opcode field per maximal
/// literal run of every instruction, so constructors can constrain the
/// fixed bits.
fn tokens_with_opcode_fields(model: &GeneratedModel) -> TokenTable {
    let mut tokens = model.tokens.clone();
    for entry in &model.instructions {
        for (range, _) in literal_runs(entry) {
            let width = entry.width();
            let low = width - range.end();
            let high = width - 1 - range.start;
            let key = FieldKey {
                width,
                low,
                high,
                signed: false,
                role: FieldRole::Opcode,
            };
            tokens.declare(key, format!("op{}_{}_{}", width, low, high));
        }
    }
    tokens
}

/// Token-field names attached to a given group, in declaration order.
fn fields_for_group(tokens: &TokenTable, group: usize) -> Vec<String> {
    tokens
        .tokens
        .iter()
        .flat_map(|t| t.fields.iter())
        .filter(|f| f.role == FieldRole::Register(group))
        .map(|f| f.name.clone())
        .collect()
}

/// Value-indexed attach list: one symbol per possible encoding value,
/// with `_` for values no register maps to.
fn attach_value_list(bits: usize, variants: &[(u64, String)]) -> Vec<String> {
    // Register field widths are capped during combining; the domain
    // always fits a u64.
    let domain = 1u64 << bits.min(63);
    (0..domain)
        .map(|value| {
            variants
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| "_".to_string())
        })
        .collect()
}

/// Maximal runs of literal bits in an entry's pattern, with their values.
/// Runs longer than 64 bits split so every value fits a `u64`.
fn literal_runs(entry: &InstructionEntry) -> Vec<(crate::types::BitRange, u64)> {
    use crate::types::BitRange;
    let mut runs = Vec::new();
    let mut start = None;
    let mut value = 0u64;
    for pos in 0..=entry.width() {
        let literal = if pos < entry.width() {
            entry.pattern.bit(pos).literal()
        } else {
            None
        };
        match (start, literal) {
            (None, Some(bit)) => {
                start = Some(pos);
                value = bit;
            }
            (Some(s), Some(bit)) => {
                if pos - s == 64 {
                    runs.push((BitRange::new(s, 64), value));
                    start = Some(pos);
                    value = bit;
                } else {
                    value = (value << 1) | bit;
                }
            }
            (Some(s), None) => {
                runs.push((BitRange::new(s, pos - s), value));
                start = None;
            }
            (None, None) => {}
        }
    }
    runs
}

/// Render one constructor line.
fn render_constructor(entry: &InstructionEntry) -> String {
    let width = entry.width();

    let display: Vec<String> = entry
        .operands
        .iter()
        .map(|op| match op {
            Operand::Text(t) => t.clone(),
            Operand::Field(i) => field_identity(&entry.fields[*i], width).1,
        })
        .collect();

    let mut constraints: Vec<String> = Vec::new();
    for (range, value) in literal_runs(entry) {
        let low = width - range.end();
        let high = width - 1 - range.start;
        constraints.push(format!("op{}_{}_{}=0x{:x}", width, low, high, value));
    }
    // Every operand field symbol participates in the pattern section.
    let mut seen_fields: BTreeSet<usize> = BTreeSet::new();
    for pos in 0..width {
        if let PatternBit::Field(i) = entry.pattern.bit(pos) {
            if seen_fields.insert(i) {
                constraints.push(field_identity(&entry.fields[i], width).1);
            }
        }
    }
    let head = if display.is_empty() {
        format!(":{}", entry.mnemonic)
    } else {
        format!(":{} {}", entry.mnemonic, display.join(","))
    };
    format!("{} is {} {{ }}", head, constraints.join(" & "))
}
