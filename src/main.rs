//! Processor Module Generator CLI
//!
//! Command-line tool that turns an enumerated opcode listing into a
//! disassembler processor module.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use procmodgen::{generate_from_file, output, Endianness, GeneratedModel, GeneratorOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// Processor module generator.
///
/// Reads a listing of concrete instruction encodings, combines them
/// into a generalized token-and-field model, and writes a complete
/// processor module directory.
#[derive(Parser, Debug)]
#[command(name = "procmodgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input opcode listing
    #[arg(short = 'i', long = "input-file")]
    input: PathBuf,

    /// Processor name
    #[arg(short = 'n', long = "processor-name", default_value = "MyProc")]
    name: String,

    /// Processor family name
    #[arg(short = 'f', long = "processor-family", default_value = "MyProcFamily")]
    family: String,

    /// Processor endianness
    #[arg(short, long, default_value = "big")]
    endian: Endian,

    /// Instruction alignment in bytes
    #[arg(short, long, default_value = "1")]
    alignment: u32,

    /// Processor bitness
    #[arg(short, long, default_value = "32")]
    bitness: u32,

    /// Extra register names beyond the baseline catalog
    #[arg(long, value_delimiter = ',')]
    additional_registers: Vec<String>,

    /// Print the resolved register catalog and exit
    #[arg(long)]
    print_registers_only: bool,

    /// Leave opcode comments out of the emitted specification
    #[arg(long)]
    omit_opcodes: bool,

    /// Leave example-instruction comments out of the emitted specification
    #[arg(long)]
    omit_example_instructions: bool,

    /// Bypass instruction combining and emit one constructor per input line
    #[arg(long)]
    skip_instruction_combining: bool,

    /// Directory the module is written under
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Report format
    #[arg(long, default_value = "human")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Report format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable run report
    Human,
    /// JSON run report
    Json,
}

/// Endianness options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Endian {
    /// Big-endian byte order
    Big,
    /// Little-endian byte order
    Little,
}

impl From<Endian> for Endianness {
    fn from(e: Endian) -> Self {
        match e {
            Endian::Big => Endianness::Big,
            Endian::Little => Endianness::Little,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("procmodgen=debug")
            .init();
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn options_from(args: &Args) -> GeneratorOptions {
    GeneratorOptions {
        processor_name: args.name.clone(),
        processor_family: args.family.clone(),
        endianness: args.endian.into(),
        alignment: args.alignment,
        bitness: args.bitness,
        omit_opcodes: args.omit_opcodes,
        omit_example_instructions: args.omit_example_instructions,
        skip_combining: args.skip_instruction_combining,
        print_registers_only: args.print_registers_only,
        additional_registers: args.additional_registers.clone(),
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let options = options_from(args);

    if options.print_registers_only {
        print_registers(&options)?;
        return Ok(());
    }

    let model = generate_from_file(&args.input, &options)
        .with_context(|| format!("failed to process {}", args.input.display()))?;

    let root = output::write_module(&model, &args.output_dir)
        .with_context(|| format!("failed to write module under {}", args.output_dir.display()))?;

    match args.format {
        OutputFormat::Human => print_human(&model, &root),
        OutputFormat::Json => print_json(&model, &root)?,
    }

    Ok(())
}

fn print_registers(options: &GeneratorOptions) -> anyhow::Result<()> {
    let registers = procmodgen::resolved_registers(options)?;
    println!("Resolved registers ({}):", registers.len());
    for register in registers {
        println!("  {} ({}-bit)", register.name, register.bits);
    }
    Ok(())
}

fn print_human(model: &GeneratedModel, root: &std::path::Path) {
    let counts = &model.counts;
    println!("Processor:    {}", model.options.processor_name);
    println!(
        "Entries:      {} raw -> {} deduplicated -> {} after immediates -> {} combined",
        counts.raw, counts.after_duplicates, counts.after_immediates, counts.after_registers
    );
    println!("Attach sets:  {}", model.attach_groups.len());
    println!(
        "Tokens:       {} ({} fields)",
        model.tokens.tokens.len(),
        model.tokens.field_count()
    );
    println!();

    for entry in &model.instructions {
        println!("  {}", entry);
    }

    if !model.diagnostics.is_empty() {
        println!();
        for diag in &model.diagnostics {
            eprintln!("{}", diag);
        }
    }

    println!();
    println!("Module written to {}", root.display());
}

fn print_json(model: &GeneratedModel, root: &std::path::Path) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct JsonReport<'a> {
        module_path: String,
        #[serde(flatten)]
        model: &'a GeneratedModel,
    }

    let report = JsonReport {
        module_path: root.display().to_string(),
        model,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["procmodgen", "-i", "listing.txt"]).unwrap();
        assert_eq!(args.input, PathBuf::from("listing.txt"));
        assert_eq!(args.name, "MyProc");
        assert_eq!(args.bitness, 32);
        assert!(!args.verbose);
    }

    #[test]
    fn test_endian_option() {
        let args =
            Args::try_parse_from(["procmodgen", "-i", "l.txt", "-e", "little"]).unwrap();
        assert!(matches!(args.endian, Endian::Little));
    }

    #[test]
    fn test_additional_registers_split() {
        let args = Args::try_parse_from([
            "procmodgen",
            "-i",
            "l.txt",
            "--additional-registers",
            "ctr,xer",
        ])
        .unwrap();
        assert_eq!(args.additional_registers, vec!["ctr", "xer"]);
    }

    #[test]
    fn test_format_option() {
        let args =
            Args::try_parse_from(["procmodgen", "-i", "l.txt", "--format", "json"]).unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
    }

    #[test]
    fn test_input_required() {
        assert!(Args::try_parse_from(["procmodgen"]).is_err());
    }
}
