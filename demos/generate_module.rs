//! Minimal end-to-end demo: combine a small listing and print the
//! resulting instruction model and specification text.
//!
//! ```bash
//! cargo run --example generate_module
//! ```

use procmodgen::{generate, output, GeneratorOptions};

const LISTING: &str = "\
# 8-bit demo processor
NOP | 0000 0000
MOVI 0 | 0001 0000
MOVI 1 | 0001 0001
MOVI 2 | 0001 0010
MOVI 3 | 0001 0011
INC R0 | 0010 0000
INC R1 | 0010 0001
INC R2 | 0010 0010
INC R3 | 0010 0011
";

fn main() -> Result<(), procmodgen::GeneratorError> {
    let mut options = GeneratorOptions::new();
    options.processor_name = "Demo8".to_string();
    options.bitness = 8;

    let model = generate(LISTING, &options)?;

    println!(
        "combined {} raw entries into {} instructions:",
        model.counts.raw,
        model.instructions.len()
    );
    for entry in &model.instructions {
        println!("  {}", entry);
    }
    for diag in &model.diagnostics {
        println!("  warning: {}", diag);
    }

    println!("\n{}", output::render_slaspec(&model));
    Ok(())
}
