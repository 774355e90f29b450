use anyhow::Result;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;
use udiff_core::{
    delta_header_text, Blob, DiffAlgorithm, DiffOptions, FormatOptions, Patch, PatchOutcome,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut inputs = Vec::new();
    let mut stats = false;
    let mut context: usize = 3;
    let mut algorithm = DiffAlgorithm::Myers;
    let mut help = false;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        if arg == "--stats" {
            stats = true;
        } else if arg == "--context" {
            let value = iter.next().unwrap_or_else(|| {
                eprintln!("Error: --context requires a number.");
                process::exit(2);
            });
            context = value.parse().unwrap_or_else(|_| {
                eprintln!("Error: invalid context count '{}'.", value);
                process::exit(2);
            });
        } else if arg == "--algorithm" {
            let value = iter.next().unwrap_or_else(|| {
                eprintln!("Error: --algorithm requires a name.");
                process::exit(2);
            });
            algorithm = match value.as_str() {
                "myers" => DiffAlgorithm::Myers,
                "patience" => DiffAlgorithm::Patience,
                "lcs" => DiffAlgorithm::Lcs,
                other => {
                    eprintln!("Error: unknown algorithm '{}'.", other);
                    process::exit(2);
                }
            };
        } else if arg == "--help" || arg == "-h" {
            help = true;
        } else {
            inputs.push(arg.clone());
        }
    }

    if help {
        println!("Usage: udiff OLD NEW [--stats] [--context N] [--algorithm myers|patience|lcs]");
        println!("Print the unified diff between two files. Use '-' to read one side from stdin.");
        return Ok(());
    }

    if inputs.len() != 2 {
        eprintln!("Error: expected exactly two inputs, got {}.", inputs.len());
        process::exit(2);
    }

    let (old_data, old_label) = read_side(&inputs[0])?;
    let (new_data, new_label) = read_side(&inputs[1])?;

    let options = DiffOptions {
        algorithm,
        context_lines: context,
        ..Default::default()
    };
    let format = FormatOptions::default();

    let old_blob = Blob::new(old_data);
    let new_blob = Blob::new(new_data);

    let outcome = Patch::from_blobs(
        Some(&old_blob),
        Some(old_label.as_str()),
        Some(&new_blob),
        Some(new_label.as_str()),
        &options,
        &format,
    )?;

    match outcome {
        PatchOutcome::Patch(patch) => {
            if stats {
                let s = patch.line_stats();
                println!("--- Summary ---");
                println!("Context lines:  {}", s.context);
                println!("Added lines:    {}", s.additions);
                println!("Deleted lines:  {}", s.deletions);
                println!("Patch bytes:    {}", patch.size(true, true, true));
            } else {
                print!("{}", patch.to_text());
            }
        }
        PatchOutcome::Skipped(delta) => {
            if delta.binary {
                print!("{}", delta_header_text(&delta, &format));
            }
        }
    }

    Ok(())
}

fn read_side(input: &str) -> Result<(Vec<u8>, String)> {
    if input == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("Error: '-' given but no data piped from stdin.");
            process::exit(1);
        }
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok((buffer, "stdin".to_string()))
    } else {
        let data = fs::read(input).unwrap_or_else(|_| {
            eprintln!("Error: Input file not found at '{}'", input);
            process::exit(1);
        });
        Ok((data, input.to_string()))
    }
}
