//! Assembly to bytecode compiler CLI.
//!
//! Reads raw assembly (`.asm`) or structured (`.sasm`) sources and compiles
//! them to serialized bytecode, optionally verifying, disassembling and
//! running the result.
//!
//! # Usage
//! ```text
//! assembler <input> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input`: Source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`)
//! - `-s, --structured`: Treat the input as structured source (implied by `.sasm`)
//! - `--verify`: Check stack depths at every label before writing
//! - `--disasm`: Print the disassembled program
//! - `-r, --run`: Execute once against empty in-memory storage
//! - `--calldata <hex>`: Call data for `--run`
//! - `--step-limit <n>`: Instruction limit for `--run`
//!
//! Resource limits for `--run` also come from the `CVM_*` environment
//! variables.

use contract_vm::types::bytes::Bytes;
use contract_vm::virtual_machine::assembler::assemble_file;
use contract_vm::virtual_machine::invocation::invoke;
use contract_vm::virtual_machine::lang::compile_file;
use contract_vm::virtual_machine::state::MemoryState;
use contract_vm::virtual_machine::verifier::verify;
use contract_vm::virtual_machine::vm::{CallData, VmConfig};
use contract_vm::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

const STRUCTURED_EXTENSION: &str = "sasm";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut structured = Path::new(input_path)
        .extension()
        .is_some_and(|ext| ext == STRUCTURED_EXTENSION);
    let mut run = false;
    let mut check = false;
    let mut disasm = false;
    let mut calldata = CallData::default();
    let mut config = VmConfig::from_env();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                output_path = Some(value_of(&args, i, k).to_string());
                i += 2;
            }
            "--structured" | "-s" => {
                structured = true;
                i += 1;
            }
            "--run" | "-r" => {
                run = true;
                i += 1;
            }
            "--verify" => {
                check = true;
                i += 1;
            }
            "--disasm" => {
                disasm = true;
                i += 1;
            }
            k @ "--calldata" => {
                let raw = value_of(&args, i, k);
                calldata = match Bytes::from_hex(raw) {
                    Ok(bytes) => CallData::new(bytes),
                    Err(e) => {
                        error!("Invalid call data '{raw}': {e}");
                        process::exit(1);
                    }
                };
                i += 2;
            }
            k @ "--step-limit" => {
                let raw = value_of(&args, i, k);
                let limit = raw.parse::<u64>().unwrap_or_else(|_| {
                    error!("Invalid step limit: '{raw}' is not a valid number");
                    process::exit(1);
                });
                config = config.with_step_limit(limit);
                i += 2;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        let p = Path::new(input_path);
        let stem = p.file_stem().unwrap_or_default().to_string_lossy();
        let parent = p.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{}.bin", stem))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let compiled = if structured {
        compile_file(input_path, None)
    } else {
        assemble_file(input_path)
    };
    let program = match compiled {
        Ok(p) => p,
        Err(e) => {
            error!("Compilation failed: {}", e);
            process::exit(1);
        }
    };

    if check {
        match verify(&program) {
            Ok(labels) => info!("Verified {} labels", labels.len()),
            Err(e) => {
                error!("Verification failed: {}", e);
                process::exit(1);
            }
        }
    }

    if disasm {
        match program.disassemble() {
            Ok(text) => print!("{text}"),
            Err(e) => {
                error!("Disassembly failed: {}", e);
                process::exit(1);
            }
        }
    }

    let bytecode = program.to_bytes();

    if let Err(e) = fs::write(&output_path, bytecode.as_slice()) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} bytes)",
        input_path,
        output_path,
        bytecode.len()
    );

    if run {
        let mut state = MemoryState::new();
        match invoke(&program, calldata, &mut state, &config) {
            Ok(output) => {
                println!("{}", output.to_hex());
                for (key, value) in state.iter() {
                    info!("storage[0x{key:x}] = 0x{value:x}");
                }
            }
            Err(e) => {
                error!("Execution aborted: {}", e);
                process::exit(1);
            }
        }
    }
}

/// The argument following flag `k` at `args[i]`, or exit.
fn value_of<'a>(args: &'a [String], i: usize, k: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v.as_str(),
        None => {
            error!("{k} requires an argument");
            process::exit(1);
        }
    }
}

const USAGE: &str = "\
Contract VM Assembler

USAGE:
    {program} <input> [OPTIONS]

ARGS:
    <input>    Assembly (.asm) or structured (.sasm) source file

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -s, --structured        Compile the input as structured source
        --verify            Check stack depths at every label
        --disasm            Print the disassembled program
    -r, --run               Execute once against empty storage
        --calldata <hex>    Call data for --run (optional 0x prefix)
        --step-limit <n>    Instruction limit for --run
    -h, --help              Print this help message

ENVIRONMENT:
    CVM_STACK_LIMIT, CVM_MEMORY_LIMIT, CVM_STEP_LIMIT, CVM_CHECK_LABELS, CVM_LOG

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile a structured source, verify it and print the listing
    {program} token.sasm --verify --disasm

    # Compile and run with a selector and one argument
    {program} program.asm -r --calldata 0xa9059cbb000000000000000000000000000000000000000000000000000000000000002a
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
