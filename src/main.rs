//! Storm VM CLI Application
//!
//! A command-line interface for running, assembling and inspecting scripts.

use clap::{Parser, Subcommand};
use storm_vm::cli::{self, RunOptions};
use storm_vm::vm::{State, VmConfig, DEFAULT_STACK_CAPACITY};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "storm")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A NEO-style stack virtual machine in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script
    Run {
        /// Hex bytecode, a bytecode file, or an .asm source file
        input: String,

        /// Print the execution report as JSON
        #[arg(long)]
        json: bool,

        /// Fault on operands cut short by the end of the script
        #[arg(long)]
        strict: bool,

        /// Capacity of each VM stack
        #[arg(long, default_value_t = DEFAULT_STACK_CAPACITY)]
        stack_capacity: usize,

        /// Pause at this instruction offset and print the stacks (repeatable)
        #[arg(short, long = "break")]
        breakpoints: Vec<usize>,
    },

    /// Assemble an .asm source file
    Asm {
        /// Source file
        source: PathBuf,

        /// Write bytecode here instead of printing hex
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Disassemble bytecode
    Disasm {
        /// Hex bytecode, a bytecode file, or an .asm source file
        input: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            json,
            strict,
            stack_capacity,
            breakpoints,
        } => {
            let options = RunOptions {
                json,
                config: VmConfig {
                    stack_capacity,
                    strict_decoding: strict,
                    ..Default::default()
                },
                breakpoints,
            };
            let report = cli::cmd_run(&input, &options)?;
            if report.state == State::Fault {
                std::process::exit(1);
            }
        }

        Commands::Asm { source, output } => {
            cli::cmd_asm(&source, output.as_ref())?;
        }

        Commands::Disasm { input } => {
            cli::cmd_disasm(&input)?;
        }
    }

    Ok(())
}
