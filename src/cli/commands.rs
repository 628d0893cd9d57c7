//! CLI commands for the VM
//!
//! Implements all command handlers for the CLI interface.

use crate::compiler::{disassemble, Assembler};
use crate::vm::{
    ExecutionReport, InteropRegistry, ItemView, State, StackItem, VmConfig, VmError, VM,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Options for `run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Print the report as JSON instead of text
    pub json: bool,
    /// VM settings
    pub config: VmConfig,
    /// Positions to pause at; the stacks are printed and the run resumes
    pub breakpoints: Vec<usize>,
}

/// Load a script from a file or an inline hex string.
///
/// `.asm` files are assembled, other files are read as raw bytecode and
/// anything that is not a file is decoded as hex (an `0x` prefix is allowed).
pub fn load_script(input: &str) -> CliResult<Vec<u8>> {
    let path = Path::new(input);
    if path.is_file() {
        if path.extension().map_or(false, |ext| ext == "asm") {
            let source = fs::read_to_string(path)?;
            return Ok(Assembler::new().assemble(&source)?);
        }
        return Ok(fs::read(path)?);
    }

    let digits = input.trim().trim_start_matches("0x");
    hex::decode(digits)
        .map_err(|e| format!("{:?} is neither a file nor hex bytecode: {}", input, e).into())
}

/// Syscalls available to scripts run from the CLI
pub fn default_interop() -> InteropRegistry {
    let mut registry = InteropRegistry::new();

    registry.register("System.Runtime.Log", |estack| {
        let message = String::from_utf8_lossy(estack.peek()?.as_bytes()?).into_owned();
        estack.pop()?;
        log::info!("[runtime] {}", message);
        Ok(())
    });

    registry.register("Neo.Runtime.Notify", |estack| {
        let item = ItemView::from(estack.peek()?).to_string();
        estack.pop()?;
        log::info!("[notify] {}", item);
        Ok(())
    });

    registry.register("System.Runtime.GetTrigger", |estack| {
        // Application trigger
        estack.push(StackItem::from(0x10i64))
    });

    registry.register("System.Runtime.CheckWitness", |estack| {
        let witness = estack.peek()?.as_bytes()?.len();
        if witness != 20 && witness != 33 {
            return Err(VmError::SyscallFailed {
                api: "System.Runtime.CheckWitness".to_string(),
                reason: format!("expected a 20-byte hash or 33-byte key, got {} bytes", witness),
            });
        }
        estack.pop()?;
        // No transaction context: nothing is ever witnessed
        estack.push(StackItem::from(false))
    });

    registry
}

/// Execute a script and print the resulting state and stacks
pub fn cmd_run(input: &str, options: &RunOptions) -> CliResult<ExecutionReport> {
    let script = load_script(input)?;
    log::info!("Running {} bytes of bytecode", script.len());

    let interop = default_interop();
    log::debug!(
        "Syscalls available: {}",
        interop.names().collect::<Vec<_>>().join(", ")
    );

    let mut vm = VM::with_config(options.config.clone()).with_interop(interop);
    for ip in &options.breakpoints {
        vm.add_breakpoint(*ip);
    }

    let mut state = vm.run(script);
    while state == State::Break {
        if !options.json {
            println!("⏸️  Break");
            print_stacks(&vm.report());
        }
        state = vm.resume();
    }

    let report = vm.report();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

/// Assemble a source file, writing bytecode to `output` or hex to stdout
pub fn cmd_asm(source: &Path, output: Option<&PathBuf>) -> CliResult<Vec<u8>> {
    let text = fs::read_to_string(source)?;
    let bytecode = Assembler::new().assemble(&text)?;

    match output {
        Some(path) => {
            fs::write(path, &bytecode)?;
            println!("✅ Assembled {} bytes to {:?}", bytecode.len(), path);
        }
        None => println!("{}", hex::encode(&bytecode)),
    }

    Ok(bytecode)
}

/// Print a readable listing of a script
pub fn cmd_disasm(input: &str) -> CliResult<String> {
    let script = load_script(input)?;
    let listing = disassemble(&script);
    print!("{}", listing);
    Ok(listing)
}

fn print_report(report: &ExecutionReport) {
    match report.state {
        State::Halt => println!("✅ State: {}", report.state),
        _ => println!("❌ State: {}", report.state),
    }
    println!("   Steps: {}", report.steps);
    if let Some(fault) = &report.fault {
        println!(
            "   Fault: {} at ip {} ({})",
            fault.instruction, fault.ip, fault.error
        );
    }
    print_stacks(report);
}

fn print_stacks(report: &ExecutionReport) {
    println!("📚 Evaluation stack ({} items, top first)", report.evaluation_stack.len());
    for (i, item) in report.evaluation_stack.iter().enumerate() {
        println!("   [{}] {}", i, item);
    }
    if !report.alt_stack.is_empty() {
        println!("📦 Alt stack ({} items, top first)", report.alt_stack.len());
        for (i, item) in report.alt_stack.iter().enumerate() {
            println!("   [{}] {}", i, item);
        }
    }
}
