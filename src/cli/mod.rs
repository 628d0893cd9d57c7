//! Command-line front end
//!
//! Handlers behind the `storm` binary: run, assemble and disassemble scripts.

pub mod commands;

pub use commands::{
    cmd_asm, cmd_disasm, cmd_run, default_interop, load_script, CliResult, RunOptions,
};
