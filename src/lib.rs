//! Storm VM: a NEO-style stack virtual machine in Rust
//!
//! This crate provides:
//! - A bytecode interpreter with evaluation, alt and invocation stacks
//! - Arbitrary-precision integers, byte arrays and shared arrays as values
//! - Fault isolation: a failing instruction stops the run, never the host
//! - A syscall boundary for host-provided capabilities
//! - An instruction encoder, an assembler and a disassembler
//!
//! # Example
//!
//! ```rust
//! use storm_vm::compiler::Emitter;
//! use storm_vm::vm::{OpCode, State, VM};
//!
//! // Build a script
//! let mut emitter = Emitter::new();
//! emitter.emit_int(7);
//! emitter.emit_int(5);
//! emitter.emit_opcode(OpCode::Mul);
//! emitter.emit_int(1000);
//! emitter.emit_opcode(OpCode::Ret);
//!
//! // Run it
//! let mut vm = VM::new();
//! assert_eq!(vm.run(emitter.into_bytes()), State::Halt);
//!
//! // Larger integers travel as little-endian bytes and are decoded explicitly
//! let wide = vm.estack_mut().pop().unwrap();
//! assert_eq!(wide.decode_integer().unwrap().to_string(), "1000");
//!
//! let product = vm.estack_mut().pop().unwrap();
//! assert_eq!(product.as_i64().unwrap(), 35);
//! ```

pub mod cli;
pub mod compiler;
pub mod crypto;
pub mod vm;

// Re-export commonly used types
pub use compiler::{disassemble, Assembler, CompilerError, EmitError, Emitter};
pub use vm::{
    Context, ExecutionReport, InteropRegistry, InteropService, OpCode, Stack, StackItem, State,
    VmConfig, VmError, VM,
};
