//! Bytecode compiler
//!
//! Produces VM scripts from Rust code (the `Emitter`) or from assembly
//! source (the `Assembler`).
//!
//! # Example
//!
//! ```rust
//! use storm_vm::compiler::Assembler;
//! use storm_vm::vm::{State, VM};
//!
//! let mut assembler = Assembler::new();
//! let bytecode = assembler.assemble("
//!     PUSH 8
//!     PUSH 6
//!     MOD
//! ").unwrap();
//!
//! let mut vm = VM::new();
//! assert_eq!(vm.run(bytecode), State::Halt);
//! assert_eq!(vm.estack_mut().pop().unwrap().as_i64().unwrap(), 2);
//! ```

pub mod assembler;
pub mod emit;
pub mod syscall;

pub use assembler::{disassemble, Assembler, CompilerError};
pub use emit::{EmitError, Emitter};
