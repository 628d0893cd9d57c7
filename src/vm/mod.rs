//! Stack virtual machine
//!
//! Provides the bytecode interpreter and the types it is built from.
//!
//! # Overview
//!
//! This module implements:
//! - Tagged stack items with shared array storage
//! - Bounded evaluation, alt and invocation stacks
//! - Execution contexts that decode operands from the script
//! - A dispatch loop that faults instead of panicking
//! - A pluggable syscall boundary
//!
//! # Example
//!
//! ```rust
//! use storm_vm::vm::{OpCode, State, VM};
//!
//! let script = vec![OpCode::Push4 as u8, OpCode::Push2 as u8, OpCode::Sub as u8];
//!
//! let mut vm = VM::new();
//! assert_eq!(vm.run(script), State::Halt);
//! assert_eq!(vm.estack_mut().pop().unwrap().as_i64().unwrap(), 2);
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod interop;
pub mod opcodes;
pub mod stack;
pub mod stack_item;

pub use context::Context;
pub use engine::{
    ExecutionReport, Fault, FaultReport, ItemView, State, VmConfig, DEFAULT_MAX_ARRAY_SIZE,
    DEFAULT_MAX_SHIFT, VM,
};
pub use error::VmError;
pub use interop::{InteropHandler, InteropRegistry, InteropService};
pub use opcodes::{instruction_name, is_push_bytes, OpCode};
pub use stack::{Stack, DEFAULT_STACK_CAPACITY};
pub use stack_item::{ArrayRef, ContextRef, StackItem, StackItemKind};
