//! VM errors
//!
//! Every contract violation raised while executing one instruction surfaces
//! as a `VmError`. The dispatch loop turns it into the Fault state.

use crate::vm::stack_item::StackItemKind;
use thiserror::Error;

/// VM execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: StackItemKind,
        found: StackItemKind,
    },
    #[error("Stack underflow: need {needed} item(s), have {available}")]
    StackUnderflow { needed: usize, available: usize },
    #[error("Stack overflow (capacity: {0})")]
    StackOverflow(usize),
    #[error("Invalid stack depth: {0}")]
    InvalidDepth(i64),
    #[error("Index out of range: {index} (length: {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Invalid count: {0}")]
    InvalidCount(String),
    #[error("Integer out of range: {0}")]
    IntegerOutOfRange(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid shift: {0}")]
    InvalidShift(String),
    #[error("Cannot append {item} to {target}")]
    UnsupportedAppend {
        target: StackItemKind,
        item: StackItemKind,
    },
    #[error("Invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),
    #[error("Unsupported opcode: {0}")]
    UnsupportedOpcode(&'static str),
    #[error("Unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("Invalid syscall name: {0}")]
    InvalidSyscallName(String),
    #[error("Syscall {api} failed: {reason}")]
    SyscallFailed { api: String, reason: String },
    #[error("Truncated operand: need {needed} byte(s), {remaining} remaining")]
    TruncatedOperand { needed: usize, remaining: usize },
    #[error("Execution thrown")]
    Thrown,
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
    #[error("No execution context on the invocation stack")]
    NoContext,
}
