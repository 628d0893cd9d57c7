//! Stack virtual machine
//!
//! Executes scripts one instruction at a time over three stacks:
//! - evaluation stack: operands and results
//! - alt stack: scratch space reachable through explicit moves
//! - invocation stack: execution frames, the top one is executing
//!
//! Every instruction runs behind a single failure boundary. An instruction
//! either completes or fails without touching the stacks; a failure moves
//! the VM to `State::Fault` and records where it happened. Nothing else
//! stops a run early: there is no gas metering and no timeout.

use crate::crypto::hash::{hash160, hash256, sha1, sha256};
use crate::vm::context::Context;
use crate::vm::error::VmError;
use crate::vm::interop::InteropService;
use crate::vm::opcodes::{instruction_name, is_push_bytes, OpCode};
use crate::vm::stack::{Stack, DEFAULT_STACK_CAPACITY};
use crate::vm::stack_item::{ArrayRef, ContextRef, StackItem, StackItemKind};
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// VM Constants
// =============================================================================

/// Maximum number of elements NEWARRAY/PACK may create
pub const DEFAULT_MAX_ARRAY_SIZE: usize = 1024;

/// Maximum shift distance for SHL/SHR, in bits
pub const DEFAULT_MAX_SHIFT: usize = 256;

/// Nesting depth past which reports stop descending into arrays
const MAX_VIEW_DEPTH: usize = 32;

// =============================================================================
// State and configuration
// =============================================================================

/// Run state of the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Not started
    None,
    /// Actively stepping
    Running,
    /// Paused for inspection
    Break,
    /// An instruction failed
    Fault,
    /// Returned normally
    Halt,
}

impl State {
    /// Whether the run loop stops in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Break | State::Fault | State::Halt)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::None => "none",
            State::Running => "running",
            State::Break => "break",
            State::Fault => "fault",
            State::Halt => "halt",
        };
        f.write_str(name)
    }
}

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Capacity of each of the three stacks
    pub stack_capacity: usize,
    /// Upper bound on NEWARRAY/PACK element counts
    pub max_array_size: usize,
    /// Upper bound on SHL/SHR distances
    pub max_shift: usize,
    /// Fault on operands cut short by the end of the script instead of
    /// reading them as zero/empty
    pub strict_decoding: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_shift: DEFAULT_MAX_SHIFT,
            strict_decoding: false,
        }
    }
}

/// Where and why a run faulted
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// Instruction pointer of the failing instruction
    pub ip: isize,
    /// Raw instruction byte
    pub opcode: u8,
    /// Instruction mnemonic
    pub instruction: String,
    pub error: VmError,
}

// =============================================================================
// Reports
// =============================================================================

/// Serializable view of a stack item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum ItemView {
    /// Decimal integer
    Integer(String),
    /// Hex-encoded bytes
    ByteArray(String),
    Array(Vec<ItemView>),
    /// Instruction pointer of the frame
    Context(isize),
    /// Nesting too deep (or self-referencing) to render
    Elided,
}

impl ItemView {
    fn build(item: &StackItem, depth: usize) -> Self {
        if depth > MAX_VIEW_DEPTH {
            return ItemView::Elided;
        }
        match item {
            StackItem::BigInteger(value) => ItemView::Integer(value.to_string()),
            StackItem::ByteArray(bytes) => ItemView::ByteArray(hex::encode(bytes)),
            StackItem::Array(items) => ItemView::Array(
                items
                    .borrow()
                    .iter()
                    .map(|i| ItemView::build(i, depth + 1))
                    .collect(),
            ),
            StackItem::Context(ctx) => ItemView::Context(ctx.borrow().ip()),
        }
    }
}

impl fmt::Display for ItemView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemView::Integer(value) => f.write_str(value),
            ItemView::ByteArray(hex) => write!(f, "0x{}", hex),
            ItemView::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ItemView::Context(ip) => write!(f, "<context ip={}>", ip),
            ItemView::Elided => f.write_str("..."),
        }
    }
}

impl From<&StackItem> for ItemView {
    fn from(item: &StackItem) -> Self {
        ItemView::build(item, 0)
    }
}

/// Serializable fault details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub ip: isize,
    pub instruction: String,
    pub error: String,
}

/// Final state and stack contents after a run; stacks are listed top first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub state: State,
    pub fault: Option<FaultReport>,
    pub evaluation_stack: Vec<ItemView>,
    pub alt_stack: Vec<ItemView>,
    /// Instructions executed
    pub steps: u64,
}

// =============================================================================
// VM
// =============================================================================

/// The stack virtual machine. One instance runs one script.
pub struct VM {
    /// Evaluation stack
    estack: Stack,
    /// Alt stack
    astack: Stack,
    /// Invocation stack
    istack: Stack,
    state: State,
    config: VmConfig,
    /// Syscall resolver
    interop: Option<Box<dyn InteropService>>,
    fault: Option<Fault>,
    /// Script positions that pause the run loop
    breakpoints: BTreeSet<usize>,
    /// Set by `resume` so the loop steps past the breakpoint it stopped on
    skip_breakpoint: bool,
    steps: u64,
}

impl VM {
    /// Create a VM with the default configuration
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a VM with a custom configuration
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            estack: Stack::new(config.stack_capacity),
            astack: Stack::new(config.stack_capacity),
            istack: Stack::new(config.stack_capacity),
            state: State::None,
            config,
            interop: None,
            fault: None,
            breakpoints: BTreeSet::new(),
            skip_breakpoint: false,
            steps: 0,
        }
    }

    /// Attach the service that resolves SYSCALL names
    pub fn with_interop(mut self, service: impl InteropService + 'static) -> Self {
        self.interop = Some(Box::new(service));
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Details of the failing instruction, once faulted
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Number of instructions executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn estack(&self) -> &Stack {
        &self.estack
    }

    pub fn estack_mut(&mut self) -> &mut Stack {
        &mut self.estack
    }

    pub fn astack(&self) -> &Stack {
        &self.astack
    }

    pub fn istack(&self) -> &Stack {
        &self.istack
    }

    /// Pause before executing the instruction at `ip`
    pub fn add_breakpoint(&mut self, ip: usize) {
        self.breakpoints.insert(ip);
    }

    pub fn remove_breakpoint(&mut self, ip: usize) -> bool {
        self.breakpoints.remove(&ip)
    }

    /// Push a frame for `script` and start running
    pub fn load(&mut self, script: impl Into<Vec<u8>>) {
        let frame = StackItem::new_context(Context::new(script));
        match self.istack.push(frame) {
            Ok(()) => self.state = State::Running,
            Err(error) => self.record_fault(-1, OpCode::Nop as u8, error),
        }
    }

    /// Execute `script` until it halts, faults or hits a breakpoint
    pub fn run(&mut self, script: impl Into<Vec<u8>>) -> State {
        self.load(script);
        self.run_loop()
    }

    /// Continue a run paused in `State::Break`. Other states are returned
    /// as they are; a faulted run never resumes.
    pub fn resume(&mut self) -> State {
        if self.state != State::Break {
            return self.state;
        }
        self.state = State::Running;
        self.skip_breakpoint = true;
        self.run_loop()
    }

    fn run_loop(&mut self) -> State {
        while self.state == State::Running {
            if self.at_breakpoint() {
                self.state = State::Break;
                break;
            }
            self.step();
        }
        log::debug!("VM is stopped in state {}", self.state);
        self.state
    }

    fn at_breakpoint(&mut self) -> bool {
        if std::mem::take(&mut self.skip_breakpoint) || self.breakpoints.is_empty() {
            return false;
        }
        match self.current_context() {
            Ok(ctx) => self.breakpoints.contains(&ctx.borrow().next_ip()),
            Err(_) => false,
        }
    }

    /// Execute exactly one instruction of the current frame
    pub fn step(&mut self) {
        let ctx = match self.current_context() {
            Ok(ctx) => ctx,
            Err(error) => {
                self.record_fault(-1, OpCode::Nop as u8, error);
                return;
            }
        };
        let instr = ctx.borrow_mut().next_instruction();
        self.exec(&ctx, instr);
    }

    fn current_context(&self) -> Result<ContextRef, VmError> {
        let top = self.istack.peek().map_err(|_| VmError::NoContext)?;
        top.as_context().cloned()
    }

    /// Failure boundary: any error from the instruction faults the VM
    fn exec(&mut self, ctx: &ContextRef, instr: u8) {
        self.steps += 1;
        log::trace!(
            "ip={} {} (estack: {})",
            ctx.borrow().ip(),
            instruction_name(instr),
            self.estack.len()
        );

        if let Err(error) = self.execute(ctx, instr) {
            let ip = ctx.borrow().ip();
            self.record_fault(ip, instr, error);
        }
    }

    fn record_fault(&mut self, ip: isize, opcode: u8, error: VmError) {
        let instruction = instruction_name(opcode);
        log::error!(
            "error encountered at instruction {} at instruction pointer {} => {}",
            instruction,
            ip,
            error
        );
        self.fault = Some(Fault {
            ip,
            opcode,
            instruction,
            error,
        });
        self.state = State::Fault;
    }

    /// Final state and stack contents
    pub fn report(&self) -> ExecutionReport {
        ExecutionReport {
            state: self.state,
            fault: self.fault.as_ref().map(|f| FaultReport {
                ip: f.ip,
                instruction: f.instruction.clone(),
                error: f.error.to_string(),
            }),
            evaluation_stack: self.estack.iter_from_top().map(ItemView::from).collect(),
            alt_stack: self.astack.iter_from_top().map(ItemView::from).collect(),
            steps: self.steps,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn execute(&mut self, ctx: &ContextRef, instr: u8) -> Result<(), VmError> {
        if is_push_bytes(instr) {
            let bytes = self.read_operand(ctx, instr as usize)?;
            return self.estack.push(StackItem::ByteArray(bytes));
        }

        let opcode = OpCode::from_byte(instr).ok_or(VmError::InvalidOpcode(instr))?;

        let max_shift = self.config.max_shift;

        match opcode {
            // Constants
            OpCode::Push0 => self.estack.push(StackItem::from(0i64))?,
            OpCode::PushM1
            | OpCode::Push1
            | OpCode::Push2
            | OpCode::Push3
            | OpCode::Push4
            | OpCode::Push5
            | OpCode::Push6
            | OpCode::Push7
            | OpCode::Push8
            | OpCode::Push9
            | OpCode::Push10
            | OpCode::Push11
            | OpCode::Push12
            | OpCode::Push13
            | OpCode::Push14
            | OpCode::Push15
            | OpCode::Push16 => {
                if let Some(value) = opcode.small_int() {
                    self.estack.push(StackItem::from(value))?;
                }
            }
            OpCode::PushData1 | OpCode::PushData2 | OpCode::PushData4 => {
                let width = match opcode {
                    OpCode::PushData1 => 1,
                    OpCode::PushData2 => 2,
                    _ => 4,
                };
                let len = self.read_length(ctx, width)?;
                let bytes = self.read_operand(ctx, len)?;
                self.estack.push(StackItem::ByteArray(bytes))?;
            }

            // Flow control
            OpCode::Nop => {}
            OpCode::Ret => self.state = State::Halt,
            OpCode::Syscall => self.syscall(ctx)?,

            // Stack
            OpCode::ToAltStack => {
                let item = self.estack.peek()?.clone();
                self.astack.push(item)?;
                self.estack.pop()?;
            }
            OpCode::FromAltStack => {
                let item = self.astack.peek()?.clone();
                self.estack.push(item)?;
                self.astack.pop()?;
            }
            OpCode::DupFromAltStack => {
                let item = self.astack.dup()?;
                self.estack.push(item)?;
            }
            OpCode::Dup => {
                let item = self.estack.dup()?;
                self.estack.push(item)?;
            }
            OpCode::Swap => self.estack.swap(1)?,
            OpCode::XSwap => {
                let n = self.depth_operand(false)?;
                self.estack.ensure_depth(n + 2)?;
                self.estack.pop()?;
                self.estack.swap(n)?;
            }
            OpCode::Tuck => {
                let n = self.depth_operand(false)?;
                self.estack.ensure_depth(n + 1)?;
                self.estack.pop()?;
                let item = self.estack.dup()?;
                self.estack.insert_at(item, n)?;
            }
            OpCode::Depth => {
                let depth = self.estack.len();
                self.estack.push(StackItem::from(depth))?;
            }
            OpCode::Drop => {
                self.estack.pop()?;
            }
            OpCode::Nip => {
                self.estack.remove_at(1)?;
            }
            // Reorders the top pair in place; nothing is copied
            OpCode::Over => self.estack.swap(1)?,
            OpCode::Pick => {
                let n = self.depth_operand(true)?;
                let item = self.estack.peek_n(n + 1)?.clone();
                self.replace_top(1, item)?;
            }
            OpCode::Roll => {
                let n = self.depth_operand(false)?;
                self.estack.ensure_depth(n + 2)?;
                self.estack.pop()?;
                let item = self.estack.remove_at(n)?;
                self.estack.push(item)?;
            }
            OpCode::XDrop => {
                let n = self.depth_operand(true)?;
                self.estack.ensure_depth(n + 2)?;
                self.estack.pop()?;
                self.estack.remove_at(n)?;
            }
            OpCode::Rot => {
                self.estack.ensure_depth(3)?;
                let item = self.estack.remove_at(2)?;
                self.estack.push(item)?;
            }

            // Splice
            OpCode::Cat => {
                let result = {
                    let tail = self.estack.peek_n(0)?.as_bytes()?;
                    let head = self.estack.peek_n(1)?.as_bytes()?;
                    [head, tail].concat()
                };
                self.replace_top(2, StackItem::ByteArray(result))?;
            }
            OpCode::SubStr => {
                let result = {
                    let count = self.estack.peek_n(0)?.as_i64()?;
                    let index = self.estack.peek_n(1)?.as_i64()?;
                    let bytes = self.estack.peek_n(2)?.as_bytes()?;
                    if count < 0 {
                        return Err(VmError::InvalidCount(count.to_string()));
                    }
                    let start = check_index(index, bytes.len() + 1)?;
                    let end = start
                        .checked_add(count as usize)
                        .filter(|end| *end <= bytes.len())
                        .ok_or(VmError::IndexOutOfRange {
                            index: index.saturating_add(count),
                            len: bytes.len(),
                        })?;
                    bytes[start..end].to_vec()
                };
                self.replace_top(3, StackItem::ByteArray(result))?;
            }
            OpCode::Left => {
                let result = {
                    let count = self.count_operand(0)?;
                    let bytes = self.estack.peek_n(1)?.as_bytes()?;
                    bytes[..count.min(bytes.len())].to_vec()
                };
                self.replace_top(2, StackItem::ByteArray(result))?;
            }
            OpCode::Right => {
                let result = {
                    let count = self.count_operand(0)?;
                    let bytes = self.estack.peek_n(1)?.as_bytes()?;
                    if count > bytes.len() {
                        return Err(VmError::IndexOutOfRange {
                            index: count as i64,
                            len: bytes.len(),
                        });
                    }
                    bytes[bytes.len() - count..].to_vec()
                };
                self.replace_top(2, StackItem::ByteArray(result))?;
            }
            OpCode::Size => {
                let len = self.estack.peek()?.as_bytes()?.len();
                self.replace_top(1, StackItem::from(len))?;
            }

            // Bitwise
            OpCode::Invert => self.unary_int(|x| Ok(StackItem::from(-x - BigInt::one())))?,
            OpCode::And => self.binary_int(|a, b| Ok(StackItem::from(a & b)))?,
            OpCode::Or => self.binary_int(|a, b| Ok(StackItem::from(a | b)))?,
            OpCode::Xor => self.binary_int(|a, b| Ok(StackItem::from(a ^ b)))?,
            OpCode::Equal => {
                let equal = same_value(self.estack.peek_n(1)?, self.estack.peek_n(0)?);
                self.replace_top(2, StackItem::from(equal))?;
            }

            // Arithmetic
            OpCode::Inc => self.unary_int(|x| Ok(StackItem::from(x + BigInt::one())))?,
            OpCode::Dec => self.unary_int(|x| Ok(StackItem::from(x - BigInt::one())))?,
            OpCode::Sign => self.unary_int(|x| Ok(StackItem::from(x.signum())))?,
            OpCode::Negate => self.unary_int(|x| Ok(StackItem::from(-x)))?,
            OpCode::Abs => self.unary_int(|x| Ok(StackItem::from(x.abs())))?,
            OpCode::Nz => self.unary_int(|x| Ok(StackItem::from(!x.is_zero())))?,
            OpCode::Not => {
                let value = self.estack.peek()?.as_bool()?;
                self.replace_top(1, StackItem::from(!value))?;
            }
            OpCode::Add => self.binary_int(|a, b| Ok(StackItem::from(a + b)))?,
            OpCode::Sub => self.binary_int(|a, b| Ok(StackItem::from(a - b)))?,
            OpCode::Mul => self.binary_int(|a, b| Ok(StackItem::from(a * b)))?,
            OpCode::Div => self.binary_int(|a, b| Ok(StackItem::from(euclid_div_rem(a, b)?.0)))?,
            OpCode::Mod => self.binary_int(|a, b| Ok(StackItem::from(euclid_div_rem(a, b)?.1)))?,
            OpCode::Shl => self.binary_int(|a, b| {
                let shift = shift_operand(b, max_shift)?;
                Ok(StackItem::from(a << shift))
            })?,
            OpCode::Shr => self.binary_int(|a, b| {
                let shift = shift_operand(b, max_shift)?;
                Ok(StackItem::from(a >> shift))
            })?,
            OpCode::BoolAnd | OpCode::BoolOr => {
                let b = self.estack.peek_n(0)?.as_bool()?;
                let a = self.estack.peek_n(1)?.as_bool()?;
                let result = if opcode == OpCode::BoolAnd { a && b } else { a || b };
                self.replace_top(2, StackItem::from(result))?;
            }
            OpCode::NumEqual => self.binary_int(|a, b| Ok(StackItem::from(a == b)))?,
            OpCode::NumNotEqual => self.binary_int(|a, b| Ok(StackItem::from(a != b)))?,
            OpCode::Lt => self.binary_int(|a, b| Ok(StackItem::from(a < b)))?,
            OpCode::Gt => self.binary_int(|a, b| Ok(StackItem::from(a > b)))?,
            OpCode::Lte => self.binary_int(|a, b| Ok(StackItem::from(a <= b)))?,
            OpCode::Gte => self.binary_int(|a, b| Ok(StackItem::from(a >= b)))?,
            OpCode::Min => self.binary_int(|a, b| Ok(StackItem::from(a.min(b).clone())))?,
            OpCode::Max => self.binary_int(|a, b| Ok(StackItem::from(a.max(b).clone())))?,
            OpCode::Within => {
                let result = {
                    let upper = self.estack.peek_n(0)?.as_bigint()?;
                    let lower = self.estack.peek_n(1)?.as_bigint()?;
                    let x = self.estack.peek_n(2)?.as_bigint()?;
                    lower <= x && x < upper
                };
                self.replace_top(3, StackItem::from(result))?;
            }

            // Crypto
            OpCode::Sha1 => self.digest(sha1)?,
            OpCode::Sha256 => self.digest(sha256)?,
            OpCode::Hash160 => self.digest(hash160)?,
            OpCode::Hash256 => self.digest(hash256)?,

            // Array
            OpCode::ArraySize => {
                let len = match self.estack.peek()? {
                    StackItem::Array(items) => items.borrow().len(),
                    StackItem::ByteArray(bytes) => bytes.len(),
                    other => {
                        return Err(VmError::TypeMismatch {
                            expected: StackItemKind::Array,
                            found: other.kind(),
                        })
                    }
                };
                self.replace_top(1, StackItem::from(len))?;
            }
            OpCode::NewArray | OpCode::NewStruct => {
                let n = self.array_count_operand()?;
                let slots = vec![StackItem::ByteArray(Vec::new()); n];
                self.replace_top(1, StackItem::new_array(slots))?;
            }
            OpCode::Pack => {
                let n = self.array_count_operand()?;
                self.estack.ensure_depth(n + 1)?;
                self.estack.pop()?;
                let items = self.estack.pop_n(n)?;
                self.estack.push(StackItem::new_array(items))?;
            }
            OpCode::Unpack => {
                let items = self.estack.peek()?.as_array()?.borrow().clone();
                self.estack.ensure_room(items.len())?;
                self.estack.pop()?;
                let count = items.len();
                for item in items.into_iter().rev() {
                    self.estack.push(item)?;
                }
                self.estack.push(StackItem::from(count))?;
            }
            OpCode::PickItem => {
                let item = {
                    let index = self.estack.peek_n(0)?.as_i64()?;
                    let items = self.estack.peek_n(1)?.as_array()?.borrow();
                    let index = check_index(index, items.len())?;
                    items[index].clone()
                };
                self.replace_top(2, item)?;
            }
            OpCode::SetItem => {
                // The array is not pushed back: the write lands in the shared
                // storage, visible through every other handle to it.
                let value = self.estack.peek_n(0)?.clone();
                let index = self.estack.peek_n(1)?.as_i64()?;
                let array = self.estack.peek_n(2)?.as_array()?.clone();
                let index = check_index(index, array.borrow().len())?;
                self.estack.drop_n(3)?;
                array.borrow_mut()[index] = value;
            }
            OpCode::Append => {
                let result = {
                    let item = self.estack.peek_n(0)?;
                    self.estack.peek_n(1)?.append(item)?
                };
                self.replace_top(2, result)?;
            }
            OpCode::Reverse => {
                let array = self.estack.peek()?.as_array()?.clone();
                self.estack.pop()?;
                array.borrow_mut().reverse();
            }
            OpCode::Remove => {
                let index = self.estack.peek_n(0)?.as_i64()?;
                let array = self.estack.peek_n(1)?.as_array()?.clone();
                let index = check_index(index, array.borrow().len())?;
                self.estack.drop_n(2)?;
                array.borrow_mut().remove(index);
            }

            // Exceptions
            OpCode::Throw => return Err(VmError::Thrown),
            OpCode::ThrowIfNot => {
                if !self.estack.peek()?.as_bool()? {
                    return Err(VmError::Thrown);
                }
                self.estack.pop()?;
            }

            OpCode::Jmp | OpCode::JmpIf | OpCode::JmpIfNot | OpCode::Call => {
                return Err(VmError::UnsupportedOpcode(opcode.name()))
            }

        }

        Ok(())
    }

    // =========================================================================
    // Operand helpers
    // =========================================================================

    fn check_remaining(&self, ctx: &Context, needed: usize) -> Result<(), VmError> {
        let remaining = ctx.remaining();
        if self.config.strict_decoding && remaining < needed {
            return Err(VmError::TruncatedOperand { needed, remaining });
        }
        Ok(())
    }

    /// Read a 1/2/4-byte little-endian length prefix
    fn read_length(&self, ctx: &ContextRef, width: usize) -> Result<usize, VmError> {
        let mut ctx = ctx.borrow_mut();
        self.check_remaining(&ctx, width)?;
        let len = match width {
            1 => ctx.read_byte() as usize,
            2 => ctx.read_u16() as usize,
            _ => ctx.read_u32() as usize,
        };
        Ok(len)
    }

    fn read_operand(&self, ctx: &ContextRef, n: usize) -> Result<Vec<u8>, VmError> {
        let mut ctx = ctx.borrow_mut();
        self.check_remaining(&ctx, n)?;
        Ok(ctx.read_bytes(n))
    }

    fn syscall(&mut self, ctx: &ContextRef) -> Result<(), VmError> {
        let len = self.read_length(ctx, 1)?;
        let raw = self.read_operand(ctx, len)?;
        if raw.is_empty() || !raw.is_ascii() {
            return Err(VmError::InvalidSyscallName(hex::encode(&raw)));
        }
        let api = String::from_utf8_lossy(&raw).into_owned();
        log::debug!("syscall {}", api);

        let service = self
            .interop
            .as_mut()
            .ok_or_else(|| VmError::UnknownSyscall(api.clone()))?;
        service.invoke(&api, &mut self.estack)
    }

    /// Depth operand on top of the stack, not popped
    fn depth_operand(&self, allow_zero: bool) -> Result<usize, VmError> {
        let n = self.estack.peek()?.as_i64()?;
        if n < 0 || (n == 0 && !allow_zero) {
            return Err(VmError::InvalidDepth(n));
        }
        Ok(n as usize)
    }

    /// Non-negative count operand at depth `n`, not popped
    fn count_operand(&self, n: usize) -> Result<usize, VmError> {
        let count = self.estack.peek_n(n)?.as_i64()?;
        if count < 0 {
            return Err(VmError::InvalidCount(count.to_string()));
        }
        Ok(count as usize)
    }

    /// Element count for NEWARRAY/PACK, bounded by the configured maximum
    fn array_count_operand(&self) -> Result<usize, VmError> {
        let count = self.count_operand(0)?;
        if count > self.config.max_array_size {
            return Err(VmError::InvalidCount(format!(
                "{} exceeds maximum array size {}",
                count, self.config.max_array_size
            )));
        }
        Ok(count)
    }

    /// Replace the top `consumed` items with `result`
    fn replace_top(&mut self, consumed: usize, result: StackItem) -> Result<(), VmError> {
        self.estack.drop_n(consumed)?;
        self.estack.push(result)
    }

    fn unary_int<F>(&mut self, op: F) -> Result<(), VmError>
    where
        F: FnOnce(&BigInt) -> Result<StackItem, VmError>,
    {
        let result = op(self.estack.peek()?.as_bigint()?)?;
        self.replace_top(1, result)
    }

    /// Apply `op(lhs, rhs)` where `rhs` is the top item and `lhs` the one
    /// pushed before it
    fn binary_int<F>(&mut self, op: F) -> Result<(), VmError>
    where
        F: FnOnce(&BigInt, &BigInt) -> Result<StackItem, VmError>,
    {
        let result = {
            let rhs = self.estack.peek_n(0)?.as_bigint()?;
            let lhs = self.estack.peek_n(1)?.as_bigint()?;
            op(lhs, rhs)?
        };
        self.replace_top(2, result)
    }

    fn digest(&mut self, hash: fn(&[u8]) -> Vec<u8>) -> Result<(), VmError> {
        let digest = hash(self.estack.peek()?.as_bytes()?);
        self.replace_top(1, StackItem::ByteArray(digest))
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-check an array index
fn check_index(index: i64, len: usize) -> Result<usize, VmError> {
    if index < 0 || index as u64 >= len as u64 {
        return Err(VmError::IndexOutOfRange { index, len });
    }
    Ok(index as usize)
}

/// Euclidean division: the remainder is never negative
fn euclid_div_rem(a: &BigInt, b: &BigInt) -> Result<(BigInt, BigInt), VmError> {
    if b.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    let mut rem = a % b;
    if rem.is_negative() {
        if b.is_positive() {
            rem += b;
        } else {
            rem -= b;
        }
    }
    let quot = (a - &rem) / b;
    Ok((quot, rem))
}

fn shift_operand(shift: &BigInt, max_shift: usize) -> Result<usize, VmError> {
    match shift.to_usize() {
        Some(n) if n <= max_shift => Ok(n),
        _ => Err(VmError::InvalidShift(format!(
            "{} (allowed: 0..={})",
            shift, max_shift
        ))),
    }
}

/// EQUAL semantics: same kind, integers by value, bytes by content,
/// arrays and contexts by identity
fn same_value(a: &StackItem, b: &StackItem) -> bool {
    match (a, b) {
        (StackItem::BigInteger(x), StackItem::BigInteger(y)) => x == y,
        (StackItem::ByteArray(x), StackItem::ByteArray(y)) => x == y,
        (StackItem::Array(x), StackItem::Array(y)) => ArrayRef::ptr_eq(x, y),
        (StackItem::Context(x), StackItem::Context(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
