//! Execution context
//!
//! One frame of execution: an immutable script and an instruction pointer
//! that only moves forward. Operand reads that run past the end of the
//! script are not errors; they yield zero/empty values and leave the
//! pointer where it was. Callers that want to reject truncated bytecode
//! check `remaining()` first.

use crate::vm::opcodes::OpCode;
use std::rc::Rc;

/// An execution frame over a script
#[derive(Debug, Clone)]
pub struct Context {
    /// Position of the current instruction; -1 before the first fetch
    ip: isize,
    /// The script executed by this frame
    script: Rc<[u8]>,
}

impl Context {
    /// Create a context positioned before the first instruction
    pub fn new(script: impl Into<Vec<u8>>) -> Self {
        Self {
            ip: -1,
            script: Rc::from(script.into()),
        }
    }

    /// Current instruction pointer
    pub fn ip(&self) -> isize {
        self.ip
    }

    /// Position of the instruction the next fetch will return
    pub fn next_ip(&self) -> usize {
        (self.ip + 1) as usize
    }

    /// Bytes left after the current position
    pub fn remaining(&self) -> usize {
        let consumed = (self.ip + 1) as usize;
        self.script.len().saturating_sub(consumed)
    }

    /// Advance to the next instruction and return its byte.
    ///
    /// Running off the end of the script yields `RET`, so a script without
    /// an explicit return halts instead of faulting.
    pub fn next_instruction(&mut self) -> u8 {
        if (self.ip + 1) as usize >= self.script.len() {
            self.ip = self.script.len() as isize;
            return OpCode::Ret as u8;
        }
        self.ip += 1;
        self.script[self.ip as usize]
    }

    /// Read one operand byte; 0 when the script is exhausted
    pub fn read_byte(&mut self) -> u8 {
        self.read_array::<1>().map(|b| b[0]).unwrap_or(0)
    }

    /// Read a little-endian u16; 0 when fewer than 2 bytes remain
    pub fn read_u16(&mut self) -> u16 {
        self.read_array::<2>().map(u16::from_le_bytes).unwrap_or(0)
    }

    /// Read a little-endian u32; 0 when fewer than 4 bytes remain
    pub fn read_u32(&mut self) -> u32 {
        self.read_array::<4>().map(u32::from_le_bytes).unwrap_or(0)
    }

    /// Read a little-endian i16 (jump/call targets)
    pub fn read_i16(&mut self) -> i16 {
        self.read_array::<2>().map(i16::from_le_bytes).unwrap_or(0)
    }

    /// Copy the next `n` bytes; empty when fewer than `n` remain
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        match self.operand_range(n) {
            Some((start, end)) => {
                self.ip += n as isize;
                self.script[start..end].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Read a 1-byte length followed by that many bytes
    pub fn read_var_bytes(&mut self) -> Vec<u8> {
        let n = self.read_byte();
        self.read_bytes(n as usize)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let (start, end) = self.operand_range(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.script[start..end]);
        self.ip += N as isize;
        Some(out)
    }

    fn operand_range(&self, n: usize) -> Option<(usize, usize)> {
        let start = (self.ip + 1) as usize;
        let end = start.checked_add(n)?;
        if end > self.script.len() {
            return None;
        }
        Some((start, end))
    }
}
