//! Instruction encoder
//!
//! Appends single instructions to a bytecode buffer, always choosing the
//! most compact encoding for the value being pushed.

use crate::vm::opcodes::{OpCode, PUSHBYTES75};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use thiserror::Error;

/// Encoder errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Instruction {0} is not a jump or call type")]
    NotAJump(&'static str),
    #[error("Syscall api cannot be of length 0")]
    EmptySyscall,
    #[error("Syscall api too long: {0} bytes (max 255)")]
    SyscallTooLong(usize),
    #[error("Push payload too long: {0} bytes (max 4294967295)")]
    PayloadTooLong(usize),
}

/// Bytecode buffer with one method per instruction shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emitter {
    code: Vec<u8>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes emitted so far
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    /// Overwrite an already emitted byte
    pub(crate) fn patch(&mut self, pos: usize, bytes: &[u8]) {
        self.code[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    /// Write a bare opcode
    pub fn emit_opcode(&mut self, op: OpCode) {
        self.code.push(op as u8);
    }

    /// Write the dedicated true/false push
    pub fn emit_bool(&mut self, value: bool) {
        let op = if value {
            OpCode::PUSH_TRUE
        } else {
            OpCode::PUSH_FALSE
        };
        self.emit_opcode(op);
    }

    /// Write an integer push.
    ///
    /// -1, 0 and 1..=15 use the dedicated small-integer opcodes. Everything
    /// else is pushed as its minimal little-endian two's-complement bytes.
    pub fn emit_int(&mut self, value: i64) {
        let value = BigInt::from(value);
        match small_int_opcode(&value) {
            Some(op) => self.code.push(op),
            None => {
                // At most 8 bytes, always a direct PUSHBYTES
                let bytes = value.to_signed_bytes_le();
                self.code.push(bytes.len() as u8);
                self.code.extend_from_slice(&bytes);
            }
        }
    }

    /// Arbitrary-precision form of `emit_int`
    pub fn emit_bigint(&mut self, value: &BigInt) -> Result<(), EmitError> {
        match small_int_opcode(value) {
            Some(op) => {
                self.code.push(op);
                Ok(())
            }
            None => self.emit_bytes(&value.to_signed_bytes_le()),
        }
    }

    /// Write a UTF-8 string as a byte push
    pub fn emit_string(&mut self, value: &str) -> Result<(), EmitError> {
        self.emit_bytes(value.as_bytes())
    }

    /// Write a byte push using the smallest length prefix that fits
    pub fn emit_bytes(&mut self, bytes: &[u8]) -> Result<(), EmitError> {
        let prefix = push_prefix(bytes.len())?;
        self.code.extend_from_slice(&prefix);
        self.code.extend_from_slice(bytes);
        Ok(())
    }

    /// Write SYSCALL followed by the length-prefixed api name
    pub fn emit_syscall(&mut self, api: &str) -> Result<(), EmitError> {
        if api.is_empty() {
            return Err(EmitError::EmptySyscall);
        }
        if api.len() > u8::MAX as usize {
            return Err(EmitError::SyscallTooLong(api.len()));
        }
        self.emit_opcode(OpCode::Syscall);
        self.code.push(api.len() as u8);
        self.code.extend_from_slice(api.as_bytes());
        Ok(())
    }

    /// Write a jump with a 2-byte little-endian offset
    pub fn emit_jmp(&mut self, op: OpCode, offset: i16) -> Result<(), EmitError> {
        if !op.is_jump() {
            return Err(EmitError::NotAJump(op.name()));
        }
        self.emit_opcode(op);
        self.code.extend_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Write a call; same encoding as a jump
    pub fn emit_call(&mut self, op: OpCode, offset: i16) -> Result<(), EmitError> {
        self.emit_jmp(op, offset)
    }
}

/// Dedicated opcode for -1, 0 and 1..=15
fn small_int_opcode(value: &BigInt) -> Option<u8> {
    match value.to_i64()? {
        -1 => Some(OpCode::PushM1 as u8),
        0 => Some(OpCode::Push0 as u8),
        n @ 1..=15 => Some(OpCode::Push1 as u8 + (n as u8 - 1)),
        _ => None,
    }
}

/// Opcode and length bytes announcing a payload of `len` bytes
fn push_prefix(len: usize) -> Result<Vec<u8>, EmitError> {
    let prefix = if len <= PUSHBYTES75 as usize {
        vec![len as u8]
    } else if len < 0x100 {
        vec![OpCode::PushData1 as u8, len as u8]
    } else if len < 0x10000 {
        let mut prefix = vec![OpCode::PushData2 as u8];
        prefix.extend_from_slice(&(len as u16).to_le_bytes());
        prefix
    } else {
        let len = u32::try_from(len).map_err(|_| EmitError::PayloadTooLong(len))?;
        let mut prefix = vec![OpCode::PushData4 as u8];
        prefix.extend_from_slice(&len.to_le_bytes());
        prefix
    };
    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{State, StackItem, VM};

    /// Run the emitted script and return the single pushed item
    fn decode(emitter: Emitter) -> StackItem {
        let mut vm = VM::new();
        assert_eq!(vm.run(emitter.into_bytes()), State::Halt);
        assert_eq!(vm.estack().len(), 1);
        vm.estack_mut().pop().unwrap()
    }

    #[test]
    fn test_emit_bool() {
        let mut e = Emitter::new();
        e.emit_bool(true);
        e.emit_bool(false);
        assert_eq!(e.as_bytes(), &[0x51, 0x00]);
    }

    #[test]
    fn test_small_ints_use_dedicated_opcodes() {
        let cases = [(-1, 0x4F), (0, 0x00), (1, 0x51), (15, 0x5F)];
        for (value, byte) in cases {
            let mut e = Emitter::new();
            e.emit_int(value);
            assert_eq!(e.as_bytes(), &[byte], "value {}", value);
        }
    }

    #[test]
    fn test_larger_ints_are_little_endian_bytes() {
        let mut e = Emitter::new();
        e.emit_int(16);
        assert_eq!(e.as_bytes(), &[0x01, 0x10]);

        let mut e = Emitter::new();
        e.emit_int(0x1234);
        assert_eq!(e.as_bytes(), &[0x02, 0x34, 0x12]);

        let mut e = Emitter::new();
        e.emit_int(128);
        assert_eq!(e.as_bytes(), &[0x02, 0x80, 0x00]);
    }

    #[test]
    fn test_int_round_trip() {
        for value in [-1i64, 0, 1, 15, 16, 17, 128, -129, 1 << 40, i64::MIN] {
            let mut e = Emitter::new();
            e.emit_int(value);
            let item = decode(e);
            assert_eq!(item.decode_integer().unwrap(), BigInt::from(value), "value {}", value);
        }
    }

    #[test]
    fn test_bigint_round_trip() {
        let value: BigInt = "-123456789012345678901234567890".parse().unwrap();
        let mut e = Emitter::new();
        e.emit_bigint(&value).unwrap();
        assert_eq!(decode(e).decode_integer().unwrap(), value);
    }

    #[test]
    fn test_bytes_pick_smallest_prefix() {
        let cases = [
            (75, 1, 75u8),
            (76, 2, OpCode::PushData1 as u8),
            (255, 2, OpCode::PushData1 as u8),
            (256, 3, OpCode::PushData2 as u8),
            (65535, 3, OpCode::PushData2 as u8),
            (65536, 5, OpCode::PushData4 as u8),
        ];
        for (len, header, first) in cases {
            let data = vec![0xAB; len];
            let mut e = Emitter::new();
            e.emit_bytes(&data).unwrap();
            assert_eq!(e.len(), header + len, "length {}", len);
            assert_eq!(e.as_bytes()[0], first, "length {}", len);
        }
    }

    #[test]
    fn test_bytes_round_trip_across_prefix_tiers() {
        for len in [1usize, 75, 76, 255, 256, 65535, 65536] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut e = Emitter::new();
            e.emit_bytes(&data).unwrap();
            assert_eq!(decode(e), StackItem::from(data), "length {}", len);
        }
    }

    #[test]
    fn test_empty_bytes_share_the_zero_opcode() {
        // Length 0 is the PUSH0 byte, so an empty payload reads back as 0
        let mut e = Emitter::new();
        e.emit_bytes(&[]).unwrap();
        assert_eq!(e.as_bytes(), &[OpCode::Push0 as u8]);
        assert_eq!(decode(e), StackItem::from(0i64));
    }

    #[test]
    fn test_push_prefix_limits() {
        assert_eq!(
            push_prefix(u32::MAX as usize).unwrap(),
            vec![OpCode::PushData4 as u8, 0xff, 0xff, 0xff, 0xff]
        );
        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            push_prefix(u32::MAX as usize + 1),
            Err(EmitError::PayloadTooLong(u32::MAX as usize + 1))
        );
    }

    #[test]
    fn test_emit_string() {
        let mut e = Emitter::new();
        e.emit_string("hello").unwrap();
        assert_eq!(e.as_bytes(), b"\x05hello");
    }

    #[test]
    fn test_emit_syscall() {
        let mut e = Emitter::new();
        e.emit_syscall("System.Runtime.Log").unwrap();
        let bytes = e.as_bytes();
        assert_eq!(bytes[0], OpCode::Syscall as u8);
        assert_eq!(bytes[1], 18);
        assert_eq!(&bytes[2..], b"System.Runtime.Log");

        assert_eq!(Emitter::new().emit_syscall(""), Err(EmitError::EmptySyscall));
        let long = "x".repeat(256);
        assert_eq!(
            Emitter::new().emit_syscall(&long),
            Err(EmitError::SyscallTooLong(256))
        );
    }

    #[test]
    fn test_emit_jmp() {
        let mut e = Emitter::new();
        e.emit_jmp(OpCode::JmpIfNot, -3).unwrap();
        e.emit_call(OpCode::Call, 0x0102).unwrap();
        assert_eq!(e.as_bytes(), &[0x64, 0xFD, 0xFF, 0x65, 0x02, 0x01]);

        let mut e = Emitter::new();
        assert_eq!(e.emit_jmp(OpCode::Add, 1), Err(EmitError::NotAJump("ADD")));
        assert!(e.is_empty());
    }
}
