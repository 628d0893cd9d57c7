//! Assembler and disassembler
//!
//! Compiles assembly-like source to bytecode through the `Emitter`.
//!
//! ```text
//! ; comments start with ';' or '#'
//! PUSH 10            ; integer, decimal or 0x-prefixed hex
//! PUSHBYTES 0xdeadbeef
//! PUSHSTR hello world
//! PUSHT              ; also PUSHF
//! SYSCALL runtime.Log
//! JMPIFNOT done
//! :done
//! RET
//! ```
//!
//! Any other line is a bare mnemonic such as `ADD` or `PICKITEM`.

use crate::compiler::emit::{EmitError, Emitter};
use crate::compiler::syscall;
use crate::vm::opcodes::{instruction_name, is_push_bytes, OpCode};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt::Write;
use thiserror::Error;

/// Assembler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Jump to {label} out of range: offset {offset}")]
    JumpOutOfRange { label: String, offset: i64 },
    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<CompilerError>,
    },
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Two-pass assembler for VM bytecode
pub struct Assembler {
    /// Output bytecode
    emitter: Emitter,
    /// Label positions
    labels: HashMap<String, usize>,
    /// Pending jump operands (opcode position, label name)
    label_refs: Vec<(usize, String)>,
}

impl Assembler {
    /// Create a new assembler
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
            labels: HashMap::new(),
            label_refs: Vec::new(),
        }
    }

    /// Assemble source code to bytecode
    pub fn assemble(&mut self, source: &str) -> Result<Vec<u8>, CompilerError> {
        self.emitter = Emitter::new();
        self.labels.clear();
        self.label_refs.clear();

        // First pass: emit instructions and record labels
        for (index, line) in source.lines().enumerate() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            let result = if let Some(label) = line.strip_prefix(':') {
                self.define_label(label.trim())
            } else {
                self.assemble_instruction(line)
            };
            result.map_err(|e| CompilerError::Line {
                line: index + 1,
                source: Box::new(e),
            })?;
        }

        // Second pass: patch jump offsets, relative to the jump opcode
        for (pos, label) in &self.label_refs {
            let target = self
                .labels
                .get(label)
                .ok_or_else(|| CompilerError::UndefinedLabel(label.clone()))?;
            let offset = *target as i64 - *pos as i64;
            let offset = i16::try_from(offset).map_err(|_| CompilerError::JumpOutOfRange {
                label: label.clone(),
                offset,
            })?;
            self.emitter.patch(pos + 1, &offset.to_le_bytes());
        }

        log::debug!(
            "assembled {} bytes ({} labels)",
            self.emitter.len(),
            self.labels.len()
        );
        Ok(self.emitter.as_bytes().to_vec())
    }

    fn define_label(&mut self, label: &str) -> Result<(), CompilerError> {
        if label.is_empty() {
            return Err(CompilerError::InvalidArgument("empty label".to_string()));
        }
        if self
            .labels
            .insert(label.to_string(), self.emitter.len())
            .is_some()
        {
            return Err(CompilerError::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    /// Assemble a single instruction
    fn assemble_instruction(&mut self, line: &str) -> Result<(), CompilerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (line, ""),
        };
        let instruction = mnemonic.to_ascii_uppercase();

        match instruction.as_str() {
            "PUSH" => {
                let value = parse_number(required(&instruction, rest)?)?;
                self.emitter.emit_bigint(&value)?;
            }
            "PUSHBYTES" => {
                let hex_str = required(&instruction, rest)?;
                let digits = hex_str.strip_prefix("0x").unwrap_or(hex_str);
                let bytes = hex::decode(digits)
                    .map_err(|_| CompilerError::InvalidArgument(hex_str.to_string()))?;
                self.emitter.emit_bytes(&bytes)?;
            }
            "PUSHSTR" => {
                let text = rest
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(rest);
                self.emitter.emit_string(text)?;
            }
            "PUSHT" => self.emitter.emit_bool(true),
            "PUSHF" => self.emitter.emit_bool(false),
            "SYSCALL" => {
                let name = required(&instruction, rest)?;
                let api = syscall::resolve(name).unwrap_or(name);
                self.emitter.emit_syscall(api)?;
            }
            _ => {
                let op = OpCode::from_name(&instruction)
                    .ok_or_else(|| CompilerError::UnknownInstruction(instruction.clone()))?;
                if op.is_jump() {
                    let label = required(&instruction, rest)?;
                    self.label_refs.push((self.emitter.len(), label.to_string()));
                    // Placeholder
                    self.emitter.emit_jmp(op, 0)?;
                } else if matches!(
                    op,
                    OpCode::PushData1 | OpCode::PushData2 | OpCode::PushData4
                ) {
                    return Err(CompilerError::InvalidArgument(format!(
                        "{} is emitted by PUSHBYTES",
                        instruction
                    )));
                } else {
                    self.emitter.emit_opcode(op);
                }
            }
        }

        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c: char| c == ';' || c == '#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn required<'a>(instruction: &str, arg: &'a str) -> Result<&'a str, CompilerError> {
    if arg.is_empty() {
        return Err(CompilerError::InvalidArgument(format!(
            "{} requires an argument",
            instruction
        )));
    }
    Ok(arg)
}

/// Parse an integer (decimal or hex, optionally negative)
fn parse_number(s: &str) -> Result<BigInt, CompilerError> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex_digits) => BigInt::parse_bytes(hex_digits.as_bytes(), 16),
        None => BigInt::parse_bytes(digits.as_bytes(), 10),
    }
    .ok_or_else(|| CompilerError::InvalidNumber(s.to_string()))?;
    Ok(if negative { -value } else { value })
}

/// Disassemble bytecode to readable format
pub fn disassemble(code: &[u8]) -> String {
    let mut output = String::new();
    let mut pc = 0;

    while pc < code.len() {
        let byte = code[pc];
        let _ = write!(output, "{:04x}: {}", pc, instruction_name(byte));
        pc += 1;

        let operand = match OpCode::from_byte(byte) {
            _ if is_push_bytes(byte) => Operand::Bytes(byte as usize),
            Some(OpCode::PushData1) => Operand::PrefixedBytes(1),
            Some(OpCode::PushData2) => Operand::PrefixedBytes(2),
            Some(OpCode::PushData4) => Operand::PrefixedBytes(4),
            Some(OpCode::Syscall) => Operand::Name,
            Some(op) if op.is_jump() => Operand::Offset,
            _ => Operand::None,
        };

        match read_operand(code, pc, operand) {
            Some((text, width)) => {
                output.push_str(&text);
                pc += width;
            }
            None => {
                output.push_str(" <truncated>\n");
                break;
            }
        }
        output.push('\n');
    }

    output
}

#[derive(Clone, Copy)]
enum Operand {
    None,
    /// Fixed byte count
    Bytes(usize),
    /// Byte count from a little-endian length prefix of this width
    PrefixedBytes(usize),
    /// Length-prefixed syscall name
    Name,
    /// Relative i16 target
    Offset,
}

/// Render the operand at `pc`; None when the script ends first
fn read_operand(code: &[u8], pc: usize, operand: Operand) -> Option<(String, usize)> {
    let take = |start: usize, n: usize| code.get(start..start.checked_add(n)?);

    match operand {
        Operand::None => Some((String::new(), 0)),
        Operand::Bytes(n) => {
            let bytes = take(pc, n)?;
            Some((format!(" 0x{}", hex::encode(bytes)), n))
        }
        Operand::PrefixedBytes(width) => {
            let prefix = take(pc, width)?;
            let mut len_bytes = [0u8; 4];
            len_bytes[..width].copy_from_slice(prefix);
            let n = u32::from_le_bytes(len_bytes) as usize;
            let bytes = take(pc + width, n)?;
            Some((format!(" 0x{}", hex::encode(bytes)), width + n))
        }
        Operand::Name => {
            let n = *code.get(pc)? as usize;
            let name = take(pc + 1, n)?;
            Some((format!(" \"{}\"", String::from_utf8_lossy(name)), n + 1))
        }
        Operand::Offset => {
            let raw = take(pc, 2)?;
            let offset = i16::from_le_bytes([raw[0], raw[1]]);
            let target = (pc as i64 - 1) + offset as i64;
            Some((format!(" {:+} (0x{:04x})", offset, target), 2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{State, StackItem, VM};

    fn assemble(source: &str) -> Vec<u8> {
        Assembler::new().assemble(source).unwrap()
    }

    #[test]
    fn test_assemble_simple() {
        let code = assemble(
            "
            PUSH 42
            RET
        ",
        );
        assert_eq!(code, vec![0x01, 42, OpCode::Ret as u8]);
    }

    #[test]
    fn test_assemble_arithmetic_runs() {
        let code = assemble(
            "
            PUSH 10     ; ten
            PUSH 3
            SUB
        ",
        );
        assert_eq!(code[0], 0x5A);
        assert_eq!(code[1], 0x53);
        assert_eq!(code[2], OpCode::Sub as u8);

        let mut vm = VM::new();
        assert_eq!(vm.run(code), State::Halt);
        assert_eq!(vm.estack_mut().pop().unwrap(), StackItem::from(7i64));
    }

    #[test]
    fn test_push_variants() {
        let code = assemble(
            "
            PUSH -1
            PUSH 0x10
            PUSHBYTES 0xdead
            PUSHSTR \"hi there\"
            PUSHT
            PUSHF
        ",
        );
        let mut expected = vec![0x4F, 0x01, 0x10, 0x02, 0xde, 0xad, 0x08];
        expected.extend_from_slice(b"hi there");
        expected.extend_from_slice(&[0x51, 0x00]);
        assert_eq!(code, expected);
    }

    #[test]
    fn test_syscall_short_and_full_names() {
        let short = assemble("SYSCALL runtime.Log");
        let full = assemble("SYSCALL System.Runtime.Log");
        assert_eq!(short, full);
        assert_eq!(short[0], OpCode::Syscall as u8);
        assert_eq!(&short[2..], b"System.Runtime.Log");

        // unknown names pass through verbatim
        let custom = assemble("SYSCALL Custom.Api");
        assert_eq!(&custom[2..], b"Custom.Api");
    }

    #[test]
    fn test_assemble_with_labels() {
        let code = assemble(
            "
            :start
            PUSH1
            JMPIF end
            PUSH 99
            :end
            JMP start
        ",
        );
        // PUSH1 at 0, JMPIF at 1 (+5 -> 6), PUSHBYTES1 99 at 4, JMP at 6 (-6 -> 0)
        assert_eq!(
            code,
            vec![0x51, 0x63, 0x05, 0x00, 0x01, 99, 0x62, 0xFA, 0xFF]
        );
    }

    #[test]
    fn test_label_errors() {
        let err = Assembler::new().assemble("JMP nowhere").unwrap_err();
        assert_eq!(err, CompilerError::UndefinedLabel("nowhere".into()));

        let err = Assembler::new().assemble(":a\n:a").unwrap_err();
        assert!(matches!(err, CompilerError::Line { line: 2, .. }));
    }

    #[test]
    fn test_invalid_input_reports_line() {
        let err = Assembler::new().assemble("PUSH1\nFROB").unwrap_err();
        match err {
            CompilerError::Line { line, source } => {
                assert_eq!(line, 2);
                assert_eq!(*source, CompilerError::UnknownInstruction("FROB".into()));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(Assembler::new().assemble("PUSH abc").is_err());
        assert!(Assembler::new().assemble("PUSH").is_err());
        assert!(Assembler::new().assemble("PUSHBYTES zz").is_err());
        assert!(Assembler::new().assemble("PUSHDATA1").is_err());
    }

    #[test]
    fn test_mnemonics_are_case_insensitive() {
        assert_eq!(assemble("add\nPickItem"), vec![0x93, 0xC3]);
    }

    #[test]
    fn test_disassemble() {
        let code = assemble(
            "
            PUSH 42
            PUSHSTR ok
            SYSCALL runtime.Notify
            :loop
            ADD
            JMP loop
        ",
        );
        let disasm = disassemble(&code);
        let lines: Vec<&str> = disasm.lines().collect();
        assert_eq!(lines[0], "0000: PUSHBYTES1 0x2a");
        assert_eq!(lines[1], "0002: PUSHBYTES2 0x6f6b");
        assert_eq!(lines[2], "0005: SYSCALL \"Neo.Runtime.Notify\"");
        assert!(lines[3].ends_with("ADD"));
        assert!(lines[4].contains("JMP -1"));
    }

    #[test]
    fn test_disassemble_push_data_and_unknown() {
        let mut code = vec![OpCode::PushData1 as u8, 0x02, 0xAA, 0xBB, 0xFF];
        let disasm = disassemble(&code);
        assert!(disasm.contains("PUSHDATA1 0xaabb"));
        assert!(disasm.contains("UNKNOWN(0xff)"));

        code.extend_from_slice(&[0x05, 0x01]);
        assert!(disassemble(&code).ends_with("<truncated>\n"));
    }
}
