//! VM opcodes
//!
//! Defines the instruction set shared by the encoder and the interpreter.
//! Byte values follow the AVM layout so scripts stay bit-compatible.
//!
//! Two opcode ranges carry their operand inside the byte itself and have no
//! enum variant per value:
//! - `0x01..=0x4B` push the next 1-75 bytes (the byte value is the length)
//! - `PUSHM1` and `PUSH1..PUSH16` push the small integers -1 and 1-16

use serde::{Deserialize, Serialize};

/// First opcode of the immediate byte-length push range
pub const PUSHBYTES1: u8 = 0x01;

/// Last opcode of the immediate byte-length push range
pub const PUSHBYTES75: u8 = 0x4B;

macro_rules! define_opcodes {
    ($($(#[$doc:meta])* $variant:ident = $byte:literal, $name:literal;)*) => {
        /// Opcodes for the stack VM
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum OpCode {
            $($(#[$doc])* $variant = $byte,)*
        }

        impl OpCode {
            /// Every named opcode, in byte order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant,)*];

            /// Convert byte to opcode
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(OpCode::$variant),)*
                    _ => None,
                }
            }

            /// Get opcode name for disassembly
            pub fn name(&self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            /// Look up an opcode by its mnemonic (case-insensitive)
            pub fn from_name(name: &str) -> Option<Self> {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    $($name => Some(OpCode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

define_opcodes! {
    // Constants
    /// Push the integer 0 (also the `false` push)
    Push0 = 0x00, "PUSH0";
    /// Push bytes with a 1-byte length prefix
    PushData1 = 0x4C, "PUSHDATA1";
    /// Push bytes with a 2-byte little-endian length prefix
    PushData2 = 0x4D, "PUSHDATA2";
    /// Push bytes with a 4-byte little-endian length prefix
    PushData4 = 0x4E, "PUSHDATA4";
    /// Push the integer -1
    PushM1 = 0x4F, "PUSHM1";
    /// Push the integer 1 (also the `true` push)
    Push1 = 0x51, "PUSH1";
    Push2 = 0x52, "PUSH2";
    Push3 = 0x53, "PUSH3";
    Push4 = 0x54, "PUSH4";
    Push5 = 0x55, "PUSH5";
    Push6 = 0x56, "PUSH6";
    Push7 = 0x57, "PUSH7";
    Push8 = 0x58, "PUSH8";
    Push9 = 0x59, "PUSH9";
    Push10 = 0x5A, "PUSH10";
    Push11 = 0x5B, "PUSH11";
    Push12 = 0x5C, "PUSH12";
    Push13 = 0x5D, "PUSH13";
    Push14 = 0x5E, "PUSH14";
    Push15 = 0x5F, "PUSH15";
    Push16 = 0x60, "PUSH16";

    // Flow control
    /// No operation
    Nop = 0x61, "NOP";
    /// Unconditional jump (2-byte offset)
    Jmp = 0x62, "JMP";
    /// Jump if top of stack is true
    JmpIf = 0x63, "JMPIF";
    /// Jump if top of stack is false
    JmpIfNot = 0x64, "JMPIFNOT";
    /// Call a routine at a 2-byte offset
    Call = 0x65, "CALL";
    /// Return; halts the current run
    Ret = 0x66, "RET";
    /// Invoke a named external capability
    Syscall = 0x68, "SYSCALL";

    // Stack
    /// Copy the top of the alt stack to the evaluation stack
    DupFromAltStack = 0x6A, "DUPFROMALTSTACK";
    /// Move the top item to the alt stack
    ToAltStack = 0x6B, "TOALTSTACK";
    /// Move the top of the alt stack back
    FromAltStack = 0x6C, "FROMALTSTACK";
    /// Remove the item n back in the stack
    XDrop = 0x6D, "XDROP";
    /// Swap the item n back in the stack with the top item
    XSwap = 0x72, "XSWAP";
    /// Push the number of stack items
    Depth = 0x74, "DEPTH";
    /// Remove the top item
    Drop = 0x75, "DROP";
    /// Duplicate the top item
    Dup = 0x76, "DUP";
    /// Remove the second-to-top item
    Nip = 0x77, "NIP";
    /// Copy the second-to-top item to the top
    Over = 0x78, "OVER";
    /// Copy the item n back in the stack to the top
    Pick = 0x79, "PICK";
    /// Move the item n back in the stack to the top
    Roll = 0x7A, "ROLL";
    /// Move the third item to the top
    Rot = 0x7B, "ROT";
    /// Swap the top two items
    Swap = 0x7C, "SWAP";
    /// Insert a copy of the top item n back in the stack
    Tuck = 0x7D, "TUCK";

    // Splice
    /// Concatenate two byte arrays
    Cat = 0x7E, "CAT";
    /// Extract a section of a byte array
    SubStr = 0x7F, "SUBSTR";
    /// Keep the leftmost bytes
    Left = 0x80, "LEFT";
    /// Keep the rightmost bytes
    Right = 0x81, "RIGHT";
    /// Push the length of a byte array
    Size = 0x82, "SIZE";

    // Bitwise
    Invert = 0x83, "INVERT";
    And = 0x84, "AND";
    Or = 0x85, "OR";
    Xor = 0x86, "XOR";
    /// Same-kind value equality
    Equal = 0x87, "EQUAL";

    // Arithmetic
    Inc = 0x8B, "INC";
    Dec = 0x8C, "DEC";
    Sign = 0x8D, "SIGN";
    Negate = 0x8F, "NEGATE";
    Abs = 0x90, "ABS";
    Not = 0x91, "NOT";
    /// Push whether the top integer is non-zero
    Nz = 0x92, "NZ";
    Add = 0x93, "ADD";
    Sub = 0x94, "SUB";
    Mul = 0x95, "MUL";
    Div = 0x96, "DIV";
    Mod = 0x97, "MOD";
    Shl = 0x98, "SHL";
    Shr = 0x99, "SHR";
    BoolAnd = 0x9A, "BOOLAND";
    BoolOr = 0x9B, "BOOLOR";
    NumEqual = 0x9C, "NUMEQUAL";
    NumNotEqual = 0x9E, "NUMNOTEQUAL";
    Lt = 0x9F, "LT";
    Gt = 0xA0, "GT";
    Lte = 0xA1, "LTE";
    Gte = 0xA2, "GTE";
    Min = 0xA3, "MIN";
    Max = 0xA4, "MAX";
    /// lower <= x < upper
    Within = 0xA5, "WITHIN";

    // Crypto
    Sha1 = 0xA7, "SHA1";
    Sha256 = 0xA8, "SHA256";
    Hash160 = 0xA9, "HASH160";
    Hash256 = 0xAA, "HASH256";

    // Array
    ArraySize = 0xC0, "ARRAYSIZE";
    Pack = 0xC1, "PACK";
    Unpack = 0xC2, "UNPACK";
    PickItem = 0xC3, "PICKITEM";
    SetItem = 0xC4, "SETITEM";
    NewArray = 0xC5, "NEWARRAY";
    NewStruct = 0xC6, "NEWSTRUCT";
    Append = 0xC8, "APPEND";
    Reverse = 0xC9, "REVERSE";
    Remove = 0xCA, "REMOVE";

    // Exceptions
    Throw = 0xF0, "THROW";
    ThrowIfNot = 0xF1, "THROWIFNOT";
}

impl OpCode {
    /// The dedicated `true` push
    pub const PUSH_TRUE: OpCode = OpCode::Push1;

    /// The dedicated `false` push
    pub const PUSH_FALSE: OpCode = OpCode::Push0;

    /// Whether this opcode carries a 2-byte jump/call target
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::Jmp | OpCode::JmpIf | OpCode::JmpIfNot | OpCode::Call
        )
    }

    /// Small integer pushed by `PUSHM1`/`PUSH1..PUSH16`, if this is one of them
    pub fn small_int(&self) -> Option<i64> {
        let byte = *self as u8;
        if byte == OpCode::PushM1 as u8
            || (OpCode::Push1 as u8..=OpCode::Push16 as u8).contains(&byte)
        {
            Some(byte as i64 - OpCode::Push1 as i64 + 1)
        } else {
            None
        }
    }
}

/// Whether a raw byte is an immediate byte-length push (`PUSHBYTES1..75`)
pub fn is_push_bytes(byte: u8) -> bool {
    (PUSHBYTES1..=PUSHBYTES75).contains(&byte)
}

/// Human-readable name for any raw instruction byte
pub fn instruction_name(byte: u8) -> String {
    if is_push_bytes(byte) {
        return format!("PUSHBYTES{}", byte);
    }
    match OpCode::from_byte(byte) {
        Some(op) => op.name().to_string(),
        None => format!("UNKNOWN(0x{:02x})", byte),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in OpCode::ALL {
            let byte = *op as u8;
            assert_eq!(OpCode::from_byte(byte), Some(*op));
            assert_eq!(OpCode::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn test_push_bytes_range_has_no_variants() {
        for byte in PUSHBYTES1..=PUSHBYTES75 {
            assert!(is_push_bytes(byte));
            assert_eq!(OpCode::from_byte(byte), None);
        }
        assert!(!is_push_bytes(0x00));
        assert!(!is_push_bytes(OpCode::PushData1 as u8));
        assert_eq!(instruction_name(0x03), "PUSHBYTES3");
    }

    #[test]
    fn test_small_int() {
        assert_eq!(OpCode::PushM1.small_int(), Some(-1));
        assert_eq!(OpCode::Push1.small_int(), Some(1));
        assert_eq!(OpCode::Push16.small_int(), Some(16));
        assert_eq!(OpCode::Push0.small_int(), None);
        assert_eq!(OpCode::Add.small_int(), None);
    }

    #[test]
    fn test_jump_family() {
        assert!(OpCode::Jmp.is_jump());
        assert!(OpCode::Call.is_jump());
        assert!(!OpCode::Ret.is_jump());
        assert!(!OpCode::Syscall.is_jump());
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(OpCode::from_name("pickitem"), Some(OpCode::PickItem));
        assert_eq!(OpCode::from_name("bogus"), None);
    }
}
