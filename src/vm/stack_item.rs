//! Stack item values
//!
//! A `StackItem` is a closed tagged value over the four kinds the VM knows
//! about. The tag is fixed at construction and every typed accessor checks
//! it; there is no implicit coercion between kinds.
//!
//! Array items share their backing storage: cloning an `Array` item clones
//! the handle, not the elements, so SETITEM through one handle is visible
//! through every other handle to the same array.
//!
//! Scripts can nest arrays arbitrarily deep and can make an array contain
//! itself. Nothing here recurses once per nesting level: dropping, equality
//! and display all stay off the native call stack or stop at a fixed depth.

use crate::vm::context::Context;
use crate::vm::error::VmError;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Nesting depth past which `Display` prints `[...]`
const MAX_DISPLAY_DEPTH: usize = 32;

/// Shared backing storage of an Array item
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<StackItem>>>);

impl ArrayRef {
    pub fn new(items: Vec<StackItem>) -> Self {
        ArrayRef(Rc::new(RefCell::new(items)))
    }

    /// Whether both handles point at the same storage
    pub fn ptr_eq(a: &ArrayRef, b: &ArrayRef) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Deref for ArrayRef {
    type Target = RefCell<Vec<StackItem>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Releasing the last handle drains nested arrays into a worklist, so a
/// million-level nest is freed without a million native frames.
impl Drop for ArrayRef {
    fn drop(&mut self) {
        let mut pending = match Rc::get_mut(&mut self.0) {
            Some(cell) => std::mem::take(cell.get_mut()),
            None => return,
        };
        while let Some(item) = pending.pop() {
            if let StackItem::Array(mut child) = item {
                if let Some(cell) = Rc::get_mut(&mut child.0) {
                    pending.append(cell.get_mut());
                }
            }
        }
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_array(self, f, &mut Vec::new())
    }
}

/// Shared handle to an execution frame
pub type ContextRef = Rc<RefCell<Context>>;

/// The kind (tag) of a stack item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackItemKind {
    BigInteger,
    ByteArray,
    Array,
    Context,
}

impl fmt::Display for StackItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackItemKind::BigInteger => "BigInteger",
            StackItemKind::ByteArray => "ByteArray",
            StackItemKind::Array => "Array",
            StackItemKind::Context => "Context",
        };
        f.write_str(name)
    }
}

/// A value living on one of the VM stacks
#[derive(Debug, Clone)]
pub enum StackItem {
    BigInteger(BigInt),
    ByteArray(Vec<u8>),
    Array(ArrayRef),
    Context(ContextRef),
}

impl StackItem {
    /// Build a fresh array item (not aliased with anything)
    pub fn new_array(items: Vec<StackItem>) -> Self {
        StackItem::Array(ArrayRef::new(items))
    }

    /// Wrap an execution frame
    pub fn new_context(context: Context) -> Self {
        StackItem::Context(Rc::new(RefCell::new(context)))
    }

    /// The tag of this item
    pub fn kind(&self) -> StackItemKind {
        match self {
            StackItem::BigInteger(_) => StackItemKind::BigInteger,
            StackItem::ByteArray(_) => StackItemKind::ByteArray,
            StackItem::Array(_) => StackItemKind::Array,
            StackItem::Context(_) => StackItemKind::Context,
        }
    }

    fn mismatch(&self, expected: StackItemKind) -> VmError {
        VmError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Integer view; requires a BigInteger item
    pub fn as_bigint(&self) -> Result<&BigInt, VmError> {
        match self {
            StackItem::BigInteger(value) => Ok(value),
            other => Err(other.mismatch(StackItemKind::BigInteger)),
        }
    }

    /// Integer view narrowed to `i64`
    pub fn as_i64(&self) -> Result<i64, VmError> {
        let value = self.as_bigint()?;
        value
            .to_i64()
            .ok_or_else(|| VmError::IntegerOutOfRange(value.to_string()))
    }

    /// Boolean view; requires a BigInteger item, true when non-zero
    pub fn as_bool(&self) -> Result<bool, VmError> {
        Ok(!self.as_bigint()?.is_zero())
    }

    /// Array view; requires an Array item
    pub fn as_array(&self) -> Result<&ArrayRef, VmError> {
        match self {
            StackItem::Array(items) => Ok(items),
            other => Err(other.mismatch(StackItemKind::Array)),
        }
    }

    /// Byte view; requires a ByteArray item
    pub fn as_bytes(&self) -> Result<&[u8], VmError> {
        match self {
            StackItem::ByteArray(bytes) => Ok(bytes),
            other => Err(other.mismatch(StackItemKind::ByteArray)),
        }
    }

    /// Consume a ByteArray item into its bytes
    pub fn into_byte_array(self) -> Result<Vec<u8>, VmError> {
        match self {
            StackItem::ByteArray(bytes) => Ok(bytes),
            other => Err(other.mismatch(StackItemKind::ByteArray)),
        }
    }

    /// Execution frame view; requires a Context item
    pub fn as_context(&self) -> Result<&ContextRef, VmError> {
        match self {
            StackItem::Context(ctx) => Ok(ctx),
            other => Err(other.mismatch(StackItemKind::Context)),
        }
    }

    /// Append `other` to this item, producing a new item.
    ///
    /// Arrays gain `other` as a trailing element; byte arrays are
    /// concatenated with another byte array. The receiver is left untouched.
    pub fn append(&self, other: &StackItem) -> Result<StackItem, VmError> {
        match (self, other) {
            (StackItem::Array(items), _) => {
                let mut extended = items.borrow().clone();
                extended.push(other.clone());
                Ok(StackItem::new_array(extended))
            }
            (StackItem::ByteArray(bytes), StackItem::ByteArray(tail)) => {
                let mut joined = Vec::with_capacity(bytes.len() + tail.len());
                joined.extend_from_slice(bytes);
                joined.extend_from_slice(tail);
                Ok(StackItem::ByteArray(joined))
            }
            _ => Err(VmError::UnsupportedAppend {
                target: self.kind(),
                item: other.kind(),
            }),
        }
    }

    /// Decode an integer from either kind: BigInteger as is, ByteArray as
    /// little-endian two's complement (the encoder's wire convention).
    pub fn decode_integer(&self) -> Result<BigInt, VmError> {
        match self {
            StackItem::BigInteger(value) => Ok(value.clone()),
            StackItem::ByteArray(bytes) => Ok(BigInt::from_signed_bytes_le(bytes)),
            other => Err(other.mismatch(StackItemKind::BigInteger)),
        }
    }

    /// Human-readable rendering, for diagnostics only.
    ///
    /// An array already being printed further up (a cycle) or nested more
    /// than 32 levels deep prints as `[...]`.
    pub fn inspect(&self) -> String {
        self.to_string()
    }

    fn write_nested(&self, f: &mut fmt::Formatter<'_>, path: &mut Vec<usize>) -> fmt::Result {
        match self {
            StackItem::BigInteger(value) => write!(f, "{}", value),
            StackItem::ByteArray(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            StackItem::Array(items) => write_array(items, f, path),
            StackItem::Context(ctx) => write!(f, "<context ip={}>", ctx.borrow().ip()),
        }
    }
}

fn write_array(
    items: &ArrayRef,
    f: &mut fmt::Formatter<'_>,
    path: &mut Vec<usize>,
) -> fmt::Result {
    if path.len() >= MAX_DISPLAY_DEPTH || path.contains(&items.addr()) {
        return f.write_str("[...]");
    }
    path.push(items.addr());
    write!(f, "[")?;
    for (i, item) in items.borrow().iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        item.write_nested(f, path)?;
    }
    path.pop();
    write!(f, "]")
}

/// Tag and scalar comparison; array pairs are queued for the caller
fn shallow_eq(a: &StackItem, b: &StackItem, pending: &mut Vec<(ArrayRef, ArrayRef)>) -> bool {
    match (a, b) {
        (StackItem::BigInteger(x), StackItem::BigInteger(y)) => x == y,
        (StackItem::ByteArray(x), StackItem::ByteArray(y)) => x == y,
        (StackItem::Array(x), StackItem::Array(y)) => {
            pending.push((x.clone(), y.clone()));
            true
        }
        (StackItem::Context(x), StackItem::Context(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Diagnostic value equality: same tag and equal underlying values, arrays
/// element-wise. Contexts compare by identity.
///
/// Arrays are walked with a worklist. A pair of arrays already under
/// comparison counts as equal, so self-containing arrays compare without
/// looping.
impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = Vec::new();
        if !shallow_eq(self, other, &mut pending) {
            return false;
        }
        let mut seen = HashSet::new();
        while let Some((a, b)) = pending.pop() {
            if ArrayRef::ptr_eq(&a, &b) || !seen.insert((a.addr(), b.addr())) {
                continue;
            }
            let (xs, ys) = (a.borrow(), b.borrow());
            if xs.len() != ys.len() {
                return false;
            }
            for (x, y) in xs.iter().zip(ys.iter()) {
                if !shallow_eq(x, y, &mut pending) {
                    return false;
                }
            }
        }
        true
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_nested(f, &mut Vec::new())
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        StackItem::BigInteger(value)
    }
}

impl From<i64> for StackItem {
    fn from(value: i64) -> Self {
        StackItem::BigInteger(BigInt::from(value))
    }
}

impl From<i32> for StackItem {
    fn from(value: i32) -> Self {
        StackItem::BigInteger(BigInt::from(value))
    }
}

impl From<usize> for StackItem {
    fn from(value: usize) -> Self {
        StackItem::BigInteger(BigInt::from(value))
    }
}

/// Booleans are integers 1 and 0
impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::BigInteger(BigInt::from(value as u8))
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        StackItem::ByteArray(value)
    }
}

impl From<&[u8]> for StackItem {
    fn from(value: &[u8]) -> Self {
        StackItem::ByteArray(value.to_vec())
    }
}

impl From<Vec<StackItem>> for StackItem {
    fn from(value: Vec<StackItem>) -> Self {
        StackItem::new_array(value)
    }
}

impl From<Context> for StackItem {
    fn from(value: Context) -> Self {
        StackItem::new_context(value)
    }
}

/// Construction from a dynamic value, selecting the tag by shape.
impl TryFrom<serde_json::Value> for StackItem {
    type Error = VmError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Ok(StackItem::from(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(StackItem::from(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(StackItem::BigInteger(BigInt::from(u)))
                } else {
                    Err(VmError::UnsupportedValue(format!("non-integer number {}", n)))
                }
            }
            Value::String(s) => Ok(StackItem::ByteArray(s.into_bytes())),
            Value::Array(values) => {
                let items = values
                    .into_iter()
                    .map(StackItem::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StackItem::new_array(items))
            }
            Value::Null => Err(VmError::UnsupportedValue("null".to_string())),
            Value::Object(_) => Err(VmError::UnsupportedValue("object".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construction_selects_tag() {
        assert_eq!(StackItem::from(7i64).kind(), StackItemKind::BigInteger);
        assert_eq!(StackItem::from(vec![1u8, 2]).kind(), StackItemKind::ByteArray);
        assert_eq!(
            StackItem::from(vec![StackItem::from(1i64)]).kind(),
            StackItemKind::Array
        );
        assert_eq!(
            StackItem::from(Context::new(vec![0x66])).kind(),
            StackItemKind::Context
        );
    }

    #[test]
    fn test_accessor_rejects_wrong_tag() {
        let item = StackItem::from(b"abc".to_vec());
        let err = item.as_bigint().unwrap_err();
        assert_eq!(
            err,
            VmError::TypeMismatch {
                expected: StackItemKind::BigInteger,
                found: StackItemKind::ByteArray,
            }
        );
        assert!(item.as_bool().is_err());
        assert!(item.as_array().is_err());
        assert!(StackItem::from(1i64).as_bytes().is_err());
        assert!(StackItem::from(1i64).into_byte_array().is_err());
    }

    #[test]
    fn test_bool_view() {
        assert!(StackItem::from(true).as_bool().unwrap());
        assert!(!StackItem::from(0i64).as_bool().unwrap());
        assert!(StackItem::from(-3i64).as_bool().unwrap());
    }

    #[test]
    fn test_append_array() {
        let arr = StackItem::new_array(vec![StackItem::from(1i64)]);
        let appended = arr.append(&StackItem::from(4i64)).unwrap();
        let items = appended.as_array().unwrap().borrow();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], StackItem::from(4i64));
        // receiver untouched
        assert_eq!(arr.as_array().unwrap().borrow().len(), 1);
    }

    #[test]
    fn test_append_bytes() {
        let a = StackItem::from(b"abc".to_vec());
        let b = StackItem::from(b"de".to_vec());
        assert_eq!(a.append(&b).unwrap(), StackItem::from(b"abcde".to_vec()));
    }

    #[test]
    fn test_append_unsupported() {
        let a = StackItem::from(b"abc".to_vec());
        assert!(matches!(
            a.append(&StackItem::from(1i64)),
            Err(VmError::UnsupportedAppend { .. })
        ));
        assert!(StackItem::from(1i64).append(&StackItem::from(1i64)).is_err());
    }

    #[test]
    fn test_clone_aliases_array_storage() {
        let arr = StackItem::new_array(vec![StackItem::from(1i64)]);
        let alias = arr.clone();
        alias.as_array().unwrap().borrow_mut()[0] = StackItem::from(9i64);
        assert_eq!(arr.as_array().unwrap().borrow()[0], StackItem::from(9i64));
    }

    #[test]
    fn test_equality() {
        assert_eq!(StackItem::from(5i64), StackItem::from(5i64));
        assert_ne!(StackItem::from(5i64), StackItem::from(vec![5u8]));
        assert_eq!(
            StackItem::new_array(vec![StackItem::from(1i64), StackItem::from(vec![2u8])]),
            StackItem::new_array(vec![StackItem::from(1i64), StackItem::from(vec![2u8])])
        );
        let a = StackItem::from(Context::new(vec![]));
        let b = StackItem::from(Context::new(vec![]));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(
            StackItem::from(vec![0x80u8, 0x00]).decode_integer().unwrap(),
            BigInt::from(128)
        );
        assert_eq!(
            StackItem::from(vec![0xffu8]).decode_integer().unwrap(),
            BigInt::from(-1)
        );
    }

    #[test]
    fn test_try_from_json() {
        let item = StackItem::try_from(json!([1, "ab", true])).unwrap();
        let items = item.as_array().unwrap().borrow();
        assert_eq!(items[0], StackItem::from(1i64));
        assert_eq!(items[1], StackItem::from(b"ab".to_vec()));
        assert_eq!(items[2], StackItem::from(1i64));
    }

    #[test]
    fn test_try_from_json_rejects_unsupported_shapes() {
        assert!(matches!(
            StackItem::try_from(json!(1.5)),
            Err(VmError::UnsupportedValue(_))
        ));
        assert!(StackItem::try_from(json!(null)).is_err());
        assert!(StackItem::try_from(json!({"a": 1})).is_err());
        assert!(StackItem::try_from(json!([1, null])).is_err());
    }

    fn nested(depth: usize) -> StackItem {
        let mut item = StackItem::from(1i64);
        for _ in 0..depth {
            item = StackItem::new_array(vec![item]);
        }
        item
    }

    fn self_containing() -> StackItem {
        let item = StackItem::new_array(vec![StackItem::from(1i64)]);
        item.as_array().unwrap().borrow_mut()[0] = item.clone();
        item
    }

    #[test]
    fn test_deep_nesting_drops_and_compares() {
        let a = nested(500_000);
        let b = nested(500_000);
        assert_eq!(a, b);
        assert_ne!(a, nested(499_999));
        drop(a);
        drop(b);
    }

    #[test]
    fn test_shared_child_survives_parent_drop() {
        let child = StackItem::new_array(vec![StackItem::from(7i64)]);
        let parent = StackItem::new_array(vec![child.clone()]);
        drop(parent);
        assert_eq!(child.as_array().unwrap().borrow()[0], StackItem::from(7i64));
    }

    #[test]
    fn test_self_containing_array() {
        let a = self_containing();
        let b = self_containing();
        assert_eq!(a, b);
        assert_eq!(a.inspect(), "[[...]]");
        assert!(nested(100).inspect().ends_with("[...]]]]"));
        // break the cycle so the storage is freed
        a.as_array().unwrap().borrow_mut().clear();
        b.as_array().unwrap().borrow_mut().clear();
    }

    #[test]
    fn test_display() {
        let item = StackItem::new_array(vec![StackItem::from(1i64), StackItem::from(vec![0xabu8])]);
        assert_eq!(item.inspect(), "[1, 0xab]");
    }
}
