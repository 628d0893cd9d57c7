//! VM stack
//!
//! A bounded LIFO of `StackItem`s addressed from the top: depth 0 is the top
//! item, depth 1 the one below it, and so on. Every operation checks its
//! precondition and leaves the stack untouched when it fails.

use crate::vm::error::VmError;
use crate::vm::stack_item::StackItem;

/// Default capacity of each VM stack
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// A bounded stack of items
#[derive(Debug, Clone)]
pub struct Stack {
    /// Items, bottom first
    items: Vec<StackItem>,
    /// Maximum number of items
    capacity: usize,
}

impl Stack {
    /// Create an empty stack holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    /// Number of items on the stack
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items bottom first
    pub fn items(&self) -> &[StackItem] {
        &self.items
    }

    /// Items top first
    pub fn iter_from_top(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter().rev()
    }

    /// Fail unless at least `n` items are present
    pub fn ensure_depth(&self, n: usize) -> Result<(), VmError> {
        if self.items.len() < n {
            return Err(VmError::StackUnderflow {
                needed: n,
                available: self.items.len(),
            });
        }
        Ok(())
    }

    /// Fail unless `n` more items fit
    pub fn ensure_room(&self, n: usize) -> Result<(), VmError> {
        if self.items.len() + n > self.capacity {
            return Err(VmError::StackOverflow(self.capacity));
        }
        Ok(())
    }

    /// Push an item on top
    pub fn push(&mut self, item: StackItem) -> Result<(), VmError> {
        self.ensure_room(1)?;
        self.items.push(item);
        Ok(())
    }

    /// Pop the top item
    pub fn pop(&mut self) -> Result<StackItem, VmError> {
        self.ensure_depth(1)?;
        self.items.pop().ok_or(VmError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Pop the top `n` items, top first
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<StackItem>, VmError> {
        self.ensure_depth(n)?;
        let split = self.items.len() - n;
        let mut popped = self.items.split_off(split);
        popped.reverse();
        Ok(popped)
    }

    /// Discard the top `n` items
    pub fn drop_n(&mut self, n: usize) -> Result<(), VmError> {
        self.ensure_depth(n)?;
        let len = self.items.len();
        self.items.truncate(len - n);
        Ok(())
    }

    /// The top item
    pub fn peek(&self) -> Result<&StackItem, VmError> {
        self.peek_n(0)
    }

    /// The item `n` positions below the top
    pub fn peek_n(&self, n: usize) -> Result<&StackItem, VmError> {
        let index = self.index_of(n)?;
        Ok(&self.items[index])
    }

    /// Shallow copy of the top item. Array items keep sharing their elements.
    pub fn dup(&self) -> Result<StackItem, VmError> {
        self.peek().cloned()
    }

    /// Insert `item` so that it ends up `n` positions below the top
    pub fn insert_at(&mut self, item: StackItem, n: usize) -> Result<(), VmError> {
        if n > self.items.len() {
            return Err(VmError::StackUnderflow {
                needed: n,
                available: self.items.len(),
            });
        }
        self.ensure_room(1)?;
        let index = self.items.len() - n;
        self.items.insert(index, item);
        Ok(())
    }

    /// Remove and return the item `n` positions below the top
    pub fn remove_at(&mut self, n: usize) -> Result<StackItem, VmError> {
        let index = self.index_of(n)?;
        Ok(self.items.remove(index))
    }

    /// Swap the item `n` positions below the top with the top item
    pub fn swap(&mut self, n: usize) -> Result<(), VmError> {
        let index = self.index_of(n)?;
        let top = self.items.len() - 1;
        self.items.swap(index, top);
        Ok(())
    }

    fn index_of(&self, n: usize) -> Result<usize, VmError> {
        self.ensure_depth(n + 1)?;
        Ok(self.items.len() - 1 - n)
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(values: &[i64]) -> Stack {
        let mut stack = Stack::default();
        for v in values {
            stack.push(StackItem::from(*v)).unwrap();
        }
        stack
    }

    fn ints(stack: &Stack) -> Vec<i64> {
        stack.items().iter().map(|i| i.as_i64().unwrap()).collect()
    }

    #[test]
    fn test_push_pop_peek() {
        let mut stack = stack_of(&[1, 2, 3]);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.peek().unwrap().as_i64().unwrap(), 3);
        assert_eq!(stack.peek_n(2).unwrap().as_i64().unwrap(), 1);
        assert_eq!(stack.pop().unwrap().as_i64().unwrap(), 3);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_underflow_is_an_error() {
        let mut stack = Stack::default();
        assert!(matches!(stack.pop(), Err(VmError::StackUnderflow { .. })));
        assert!(stack.peek().is_err());
        assert!(stack_of(&[1]).peek_n(1).is_err());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut stack = Stack::new(2);
        stack.push(StackItem::from(1i64)).unwrap();
        stack.push(StackItem::from(2i64)).unwrap();
        assert_eq!(
            stack.push(StackItem::from(3i64)),
            Err(VmError::StackOverflow(2))
        );
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_insert_at() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.insert_at(StackItem::from(9i64), 0).unwrap();
        assert_eq!(ints(&stack), vec![1, 2, 3, 9]);

        let mut stack = stack_of(&[1, 2, 3]);
        stack.insert_at(StackItem::from(9i64), 3).unwrap();
        assert_eq!(ints(&stack), vec![9, 1, 2, 3]);
        assert_eq!(stack.peek_n(3).unwrap().as_i64().unwrap(), 9);

        let mut stack = stack_of(&[1, 2, 3]);
        assert!(stack.insert_at(StackItem::from(9i64), 4).is_err());
        assert_eq!(ints(&stack), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_at() {
        let mut stack = stack_of(&[1, 2, 3, 4]);
        assert_eq!(stack.remove_at(2).unwrap().as_i64().unwrap(), 2);
        assert_eq!(ints(&stack), vec![1, 3, 4]);
        assert!(stack.remove_at(3).is_err());
        assert_eq!(ints(&stack), vec![1, 3, 4]);
    }

    #[test]
    fn test_swap() {
        let mut stack = stack_of(&[2, 5, 8]);
        stack.swap(2).unwrap();
        assert_eq!(ints(&stack), vec![8, 5, 2]);
        assert!(stack.swap(3).is_err());
    }

    #[test]
    fn test_pop_n_is_top_first() {
        let mut stack = stack_of(&[1, 2, 3]);
        let popped: Vec<i64> = stack
            .pop_n(2)
            .unwrap()
            .iter()
            .map(|i| i.as_i64().unwrap())
            .collect();
        assert_eq!(popped, vec![3, 2]);
        assert!(stack.pop_n(2).is_err());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_dup_is_equal_copy() {
        let stack = stack_of(&[7]);
        let copy = stack.dup().unwrap();
        assert_eq!(&copy, stack.peek().unwrap());
    }
}
