//! Syscall boundary
//!
//! The SYSCALL opcode names an external capability by an ASCII identifier.
//! The VM does not implement any capability itself; it hands the name and
//! the evaluation stack to an `InteropService` and faults if the service
//! rejects the call.

use crate::vm::error::VmError;
use crate::vm::stack::Stack;
use std::collections::BTreeMap;

/// Resolves syscalls for a VM
pub trait InteropService {
    /// Execute `api` against the evaluation stack.
    ///
    /// Handlers must either complete or return an error without touching
    /// the stack, so a failed syscall leaves the VM in its pre-call state.
    fn invoke(&mut self, api: &str, estack: &mut Stack) -> Result<(), VmError>;
}

/// A syscall handler
pub type InteropHandler = Box<dyn FnMut(&mut Stack) -> Result<(), VmError>>;

/// Name → handler table
#[derive(Default)]
pub struct InteropRegistry {
    handlers: BTreeMap<String, InteropHandler>,
}

impl InteropRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `api`, replacing any previous one
    pub fn register<F>(&mut self, api: impl Into<String>, handler: F)
    where
        F: FnMut(&mut Stack) -> Result<(), VmError> + 'static,
    {
        self.handlers.insert(api.into(), Box::new(handler));
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl InteropService for InteropRegistry {
    fn invoke(&mut self, api: &str, estack: &mut Stack) -> Result<(), VmError> {
        let handler = self
            .handlers
            .get_mut(api)
            .ok_or_else(|| VmError::UnknownSyscall(api.to_string()))?;
        handler(estack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::stack_item::StackItem;

    #[test]
    fn test_registry_dispatches_by_name() {
        let mut registry = InteropRegistry::new();
        registry.register("System.Runtime.GetTrigger", |estack| {
            estack.push(StackItem::from(0x10i64))
        });

        let mut estack = Stack::default();
        registry
            .invoke("System.Runtime.GetTrigger", &mut estack)
            .unwrap();
        assert_eq!(estack.pop().unwrap(), StackItem::from(0x10i64));
    }

    #[test]
    fn test_unknown_syscall() {
        let mut registry = InteropRegistry::new();
        let mut estack = Stack::default();
        assert_eq!(
            registry.invoke("System.Storage.Get", &mut estack),
            Err(VmError::UnknownSyscall("System.Storage.Get".to_string()))
        );
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = InteropRegistry::new();
        registry.register("b", |_| Ok(()));
        registry.register("a", |_| Ok(()));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
