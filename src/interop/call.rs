//! Call shim
//!
//! Forwards a flat argument frame to a dispatch-table slot. Only the flat
//! stack convention is accepted; anything else fails before the target runs.

use super::abi::CallingConvention;
use super::value::Value;
use crate::errors::{ErrorKind, Result};
use crate::object::MethodFn;
use crate::status::HResult;

/// Function call descriptor
pub struct FunctionCall<'a> {
    target: &'a MethodFn,
    convention: CallingConvention,
    arity: usize,
}

impl<'a> FunctionCall<'a> {
    #[inline]
    pub fn new(target: &'a MethodFn, convention: CallingConvention, arity: usize) -> Self {
        Self { target, convention, arity }
    }

    /// Invoke the target with `args`, returning its status
    pub fn call(&self, args: &mut [Value]) -> Result<HResult> {
        if !self.convention.is_supported() {
            return Err(ErrorKind::UnsupportedConvention { convention: self.convention }.into());
        }
        if args.len() != self.arity {
            return Err(ErrorKind::ArgCountMismatch { expected: self.arity, got: args.len() }.into());
        }
        Ok((self.target)(args))
    }
}
