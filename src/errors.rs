//! Marshaling errors
//!
//! Every failure the engine detects locally is a [`MarshalError`]. Its
//! [`ErrorCategory`] says when it can happen relative to transmission and
//! [`MarshalError::status`] gives the status reported to a caller.

use crate::channel::TransportError;
use crate::interop::CallingConvention;
use crate::status::HResult;
use crate::typelib::{Guid, TypeRef};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownInterface { iid: Guid },
    UnresolvedType { href: TypeRef },
    UnresolvedAncestor { iid: Guid, depth: u16 },
    UnknownMethod { interface: String, depth: u16, ordinal: u16 },
    DispatchOnly { iid: Guid },
    NoInterface { iid: Guid, status: HResult },
    InvalidSlot { slot: usize, slots: usize },
    UnsupportedType { ty: String },
    UnsupportedConvention { convention: CallingConvention },
    ValueMismatch { expected: String, found: String },
    ArgCountMismatch { expected: usize, got: usize },
    Truncated { needed: usize, available: usize },
    TrailingData { remaining: usize },
    MessageTooLarge { size: usize, limit: usize },
    OutOfMemory { requested: usize },
    UnknownExport { cookie: u64 },
    MalformedExport { len: usize },
    Transport(TransportError),
}

/// When an error can occur relative to putting bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// An identity, type or method could not be found
    Resolution,
    /// A type kind, value or convention cannot be encoded
    Encoding,
    /// Send/receive failed or the remote side faulted
    Transport,
    /// Buffer growth failed
    Allocation,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownInterface { .. }
            | Self::UnresolvedType { .. }
            | Self::UnresolvedAncestor { .. }
            | Self::UnknownMethod { .. }
            | Self::DispatchOnly { .. }
            | Self::NoInterface { .. }
            | Self::InvalidSlot { .. }
            | Self::UnknownExport { .. } => ErrorCategory::Resolution,
            Self::UnsupportedType { .. }
            | Self::UnsupportedConvention { .. }
            | Self::ValueMismatch { .. }
            | Self::ArgCountMismatch { .. }
            | Self::Truncated { .. }
            | Self::TrailingData { .. }
            | Self::MalformedExport { .. } => ErrorCategory::Encoding,
            Self::MessageTooLarge { .. } | Self::OutOfMemory { .. } => ErrorCategory::Allocation,
            Self::Transport(_) => ErrorCategory::Transport,
        }
    }

    /// Status a caller sees for this failure
    pub fn status(&self) -> HResult {
        match self {
            Self::UnknownInterface { .. } | Self::DispatchOnly { .. } => HResult::E_NOINTERFACE,
            Self::NoInterface { status, .. } => *status,
            Self::UnresolvedType { .. }
            | Self::UnresolvedAncestor { .. }
            | Self::UnknownMethod { .. }
            | Self::InvalidSlot { .. } => HResult::TYPE_E_ELEMENTNOTFOUND,
            Self::UnsupportedType { .. } => HResult::DISP_E_BADVARTYPE,
            Self::UnsupportedConvention { .. } => HResult::E_NOTIMPL,
            Self::ValueMismatch { .. } => HResult::DISP_E_TYPEMISMATCH,
            Self::ArgCountMismatch { .. } => HResult::E_INVALIDARG,
            Self::Truncated { .. }
            | Self::TrailingData { .. }
            | Self::MalformedExport { .. }
            | Self::UnknownExport { .. } => HResult::RPC_E_INVALID_DATA,
            Self::MessageTooLarge { .. } | Self::OutOfMemory { .. } => HResult::E_OUTOFMEMORY,
            Self::Transport(err) => err.status(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInterface { iid } => {
                write!(f, "No type information for interface {{{}}}", iid)
            }
            Self::UnresolvedType { href } => {
                write!(f, "Cannot resolve user-defined type {}", href)
            }
            Self::UnresolvedAncestor { iid, depth } => {
                write!(f, "Cannot resolve ancestor {{{}}} at depth {}", iid, depth)
            }
            Self::UnknownMethod { interface, depth, ordinal } => {
                write!(f, "{} has no method {} (depth {})", interface, ordinal, depth)
            }
            Self::DispatchOnly { iid } => {
                write!(f, "Interface {{{}}} is dispatch-only and has no vtable to marshal", iid)
            }
            Self::NoInterface { iid, status } => {
                write!(f, "Object does not support {{{}}}: {}", iid, status)
            }
            Self::InvalidSlot { slot, slots } => {
                write!(f, "Dispatch slot {} is not a method (table has {} slots)", slot, slots)
            }
            Self::UnsupportedType { ty } => write!(f, "Cannot marshal type {}", ty),
            Self::UnsupportedConvention { convention } => {
                write!(f, "Calling convention {:?} is not supported", convention)
            }
            Self::ValueMismatch { expected, found } => {
                write!(f, "Value mismatch: expected {}, found {}", expected, found)
            }
            Self::ArgCountMismatch { expected, got } => {
                write!(f, "Expected {} arguments, got {}", expected, got)
            }
            Self::Truncated { needed, available } => {
                write!(f, "Message truncated: needed {} bytes, {} available", needed, available)
            }
            Self::TrailingData { remaining } => {
                write!(f, "{} unread bytes after the last parameter", remaining)
            }
            Self::MessageTooLarge { size, limit } => {
                write!(f, "Message of {} bytes exceeds the {} byte limit", size, limit)
            }
            Self::OutOfMemory { requested } => {
                write!(f, "Failed to grow message buffer by {} bytes", requested)
            }
            Self::UnknownExport { cookie } => {
                write!(f, "No exported object for cookie {:#x}", cookie)
            }
            Self::MalformedExport { len } => {
                write!(f, "Malformed interface reference ({} bytes)", len)
            }
            Self::Transport(err) => write!(f, "Transport error: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalError {
    pub kind: ErrorKind,
    pub notes: Vec<String>,
}

impl MarshalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, notes: Vec::new() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    #[inline]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    #[inline]
    pub fn status(&self) -> HResult {
        self.kind.status()
    }

    pub fn value_mismatch(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::new(ErrorKind::ValueMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        Ok(())
    }
}

impl std::error::Error for MarshalError {}

impl From<ErrorKind> for MarshalError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<TransportError> for MarshalError {
    fn from(err: TransportError) -> Self {
        Self::new(ErrorKind::Transport(err))
    }
}

pub type Result<T> = std::result::Result<T, MarshalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = MarshalError::from(ErrorKind::UnresolvedAncestor { iid: Guid::nil(), depth: 1 });
        assert_eq!(err.category(), ErrorCategory::Resolution);
        assert_eq!(err.status(), HResult::TYPE_E_ELEMENTNOTFOUND);

        let err = MarshalError::from(TransportError::Disconnected);
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert_eq!(err.status(), HResult::RPC_E_DISCONNECTED);

        let err = MarshalError::from(ErrorKind::MessageTooLarge { size: 10, limit: 4 });
        assert_eq!(err.category(), ErrorCategory::Allocation);
    }

    #[test]
    fn test_display_with_notes() {
        let err = MarshalError::value_mismatch("long", "BSTR").with_note("parameter 'count'");
        let text = err.to_string();
        assert!(text.starts_with("Value mismatch: expected long, found BSTR"));
        assert!(text.contains("note: parameter 'count'"));
    }
}
