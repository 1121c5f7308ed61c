//! Calling conventions a type library can declare
//!
//! Only the flat, stack-based convention is dispatched; every method is
//! invoked with its arguments as one flat frame.

/// Calling convention tag as stored in a method descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallingConvention {
    FastCall = 0,
    CDecl = 1,
    Pascal = 2,
    MacPascal = 3,
    /// Callee-cleaned stack arguments, the convention of every vtable method
    StdCall = 4,
    FpFastCall = 5,
    SysCall = 6,
}

impl CallingConvention {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::FastCall),
            1 => Some(Self::CDecl),
            2 => Some(Self::Pascal),
            3 => Some(Self::MacPascal),
            4 => Some(Self::StdCall),
            5 => Some(Self::FpFastCall),
            6 => Some(Self::SysCall),
            _ => None,
        }
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Whether the call shim can forward a flat argument frame to this convention
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::StdCall)
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::StdCall
    }
}
