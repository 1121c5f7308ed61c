//! Call status codes
//!
//! 32-bit status values in the HRESULT layout: the high bit marks failure,
//! everything else is facility/code detail the engine only carries around.

use std::fmt;

/// Status returned by every marshaled method call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);

    pub const E_NOTIMPL: Self = Self::from_bits(0x8000_4001);
    pub const E_NOINTERFACE: Self = Self::from_bits(0x8000_4002);
    pub const E_POINTER: Self = Self::from_bits(0x8000_4003);
    pub const E_FAIL: Self = Self::from_bits(0x8000_4005);
    /// "Catastrophic failure"
    pub const E_UNEXPECTED: Self = Self::from_bits(0x8000_FFFF);
    pub const E_OUTOFMEMORY: Self = Self::from_bits(0x8007_000E);
    pub const E_INVALIDARG: Self = Self::from_bits(0x8007_0057);

    pub const DISP_E_BADVARTYPE: Self = Self::from_bits(0x8002_0008);
    pub const DISP_E_TYPEMISMATCH: Self = Self::from_bits(0x8002_0005);
    pub const TYPE_E_ELEMENTNOTFOUND: Self = Self::from_bits(0x8002_802B);

    pub const RPC_E_SERVERFAULT: Self = Self::from_bits(0x8001_0105);
    pub const RPC_E_DISCONNECTED: Self = Self::from_bits(0x8001_0108);
    pub const RPC_E_INVALID_DATA: Self = Self::from_bits(0x8001_010F);
    /// The remote procedure call failed (transport level, not application level)
    pub const CALL_FAILED: Self = Self::from_bits(0x8007_06BE);

    /// Build a status from its unsigned bit pattern
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits as i32)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Convert to a `Result`, keeping success codes other than `S_OK`
    pub fn ok(self) -> Result<HResult, HResult> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self)
        }
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::S_OK => "S_OK",
            Self::S_FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_FAIL => "E_FAIL",
            Self::E_UNEXPECTED => "E_UNEXPECTED",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::DISP_E_BADVARTYPE => "DISP_E_BADVARTYPE",
            Self::DISP_E_TYPEMISMATCH => "DISP_E_TYPEMISMATCH",
            Self::TYPE_E_ELEMENTNOTFOUND => "TYPE_E_ELEMENTNOTFOUND",
            Self::RPC_E_SERVERFAULT => "RPC_E_SERVERFAULT",
            Self::RPC_E_DISCONNECTED => "RPC_E_DISCONNECTED",
            Self::RPC_E_INVALID_DATA => "RPC_E_INVALID_DATA",
            Self::CALL_FAILED => "CALL_FAILED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08x})", name, self.bits()),
            None => write!(f, "0x{:08x}", self.bits()),
        }
    }
}

impl From<i32> for HResult {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
