//! Type descriptors
//!
//! The vocabulary a type library uses to describe parameters. Tag numbers
//! follow the OLE VARTYPE numbering so they can travel inside variants.

use std::fmt;

/// Interface identity
pub type Guid = uuid::Uuid;

/// IID of the universal root interface
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);
/// IID of the standard late-bound dispatch interface
pub const IID_IDISPATCH: Guid = Guid::from_u128(0x00020400_0000_0000_c000_000000000046);

/// Encode an identity in its 16-byte in-memory (mixed-endian) layout
#[inline]
pub fn guid_to_bytes(guid: &Guid) -> [u8; 16] {
    guid.to_bytes_le()
}

/// Decode an identity from its 16-byte in-memory layout
#[inline]
pub fn guid_from_bytes(bytes: [u8; 16]) -> Guid {
    Guid::from_bytes_le(bytes)
}

/// VARTYPE tags
pub mod vt {
    pub const EMPTY: u16 = 0;
    pub const NULL: u16 = 1;
    pub const I2: u16 = 2;
    pub const I4: u16 = 3;
    pub const R4: u16 = 4;
    pub const R8: u16 = 5;
    pub const CY: u16 = 6;
    pub const DATE: u16 = 7;
    pub const BSTR: u16 = 8;
    pub const DISPATCH: u16 = 9;
    pub const ERROR: u16 = 10;
    pub const BOOL: u16 = 11;
    pub const VARIANT: u16 = 12;
    pub const UNKNOWN: u16 = 13;
    pub const I1: u16 = 16;
    pub const UI1: u16 = 17;
    pub const UI2: u16 = 18;
    pub const UI4: u16 = 19;
    pub const I8: u16 = 20;
    pub const UI8: u16 = 21;
    pub const INT: u16 = 22;
    pub const UINT: u16 = 23;
    pub const VOID: u16 = 24;
    pub const PTR: u16 = 26;
    pub const CARRAY: u16 = 28;
    pub const USERDEFINED: u16 = 29;
}

/// Handle to a user-defined type inside a type library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(pub u32);

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "href#{:x}", self.0)
    }
}

/// Type descriptor as read from a type library
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Void,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    Int,
    UInt,
    Bool,
    /// Status code carried as a value
    Error,
    Currency,
    Date,
    /// Length-prefixed wide string
    BStr,
    /// Self-describing tagged value
    Variant,
    Unknown,
    Dispatch,
    Ptr(Box<TypeDesc>),
    CArray { element: Box<TypeDesc>, count: u32 },
    UserDefined(TypeRef),
    /// A VARTYPE the reader knows but this engine cannot move
    Unsupported(u16),
}

impl TypeDesc {
    pub fn ptr(pointee: TypeDesc) -> Self {
        Self::Ptr(Box::new(pointee))
    }

    pub fn array(element: TypeDesc, count: u32) -> Self {
        Self::CArray { element: Box::new(element), count }
    }

    /// Target of a pointer type
    pub fn pointee(&self) -> Option<&TypeDesc> {
        match self {
            Self::Ptr(inner) => Some(&**inner),
            _ => None,
        }
    }

    /// Width of a fixed-size scalar, `None` for everything else
    pub const fn primitive_width(&self) -> Option<usize> {
        match self {
            Self::I1 | Self::U1 => Some(1),
            Self::I2 | Self::U2 | Self::Bool => Some(2),
            Self::I4 | Self::U4 | Self::Int | Self::UInt | Self::R4 | Self::Error => Some(4),
            Self::I8 | Self::U8 | Self::R8 | Self::Currency | Self::Date => Some(8),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_primitive(&self) -> bool {
        self.primitive_width().is_some()
    }

    pub const fn vartype(&self) -> u16 {
        match self {
            Self::Void => vt::VOID,
            Self::I1 => vt::I1,
            Self::U1 => vt::UI1,
            Self::I2 => vt::I2,
            Self::U2 => vt::UI2,
            Self::I4 => vt::I4,
            Self::U4 => vt::UI4,
            Self::I8 => vt::I8,
            Self::U8 => vt::UI8,
            Self::R4 => vt::R4,
            Self::R8 => vt::R8,
            Self::Int => vt::INT,
            Self::UInt => vt::UINT,
            Self::Bool => vt::BOOL,
            Self::Error => vt::ERROR,
            Self::Currency => vt::CY,
            Self::Date => vt::DATE,
            Self::BStr => vt::BSTR,
            Self::Variant => vt::VARIANT,
            Self::Unknown => vt::UNKNOWN,
            Self::Dispatch => vt::DISPATCH,
            Self::Ptr(_) => vt::PTR,
            Self::CArray { .. } => vt::CARRAY,
            Self::UserDefined(_) => vt::USERDEFINED,
            Self::Unsupported(tag) => *tag,
        }
    }

    /// Type a variant payload is encoded as, for tags that may appear inside one
    pub fn from_variant_tag(tag: u16) -> Option<Self> {
        let ty = match tag {
            vt::I1 => Self::I1,
            vt::UI1 => Self::U1,
            vt::I2 => Self::I2,
            vt::UI2 => Self::U2,
            vt::I4 => Self::I4,
            vt::UI4 => Self::U4,
            vt::I8 => Self::I8,
            vt::UI8 => Self::U8,
            vt::R4 => Self::R4,
            vt::R8 => Self::R8,
            vt::INT => Self::Int,
            vt::UINT => Self::UInt,
            vt::BOOL => Self::Bool,
            vt::ERROR => Self::Error,
            vt::CY => Self::Currency,
            vt::DATE => Self::Date,
            vt::BSTR => Self::BStr,
            vt::UNKNOWN => Self::Unknown,
            vt::DISPATCH => Self::Dispatch,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::I1 => write!(f, "char"),
            Self::U1 => write!(f, "unsigned char"),
            Self::I2 => write!(f, "short"),
            Self::U2 => write!(f, "unsigned short"),
            Self::I4 => write!(f, "long"),
            Self::U4 => write!(f, "unsigned long"),
            Self::I8 => write!(f, "hyper"),
            Self::U8 => write!(f, "unsigned hyper"),
            Self::R4 => write!(f, "float"),
            Self::R8 => write!(f, "double"),
            Self::Int => write!(f, "int"),
            Self::UInt => write!(f, "unsigned int"),
            Self::Bool => write!(f, "VARIANT_BOOL"),
            Self::Error => write!(f, "SCODE"),
            Self::Currency => write!(f, "CURRENCY"),
            Self::Date => write!(f, "DATE"),
            Self::BStr => write!(f, "BSTR"),
            Self::Variant => write!(f, "VARIANT"),
            Self::Unknown => write!(f, "IUnknown*"),
            Self::Dispatch => write!(f, "IDispatch*"),
            Self::Ptr(inner) => write!(f, "{}*", inner),
            Self::CArray { element, count } => write!(f, "{}[{}]", element, count),
            Self::UserDefined(href) => write!(f, "{}", href),
            Self::Unsupported(tag) => write!(f, "vt#{}", tag),
        }
    }
}
