//! Argument values
//!
//! A method call's argument frame is a slice of [`Value`]s, one per declared
//! parameter. Out parameters are `Ptr` values whose pointee is the storage
//! the callee writes into.

use super::size::{POINTER_SIZE, VARIANT_SIZE};
use crate::object::{same_object, ObjectRef};
use crate::status::HResult;
use crate::typelib::{guid_from_bytes, vt, Guid};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub enum Value {
    /// Unset slot, or an empty variant
    #[default]
    Empty,
    /// Variant holding SQL-style null
    Null,
    I1(i8),
    U1(u8),
    I2(i16),
    U2(u16),
    I4(i32),
    U4(u32),
    I8(i64),
    U8(u64),
    R4(f32),
    R8(f64),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Error(HResult),
    Currency(i64),
    Date(f64),
    /// UTF-16 code units, `None` for a null string
    BStr(Option<Vec<u16>>),
    Variant(Box<Value>),
    Ptr(Option<Box<Value>>),
    Array(Vec<Value>),
    /// Flat record or enum storage
    Blob(Vec<u8>),
    Interface(Option<ObjectRef>),
    /// Reference handed over as IDispatch, tagged `VT_DISPATCH` in a variant
    Dispatch(Option<ObjectRef>),
}

impl Value {
    pub fn bstr(text: &str) -> Self {
        Self::BStr(Some(text.encode_utf16().collect()))
    }

    pub fn ptr(pointee: Value) -> Self {
        Self::Ptr(Some(Box::new(pointee)))
    }

    pub const fn null_ptr() -> Self {
        Self::Ptr(None)
    }

    pub fn variant(inner: Value) -> Self {
        Self::Variant(Box::new(inner))
    }

    pub fn interface(object: ObjectRef) -> Self {
        Self::Interface(Some(object))
    }

    pub fn dispatch(object: ObjectRef) -> Self {
        Self::Dispatch(Some(object))
    }

    /// Identity value in GUID record layout
    pub fn guid(iid: &Guid) -> Self {
        Self::Blob(iid.to_bytes_le().to_vec())
    }

    pub fn pointee(&self) -> Option<&Value> {
        match self {
            Self::Ptr(Some(inner)) => Some(inner),
            _ => None,
        }
    }

    pub fn pointee_mut(&mut self) -> Option<&mut Value> {
        match self {
            Self::Ptr(Some(inner)) => Some(inner),
            _ => None,
        }
    }

    /// Store through an out pointer, if the pointer is present
    pub fn set_pointee(&mut self, value: Value) -> bool {
        match self.pointee_mut() {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::BStr(Some(units)) => Some(String::from_utf16_lossy(units)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U4(v) | Self::UInt(v) => Some(*v),
            Self::I4(v) | Self::Int(v) => Some(*v as u32),
            Self::U2(v) => Some(*v as u32),
            Self::U1(v) => Some(*v as u32),
            _ => None,
        }
    }

    /// Interpret a GUID record, directly or behind a pointer
    pub fn as_guid(&self) -> Option<Guid> {
        match self {
            Self::Blob(bytes) => {
                let bytes: [u8; 16] = bytes.as_slice().try_into().ok()?;
                Some(guid_from_bytes(bytes))
            }
            Self::Ptr(Some(inner)) => inner.as_guid(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Interface(Some(obj)) | Self::Dispatch(Some(obj)) => Some(obj),
            Self::Ptr(Some(inner)) | Self::Variant(inner) => inner.as_object(),
            _ => None,
        }
    }

    /// VARTYPE tag this value carries inside a variant
    pub fn vartype(&self) -> Option<u16> {
        let tag = match self {
            Self::Empty => vt::EMPTY,
            Self::Null => vt::NULL,
            Self::I1(_) => vt::I1,
            Self::U1(_) => vt::UI1,
            Self::I2(_) => vt::I2,
            Self::U2(_) => vt::UI2,
            Self::I4(_) => vt::I4,
            Self::U4(_) => vt::UI4,
            Self::I8(_) => vt::I8,
            Self::U8(_) => vt::UI8,
            Self::R4(_) => vt::R4,
            Self::R8(_) => vt::R8,
            Self::Int(_) => vt::INT,
            Self::UInt(_) => vt::UINT,
            Self::Bool(_) => vt::BOOL,
            Self::Error(_) => vt::ERROR,
            Self::Currency(_) => vt::CY,
            Self::Date(_) => vt::DATE,
            Self::BStr(_) => vt::BSTR,
            Self::Interface(_) => vt::UNKNOWN,
            Self::Dispatch(_) => vt::DISPATCH,
            Self::Variant(_) | Self::Ptr(_) | Self::Array(_) | Self::Blob(_) => return None,
        };
        Some(tag)
    }

    /// Bytes this value occupies in an argument frame
    pub fn storage_size(&self) -> usize {
        match self {
            Self::Empty | Self::Null => 0,
            Self::I1(_) | Self::U1(_) => 1,
            Self::I2(_) | Self::U2(_) | Self::Bool(_) => 2,
            Self::I4(_) | Self::U4(_) | Self::Int(_) | Self::UInt(_) | Self::R4(_) | Self::Error(_) => 4,
            Self::I8(_) | Self::U8(_) | Self::R8(_) | Self::Currency(_) | Self::Date(_) => 8,
            Self::BStr(_) | Self::Ptr(_) | Self::Interface(_) | Self::Dispatch(_) => POINTER_SIZE,
            Self::Variant(_) => VARIANT_SIZE,
            Self::Array(items) => items.iter().map(Value::storage_size).sum(),
            Self::Blob(bytes) => bytes.len(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Null => "null",
            Self::I1(_) => "char",
            Self::U1(_) => "unsigned char",
            Self::I2(_) => "short",
            Self::U2(_) => "unsigned short",
            Self::I4(_) => "long",
            Self::U4(_) => "unsigned long",
            Self::I8(_) => "hyper",
            Self::U8(_) => "unsigned hyper",
            Self::R4(_) => "float",
            Self::R8(_) => "double",
            Self::Int(_) => "int",
            Self::UInt(_) => "unsigned int",
            Self::Bool(_) => "VARIANT_BOOL",
            Self::Error(_) => "SCODE",
            Self::Currency(_) => "CURRENCY",
            Self::Date(_) => "DATE",
            Self::BStr(_) => "BSTR",
            Self::Variant(_) => "VARIANT",
            Self::Ptr(_) => "pointer",
            Self::Array(_) => "array",
            Self::Blob(_) => "record",
            Self::Interface(_) => "interface",
            Self::Dispatch(_) => "IDispatch",
        }
    }
}

impl PartialEq for Value {
    /// Floats compare bit-for-bit, interfaces by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) | (Self::Null, Self::Null) => true,
            (Self::I1(a), Self::I1(b)) => a == b,
            (Self::U1(a), Self::U1(b)) => a == b,
            (Self::I2(a), Self::I2(b)) => a == b,
            (Self::U2(a), Self::U2(b)) => a == b,
            (Self::I4(a), Self::I4(b)) | (Self::Int(a), Self::Int(b)) => a == b,
            (Self::U4(a), Self::U4(b)) | (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::I8(a), Self::I8(b)) | (Self::Currency(a), Self::Currency(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::R4(a), Self::R4(b)) => a.to_bits() == b.to_bits(),
            (Self::R8(a), Self::R8(b)) | (Self::Date(a), Self::Date(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::BStr(a), Self::BStr(b)) => a == b,
            (Self::Variant(a), Self::Variant(b)) => a == b,
            (Self::Ptr(a), Self::Ptr(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Blob(a), Self::Blob(b)) => a == b,
            (Self::Interface(a), Self::Interface(b))
            | (Self::Dispatch(a), Self::Dispatch(b)) => match (a, b) {
                (Some(a), Some(b)) => same_object(a, b),
                (None, None) => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Null => write!(f, "Null"),
            Self::I1(v) => write!(f, "I1({})", v),
            Self::U1(v) => write!(f, "U1({})", v),
            Self::I2(v) => write!(f, "I2({})", v),
            Self::U2(v) => write!(f, "U2({})", v),
            Self::I4(v) => write!(f, "I4({})", v),
            Self::U4(v) => write!(f, "U4({})", v),
            Self::I8(v) => write!(f, "I8({})", v),
            Self::U8(v) => write!(f, "U8({})", v),
            Self::R4(v) => write!(f, "R4({})", v),
            Self::R8(v) => write!(f, "R8({})", v),
            Self::Int(v) => write!(f, "Int({})", v),
            Self::UInt(v) => write!(f, "UInt({})", v),
            Self::Bool(v) => write!(f, "Bool({})", v),
            Self::Error(v) => write!(f, "Error({})", v),
            Self::Currency(v) => write!(f, "Currency({})", v),
            Self::Date(v) => write!(f, "Date({})", v),
            Self::BStr(None) => write!(f, "BStr(null)"),
            Self::BStr(Some(units)) => write!(f, "BStr({:?})", String::from_utf16_lossy(units)),
            Self::Variant(inner) => write!(f, "Variant({:?})", inner),
            Self::Ptr(None) => write!(f, "Ptr(null)"),
            Self::Ptr(Some(inner)) => write!(f, "Ptr({:?})", inner),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Blob(bytes) => write!(f, "Blob({} bytes)", bytes.len()),
            Self::Interface(None) => write!(f, "Interface(null)"),
            Self::Interface(Some(obj)) => write!(f, "Interface({:p})", Arc::as_ptr(obj)),
            Self::Dispatch(None) => write!(f, "Dispatch(null)"),
            Self::Dispatch(Some(obj)) => write!(f, "Dispatch({:p})", Arc::as_ptr(obj)),
        }
    }
}
