//! Value codec
//!
//! Moves one typed value to or from a stream, recursing through pointers,
//! variants, arrays and user-defined types. Interface references are handed
//! to the identity substrate; everything else is encoded here.

use super::size::resolve_user_type;
use super::stream::{MarshalStream, MessageReader};
use super::value::Value;
use crate::errors::{ErrorKind, MarshalError, Result};
use crate::identity::IdentityManager;
use crate::logging::trace;
use crate::status::HResult;
use crate::typelib::{vt, Guid, TypeDesc, TypeLibrary, UserType, IID_IDISPATCH, IID_IUNKNOWN};

/// Pointer presence flags on the wire
const PTR_NULL: u32 = 0;
const PTR_PRESENT: u32 = 1;

const VARIANT_TRUE: u16 = 0xFFFF;
const VARIANT_FALSE: u16 = 0;

/// Per-call codec over the two collaborators it needs
#[derive(Clone, Copy)]
pub struct Codec<'a> {
    pub library: &'a dyn TypeLibrary,
    pub identity: &'a dyn IdentityManager,
}

/// How a type is moved once aliases are looked through
enum Shape {
    /// Primitive, with any alias already replaced by its target
    Scalar(TypeDesc),
    Void,
    BStr,
    Variant,
    Reference(Guid),
    Pointer(TypeDesc),
    Array(TypeDesc, u32),
    Flat(usize),
}

impl<'a> Codec<'a> {
    pub fn new(library: &'a dyn TypeLibrary, identity: &'a dyn IdentityManager) -> Self {
        Self { library, identity }
    }

    /// Classify `ty`; `active` is the identity captured from a carrier parameter
    fn shape(&self, ty: &TypeDesc, active: Option<&Guid>) -> Result<Shape> {
        let shape = match ty {
            t if t.is_primitive() => Shape::Scalar(t.clone()),
            TypeDesc::Void => Shape::Void,
            TypeDesc::BStr => Shape::BStr,
            TypeDesc::Variant => Shape::Variant,
            TypeDesc::Unknown => Shape::Reference(active.copied().unwrap_or(IID_IUNKNOWN)),
            TypeDesc::Dispatch => Shape::Reference(active.copied().unwrap_or(IID_IDISPATCH)),
            TypeDesc::Ptr(inner) => match self.interface_of(inner, active)? {
                Some(iid) => Shape::Reference(iid),
                None => Shape::Pointer((**inner).clone()),
            },
            TypeDesc::CArray { element, count } => Shape::Array((**element).clone(), *count),
            TypeDesc::UserDefined(href) => match resolve_user_type(self.library, *href)? {
                UserType::Record { size, .. } | UserType::Enum { size, .. } => Shape::Flat(size as usize),
                UserType::Interface { iid, .. } => Shape::Reference(iid),
                UserType::Alias { target, .. } => return self.shape(&target, active),
            },
            other => return Err(ErrorKind::UnsupportedType { ty: other.to_string() }.into()),
        };
        Ok(shape)
    }

    /// Identity when a pointer to `pointee` is itself an interface reference
    fn interface_of(&self, pointee: &TypeDesc, active: Option<&Guid>) -> Result<Option<Guid>> {
        match pointee {
            TypeDesc::Void => Ok(Some(active.copied().unwrap_or(IID_IUNKNOWN))),
            TypeDesc::UserDefined(href) => match resolve_user_type(self.library, *href)? {
                UserType::Interface { iid, .. } => Ok(Some(iid)),
                UserType::Alias { target, .. } => self.interface_of(&target, active),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Write `value` as `ty`
    pub fn marshal(
        &self,
        out: &mut MarshalStream,
        ty: &TypeDesc,
        value: &Value,
        outermost: bool,
        active: Option<&Guid>,
    ) -> Result<()> {
        let start = out.len();
        match self.shape(ty, active)? {
            Shape::Scalar(scalar) => write_scalar(out, &scalar, value),
            Shape::Void => Ok(()),
            Shape::BStr => match value {
                Value::BStr(None) => out.write_u32(0),
                Value::BStr(Some(units)) => {
                    out.write_len(units.len())?;
                    out.reserve(units.len() * 2)?;
                    for unit in units {
                        out.write_u16(*unit)?;
                    }
                    Ok(())
                }
                other => Err(MarshalError::value_mismatch(ty, other.kind_name())),
            },
            Shape::Variant => {
                let inner = match value {
                    Value::Variant(inner) => inner.as_ref(),
                    other => return Err(MarshalError::value_mismatch(ty, other.kind_name())),
                };
                let tag = inner
                    .vartype()
                    .ok_or_else(|| MarshalError::from(ErrorKind::UnsupportedType {
                        ty: format!("VARIANT holding {}", inner.kind_name()),
                    }))?;
                out.write_u16(tag)?;
                match tag {
                    vt::EMPTY | vt::NULL => Ok(()),
                    tag => match TypeDesc::from_variant_tag(tag) {
                        Some(inner_ty) => self.marshal(out, &inner_ty, inner, false, None),
                        None => Err(ErrorKind::UnsupportedType { ty: format!("vt#{}", tag) }.into()),
                    },
                }
            }
            Shape::Reference(iid) => match value {
                Value::Interface(None) | Value::Dispatch(None) | Value::Ptr(None) => out.write_u32(0),
                Value::Interface(Some(object)) | Value::Dispatch(Some(object)) => {
                    let blob = self.identity.export(object, &iid)?;
                    trace!(iid = %iid, bytes = blob.len(), "exported interface reference");
                    out.write_len(blob.len())?;
                    out.write_bytes(&blob)
                }
                other => Err(MarshalError::value_mismatch(ty, other.kind_name())),
            },
            Shape::Pointer(pointee) => match value {
                Value::Ptr(None) => out.write_u32(PTR_NULL),
                Value::Ptr(Some(inner)) => {
                    out.write_u32(PTR_PRESENT)?;
                    self.marshal(out, &pointee, inner, false, active)
                }
                other => Err(MarshalError::value_mismatch(ty, other.kind_name())),
            },
            Shape::Array(element, count) => match value {
                Value::Array(items) if items.len() == count as usize => {
                    for item in items {
                        self.marshal(out, &element, item, false, None)?;
                    }
                    Ok(())
                }
                other => Err(MarshalError::value_mismatch(ty, other.kind_name())),
            },
            Shape::Flat(size) => match value {
                Value::Blob(bytes) if bytes.len() == size => out.write_bytes(bytes),
                Value::Blob(bytes) => Err(MarshalError::value_mismatch(
                    format!("{} ({} bytes)", ty, size),
                    format!("record of {} bytes", bytes.len()),
                )),
                other => Err(MarshalError::value_mismatch(ty, other.kind_name())),
            },
        }?;
        if outermost {
            trace!(ty = %ty, bytes = out.len() - start, "marshaled parameter");
        }
        Ok(())
    }

    /// Read a value of `ty` into `slot`
    ///
    /// An outermost pointer reuses storage already present in `slot`;
    /// nested pointers always get fresh storage.
    pub fn unmarshal(
        &self,
        input: &mut MessageReader<'_>,
        ty: &TypeDesc,
        slot: &mut Value,
        outermost: bool,
        active: Option<&Guid>,
    ) -> Result<()> {
        match self.shape(ty, active)? {
            Shape::Scalar(scalar) => *slot = read_scalar(input, &scalar)?,
            Shape::Void => {}
            Shape::BStr => {
                let len = input.read_u32()? as usize;
                *slot = if len == 0 {
                    Value::BStr(None)
                } else {
                    let available = input.remaining();
                    let needed = len
                        .checked_mul(2)
                        .ok_or(ErrorKind::Truncated { needed: usize::MAX, available })?;
                    let bytes = input.read_bytes(needed)?;
                    let units = bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                        .collect();
                    Value::BStr(Some(units))
                };
            }
            Shape::Variant => {
                let tag = input.read_u16()?;
                let inner = match tag {
                    vt::EMPTY => Value::Empty,
                    vt::NULL => Value::Null,
                    tag => {
                        let inner_ty = TypeDesc::from_variant_tag(tag).ok_or_else(|| {
                            MarshalError::from(ErrorKind::UnsupportedType { ty: format!("vt#{}", tag) })
                        })?;
                        let mut inner = Value::Empty;
                        self.unmarshal(input, &inner_ty, &mut inner, false, None)?;
                        inner
                    }
                };
                *slot = Value::Variant(Box::new(inner));
            }
            Shape::Reference(iid) => {
                let len = input.read_u32()? as usize;
                let object = if len == 0 {
                    None
                } else {
                    let blob = input.read_bytes(len)?;
                    let object = self.identity.import(blob, &iid)?;
                    trace!(iid = %iid, bytes = len, "imported interface reference");
                    Some(object)
                };
                *slot = match ty {
                    TypeDesc::Dispatch => Value::Dispatch(object),
                    _ => Value::Interface(object),
                };
            }
            Shape::Pointer(pointee) => {
                if input.read_u32()? == PTR_NULL {
                    *slot = Value::Ptr(None);
                    return Ok(());
                }
                match slot {
                    Value::Ptr(Some(storage)) if outermost => {
                        self.unmarshal(input, &pointee, storage, false, active)?;
                    }
                    _ => {
                        let mut storage = self.allocate(&pointee)?;
                        self.unmarshal(input, &pointee, &mut storage, false, active)?;
                        *slot = Value::Ptr(Some(Box::new(storage)));
                    }
                }
            }
            Shape::Array(element, count) => {
                let mut items = Vec::with_capacity((count as usize).min(input.remaining()));
                for _ in 0..count {
                    let mut item = Value::Empty;
                    self.unmarshal(input, &element, &mut item, false, None)?;
                    items.push(item);
                }
                *slot = Value::Array(items);
            }
            Shape::Flat(size) => *slot = Value::Blob(input.read_bytes(size)?.to_vec()),
        }
        Ok(())
    }

    /// Zeroed storage for a value of `ty`, sized by the type evaluator
    pub fn allocate(&self, ty: &TypeDesc) -> Result<Value> {
        let value = match self.shape(ty, None)? {
            Shape::Scalar(scalar) => zero_scalar(&scalar),
            Shape::Void => Value::Empty,
            Shape::BStr => Value::BStr(None),
            Shape::Variant => Value::Variant(Box::new(Value::Empty)),
            Shape::Reference(_) => match ty {
                TypeDesc::Dispatch => Value::Dispatch(None),
                _ => Value::Interface(None),
            },
            Shape::Pointer(_) => Value::Ptr(None),
            Shape::Array(element, count) => {
                let mut items = Vec::new();
                items
                    .try_reserve(count as usize)
                    .map_err(|_| ErrorKind::OutOfMemory { requested: count as usize })?;
                for _ in 0..count {
                    items.push(self.allocate(&element)?);
                }
                Value::Array(items)
            }
            Shape::Flat(size) => {
                let mut bytes = Vec::new();
                bytes
                    .try_reserve_exact(size)
                    .map_err(|_| ErrorKind::OutOfMemory { requested: size })?;
                bytes.resize(size, 0);
                Value::Blob(bytes)
            }
        };
        Ok(value)
    }

    /// Release every interface reference held in `value`
    pub fn cleanup(&self, ty: &TypeDesc, value: &mut Value) -> Result<()> {
        match self.shape(ty, None)? {
            Shape::Reference(_) => self.release_object(value),
            Shape::Variant => {
                if let Value::Variant(inner) = value {
                    self.release_object(inner);
                }
            }
            Shape::Pointer(pointee) => {
                if let Value::Ptr(Some(inner)) = value {
                    self.cleanup(&pointee, inner)?;
                }
            }
            Shape::Array(element, _) => {
                if let Value::Array(items) = value {
                    for item in items {
                        self.cleanup(&element, item)?;
                    }
                }
            }
            Shape::Scalar(_) | Shape::Void | Shape::BStr | Shape::Flat(_) => {}
        }
        Ok(())
    }

    fn release_object(&self, value: &mut Value) {
        if let Value::Interface(slot) | Value::Dispatch(slot) = value {
            if let Some(object) = slot.take() {
                let remaining = self.identity.release(&object);
                trace!(remaining, "released interface reference");
            }
        }
    }
}

fn write_scalar(out: &mut MarshalStream, ty: &TypeDesc, value: &Value) -> Result<()> {
    match (ty, value) {
        (TypeDesc::I1, Value::I1(v)) => out.write_u8(*v as u8),
        (TypeDesc::U1, Value::U1(v)) => out.write_u8(*v),
        (TypeDesc::I2, Value::I2(v)) => out.write_u16(*v as u16),
        (TypeDesc::U2, Value::U2(v)) => out.write_u16(*v),
        (TypeDesc::Bool, Value::Bool(v)) => {
            out.write_u16(if *v { VARIANT_TRUE } else { VARIANT_FALSE })
        }
        (TypeDesc::I4, Value::I4(v)) | (TypeDesc::Int, Value::Int(v)) => out.write_u32(*v as u32),
        (TypeDesc::U4, Value::U4(v)) | (TypeDesc::UInt, Value::UInt(v)) => out.write_u32(*v),
        (TypeDesc::R4, Value::R4(v)) => out.write_u32(v.to_bits()),
        (TypeDesc::Error, Value::Error(v)) => out.write_u32(v.bits()),
        (TypeDesc::I8, Value::I8(v)) | (TypeDesc::Currency, Value::Currency(v)) => {
            out.write_u64(*v as u64)
        }
        (TypeDesc::U8, Value::U8(v)) => out.write_u64(*v),
        (TypeDesc::R8, Value::R8(v)) | (TypeDesc::Date, Value::Date(v)) => out.write_u64(v.to_bits()),
        (ty, value) => Err(MarshalError::value_mismatch(ty, value.kind_name())),
    }
}

fn read_scalar(input: &mut MessageReader<'_>, ty: &TypeDesc) -> Result<Value> {
    let value = match ty {
        TypeDesc::I1 => Value::I1(input.read_u8()? as i8),
        TypeDesc::U1 => Value::U1(input.read_u8()?),
        TypeDesc::I2 => Value::I2(input.read_u16()? as i16),
        TypeDesc::U2 => Value::U2(input.read_u16()?),
        TypeDesc::Bool => Value::Bool(input.read_u16()? != VARIANT_FALSE),
        TypeDesc::I4 => Value::I4(input.read_u32()? as i32),
        TypeDesc::Int => Value::Int(input.read_u32()? as i32),
        TypeDesc::U4 => Value::U4(input.read_u32()?),
        TypeDesc::UInt => Value::UInt(input.read_u32()?),
        TypeDesc::R4 => Value::R4(f32::from_bits(input.read_u32()?)),
        TypeDesc::Error => Value::Error(HResult::from_bits(input.read_u32()?)),
        TypeDesc::I8 => Value::I8(input.read_u64()? as i64),
        TypeDesc::Currency => Value::Currency(input.read_u64()? as i64),
        TypeDesc::U8 => Value::U8(input.read_u64()?),
        TypeDesc::R8 => Value::R8(f64::from_bits(input.read_u64()?)),
        TypeDesc::Date => Value::Date(f64::from_bits(input.read_u64()?)),
        other => return Err(ErrorKind::UnsupportedType { ty: other.to_string() }.into()),
    };
    Ok(value)
}

fn zero_scalar(ty: &TypeDesc) -> Value {
    match ty {
        TypeDesc::I1 => Value::I1(0),
        TypeDesc::U1 => Value::U1(0),
        TypeDesc::I2 => Value::I2(0),
        TypeDesc::U2 => Value::U2(0),
        TypeDesc::Bool => Value::Bool(false),
        TypeDesc::I4 => Value::I4(0),
        TypeDesc::Int => Value::Int(0),
        TypeDesc::U4 => Value::U4(0),
        TypeDesc::UInt => Value::UInt(0),
        TypeDesc::R4 => Value::R4(0.0),
        TypeDesc::Error => Value::Error(HResult::S_OK),
        TypeDesc::I8 => Value::I8(0),
        TypeDesc::Currency => Value::Currency(0),
        TypeDesc::U8 => Value::U8(0),
        TypeDesc::R8 => Value::R8(0.0),
        TypeDesc::Date => Value::Date(0.0),
        _ => Value::Empty,
    }
}
