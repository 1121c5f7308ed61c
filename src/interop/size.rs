//! Type size evaluation
//!
//! Storage size of a value of a given type descriptor. Reference-like types
//! (strings, pointers, interface references) occupy one pointer slot
//! regardless of what they refer to.

use crate::errors::{ErrorKind, MarshalError, Result};
use crate::logging::warn;
use crate::typelib::{TypeDesc, TypeLibrary, TypeRef, UserType};

/// Size of one reference slot
pub const POINTER_SIZE: usize = core::mem::size_of::<usize>();

/// Fixed envelope size of a tagged variant
pub const VARIANT_SIZE: usize = 16;

/// Storage size of a value of `ty`
///
/// User-defined interfaces report 0: they are never stored inline, only
/// reached through a reference slot.
pub fn size_of(library: &dyn TypeLibrary, ty: &TypeDesc) -> Result<usize> {
    match ty {
        TypeDesc::Void => Ok(0),
        TypeDesc::BStr | TypeDesc::Unknown | TypeDesc::Dispatch | TypeDesc::Ptr(_) => {
            Ok(POINTER_SIZE)
        }
        TypeDesc::Variant => Ok(VARIANT_SIZE),
        TypeDesc::CArray { element, count } => {
            let element = size_of(library, element)?;
            element
                .checked_mul(*count as usize)
                .ok_or_else(|| MarshalError::from(ErrorKind::OutOfMemory { requested: usize::MAX }))
        }
        TypeDesc::UserDefined(href) => match resolve_user_type(library, *href)? {
            UserType::Record { size, .. } | UserType::Enum { size, .. } => Ok(size as usize),
            UserType::Interface { .. } => Ok(0),
            UserType::Alias { target, .. } => size_of(library, &target),
        },
        TypeDesc::Unsupported(tag) => {
            warn!(vartype = tag, "no size for unsupported type kind");
            Err(ErrorKind::UnsupportedType { ty: ty.to_string() }.into())
        }
        scalar => scalar
            .primitive_width()
            .ok_or_else(|| ErrorKind::UnsupportedType { ty: scalar.to_string() }.into()),
    }
}

/// Resolve a user-defined reference or fail the whole call
pub fn resolve_user_type(library: &dyn TypeLibrary, href: TypeRef) -> Result<UserType> {
    library
        .user_type(href)
        .ok_or_else(|| ErrorKind::UnresolvedType { href }.into())
}
