//! Type library model
//!
//! - `types.rs` - type descriptors and well-known identities
//! - `descriptors.rs` - interface, method and parameter descriptors
//! - `library.rs` - the [`TypeLibrary`] collaborator and an in-memory implementation

mod descriptors;
mod library;
mod types;

pub use descriptors::{
    Direction, InterfaceDesc, InterfaceKind, MethodDesc, ParamDesc, UserType,
    IDENTITY_CARRIER_NAME,
};
pub use library::{MemoryTypeLibrary, TypeLibrary, HREF_GUID};
pub use types::{
    guid_from_bytes, guid_to_bytes, vt, Guid, TypeDesc, TypeRef, IID_IDISPATCH, IID_IUNKNOWN,
};
