//! Type library access
//!
//! The engine never reads type library files itself; it asks a
//! [`TypeLibrary`] for descriptors. [`MemoryTypeLibrary`] is the in-memory
//! implementation hosts register descriptors into.

use super::descriptors::{Direction, InterfaceDesc, InterfaceKind, MethodDesc, ParamDesc, UserType};
use super::types::{Guid, TypeDesc, TypeRef, IID_IDISPATCH, IID_IUNKNOWN};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved handle of the 16-byte GUID record in [`MemoryTypeLibrary::standard`]
pub const HREF_GUID: TypeRef = TypeRef(0xFFFF_0000);

/// Read-only descriptor source
pub trait TypeLibrary: Send + Sync {
    /// Descriptor registered for an interface identity
    fn resolve(&self, iid: &Guid) -> Option<Arc<InterfaceDesc>>;

    /// Vtable half of a dual interface
    fn custom_half(&self, dispatch: &InterfaceDesc) -> Option<Arc<InterfaceDesc>>;

    /// Resolve a user-defined type reference
    fn user_type(&self, href: TypeRef) -> Option<UserType>;

    fn ancestor(&self, desc: &InterfaceDesc) -> Option<Arc<InterfaceDesc>> {
        desc.ancestor.as_ref().and_then(|iid| self.resolve(iid))
    }

    fn method<'a>(&self, desc: &'a InterfaceDesc, ordinal: u16) -> Option<&'a MethodDesc> {
        desc.methods.get(ordinal as usize)
    }
}

/// Type library held entirely in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryTypeLibrary {
    interfaces: HashMap<Guid, Arc<InterfaceDesc>>,
    custom: HashMap<Guid, Arc<InterfaceDesc>>,
    user_types: HashMap<TypeRef, UserType>,
}

impl MemoryTypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library preloaded with IUnknown, IDispatch and the GUID record
    pub fn standard() -> Self {
        let guid_ref = TypeDesc::ptr(TypeDesc::UserDefined(HREF_GUID));

        let unknown = InterfaceDesc::new(IID_IUNKNOWN, "IUnknown")
            .method("QueryInterface", vec![
                ParamDesc::input("riid", guid_ref.clone()),
                ParamDesc::output("ppvObject", TypeDesc::ptr(TypeDesc::ptr(TypeDesc::Void))),
            ])
            .method("AddRef", vec![])
            .method("Release", vec![]);

        let dispatch = InterfaceDesc::new(IID_IDISPATCH, "IDispatch")
            .extends(IID_IUNKNOWN)
            .method("GetTypeInfoCount", vec![
                ParamDesc::output("pctinfo", TypeDesc::ptr(TypeDesc::UInt)),
            ])
            .method("GetTypeInfo", vec![
                ParamDesc::input("iTInfo", TypeDesc::UInt),
                ParamDesc::input("lcid", TypeDesc::U4),
                ParamDesc::output("ppTInfo", TypeDesc::ptr(TypeDesc::Unknown)),
            ])
            .method("GetIDsOfNames", vec![
                ParamDesc::input("riid", guid_ref.clone()).with_carrier(false),
                ParamDesc::input("rgszNames", TypeDesc::ptr(TypeDesc::BStr)),
                ParamDesc::input("cNames", TypeDesc::UInt),
                ParamDesc::input("lcid", TypeDesc::U4),
                ParamDesc::output("rgDispId", TypeDesc::ptr(TypeDesc::I4)),
            ])
            .method("Invoke", vec![
                ParamDesc::input("dispIdMember", TypeDesc::I4),
                ParamDesc::input("riid", guid_ref).with_carrier(false),
                ParamDesc::input("lcid", TypeDesc::U4),
                ParamDesc::input("wFlags", TypeDesc::U2),
                ParamDesc::new("pVarResult", TypeDesc::ptr(TypeDesc::Variant), Direction::OUT),
            ]);

        Self::new()
            .with_user_type(HREF_GUID, UserType::Record { name: "GUID".into(), size: 16 })
            .with_interface(unknown)
            .with_interface(dispatch)
    }

    pub fn with_interface(mut self, desc: InterfaceDesc) -> Self {
        self.add_interface(desc);
        self
    }

    /// Register both halves of a dual interface under one identity
    pub fn with_dual(mut self, dispatch: InterfaceDesc, custom: InterfaceDesc) -> Self {
        let dispatch = dispatch.with_kind(InterfaceKind::Dual);
        self.custom.insert(dispatch.iid, Arc::new(custom));
        self.add_interface(dispatch);
        self
    }

    pub fn with_user_type(mut self, href: TypeRef, ty: UserType) -> Self {
        self.user_types.insert(href, ty);
        self
    }

    pub fn add_interface(&mut self, desc: InterfaceDesc) {
        self.interfaces.insert(desc.iid, Arc::new(desc));
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }
}

impl TypeLibrary for MemoryTypeLibrary {
    fn resolve(&self, iid: &Guid) -> Option<Arc<InterfaceDesc>> {
        self.interfaces.get(iid).cloned()
    }

    fn custom_half(&self, dispatch: &InterfaceDesc) -> Option<Arc<InterfaceDesc>> {
        self.custom.get(&dispatch.iid).cloned()
    }

    fn user_type(&self, href: TypeRef) -> Option<UserType> {
        self.user_types.get(&href).cloned()
    }
}
