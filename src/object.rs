//! Objects as seen through their dispatch tables
//!
//! Every object, local or proxied, exposes the three identity operations and
//! a [`VTable`] whose first [`IDENTITY_SLOTS`] entries are reserved for them.
//! Method slots are closures over a flat argument frame.

use crate::interop::Value;
use crate::refcount::RefCounter;
use crate::status::HResult;
use crate::typelib::{Guid, IID_IUNKNOWN};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Slots taken by QueryInterface, AddRef and Release
pub const IDENTITY_SLOTS: usize = 3;

/// A method body: reads its IN arguments, writes through its OUT pointers
pub type MethodFn = Arc<dyn Fn(&mut [Value]) -> HResult + Send + Sync>;

/// Shared handle to any object
pub type ObjectRef = Arc<dyn Unknown>;

/// Wrap a closure as a dispatch-table method
pub fn method<F>(body: F) -> MethodFn
where
    F: Fn(&mut [Value]) -> HResult + Send + Sync + 'static,
{
    Arc::new(body)
}

/// Whether two handles refer to the same object
#[inline]
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

pub enum Slot {
    QueryInterface,
    AddRef,
    Release,
    Method(MethodFn),
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryInterface => write!(f, "QueryInterface"),
            Self::AddRef => write!(f, "AddRef"),
            Self::Release => write!(f, "Release"),
            Self::Method(_) => write!(f, "Method"),
        }
    }
}

/// Dispatch table: identity slots followed by methods in flattened order
#[derive(Debug)]
pub struct VTable {
    slots: Vec<Slot>,
}

impl VTable {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(methods: usize) -> Self {
        let mut slots = Vec::with_capacity(IDENTITY_SLOTS + methods);
        slots.extend([Slot::QueryInterface, Slot::AddRef, Slot::Release]);
        Self { slots }
    }

    /// Append a method, returning its slot
    pub fn push(&mut self, body: MethodFn) -> usize {
        self.slots.push(Slot::Method(body));
        self.slots.len() - 1
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Method body at `index`; identity slots are not methods
    #[inline]
    pub fn method(&self, index: usize) -> Option<&MethodFn> {
        match self.slots.get(index) {
            Some(Slot::Method(body)) => Some(body),
            _ => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.len() == IDENTITY_SLOTS
    }
}

impl Default for VTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The identity-management contract every object honors
pub trait Unknown: Send + Sync {
    /// Handle to this object as `iid`, with one reference added for the caller
    fn query_interface(self: Arc<Self>, iid: &Guid) -> Result<ObjectRef, HResult>;

    /// Returns the new count
    fn add_ref(&self) -> u32;

    /// Returns the new count; 0 tears the object down
    fn release(&self) -> u32;

    fn vtable(&self) -> &VTable;

    fn ref_count(&self) -> u32;
}

/// An in-process object built from closures
pub struct LocalObject {
    name: String,
    interfaces: SmallVec<[Guid; 4]>,
    vtable: VTable,
    tear_offs: HashMap<Guid, ObjectRef>,
    refs: RefCounter,
}

impl LocalObject {
    /// Start an object whose primary interface is `iid`
    pub fn builder(name: impl Into<String>, iid: Guid) -> LocalObjectBuilder {
        LocalObjectBuilder {
            name: name.into(),
            interfaces: SmallVec::from_elem(iid, 1),
            vtable: VTable::new(),
            tear_offs: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the primary dispatch table answers for `iid`
    pub fn implements(&self, iid: &Guid) -> bool {
        *iid == IID_IUNKNOWN || self.interfaces.contains(iid)
    }
}

impl Unknown for LocalObject {
    fn query_interface(self: Arc<Self>, iid: &Guid) -> Result<ObjectRef, HResult> {
        if self.implements(iid) {
            self.add_ref();
            return Ok(self);
        }
        match self.tear_offs.get(iid) {
            Some(tear_off) => {
                tear_off.add_ref();
                Ok(Arc::clone(tear_off))
            }
            None => Err(HResult::E_NOINTERFACE),
        }
    }

    fn add_ref(&self) -> u32 {
        self.refs.increment()
    }

    fn release(&self) -> u32 {
        self.refs.decrement()
    }

    fn vtable(&self) -> &VTable {
        &self.vtable
    }

    fn ref_count(&self) -> u32 {
        self.refs.get()
    }
}

impl fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalObject")
            .field("name", &self.name)
            .field("interfaces", &self.interfaces)
            .field("slots", &self.vtable.len())
            .field("refs", &self.refs.get())
            .finish()
    }
}

pub struct LocalObjectBuilder {
    name: String,
    interfaces: SmallVec<[Guid; 4]>,
    vtable: VTable,
    tear_offs: HashMap<Guid, ObjectRef>,
}

impl LocalObjectBuilder {
    /// Also answer for `iid` with the primary table, typically an ancestor
    pub fn implements(mut self, iid: Guid) -> Self {
        if !self.interfaces.contains(&iid) {
            self.interfaces.push(iid);
        }
        self
    }

    /// Next method in flattened order
    pub fn method<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut [Value]) -> HResult + Send + Sync + 'static,
    {
        self.vtable.push(method(body));
        self
    }

    /// Answer QueryInterface for `iid` with a separate object
    pub fn tear_off(mut self, iid: Guid, object: ObjectRef) -> Self {
        self.tear_offs.insert(iid, object);
        self
    }

    pub fn build(self) -> Arc<LocalObject> {
        Arc::new(LocalObject {
            name: self.name,
            interfaces: self.interfaces,
            vtable: self.vtable,
            tear_offs: self.tear_offs,
            refs: RefCounter::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    const IID_A: Guid = uuid!("6b29fc40-ca47-1067-b31d-00dd010662da");
    const IID_B: Guid = uuid!("6b29fc41-ca47-1067-b31d-00dd010662da");
    const IID_T: Guid = uuid!("6b29fc42-ca47-1067-b31d-00dd010662da");

    #[test]
    fn test_vtable_layout() {
        let mut table = VTable::new();
        assert!(table.is_empty());
        let slot = table.push(method(|_| HResult::S_OK));
        assert_eq!(slot, IDENTITY_SLOTS);
        assert!(table.method(0).is_none());
        assert!(matches!(table.slot(2), Some(Slot::Release)));
        assert!(table.method(slot).is_some());
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_query_interface() {
        let tear = LocalObject::builder("tear", IID_T).build();
        let obj = LocalObject::builder("obj", IID_B)
            .implements(IID_A)
            .method(|_| HResult::S_OK)
            .tear_off(IID_T, tear.clone())
            .build();

        let as_a = obj.clone().query_interface(&IID_A).unwrap();
        assert_eq!(obj.ref_count(), 2);
        let obj_ref: ObjectRef = obj.clone();
        assert!(same_object(&as_a, &obj_ref));

        let as_unknown = obj.clone().query_interface(&IID_IUNKNOWN).unwrap();
        assert_eq!(as_unknown.ref_count(), 3);

        let as_t = obj.clone().query_interface(&IID_T).unwrap();
        let tear_ref: ObjectRef = tear;
        assert!(same_object(&as_t, &tear_ref));
        assert_eq!(tear_ref.ref_count(), 2);

        let missing = Guid::from_u128(7);
        assert_eq!(obj.clone().query_interface(&missing).err(), Some(HResult::E_NOINTERFACE));
    }

    #[test]
    fn test_methods_run_in_order() {
        let obj = LocalObject::builder("calc", IID_A)
            .method(|args| {
                args[0] = Value::U4(1);
                HResult::S_OK
            })
            .method(|_| HResult::E_FAIL)
            .build();

        let mut args = [Value::Empty];
        let first = obj.vtable().method(IDENTITY_SLOTS).unwrap();
        assert_eq!(first(&mut args), HResult::S_OK);
        assert_eq!(args[0], Value::U4(1));
        let second = obj.vtable().method(IDENTITY_SLOTS + 1).unwrap();
        assert_eq!(second(&mut args), HResult::E_FAIL);
    }
}
