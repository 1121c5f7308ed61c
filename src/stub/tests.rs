//! Stub dispatch tests

use super::*;
use crate::config::MarshalConfig;
use crate::errors::ErrorCategory;
use crate::interop::MarshalStream;
use crate::object::{LocalObject, IDENTITY_SLOTS};
use crate::typelib::{InterfaceDesc, MemoryTypeLibrary, ParamDesc, TypeDesc, IID_IUNKNOWN};
use parking_lot::Mutex;

fn iid(n: u128) -> Guid {
    Guid::from_u128(0xA000 + n)
}

fn with_methods(desc: InterfaceDesc, count: usize) -> InterfaceDesc {
    (0..count).fold(desc, |d, m| {
        d.method(format!("M{}", m), vec![
            ParamDesc::input("x", TypeDesc::U4),
            ParamDesc::output("result", TypeDesc::ptr(TypeDesc::U4)),
        ])
    })
}

/// A (3 methods) <- B (3 methods), plus an interface whose parent is missing
fn library() -> MemoryTypeLibrary {
    MemoryTypeLibrary::standard()
        .with_interface(with_methods(InterfaceDesc::new(iid(1), "IA").extends(IID_IUNKNOWN), 3))
        .with_interface(with_methods(InterfaceDesc::new(iid(2), "IB").extends(iid(1)), 3))
        .with_interface(with_methods(InterfaceDesc::new(iid(3), "IOrphan").extends(iid(99)), 2))
}

/// Object whose every method records its slot and answers `x * 10 + slot`
fn recorder(primary: Guid, methods: usize, calls: Arc<Mutex<Vec<usize>>>) -> ObjectRef {
    let mut builder = LocalObject::builder("recorder", primary).implements(iid(1));
    for index in 0..methods {
        let slot = IDENTITY_SLOTS + index;
        let calls = Arc::clone(&calls);
        builder = builder.method(move |args| {
            calls.lock().push(slot);
            let x = args[0].as_u32().unwrap_or(0);
            args[1].set_pointee(Value::U4(x * 10 + slot as u32));
            HResult::S_OK
        });
    }
    builder.build()
}

fn request(selector: Selector, x: u32) -> WireMessage {
    WireMessage::new(selector, x.to_le_bytes().to_vec())
}

fn reply_words(reply: &WireMessage) -> (HResult, u32, u32) {
    let mut reader = MessageReader::new(&reply.data);
    let status = crate::interop::read_status(&mut reader).unwrap();
    let present = reader.read_u32().unwrap();
    let value = reader.read_u32().unwrap();
    reader.finish().unwrap();
    (status, present, value)
}

fn context() -> MarshalContext {
    MarshalContext::local(Arc::new(library()), MarshalConfig::default())
}

#[test]
fn test_derived_method_slot() {
    let ctx = context();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let object = recorder(iid(2), 6, Arc::clone(&calls));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();

    assert_eq!(stub.fs(), 3);
    assert_eq!(stub.locate(Selector::new(0, 2)).unwrap().slot, 5 + IDENTITY_SLOTS);

    let reply = stub.invoke(&request(Selector::new(0, 2), 4)).unwrap();
    assert_eq!(reply_words(&reply), (HResult::S_OK, 1, 48));
    assert_eq!(calls.lock().as_slice(), &[8]);
}

#[test]
fn test_inherited_method_slot() {
    let ctx = context();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let object = recorder(iid(2), 6, Arc::clone(&calls));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();

    let reply = stub.invoke(&request(Selector::new(1, 1), 2)).unwrap();
    assert_eq!(reply_words(&reply), (HResult::S_OK, 1, 24));
    assert_eq!(calls.lock().as_slice(), &[4]);
}

#[test]
fn test_unresolvable_ancestor_invokes_nothing() {
    let ctx = context();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let object = recorder(iid(3), 2, Arc::clone(&calls));
    let stub = ctx.create_stub(&object, &iid(3)).unwrap();
    assert_eq!(stub.fs(), 0);

    let err = stub.invoke(&request(Selector::new(1, 0), 1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedAncestor { iid: iid(99), depth: 1 });
    assert_eq!(err.category(), ErrorCategory::Resolution);
    assert!(calls.lock().is_empty());

    // The target's own methods still dispatch under the fallback layout
    let reply = stub.invoke(&request(Selector::new(0, 1), 1)).unwrap();
    assert_eq!(reply_words(&reply).0, HResult::S_OK);
    assert_eq!(calls.lock().as_slice(), &[IDENTITY_SLOTS + 1]);
}

#[test]
fn test_bad_payload_invokes_nothing() {
    let ctx = context();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let object = recorder(iid(2), 6, Arc::clone(&calls));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();

    let short = WireMessage::new(Selector::new(0, 0), vec![1, 0]);
    assert!(matches!(stub.invoke(&short).unwrap_err().kind, ErrorKind::Truncated { .. }));

    let long = WireMessage::new(Selector::new(0, 0), vec![1, 0, 0, 0, 9]);
    assert_eq!(stub.invoke(&long).unwrap_err().kind, ErrorKind::TrailingData { remaining: 1 });

    let unknown = request(Selector::new(0, 7), 1);
    assert!(matches!(stub.invoke(&unknown).unwrap_err().kind, ErrorKind::UnknownMethod { .. }));

    assert!(calls.lock().is_empty());
    assert_eq!(ctx.snapshot().marshaling_errors, 3);
}

#[test]
fn test_missing_slot_in_object() {
    let ctx = context();
    let calls = Arc::new(Mutex::new(Vec::new()));
    // Claims IB but only implements IA's methods
    let object = recorder(iid(2), 3, Arc::clone(&calls));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();

    let err = stub.invoke(&request(Selector::new(0, 0), 1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSlot { slot: 6, slots: 6 });
}

#[test]
fn test_application_failure_is_a_reply() {
    let ctx = context();
    let object: ObjectRef = LocalObject::builder("failing", iid(1))
        .method(|_| HResult::E_INVALIDARG)
        .method(|_| HResult::S_OK)
        .method(|_| HResult::S_OK)
        .build();
    let stub = ctx.create_stub(&object, &iid(1)).unwrap();

    let reply = stub.invoke(&request(Selector::new(0, 0), 1)).unwrap();
    let (status, present, value) = reply_words(&reply);
    assert_eq!(status, HResult::E_INVALIDARG);
    assert_eq!((present, value), (1, 0));
    assert_eq!(ctx.snapshot().calls_dispatched, 1);
}

#[test]
fn test_stub_requires_the_interface() {
    let ctx = context();
    let object: ObjectRef = LocalObject::builder("plain", iid(50)).build();
    let err = ctx.create_stub(&object, &iid(2)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoInterface { iid: iid(2), status: HResult::E_NOINTERFACE });

    let err = ctx.create_stub(&object, &iid(77)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownInterface { .. }));
}

#[test]
fn test_query_interface_selector() {
    let ctx = context();
    let object = recorder(iid(2), 6, Arc::new(Mutex::new(Vec::new())));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();

    let mut out = MarshalStream::new(64);
    out.write_bytes(&crate::typelib::guid_to_bytes(&iid(1))).unwrap();
    let reply = stub.invoke(&WireMessage::new(Selector::QUERY_INTERFACE, out.into_bytes())).unwrap();
    let mut reader = MessageReader::new(&reply.data);
    assert_eq!(crate::interop::read_status(&mut reader).unwrap(), HResult::S_OK);
    let len = reader.read_u32().unwrap() as usize;
    assert_eq!(len, crate::identity::EXPORT_BLOB_LEN);
    reader.read_bytes(len).unwrap();
    reader.finish().unwrap();

    let mut out = MarshalStream::new(64);
    out.write_bytes(&crate::typelib::guid_to_bytes(&iid(3))).unwrap();
    let reply = stub.invoke(&WireMessage::new(Selector::QUERY_INTERFACE, out.into_bytes())).unwrap();
    assert_eq!(reply.data, [
        HResult::E_NOINTERFACE.bits().to_le_bytes(),
        0u32.to_le_bytes(),
    ].concat());
}

#[test]
fn test_release_drops_object() {
    let ctx = context();
    let object = recorder(iid(2), 6, Arc::new(Mutex::new(Vec::new())));
    let stub = ctx.create_stub(&object, &iid(2)).unwrap();
    assert_eq!(object.ref_count(), 2);

    stub.add_ref();
    assert_eq!(stub.release(), 1);
    assert!(stub.is_connected());
    assert_eq!(stub.release(), 0);
    assert!(!stub.is_connected());
    assert_eq!(object.ref_count(), 1);

    let err = stub.invoke(&request(Selector::new(0, 0), 1)).unwrap_err();
    assert_eq!(err.status(), HResult::RPC_E_DISCONNECTED);
}
