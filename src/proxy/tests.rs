//! Proxy layout and round-trip tests

use super::*;
use crate::config::MarshalConfig;
use crate::object::{same_object, LocalObject, LocalObjectBuilder};
use crate::typelib::{MemoryTypeLibrary, ParamDesc, TypeDesc};
use parking_lot::Mutex;

fn iid(n: u128) -> Guid {
    Guid::from_u128(0xB000 + n)
}

fn with_methods(desc: InterfaceDesc, count: usize) -> InterfaceDesc {
    (0..count).fold(desc, |d, m| {
        d.method(format!("M{}", m), vec![
            ParamDesc::input("x", TypeDesc::U4),
            ParamDesc::output("result", TypeDesc::ptr(TypeDesc::U4)),
        ])
    })
}

/// A (2) <- B (3) <- C (1), D (1) on its own, and an orphan whose parent is missing
fn library() -> MemoryTypeLibrary {
    MemoryTypeLibrary::standard()
        .with_interface(with_methods(InterfaceDesc::new(iid(1), "IA").extends(IID_IUNKNOWN), 2))
        .with_interface(with_methods(InterfaceDesc::new(iid(2), "IB").extends(iid(1)), 3))
        .with_interface(with_methods(InterfaceDesc::new(iid(3), "IC").extends(iid(2)), 1))
        .with_interface(with_methods(InterfaceDesc::new(iid(4), "ID").extends(IID_IUNKNOWN), 1))
        .with_interface(with_methods(InterfaceDesc::new(iid(5), "IOrphan").extends(iid(99)), 1))
}

fn context() -> MarshalContext {
    MarshalContext::local(Arc::new(library()), MarshalConfig::default())
}

type Calls = Arc<Mutex<Vec<usize>>>;

/// Object whose method in slot `s` answers `x * 10 + s`
fn recorder(name: &str, primary: Guid, methods: usize, calls: &Calls) -> LocalObjectBuilder {
    let mut builder = LocalObject::builder(name, primary);
    for index in 0..methods {
        let slot = IDENTITY_SLOTS + index;
        let calls = Arc::clone(calls);
        builder = builder.method(move |args| {
            calls.lock().push(slot);
            let x = args[0].as_u32().unwrap_or(0);
            args[1].set_pointee(Value::U4(x * 10 + slot as u32));
            HResult::S_OK
        });
    }
    builder
}

/// Implements C (and so B and A) with D as a tear-off
fn widget(calls: &Calls) -> ObjectRef {
    let tear_off: ObjectRef = recorder("d", iid(4), 1, calls).build();
    recorder("widget", iid(3), 6, calls)
        .implements(iid(2))
        .implements(iid(1))
        .tear_off(iid(4), tear_off)
        .build()
}

fn args(x: u32) -> Vec<Value> {
    vec![Value::U4(x), Value::ptr(Value::U4(0))]
}

#[test]
fn test_layout_shifts_ancestors() {
    let ctx = context();
    let desc = ctx.library().resolve(&iid(3)).unwrap();
    let layout = build_layout(ctx.library(), ctx.layouts(), &desc, 64).unwrap();

    assert_eq!(layout.selectors(), &[
        Selector::new(2, 0),
        Selector::new(2, 1),
        Selector::new(1, 0),
        Selector::new(1, 1),
        Selector::new(1, 2),
        Selector::new(0, 0),
    ]);
    assert_eq!(layout.slots(), IDENTITY_SLOTS + 6);
    assert_eq!(layout.selector(IDENTITY_SLOTS), Some(Selector::new(2, 0)));
    assert_eq!(layout.selector(1), None);
    assert_eq!(layout.selector(9), None);

    // Ancestor layouts were cached along the way
    let b = ctx.layouts().get(&iid(2)).map(|hit| Arc::clone(hit.value())).unwrap();
    assert_eq!(b.selectors().len(), 5);
    assert!(ctx.layouts().contains_key(&iid(1)));

    let again = build_layout(ctx.library(), ctx.layouts(), &desc, 64).unwrap();
    assert!(Arc::ptr_eq(&layout, &again));
}

#[test]
fn test_layout_depth_limit() {
    let ctx = context();
    let desc = ctx.library().resolve(&iid(3)).unwrap();
    let err = build_layout(ctx.library(), ctx.layouts(), &desc, 2).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnresolvedAncestor { .. }));
}

#[test]
fn test_orphan_layout_falls_back() {
    let ctx = context();
    let desc = ctx.library().resolve(&iid(5)).unwrap();
    let layout = build_layout(ctx.library(), ctx.layouts(), &desc, 64).unwrap();
    assert_eq!(layout.selectors(), &[Selector::new(0, 0)]);
}

#[test]
fn test_proxy_and_stub_agree_on_slots() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let object = widget(&calls);
    let stub = ctx.create_stub(&object, &iid(3)).unwrap();
    let proxy = ctx.connect(&object, &iid(3)).unwrap();

    assert_eq!(proxy.vtable().len(), proxy.layout().slots());
    for (index, &selector) in proxy.layout().selectors().iter().enumerate() {
        let located = stub.locate(selector).unwrap();
        assert_eq!(located.slot, IDENTITY_SLOTS + index, "{:?}", selector);
    }
}

#[test]
fn test_calls_reach_matching_slot() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let proxy = ctx.connect(&widget(&calls), &iid(3)).unwrap();

    for slot in IDENTITY_SLOTS..proxy.layout().slots() {
        let mut frame = args(7);
        assert_eq!(proxy.call(slot, &mut frame), HResult::S_OK);
        assert_eq!(frame[1].pointee(), Some(&Value::U4(70 + slot as u32)));
    }
    assert_eq!(calls.lock().as_slice(), &[3, 4, 5, 6, 7, 8]);

    let stats = ctx.snapshot();
    assert_eq!(stats.calls_sent, 6);
    assert_eq!(stats.calls_dispatched, 6);
    assert_eq!(stats.calls_failed, 0);
    // x, then status + flag + result
    assert_eq!(stats.bytes_sent, 6 * 4);
    assert_eq!(stats.bytes_received, 6 * 12);
}

#[test]
fn test_vtable_trampolines() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let proxy = ctx.connect(&widget(&calls), &iid(3)).unwrap();

    let body = proxy.vtable().method(IDENTITY_SLOTS + 5).unwrap();
    let mut frame = args(1);
    assert_eq!(body(&mut frame), HResult::S_OK);
    assert_eq!(frame[1].pointee().and_then(Value::as_u32), Some(18));
    assert!(proxy.vtable().method(0).is_none());
}

#[test]
fn test_query_interface_answers_ancestors_locally() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let proxy = ctx.connect(&widget(&calls), &iid(3)).unwrap();
    let as_object: ObjectRef = proxy.clone();

    for wanted in [IID_IUNKNOWN, iid(1), iid(2), iid(3)] {
        let found = Arc::clone(&proxy).query_interface(&wanted).unwrap();
        assert!(same_object(&found, &as_object));
    }
    assert_eq!(proxy.ref_count(), 5);
    assert_eq!(ctx.snapshot().calls_sent, 0);
}

#[test]
fn test_query_interface_goes_remote() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let proxy = ctx.connect(&widget(&calls), &iid(3)).unwrap();
    let as_object: ObjectRef = proxy.clone();

    let other = Arc::clone(&proxy).query_interface(&iid(4)).unwrap();
    assert!(!same_object(&other, &as_object));
    assert_eq!(ctx.snapshot().calls_sent, 1);

    let body = other.vtable().method(IDENTITY_SLOTS).unwrap();
    let mut frame = args(2);
    assert_eq!(body(&mut frame), HResult::S_OK);
    assert_eq!(frame[1].pointee().and_then(Value::as_u32), Some(23));

    let missing = Arc::clone(&proxy).query_interface(&iid(5));
    assert_eq!(missing.err(), Some(HResult::E_NOINTERFACE));
}

#[test]
fn test_release_disconnects() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let object = widget(&calls);
    let proxy = ctx.connect(&object, &iid(3)).unwrap();
    assert_eq!(object.ref_count(), 2);

    assert_eq!(proxy.release(), 0);
    assert!(!proxy.is_connected());
    assert_eq!(object.ref_count(), 1);

    assert_eq!(proxy.call(IDENTITY_SLOTS, &mut args(1)), HResult::RPC_E_DISCONNECTED);
    assert_eq!(ctx.snapshot().calls_failed, 1);
    assert!(calls.lock().is_empty());
}

#[test]
fn test_drop_disconnects() {
    let ctx = context();
    let object = widget(&Arc::default());
    let proxy = ctx.connect(&object, &iid(3)).unwrap();
    assert_eq!(object.ref_count(), 2);
    drop(proxy);
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_bad_calls_are_not_sent() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let proxy = ctx.connect(&widget(&calls), &iid(3)).unwrap();

    assert_eq!(proxy.call(0, &mut args(1)), HResult::TYPE_E_ELEMENTNOTFOUND);
    assert_eq!(proxy.call(42, &mut args(1)), HResult::TYPE_E_ELEMENTNOTFOUND);
    assert_eq!(proxy.call(IDENTITY_SLOTS, &mut []), HResult::E_INVALIDARG);
    let mut wrong = vec![Value::bstr("seven"), Value::ptr(Value::U4(0))];
    assert_eq!(proxy.call(IDENTITY_SLOTS, &mut wrong), HResult::DISP_E_TYPEMISMATCH);

    let stats = ctx.snapshot();
    assert_eq!(stats.calls_sent, 0);
    assert_eq!(stats.marshaling_errors, 4);
    assert!(calls.lock().is_empty());
}

#[test]
fn test_remote_fault_status() {
    let ctx = context();
    let calls: Calls = Arc::default();
    // Declares IC but provides only IA's methods
    let object: ObjectRef = recorder("short", iid(3), 2, &calls).build();
    let proxy = ctx.connect(&object, &iid(3)).unwrap();

    assert_eq!(proxy.call(IDENTITY_SLOTS, &mut args(1)), HResult::S_OK);
    // The stub cannot find slot 8, which is not an application failure
    assert_eq!(proxy.call(IDENTITY_SLOTS + 5, &mut args(1)), HResult::RPC_E_SERVERFAULT);
    assert_eq!(ctx.snapshot().calls_failed, 1);
    assert_eq!(calls.lock().as_slice(), &[IDENTITY_SLOTS]);
}

#[test]
fn test_threaded_round_trip() {
    let ctx = context();
    let calls: Calls = Arc::default();
    let object = widget(&calls);
    let proxy = ctx.connect_threaded(&object, &iid(3)).unwrap();

    let mut frame = args(3);
    assert_eq!(proxy.call(IDENTITY_SLOTS + 2, &mut frame), HResult::S_OK);
    assert_eq!(frame[1].pointee().and_then(Value::as_u32), Some(35));

    drop(proxy);
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_dual_ancestor_lays_out_custom_half() {
    let dispatch = InterfaceDesc::new(iid(30), "IGadget").extends(crate::typelib::IID_IDISPATCH);
    let custom = with_methods(
        InterfaceDesc::new(iid(30), "IGadget").extends(crate::typelib::IID_IDISPATCH),
        2,
    );
    let derived = with_methods(InterfaceDesc::new(iid(31), "IGadgetEx").extends(iid(30)), 1);
    let ctx = MarshalContext::local(
        Arc::new(library().with_dual(dispatch, custom).with_interface(derived)),
        MarshalConfig::default(),
    );
    let calls: Calls = Arc::default();
    let object: ObjectRef = recorder("gadget", iid(31), 7, &calls).implements(iid(30)).build();

    // IDispatch's four methods, then IGadget's two, then IGadgetEx's one
    let proxy = ctx.connect(&object, &iid(31)).unwrap();
    assert_eq!(proxy.layout().slots(), IDENTITY_SLOTS + 7);

    let mut frame = args(1);
    assert_eq!(proxy.call(IDENTITY_SLOTS + 4, &mut frame), HResult::S_OK);
    assert_eq!(frame[1].pointee().and_then(Value::as_u32), Some(17));
    assert_eq!(proxy.call(IDENTITY_SLOTS + 6, &mut args(1)), HResult::S_OK);
    assert_eq!(calls.lock().as_slice(), &[IDENTITY_SLOTS + 4, IDENTITY_SLOTS + 6]);

    // The layout cached for IGadget along the way is the full one
    let gadget = ctx.connect(&object, &iid(30)).unwrap();
    assert_eq!(gadget.layout().slots(), IDENTITY_SLOTS + 6);
}

#[test]
fn test_dispatch_only_has_no_proxy() {
    let dispatch = InterfaceDesc::new(iid(20), "IScript")
        .extends(crate::typelib::IID_IDISPATCH)
        .with_kind(crate::typelib::InterfaceKind::Dispatch);
    let ctx = MarshalContext::local(
        Arc::new(library().with_interface(dispatch)),
        MarshalConfig::default(),
    );
    let object: ObjectRef = LocalObject::builder("script", iid(20)).build();
    let err = ctx.connect(&object, &iid(20)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DispatchOnly { iid: iid(20) });
}
