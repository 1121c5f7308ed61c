//! Interface resolution and flattened dispatch offsets
//!
//! Interfaces form single-inheritance chains ending at IUnknown. A method's
//! real slot is `IDENTITY_SLOTS + flattened`, where `flattened` counts every
//! method declared between the interface and IUnknown (both excluded) plus
//! the method's own ordinal.

use crate::errors::{ErrorKind, MarshalError, Result};
use crate::interop::Selector;
use crate::logging::{trace, warn};
use crate::object::IDENTITY_SLOTS;
use crate::typelib::{Guid, InterfaceDesc, InterfaceKind, MethodDesc, TypeLibrary, IID_IUNKNOWN};
use smallvec::SmallVec;
use std::sync::Arc;

/// Descriptor registered for `iid`
pub fn resolve(library: &dyn TypeLibrary, iid: &Guid) -> Result<Arc<InterfaceDesc>> {
    library
        .resolve(iid)
        .ok_or_else(|| ErrorKind::UnknownInterface { iid: *iid }.into())
}

/// Swap a dual interface for its vtable half
///
/// A dual interface without a registered custom half keeps its dispatch
/// descriptor and is classified [`InterfaceKind::Dispatch`].
pub fn classify_and_normalize(
    library: &dyn TypeLibrary,
    desc: Arc<InterfaceDesc>,
) -> (Arc<InterfaceDesc>, InterfaceKind) {
    match desc.kind {
        InterfaceKind::Interface => (desc, InterfaceKind::Interface),
        InterfaceKind::Dual => match library.custom_half(&desc) {
            Some(custom) => (custom, InterfaceKind::Dual),
            None => (desc, InterfaceKind::Dispatch),
        },
        InterfaceKind::Dispatch => (desc, InterfaceKind::Dispatch),
    }
}

/// Resolve and normalize `iid`, refusing interfaces only reachable by late binding
pub fn resolve_vtable(library: &dyn TypeLibrary, iid: &Guid) -> Result<Arc<InterfaceDesc>> {
    let (desc, kind) = classify_and_normalize(library, resolve(library, iid)?);
    if kind == InterfaceKind::Dispatch {
        return Err(ErrorKind::DispatchOnly { iid: *iid }.into());
    }
    Ok(desc)
}

/// Ancestor `iid` as it sits in a dispatch table
///
/// A dual ancestor contributes its custom half, never its dispatch half.
pub fn resolve_ancestor(library: &dyn TypeLibrary, iid: &Guid) -> Option<Arc<InterfaceDesc>> {
    library
        .resolve(iid)
        .map(|desc| classify_and_normalize(library, desc).0)
}

/// One interface in an inheritance chain
#[derive(Debug, Clone)]
pub struct AncestorLink {
    pub iid: Guid,
    /// `None` when the library could not resolve this identity
    pub desc: Option<Arc<InterfaceDesc>>,
    pub method_count: usize,
}

impl AncestorLink {
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.desc.is_some()
    }
}

/// Chain from the ultimate base to the target, IUnknown excluded
pub type AncestorChain = SmallVec<[AncestorLink; 4]>;

/// Walk from `desc` towards IUnknown
///
/// An ancestor the library cannot resolve is taken to be IUnknown itself,
/// whose three methods the identity bias already covers. It appears in the
/// chain unresolved with no methods and the walk stops there.
pub fn walk_ancestors(
    library: &dyn TypeLibrary,
    desc: &Arc<InterfaceDesc>,
    max_depth: usize,
) -> Result<AncestorChain> {
    let mut chain = AncestorChain::new();
    chain.push(AncestorLink {
        iid: desc.iid,
        desc: Some(Arc::clone(desc)),
        method_count: desc.method_count(),
    });

    let mut next = desc.ancestor;
    while let Some(iid) = next {
        if iid == IID_IUNKNOWN {
            break;
        }
        if chain.len() > max_depth {
            return Err(MarshalError::from(ErrorKind::UnresolvedAncestor {
                iid,
                depth: chain.len().min(u16::MAX as usize) as u16,
            })
            .with_note(format!("inheritance chain deeper than {}", max_depth)));
        }
        match resolve_ancestor(library, &iid) {
            Some(ancestor) => {
                next = ancestor.ancestor;
                chain.push(AncestorLink {
                    iid,
                    method_count: ancestor.method_count(),
                    desc: Some(ancestor),
                });
            }
            None => {
                warn!(
                    interface = %desc.name,
                    ancestor = %iid,
                    "unresolvable ancestor, assuming IUnknown"
                );
                chain.push(AncestorLink { iid, desc: None, method_count: 0 });
                break;
            }
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Methods declared on the ancestors of `desc`, i.e. its first flattened ordinal
pub fn ancestor_method_count(
    library: &dyn TypeLibrary,
    desc: &Arc<InterfaceDesc>,
    max_depth: usize,
) -> Result<usize> {
    let chain = walk_ancestors(library, desc, max_depth)?;
    Ok(chain[..chain.len() - 1].iter().map(|link| link.method_count).sum())
}

/// Where a selector lands
#[derive(Debug, Clone)]
pub struct MethodLocation {
    /// Interface that declares the method
    pub interface: Arc<InterfaceDesc>,
    pub ordinal: u16,
    pub flattened: usize,
    pub slot: usize,
}

impl MethodLocation {
    pub fn method(&self) -> &MethodDesc {
        &self.interface.methods[self.ordinal as usize]
    }
}

/// Replay `selector` against the chain of `desc`, whose first flattened
/// ordinal is `fs`
///
/// Unlike [`walk_ancestors`], an ancestor that cannot be resolved here is an
/// error: nothing may be invoked on a guessed layout.
pub fn locate(
    library: &dyn TypeLibrary,
    desc: &Arc<InterfaceDesc>,
    fs: usize,
    selector: Selector,
) -> Result<MethodLocation> {
    let mut current = Arc::clone(desc);
    let mut fs = fs;

    for step in 1..=selector.depth() {
        let unresolved = |iid: Guid| ErrorKind::UnresolvedAncestor { iid, depth: step };
        let iid = match current.ancestor {
            Some(iid) if iid != IID_IUNKNOWN => iid,
            Some(iid) => return Err(unresolved(iid).into()),
            None => return Err(unresolved(current.iid).into()),
        };
        let ancestor = resolve_ancestor(library, &iid).ok_or_else(|| unresolved(iid))?;
        fs = fs
            .checked_sub(ancestor.method_count())
            .ok_or_else(|| unresolved(iid))?;
        current = ancestor;
    }

    let ordinal = selector.ordinal();
    if library.method(&current, ordinal).is_none() {
        return Err(ErrorKind::UnknownMethod {
            interface: current.name.clone(),
            depth: selector.depth(),
            ordinal,
        }
        .into());
    }

    let flattened = fs + ordinal as usize;
    let slot = IDENTITY_SLOTS + flattened;
    trace!(interface = %current.name, ?selector, slot, "located method");
    Ok(MethodLocation { interface: current, ordinal, flattened, slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typelib::{MemoryTypeLibrary, ParamDesc, TypeDesc};

    fn iid(n: u128) -> Guid {
        Guid::from_u128(0x1000 + n)
    }

    fn interface(n: u128, name: &str, parent: Option<Guid>, methods: usize) -> InterfaceDesc {
        let mut desc = InterfaceDesc::new(iid(n), name);
        if let Some(parent) = parent {
            desc = desc.extends(parent);
        }
        (0..methods).fold(desc, |d, m| {
            d.method(format!("M{}", m), vec![ParamDesc::input("x", TypeDesc::U4)])
        })
    }

    fn abc() -> MemoryTypeLibrary {
        MemoryTypeLibrary::standard()
            .with_interface(interface(1, "A", Some(IID_IUNKNOWN), 3))
            .with_interface(interface(2, "B", Some(iid(1)), 4))
            .with_interface(interface(3, "C", Some(iid(2)), 2))
    }

    #[test]
    fn test_chain_order() {
        let lib = abc();
        let c = resolve(&lib, &iid(3)).unwrap();
        let chain = walk_ancestors(&lib, &c, 16).unwrap();
        let names: Vec<_> = chain.iter().map(|l| l.desc.as_ref().unwrap().name.clone()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(ancestor_method_count(&lib, &c, 16).unwrap(), 7);
    }

    #[test]
    fn test_locate_across_chain() {
        let lib = abc();
        let b = resolve(&lib, &iid(2)).unwrap();
        let fs = ancestor_method_count(&lib, &b, 16).unwrap();
        assert_eq!(fs, 3);

        let own = locate(&lib, &b, fs, Selector::new(0, 2)).unwrap();
        assert_eq!(own.flattened, 5);
        assert_eq!(own.slot, 5 + IDENTITY_SLOTS);
        assert_eq!(own.method().name, "M2");

        let inherited = locate(&lib, &b, fs, Selector::new(1, 1)).unwrap();
        assert_eq!(inherited.interface.name, "A");
        assert_eq!(inherited.slot, IDENTITY_SLOTS + 1);
    }

    #[test]
    fn test_unknown_method() {
        let lib = abc();
        let a = resolve(&lib, &iid(1)).unwrap();
        let err = locate(&lib, &a, 0, Selector::new(0, 3)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownMethod { ordinal: 3, .. }));
    }

    #[test]
    fn test_walking_into_iunknown_fails() {
        let lib = abc();
        let a = resolve(&lib, &iid(1)).unwrap();
        let err = locate(&lib, &a, 0, Selector::new(1, 0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvedAncestor { iid: IID_IUNKNOWN, depth: 1 });
    }

    #[test]
    fn test_unresolvable_ancestor_fallback() {
        let lib = MemoryTypeLibrary::standard().with_interface(interface(5, "Orphan", Some(iid(99)), 2));
        let orphan = resolve(&lib, &iid(5)).unwrap();

        let chain = walk_ancestors(&lib, &orphan, 16).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(!chain[0].is_resolved());
        assert_eq!(chain[0].method_count, 0);
        assert_eq!(ancestor_method_count(&lib, &orphan, 16).unwrap(), 0);

        let own = locate(&lib, &orphan, 0, Selector::new(0, 1)).unwrap();
        assert_eq!(own.slot, IDENTITY_SLOTS + 1);

        let err = locate(&lib, &orphan, 0, Selector::new(1, 0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnresolvedAncestor { iid: iid(99), depth: 1 });
    }

    #[test]
    fn test_depth_limit() {
        let lib = abc();
        let c = resolve(&lib, &iid(3)).unwrap();
        assert!(walk_ancestors(&lib, &c, 1).is_err());
        assert!(walk_ancestors(&lib, &c, 2).is_ok());
    }

    #[test]
    fn test_dual_ancestor_contributes_custom_half() {
        let dispatch = InterfaceDesc::new(iid(7), "IWidget").extends(crate::typelib::IID_IDISPATCH);
        let custom = interface(7, "IWidget", Some(crate::typelib::IID_IDISPATCH), 2);
        let lib = MemoryTypeLibrary::standard()
            .with_dual(dispatch, custom)
            .with_interface(interface(9, "Derived", Some(iid(7)), 1));
        let derived = resolve_vtable(&lib, &iid(9)).unwrap();

        let chain = walk_ancestors(&lib, &derived, 16).unwrap();
        let counts: Vec<_> = chain.iter().map(|link| link.method_count).collect();
        assert_eq!(counts, vec![4, 2, 1]);

        let fs = ancestor_method_count(&lib, &derived, 16).unwrap();
        assert_eq!(fs, 6);

        let inherited = locate(&lib, &derived, fs, Selector::new(1, 1)).unwrap();
        assert_eq!(inherited.method().name, "M1");
        assert_eq!(inherited.slot, IDENTITY_SLOTS + 4 + 1);
        let own = locate(&lib, &derived, fs, Selector::new(0, 0)).unwrap();
        assert_eq!(own.slot, IDENTITY_SLOTS + 6);
    }

    #[test]
    fn test_dual_normalization() {
        let dispatch = InterfaceDesc::new(iid(7), "IWidget").extends(crate::typelib::IID_IDISPATCH);
        let custom = interface(7, "IWidget", Some(crate::typelib::IID_IDISPATCH), 2);
        let lib = MemoryTypeLibrary::standard()
            .with_dual(dispatch, custom)
            .with_interface(interface(8, "Late", None, 0).with_kind(InterfaceKind::Dispatch));

        let desc = resolve_vtable(&lib, &iid(7)).unwrap();
        assert_eq!(desc.method_count(), 2);
        assert_eq!(ancestor_method_count(&lib, &desc, 16).unwrap(), 4);

        let err = resolve_vtable(&lib, &iid(8)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DispatchOnly { iid: iid(8) });
        assert!(matches!(
            resolve_vtable(&lib, &iid(42)).unwrap_err().kind,
            ErrorKind::UnknownInterface { .. }
        ));
    }
}
