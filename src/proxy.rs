//! Client-side proxies
//!
//! A [`Proxy`] is an object whose dispatch table was built at run time from
//! type information. Every method slot holds a trampoline: a closure that
//! captures its slot's constant [`Selector`] and forwards the caller's
//! argument frame to one shared dispatch routine.
//!
//! Slot layouts are cached per interface. An interface's layout is its
//! ancestor's layout with every depth shifted by one, followed by its own
//! methods at depth 0.

use crate::channel::{Channel, TransportError};
use crate::context::MarshalContext;
use crate::errors::{ErrorCategory, ErrorKind, MarshalError, Result};
use crate::interop::{
    dump_args, marshal_args, read_status, unmarshal_args, MessageReader, Phase, Selector, Value,
    WireMessage,
};
use crate::logging::{debug, log_proxy_created, log_remote_fault, warn};
use crate::object::{ObjectRef, Unknown, VTable, IDENTITY_SLOTS};
use crate::refcount::RefCounter;
use crate::resolver;
use crate::status::HResult;
use crate::typelib::{guid_to_bytes, Guid, InterfaceDesc, TypeLibrary, IID_IUNKNOWN};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Selector for every method slot of one interface, in slot order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyLayout {
    pub iid: Guid,
    selectors: Vec<Selector>,
}

impl ProxyLayout {
    /// Dispatch table size, identity slots included
    #[inline]
    pub fn slots(&self) -> usize {
        IDENTITY_SLOTS + self.selectors.len()
    }

    #[inline]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Selector behind a dispatch table slot
    pub fn selector(&self, slot: usize) -> Option<Selector> {
        slot.checked_sub(IDENTITY_SLOTS)
            .and_then(|index| self.selectors.get(index))
            .copied()
    }
}

pub type LayoutCache = DashMap<Guid, Arc<ProxyLayout>>;

/// Layout of `desc`, built from its ancestors' cached layouts
pub fn build_layout(
    library: &dyn TypeLibrary,
    cache: &LayoutCache,
    desc: &InterfaceDesc,
    max_depth: usize,
) -> Result<Arc<ProxyLayout>> {
    if let Some(hit) = cache.get(&desc.iid) {
        return Ok(Arc::clone(hit.value()));
    }
    if max_depth == 0 {
        return Err(MarshalError::from(ErrorKind::UnresolvedAncestor { iid: desc.iid, depth: 0 })
            .with_note("inheritance chain too deep to lay out"));
    }

    let mut selectors = Vec::new();
    match desc.ancestor {
        None => {}
        Some(iid) if iid == IID_IUNKNOWN => {}
        Some(iid) => match resolver::resolve_ancestor(library, &iid) {
            Some(ancestor) => {
                let inherited = build_layout(library, cache, &ancestor, max_depth - 1)?;
                selectors.reserve(inherited.selectors.len() + desc.method_count());
                for selector in &inherited.selectors {
                    let shifted = selector.deeper().ok_or(ErrorKind::UnresolvedAncestor {
                        iid,
                        depth: u16::MAX,
                    })?;
                    selectors.push(shifted);
                }
            }
            None => {
                warn!(
                    interface = %desc.name,
                    ancestor = %iid,
                    "unresolvable ancestor, assuming IUnknown"
                );
            }
        },
    }
    selectors.extend((0..desc.method_count()).map(|m| Selector::new(0, m as u16)));

    let layout = Arc::new(ProxyLayout { iid: desc.iid, selectors });
    cache.insert(desc.iid, Arc::clone(&layout));
    Ok(layout)
}

/// State every trampoline of one proxy shares
struct ProxyCore {
    context: MarshalContext,
    iid: Guid,
    desc: Arc<InterfaceDesc>,
    fs: usize,
    channel: Arc<dyn Channel>,
}

impl ProxyCore {
    /// Shared dispatch routine behind every method slot
    fn dispatch(&self, selector: Selector, args: &mut [Value]) -> HResult {
        match self.round_trip(selector, args) {
            Ok(status) => status,
            Err(err) => self.fail(selector, err),
        }
    }

    fn round_trip(&self, selector: Selector, args: &mut [Value]) -> Result<HResult> {
        let location = resolver::locate(self.context.library(), &self.desc, self.fs, selector)?;
        let method = location.method();
        let codec = self.context.codec();
        let dump = self.context.dump_arguments();

        let mut out = self.context.stream();
        if dump {
            dump_args(method, args, Phase::In);
        }
        if Phase::In.applies_to(method) {
            marshal_args(&codec, &mut out, method, args, Phase::In)?;
        } else if args.len() != method.params.len() {
            return Err(ErrorKind::ArgCountMismatch {
                expected: method.params.len(),
                got: args.len(),
            }
            .into());
        }

        let mut buffer = self.channel.get_buffer(out.len())?;
        buffer.extend_from_slice(out.as_bytes());
        let request = WireMessage::new(selector, buffer);
        let sent = request.len();

        let reply = self.channel.send_receive(request)?;
        self.context.stats().record_sent(sent, reply.len());

        let mut reader = MessageReader::new(&reply.data);
        let status = read_status(&mut reader)?;
        if Phase::Out.applies_to(method) {
            unmarshal_args(&codec, &mut reader, method, args, Phase::Out)?;
            if dump {
                dump_args(method, args, Phase::Out);
            }
        }
        reader.finish()?;

        Ok(status)
    }

    fn fail(&self, selector: Selector, err: MarshalError) -> HResult {
        let status = err.status();
        if err.category() == ErrorCategory::Transport {
            self.context.stats().record_failed();
            let method = resolver::locate(self.context.library(), &self.desc, self.fs, selector)
                .map(|loc| loc.method().name.clone())
                .unwrap_or_else(|_| format!("{:?}", selector));
            let cause = match &err.kind {
                ErrorKind::Transport(TransportError::RemoteFault(cause)) => Some(*cause),
                _ => None,
            };
            log_remote_fault(&self.iid, &method, status, cause);
        } else {
            self.context.stats().record_marshaling_error();
            warn!(iid = %self.iid, ?selector, error = %err, "call not sent");
        }
        status
    }

    /// Ask the remote object for another interface
    fn remote_query(&self, iid: &Guid) -> Result<ObjectRef> {
        let mut out = self.context.stream();
        out.write_bytes(&guid_to_bytes(iid))?;

        let mut buffer = self.channel.get_buffer(out.len())?;
        buffer.extend_from_slice(out.as_bytes());
        let request = WireMessage::new(Selector::QUERY_INTERFACE, buffer);
        let sent = request.len();
        let reply = self.channel.send_receive(request)?;
        self.context.stats().record_sent(sent, reply.len());

        let mut reader = MessageReader::new(&reply.data);
        let status = read_status(&mut reader)?;
        let len = reader.read_u32()? as usize;
        let blob = reader.read_bytes(len)?;
        reader.finish()?;

        if status.is_failure() || len == 0 {
            let status = if status.is_failure() { status } else { HResult::E_NOINTERFACE };
            return Err(ErrorKind::NoInterface { iid: *iid, status }.into());
        }
        self.context.identity().import(blob, iid)
    }
}

/// Run-time synthesized stand-in for a remote object
pub struct Proxy {
    core: Arc<ProxyCore>,
    layout: Arc<ProxyLayout>,
    /// Identities answered without a round trip
    local_iids: SmallVec<[Guid; 4]>,
    vtable: VTable,
    refs: RefCounter,
}

impl Proxy {
    pub(crate) fn new(context: MarshalContext, iid: &Guid, channel: Arc<dyn Channel>) -> Result<Self> {
        let library = context.library();
        let max_depth = context.max_ancestor_depth();
        let desc = resolver::resolve_vtable(library, iid)?;
        let fs = resolver::ancestor_method_count(library, &desc, max_depth)?;
        let layout = build_layout(library, context.layouts(), &desc, max_depth)?;

        let mut local_iids: SmallVec<[Guid; 4]> = SmallVec::new();
        local_iids.push(*iid);
        for link in resolver::walk_ancestors(library, &desc, max_depth)? {
            if link.is_resolved() && !local_iids.contains(&link.iid) {
                local_iids.push(link.iid);
            }
        }

        log_proxy_created(iid, &desc.name, layout.slots());
        context.stats().record_proxy();

        let core = Arc::new(ProxyCore { context, iid: *iid, desc, fs, channel });

        let mut vtable = VTable::with_capacity(layout.selectors.len());
        for &selector in &layout.selectors {
            let core = Arc::clone(&core);
            vtable.push(Arc::new(move |args: &mut [Value]| core.dispatch(selector, args)));
        }

        Ok(Self { core, layout, local_iids, vtable, refs: RefCounter::new() })
    }

    #[inline]
    pub fn iid(&self) -> &Guid {
        &self.core.iid
    }

    #[inline]
    pub fn layout(&self) -> &Arc<ProxyLayout> {
        &self.layout
    }

    pub fn is_connected(&self) -> bool {
        self.core.channel.is_connected()
    }

    /// Call the method in dispatch table slot `slot`
    pub fn call(&self, slot: usize, args: &mut [Value]) -> HResult {
        match self.vtable.method(slot) {
            Some(body) => body(args),
            None => {
                let err = MarshalError::from(ErrorKind::InvalidSlot { slot, slots: self.vtable.len() });
                self.core.fail(Selector::from_raw(slot as u32), err)
            }
        }
    }
}

impl Unknown for Proxy {
    fn query_interface(self: Arc<Self>, iid: &Guid) -> std::result::Result<ObjectRef, HResult> {
        if *iid == IID_IUNKNOWN || self.local_iids.contains(iid) {
            self.add_ref();
            return Ok(self);
        }
        self.core.remote_query(iid).map_err(|err| {
            debug!(iid = %iid, error = %err, "remote query failed");
            match err.kind {
                ErrorKind::NoInterface { status, .. } => status,
                _ => err.status(),
            }
        })
    }

    fn add_ref(&self) -> u32 {
        self.refs.increment()
    }

    fn release(&self) -> u32 {
        let remaining = self.refs.decrement();
        if remaining == 0 && self.core.channel.is_connected() {
            debug!(iid = %self.core.iid, "proxy released");
            self.core.channel.disconnect();
        }
        remaining
    }

    fn vtable(&self) -> &VTable {
        &self.vtable
    }

    fn ref_count(&self) -> u32 {
        self.refs.get()
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if self.core.channel.is_connected() {
            self.core.channel.disconnect();
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("iid", &self.core.iid)
            .field("interface", &self.core.desc.name)
            .field("slots", &self.vtable.len())
            .field("refs", &self.refs.get())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests;
