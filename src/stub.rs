//! Server-side call receiver
//!
//! A [`Stub`] holds one reference to a real object and turns request
//! messages into calls on its dispatch table:
//!
//! ```text
//! request  [selector][IN params]
//!   -> locate slot -> unmarshal IN -> call -> marshal [status][OUT params]
//!   -> release every interface reference the frame holds
//! ```
//!
//! The reserved [`Selector::QUERY_INTERFACE`] asks the held object for
//! another interface and answers `[status][blob]`.

use crate::channel::TransportError;
use crate::context::MarshalContext;
use crate::errors::{ErrorKind, Result};
use crate::interop::{
    dump_args, marshal_args, read_status, unmarshal_args, write_status, FunctionCall,
    MessageReader, Phase, Selector, Value, WireMessage,
};
use crate::logging::{debug, log_stub_created, trace, warn};
use crate::object::ObjectRef;
use crate::refcount::RefCounter;
use crate::resolver::{self, MethodLocation};
use crate::status::HResult;
use crate::typelib::{guid_from_bytes, Guid, InterfaceDesc, IID_IUNKNOWN};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct Stub {
    context: MarshalContext,
    iid: Guid,
    /// Vtable descriptor, after dual normalization
    desc: Arc<InterfaceDesc>,
    /// First flattened ordinal of `desc`
    fs: usize,
    object: RwLock<Option<ObjectRef>>,
    refs: RefCounter,
}

impl Stub {
    pub(crate) fn new(context: MarshalContext, object: &ObjectRef, iid: &Guid) -> Result<Self> {
        let library = context.library();
        let desc = resolver::resolve_vtable(library, iid)?;
        let fs = resolver::ancestor_method_count(library, &desc, context.max_ancestor_depth())?;

        let held = Arc::clone(object)
            .query_interface(iid)
            .map_err(|status| ErrorKind::NoInterface { iid: *iid, status })?;

        log_stub_created(iid, &desc.name, fs);
        context.stats().record_stub();

        Ok(Self {
            context,
            iid: *iid,
            desc,
            fs,
            object: RwLock::new(Some(held)),
            refs: RefCounter::new(),
        })
    }

    #[inline]
    pub fn iid(&self) -> &Guid {
        &self.iid
    }

    #[inline]
    pub fn interface(&self) -> &Arc<InterfaceDesc> {
        &self.desc
    }

    /// Methods declared on the ancestors of the served interface
    #[inline]
    pub fn fs(&self) -> usize {
        self.fs
    }

    /// Whether the stub still holds its object
    pub fn is_connected(&self) -> bool {
        self.object.read().is_some()
    }

    /// Dispatch table slot `selector` resolves to
    pub fn locate(&self, selector: Selector) -> Result<MethodLocation> {
        resolver::locate(self.context.library(), &self.desc, self.fs, selector)
    }

    /// Serve one request
    ///
    /// Resolution and decoding failures return an error before the object is
    /// touched. A failing status from the object is a normal reply.
    pub fn invoke(&self, request: &WireMessage) -> Result<WireMessage> {
        let object = self.object.read().clone().ok_or(TransportError::Disconnected)?;

        if request.selector.is_query_interface() {
            return self.query_interface(&object, request);
        }

        let location = match self.locate(request.selector) {
            Ok(location) => location,
            Err(err) => {
                self.context.stats().record_marshaling_error();
                return Err(err);
            }
        };
        let method = location.method();
        let codec = self.context.codec();
        let mut args = vec![Value::Empty; method.params.len()];

        let result = self.dispatch(&object, &location, request, &mut args);

        for (param, arg) in method.params.iter().zip(args.iter_mut()) {
            if let Err(err) = codec.cleanup(&param.ty, arg) {
                warn!(method = %method.name, param = %param.name, error = %err, "cleanup failed");
            }
        }

        if result.is_err() {
            self.context.stats().record_marshaling_error();
        }
        result
    }

    fn dispatch(
        &self,
        object: &ObjectRef,
        location: &MethodLocation,
        request: &WireMessage,
        args: &mut [Value],
    ) -> Result<WireMessage> {
        let method = location.method();
        let codec = self.context.codec();

        let mut reader = MessageReader::new(&request.data);
        unmarshal_args(&codec, &mut reader, method, args, Phase::In)?;
        reader.finish()?;

        let vtable = object.vtable();
        let body = vtable
            .method(location.slot)
            .ok_or(ErrorKind::InvalidSlot { slot: location.slot, slots: vtable.len() })?;

        if self.context.dump_arguments() {
            dump_args(method, args, Phase::In);
        }
        let status = FunctionCall::new(body, method.convention, method.params.len()).call(args)?;
        self.context.stats().record_dispatched();
        trace!(method = %method.name, slot = location.slot, %status, "invoked");

        let mut out = self.context.stream();
        write_status(&mut out, status)?;
        if Phase::Out.applies_to(method) {
            if self.context.dump_arguments() {
                dump_args(method, args, Phase::Out);
            }
            marshal_args(&codec, &mut out, method, args, Phase::Out)?;
        }

        Ok(WireMessage::new(request.selector, out.into_bytes()))
    }

    /// `[iid]` in, `[status][blob]` out
    fn query_interface(&self, object: &ObjectRef, request: &WireMessage) -> Result<WireMessage> {
        let mut reader = MessageReader::new(&request.data);
        let bytes = reader.read_bytes(16)?;
        reader.finish()?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        let iid = guid_from_bytes(raw);

        let mut out = self.context.stream();
        match Arc::clone(object).query_interface(&iid) {
            Ok(found) => {
                let exported = self.context.identity().export(&found, &iid);
                self.context.identity().release(&found);
                match exported {
                    Ok(blob) => {
                        write_status(&mut out, HResult::S_OK)?;
                        out.write_len(blob.len())?;
                        out.write_bytes(&blob)?;
                    }
                    Err(err) => {
                        debug!(iid = %iid, error = %err, "query succeeded but export failed");
                        write_status(&mut out, err.status())?;
                        out.write_u32(0)?;
                    }
                }
            }
            Err(status) => {
                write_status(&mut out, status)?;
                out.write_u32(0)?;
            }
        }

        Ok(WireMessage::new(request.selector, out.into_bytes()))
    }

    /// Release the references carried by a reply that was never delivered
    ///
    /// Each exported interface in `reply` is claimed and released, so its
    /// stub does not wait for an import that will never come.
    pub fn discard_reply(&self, reply: &WireMessage) -> Result<()> {
        let identity = self.context.identity();
        let mut reader = MessageReader::new(&reply.data);
        read_status(&mut reader)?;

        if reply.selector.is_query_interface() {
            let len = reader.read_u32()? as usize;
            if len > 0 {
                let object = identity.import(reader.read_bytes(len)?, &IID_IUNKNOWN)?;
                identity.release(&object);
            }
            return Ok(());
        }

        let location = self.locate(reply.selector)?;
        let method = location.method();
        if !Phase::Out.applies_to(method) {
            return Ok(());
        }
        let codec = self.context.codec();
        let mut args = vec![Value::Empty; method.params.len()];
        let decoded = unmarshal_args(&codec, &mut reader, method, &mut args, Phase::Out);
        for (param, arg) in method.params.iter().zip(args.iter_mut()) {
            codec.cleanup(&param.ty, arg)?;
        }
        debug!(method = %method.name, "discarded undelivered reply");
        decoded
    }

    pub fn add_ref(&self) -> u32 {
        self.refs.increment()
    }

    /// Returns the new count; at zero the held object is released
    pub fn release(&self) -> u32 {
        let remaining = self.refs.decrement();
        if remaining == 0 {
            let held = self.object.write().take();
            if let Some(object) = held {
                debug!(iid = %self.iid, "stub released");
                self.context.identity().release(&object);
            }
        }
        remaining
    }
}

impl std::fmt::Debug for Stub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stub")
            .field("iid", &self.iid)
            .field("interface", &self.desc.name)
            .field("fs", &self.fs)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests;
