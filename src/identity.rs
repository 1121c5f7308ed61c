//! Identity substrate: turning object references into transferable blobs
//!
//! [`IdentityManager`] is what the value codec calls for every interface
//! reference it meets. [`LocalExporter`] implements it in-process: exporting
//! parks a fresh stub behind a cookie, importing claims that stub once and
//! wraps it in a proxy over a loopback channel.

use crate::channel::{LoopbackChannel, TransportError};
use crate::config::MarshalConfig;
use crate::context::MarshalContext;
use crate::errors::{ErrorKind, Result};
use crate::logging::{debug, trace};
use crate::object::ObjectRef;
use crate::proxy::LayoutCache;
use crate::stats::InteropStats;
use crate::stub::Stub;
use crate::typelib::{guid_from_bytes, guid_to_bytes, Guid, TypeLibrary};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub trait IdentityManager: Send + Sync {
    /// Fresh blob through which a peer can reach `object` as `iid`
    fn export(&self, object: &ObjectRef, iid: &Guid) -> Result<Vec<u8>>;

    /// Object behind a blob produced by a peer's `export`
    fn import(&self, blob: &[u8], iid: &Guid) -> Result<ObjectRef>;

    fn add_ref(&self, object: &ObjectRef) -> u32 {
        object.add_ref()
    }

    fn release(&self, object: &ObjectRef) -> u32 {
        object.release()
    }
}

/// Magic prefix of a local export blob, "TLMX"
const EXPORT_MAGIC: u32 = 0x584D_4C54;

/// magic + cookie + iid
pub const EXPORT_BLOB_LEN: usize = 4 + 8 + 16;

fn encode_blob(cookie: u64, iid: &Guid) -> Vec<u8> {
    let mut blob = Vec::with_capacity(EXPORT_BLOB_LEN);
    blob.extend_from_slice(&EXPORT_MAGIC.to_le_bytes());
    blob.extend_from_slice(&cookie.to_le_bytes());
    blob.extend_from_slice(&guid_to_bytes(iid));
    blob
}

fn decode_blob(blob: &[u8]) -> Result<(u64, Guid)> {
    let malformed = || ErrorKind::MalformedExport { len: blob.len() };
    if blob.len() != EXPORT_BLOB_LEN {
        return Err(malformed().into());
    }
    let (magic, rest) = blob.split_at(4);
    let (cookie, iid) = rest.split_at(8);
    let magic = u32::from_le_bytes(magic.try_into().map_err(|_| malformed())?);
    if magic != EXPORT_MAGIC {
        return Err(malformed().into());
    }
    let cookie = u64::from_le_bytes(cookie.try_into().map_err(|_| malformed())?);
    let iid = guid_from_bytes(iid.try_into().map_err(|_| malformed())?);
    Ok((cookie, iid))
}

/// In-process identity substrate
pub struct LocalExporter {
    /// Context handed to the stubs and proxies this exporter creates
    context: MarshalContext,
    exports: DashMap<u64, Arc<Stub>>,
    next_cookie: AtomicU64,
}

impl LocalExporter {
    pub fn new(
        library: Arc<dyn TypeLibrary>,
        config: Arc<MarshalConfig>,
        stats: Arc<InteropStats>,
        layouts: Arc<LayoutCache>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<LocalExporter>| {
            let handle = Arc::new(ExporterHandle(this.clone()));
            Self {
                context: MarshalContext::from_parts(library, handle, config, stats, layouts),
                exports: DashMap::new(),
                next_cookie: AtomicU64::new(1),
            }
        })
    }

    /// Exports not yet claimed by an import
    pub fn pending(&self) -> usize {
        self.exports.len()
    }

    /// Withdraw an unclaimed export, releasing its stub
    pub fn revoke(&self, blob: &[u8]) -> Result<()> {
        let (cookie, _) = decode_blob(blob)?;
        let (_, stub) = self
            .exports
            .remove(&cookie)
            .ok_or(ErrorKind::UnknownExport { cookie })?;
        stub.release();
        Ok(())
    }
}

impl IdentityManager for LocalExporter {
    fn export(&self, object: &ObjectRef, iid: &Guid) -> Result<Vec<u8>> {
        let stub = self.context.create_stub(object, iid)?;
        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
        self.exports.insert(cookie, stub);
        trace!(iid = %iid, cookie, "exported object");
        Ok(encode_blob(cookie, iid))
    }

    fn import(&self, blob: &[u8], iid: &Guid) -> Result<ObjectRef> {
        let (cookie, exported) = decode_blob(blob)?;
        let (_, stub) = self
            .exports
            .remove(&cookie)
            .ok_or(ErrorKind::UnknownExport { cookie })?;
        if exported != *iid {
            debug!(requested = %iid, exported = %exported, "importing under exported identity");
        }

        let limit = self.context.config().limits.max_message_size;
        let channel = Arc::new(LoopbackChannel::new(stub, limit));
        let proxy = self.context.create_proxy(&exported, channel)?;
        Ok(proxy)
    }
}

impl Drop for LocalExporter {
    fn drop(&mut self) {
        for entry in self.exports.iter() {
            entry.value().release();
        }
    }
}

/// Non-owning identity handle given to the exporter's own stubs and proxies
struct ExporterHandle(Weak<LocalExporter>);

impl ExporterHandle {
    fn exporter(&self) -> Result<Arc<LocalExporter>> {
        self.0
            .upgrade()
            .ok_or_else(|| TransportError::Disconnected.into())
    }
}

impl IdentityManager for ExporterHandle {
    fn export(&self, object: &ObjectRef, iid: &Guid) -> Result<Vec<u8>> {
        self.exporter()?.export(object, iid)
    }

    fn import(&self, blob: &[u8], iid: &Guid) -> Result<ObjectRef> {
        self.exporter()?.import(blob, iid)
    }
}
