//! Marshaling context: the collaborators every proxy and stub shares

use crate::channel::{Channel, LoopbackChannel, ThreadedChannel};
use crate::config::MarshalConfig;
use crate::errors::Result;
use crate::identity::{IdentityManager, LocalExporter};
use crate::interop::{Codec, MarshalStream};
use crate::object::ObjectRef;
use crate::proxy::{LayoutCache, Proxy};
use crate::stats::{InteropStats, StatsSnapshot};
use crate::stub::Stub;
use crate::typelib::{Guid, TypeLibrary};
use std::sync::Arc;

/// Entry point for creating proxies and stubs
///
/// Cloning is cheap; clones share the type library, identity substrate,
/// configuration, statistics and the proxy layout cache.
#[derive(Clone)]
pub struct MarshalContext {
    library: Arc<dyn TypeLibrary>,
    identity: Arc<dyn IdentityManager>,
    config: Arc<MarshalConfig>,
    stats: Arc<InteropStats>,
    layouts: Arc<LayoutCache>,
}

impl MarshalContext {
    /// Context over a host-supplied identity substrate
    pub fn new(
        library: Arc<dyn TypeLibrary>,
        identity: Arc<dyn IdentityManager>,
        config: MarshalConfig,
    ) -> Self {
        Self::from_parts(
            library,
            identity,
            Arc::new(config),
            Arc::new(InteropStats::new()),
            Arc::new(LayoutCache::new()),
        )
    }

    /// In-process context: references travel as [`LocalExporter`] cookies
    pub fn local(library: Arc<dyn TypeLibrary>, config: MarshalConfig) -> Self {
        let config = Arc::new(config);
        let stats = Arc::new(InteropStats::new());
        let layouts = Arc::new(LayoutCache::new());
        let exporter = LocalExporter::new(
            Arc::clone(&library),
            Arc::clone(&config),
            Arc::clone(&stats),
            Arc::clone(&layouts),
        );
        Self::from_parts(library, exporter, config, stats, layouts)
    }

    pub(crate) fn from_parts(
        library: Arc<dyn TypeLibrary>,
        identity: Arc<dyn IdentityManager>,
        config: Arc<MarshalConfig>,
        stats: Arc<InteropStats>,
        layouts: Arc<LayoutCache>,
    ) -> Self {
        Self { library, identity, config, stats, layouts }
    }

    #[inline]
    pub fn library(&self) -> &dyn TypeLibrary {
        self.library.as_ref()
    }

    #[inline]
    pub fn identity(&self) -> &dyn IdentityManager {
        self.identity.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &InteropStats {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[inline]
    pub(crate) fn layouts(&self) -> &LayoutCache {
        &self.layouts
    }

    #[inline]
    pub(crate) fn dump_arguments(&self) -> bool {
        self.config.logging.dump_arguments
    }

    #[inline]
    pub(crate) fn max_ancestor_depth(&self) -> usize {
        self.config.limits.max_ancestor_depth
    }

    pub fn codec(&self) -> Codec<'_> {
        Codec::new(self.library(), self.identity())
    }

    /// Empty stream bounded by `limits.max_message_size`
    pub fn stream(&self) -> MarshalStream {
        MarshalStream::new(self.config.limits.max_message_size)
    }

    /// Server side: a stub holding `object` as `iid`
    pub fn create_stub(&self, object: &ObjectRef, iid: &Guid) -> Result<Arc<Stub>> {
        Stub::new(self.clone(), object, iid).map(Arc::new)
    }

    /// Client side: a proxy for `iid` whose calls travel over `channel`
    pub fn create_proxy(&self, iid: &Guid, channel: Arc<dyn Channel>) -> Result<Arc<Proxy>> {
        Proxy::new(self.clone(), iid, channel).map(Arc::new)
    }

    /// Stub and proxy joined by a loopback channel
    pub fn connect(&self, object: &ObjectRef, iid: &Guid) -> Result<Arc<Proxy>> {
        let stub = self.create_stub(object, iid)?;
        let channel = LoopbackChannel::new(stub, self.config.limits.max_message_size);
        self.create_proxy(iid, Arc::new(channel))
    }

    /// Stub served from its own thread, reached through the returned proxy
    pub fn connect_threaded(&self, object: &ObjectRef, iid: &Guid) -> Result<Arc<Proxy>> {
        let stub = self.create_stub(object, iid)?;
        let channel = ThreadedChannel::spawn(stub, self.config.limits.max_message_size)?;
        self.create_proxy(iid, Arc::new(channel))
    }
}
