//! Type-library driven interface marshaling
//!
//! Given only run-time descriptions of interfaces, this crate encodes method
//! calls into self-describing messages, replays them against real objects
//! ([`Stub`]) and synthesizes callable stand-ins ([`Proxy`]) whose dispatch
//! tables turn ordinary calls into round trips over a [`Channel`].

// Descriptors and values
pub mod typelib;
pub mod interop;
pub mod status;
pub mod errors;

// Objects and the identity substrate
pub mod object;
pub mod refcount;
pub mod identity;

// Call machinery
pub mod resolver;
pub mod channel;
pub mod stub;
pub mod proxy;
pub mod context;

// Ambient
pub mod config;
pub mod logging;
pub mod stats;

// Re-export commonly used items
pub use channel::{Channel, LoopbackChannel, ThreadedChannel, TransportError};
pub use config::MarshalConfig;
pub use context::MarshalContext;
pub use errors::{ErrorCategory, ErrorKind, MarshalError, Result};
pub use identity::{IdentityManager, LocalExporter};
pub use interop::{CallingConvention, Selector, Value, WireMessage};
pub use object::{LocalObject, MethodFn, ObjectRef, Unknown, VTable, IDENTITY_SLOTS};
pub use proxy::{Proxy, ProxyLayout};
pub use stats::{InteropStats, StatsSnapshot};
pub use status::HResult;
pub use stub::Stub;
pub use typelib::{
    Direction, Guid, InterfaceDesc, InterfaceKind, MemoryTypeLibrary, MethodDesc, ParamDesc,
    TypeDesc, TypeLibrary, TypeRef, UserType, IID_IDISPATCH, IID_IUNKNOWN,
};
