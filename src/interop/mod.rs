//! Interop - typed values on and off the wire
//!
//! Design: every value is moved by walking its type descriptor; nothing is
//! known about an interface at compile time.
//!
//! Architecture:
//! - `value.rs` - argument values (Value)
//! - `size.rs` - type descriptor evaluator (size_of)
//! - `stream.rs` - selectors, wire messages, bounded streams
//! - `marshal.rs` - value codec (marshal, unmarshal, allocate, cleanup)
//! - `args.rs` - argument list codec and status words
//! - `call.rs` - flat-frame call shim
//! - `abi.rs` - calling conventions

mod abi;
mod args;
mod call;
mod marshal;
mod size;
mod stream;
mod value;

pub use abi::CallingConvention;
pub use args::{dump_args, marshal_args, read_status, unmarshal_args, write_status, Phase};
pub use call::FunctionCall;
pub use marshal::Codec;
pub use size::{resolve_user_type, size_of, POINTER_SIZE, VARIANT_SIZE};
pub use stream::{MarshalStream, MessageReader, Selector, WireMessage};
pub use value::Value;
