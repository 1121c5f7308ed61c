//! Argument list codec
//!
//! Walks a method's parameters in declaration order and hands each one that
//! moves in the current phase to the value codec.

use super::marshal::Codec;
use super::stream::{MarshalStream, MessageReader};
use super::value::Value;
use crate::errors::{ErrorKind, Result};
use crate::logging::trace;
use crate::status::HResult;
use crate::typelib::{Direction, Guid, MethodDesc};

/// Which half of a round trip is being encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Caller to callee: IN parameters
    In,
    /// Callee to caller: OUT parameters
    Out,
}

impl Phase {
    #[inline]
    pub const fn direction(self) -> Direction {
        match self {
            Self::In => Direction::IN,
            Self::Out => Direction::OUT,
        }
    }

    /// Whether `method` moves anything in this phase
    #[inline]
    pub fn applies_to(self, method: &MethodDesc) -> bool {
        method.phases.contains(self.direction())
    }
}

fn check_arity(method: &MethodDesc, args: &[Value]) -> Result<()> {
    if args.len() != method.params.len() {
        return Err(ErrorKind::ArgCountMismatch {
            expected: method.params.len(),
            got: args.len(),
        }
        .into());
    }
    Ok(())
}

/// Encode the parameters of `method` that move in `phase`
///
/// A carrier parameter is read even in a phase it does not move in, so the
/// parameter after it always sees the identity the caller asked for.
pub fn marshal_args(
    codec: &Codec<'_>,
    out: &mut MarshalStream,
    method: &MethodDesc,
    args: &[Value],
    phase: Phase,
) -> Result<()> {
    check_arity(method, args)?;
    let mut active: Option<Guid> = None;

    for (param, value) in method.params.iter().zip(args) {
        let carried = active.take();
        if param.direction.contains(phase.direction()) {
            codec.marshal(out, &param.ty, value, true, carried.as_ref())?;
        }
        if param.carrier {
            active = value.as_guid();
        }
    }

    trace!(method = %method.name, ?phase, bytes = out.len(), "marshaled arguments");
    Ok(())
}

/// Decode the parameters of `method` that move in `phase` into `args`
///
/// In the inbound phase, pure-out parameters get zeroed storage so the
/// callee has somewhere to write.
pub fn unmarshal_args(
    codec: &Codec<'_>,
    input: &mut MessageReader<'_>,
    method: &MethodDesc,
    args: &mut [Value],
    phase: Phase,
) -> Result<()> {
    check_arity(method, args)?;
    let mut active: Option<Guid> = None;

    for (param, slot) in method.params.iter().zip(args.iter_mut()) {
        let carried = active.take();
        if param.direction.contains(phase.direction()) {
            codec.unmarshal(input, &param.ty, slot, true, carried.as_ref())?;
        } else if phase == Phase::In && param.is_pure_out() {
            *slot = codec.allocate(&param.ty)?;
            if matches!(slot, Value::Ptr(None)) {
                if let Some(pointee) = param.ty.pointee() {
                    *slot = Value::ptr(codec.allocate(pointee)?);
                }
            }
        }
        if param.carrier {
            active = slot.as_guid();
        }
    }

    trace!(method = %method.name, ?phase, consumed = input.position(), "unmarshaled arguments");
    Ok(())
}

pub fn write_status(out: &mut MarshalStream, status: HResult) -> Result<()> {
    out.write_u32(status.bits())
}

pub fn read_status(input: &mut MessageReader<'_>) -> Result<HResult> {
    input.read_u32().map(HResult::from_bits)
}

/// Argument frame dump for `logging.dump_arguments`
pub fn dump_args(method: &MethodDesc, args: &[Value], phase: Phase) {
    for (param, value) in method.params.iter().zip(args) {
        if param.direction.contains(phase.direction()) {
            trace!(method = %method.name, param = %param.name, ?phase, value = ?value, "argument");
        }
    }
}
