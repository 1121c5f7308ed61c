//! Interface, method and parameter descriptors

use super::types::{Guid, TypeDesc};
use crate::interop::CallingConvention;
use bitflags::bitflags;

/// Parameter name that, by convention, carries the identity of the
/// interface reference passed in the next parameter.
pub const IDENTITY_CARRIER_NAME: &str = "riid";

bitflags! {
    /// Direction a parameter travels in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Direction: u8 {
        const IN = 1 << 0;
        const OUT = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDesc {
    pub name: String,
    pub ty: TypeDesc,
    pub direction: Direction,
    /// Value supplies the identity for the following interface parameter
    pub carrier: bool,
}

impl ParamDesc {
    pub fn new(name: impl Into<String>, ty: TypeDesc, direction: Direction) -> Self {
        let name = name.into();
        let carrier = name == IDENTITY_CARRIER_NAME;
        Self { name, ty, direction, carrier }
    }

    pub fn input(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, ty, Direction::IN)
    }

    pub fn output(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, ty, Direction::OUT)
    }

    pub fn in_out(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self::new(name, ty, Direction::IN | Direction::OUT)
    }

    pub fn with_carrier(mut self, carrier: bool) -> Self {
        self.carrier = carrier;
        self
    }

    /// Out parameter with no inbound value
    #[inline]
    pub fn is_pure_out(&self) -> bool {
        self.direction == Direction::OUT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDesc {
    pub name: String,
    /// Position within the declaring interface
    pub ordinal: u16,
    pub params: Vec<ParamDesc>,
    pub convention: CallingConvention,
    /// Union of parameter directions: which phases move anything at all
    pub phases: Direction,
}

impl MethodDesc {
    pub fn new(name: impl Into<String>, ordinal: u16, params: Vec<ParamDesc>) -> Self {
        let phases = params
            .iter()
            .fold(Direction::empty(), |acc, p| acc | p.direction);

        Self {
            name: name.into(),
            ordinal,
            params,
            convention: CallingConvention::default(),
            phases,
        }
    }

    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }

    #[inline]
    pub fn has_out_params(&self) -> bool {
        self.phases.contains(Direction::OUT)
    }
}

/// How an interface is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// Pure vtable interface
    Interface,
    /// Dispatch interface with a vtable ("custom") twin
    Dual,
    /// Late-bound only
    Dispatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDesc {
    pub iid: Guid,
    pub name: String,
    pub kind: InterfaceKind,
    pub ancestor: Option<Guid>,
    /// Methods declared directly on this interface
    pub methods: Vec<MethodDesc>,
}

impl InterfaceDesc {
    pub fn new(iid: Guid, name: impl Into<String>) -> Self {
        Self {
            iid,
            name: name.into(),
            kind: InterfaceKind::Interface,
            ancestor: None,
            methods: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: InterfaceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn extends(mut self, ancestor: Guid) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Append a method; its ordinal is its declaration position
    pub fn method(mut self, name: impl Into<String>, params: Vec<ParamDesc>) -> Self {
        let ordinal = self.methods.len() as u16;
        self.methods.push(MethodDesc::new(name, ordinal, params));
        self
    }

    pub fn with_method(mut self, method: MethodDesc) -> Self {
        self.methods.push(method);
        self
    }

    #[inline]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// Resolution of a [`TypeDesc::UserDefined`] reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserType {
    Record { name: String, size: u32 },
    Enum { name: String, size: u32 },
    Interface { name: String, iid: Guid },
    Alias { name: String, target: TypeDesc },
}

impl UserType {
    pub fn name(&self) -> &str {
        match self {
            Self::Record { name, .. }
            | Self::Enum { name, .. }
            | Self::Interface { name, .. }
            | Self::Alias { name, .. } => name,
        }
    }
}
