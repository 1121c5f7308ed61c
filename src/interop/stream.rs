//! Wire messages and the byte streams that build and read them
//!
//! All multi-byte fields are little-endian. Growth of an outbound stream is
//! explicit and checked against a size limit.

use crate::errors::{ErrorKind, Result};
use std::fmt;

/// Method selector: local ordinal in the low 16 bits, ancestor depth in the high 16
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector(u32);

impl Selector {
    /// Reserved selector for the identity-query meta-operation
    pub const QUERY_INTERFACE: Selector = Selector(u32::MAX);

    #[inline]
    pub const fn new(depth: u16, ordinal: u16) -> Self {
        Self(((depth as u32) << 16) | ordinal as u32)
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn depth(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn ordinal(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn is_query_interface(self) -> bool {
        self.0 == Self::QUERY_INTERFACE.0
    }

    /// Same method seen from an interface one level further down the chain
    #[inline]
    pub const fn deeper(self) -> Option<Self> {
        match self.depth().checked_add(1) {
            Some(depth) => Some(Self::new(depth, self.ordinal())),
            None => None,
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_query_interface() {
            write!(f, "Selector(QueryInterface)")
        } else {
            write!(f, "Selector({}:{})", self.depth(), self.ordinal())
        }
    }
}

/// One call or reply envelope, consumed by a single send or receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub selector: Selector,
    pub data: Vec<u8>,
}

impl WireMessage {
    pub fn new(selector: Selector, data: Vec<u8>) -> Self {
        Self { selector, data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Full frame: selector followed by the payload
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + self.data.len());
        frame.extend_from_slice(&self.selector.raw().to_le_bytes());
        frame.extend_from_slice(&self.data);
        frame
    }
}

/// Bounded, growable outbound buffer
#[derive(Debug)]
pub struct MarshalStream {
    buf: Vec<u8>,
    limit: usize,
}

impl MarshalStream {
    pub fn new(limit: usize) -> Self {
        Self { buf: Vec::new(), limit }
    }

    /// Grow capacity for `additional` bytes, failing past the limit or on OOM
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let size = self.buf.len().saturating_add(additional);
        if size > self.limit {
            return Err(ErrorKind::MessageTooLarge { size, limit: self.limit }.into());
        }
        self.buf
            .try_reserve(additional)
            .map_err(|_| ErrorKind::OutOfMemory { requested: additional }.into())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Length prefix for a payload of `len` units
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| ErrorKind::MessageTooLarge { size: len, limit: u32::MAX as usize })?;
        self.write_u32(len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over an inbound payload
#[derive(Debug)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if len > available {
            return Err(ErrorKind::Truncated { needed: len, available }.into());
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ErrorKind::TrailingData { remaining }.into()),
        }
    }
}
