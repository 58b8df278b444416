//! Fixed, versioned, little-endian wire records for reduction contributions.
//!
//! A contribution is one [`WireHdr`] followed by `count` [`WireScalar`]s. `f64`
//! values travel as their IEEE-754 bit patterns so they fold bit-exactly.

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use std::mem::size_of;

use crate::algs::reduction::ReduceOp;
use crate::dorfler_error::DorflerError;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Element type of a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    F64 = 1,
    U64 = 2,
}

impl ScalarKind {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ScalarKind::F64),
            2 => Some(ScalarKind::U64),
            _ => None,
        }
    }
}

/// All multi-byte integers in these structs are **little-endian** on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub op_le: u16,
    pub reserved_le: u16,
    pub count_le: u32,
    pub reserved2_le: u32,
}

impl WireHdr {
    pub fn new(kind: ScalarKind, op: ReduceOp, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: (kind as u16).to_le(),
            op_le: op.code().to_le(),
            reserved_le: 0,
            count_le: (count as u32).to_le(),
            reserved2_le: 0,
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> Option<ScalarKind> {
        ScalarKind::from_code(u16::from_le(self.kind_le))
    }
    pub fn op(&self) -> Option<ReduceOp> {
        ReduceOp::from_code(u16::from_le(self.op_le))
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// One 64-bit scalar carried on the wire.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireScalar {
    pub bits_le: u64,
}

impl WireScalar {
    pub fn of(bits: u64) -> Self {
        Self {
            bits_le: bits.to_le(),
        }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.bits_le)
    }
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), DorflerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(DorflerError::Communication(format!(
            "expected {expected} bytes, got {actual}"
        )))
    }
}

fn encode_bits(kind: ScalarKind, op: ReduceOp, bits: impl ExactSizeIterator<Item = u64>) -> Bytes {
    let hdr = WireHdr::new(kind, op, bits.len());
    let mut buf = Vec::with_capacity(size_of::<WireHdr>() + bits.len() * size_of::<WireScalar>());
    buf.extend_from_slice(bytemuck::bytes_of(&hdr));
    for b in bits {
        buf.extend_from_slice(bytemuck::bytes_of(&WireScalar::of(b)));
    }
    Bytes::from(buf)
}

pub fn encode_f64(op: ReduceOp, values: &[f64]) -> Bytes {
    encode_bits(ScalarKind::F64, op, values.iter().map(|v| v.to_bits()))
}

pub fn encode_u64(op: ReduceOp, values: &[u64]) -> Bytes {
    encode_bits(ScalarKind::U64, op, values.iter().copied())
}

/// Decode a contribution into its header and raw 64-bit scalars.
///
/// Buffers are not assumed to be aligned.
pub fn decode(buf: &[u8]) -> Result<(WireHdr, Vec<u64>), DorflerError> {
    let hdr_len = size_of::<WireHdr>();
    if buf.len() < hdr_len {
        return Err(DorflerError::Communication(format!(
            "truncated header: {} bytes",
            buf.len()
        )));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&buf[..hdr_len]);
    if hdr.version() != WIRE_VERSION {
        return Err(DorflerError::Communication(format!(
            "wire version {} != {}",
            hdr.version(),
            WIRE_VERSION
        )));
    }
    let body = &buf[hdr_len..];
    expect_exact_len(body.len(), hdr.count() * size_of::<WireScalar>())?;
    let scalars = body
        .chunks_exact(size_of::<WireScalar>())
        .map(|c| bytemuck::pod_read_unaligned::<WireScalar>(c).get())
        .collect();
    Ok((hdr, scalars))
}
