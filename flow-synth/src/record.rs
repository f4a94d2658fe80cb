use crate::error::SynthError;
use fastrand::Rng;
use serde::{Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Length of a flow record in its binary form
pub const RECORD_LEN: usize = 75;

const TIMESTAMP_LEN: usize = 6;
const MAX_TIMESTAMP: u64 = (1 << (TIMESTAMP_LEN * 8)) - 1;

/// Identifies the system that exported a flow, as 32 lowercase hex characters
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SystemId([u8; 32]);

impl SystemId {
    /// Hex-encodes a 16-byte identifier
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut hex = [0; 32];
        Uuid::from_bytes(bytes).simple().encode_lower(&mut hex);
        Self(hex)
    }

    /// Generates a fresh random (v4) identifier out of the provided RNG
    pub fn generate(rng: &mut Rng) -> Self {
        let mut bytes = [0; 16];
        rng.fill(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Self::from_bytes(uuid.into_bytes())
    }

    /// The ASCII hex representation, as it is written to the binary layout
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only ever constructed from ASCII hex digits
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    fn from_ascii(ascii: [u8; 32]) -> Result<Self, SynthError> {
        if ascii.iter().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(ascii.map(|b| b.to_ascii_lowercase())))
        } else {
            Err(SynthError::InvalidSystemId)
        }
    }
}

impl FromStr for SystemId {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ascii: [u8; 32] = s
            .as_bytes()
            .try_into()
            .map_err(|_| SynthError::InvalidSystemId)?;
        Self::from_ascii(ascii)
    }
}

impl Display for SystemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for SystemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemId({})", self.as_str())
    }
}

impl Serialize for SystemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A unidirectional flow observation, modelled after NetFlow v5
///
/// The field order is the column order of the CSV output
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    /// Time at which the flow is exported, in milliseconds
    pub timestamp: u64,
    pub system_id: SystemId,
    pub srcaddr: u32,
    pub dstaddr: u32,
    pub nexthop: u32,
    #[serde(rename = "dPkts")]
    pub packets: u32,
    #[serde(rename = "dOctets")]
    pub octets: u32,
    /// Start of the flow, in milliseconds
    pub first: u64,
    /// End of the flow, in milliseconds
    pub last: u64,
    pub srcport: u16,
    pub dstport: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub input: u16,
    pub output: u16,
}

impl FlowRecord {
    pub fn encode(&self, out: &mut [u8; RECORD_LEN]) -> Result<(), SynthError> {
        BinaryFlowRecord::from(self).encode(out)
    }
}

/// The fields of a [`FlowRecord`] that make it into the binary layout (`first` and `last` are
/// not part of it)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryFlowRecord {
    pub timestamp: u64,
    pub system_id: SystemId,
    pub srcaddr: u32,
    pub dstaddr: u32,
    pub nexthop: u32,
    pub packets: u32,
    pub octets: u32,
    pub srcport: u16,
    pub dstport: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
    pub input: u16,
    pub output: u16,
}

impl From<&FlowRecord> for BinaryFlowRecord {
    fn from(r: &FlowRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            system_id: r.system_id,
            srcaddr: r.srcaddr,
            dstaddr: r.dstaddr,
            nexthop: r.nexthop,
            packets: r.packets,
            octets: r.octets,
            srcport: r.srcport,
            dstport: r.dstport,
            tcp_flags: r.tcp_flags,
            protocol: r.protocol,
            tos: r.tos,
            src_as: r.src_as,
            dst_as: r.dst_as,
            src_mask: r.src_mask,
            dst_mask: r.dst_mask,
            input: r.input,
            output: r.output,
        }
    }
}

impl BinaryFlowRecord {
    /// Writes the record in big-endian order
    pub fn encode(&self, out: &mut [u8; RECORD_LEN]) -> Result<(), SynthError> {
        if self.timestamp > MAX_TIMESTAMP {
            return Err(SynthError::TimestampOverflow(self.timestamp));
        }

        let mut w = FieldWriter { buf: out, pos: 0 };
        w.put(&self.timestamp.to_be_bytes()[8 - TIMESTAMP_LEN..]);
        w.put(self.system_id.as_bytes());
        w.put(&self.srcaddr.to_be_bytes());
        w.put(&self.dstaddr.to_be_bytes());
        w.put(&self.nexthop.to_be_bytes());
        w.put(&self.packets.to_be_bytes());
        w.put(&self.octets.to_be_bytes());
        w.put(&self.srcport.to_be_bytes());
        w.put(&self.dstport.to_be_bytes());
        w.put(&[self.tcp_flags, self.protocol, self.tos]);
        w.put(&self.src_as.to_be_bytes());
        w.put(&self.dst_as.to_be_bytes());
        w.put(&[self.src_mask, self.dst_mask]);
        w.put(&self.input.to_be_bytes());
        w.put(&self.output.to_be_bytes());
        debug_assert_eq!(w.pos, RECORD_LEN);

        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SynthError> {
        let bytes: &[u8; RECORD_LEN] = bytes.try_into().map_err(|_| SynthError::TruncatedRecord {
            expected: RECORD_LEN,
            actual: bytes.len(),
        })?;

        let mut r = FieldReader { buf: bytes, pos: 0 };
        let mut timestamp = [0; 8];
        timestamp[8 - TIMESTAMP_LEN..].copy_from_slice(&r.take::<TIMESTAMP_LEN>());

        Ok(Self {
            timestamp: u64::from_be_bytes(timestamp),
            system_id: SystemId::from_ascii(r.take())?,
            srcaddr: u32::from_be_bytes(r.take()),
            dstaddr: u32::from_be_bytes(r.take()),
            nexthop: u32::from_be_bytes(r.take()),
            packets: u32::from_be_bytes(r.take()),
            octets: u32::from_be_bytes(r.take()),
            srcport: u16::from_be_bytes(r.take()),
            dstport: u16::from_be_bytes(r.take()),
            tcp_flags: r.take::<1>()[0],
            protocol: r.take::<1>()[0],
            tos: r.take::<1>()[0],
            src_as: u16::from_be_bytes(r.take()),
            dst_as: u16::from_be_bytes(r.take()),
            src_mask: r.take::<1>()[0],
            dst_mask: r.take::<1>()[0],
            input: u16::from_be_bytes(r.take()),
            output: u16::from_be_bytes(r.take()),
        })
    }
}

struct FieldWriter<'a> {
    buf: &'a mut [u8; RECORD_LEN],
    pos: usize,
}

impl FieldWriter<'_> {
    fn put(&mut self, field: &[u8]) {
        self.buf[self.pos..self.pos + field.len()].copy_from_slice(field);
        self.pos += field.len();
    }
}

struct FieldReader<'a> {
    buf: &'a [u8; RECORD_LEN],
    pos: usize,
}

impl FieldReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut field = [0; N];
        field.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        field
    }
}
