use crate::error::SynthError;
use std::net::Ipv4Addr;

/// Parses a dotted-quad IPv4 address into its 32-bit big-endian integer form
pub fn parse_ipv4(s: &str) -> Result<u32, SynthError> {
    let addr: Ipv4Addr = s
        .parse()
        .map_err(|_| SynthError::InvalidAddress(s.to_string()))?;
    Ok(addr.to_bits())
}

/// The addresses of the simulated servers, as a flat ascending list
#[derive(Clone, Debug)]
pub struct ServerPool {
    addresses: Vec<u32>,
}

impl ServerPool {
    /// Materializes every address in the inclusive range, regardless of the order of the bounds
    pub fn from_range(a: u32, b: u32) -> Self {
        let (start, end_inclusive) = if a <= b { (a, b) } else { (b, a) };
        Self {
            addresses: (start..=end_inclusive).collect(),
        }
    }

    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, address: u32) -> bool {
        self.addresses.binary_search(&address).is_ok()
    }
}

pub fn build_server_pool(from_addr: &str, to_addr: &str) -> Result<ServerPool, SynthError> {
    let start = parse_ipv4(from_addr)?;
    let end = parse_ipv4(to_addr)?;
    Ok(ServerPool::from_range(start, end))
}
