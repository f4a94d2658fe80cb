//! Simulated internet routing table
//!
//! The table is built from a cleaned ASN/IP-range dataset: a random subset of the ASNs is selected
//! and each of them is reachable through one of a handful of peering interfaces

use crate::error::SynthError;
use fastrand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// The smallest range we consider routable (one /24, minus network and broadcast addresses)
const MIN_ROUTABLE_RANGE: u32 = 254;
const MIN_SUBNET_BITS: u8 = 8;
const MAX_SUBNET_BITS: u8 = 24;

/// An interface through which traffic leaves or enters the simulated network
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NetworkInterface {
    pub ifindex: u16,
    pub next_hop: Ipv4Addr,
}

impl NetworkInterface {
    pub const fn new(ifindex: u16, next_hop: Ipv4Addr) -> Self {
        Self { ifindex, next_hop }
    }

    pub fn next_hop_bits(&self) -> u32 {
        self.next_hop.to_bits()
    }

    pub fn next_hop_octets(&self) -> [u8; 4] {
        self.next_hop.octets()
    }
}

impl Display for NetworkInterface {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "if{} via {}", self.ifindex, self.next_hop)
    }
}

pub const DEFAULT_PEERING_INTERFACES: [NetworkInterface; 5] = [
    NetworkInterface::new(10, Ipv4Addr::new(10, 0, 10, 2)),
    NetworkInterface::new(11, Ipv4Addr::new(10, 0, 20, 2)),
    NetworkInterface::new(12, Ipv4Addr::new(10, 0, 30, 2)),
    NetworkInterface::new(13, Ipv4Addr::new(10, 0, 40, 2)),
    NetworkInterface::new(14, Ipv4Addr::new(10, 0, 0, 2)),
];

/// The network hosting the simulated servers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InternalNetwork {
    pub asn: u16,
    pub subnet_bits: u8,
    pub interface: NetworkInterface,
}

impl Default for InternalNetwork {
    fn default() -> Self {
        Self {
            asn: 65000,
            subnet_bits: 24,
            interface: NetworkInterface::new(100, Ipv4Addr::new(10, 1, 1, 2)),
        }
    }
}

/// A row of the ip2asn dataset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnRow {
    pub range_start: u32,
    pub range_end: u32,
    pub asn: u32,
    pub country: String,
    pub description: String,
}

impl AsnRow {
    /// Returns the reason this row cannot be part of the simulated internet, if any
    pub fn unroutable_reason(&self) -> Option<&'static str> {
        if self.description == "Not routed" {
            Some("not routed")
        } else if self.description == "-Reserved AS-" {
            Some("reserved AS")
        } else if self.description.starts_with("DNIC-") {
            Some("DNIC AS")
        } else if self.asn > u16::MAX as u32 {
            Some("private AS")
        } else if self.asn == 0 {
            Some("AS 0")
        } else if self
            .range_end
            .checked_sub(self.range_start)
            .is_none_or(|width| width < MIN_ROUTABLE_RANGE)
        {
            Some("non routable range")
        } else {
            None
        }
    }
}

/// A cleaned ASN table, containing only routable rows
#[derive(Clone, Debug, Default)]
pub struct AsnTable {
    rows: Vec<AsnRow>,
}

impl AsnTable {
    /// Keeps only the routable rows
    pub fn clean(mut rows: Vec<AsnRow>) -> Self {
        let total = rows.len();
        rows.retain(|row| match row.unroutable_reason() {
            Some(reason) => {
                debug!("Dropping ASN {} - {reason}", row.asn);
                false
            }
            None => true,
        });

        info!(
            "Filter dropped {} of {total} routes, {} routes remaining",
            total - rows.len(),
            rows.len()
        );

        Self { rows }
    }

    /// Reads tab-separated rows (`range_start, range_end, asn, country, description`) and cleans
    /// them
    pub fn from_reader(reader: impl io::Read) -> Result<Self, SynthError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (i, row) in reader.deserialize::<AsnRow>().enumerate() {
            let row = row.map_err(|e| SynthError::MalformedAsnRow {
                row: i + 1,
                reason: e.to_string(),
            })?;
            rows.push(row);
        }

        Ok(Self::clean(rows))
    }

    /// Writes the table in the same tab-separated format it is read from
    pub fn write_to(&self, writer: impl io::Write) -> Result<(), SynthError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(writer);
        for row in &self.rows {
            writer.serialize(row)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn rows(&self) -> &[AsnRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A routed network block selected from the ASN table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsnBlock {
    pub subnet_bits: u8,
    pub network_address: u32,
    pub broadcast_address: u32,
    /// First usable address (inclusive)
    pub ip_range_start: u32,
    /// Last usable address (exclusive when picking clients)
    pub ip_range_end: u32,
    pub asn: u16,
    pub country: String,
    pub description: String,
}

impl AsnBlock {
    fn from_row(row: &AsnRow) -> Self {
        Self {
            subnet_bits: subnet_bits_for_range(row.range_end - row.range_start),
            network_address: row.range_start,
            broadcast_address: row.range_end,
            ip_range_start: row.range_start + 2,
            ip_range_end: row.range_end - 1,
            asn: row.asn as u16,
            country: row.country.clone(),
            description: row.description.clone(),
        }
    }
}

/// Largest `s` in 8..=24 such that `2^s` does not exceed the size of the range
pub fn subnet_bits_for_range(range_size: u32) -> u8 {
    if range_size == 0 {
        return MIN_SUBNET_BITS;
    }

    let floor_log2 = (u32::BITS - 1 - range_size.leading_zeros()) as u8;
    floor_log2.clamp(MIN_SUBNET_BITS, MAX_SUBNET_BITS)
}

/// Selects `asns_to_select` distinct ASNs at random, without replacement
///
/// The table itself is left untouched
pub fn select_random_asns(
    table: &AsnTable,
    asns_to_select: usize,
    rng: &mut Rng,
) -> Result<BTreeMap<u16, AsnBlock>, SynthError> {
    if asns_to_select > table.len() {
        return Err(SynthError::NotEnoughAsns {
            requested: asns_to_select,
            available: table.len(),
        });
    }

    let mut remaining: Vec<usize> = (0..table.len()).collect();
    let mut selected = BTreeMap::new();
    while selected.len() < asns_to_select {
        if remaining.is_empty() {
            return Err(SynthError::NotEnoughDistinctAsns {
                requested: asns_to_select,
                found: selected.len(),
            });
        }

        let row = &table.rows[remaining.swap_remove(rng.usize(..remaining.len()))];
        let block = AsnBlock::from_row(row);
        if selected.contains_key(&block.asn) {
            continue;
        }

        debug!(
            "Selected route {} of {asns_to_select} for ASN {}",
            selected.len() + 1,
            block.asn
        );
        selected.insert(block.asn, block);
    }

    Ok(selected)
}

/// A routed network together with the peering interface it is reachable through
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsnRoute {
    pub block: AsnBlock,
    pub peering: NetworkInterface,
}

impl AsnRoute {
    pub fn asn(&self) -> u16 {
        self.block.asn
    }

    pub fn next_hop(&self) -> u32 {
        self.peering.next_hop_bits()
    }

    pub fn ifindex(&self) -> u16 {
        self.peering.ifindex
    }
}

/// The routes to every simulated client network, sorted by ASN
#[derive(Clone, Debug)]
pub struct RouteTable {
    routes: Vec<AsnRoute>,
}

impl RouteTable {
    pub fn get(&self, asn: u16) -> Option<&AsnRoute> {
        self.routes
            .binary_search_by_key(&asn, |r| r.asn())
            .ok()
            .map(|i| &self.routes[i])
    }

    pub fn routes(&self) -> &[AsnRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Assigns a random peering interface to each of the selected ASNs
pub fn build_route_table(
    asns: BTreeMap<u16, AsnBlock>,
    peering_interfaces: &[NetworkInterface],
    rng: &mut Rng,
) -> Result<RouteTable, SynthError> {
    if peering_interfaces.is_empty() {
        return Err(SynthError::NoPeeringInterfaces);
    }

    let routes = asns
        .into_values()
        .map(|block| AsnRoute {
            block,
            peering: peering_interfaces[rng.usize(..peering_interfaces.len())],
        })
        .collect();

    Ok(RouteTable { routes })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn row(range_start: u32, range_end: u32, asn: u32, description: &str) -> AsnRow {
        AsnRow {
            range_start,
            range_end,
            asn,
            country: "NL".to_string(),
            description: description.to_string(),
        }
    }

    pub(crate) fn sample_table(rows: usize) -> AsnTable {
        let rows = (0..rows as u32)
            .map(|i| {
                let start = 0x0100_0000 + i * 0x1_0000;
                row(start, start + 0xffff, 100 + i, "EXAMPLE-AS")
            })
            .collect();
        AsnTable::clean(rows)
    }

    #[test]
    fn test_clean_drops_unroutable_rows() {
        let rows = vec![
            row(0, 0xffff, 1, "Not routed"),
            row(0, 0xffff, 2, "-Reserved AS-"),
            row(0, 0xffff, 3, "DNIC-ASBLK-00001"),
            row(0, 0xffff, 70000, "PRIVATE"),
            row(0, 0xffff, 0, "ZERO"),
            row(0, 200, 4, "TOO-SMALL"),
            row(0, 254, 5, "SMALLEST-ROUTABLE"),
            row(0, 0xffff, 65535, "LARGEST-ASN"),
            row(u32::MAX - 1, u32::MAX, 6, "TOP-OF-RANGE"),
            row(0xffff, 0, 7, "INVERTED"),
            row(u32::MAX - 254, u32::MAX, 8, "TOP-ROUTABLE"),
        ];

        let table = AsnTable::clean(rows);
        let asns: Vec<_> = table.rows().iter().map(|r| r.asn).collect();
        assert_eq!(asns, vec![5, 65535, 8]);
    }

    #[test]
    fn test_select_block_at_top_of_address_space() {
        let table = AsnTable::clean(vec![
            row(u32::MAX - 1, u32::MAX, 6, "TOP-OF-RANGE"),
            row(u32::MAX - 254, u32::MAX, 8, "TOP-ROUTABLE"),
        ]);
        assert_eq!(table.len(), 1);

        let selected = select_random_asns(&table, 1, &mut Rng::with_seed(42)).unwrap();
        let block = &selected[&8];
        assert_eq!(block.ip_range_start, u32::MAX - 252);
        assert_eq!(block.ip_range_end, u32::MAX - 1);
        assert!(block.ip_range_start < block.ip_range_end);
    }

    #[test]
    fn test_table_from_reader() {
        let tsv = "16777216\t16777471\t13335\tUS\tCLOUDFLARENET\n\
                   16777472\t16778239\t0\tNone\tNot routed\n\
                   16778240\t16779263\t38803\tAU\tWPL-AS-AP Wirefreebroadband Pty Ltd\n";
        let table = AsnTable::from_reader(tsv.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].asn, 13335);
        assert_eq!(
            table.rows()[1].description,
            "WPL-AS-AP Wirefreebroadband Pty Ltd"
        );
    }

    #[test]
    fn test_table_from_reader_malformed_row() {
        let tsv = "16777216\t16777471\t13335\tUS\tCLOUDFLARENET\n\
                   not-a-number\t16778239\t38803\tAU\tWPL\n";
        let err = AsnTable::from_reader(tsv.as_bytes()).unwrap_err();
        assert!(matches!(err, SynthError::MalformedAsnRow { row: 2, .. }), "{err}");
    }

    #[test]
    fn test_table_write_and_read_back() {
        let table = sample_table(3);
        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();

        let read_back = AsnTable::from_reader(out.as_slice()).unwrap();
        assert_eq!(read_back.rows(), table.rows());
    }

    #[test]
    fn test_subnet_bits_for_range() {
        let cases = [
            (0, 8),
            (254, 8),
            (255, 8),
            (256, 8),
            (511, 8),
            (512, 9),
            (0xffff, 15),
            (0x1_0000, 16),
            (1 << 24, 24),
            (u32::MAX, 24),
        ];
        for (range, expected) in cases {
            assert_eq!(subnet_bits_for_range(range), expected, "range {range}");
        }
    }

    #[test]
    fn test_select_random_asns() {
        let table = sample_table(20);
        let mut rng = Rng::with_seed(42);
        let selected = select_random_asns(&table, 5, &mut rng).unwrap();

        assert_eq!(selected.len(), 5);
        for (asn, block) in &selected {
            assert_eq!(*asn, block.asn);
            assert_eq!(block.ip_range_start, block.network_address + 2);
            assert_eq!(block.ip_range_end, block.broadcast_address - 1);
            assert!(block.ip_range_start < block.ip_range_end);
            assert_eq!(block.subnet_bits, 15);
        }

        // The input table is not consumed
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn test_select_all_asns() {
        let table = sample_table(10);
        let selected = select_random_asns(&table, 10, &mut Rng::with_seed(1)).unwrap();
        let asns: Vec<_> = selected.keys().copied().collect();
        assert_eq!(asns, (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn test_select_too_many_asns() {
        let table = sample_table(3);
        let before = table.rows().to_vec();

        let err = select_random_asns(&table, 4, &mut Rng::with_seed(42)).unwrap_err();
        assert!(matches!(
            err,
            SynthError::NotEnoughAsns {
                requested: 4,
                available: 3
            }
        ));
        assert!(err.is_configuration());
        assert_eq!(table.rows(), before.as_slice());
    }

    #[test]
    fn test_select_with_duplicate_asns() {
        let table = AsnTable::clean(vec![
            row(0, 0xffff, 7, "A"),
            row(0x1_0000, 0x1_ffff, 7, "A"),
            row(0x2_0000, 0x2_ffff, 8, "B"),
        ]);

        let selected = select_random_asns(&table, 2, &mut Rng::with_seed(3)).unwrap();
        assert_eq!(selected.keys().copied().collect::<Vec<_>>(), vec![7, 8]);

        let err = select_random_asns(&table, 3, &mut Rng::with_seed(3)).unwrap_err();
        assert!(matches!(
            err,
            SynthError::NotEnoughDistinctAsns {
                requested: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn test_build_route_table() {
        let table = sample_table(50);
        let mut rng = Rng::with_seed(42);
        let asns = select_random_asns(&table, 50, &mut rng).unwrap();
        let routes = build_route_table(asns, &DEFAULT_PEERING_INTERFACES, &mut rng).unwrap();

        assert_eq!(routes.len(), 50);
        for route in routes.routes() {
            // Next hop and interface index always come from the same peering interface
            let interface = DEFAULT_PEERING_INTERFACES
                .iter()
                .find(|i| i.ifindex == route.ifindex())
                .unwrap();
            assert_eq!(interface.next_hop_bits(), route.next_hop());
            assert_eq!(routes.get(route.asn()), Some(route));
        }

        // With 50 routes and 5 interfaces, more than one interface gets used
        let first = routes.routes()[0].ifindex();
        assert!(routes.routes().iter().any(|r| r.ifindex() != first));
        assert!(routes.get(99).is_none());
    }

    #[test]
    fn test_build_route_table_without_peering() {
        let table = sample_table(2);
        let mut rng = Rng::with_seed(42);
        let asns = select_random_asns(&table, 2, &mut rng).unwrap();
        let err = build_route_table(asns, &[], &mut rng).unwrap_err();
        assert!(matches!(err, SynthError::NoPeeringInterfaces));
    }

    #[test]
    fn test_network_interface_forms_agree() {
        let interface = InternalNetwork::default().interface;
        assert_eq!(interface.next_hop_bits(), 167837954);
        assert_eq!(interface.next_hop_octets(), [10, 1, 1, 2]);
        assert_eq!(interface.to_string(), "if100 via 10.1.1.2");
    }
}
