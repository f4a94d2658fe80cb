use crate::error::SynthError;
use crate::ip::ServerPool;
use crate::record::{FlowRecord, SystemId};
use crate::route::{InternalNetwork, RouteTable};
use fastrand::Rng;
use std::ops::RangeInclusive;

pub const HEAVY_TRANSFER_BYTES: RangeInclusive<u32> = 4_000_000..=20_000_000;
pub const LIGHT_TRANSFER_BYTES: RangeInclusive<u32> = 2_000_000..=4_000_000;
/// Percentage of conversations where the server sends the bulk of the data
pub const SERVER_AS_SOURCE_WEIGHT: u32 = 85;
pub const AVERAGE_PACKET_BYTES: u32 = 1200;
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;
pub const SERVER_PORTS: [u16; 3] = [443, 80, 22];
/// A flow may have started up to this many milliseconds before it gets exported
pub const MAX_FLOW_AGE_MS: u64 = 60_000;
pub const SERVER_LATENCY_MS: u64 = 15;
/// Jitter is drawn from `0..MAX_JITTER_MS`
pub const MAX_JITTER_MS: u64 = 6;
/// The furthest in the future a server flow can be scheduled, relative to its client flow
pub const MAX_RESPONSE_DELAY_MS: u64 = SERVER_LATENCY_MS + MAX_JITTER_MS - 1;

const PROTOCOL_TCP: u8 = 6;

/// Everything a generation run reads, but never modifies
#[derive(Clone, Debug)]
pub struct GenerationContext {
    route_table: RouteTable,
    server_pool: ServerPool,
    system_id: SystemId,
    internal: InternalNetwork,
}

impl GenerationContext {
    pub fn new(
        route_table: RouteTable,
        server_pool: ServerPool,
        system_id: SystemId,
        internal: InternalNetwork,
    ) -> Result<Self, SynthError> {
        if route_table.is_empty() {
            return Err(SynthError::EmptyRouteTable);
        }

        Ok(Self {
            route_table,
            server_pool,
            system_id,
            internal,
        })
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn server_pool(&self) -> &ServerPool {
        &self.server_pool
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    pub fn internal(&self) -> &InternalNetwork {
        &self.internal
    }
}

/// A randomly picked client, along with the routing information to reach it
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub address: u32,
    pub next_hop: u32,
    pub subnet_bits: u8,
    pub asn: u16,
    pub ifindex: u16,
}

pub struct FlowRecordFactory<'a> {
    context: &'a GenerationContext,
    rng: Rng,
}

impl<'a> FlowRecordFactory<'a> {
    pub fn new(context: &'a GenerationContext, rng: Rng) -> Self {
        Self { context, rng }
    }

    pub fn pick_client(&mut self) -> Client {
        let routes = self.context.route_table.routes();
        let route = &routes[self.rng.usize(..routes.len())];
        let address = self
            .rng
            .u32(route.block.ip_range_start..route.block.ip_range_end);

        Client {
            address,
            next_hop: route.next_hop(),
            subnet_bits: route.block.subnet_bits,
            asn: route.asn(),
            ifindex: route.ifindex(),
        }
    }

    pub fn pick_server(&mut self) -> u32 {
        let servers = self.context.server_pool.addresses();
        servers[self.rng.usize(..servers.len())]
    }

    /// Generates both directions of a conversation between a random client and a random server
    ///
    /// The client flow is exported at `time_index`, the server flow slightly later
    pub fn generate_pair(&mut self, time_index: u64) -> (FlowRecord, FlowRecord) {
        let client = self.pick_client();
        let server = self.pick_server();

        let heavy_transfer = self.rng.u32(HEAVY_TRANSFER_BYTES);
        let light_transfer = self.rng.u32(LIGHT_TRANSFER_BYTES);
        let (client_transfer, server_transfer) =
            if self.rng.u32(0..100) > SERVER_AS_SOURCE_WEIGHT {
                (heavy_transfer, light_transfer)
            } else {
                (light_transfer, heavy_transfer)
            };

        let client_port = self.rng.u16(EPHEMERAL_PORTS);
        let server_port = SERVER_PORTS[self.rng.usize(..SERVER_PORTS.len())];
        let client_start = time_index.saturating_sub(self.rng.u64(1..=MAX_FLOW_AGE_MS));
        let server_start = time_index.saturating_sub(self.rng.u64(1..=MAX_FLOW_AGE_MS));
        let server_time = time_index + SERVER_LATENCY_MS + self.rng.u64(0..MAX_JITTER_MS);

        let internal = &self.context.internal;
        let system_id = self.context.system_id;

        let client_flow = FlowRecord {
            timestamp: time_index,
            system_id,
            srcaddr: client.address,
            dstaddr: server,
            nexthop: internal.interface.next_hop_bits(),
            packets: client_transfer / AVERAGE_PACKET_BYTES,
            octets: client_transfer,
            first: client_start,
            last: time_index,
            srcport: client_port,
            dstport: server_port,
            tcp_flags: 0,
            protocol: PROTOCOL_TCP,
            tos: 0,
            src_as: client.asn,
            dst_as: internal.asn,
            src_mask: client.subnet_bits,
            dst_mask: internal.subnet_bits,
            input: client.ifindex,
            output: internal.interface.ifindex,
        };

        let server_flow = FlowRecord {
            timestamp: server_time,
            system_id,
            srcaddr: server,
            dstaddr: client.address,
            nexthop: client.next_hop,
            packets: server_transfer / AVERAGE_PACKET_BYTES,
            octets: server_transfer,
            first: server_start,
            last: time_index,
            srcport: server_port,
            dstport: client_port,
            tcp_flags: 0,
            protocol: PROTOCOL_TCP,
            tos: 0,
            src_as: internal.asn,
            dst_as: client.asn,
            src_mask: internal.subnet_bits,
            dst_mask: client.subnet_bits,
            input: internal.interface.ifindex,
            output: client.ifindex,
        };

        (client_flow, server_flow)
    }
}
