use flow_synth::ip::ServerPool;
use flow_synth::route::{DEFAULT_PEERING_INTERFACES, InternalNetwork, NetworkInterface};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::net::Ipv4Addr;

pub const DEFAULT_SERVER_RANGE: (Ipv4Addr, Ipv4Addr) =
    (Ipv4Addr::new(10, 10, 10, 10), Ipv4Addr::new(10, 10, 10, 100));

/// Where simulated traffic enters and leaves the network, and which servers it reaches
pub struct Topology {
    pub peering_interfaces: Vec<NetworkInterface>,
    pub internal: InternalNetwork,
    pub servers: ServerPool,
}

impl Default for Topology {
    fn default() -> Self {
        let (from, to) = DEFAULT_SERVER_RANGE;
        Self {
            peering_interfaces: DEFAULT_PEERING_INTERFACES.to_vec(),
            internal: InternalNetwork::default(),
            servers: ServerPool::from_range(from.to_bits(), to.to_bits()),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TopologyJson {
    #[serde(default)]
    peering_interfaces: Option<Vec<NetworkInterfaceJson>>,
    #[serde(default)]
    internal: Option<InternalNetworkJson>,
    #[serde(default)]
    servers: Option<ServerRangeJson>,
}

#[serde_as]
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct NetworkInterfaceJson {
    ifindex: u16,
    #[serde_as(as = "DisplayFromStr")]
    next_hop: Ipv4Addr,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InternalNetworkJson {
    asn: u16,
    subnet_bits: u8,
    interface: NetworkInterfaceJson,
}

#[serde_as]
#[derive(Deserialize, Clone)]
struct ServerRangeJson {
    #[serde_as(as = "DisplayFromStr")]
    from: Ipv4Addr,
    #[serde_as(as = "DisplayFromStr")]
    to: Ipv4Addr,
}

impl From<NetworkInterfaceJson> for NetworkInterface {
    fn from(json: NetworkInterfaceJson) -> Self {
        NetworkInterface::new(json.ifindex, json.next_hop)
    }
}

impl From<TopologyJson> for Topology {
    fn from(json: TopologyJson) -> Self {
        let default = Topology::default();
        Self {
            peering_interfaces: json
                .peering_interfaces
                .map(|interfaces| interfaces.into_iter().map(|i| i.into()).collect())
                .unwrap_or(default.peering_interfaces),
            internal: json
                .internal
                .map(|i| InternalNetwork {
                    asn: i.asn,
                    subnet_bits: i.subnet_bits,
                    interface: i.interface.into(),
                })
                .unwrap_or(default.internal),
            servers: json
                .servers
                .map(|s| ServerPool::from_range(s.from.to_bits(), s.to.to_bits()))
                .unwrap_or(default.servers),
        }
    }
}
