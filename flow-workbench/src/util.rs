use crate::config::topology::Topology;
use anyhow::Context;
use flow_synth::route::RouteTable;
use flow_synth::{RunStats, SystemId};
use serde::Serialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

const DISPLAY_MAX_ROUTES: usize = 10;

#[derive(Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub system_id: SystemId,
    pub duration_secs: u64,
    pub flows_per_second: u64,
    pub device_sampling_rate: u64,
    pub asns: usize,
    pub format: String,
    pub elapsed_secs: f64,
    pub stats: RunStats,
}

pub fn print_routes(route_table: &RouteTable, topology: &Topology) {
    println!("* Routes: {}", route_table.len());
    for route in route_table.routes().iter().take(DISPLAY_MAX_ROUTES) {
        println!(
            "  * AS{} {} ({}): {}/{} via {}",
            route.asn(),
            route.block.description,
            route.block.country,
            Ipv4Addr::from_bits(route.block.network_address),
            route.block.subnet_bits,
            route.peering,
        );
    }
    if route_table.len() > DISPLAY_MAX_ROUTES {
        println!("  | ... and {} more", route_table.len() - DISPLAY_MAX_ROUTES);
    }

    let internal = &topology.internal;
    println!(
        "* Internal network: AS{} /{} via {}",
        internal.asn, internal.subnet_bits, internal.interface
    );

    let servers = topology.servers.addresses();
    if let (Some(first), Some(last)) = (servers.first(), servers.last()) {
        println!(
            "* Servers: {} ({} - {})",
            servers.len(),
            Ipv4Addr::from_bits(*first),
            Ipv4Addr::from_bits(*last)
        );
    }
}

pub fn print_run_stats(stats: &RunStats, elapsed: Duration) {
    println!("--- Results ---");
    if stats.interrupted {
        println!("* Interrupted after {} simulated seconds", stats.ticks / 1000);
    } else {
        println!("* Done!");
    }
    println!("* Total raw flows made: {}", stats.raw_flows);
    println!("* Total device sampled flows made: {}", stats.sampled_flows);
    println!(
        "* Server flows discarded at the end of the run: {}",
        stats.discarded_pending
    );
    println!("* Time Taken: {}", format_elapsed(elapsed));
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{} minutes, {} seconds", secs / 60, secs % 60)
}

pub fn write_run_summary(summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(summary).context("failed to serialize run summary")?;
    fs::write(path, json).context("failed to store run summary")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0 minutes, 0 seconds");
        assert_eq!(
            format_elapsed(Duration::from_millis(125_900)),
            "2 minutes, 5 seconds"
        );
    }

    #[test]
    fn test_run_summary_json() {
        let summary = RunSummary {
            seed: 42,
            system_id: SystemId::from_bytes([0xab; 16]),
            duration_secs: 600,
            flows_per_second: 200_000,
            device_sampling_rate: 1000,
            asns: 100,
            format: "csv".to_string(),
            elapsed_secs: 1.5,
            stats: RunStats {
                raw_flows: 120_000_000,
                sampled_flows: 120_000,
                ticks: 600_000,
                discarded_pending: 1000,
                interrupted: false,
            },
        };

        let json: serde_json::Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["system_id"], "ab".repeat(16));
        assert_eq!(json["stats"]["raw_flows"], 120_000_000);
        assert_eq!(json["stats"]["interrupted"], false);
    }
}
