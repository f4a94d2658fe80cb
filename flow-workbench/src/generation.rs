use crate::config::cli::CliOpt;
use crate::config::load_topology;
use crate::util::{RunSummary, print_routes, print_run_stats, write_run_summary};
use anyhow::Context;
use fastrand::Rng;
use flow_synth::progress::LoggingProgress;
use flow_synth::route::{AsnTable, build_route_table, select_random_asns};
use flow_synth::sink::{
    FileBasedFlowSinkFactory, FlowSinkFactory, NoOpFlowSinkFactory, StreamKind,
};
use flow_synth::{GenerationContext, SchedulerConfig, StreamScheduler, SystemId};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

const PROGRESS_STEP_PERCENT: u64 = 10;

pub fn run_and_report_stats(options: &CliOpt, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    println!("--- Params ---");
    let rng_seed = if options.non_deterministic {
        Rng::new().u64(..)
    } else {
        options.rng_seed
    };
    println!("* Seed: {rng_seed}");
    println!("* Duration: {} seconds", options.time);
    println!("* Flow rate: {} flows/s", options.fps);
    println!("* Device sampling: {}:1", options.device_sampling_rate);
    println!("* ASN table path: {}", options.asn_table.display());
    if let Some(topology) = &options.topology {
        println!("* Topology path: {}", topology.display());
    }

    let mut rng = Rng::with_seed(rng_seed);
    let topology = load_topology(options.topology.as_deref())?;
    let table = load_asn_table(&options.asn_table)?;
    if let Some(path) = &options.save_clean_table {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        table
            .write_to(file)
            .with_context(|| format!("failed to save the cleaned ASN table to {}", path.display()))?;
        println!("* Cleaned ASN table saved at {}", path.display());
    }

    println!("--- Network ---");
    let selected = select_random_asns(&table, options.asns, &mut rng)
        .context("failed to select ASNs for the route table")?;
    let route_table = build_route_table(selected, &topology.peering_interfaces, &mut rng)
        .context("failed to build the route table")?;
    print_routes(&route_table, &topology);

    let system_id = options
        .system_id
        .unwrap_or_else(|| SystemId::generate(&mut rng));
    println!("* System id: {system_id}");
    let context = GenerationContext::new(
        route_table,
        topology.servers,
        system_id,
        topology.internal,
    )?;

    println!("--- Flows ---");
    let sink_factory: Box<dyn FlowSinkFactory> = if options.dry_run {
        println!("* Dry run, flows are not written");
        Box::new(NoOpFlowSinkFactory)
    } else {
        fs::create_dir_all(&options.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                options.output_dir.display()
            )
        })?;
        let factory = FileBasedFlowSinkFactory::new(&options.output_dir, options.format);
        for stream in [StreamKind::Raw, StreamKind::Sampled] {
            println!(
                "* {stream:?} flows: {}",
                factory.path_for(stream).display()
            );
        }
        Box::new(factory)
    };

    let mut raw = sink_factory
        .create_sink(StreamKind::Raw)
        .context("failed to create raw flow output")?;
    let mut sampled = sink_factory
        .create_sink(StreamKind::Sampled)
        .context("failed to create sampled flow output")?;

    let config = SchedulerConfig {
        duration_secs: options.time,
        flows_per_second: options.fps,
        sampling_ratio: options.device_sampling_rate,
    };
    let mut scheduler = StreamScheduler::new(&context, config, rng)?.with_stop_flag(stop);
    let mut progress = LoggingProgress::new(config.flows_to_make(), PROGRESS_STEP_PERCENT);

    let start = Instant::now();
    let stats = scheduler
        .run(raw.as_mut(), sampled.as_mut(), &mut progress)
        .context("flow generation failed")?;
    let elapsed = start.elapsed();

    print_run_stats(&stats, elapsed);

    if !options.dry_run {
        println!("--- Run summary ---");
        let summary = RunSummary {
            seed: rng_seed,
            system_id,
            duration_secs: options.time,
            flows_per_second: options.fps,
            device_sampling_rate: options.device_sampling_rate,
            asns: options.asns,
            format: options.format.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            stats,
        };
        let summary_path = options.output_dir.join("run-summary.json");
        write_run_summary(&summary, &summary_path)?;
        println!("* Run summary available at {}", summary_path.display());
    }

    Ok(())
}

fn load_asn_table(path: &Path) -> anyhow::Result<AsnTable> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open ASN table at {}", path.display()))?;
    let table = AsnTable::from_reader(file)
        .with_context(|| format!("failed to load ASN table from {}", path.display()))?;
    println!("* Routable ASN rows: {}", table.len());
    Ok(table)
}
