use clap::Parser;
use flow_synth::SystemId;
use flow_synth::sink::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(about = "Generate synthetic NetFlow v5 records, raw and device-sampled")]
pub struct CliOpt {
    /// Path to the tab-separated ASN table (range start, range end, ASN, country, description)
    #[arg(long)]
    pub asn_table: PathBuf,

    /// Where to store the cleaned ASN table, so it can be loaded directly next time
    #[arg(long)]
    pub save_clean_table: Option<PathBuf>,

    /// The number of ASNs that make up the simulated internet
    #[arg(long, default_value_t = 100)]
    pub asns: usize,

    /// Simulated duration of the run, in seconds
    #[arg(short, long, default_value_t = 600)]
    pub time: u64,

    /// The flow rate to simulate, in flows per second (at least 1000)
    #[arg(short, long, default_value_t = 200_000)]
    pub fps: u64,

    /// The N:1 device flow sampling to emulate
    #[arg(short, long, default_value_t = 1000)]
    pub device_sampling_rate: u64,

    /// The directory the raw and sampled flow files are written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// The format of the flow files (`csv` or `binary`)
    #[arg(long, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Generate flows without writing them anywhere
    #[arg(long)]
    pub dry_run: bool,

    /// The exporter's system id, as 32 hex characters (a random one is generated if absent)
    #[arg(long)]
    pub system_id: Option<SystemId>,

    /// Path to a JSON file overriding the default interfaces, internal network and server range
    #[arg(long)]
    pub topology: Option<PathBuf>,

    /// Whether the run should be non-deterministic, i.e. using a non-constant seed for the random
    /// number generator
    #[arg(long)]
    pub non_deterministic: bool,

    /// The random seed governing route selection and flow generation
    #[arg(long, default_value_t = 42)]
    pub rng_seed: u64,
}
