use crate::error::SynthError;
use crate::record::{BinaryFlowRecord, FlowRecord, RECORD_LEN};
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The two streams produced by a generation run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Raw,
    Sampled,
}

impl StreamKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            StreamKind::Raw => "raw_flow",
            StreamKind::Sampled => "sampled_flow",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Binary,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Binary => "bin",
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "binary" | "bin" => Ok(OutputFormat::Binary),
            _ => Err(format!("unknown output format `{s}` (expected `csv` or `binary`)")),
        }
    }
}

/// Receives the flows of one stream, in order
pub trait FlowSink {
    fn write(&mut self, flow: &FlowRecord) -> Result<(), SynthError>;

    /// Flushes buffered flows. Called exactly once, also when the run fails.
    fn finish(&mut self) -> Result<(), SynthError>;
}

pub trait FlowSinkFactory {
    fn create_sink(&self, stream: StreamKind) -> Result<Box<dyn FlowSink>, SynthError>;
}

pub struct NoOpFlowSinkFactory;
impl FlowSinkFactory for NoOpFlowSinkFactory {
    fn create_sink(&self, _: StreamKind) -> Result<Box<dyn FlowSink>, SynthError> {
        Ok(Box::new(NoOpFlowSink))
    }
}

pub struct FileBasedFlowSinkFactory {
    output_dir: PathBuf,
    format: OutputFormat,
}

impl FileBasedFlowSinkFactory {
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    pub fn path_for(&self, stream: StreamKind) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", stream.file_stem(), self.format.extension()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl FlowSinkFactory for FileBasedFlowSinkFactory {
    fn create_sink(&self, stream: StreamKind) -> Result<Box<dyn FlowSink>, SynthError> {
        let path = self.path_for(stream);
        let file = fs::File::create(&path)?;
        tracing::debug!("writing {stream:?} flows to {}", path.display());

        Ok(match self.format {
            OutputFormat::Csv => Box::new(CsvFlowSink::new(file)),
            OutputFormat::Binary => Box::new(BinaryFlowSink::new(file)),
        })
    }
}

/// Discards every flow
pub struct NoOpFlowSink;
impl FlowSink for NoOpFlowSink {
    fn write(&mut self, _: &FlowRecord) -> Result<(), SynthError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SynthError> {
        Ok(())
    }
}

pub const CSV_HEADER: [&str; 20] = [
    "timestamp",
    "system_id",
    "srcaddr",
    "dstaddr",
    "nexthop",
    "dPkts",
    "dOctets",
    "first",
    "last",
    "srcport",
    "dstport",
    "tcp_flags",
    "protocol",
    "tos",
    "src_as",
    "dst_as",
    "src_mask",
    "dst_mask",
    "input",
    "output",
];

/// Writes flows as CSV, preceded by a header row. The header is written even when no flow is.
pub struct CsvFlowSink<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> CsvFlowSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
            header_written: false,
        }
    }

    fn write_header(&mut self) -> Result<(), SynthError> {
        if !self.header_written {
            self.writer.write_record(CSV_HEADER)?;
            self.header_written = true;
        }

        Ok(())
    }
}

impl<W: Write> FlowSink for CsvFlowSink<W> {
    fn write(&mut self, flow: &FlowRecord) -> Result<(), SynthError> {
        self.write_header()?;
        self.writer.serialize(flow)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SynthError> {
        self.write_header()?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes flows back to back, in the 75-byte binary layout
pub struct BinaryFlowSink<W: Write> {
    writer: BufWriter<W>,
    record: [u8; RECORD_LEN],
}

impl<W: Write> BinaryFlowSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            record: [0; RECORD_LEN],
        }
    }
}

impl<W: Write> FlowSink for BinaryFlowSink<W> {
    fn write(&mut self, flow: &FlowRecord) -> Result<(), SynthError> {
        flow.encode(&mut self.record)?;
        self.writer.write_all(&self.record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SynthError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every flow in memory
#[derive(Default)]
pub struct MemoryFlowSink {
    pub flows: Vec<FlowRecord>,
    pub finished: bool,
}

impl FlowSink for MemoryFlowSink {
    fn write(&mut self, flow: &FlowRecord) -> Result<(), SynthError> {
        self.flows.push(flow.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SynthError> {
        self.finished = true;
        Ok(())
    }
}

/// Reads back a file written by a [`BinaryFlowSink`]
pub fn read_binary_flows(mut reader: impl io::Read) -> Result<Vec<BinaryFlowRecord>, SynthError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    bytes.chunks(RECORD_LEN).map(BinaryFlowRecord::decode).collect()
}
