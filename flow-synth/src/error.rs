use std::io;
use thiserror::Error;

const ENOMEM: i32 = 12;
const ENOSPC: i32 = 28;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("{requested} ASNs were requested, but the ASN table only holds {available} rows")]
    NotEnoughAsns { requested: usize, available: usize },
    #[error(
        "only {found} distinct ASNs could be selected from the ASN table, but {requested} were requested"
    )]
    NotEnoughDistinctAsns { requested: usize, found: usize },
    #[error("malformed ASN table row {row}: {reason}")]
    MalformedAsnRow { row: usize, reason: String },
    #[error("`{0}` is not a valid dotted-quad IPv4 address")]
    InvalidAddress(String),
    #[error("at least one peering interface is required to build a route table")]
    NoPeeringInterfaces,
    #[error("the route table is empty")]
    EmptyRouteTable,
    #[error("a flow rate of {0} flows per second is too low (the minimum is one flow per millisecond)")]
    FlowRateTooLow(u64),
    #[error("the device sampling ratio must be at least 1")]
    InvalidSamplingRatio,
    #[error("flow scheduled at {scheduled} ms cannot be buffered at {now} ms (look-ahead is {horizon} ms)")]
    BeyondLookAhead { now: u64, scheduled: u64, horizon: u64 },
    #[error("timestamp {0} does not fit in the 6-byte timestamp field")]
    TimestampOverflow(u64),
    #[error("the system id must hold 32 ASCII hex characters")]
    InvalidSystemId,
    #[error("expected a {expected}-byte flow record, got {actual} bytes")]
    TruncatedRecord { expected: usize, actual: usize },
    #[error("ran out of space or memory while writing flows: {0}")]
    ResourceExhausted(#[source] io::Error),
    #[error("failed to write flows: {0}")]
    Io(#[source] io::Error),
}

impl SynthError {
    /// Whether the error happened before generation started, i.e. it stems from bad input
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            SynthError::ResourceExhausted(_)
                | SynthError::Io(_)
                | SynthError::TimestampOverflow(_)
                | SynthError::TruncatedRecord { .. }
                | SynthError::BeyondLookAhead { .. }
        )
    }
}

impl From<io::Error> for SynthError {
    fn from(e: io::Error) -> Self {
        let exhausted = matches!(
            e.kind(),
            io::ErrorKind::StorageFull | io::ErrorKind::OutOfMemory
        ) || matches!(e.raw_os_error(), Some(ENOMEM | ENOSPC));

        if exhausted {
            SynthError::ResourceExhausted(e)
        } else {
            SynthError::Io(e)
        }
    }
}

impl From<csv::Error> for SynthError {
    fn from(e: csv::Error) -> Self {
        match e.into_kind() {
            csv::ErrorKind::Io(e) => e.into(),
            other => SynthError::Io(io::Error::other(format!("{other:?}"))),
        }
    }
}
