//! The tick loop that turns flow pairs into two time-ordered streams
//!
//! Every tick is one millisecond of simulated time. Client flows are emitted at the tick they are
//! generated, while their server counterparts are parked in a [`FutureFlowBuffer`] until the clock
//! reaches their own timestamp. Once per simulated second, the flows of that second are handed to
//! the [`SamplingEngine`].

use crate::error::SynthError;
use crate::factory::{FlowRecordFactory, GenerationContext, MAX_RESPONSE_DELAY_MS};
use crate::future_buffer::FutureFlowBuffer;
use crate::progress::ProgressSink;
use crate::record::FlowRecord;
use crate::sampling::SamplingEngine;
use crate::sink::FlowSink;
use fastrand::Rng;
use serde::Serialize;
use std::cmp;
use std::collections::TryReserveError;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The simulated clock starts one minute in, so flow start times never go negative
pub const CLOCK_START_MS: u64 = 60_000;
pub const TICKS_PER_WINDOW: u64 = 1000;

/// Upper bound on the flows preallocated up front, larger rates grow the buffers on demand
const MAX_PREALLOCATED_FLOWS: usize = 1 << 20;

#[derive(Copy, Clone, Debug)]
pub struct SchedulerConfig {
    pub duration_secs: u64,
    pub flows_per_second: u64,
    /// Keep one out of `sampling_ratio` flows in the sampled stream
    pub sampling_ratio: u64,
}

impl SchedulerConfig {
    pub fn flows_to_make(&self) -> u64 {
        self.duration_secs.saturating_mul(self.flows_per_second)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub raw_flows: u64,
    pub sampled_flows: u64,
    pub ticks: u64,
    /// Server flows that were still scheduled in the future when the run ended
    pub discarded_pending: u64,
    pub interrupted: bool,
}

pub struct StreamScheduler<'a> {
    config: SchedulerConfig,
    factory: FlowRecordFactory<'a>,
    sampling: SamplingEngine,
    flows_per_ms: usize,
    rng: Rng,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> StreamScheduler<'a> {
    pub fn new(
        context: &'a GenerationContext,
        config: SchedulerConfig,
        mut rng: Rng,
    ) -> Result<Self, SynthError> {
        let flows_per_ms = config.flows_per_second / TICKS_PER_WINDOW;
        if flows_per_ms == 0 {
            return Err(SynthError::FlowRateTooLow(config.flows_per_second));
        }

        let sampling = SamplingEngine::new(
            config.flows_per_second as usize,
            config.sampling_ratio as usize,
        )?;

        Ok(Self {
            config,
            factory: FlowRecordFactory::new(context, rng.fork()),
            sampling,
            flows_per_ms: flows_per_ms as usize,
            rng,
            stop: None,
        })
    }

    /// Checked between ticks. When raised, the run ends early after sampling the current window.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn sampling(&self) -> &SamplingEngine {
        &self.sampling
    }

    /// Runs the loop to completion and closes both sinks, whatever the outcome
    pub fn run(
        &mut self,
        raw: &mut dyn FlowSink,
        sampled: &mut dyn FlowSink,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunStats, SynthError> {
        let result = self.generate(raw, sampled, progress);
        let raw_closed = raw.finish();
        let sampled_closed = sampled.finish();

        match result {
            Ok(stats) => {
                raw_closed?;
                sampled_closed?;
                Ok(stats)
            }
            Err(e) => {
                for closed in [raw_closed, sampled_closed] {
                    if let Err(close_error) = closed {
                        tracing::warn!("failed to close sink after an earlier error: {close_error}");
                    }
                }

                Err(e)
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }

    fn generate(
        &mut self,
        raw: &mut dyn FlowSink,
        sampled: &mut dyn FlowSink,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunStats, SynthError> {
        let flows_to_make = self.config.flows_to_make();
        tracing::info!(
            "generating {flows_to_make} raw flows at {} flows/s ({} per ms)",
            self.config.flows_per_second,
            self.flows_per_ms
        );

        let mut stats = RunStats::default();
        let mut buffer = FutureFlowBuffer::new(CLOCK_START_MS - 1, MAX_RESPONSE_DELAY_MS);
        let mut working_set = Vec::with_capacity(preallocation(self.flows_per_ms));
        let mut window = Vec::with_capacity(preallocation(self.config.flows_per_second as usize));

        let mut now = CLOCK_START_MS - 1;
        while stats.raw_flows < flows_to_make {
            if self.stop_requested() {
                tracing::info!("stop requested after {} ticks", stats.ticks);
                stats.interrupted = true;
                break;
            }

            now += 1;
            stats.ticks += 1;

            buffer.drain_into(now, &mut working_set);
            working_set
                .try_reserve(self.flows_per_ms.saturating_sub(working_set.len()))
                .map_err(out_of_memory)?;
            while working_set.len() < self.flows_per_ms {
                let (client, server) = self.factory.generate_pair(now);
                working_set.push(client);
                buffer.insert(server)?;
            }

            window.try_reserve(working_set.len()).map_err(out_of_memory)?;
            for flow in working_set.drain(..) {
                raw.write(&flow)?;
                window.push(flow);
                stats.raw_flows += 1;
            }

            if stats.ticks % TICKS_PER_WINDOW == 0 {
                self.sample_window(&mut window, sampled, &mut stats)?;
                progress.flows_emitted(stats.raw_flows);
            }
        }

        if !window.is_empty() {
            self.sample_window(&mut window, sampled, &mut stats)?;
            progress.flows_emitted(stats.raw_flows);
        }

        stats.discarded_pending = buffer.pending() as u64;
        if stats.discarded_pending > 0 {
            tracing::debug!(
                "discarding {} server flows scheduled after the end of the run",
                stats.discarded_pending
            );
        }

        Ok(stats)
    }

    fn sample_window(
        &mut self,
        window: &mut Vec<FlowRecord>,
        sampled: &mut dyn FlowSink,
        stats: &mut RunStats,
    ) -> Result<(), SynthError> {
        let mut count = 0;
        for flow in self.sampling.sample(window.as_slice(), &mut self.rng) {
            sampled.write(flow)?;
            count += 1;
        }

        tracing::debug!("sampled {count} out of {} flows", window.len());
        stats.sampled_flows += count;
        window.clear();
        Ok(())
    }
}

fn preallocation(flows: usize) -> usize {
    cmp::min(flows.saturating_mul(2), MAX_PREALLOCATED_FLOWS)
}

fn out_of_memory(e: TryReserveError) -> SynthError {
    SynthError::ResourceExhausted(io::Error::new(io::ErrorKind::OutOfMemory, e))
}
