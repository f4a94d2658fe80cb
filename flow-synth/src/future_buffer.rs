use crate::error::SynthError;
use crate::record::FlowRecord;

/// Holds flows that must not be exported before their own timestamp
///
/// This is a timer wheel with one slot per millisecond. Since flows are never scheduled more than
/// `horizon_ms` milliseconds ahead, and every millisecond gets drained in order, a slot only ever
/// contains flows for a single timestamp.
pub struct FutureFlowBuffer {
    slots: Vec<Vec<FlowRecord>>,
    /// The last millisecond that was drained
    now: u64,
    pending: usize,
}

impl FutureFlowBuffer {
    /// Creates a buffer that accepts flows up to `horizon_ms` milliseconds after `now`
    pub fn new(now: u64, horizon_ms: u64) -> Self {
        let slot_count = horizon_ms as usize + 1;
        Self {
            slots: (0..slot_count).map(|_| Vec::new()).collect(),
            now,
            pending: 0,
        }
    }

    fn slot_index(&self, timestamp: u64) -> usize {
        (timestamp % self.slots.len() as u64) as usize
    }

    pub fn horizon_ms(&self) -> u64 {
        self.slots.len() as u64 - 1
    }

    /// Schedules a flow for the millisecond given by its timestamp
    pub fn insert(&mut self, flow: FlowRecord) -> Result<(), SynthError> {
        if flow.timestamp <= self.now || flow.timestamp - self.now > self.horizon_ms() {
            return Err(SynthError::BeyondLookAhead {
                now: self.now,
                scheduled: flow.timestamp,
                horizon: self.horizon_ms(),
            });
        }

        let index = self.slot_index(flow.timestamp);
        self.slots[index].push(flow);
        self.pending += 1;
        Ok(())
    }

    /// Moves the flows scheduled for `now` to the end of `out`
    ///
    /// Time only moves forward: every millisecond must be drained, in order, once.
    pub fn drain_into(&mut self, now: u64, out: &mut Vec<FlowRecord>) {
        debug_assert_eq!(now, self.now + 1, "milliseconds must be drained in order");
        self.now = now;

        let index = self.slot_index(now);
        let slot = &mut self.slots[index];
        debug_assert!(slot.iter().all(|f| f.timestamp == now));
        self.pending -= slot.len();
        out.append(slot);
    }

    /// The number of flows waiting to be drained
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::test::sample_record;

    fn flow_at(timestamp: u64) -> FlowRecord {
        FlowRecord {
            timestamp,
            ..sample_record()
        }
    }

    #[test]
    fn test_flows_are_drained_at_their_timestamp() {
        let mut buffer = FutureFlowBuffer::new(100, 20);
        buffer.insert(flow_at(115)).unwrap();
        buffer.insert(flow_at(120)).unwrap();
        buffer.insert(flow_at(115)).unwrap();
        assert_eq!(buffer.pending(), 3);

        let mut drained_at = Vec::new();
        for now in 101..=140 {
            let mut out = Vec::new();
            buffer.drain_into(now, &mut out);
            for flow in out {
                assert_eq!(flow.timestamp, now);
                drained_at.push(now);
            }

            // Keep inserting while time moves on
            if now == 110 {
                buffer.insert(flow_at(130)).unwrap();
            }
        }

        assert_eq!(drained_at, vec![115, 115, 120, 130]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_slot_drains_nothing() {
        let mut buffer = FutureFlowBuffer::new(0, 5);
        let mut out = vec![flow_at(0)];
        buffer.drain_into(1, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_insert_outside_look_ahead() {
        let mut buffer = FutureFlowBuffer::new(1000, 20);

        for timestamp in [999, 1000, 1021] {
            let err = buffer.insert(flow_at(timestamp)).unwrap_err();
            assert!(matches!(err, SynthError::BeyondLookAhead { .. }), "{timestamp}");
        }

        buffer.insert(flow_at(1001)).unwrap();
        buffer.insert(flow_at(1020)).unwrap();
        assert_eq!(buffer.pending(), 2);
    }

    #[test]
    fn test_slots_are_reused_after_wrapping() {
        let mut buffer = FutureFlowBuffer::new(0, 3);
        let mut total = 0;
        for now in 1..=100 {
            let mut out = Vec::new();
            buffer.drain_into(now, &mut out);
            assert!(out.iter().all(|f| f.timestamp == now));
            total += out.len();

            buffer.insert(flow_at(now + 3)).unwrap();
        }

        // Flows for 4..=100 were drained, 101..=103 are still pending
        assert_eq!(total, 97);
        assert_eq!(buffer.pending(), 3);
    }
}
