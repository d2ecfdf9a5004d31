use heapless::{HistoryBuffer, Vec};

use crate::config::TRACE_DEPTH;
use crate::core::{ChunkKind, WorkerId};

/// Entry of the diagnostic trace ring
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceEvent {
    /// Chip-select asserted, transfer armed
    Selected,
    /// Chip-select released, frame closed
    Deselected,
    TxComplete,
    RxComplete,
    /// Transfer armed while the previous one was still pending
    Overrun,
    CrcMismatch { kind: ChunkKind, worker: WorkerId },
    Refresh,
    /// Periodic controller marker
    Heartbeat,
}

/// Counters of link activity
///
/// All counters wrap around.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub falling_edges: u32,
    pub rising_edges: u32,
    pub frames: u32,
    pub tx_completions: u32,
    pub rx_completions: u32,
    pub overruns: u32,
    pub crc_mismatches: u32,
    pub refreshes: u32,
    /// Words left in the transmit and receive channels when the frame opened
    pub start_remaining: [u16; 2],
    /// Words left in the transmit and receive channels when the frame closed
    pub end_remaining: [u16; 2],
}

pub(crate) struct Recorder {
    pub(crate) counters: Snapshot,
    trace: HistoryBuffer<TraceEvent, TRACE_DEPTH>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self {
            counters: Snapshot::default(),
            trace: HistoryBuffer::new(),
        }
    }

    pub(crate) fn record(&mut self, event: TraceEvent) {
        let counter = match event {
            TraceEvent::Selected => &mut self.counters.falling_edges,
            TraceEvent::Deselected => &mut self.counters.rising_edges,
            TraceEvent::TxComplete => &mut self.counters.tx_completions,
            TraceEvent::RxComplete => &mut self.counters.rx_completions,
            TraceEvent::Overrun => &mut self.counters.overruns,
            TraceEvent::CrcMismatch { .. } => &mut self.counters.crc_mismatches,
            TraceEvent::Refresh => &mut self.counters.refreshes,
            TraceEvent::Heartbeat => {
                self.trace.write(event);
                return;
            }
        };
        *counter = counter.wrapping_add(1);
        self.trace.write(event);
    }

    pub(crate) fn count_frame(&mut self) {
        self.counters.frames = self.counters.frames.wrapping_add(1);
    }

    /// Removes and returns the trace, oldest entry first.
    pub(crate) fn drain(&mut self) -> Vec<TraceEvent, TRACE_DEPTH> {
        let events = self.trace.oldest_ordered().copied().collect();
        self.trace.clear();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_and_traces() {
        let mut recorder = Recorder::new();
        recorder.record(TraceEvent::Selected);
        recorder.record(TraceEvent::Overrun);
        recorder.record(TraceEvent::Heartbeat);
        recorder.count_frame();

        assert_eq!(recorder.counters.falling_edges, 1);
        assert_eq!(recorder.counters.overruns, 1);
        assert_eq!(recorder.counters.frames, 1);
        assert_eq!(
            &recorder.drain()[..],
            &[
                TraceEvent::Selected,
                TraceEvent::Overrun,
                TraceEvent::Heartbeat
            ]
        );
        assert!(recorder.drain().is_empty());
    }

    #[test]
    fn test_trace_keeps_latest_entries() {
        let mut recorder = Recorder::new();
        recorder.record(TraceEvent::Refresh);
        for _ in 0..TRACE_DEPTH {
            recorder.record(TraceEvent::TxComplete);
        }
        let trace = recorder.drain();
        assert_eq!(trace.len(), TRACE_DEPTH);
        assert!(trace.iter().all(|&event| event == TraceEvent::TxComplete));
        assert_eq!(recorder.counters.refreshes, 1);
    }
}
