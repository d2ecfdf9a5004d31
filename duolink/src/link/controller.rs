use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::buffer::{BufferRef, Layout, LayoutError, Role, SharedBuffer};
use crate::config::{HEARTBEAT_INTERVAL, TRACE_DEPTH};
use crate::core::ChunkKind;
use crate::link::{Channel, Endpoint, Peripherals, Snapshot, TraceEvent, check_chunk, stamp_chunk};

struct State<P> {
    channel: Channel<P>,
    refresh_count: u32,
}

/// Controller endpoint (SPI master)
///
/// Owns every setpoint chunk and receives every worker's measurement. There is no
/// chip-select framing on this side: each [`Endpoint::refresh`] stamps the setpoints
/// and starts the next transfer.
pub struct Controller<'a, M: RawMutex, P> {
    layout: Layout,
    buffer: BufferRef<'a>,
    state: Mutex<M, RefCell<State<P>>>,
}

impl<'a, M: RawMutex, P: Peripherals> Controller<'a, M, P> {
    /// Binds the endpoint to its buffer and peripherals and stamps all setpoints.
    pub fn new<const W: usize>(
        layout: Layout,
        buffer: &'a SharedBuffer<W>,
        ports: P,
    ) -> Result<Self, LayoutError> {
        if layout.role() != Role::Controller {
            return Err(LayoutError::Role);
        }
        layout.check_buffer_len(buffer.len())?;
        let controller = Self {
            layout,
            buffer: buffer.view(),
            state: Mutex::new(RefCell::new(State {
                channel: Channel::new(ports),
                refresh_count: 0,
            })),
        };
        controller.stamp_owned();
        Ok(controller)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State<P>) -> T) -> T {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Gives access to the peripherals, e.g. for DMA reconfiguration between frames.
    pub fn with_ports<T>(&self, f: impl FnOnce(&mut P) -> T) -> T {
        self.with_state(|state| f(&mut state.channel.ports))
    }

    /// Restamps every setpoint chunk.
    pub fn stamp_owned(&self) {
        for worker in self.layout.workers() {
            // SAFETY: setpoints are only read by the transmit channel, which is started
            // after stamping
            unsafe { stamp_chunk(&self.layout, self.buffer, ChunkKind::Setpoint, worker) };
        }
    }

    /// True while the last started transfer has not fully completed
    pub fn is_pending(&self) -> bool {
        self.with_state(|state| state.channel.is_pending())
    }
}

impl<M: RawMutex, P: Peripherals> Endpoint for Controller<'_, M, P> {
    fn on_tx_complete(&self) {
        self.with_state(|state| state.channel.complete_tx());
    }

    fn on_rx_complete(&self) -> usize {
        self.with_state(|state| {
            state.channel.complete_rx();
            state.channel.recorder.count_frame();
        });

        let mut corrupted = 0;
        for worker in self.layout.workers() {
            // SAFETY: the receive channel has completed and the receiver stays gated
            // until the next refresh
            let valid = unsafe {
                check_chunk(&self.layout, self.buffer, ChunkKind::Measurement, worker)
            };
            if !valid {
                corrupted += 1;
                self.with_state(|state| {
                    state.channel.recorder.record(TraceEvent::CrcMismatch {
                        kind: ChunkKind::Measurement,
                        worker,
                    })
                });
            }
        }
        corrupted
    }

    /// Stamps the setpoints and starts the next transfer.
    fn refresh(&self) {
        self.with_state(|state| {
            state.channel.toggle_indicator();
            if state.refresh_count % HEARTBEAT_INTERVAL == 0 {
                state.channel.recorder.record(TraceEvent::Heartbeat);
            }
            state.refresh_count = state.refresh_count.wrapping_add(1);
            state.channel.recorder.record(TraceEvent::Refresh);
        });

        self.stamp_owned();

        let overrun = self.with_state(|state| state.channel.arm());
        if overrun {
            warn!("controller transfer overrun");
        }
    }

    fn diagnostics(&self) -> Snapshot {
        self.with_state(|state| state.channel.recorder.counters)
    }

    fn drain_trace(&self) -> Vec<TraceEvent, TRACE_DEPTH> {
        self.with_state(|state| state.channel.recorder.drain())
    }
}
