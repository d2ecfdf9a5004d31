use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::buffer::{BufferRef, Layout, LayoutError, Role, SharedBuffer};
use crate::config::TRACE_DEPTH;
use crate::core::{ChunkKind, Level, WorkerId};
use crate::driver::interrupt::InterruptSource;
use crate::driver::peripheral::DigitalInput;
use crate::link::{Channel, Endpoint, Peripherals, Snapshot, TraceEvent, check_chunk, stamp_chunk};

struct State<P, C> {
    channel: Channel<P>,
    chip_select: C,
    last_level: Level,
}

/// Worker endpoint (SPI slave)
///
/// Owns its measurement chunk and receives every setpoint and every other worker's
/// measurement. Transfers are framed by the chip-select line.
pub struct Worker<'a, M: RawMutex, P, C> {
    id: WorkerId,
    layout: Layout,
    buffer: BufferRef<'a>,
    state: Mutex<M, RefCell<State<P, C>>>,
}

impl<'a, M: RawMutex, P: Peripherals, C: DigitalInput> Worker<'a, M, P, C> {
    /// Binds the endpoint to its buffer and peripherals.
    ///
    /// The chip-select line is assumed released until the first edge.
    pub fn new<const W: usize>(
        layout: Layout,
        buffer: &'a SharedBuffer<W>,
        ports: P,
        chip_select: C,
    ) -> Result<Self, LayoutError> {
        let Role::Worker(id) = layout.role() else {
            return Err(LayoutError::Role);
        };
        layout.check_buffer_len(buffer.len())?;
        Ok(Self {
            id,
            layout,
            buffer: buffer.view(),
            state: Mutex::new(RefCell::new(State {
                channel: Channel::new(ports),
                chip_select,
                last_level: Level::High,
            })),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State<P, C>) -> T) -> T {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Gives access to the peripherals, e.g. for DMA reconfiguration between frames.
    pub fn with_ports<T>(&self, f: impl FnOnce(&mut P) -> T) -> T {
        self.with_state(|state| f(&mut state.channel.ports))
    }

    /// Chip-select edge handler
    ///
    /// Only a level change against the last observed level counts as an edge, so
    /// repeated notifications at the same level are ignored.
    pub fn on_chip_select(&self) {
        let overrun = self.with_state(|state| {
            let level = state.chip_select.level();
            match (state.last_level, level) {
                (Level::High, Level::Low) => {
                    state.last_level = Level::Low;
                    state.channel.recorder.counters.start_remaining =
                        state.channel.latch_remaining();
                    state.channel.recorder.record(TraceEvent::Selected);
                    state.channel.arm()
                }
                (Level::Low, Level::High) => {
                    state.last_level = Level::High;
                    state.channel.recorder.counters.end_remaining =
                        state.channel.latch_remaining();
                    state.channel.recorder.record(TraceEvent::Deselected);
                    state.channel.recorder.count_frame();
                    false
                }
                _ => false,
            }
        });
        if overrun {
            warn!("worker {} transfer overrun", self.id.into_u8());
        }
    }

    /// Restamps the local measurement chunk and returns its CRC.
    pub fn stamp_owned(&self) -> u16 {
        // SAFETY: the owned chunk is only read by the transmit channel inside the
        // chip-select window, and refresh runs outside of it
        unsafe { stamp_chunk(&self.layout, self.buffer, ChunkKind::Measurement, self.id) }
    }

    /// True while a transfer armed by the last assertion has not fully completed
    pub fn is_pending(&self) -> bool {
        self.with_state(|state| state.channel.is_pending())
    }

    /// Interrupt source for the chip-select edge
    pub fn chip_select_source(&self) -> ChipSelectSource<'_, 'a, M, P, C> {
        ChipSelectSource(self)
    }
}

impl<M: RawMutex, P: Peripherals, C: DigitalInput> Endpoint for Worker<'_, M, P, C> {
    fn on_tx_complete(&self) {
        self.with_state(|state| state.channel.complete_tx());
    }

    fn on_rx_complete(&self) -> usize {
        self.with_state(|state| state.channel.complete_rx());

        let mut corrupted = 0;
        for worker in self.layout.workers() {
            for kind in [ChunkKind::Setpoint, ChunkKind::Measurement] {
                if self.layout.is_owned(kind, worker) {
                    continue;
                }
                // SAFETY: the receive channel has completed and the receiver is gated
                // until the next chip-select assertion
                let valid = unsafe { check_chunk(&self.layout, self.buffer, kind, worker) };
                if !valid {
                    corrupted += 1;
                    self.with_state(|state| {
                        state
                            .channel
                            .recorder
                            .record(TraceEvent::CrcMismatch { kind, worker })
                    });
                }
            }
        }
        corrupted
    }

    fn refresh(&self) {
        self.with_state(|state| {
            state.channel.toggle_indicator();
            state.channel.recorder.record(TraceEvent::Refresh);
        });
        self.stamp_owned();
    }

    fn diagnostics(&self) -> Snapshot {
        self.with_state(|state| state.channel.recorder.counters)
    }

    fn drain_trace(&self) -> Vec<TraceEvent, TRACE_DEPTH> {
        self.with_state(|state| state.channel.recorder.drain())
    }
}

/// Chip-select edge interrupt source
pub struct ChipSelectSource<'l, 'a, M: RawMutex, P, C>(&'l Worker<'a, M, P, C>);

impl<M: RawMutex, P: Peripherals, C: DigitalInput> InterruptSource
    for ChipSelectSource<'_, '_, M, P, C>
{
    fn on_event(&self) {
        self.0.on_chip_select();
    }
}
