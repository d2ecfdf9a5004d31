//! Chip-select framed frame exchange
//!
//! The controller drives the SPI clock and paces transfers from a periodic timer.
//! Workers follow the chip-select line: assertion arms both DMA channels, release closes
//! the frame. Once the receive channel completes, the endpoint halts it, gates the
//! receiver, flushes the FIFO and checks the CRC of every received chunk.
//!
//! Faults never stop the exchange. CRC mismatches and overruns are counted, traced and
//! logged, and the next frame proceeds as usual.
//!
//! Interrupt handlers reach the endpoints through [`InterruptSource`] adapters, which
//! are registered with a [`Dispatcher`](crate::driver::interrupt::Dispatcher). The
//! periodic refresh runs as a scheduler timer task:
//!
//! ```ignore
//! Task::Refresh => {
//!     worker.refresh();
//!     scheduler.restart(refresh_timer);
//! }
//! ```

use heapless::Vec;

use crate::buffer::{BufferRef, Layout};
use crate::config::TRACE_DEPTH;
use crate::core::{ChunkKind, WorkerId};
use crate::crc::TABLE;
use crate::driver::interrupt::InterruptSource;
use crate::driver::peripheral::{DmaChannel, Indicator, SpiReceiver};
use crate::frame::{Frame, FrameMut};

mod controller;
mod diagnostics;
mod worker;

pub use controller::Controller;
pub use diagnostics::{Snapshot, TraceEvent};
pub use worker::{ChipSelectSource, Worker};

use diagnostics::Recorder;

/// Peripheral set driven by an endpoint
pub trait Peripherals {
    type Tx: DmaChannel;
    type Rx: DmaChannel;
    type Spi: SpiReceiver;
    type Indicator: Indicator;

    fn tx(&mut self) -> &mut Self::Tx;
    fn rx(&mut self) -> &mut Self::Rx;
    fn spi(&mut self) -> &mut Self::Spi;
    fn indicator(&mut self) -> &mut Self::Indicator;
}

/// Plain [`Peripherals`] bundle
pub struct Ports<T, R, S, L> {
    pub tx: T,
    pub rx: R,
    pub spi: S,
    pub indicator: L,
}

impl<T: DmaChannel, R: DmaChannel, S: SpiReceiver, L: Indicator> Peripherals for Ports<T, R, S, L> {
    type Tx = T;
    type Rx = R;
    type Spi = S;
    type Indicator = L;

    fn tx(&mut self) -> &mut T {
        &mut self.tx
    }

    fn rx(&mut self) -> &mut R {
        &mut self.rx
    }

    fn spi(&mut self) -> &mut S {
        &mut self.spi
    }

    fn indicator(&mut self) -> &mut L {
        &mut self.indicator
    }
}

/// Transfer state shared by both roles
pub(crate) struct Channel<P> {
    pub(crate) ports: P,
    pending_tx: bool,
    pending_rx: bool,
    pub(crate) recorder: Recorder,
}

impl<P: Peripherals> Channel<P> {
    pub(crate) fn new(ports: P) -> Self {
        Self {
            ports,
            pending_tx: false,
            pending_rx: false,
            recorder: Recorder::new(),
        }
    }

    /// Arms both DMA channels. Returns true on overrun.
    ///
    /// Channels still busy with the previous transfer are halted first.
    pub(crate) fn arm(&mut self) -> bool {
        let overrun = self.pending_tx || self.pending_rx;
        if overrun {
            self.recorder.record(TraceEvent::Overrun);
            self.ports.tx().stop();
            self.ports.rx().stop();
        }
        self.pending_tx = true;
        self.pending_rx = true;
        self.ports.spi().enable();
        self.ports.tx().start();
        self.ports.rx().start();
        overrun
    }

    pub(crate) fn latch_remaining(&mut self) -> [u16; 2] {
        [self.ports.tx().remaining(), self.ports.rx().remaining()]
    }

    pub(crate) fn complete_tx(&mut self) {
        self.pending_tx = false;
        self.recorder.record(TraceEvent::TxComplete);
    }

    pub(crate) fn complete_rx(&mut self) {
        self.pending_rx = false;
        self.ports.rx().stop();
        let spi = self.ports.spi();
        spi.disable();
        spi.reset_fifo();
        self.recorder.record(TraceEvent::RxComplete);
    }

    pub(crate) fn toggle_indicator(&mut self) {
        self.ports.indicator().toggle();
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending_tx || self.pending_rx
    }
}

/// Verifies one received chunk.
///
/// # Safety
///
/// The receive DMA channel must not be writing to the chunk.
pub(crate) unsafe fn check_chunk(
    layout: &Layout,
    buffer: BufferRef<'_>,
    kind: ChunkKind,
    worker: WorkerId,
) -> bool {
    // SAFETY: guaranteed by the caller
    let words = unsafe { buffer.words(layout.chunk(kind, worker)) };
    let frame = unwrap!(Frame::new(words));
    match frame.verify(&TABLE) {
        Ok(()) => true,
        Err(mismatch) => {
            warn!(
                "crc mismatch in {:?} chunk of worker {}: stored {}, computed {}",
                kind,
                worker.into_u8(),
                mismatch.stored,
                mismatch.computed
            );
            false
        }
    }
}

/// Restamps one locally owned chunk.
///
/// # Safety
///
/// The transmit DMA channel must not be reading the chunk.
pub(crate) unsafe fn stamp_chunk(
    layout: &Layout,
    buffer: BufferRef<'_>,
    kind: ChunkKind,
    worker: WorkerId,
) -> u16 {
    // SAFETY: guaranteed by the caller
    let words = unsafe { buffer.words_mut(layout.chunk(kind, worker)) };
    unwrap!(FrameMut::new(words)).stamp(&TABLE)
}

/// Frame exchange endpoint
pub trait Endpoint {
    /// Transmit DMA completion handler
    fn on_tx_complete(&self);

    /// Receive DMA completion handler. Returns the number of corrupted chunks.
    fn on_rx_complete(&self) -> usize;

    /// Periodic refresh: restamps owned chunks and toggles the liveness indicator.
    fn refresh(&self);

    fn diagnostics(&self) -> Snapshot;

    /// Removes and returns the trace, oldest entry first.
    fn drain_trace(&self) -> Vec<TraceEvent, TRACE_DEPTH>;

    fn tx_complete_source(&self) -> TxCompleteSource<'_, Self>
    where
        Self: Sized,
    {
        TxCompleteSource(self)
    }

    fn rx_complete_source(&self) -> RxCompleteSource<'_, Self>
    where
        Self: Sized,
    {
        RxCompleteSource(self)
    }
}

/// Transmit DMA completion interrupt source
pub struct TxCompleteSource<'a, E>(&'a E);

impl<E: Endpoint> InterruptSource for TxCompleteSource<'_, E> {
    fn on_event(&self) {
        self.0.on_tx_complete();
    }
}

/// Receive DMA completion interrupt source
pub struct RxCompleteSource<'a, E>(&'a E);

impl<E: Endpoint> InterruptSource for RxCompleteSource<'_, E> {
    fn on_event(&self) {
        self.0.on_rx_complete();
    }
}
