//! Peripheral capabilities consumed by the frame exchange

use duolink_core::Level;

/// Memory-to-peripheral or peripheral-to-memory streaming channel
///
/// Word size, burst length and the memory window are configured by the platform
/// before the channel is handed over. The runtime only triggers and halts transfers:
/// the receive channel is halted once its transfer completes, and both channels are
/// halted before an overrunning transfer is re-armed.
pub trait DmaChannel {
    /// Arms the channel for one transfer over its configured window.
    fn start(&mut self);

    /// Halts the channel. A halted channel may be started again.
    fn stop(&mut self);

    /// Words left to move in the current transfer
    fn remaining(&self) -> u16;
}

/// Receive side of a serial peripheral
pub trait SpiReceiver {
    fn enable(&mut self);

    fn disable(&mut self);

    /// Drops any words held in the receive FIFO.
    fn reset_fifo(&mut self);
}

/// Level-readable digital input
///
/// Edge notification is delivered separately, through an interrupt source.
pub trait DigitalInput {
    fn level(&mut self) -> Level;
}

/// Liveness indicator, usually an LED
pub trait Indicator {
    fn toggle(&mut self);
}

/// Cross-core handshake flag
///
/// One core raises the flag; the other polls it and acknowledges.
pub trait Handshake {
    fn is_raised(&mut self) -> bool;

    fn acknowledge(&mut self);

    fn raise(&mut self);
}

impl<T: DmaChannel + ?Sized> DmaChannel for &mut T {
    fn start(&mut self) {
        T::start(self)
    }

    fn stop(&mut self) {
        T::stop(self)
    }

    fn remaining(&self) -> u16 {
        T::remaining(self)
    }
}

impl<T: SpiReceiver + ?Sized> SpiReceiver for &mut T {
    fn enable(&mut self) {
        T::enable(self)
    }

    fn disable(&mut self) {
        T::disable(self)
    }

    fn reset_fifo(&mut self) {
        T::reset_fifo(self)
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for &mut T {
    fn level(&mut self) -> Level {
        T::level(self)
    }
}

impl<T: Indicator + ?Sized> Indicator for &mut T {
    fn toggle(&mut self) {
        T::toggle(self)
    }
}

impl<T: Handshake + ?Sized> Handshake for &mut T {
    fn is_raised(&mut self) -> bool {
        T::is_raised(self)
    }

    fn acknowledge(&mut self) {
        T::acknowledge(self)
    }

    fn raise(&mut self) {
        T::raise(self)
    }
}
