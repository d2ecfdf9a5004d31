//! Duolink driver interface
//!
//! The crate provides an interface between platform peripherals and the Duolink runtime.
//! Limited scope facilitates compatibility across versions.
//! Board support crates should depend on this crate. Duolink users should depend on
//! the `duolink` crate instead.
//!
//! The runtime consumes five kinds of collaborators:
//! * a periodic tick source, delivered as an [`interrupt::InterruptSource`] event
//! * two streaming [`peripheral::DmaChannel`]s, one per transfer direction
//! * a [`peripheral::SpiReceiver`] that can be gated and flushed between frames
//! * a level-readable [`peripheral::DigitalInput`] for the chip-select line
//! * a cross-core [`peripheral::Handshake`] flag used once at bring-up
//!
//! The critical section primitive comes from the `critical-section` crate through
//! `embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex`.
//!
//! Hardware vectors are bound to handlers at run time through a [`interrupt::Dispatcher`].
//! The platform vector table only needs to forward the vector number.

#![no_std]

pub mod interrupt;
pub mod peripheral;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
