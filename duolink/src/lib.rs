//! # Duolink
//!
//! Runtime substrate for dual-core controllers without an operating system: a cooperative
//! two-priority event scheduler with software timers, and a CRC-protected frame exchange
//! that moves setpoints and measurements between cores over a chip-select framed SPI/DMA
//! link. Everything is statically sized; no dynamic memory is used.
//!
//! ## Architecture
//!
//! ```text
//!  hardware tick ──► TickSource ──► ┌───────────────────────┐
//!                                   │       Scheduler       │
//!                                   │ ┌──────────────────┐  │
//!                                   │ │ interrupt queue  │──┼──► tick: timer list walk
//!                                   │ └──────────────────┘  │
//!                                   │ ┌──────────────────┐  │
//!                  timer expiry ───►│ │ normal queue     │──┼──► application tasks
//!                                   │ └──────────────────┘  │        │
//!                                   └───────────────────────┘        │ refresh
//!                                                                    ▼
//!  chip-select edge ──► ChipSelectSource ──►┌──────────────────┐  ┌──────────────┐
//!  DMA completion ────► Tx/RxCompleteSource►│ Worker/Controller│◄►│ SharedBuffer │◄► DMA
//!                                           └──────────────────┘  └──────────────┘
//! ```
//! Components:
//! * _Queue_ is an arena of FIFO queues over stable node indices. It backs the
//!   scheduler queues and the timer list.
//! * _Scheduler_ holds events, timers and their queues. Its dispatch loop drains the
//!   interrupt queue before the normal queue on every pass.
//! * _Timers_ count down in tick granules and post their event on expiry.
//! * _Endpoints_ (worker or controller) run the transfer state machine from interrupt
//!   context and verify received frames.
//! * _Layout_ maps worker identities to chunks of the shared buffer.
//!
//! ## Concurrency model
//!
//! Concurrency comes from interrupt preemption only. Scheduler and endpoint state live
//! behind `embassy_sync` blocking mutexes. With _CriticalSectionRawMutex_ every lock is
//! a short critical section, which makes posting from interrupt handlers safe.
//!
//! Critical sections are bounded: every queue operation is O(1), the timer walk takes
//! one lock per armed timer, and task handlers and CRC computation run outside any lock.
//!
//! The shared buffer is deliberately not locked. DMA only moves data inside the
//! chip-select window, and software reads or stamps chunks outside of it.
//!
//! ## Limitations
//!
//! * The timer list is kept in arming order, so each tick costs O(armed timers).
//! * CRC mismatches are reported, never retried.
//! * A stopped timer that already fired still runs.
#![no_std]

pub use duolink_core as core;
pub use duolink_driver as driver;
pub use duolink_driver::time;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod buffer;
pub mod config;
pub mod crc;
pub mod event;
pub mod frame;
pub mod handshake;
pub mod link;
pub mod queue;
pub mod timer;
mod utils;
