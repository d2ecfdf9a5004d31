//! Build-time configuration

use crate::time::Duration;

/// Number of worker cores on the link
pub const WORKER_COUNT: usize = 2;

/// Words per chunk, including the frame header
pub const CHUNK_SIZE: usize = 32;

/// Words occupied by the frame header
pub const HEADER_WORDS: usize = 1;

/// Size of the shared buffer in words
pub const BUFFER_WORDS: usize = 2 * WORKER_COUNT * CHUNK_SIZE;

/// Period of the hardware tick driving the software timers
pub const TICK_GRANULARITY: Duration = Duration::from_micros(100);

/// Period of the worker CRC refresh timer
pub const WORKER_REFRESH_PERIOD: Duration = Duration::from_millis(500);

/// Period of the controller CRC refresh timer, which also paces transfers
pub const CONTROLLER_REFRESH_PERIOD: Duration = Duration::from_millis(100);

/// Controller refreshes between two heartbeat trace markers
pub const HEARTBEAT_INTERVAL: u32 = 20;

/// Capacity of the diagnostic trace ring
pub const TRACE_DEPTH: usize = 64;

/// Runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Number of worker cores on the link
    pub worker_count: usize,
    /// Words per chunk, including the frame header
    pub chunk_size: usize,
    /// Period of the hardware tick
    pub tick_granularity: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: WORKER_COUNT,
            chunk_size: CHUNK_SIZE,
            tick_granularity: TICK_GRANULARITY,
        }
    }
}

impl Config {
    /// Size of the shared buffer in words
    pub const fn buffer_words(&self) -> usize {
        2 * self.worker_count * self.chunk_size
    }
}
