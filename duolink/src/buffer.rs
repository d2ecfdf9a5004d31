//! Shared exchange buffer and its chunk layout
//!
//! The buffer holds `2 × worker_count` chunks. Which chunk carries which worker's
//! setpoint or measurement depends on the role of the local core and is fixed when the
//! [`Layout`] is built. Peers must agree on these formulas exactly.
//!
//! For two workers the chunk indices are:
//!
//! | role       | setpoints (w0, w1) | measurements (w0, w1) |
//! |------------|--------------------|-----------------------|
//! | controller | 1, 0               | 3, 2                  |
//! | worker 0   | 2, 1               | 0, 3                  |
//! | worker 1   | 3, 2               | 1, 0                  |
//!
//! The buffer is never locked. DMA touches it only between chip-select assertion and
//! receive completion; software reads and stamps chunks outside that window.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::Range;
use core::ptr::NonNull;

use crate::config::{Config, HEADER_WORDS};
use crate::core::{ChunkKind, WorkerId};

/// Statically allocated exchange buffer of `W` words
pub struct SharedBuffer<const W: usize> {
    words: UnsafeCell<[u16; W]>,
}

// SAFETY: concurrent access is serialized by the transfer protocol, see module docs
unsafe impl<const W: usize> Sync for SharedBuffer<W> {}

impl<const W: usize> SharedBuffer<W> {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; W]),
        }
    }

    pub const fn len(&self) -> usize {
        W
    }

    pub const fn is_empty(&self) -> bool {
        W == 0
    }

    /// Start address for DMA channel configuration
    pub fn as_mut_ptr(&self) -> *mut u16 {
        self.words.get().cast()
    }

    pub fn get_mut(&mut self) -> &mut [u16; W] {
        self.words.get_mut()
    }

    /// Mutable access to the whole buffer
    ///
    /// # Safety
    ///
    /// No DMA channel, interrupt handler or other reference may access the buffer while
    /// the returned slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn words_mut(&self) -> &mut [u16] {
        // SAFETY: exclusivity guaranteed by the caller
        unsafe { &mut *self.words.get() }
    }

    pub(crate) fn view(&self) -> BufferRef<'_> {
        BufferRef {
            ptr: unwrap!(NonNull::new(self.as_mut_ptr())),
            len: W,
            _marker: PhantomData,
        }
    }
}

impl<const W: usize> Default for SharedBuffer<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Untyped handle to a shared buffer
#[derive(Clone, Copy)]
pub(crate) struct BufferRef<'a> {
    ptr: NonNull<u16>,
    len: usize,
    _marker: PhantomData<&'a UnsafeCell<[u16]>>,
}

// SAFETY: the handle only grants access through unsafe accessors
unsafe impl Send for BufferRef<'_> {}
unsafe impl Sync for BufferRef<'_> {}

impl BufferRef<'_> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    ///
    /// No writer may touch `range` while the returned slice is alive.
    pub(crate) unsafe fn words(&self, range: Range<usize>) -> &[u16] {
        assert!(range.start <= range.end && range.end <= self.len);
        // SAFETY: range checked above, aliasing guaranteed by the caller
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr().add(range.start), range.len()) }
    }

    /// # Safety
    ///
    /// No other reader or writer may touch `range` while the returned slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn words_mut(&self, range: Range<usize>) -> &mut [u16] {
        assert!(range.start <= range.end && range.end <= self.len);
        // SAFETY: range checked above, aliasing guaranteed by the caller
        unsafe {
            core::slice::from_raw_parts_mut(self.ptr.as_ptr().add(range.start), range.len())
        }
    }
}

/// Position of the local core on the link
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Controller,
    Worker(WorkerId),
}

/// Word range streamed by one DMA channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Window {
    pub offset: usize,
    pub len: usize,
}

impl Window {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Layout built for the other role
    Role,
    WorkerCount,
    ChunkSize,
    WorkerId,
    BufferLength,
}

/// Chunk assignment of the local core
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    role: Role,
    worker_count: usize,
    chunk_size: usize,
    total_words: usize,
}

impl Layout {
    pub fn new(config: &Config, role: Role) -> Result<Self, LayoutError> {
        let worker_count = config.worker_count;
        if worker_count == 0 || worker_count > WorkerId::MAX.index() + 1 {
            return Err(LayoutError::WorkerCount);
        }
        if config.chunk_size <= HEADER_WORDS {
            return Err(LayoutError::ChunkSize);
        }
        if let Role::Worker(id) = role {
            if id.index() >= worker_count {
                return Err(LayoutError::WorkerId);
            }
        }
        Ok(Self {
            role,
            worker_count,
            chunk_size: config.chunk_size,
            total_words: config.buffer_words(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn check_buffer_len(&self, len: usize) -> Result<(), LayoutError> {
        if len == self.total_words() {
            Ok(())
        } else {
            Err(LayoutError::BufferLength)
        }
    }

    pub fn workers(&self) -> impl Iterator<Item = WorkerId> + use<> {
        (0..self.worker_count).map(|i| WorkerId::from_u8_truncating(i as u8))
    }

    /// Chunk index holding the worker's setpoint
    pub fn setpoint_chunk(&self, worker: WorkerId) -> usize {
        let n = self.worker_count;
        let w = worker.index();
        assert!(w < n);
        match self.role {
            Role::Controller => n - 1 - w,
            Role::Worker(id) => n - 1 - w + (id.index() + 1),
        }
    }

    /// Chunk index holding the worker's measurement
    pub fn measurement_chunk(&self, worker: WorkerId) -> usize {
        let n = self.worker_count;
        let w = worker.index();
        assert!(w < n);
        match self.role {
            Role::Controller => 2 * n - 1 - w,
            Role::Worker(id) => (2 * n - 1 - w + (id.index() + 1)) % (2 * n),
        }
    }

    /// Word range of the worker's chunk of the given kind
    pub fn chunk(&self, kind: ChunkKind, worker: WorkerId) -> Range<usize> {
        let index = match kind {
            ChunkKind::Setpoint => self.setpoint_chunk(worker),
            ChunkKind::Measurement => self.measurement_chunk(worker),
        };
        index * self.chunk_size..(index + 1) * self.chunk_size
    }

    /// Words streamed out to the peer
    pub fn tx_window(&self) -> Window {
        Window {
            offset: 0,
            len: self.total_words(),
        }
    }

    /// Words filled in by the peer
    pub fn rx_window(&self) -> Window {
        match self.role {
            Role::Controller => Window {
                offset: self.worker_count * self.chunk_size,
                len: self.worker_count * self.chunk_size,
            },
            Role::Worker(_) => Window {
                offset: self.chunk_size,
                len: self.total_words() - self.chunk_size,
            },
        }
    }

    /// Chunks stamped by the local core
    pub fn is_owned(&self, kind: ChunkKind, worker: WorkerId) -> bool {
        match (self.role, kind) {
            (Role::Controller, ChunkKind::Setpoint) => true,
            (Role::Controller, ChunkKind::Measurement) => false,
            (Role::Worker(_), ChunkKind::Setpoint) => false,
            (Role::Worker(id), ChunkKind::Measurement) => id == worker,
        }
    }
}
