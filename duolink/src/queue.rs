//! Fixed-capacity arena of FIFO queues
//!
//! Queue heads and member nodes share one index space. Every queue is a circular doubly
//! linked list closed by a sentinel slot; a node outside any queue links to itself.
//! Each node also records the queue it belongs to, so "is this node queued, and where"
//! and "what comes after it" are answered in O(1).
//!
//! A node belongs to at most one queue. Pushing a queued node leaves every queue unchanged
//! and reports [`AlreadyQueued`].
//!
//! All operations are O(1) and never allocate. [`QueueSet::next`] returns `None` for the
//! last member, which lets a caller capture the successor before removing the current
//! node and keep walking:
//!
//! ```
//! use duolink::queue::{NodeId, QueueId, QueueSet};
//!
//! const ARMED: QueueId = QueueId::new(0);
//! let mut queues = QueueSet::<1, 4>::new();
//! for node in 0..4 {
//!     queues.push_back(ARMED, NodeId::new(node)).unwrap();
//! }
//!
//! let mut cursor = queues.front(ARMED);
//! while let Some(node) = cursor {
//!     cursor = queues.next(node);
//!     if node.into_u8() % 2 == 0 {
//!         queues.remove(node);
//!     }
//! }
//! assert_eq!(queues.front(ARMED), Some(NodeId::new(1)));
//! ```

use crate::utils::DuplexArray;

pub const MAX_CAPACITY: usize = u8::MAX as usize + 1;

/// Index of a queue within a [`QueueSet`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueId(u8);

impl QueueId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

/// Index of a node within a [`QueueSet`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(u8);

impl NodeId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Push of a node that is already a member of some queue
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlreadyQueued {
    /// Queue currently holding the node
    pub queue: QueueId,
}

struct Link {
    next: u8,
    prev: u8,
}

struct CycleList<const N1: usize, const N2: usize> {
    links: DuplexArray<Link, N1, N2>,
}

impl<const N1: usize, const N2: usize> CycleList<N1, N2> {
    const _ASSERT: usize = MAX_CAPACITY - N1 - N2;

    fn new() -> Self {
        let _ = Self::_ASSERT;
        Self {
            links: DuplexArray::from_fn(|i| {
                let node = unwrap!(u8::try_from(i));
                Link {
                    next: node,
                    prev: node,
                }
            }),
        }
    }

    fn next(&self, node: u8) -> u8 {
        self.links[usize::from(node)].next
    }

    fn prev(&self, node: u8) -> u8 {
        self.links[usize::from(node)].prev
    }

    fn unbind(&mut self, node: u8) {
        let next = self.links[usize::from(node)].next;
        let prev = self.links[usize::from(node)].prev;
        self.links[usize::from(node)].prev = node;
        self.links[usize::from(node)].next = node;
        self.links[usize::from(next)].prev = prev;
        self.links[usize::from(prev)].next = next;
    }

    fn link_before(&mut self, node: u8, next: u8) {
        let prev = self.links[usize::from(next)].prev;
        self.links[usize::from(node)].next = next;
        self.links[usize::from(node)].prev = prev;
        self.links[usize::from(next)].prev = node;
        self.links[usize::from(prev)].next = node;
    }
}

/// `QUEUE_COUNT` FIFO queues sharing a pool of `NODE_COUNT` nodes
pub struct QueueSet<const QUEUE_COUNT: usize, const NODE_COUNT: usize> {
    links: CycleList<QUEUE_COUNT, NODE_COUNT>,
    membership: [Option<QueueId>; NODE_COUNT],
}

impl<const QUEUE_COUNT: usize, const NODE_COUNT: usize> QueueSet<QUEUE_COUNT, NODE_COUNT> {
    const NODE_OFFSET: u8 = QUEUE_COUNT as u8;

    /// Creates empty queues with every node unqueued.
    pub fn new() -> Self {
        Self {
            links: CycleList::new(),
            membership: [None; NODE_COUNT],
        }
    }

    fn slot(node: NodeId) -> u8 {
        assert!(node.index() < NODE_COUNT);
        Self::NODE_OFFSET + node.0
    }

    fn node(slot: u8) -> Option<NodeId> {
        slot.checked_sub(Self::NODE_OFFSET).map(NodeId)
    }

    fn sentinel(queue: QueueId) -> u8 {
        assert!(usize::from(queue.0) < QUEUE_COUNT);
        queue.0
    }

    /// Returns the node to the unqueued state, detaching it from any queue.
    pub fn reset_node(&mut self, node: NodeId) {
        self.remove(node);
    }

    pub fn is_empty(&self, queue: QueueId) -> bool {
        self.front(queue).is_none()
    }

    pub fn front(&self, queue: QueueId) -> Option<NodeId> {
        Self::node(self.links.next(Self::sentinel(queue)))
    }

    pub fn back(&self, queue: QueueId) -> Option<NodeId> {
        Self::node(self.links.prev(Self::sentinel(queue)))
    }

    /// Successor of a queued node
    ///
    /// Returns `None` if the node is the last member or is not queued at all.
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        let slot = Self::slot(node);
        self.membership[node.index()]?;
        Self::node(self.links.next(slot))
    }

    pub fn queue_of(&self, node: NodeId) -> Option<QueueId> {
        assert!(node.index() < NODE_COUNT);
        self.membership[node.index()]
    }

    pub fn contains(&self, queue: QueueId, node: NodeId) -> bool {
        self.queue_of(node) == Some(queue)
    }

    /// Appends an unqueued node to the queue.
    ///
    /// A node that already belongs to a queue stays where it is.
    pub fn push_back(&mut self, queue: QueueId, node: NodeId) -> Result<(), AlreadyQueued> {
        let sentinel = Self::sentinel(queue);
        let slot = Self::slot(node);
        if let Some(current) = self.membership[node.index()] {
            return Err(AlreadyQueued { queue: current });
        }
        self.links.link_before(slot, sentinel);
        self.membership[node.index()] = Some(queue);
        Ok(())
    }

    pub fn pop_front(&mut self, queue: QueueId) -> Option<NodeId> {
        let node = self.front(queue)?;
        Some(self.remove(node))
    }

    /// Detaches the node from its queue. Removing an unqueued node is a no-op.
    pub fn remove(&mut self, node: NodeId) -> NodeId {
        let slot = Self::slot(node);
        self.links.unbind(slot);
        self.membership[node.index()] = None;
        node
    }

    /// Iterates queue members from front to back.
    pub fn iter(&self, queue: QueueId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cursor = self.front(queue);
        core::iter::from_fn(move || {
            let node = cursor?;
            cursor = self.next(node);
            Some(node)
        })
    }
}

impl<const QUEUE_COUNT: usize, const NODE_COUNT: usize> Default
    for QueueSet<QUEUE_COUNT, NODE_COUNT>
{
    fn default() -> Self {
        Self::new()
    }
}
