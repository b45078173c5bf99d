use super::{Change, Channel, ChannelKind};
use std::any::{Any, TypeId};
use std::collections::VecDeque;

/// Bounded FIFO channel with deferred update semantics.
///
/// Items written in a delta cycle become readable after the commit, and slots
/// freed by reads become writable after the commit. Either kind of activity
/// produces one event at commit time.
pub(crate) struct FifoCell<T: 'static> {
    name: String,
    capacity: usize,
    items: VecDeque<T>,
    staged: Vec<T>,
    /// Slots freed by reads in the current delta cycle
    freed: usize,
}

impl<T: 'static> FifoCell<T> {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            items: VecDeque::with_capacity(capacity),
            staged: Vec::new(),
            freed: 0,
        }
    }

    /// Items readable right now
    pub fn num_available(&self) -> usize {
        self.items.len()
    }

    /// Slots writable right now
    pub fn num_free(&self) -> usize {
        self.capacity
            .saturating_sub(self.items.len() + self.staged.len() + self.freed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stage a write. Returns false when the FIFO is full.
    pub fn try_write(&mut self, value: T) -> bool {
        if self.num_free() == 0 {
            return false;
        }
        self.staged.push(value);
        true
    }

    /// Take the oldest committed item, if any
    pub fn try_read(&mut self) -> Option<T> {
        let value = self.items.pop_front()?;
        self.freed += 1;
        Some(value)
    }
}

impl<T: 'static> Channel for FifoCell<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Fifo
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn update(&mut self) -> Option<Change> {
        if self.staged.is_empty() && self.freed == 0 {
            return None;
        }
        self.items.extend(self.staged.drain(..));
        self.freed = 0;
        Some(Change { edge: None })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
