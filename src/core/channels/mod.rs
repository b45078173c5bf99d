pub(crate) mod fifo;
pub(crate) mod signal;

use crate::core::errors::SimError;
use crate::core::types::{Edge, ProcessId, SignalId, SignalValue};
use fifo::FifoCell;
use signal::SignalCell;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Storage flavour of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Reports an event only when the committed value differs
    Signal,
    /// Reports an event on every committed write
    Buffer,
    /// Bounded queue
    Fifo,
}

/// A committed change on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Change {
    pub edge: Option<Edge>,
}

/// Type-erased channel stored in the channel table
pub(crate) trait Channel: Any {
    fn name(&self) -> &str;

    fn kind(&self) -> ChannelKind;

    fn value_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    /// Apply staged activity. Returns the change to report, if any.
    fn update(&mut self) -> Option<Change>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Last event seen on a channel, stamped with the commit epoch it happened in
#[derive(Debug, Clone, Copy)]
struct EventStamp {
    epoch: u64,
    edge: Option<Edge>,
}

/// Owns every channel of a simulation and implements the commit step
pub(crate) struct ChannelStore {
    channels: Vec<Box<dyn Channel>>,
    names: HashMap<String, SignalId>,
    dirty: Vec<SignalId>,
    dirty_flags: Vec<bool>,
    last_event: Vec<Option<EventStamp>>,
    /// Bumped on every commit and every time advance; edge helpers compare against it
    epoch: u64,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            names: HashMap::new(),
            dirty: Vec::new(),
            dirty_flags: Vec::new(),
            last_event: Vec::new(),
            epoch: 0,
        }
    }

    /// Add a channel. Names must be unique across the simulation.
    pub fn add(&mut self, channel: Box<dyn Channel>) -> Result<SignalId, SimError> {
        let name = channel.name().to_string();
        if self.names.contains_key(&name) {
            return Err(SimError::binding(name, "a channel with this name already exists"));
        }

        let id = SignalId(self.channels.len());
        self.channels.push(channel);
        self.names.insert(name, id);
        self.dirty_flags.push(false);
        self.last_event.push(None);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn find(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    fn channel(&self, id: SignalId) -> Result<&dyn Channel, SimError> {
        self.channels
            .get(id.0)
            .map(|c| &**c)
            .ok_or_else(|| SimError::binding(format!("channel #{}", id.0), "unknown channel id"))
    }

    pub fn name(&self, id: SignalId) -> &str {
        self.channels.get(id.0).map(|c| c.name()).unwrap_or("<unknown>")
    }

    pub fn kind(&self, id: SignalId) -> Result<ChannelKind, SimError> {
        Ok(self.channel(id)?.kind())
    }

    pub fn value_type(&self, id: SignalId) -> Result<(TypeId, &'static str), SimError> {
        let channel = self.channel(id)?;
        Ok((channel.value_type(), channel.type_name()))
    }

    /// Edge filters are only meaningful on `bool` signals and buffers
    pub fn supports_edges(&self, id: SignalId) -> bool {
        self.channel(id)
            .map(|c| c.kind() != ChannelKind::Fifo && c.value_type() == TypeId::of::<bool>())
            .unwrap_or(false)
    }

    fn mismatch<T: 'static>(channel: &dyn Channel) -> SimError {
        SimError::TypeMismatch {
            name: channel.name().to_string(),
            expected: std::any::type_name::<T>(),
            found: channel.type_name(),
        }
    }

    pub fn signal<T: SignalValue>(&self, id: SignalId) -> Result<&SignalCell<T>, SimError> {
        let channel = self.channel(id)?;
        channel
            .as_any()
            .downcast_ref::<SignalCell<T>>()
            .ok_or_else(|| Self::mismatch::<T>(channel))
    }

    fn signal_mut<T: SignalValue>(&mut self, id: SignalId) -> Result<&mut SignalCell<T>, SimError> {
        let channel = self
            .channels
            .get_mut(id.0)
            .ok_or_else(|| SimError::binding(format!("channel #{}", id.0), "unknown channel id"))?;
        if channel.as_any().downcast_ref::<SignalCell<T>>().is_none() {
            return Err(Self::mismatch::<T>(&**channel));
        }
        channel
            .as_any_mut()
            .downcast_mut::<SignalCell<T>>()
            .ok_or_else(|| SimError::Config("channel changed type during downcast".to_string()))
    }

    pub fn fifo<T: 'static>(&self, id: SignalId) -> Result<&FifoCell<T>, SimError> {
        let channel = self.channel(id)?;
        channel
            .as_any()
            .downcast_ref::<FifoCell<T>>()
            .ok_or_else(|| Self::mismatch::<T>(channel))
    }

    pub fn fifo_mut<T: 'static>(&mut self, id: SignalId) -> Result<&mut FifoCell<T>, SimError> {
        let channel = self
            .channels
            .get_mut(id.0)
            .ok_or_else(|| SimError::binding(format!("channel #{}", id.0), "unknown channel id"))?;
        if channel.as_any().downcast_ref::<FifoCell<T>>().is_none() {
            return Err(Self::mismatch::<T>(&**channel));
        }
        channel
            .as_any_mut()
            .downcast_mut::<FifoCell<T>>()
            .ok_or_else(|| SimError::Config("channel changed type during downcast".to_string()))
    }

    /// Stage a signal write and mark the signal dirty
    pub fn stage<T: SignalValue>(
        &mut self,
        id: SignalId,
        value: T,
        writer: Option<(ProcessId, &str)>,
    ) -> Result<(), SimError> {
        self.signal_mut::<T>(id)?.stage(value, writer)?;
        self.mark_dirty(id);
        Ok(())
    }

    pub fn mark_dirty(&mut self, id: SignalId) {
        if let Some(flag) = self.dirty_flags.get_mut(id.0) {
            if !*flag {
                *flag = true;
                self.dirty.push(id);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Commit every staged write. Returns the channels that changed, in the
    /// order they were first written during the delta cycle.
    pub fn commit(&mut self) -> Vec<(SignalId, Change)> {
        self.epoch += 1;
        let mut changes = Vec::new();

        for id in std::mem::take(&mut self.dirty) {
            self.dirty_flags[id.0] = false;
            if let Some(change) = self.channels[id.0].update() {
                self.last_event[id.0] = Some(EventStamp {
                    epoch: self.epoch,
                    edge: change.edge,
                });
                changes.push((id, change));
            }
        }

        changes
    }

    /// Start a new time instant; events from earlier instants stop counting
    /// as "just happened".
    pub fn begin_instant(&mut self) {
        self.epoch += 1;
    }

    /// Event seen in the commit that immediately preceded the current
    /// evaluation, if any. The inner option carries the edge.
    pub fn last_event(&self, id: SignalId) -> Option<Option<Edge>> {
        self.last_event
            .get(id.0)
            .copied()
            .flatten()
            .filter(|stamp| stamp.epoch == self.epoch)
            .map(|stamp| stamp.edge)
    }
}
