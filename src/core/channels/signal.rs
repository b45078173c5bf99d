use super::{Change, Channel, ChannelKind};
use crate::core::execution::config::WriterPolicy;
use crate::core::errors::SimError;
use crate::core::types::{Edge, ProcessId, SignalValue};
use std::any::{Any, TypeId};

/// Storage cell behind a `Signal<T>` handle.
///
/// Writes are staged in `pending` and only become visible at commit.
pub(crate) struct SignalCell<T: SignalValue> {
    name: String,
    current: T,
    pending: Option<T>,
    kind: ChannelKind,
    policy: WriterPolicy,
    /// First process that drove this signal (single-writer policy)
    driver: Option<(ProcessId, String)>,
}

impl<T: SignalValue> SignalCell<T> {
    pub fn new(name: &str, initial: T, kind: ChannelKind, policy: WriterPolicy) -> Self {
        Self {
            name: name.to_string(),
            current: initial,
            pending: None,
            kind,
            policy,
            driver: None,
        }
    }

    /// Current (committed) value
    pub fn read(&self) -> &T {
        &self.current
    }

    /// Stage the next value. `writer` is `None` for writes made by the
    /// simulation owner between runs.
    pub fn stage(&mut self, value: T, writer: Option<(ProcessId, &str)>) -> Result<(), SimError> {
        if let (WriterPolicy::SingleWriter, Some((pid, process))) = (self.policy, writer) {
            if let Some((driver, driver_name)) = &self.driver {
                if *driver != pid {
                    return Err(SimError::MultipleDrivers {
                        signal: self.name.clone(),
                        first: driver_name.clone(),
                        second: process.to_string(),
                    });
                }
            } else {
                self.driver = Some((pid, process.to_string()));
            }
        }

        self.pending = Some(value);
        Ok(())
    }

    fn edge(old: &T, new: &T) -> Option<Edge> {
        let old = (old as &dyn Any).downcast_ref::<bool>()?;
        let new = (new as &dyn Any).downcast_ref::<bool>()?;
        Edge::between(*old, *new)
    }
}

impl<T: SignalValue> Channel for SignalCell<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn update(&mut self) -> Option<Change> {
        let next = self.pending.take()?;

        // Plain signals only report real value changes; buffers report every write
        if next == self.current && self.kind != ChannelKind::Buffer {
            return None;
        }

        let edge = Self::edge(&self.current, &next);
        self.current = next;
        Some(Change { edge })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
