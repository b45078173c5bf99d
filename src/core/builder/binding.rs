use crate::core::channels::{ChannelKind, ChannelStore};
use crate::core::errors::SimError;
use crate::core::types::{Direction, PortId, SignalId, SignalRef};
use std::any::TypeId;
use std::collections::HashMap;

/// What a port is bound to at elaboration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    Channel(SignalId),
    Port(PortId),
}

/// A declared port and its binding
#[derive(Debug, Clone)]
pub(crate) struct PortSlot {
    pub name: String,
    pub direction: Direction,
    pub value_type: TypeId,
    pub type_name: &'static str,
    pub binding: Option<Binding>,
    /// Channel at the end of the binding chain, filled in by `resolve_all`
    pub resolved: Option<SignalId>,
}

/// Port declarations, bindings and their resolution to channels
pub(crate) struct PortTable {
    slots: Vec<PortSlot>,
    names: HashMap<String, PortId>,
}

impl PortTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn declare(
        &mut self,
        name: String,
        direction: Direction,
        value_type: TypeId,
        type_name: &'static str,
    ) -> Result<PortId, SimError> {
        if self.names.contains_key(&name) {
            return Err(SimError::binding(name, "a port with this name already exists"));
        }

        let id = PortId(self.slots.len());
        self.names.insert(name.clone(), id);
        self.slots.push(PortSlot {
            name,
            direction,
            value_type,
            type_name,
            binding: None,
            resolved: None,
        });
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<PortId> {
        self.names.get(name).copied()
    }

    pub fn slot(&self, id: PortId) -> Result<&PortSlot, SimError> {
        self.slots
            .get(id.0)
            .ok_or_else(|| SimError::binding(format!("port #{}", id.0), "unknown port id"))
    }

    pub fn name(&self, id: PortId) -> &str {
        self.slots.get(id.0).map(|s| s.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Record a binding. A port can only be bound once.
    pub fn bind(&mut self, id: PortId, target: Binding) -> Result<(), SimError> {
        if target == Binding::Port(id) {
            return Err(SimError::binding(self.name(id), "port cannot be bound to itself"));
        }

        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| SimError::binding(format!("port #{}", id.0), "unknown port id"))?;
        if slot.binding.is_some() {
            return Err(SimError::binding(
                slot.name.clone(),
                "port is already bound. Each port must be bound exactly once.",
            ));
        }
        slot.binding = Some(target);
        Ok(())
    }

    /// Follow every binding chain down to a channel and check types.
    ///
    /// Fails on unbound ports, binding cycles, value type mismatches and ports
    /// bound to FIFO channels.
    pub fn resolve_all(&mut self, store: &ChannelStore) -> Result<(), SimError> {
        for index in 0..self.slots.len() {
            let resolved = self.follow(PortId(index))?;
            let slot = &self.slots[index];

            if store.kind(resolved)? == ChannelKind::Fifo {
                return Err(SimError::binding(
                    slot.name.clone(),
                    format!("port is bound to FIFO '{}'; ports carry signals only", store.name(resolved)),
                ));
            }

            let (value_type, type_name) = store.value_type(resolved)?;
            if value_type != slot.value_type {
                return Err(SimError::binding(
                    slot.name.clone(),
                    format!(
                        "type mismatch: port carries {}, signal '{}' carries {}",
                        slot.type_name,
                        store.name(resolved),
                        type_name
                    ),
                ));
            }

            self.slots[index].resolved = Some(resolved);
        }
        Ok(())
    }

    fn follow(&self, start: PortId) -> Result<SignalId, SimError> {
        let mut current = start;
        // A chain longer than the number of ports must revisit one
        for _ in 0..=self.slots.len() {
            let slot = self.slot(current)?;
            match slot.binding {
                Some(Binding::Channel(id)) => return Ok(id),
                Some(Binding::Port(next)) => {
                    let next_slot = self.slot(next)?;
                    if next_slot.value_type != slot.value_type {
                        return Err(SimError::binding(
                            slot.name.clone(),
                            format!(
                                "type mismatch: port carries {}, parent port '{}' carries {}",
                                slot.type_name, next_slot.name, next_slot.type_name
                            ),
                        ));
                    }
                    current = next;
                }
                None => {
                    return Err(SimError::binding(slot.name.clone(), "port is not bound"));
                }
            }
        }
        Err(SimError::binding(self.name(start), "port binding chain forms a cycle"))
    }

    /// Resolve a reference for reading
    pub fn resolve(&self, target: SignalRef) -> Result<SignalId, SimError> {
        match target {
            SignalRef::Channel(id) => Ok(id),
            SignalRef::Port(port) => self.slot(port)?.resolved.ok_or_else(|| {
                SimError::binding(self.name(port), "port is not bound to a signal")
            }),
        }
    }

    /// Resolve a reference for writing; input ports are rejected
    pub fn resolve_for_write(&self, target: SignalRef, process: &str) -> Result<SignalId, SimError> {
        if let SignalRef::Port(port) = target {
            let slot = self.slot(port)?;
            if !slot.direction.can_write() {
                return Err(SimError::WriteViolation {
                    port: slot.name.clone(),
                    process: process.to_string(),
                });
            }
        }
        self.resolve(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channels::fifo::FifoCell;
    use crate::core::channels::signal::SignalCell;
    use crate::core::execution::config::WriterPolicy;

    fn bool_store() -> (ChannelStore, SignalId) {
        let mut store = ChannelStore::new();
        let id = store
            .add(Box::new(SignalCell::new(
                "sig",
                false,
                ChannelKind::Signal,
                WriterPolicy::LastWriteWins,
            )))
            .unwrap();
        (store, id)
    }

    fn declare_bool(table: &mut PortTable, name: &str, direction: Direction) -> PortId {
        table
            .declare(name.to_string(), direction, TypeId::of::<bool>(), "bool")
            .unwrap()
    }

    #[test]
    fn test_hierarchical_chain_resolves() {
        let (store, sig) = bool_store();
        let mut table = PortTable::new();
        let top_in = declare_bool(&mut table, "top.top_in", Direction::In);
        let sub_in = declare_bool(&mut table, "top.sub.in", Direction::In);

        table.bind(sub_in, Binding::Port(top_in)).unwrap();
        table.bind(top_in, Binding::Channel(sig)).unwrap();
        table.resolve_all(&store).unwrap();

        assert_eq!(table.resolve(SignalRef::Port(sub_in)).unwrap(), sig);
    }

    #[test]
    fn test_double_binding_rejected() {
        let (_, sig) = bool_store();
        let mut table = PortTable::new();
        let p = declare_bool(&mut table, "m.p", Direction::In);
        table.bind(p, Binding::Channel(sig)).unwrap();

        let err = table.bind(p, Binding::Channel(sig)).unwrap_err();
        assert!(err.to_string().contains("already bound"));
    }

    #[test]
    fn test_unbound_port_fails_resolution() {
        let (store, _) = bool_store();
        let mut table = PortTable::new();
        declare_bool(&mut table, "m.dangling", Direction::Out);

        let err = table.resolve_all(&store).unwrap_err();
        assert!(err.to_string().contains("not bound"));
    }

    #[test]
    fn test_binding_cycle_detected() {
        let (store, _) = bool_store();
        let mut table = PortTable::new();
        let a = declare_bool(&mut table, "m.a", Direction::In);
        let b = declare_bool(&mut table, "m.b", Direction::In);
        table.bind(a, Binding::Port(b)).unwrap();
        table.bind(b, Binding::Port(a)).unwrap();

        let err = table.resolve_all(&store).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_type_mismatch_detected() {
        let (store, sig) = bool_store();
        let mut table = PortTable::new();
        let p = table
            .declare("m.word".to_string(), Direction::In, TypeId::of::<u16>(), "u16")
            .unwrap();
        table.bind(p, Binding::Channel(sig)).unwrap();

        let err = table.resolve_all(&store).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_port_cannot_bind_fifo() {
        let mut store = ChannelStore::new();
        let fifo = store.add(Box::new(FifoCell::<bool>::new("q", 2))).unwrap();
        let mut table = PortTable::new();
        let p = declare_bool(&mut table, "m.q", Direction::In);
        table.bind(p, Binding::Channel(fifo)).unwrap();

        assert!(table.resolve_all(&store).is_err());
    }

    #[test]
    fn test_write_through_input_port_is_violation() {
        let (store, sig) = bool_store();
        let mut table = PortTable::new();
        let p = declare_bool(&mut table, "m.in", Direction::In);
        table.bind(p, Binding::Channel(sig)).unwrap();
        table.resolve_all(&store).unwrap();

        let err = table.resolve_for_write(SignalRef::Port(p), "m.proc").unwrap_err();
        assert!(matches!(err, SimError::WriteViolation { .. }));
    }
}
