use super::binding::{Binding, PortTable};
use crate::core::channels::fifo::FifoCell;
use crate::core::channels::signal::SignalCell;
use crate::core::channels::{ChannelKind, ChannelStore};
use crate::core::clock::{Clock, ClockDriver, ClockSpec};
use crate::core::errors::SimError;
use crate::core::execution::config::{SimulationConfig, WriterPolicy};
use crate::core::execution::simulation_engine::Simulation;
use crate::core::process::{
    ProcessBody, ProcessContext, ProcessEntry, Sensitivity, Suspend, ThreadProcess, WaitState,
};
use crate::core::types::{Direction, Fifo, Port, ProcessId, Signal, SignalValue};
use log::{debug, info};
use std::any::TypeId;
use std::collections::HashSet;

/// A process registered during elaboration, before its triggers are resolved
struct PendingProcess {
    name: String,
    module: String,
    body: ProcessBody,
    sensitivity: Sensitivity,
}

/// Imperative API for describing a design: channels, clocks, modules, ports,
/// bindings and processes. `build` checks the whole netlist and produces a
/// runnable [`Simulation`].
pub struct SimulationBuilder {
    config: SimulationConfig,
    store: ChannelStore,
    ports: PortTable,
    processes: Vec<PendingProcess>,
    process_names: HashSet<String>,
    modules: HashSet<String>,
    clocks: Vec<Clock>,
}

impl SimulationBuilder {
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    pub fn with_config(config: SimulationConfig) -> Self {
        Self {
            config,
            store: ChannelStore::new(),
            ports: PortTable::new(),
            processes: Vec::new(),
            process_names: HashSet::new(),
            modules: HashSet::new(),
            clocks: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Create a top-level signal with the default writer policy
    pub fn signal<T: SignalValue>(&mut self, name: &str, initial: T) -> Result<Signal<T>, SimError> {
        let policy = self.config.default_writer_policy;
        self.add_signal(checked_name(name)?, initial, ChannelKind::Signal, policy)
    }

    pub fn signal_with_policy<T: SignalValue>(
        &mut self,
        name: &str,
        initial: T,
        policy: WriterPolicy,
    ) -> Result<Signal<T>, SimError> {
        self.add_signal(checked_name(name)?, initial, ChannelKind::Signal, policy)
    }

    /// Create a buffer: like a signal, but every committed write is an event
    pub fn buffer<T: SignalValue>(&mut self, name: &str, initial: T) -> Result<Signal<T>, SimError> {
        let policy = self.config.default_writer_policy;
        self.add_signal(checked_name(name)?, initial, ChannelKind::Buffer, policy)
    }

    pub fn fifo<T: 'static>(&mut self, name: &str, capacity: usize) -> Result<Fifo<T>, SimError> {
        self.add_fifo(checked_name(name)?, capacity)
    }

    /// Create a clock. Its signal starts at the level opposite to the first
    /// edge, so that edge is a real transition.
    pub fn clock(&mut self, name: &str, spec: ClockSpec) -> Result<Clock, SimError> {
        spec.phases()?;
        let signal = self.add_signal(
            checked_name(name)?,
            !spec.posedge_first,
            ChannelKind::Signal,
            WriterPolicy::LastWriteWins,
        )?;
        let clock = Clock::new(signal, spec);
        self.clocks.push(clock.clone());
        Ok(clock)
    }

    /// Open a top-level module
    pub fn module(&mut self, name: &str) -> Result<ModuleBuilder<'_>, SimError> {
        let path = checked_name(name)?;
        self.register_module(path.clone())?;
        Ok(ModuleBuilder { sim: self, path })
    }

    /// Bind a port to a signal
    pub fn bind<T: SignalValue>(&mut self, port: &Port<T>, signal: &Signal<T>) -> Result<(), SimError> {
        self.ports.bind(port.id, Binding::Channel(signal.id))
    }

    /// Bind a child port to a port of an enclosing module
    pub fn bind_port<T: SignalValue>(&mut self, port: &Port<T>, parent: &Port<T>) -> Result<(), SimError> {
        self.ports.bind(port.id, Binding::Port(parent.id))
    }

    /// Bind by hierarchical names. `target` may name a channel or another port.
    pub fn bind_by_name(&mut self, port: &str, target: &str) -> Result<(), SimError> {
        let port_id = self
            .ports
            .find(port)
            .ok_or_else(|| SimError::binding(port, "no port with this name"))?;
        let value_type = self.ports.slot(port_id)?.value_type;

        let (binding, found_type) = if let Some(id) = self.store.find(target) {
            (Binding::Channel(id), self.store.value_type(id)?.0)
        } else if let Some(id) = self.ports.find(target) {
            (Binding::Port(id), self.ports.slot(id)?.value_type)
        } else {
            return Err(SimError::binding(
                port,
                format!("no signal or port named '{}'", target),
            ));
        };

        if found_type != value_type {
            return Err(SimError::binding(
                port,
                format!("type mismatch with '{}'", target),
            ));
        }
        self.ports.bind(port_id, binding)
    }

    /// Check the netlist and produce a runnable simulation.
    ///
    /// Every port must resolve to a signal of its own value type and edge
    /// sensitivity is only accepted on `bool` signals.
    pub fn build(mut self) -> Result<Simulation, SimError> {
        self.config.validate()?;
        self.ports.resolve_all(&self.store)?;

        let mut processes = Vec::with_capacity(self.processes.len());
        for pending in self.processes {
            let mut sensitivity = Vec::new();
            for trigger in &pending.sensitivity.triggers {
                let id = self.ports.resolve(trigger.target)?;
                if trigger.edge.is_some() && !self.store.supports_edges(id) {
                    return Err(SimError::binding(
                        pending.name.clone(),
                        format!(
                            "edge sensitivity on '{}' requires a bool signal",
                            self.store.name(id)
                        ),
                    ));
                }
                if !sensitivity.contains(&(id, trigger.edge)) {
                    sensitivity.push((id, trigger.edge));
                }
            }

            processes.push(ProcessEntry {
                name: pending.name,
                module: pending.module,
                body: pending.body,
                sensitivity,
                initialize: !pending.sensitivity.dont_initialize,
                wait: WaitState::Ready,
            });
        }

        let mut drivers = Vec::with_capacity(self.clocks.len());
        for clock in &self.clocks {
            drivers.push(ClockDriver::new(clock)?);
        }

        info!(
            "Elaborated {} channels, {} ports, {} processes, {} clocks",
            self.store.len(),
            self.ports.len(),
            processes.len(),
            drivers.len()
        );

        Ok(Simulation::new(
            self.config,
            self.store,
            self.ports,
            processes,
            drivers,
        ))
    }

    fn add_signal<T: SignalValue>(
        &mut self,
        name: String,
        initial: T,
        kind: ChannelKind,
        policy: WriterPolicy,
    ) -> Result<Signal<T>, SimError> {
        let cell = SignalCell::new(&name, initial, kind, policy);
        let id = self.store.add(Box::new(cell))?;
        debug!("Created {:?} '{}'", kind, name);
        Ok(Signal::new(id))
    }

    fn add_fifo<T: 'static>(&mut self, name: String, capacity: usize) -> Result<Fifo<T>, SimError> {
        if capacity == 0 {
            return Err(SimError::Config(format!(
                "FIFO '{}' needs a capacity of at least 1",
                name
            )));
        }
        let id = self.store.add(Box::new(FifoCell::<T>::new(&name, capacity)))?;
        debug!("Created FIFO '{}' with capacity {}", name, capacity);
        Ok(Fifo::new(id))
    }

    fn register_module(&mut self, path: String) -> Result<(), SimError> {
        if !self.modules.insert(path.clone()) {
            return Err(SimError::binding(path, "a module with this name already exists"));
        }
        Ok(())
    }

    fn add_process(
        &mut self,
        module: &str,
        name: &str,
        body: ProcessBody,
        sensitivity: Sensitivity,
    ) -> Result<ProcessId, SimError> {
        let full_name = join(module, name)?;
        if !self.process_names.insert(full_name.clone()) {
            return Err(SimError::binding(
                full_name,
                "a process with this name already exists",
            ));
        }

        let id = ProcessId(self.processes.len());
        debug!("Registered {:?} process '{}'", body.kind(), full_name);
        self.processes.push(PendingProcess {
            name: full_name,
            module: module.to_string(),
            body,
            sensitivity,
        });
        Ok(id)
    }
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope for declaring the contents of one module instance. Everything
/// created through it is named `<module path>.<name>`.
pub struct ModuleBuilder<'a> {
    sim: &'a mut SimulationBuilder,
    path: String,
}

impl<'a> ModuleBuilder<'a> {
    /// Hierarchical name of this module
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open a child module
    pub fn child(&mut self, name: &str) -> Result<ModuleBuilder<'_>, SimError> {
        let path = join(&self.path, name)?;
        self.sim.register_module(path.clone())?;
        Ok(ModuleBuilder {
            sim: &mut *self.sim,
            path,
        })
    }

    pub fn signal<T: SignalValue>(&mut self, name: &str, initial: T) -> Result<Signal<T>, SimError> {
        let policy = self.sim.config.default_writer_policy;
        let full = join(&self.path, name)?;
        self.sim.add_signal(full, initial, ChannelKind::Signal, policy)
    }

    pub fn signal_with_policy<T: SignalValue>(
        &mut self,
        name: &str,
        initial: T,
        policy: WriterPolicy,
    ) -> Result<Signal<T>, SimError> {
        let full = join(&self.path, name)?;
        self.sim.add_signal(full, initial, ChannelKind::Signal, policy)
    }

    pub fn buffer<T: SignalValue>(&mut self, name: &str, initial: T) -> Result<Signal<T>, SimError> {
        let policy = self.sim.config.default_writer_policy;
        let full = join(&self.path, name)?;
        self.sim.add_signal(full, initial, ChannelKind::Buffer, policy)
    }

    pub fn fifo<T: 'static>(&mut self, name: &str, capacity: usize) -> Result<Fifo<T>, SimError> {
        let full = join(&self.path, name)?;
        self.sim.add_fifo(full, capacity)
    }

    pub fn in_port<T: SignalValue>(&mut self, name: &str) -> Result<Port<T>, SimError> {
        self.port(name, Direction::In)
    }

    pub fn out_port<T: SignalValue>(&mut self, name: &str) -> Result<Port<T>, SimError> {
        self.port(name, Direction::Out)
    }

    pub fn inout_port<T: SignalValue>(&mut self, name: &str) -> Result<Port<T>, SimError> {
        self.port(name, Direction::InOut)
    }

    fn port<T: SignalValue>(&mut self, name: &str, direction: Direction) -> Result<Port<T>, SimError> {
        let full = join(&self.path, name)?;
        let id = self.sim.ports.declare(
            full,
            direction,
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
        )?;
        Ok(Port::new(id, direction))
    }

    pub fn bind<T: SignalValue>(&mut self, port: &Port<T>, signal: &Signal<T>) -> Result<(), SimError> {
        self.sim.bind(port, signal)
    }

    pub fn bind_port<T: SignalValue>(&mut self, port: &Port<T>, parent: &Port<T>) -> Result<(), SimError> {
        self.sim.bind_port(port, parent)
    }

    /// Bind by full hierarchical names
    pub fn bind_by_name(&mut self, port: &str, target: &str) -> Result<(), SimError> {
        self.sim.bind_by_name(port, target)
    }

    /// Register a method process: runs to completion on every activation
    pub fn method<F>(&mut self, name: &str, sensitivity: Sensitivity, body: F) -> Result<ProcessId, SimError>
    where
        F: FnMut(&mut ProcessContext<'_>) -> Result<(), SimError> + 'static,
    {
        self.sim
            .add_process(&self.path, name, ProcessBody::Method(Box::new(body)), sensitivity)
    }

    /// Register a thread process written as a closure. Each call resumes the
    /// thread and returns the next suspension point.
    pub fn thread<F>(&mut self, name: &str, sensitivity: Sensitivity, body: F) -> Result<ProcessId, SimError>
    where
        F: FnMut(&mut ProcessContext<'_>) -> Result<Suspend, SimError> + 'static,
    {
        self.thread_process(name, sensitivity, body)
    }

    /// Register a thread process implemented as a state machine
    pub fn thread_process<P>(&mut self, name: &str, sensitivity: Sensitivity, body: P) -> Result<ProcessId, SimError>
    where
        P: ThreadProcess + 'static,
    {
        self.sim
            .add_process(&self.path, name, ProcessBody::Thread(Box::new(body)), sensitivity)
    }
}

fn checked_name(name: &str) -> Result<String, SimError> {
    if name.is_empty() || name.contains('.') {
        return Err(SimError::binding(
            name,
            "names must be non-empty and must not contain '.'",
        ));
    }
    Ok(name.to_string())
}

fn join(path: &str, name: &str) -> Result<String, SimError> {
    Ok(format!("{}.{}", path, checked_name(name)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ClockSpec;

    fn noop_method(_ctx: &mut ProcessContext<'_>) -> Result<(), SimError> {
        Ok(())
    }

    #[test]
    fn test_hierarchical_names() {
        let mut sim = SimulationBuilder::new();
        let mut top = sim.module("top").unwrap();
        let mut sub = top.child("sub").unwrap();
        assert_eq!(sub.path(), "top.sub");
        sub.signal("wire", 0u8).unwrap();
        sub.in_port::<bool>("a").unwrap();

        assert!(sim.store.find("top.sub.wire").is_some());
        assert!(sim.ports.find("top.sub.a").is_some());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut sim = SimulationBuilder::new();
        sim.signal("x", false).unwrap();
        assert!(sim.signal("x", true).is_err());

        sim.module("m").unwrap();
        assert!(sim.module("m").is_err());

        let mut m = sim.module("n").unwrap();
        m.method("p", Sensitivity::new(), noop_method).unwrap();
        let err = m.method("p", Sensitivity::new(), noop_method).unwrap_err();
        assert!(err.to_string().contains("n.p"));
    }

    #[test]
    fn test_dotted_name_rejected() {
        let mut sim = SimulationBuilder::new();
        assert!(sim.signal("a.b", 0u32).is_err());
        assert!(sim.module("").is_err());
    }

    #[test]
    fn test_zero_capacity_fifo_rejected() {
        let mut sim = SimulationBuilder::new();
        let err = sim.fifo::<u32>("q", 0).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_unbound_port_fails_build() {
        let mut sim = SimulationBuilder::new();
        sim.module("m").unwrap().out_port::<u32>("y").unwrap();
        let err = sim.build().err().unwrap();
        assert!(matches!(err, SimError::Binding { .. }));
        assert!(err.to_string().contains("m.y"));
    }

    #[test]
    fn test_bind_by_name_checks_types() {
        let mut sim = SimulationBuilder::new();
        sim.signal("word", 0u16).unwrap();
        sim.signal("flag", false).unwrap();
        sim.module("m").unwrap().in_port::<bool>("en").unwrap();

        assert!(sim.bind_by_name("m.en", "word").is_err());
        assert!(sim.bind_by_name("m.en", "missing").is_err());
        sim.bind_by_name("m.en", "flag").unwrap();
        assert!(sim.build().is_ok());
    }

    #[test]
    fn test_edge_sensitivity_needs_bool() {
        let mut sim = SimulationBuilder::new();
        let count = sim.signal("count", 0u32).unwrap();
        sim.module("m")
            .unwrap()
            .method("p", Sensitivity::new().posedge(&count), noop_method)
            .unwrap();

        let err = sim.build().err().unwrap();
        assert!(err.to_string().contains("bool"));
    }

    #[test]
    fn test_clock_starts_opposite_to_first_edge() {
        let mut sim = SimulationBuilder::new();
        let clk = sim.clock("clk", ClockSpec::new(10)).unwrap();
        let neg = sim
            .clock("nclk", ClockSpec::new(10).with_posedge_first(false))
            .unwrap();

        assert!(!*sim.store.signal::<bool>(clk.signal().id).unwrap().read());
        assert!(*sim.store.signal::<bool>(neg.signal().id).unwrap().read());
    }

    #[test]
    fn test_invalid_clock_rejected_at_creation() {
        let mut sim = SimulationBuilder::new();
        assert!(sim.clock("clk", ClockSpec::new(1)).is_err());
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let sim = SimulationBuilder::with_config(SimulationConfig::new().with_max_delta_cycles(0));
        assert!(matches!(sim.build().err(), Some(SimError::Config(_))));
    }
}
