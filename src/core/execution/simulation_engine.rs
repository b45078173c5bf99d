use super::config::SimulationConfig;
use super::scheduler::{Scheduler, TimedAction};
use crate::core::builder::binding::PortTable;
use crate::core::channels::{ChannelStore, Change};
use crate::core::clock::ClockDriver;
use crate::core::diagnostics::{Diagnostic, Severity, SimulationObserver};
use crate::core::errors::SimError;
use crate::core::process::{ProcessBody, ProcessContext, ProcessEntry, ProcessKind, Suspend, WaitState};
use crate::core::types::{Edge, Fifo, Port, ProcessId, Signal, SignalHandle, SignalId, SignalValue, SimTime};
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use uuid::Uuid;

/// Why a call to [`Simulation::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The requested duration elapsed
    TimeLimit,
    /// Nothing is runnable and no timed event is pending
    Starved,
    /// A process or the owner requested a stop
    Stopped,
}

/// Counts of the elaborated design
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    pub channels: usize,
    pub ports: usize,
    pub processes: usize,
    pub clocks: usize,
}

/// Elaborated, runnable simulation.
///
/// Each time instant is settled by repeated delta cycles: all ready processes
/// run against committed values, then every staged write is committed at
/// once and processes sensitive to the changes become ready for the next
/// delta cycle. Time only advances once no process is ready.
pub struct Simulation {
    run_id: Uuid,
    config: SimulationConfig,
    store: ChannelStore,
    ports: PortTable,
    processes: Vec<ProcessEntry>,
    /// Static sensitivity, indexed by channel
    sensitivity: HashMap<SignalId, Vec<(ProcessId, Option<Edge>)>>,
    /// Threads suspended on a dynamic edge or event wait, indexed by channel
    waiters: HashMap<SignalId, Vec<ProcessId>>,
    clocks: Vec<ClockDriver>,
    scheduler: Scheduler,
    time: SimTime,
    delta_count: u64,
    /// Delta cycles executed at the current instant, across runs and zero waits
    instant_deltas: u32,
    /// Channels changed by the most recent commit
    last_changed: Vec<SignalId>,
    seeded: bool,
    stopped: bool,
    failure: Option<SimError>,
    reports: Vec<Diagnostic>,
    diagnostics: Vec<Diagnostic>,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl Simulation {
    pub(crate) fn new(
        config: SimulationConfig,
        store: ChannelStore,
        ports: PortTable,
        processes: Vec<ProcessEntry>,
        clocks: Vec<ClockDriver>,
    ) -> Self {
        let mut sensitivity: HashMap<SignalId, Vec<(ProcessId, Option<Edge>)>> = HashMap::new();
        for (index, entry) in processes.iter().enumerate() {
            for &(signal, edge) in &entry.sensitivity {
                sensitivity
                    .entry(signal)
                    .or_default()
                    .push((ProcessId(index), edge));
            }
        }

        let mut scheduler = Scheduler::new();
        for (index, clock) in clocks.iter().enumerate() {
            scheduler.schedule_at(clock.first_edge(), TimedAction::ClockEdge(index));
        }

        Self {
            run_id: Uuid::new_v4(),
            config,
            store,
            ports,
            processes,
            sensitivity,
            waiters: HashMap::new(),
            clocks,
            scheduler,
            time: SimTime::ZERO,
            delta_count: 0,
            instant_deltas: 0,
            last_changed: Vec::new(),
            seeded: false,
            stopped: false,
            failure: None,
            reports: Vec::new(),
            diagnostics: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Run for `until` time units from the current time, or until starvation
    /// or a stop when `until` is `None`.
    ///
    /// Instants strictly before the limit are simulated; on `TimeLimit` the
    /// current time is set to the limit. `Some(0)` therefore does nothing,
    /// not even the update phase for owner writes. A fatal error poisons
    /// the simulation and every later call returns the same error.
    pub fn run(&mut self, until: Option<u64>) -> Result<RunOutcome, SimError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.stopped {
            return Ok(RunOutcome::Stopped);
        }
        if until == Some(0) {
            return Ok(RunOutcome::TimeLimit);
        }
        if !self.seeded {
            self.seed();
        }
        self.apply_owner_writes();

        let limit = until.map(|duration| self.time + duration);
        debug!(
            "[{}] run from {} until {:?}",
            self.run_id,
            self.time,
            limit.map(|t| t.ticks())
        );

        match self.run_loop(limit) {
            Ok(outcome) => {
                debug!("[{}] run returned {:?} at {}", self.run_id, outcome, self.time);
                Ok(outcome)
            }
            Err(err) => {
                error!("[{}] simulation aborted: {}", self.run_id, err);
                self.scheduler.clear();
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run_loop(&mut self, limit: Option<SimTime>) -> Result<RunOutcome, SimError> {
        loop {
            self.settle()?;
            if self.stopped {
                return Ok(RunOutcome::Stopped);
            }

            let next = match self.scheduler.peek_time() {
                Some(next) => next,
                None => {
                    if let Some(limit) = limit {
                        self.advance_to(limit);
                    }
                    return Ok(RunOutcome::Starved);
                }
            };
            if let Some(limit) = limit {
                if next >= limit {
                    self.advance_to(limit);
                    return Ok(RunOutcome::TimeLimit);
                }
            }

            self.advance_to(next);
            self.fire_timed(next)?;
        }
    }

    /// Initial activation: every process not marked `dont_initialize` runs in
    /// the first delta cycle at time zero.
    fn seed(&mut self) {
        self.seeded = true;
        for (index, entry) in self.processes.iter_mut().enumerate() {
            if entry.initialize {
                entry.wait = WaitState::Ready;
                self.scheduler.enqueue(ProcessId(index));
            } else if entry.body.kind() == ProcessKind::Thread {
                entry.wait = WaitState::Static;
            }
        }
        info!(
            "[{}] starting simulation with {} processes",
            self.run_id,
            self.processes.len()
        );
    }

    /// Update phase for writes made through [`Simulation::write`] between
    /// runs. They are visible to the first evaluation of the run.
    fn apply_owner_writes(&mut self) {
        if !self.store.has_pending() {
            return;
        }
        let changes = self.store.commit();
        self.last_changed = changes.iter().map(|(id, _)| *id).collect();
        self.wake_sensitive(&changes);
        self.notify_delta_complete(&changes);
    }

    /// Run delta cycles until no process is ready and nothing is staged.
    ///
    /// The delta bound applies to the whole instant, so zero waits that keep
    /// re-entering this loop at the same time still count towards it.
    fn settle(&mut self) -> Result<(), SimError> {
        while self.scheduler.has_ready() || self.store.has_pending() {
            if self.instant_deltas >= self.config.max_delta_cycles {
                let signals = self
                    .last_changed
                    .iter()
                    .map(|id| self.store.name(*id).to_string())
                    .collect();
                return Err(SimError::Divergence {
                    time: self.time,
                    deltas: self.instant_deltas,
                    signals,
                });
            }
            self.instant_deltas += 1;
            self.delta_count += 1;

            for pid in self.scheduler.take_ready() {
                if self.stopped {
                    break;
                }
                self.execute(pid)?;
            }

            let changes = self.store.commit();
            self.last_changed = changes.iter().map(|(id, _)| *id).collect();
            trace!(
                "delta {} at {}: {} channel(s) changed",
                self.delta_count,
                self.time,
                changes.len()
            );
            if !self.stopped {
                self.wake_sensitive(&changes);
            }
            self.notify_delta_complete(&changes);

            if self.stopped {
                self.scheduler.clear();
                break;
            }
        }
        Ok(())
    }

    fn execute(&mut self, pid: ProcessId) -> Result<(), SimError> {
        let entry = &mut self.processes[pid.0];
        if entry.wait == WaitState::Finished {
            return Ok(());
        }
        trace!("running '{}' at {}", entry.name, self.time);

        let mut ctx = ProcessContext {
            store: &mut self.store,
            ports: &self.ports,
            process: pid,
            name: &entry.name,
            module: &entry.module,
            time: self.time,
            delta: self.delta_count,
            reports: &mut self.reports,
            stop_requested: &mut self.stopped,
        };
        let result = match &mut entry.body {
            ProcessBody::Method(body) => body(&mut ctx).map(|_| None),
            ProcessBody::Thread(body) => body.resume(&mut ctx).map(Some),
        };

        let suspend = match result {
            Ok(suspend) => suspend,
            Err(err) if !err.is_fatal() => {
                let entry = &self.processes[pid.0];
                self.reports.push(Diagnostic::new(
                    Severity::Error,
                    &entry.module,
                    self.time,
                    err.to_string(),
                ));
                match entry.body.kind() {
                    ProcessKind::Method => None,
                    ProcessKind::Thread => Some(Suspend::Wait),
                }
            }
            Err(err) => {
                self.flush_reports();
                return Err(err);
            }
        };
        self.flush_reports();

        match suspend {
            Some(suspend) => self.suspend(pid, suspend),
            None => Ok(()),
        }
    }

    fn suspend(&mut self, pid: ProcessId, suspend: Suspend) -> Result<(), SimError> {
        let wait = match suspend {
            Suspend::Wait => {
                if self.processes[pid.0].sensitivity.is_empty() {
                    warn!(
                        "'{}' waits on an empty sensitivity set and will not resume",
                        self.processes[pid.0].name
                    );
                }
                WaitState::Static
            }
            Suspend::WaitFor(delay) => {
                self.scheduler
                    .schedule_at(self.time + delay, TimedAction::Wake(pid));
                WaitState::Timed
            }
            Suspend::WaitEdge(target, edge) => {
                let id = self.ports.resolve(target)?;
                if !self.store.supports_edges(id) {
                    return Err(SimError::InvalidWait {
                        process: self.processes[pid.0].name.clone(),
                        reason: format!("edge wait on '{}' requires a bool signal", self.store.name(id)),
                    });
                }
                self.waiters.entry(id).or_default().push(pid);
                WaitState::Edge(id, edge)
            }
            Suspend::WaitEvent(target) => {
                let id = self.ports.resolve(target)?;
                self.waiters.entry(id).or_default().push(pid);
                WaitState::Event(id)
            }
            Suspend::Finish => {
                debug!("'{}' finished at {}", self.processes[pid.0].name, self.time);
                WaitState::Finished
            }
        };
        self.processes[pid.0].wait = wait;
        Ok(())
    }

    /// Make every process sensitive to a committed change ready for the next
    /// delta cycle
    fn wake_sensitive(&mut self, changes: &[(SignalId, Change)]) {
        for (id, change) in changes {
            if let Some(list) = self.sensitivity.get(id) {
                for &(pid, filter) in list {
                    if filter.map_or(false, |edge| change.edge != Some(edge)) {
                        continue;
                    }
                    let entry = &mut self.processes[pid.0];
                    match entry.body.kind() {
                        ProcessKind::Method => self.scheduler.enqueue(pid),
                        ProcessKind::Thread => {
                            if entry.wait == WaitState::Static {
                                entry.wait = WaitState::Ready;
                                self.scheduler.enqueue(pid);
                            }
                        }
                    }
                }
            }

            if let Some(waiting) = self.waiters.remove(id) {
                let mut still_waiting = Vec::new();
                for pid in waiting {
                    let entry = &mut self.processes[pid.0];
                    let fire = match entry.wait {
                        WaitState::Edge(signal, edge) if signal == *id => change.edge == Some(edge),
                        WaitState::Event(signal) if signal == *id => true,
                        _ => continue,
                    };
                    if fire {
                        entry.wait = WaitState::Ready;
                        self.scheduler.enqueue(pid);
                    } else {
                        still_waiting.push(pid);
                    }
                }
                if !still_waiting.is_empty() {
                    self.waiters.insert(*id, still_waiting);
                }
            }
        }
    }

    fn fire_timed(&mut self, time: SimTime) -> Result<(), SimError> {
        for action in self.scheduler.pop_due(time) {
            match action {
                TimedAction::Wake(pid) => {
                    let entry = &mut self.processes[pid.0];
                    if entry.wait == WaitState::Timed {
                        entry.wait = WaitState::Ready;
                        self.scheduler.enqueue(pid);
                    }
                }
                TimedAction::ClockEdge(index) => {
                    let delay = self.clocks[index].fire(&mut self.store)?;
                    self.scheduler
                        .schedule_at(time + delay, TimedAction::ClockEdge(index));
                }
            }
        }
        Ok(())
    }

    fn advance_to(&mut self, time: SimTime) {
        if time <= self.time {
            return;
        }
        let old = self.time;
        self.time = time;
        self.instant_deltas = 0;
        self.store.begin_instant();
        debug!("=== Simulation Time {} {} ===", time, self.config.time_unit);
        for observer in &mut self.observers {
            observer.on_time_advance(old, time);
        }
    }

    fn notify_delta_complete(&mut self, changes: &[(SignalId, Change)]) {
        if self.observers.is_empty() {
            return;
        }
        let names: Vec<&str> = changes.iter().map(|(id, _)| self.store.name(*id)).collect();
        for observer in &mut self.observers {
            observer.on_delta_complete(self.time, self.delta_count, &names);
        }
    }

    /// Move reports staged by the last process into the diagnostic stream
    fn flush_reports(&mut self) {
        for diagnostic in self.reports.drain(..) {
            if self.config.log_diagnostics {
                let line = format!(
                    "({}) @{} {}: {}",
                    diagnostic.source, diagnostic.time, self.config.time_unit, diagnostic.message
                );
                match diagnostic.severity {
                    Severity::Info => info!("{}", line),
                    Severity::Warning => warn!("{}", line),
                    Severity::Error => error!("{}", line),
                }
            }
            for observer in &mut self.observers {
                observer.on_diagnostic(&diagnostic);
            }
            self.diagnostics.push(diagnostic);
        }
    }

    /// Stop from outside a process. Staged writes are committed; later runs
    /// return `Stopped` without doing anything.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        let changes = self.store.commit();
        self.notify_delta_complete(&changes);
        self.stopped = true;
        self.scheduler.clear();
        info!("[{}] stopped by owner at {}", self.run_id, self.time);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stage a write from outside any process (testbench stimulus). It is
    /// committed in the next delta cycle of the next `run`.
    pub fn write<T: SignalValue>(&mut self, handle: &impl SignalHandle<T>, value: T) -> Result<(), SimError> {
        let id = self.ports.resolve(handle.signal_ref())?;
        self.store.stage(id, value, None)
    }

    /// Committed value of a signal or bound port
    pub fn read<T: SignalValue>(&self, handle: &impl SignalHandle<T>) -> Result<T, SimError> {
        let id = self.ports.resolve(handle.signal_ref())?;
        Ok(self.store.signal::<T>(id)?.read().clone())
    }

    /// Items currently readable from a FIFO
    pub fn fifo_len<T: 'static>(&self, fifo: &Fifo<T>) -> Result<usize, SimError> {
        Ok(self.store.fifo::<T>(fifo.id)?.num_available())
    }

    /// Look up a signal by hierarchical name, checking its value type
    pub fn find_signal<T: SignalValue>(&self, name: &str) -> Result<Signal<T>, SimError> {
        let id = self
            .store
            .find(name)
            .ok_or_else(|| SimError::binding(name, "no signal with this name"))?;
        self.store.signal::<T>(id)?;
        Ok(Signal::new(id))
    }

    /// Look up a port by hierarchical name, checking its value type
    pub fn find_port<T: SignalValue>(&self, name: &str) -> Result<Port<T>, SimError> {
        let id = self
            .ports
            .find(name)
            .ok_or_else(|| SimError::binding(name, "no port with this name"))?;
        let slot = self.ports.slot(id)?;
        if slot.value_type != std::any::TypeId::of::<T>() {
            return Err(SimError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
                found: slot.type_name,
            });
        }
        Ok(Port::new(id, slot.direction))
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Total delta cycles executed since the start
    pub fn delta_count(&self) -> u64 {
        self.delta_count
    }

    /// Every diagnostic reported so far, in report order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Unique id of this run, used to tag log lines
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            channels: self.store.len(),
            ports: self.ports.len(),
            processes: self.processes.len(),
            clocks: self.clocks.len(),
        }
    }
}
