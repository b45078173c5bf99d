use super::builder::binding::PortTable;
use super::channels::ChannelStore;
use super::diagnostics::{Diagnostic, Severity};
use super::errors::SimError;
use super::types::{Edge, Fifo, ProcessId, SignalHandle, SignalId, SignalRef, SignalValue, SimTime, Trigger};

/// What a thread-kind process waits for when it yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Until a channel in the static sensitivity set reports an event
    Wait,
    /// Until simulated time advances by the given amount
    WaitFor(u64),
    /// Until the `bool` signal makes the given transition
    WaitEdge(SignalRef, Edge),
    /// Until the signal or FIFO reports any event
    WaitEvent(SignalRef),
    /// The thread is done and is never resumed
    Finish,
}

impl Suspend {
    pub fn posedge(target: impl Into<SignalRef>) -> Self {
        Suspend::WaitEdge(target.into(), Edge::Rising)
    }

    pub fn negedge(target: impl Into<SignalRef>) -> Self {
        Suspend::WaitEdge(target.into(), Edge::Falling)
    }

    pub fn event(target: impl Into<SignalRef>) -> Self {
        Suspend::WaitEvent(target.into())
    }
}

/// Resumable body of a thread-kind process.
///
/// Each call runs from the continuation point stored in `self` up to the next
/// suspension point and reports what to wait for.
pub trait ThreadProcess {
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Suspend, SimError>;
}

impl<F> ThreadProcess for F
where
    F: FnMut(&mut ProcessContext<'_>) -> Result<Suspend, SimError>,
{
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Suspend, SimError> {
        self(ctx)
    }
}

pub(crate) type MethodFn = Box<dyn FnMut(&mut ProcessContext<'_>) -> Result<(), SimError>>;

/// Entry point of a process
pub(crate) enum ProcessBody {
    Method(MethodFn),
    Thread(Box<dyn ThreadProcess>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Method,
    Thread,
}

impl ProcessBody {
    pub fn kind(&self) -> ProcessKind {
        match self {
            ProcessBody::Method(_) => ProcessKind::Method,
            ProcessBody::Thread(_) => ProcessKind::Thread,
        }
    }
}

/// Static sensitivity and start-up options of a process
#[derive(Debug, Clone, Default)]
pub struct Sensitivity {
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) dont_initialize: bool,
}

impl Sensitivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// React to any event on `target`
    pub fn on(mut self, target: impl Into<Trigger>) -> Self {
        self.triggers.push(target.into());
        self
    }

    /// React to rising edges of a `bool` signal
    pub fn posedge(mut self, target: impl Into<SignalRef>) -> Self {
        self.triggers.push(Trigger::posedge(target));
        self
    }

    /// React to falling edges of a `bool` signal
    pub fn negedge(mut self, target: impl Into<SignalRef>) -> Self {
        self.triggers.push(Trigger::negedge(target));
        self
    }

    /// Skip the activation at time zero
    pub fn dont_initialize(mut self) -> Self {
        self.dont_initialize = true;
        self
    }
}

/// Where a process currently stands with respect to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitState {
    /// Enqueued or running
    Ready,
    /// Waiting on the static sensitivity set
    Static,
    /// Waiting for a timed wake-up
    Timed,
    Edge(SignalId, Edge),
    Event(SignalId),
    Finished,
}

/// Entry in the flat process table
pub(crate) struct ProcessEntry {
    pub name: String,
    /// Hierarchical name of the owning module, used as diagnostic source
    pub module: String,
    pub body: ProcessBody,
    pub sensitivity: Vec<(SignalId, Option<Edge>)>,
    pub initialize: bool,
    pub wait: WaitState,
}

/// Everything a process may touch while it runs.
///
/// Reads observe committed values only; writes are staged until the end of
/// the delta cycle.
pub struct ProcessContext<'a> {
    pub(crate) store: &'a mut ChannelStore,
    pub(crate) ports: &'a PortTable,
    pub(crate) process: ProcessId,
    pub(crate) name: &'a str,
    pub(crate) module: &'a str,
    pub(crate) time: SimTime,
    pub(crate) delta: u64,
    pub(crate) reports: &'a mut Vec<Diagnostic>,
    pub(crate) stop_requested: &'a mut bool,
}

impl<'a> ProcessContext<'a> {
    /// Current simulated time
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Total delta cycles executed so far
    pub fn delta(&self) -> u64 {
        self.delta
    }

    /// Full name of the running process
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn id(&self) -> ProcessId {
        self.process
    }

    /// Read the committed value of a signal or bound port
    pub fn read<T: SignalValue>(&self, handle: &impl SignalHandle<T>) -> Result<T, SimError> {
        let id = self.ports.resolve(handle.signal_ref())?;
        Ok(self.store.signal::<T>(id)?.read().clone())
    }

    /// Stage a write; it becomes visible after the current delta cycle commits
    pub fn write<T: SignalValue>(&mut self, handle: &impl SignalHandle<T>, value: T) -> Result<(), SimError> {
        let id = self.ports.resolve_for_write(handle.signal_ref(), self.name)?;
        self.store.stage(id, value, Some((self.process, self.name)))
    }

    /// True if the channel changed in the commit just before this evaluation
    pub fn event(&self, target: impl Into<SignalRef>) -> Result<bool, SimError> {
        let id = self.ports.resolve(target.into())?;
        Ok(self.store.last_event(id).is_some())
    }

    /// True if the `bool` signal rose in the commit just before this evaluation
    pub fn posedge(&self, target: impl Into<SignalRef>) -> Result<bool, SimError> {
        let id = self.ports.resolve(target.into())?;
        Ok(self.store.last_event(id) == Some(Some(Edge::Rising)))
    }

    /// True if the `bool` signal fell in the commit just before this evaluation
    pub fn negedge(&self, target: impl Into<SignalRef>) -> Result<bool, SimError> {
        let id = self.ports.resolve(target.into())?;
        Ok(self.store.last_event(id) == Some(Some(Edge::Falling)))
    }

    /// Stage a FIFO write. Returns false if the FIFO has no free slot.
    pub fn fifo_try_write<T: 'static>(&mut self, fifo: &Fifo<T>, value: T) -> Result<bool, SimError> {
        let written = self.store.fifo_mut::<T>(fifo.id)?.try_write(value);
        if written {
            self.store.mark_dirty(fifo.id);
        }
        Ok(written)
    }

    /// Take the oldest committed FIFO item, if any
    pub fn fifo_try_read<T: 'static>(&mut self, fifo: &Fifo<T>) -> Result<Option<T>, SimError> {
        let value = self.store.fifo_mut::<T>(fifo.id)?.try_read();
        if value.is_some() {
            self.store.mark_dirty(fifo.id);
        }
        Ok(value)
    }

    pub fn fifo_num_available<T: 'static>(&self, fifo: &Fifo<T>) -> Result<usize, SimError> {
        Ok(self.store.fifo::<T>(fifo.id)?.num_available())
    }

    pub fn fifo_num_free<T: 'static>(&self, fifo: &Fifo<T>) -> Result<usize, SimError> {
        Ok(self.store.fifo::<T>(fifo.id)?.num_free())
    }

    /// Report a diagnostic on behalf of the owning module
    pub fn report(&mut self, severity: Severity, message: impl Into<String>) {
        self.reports
            .push(Diagnostic::new(severity, self.module, self.time, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.report(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(Severity::Error, message);
    }

    /// Bounds-checked memory access. An out-of-range index is reported as an
    /// error diagnostic and yields `T::default()` so the run continues.
    pub fn read_or_default<T: Clone + Default>(&mut self, data: &[T], index: usize) -> T {
        match data.get(index) {
            Some(value) => value.clone(),
            None => {
                let err = SimError::OutOfRange {
                    source: self.module.to_string(),
                    index,
                    len: data.len(),
                };
                self.error(err.to_string());
                T::default()
            }
        }
    }

    /// Request the end of the simulation. Writes already staged in this delta
    /// cycle are committed; no further delta cycle starts.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }

    /// Build a process error attributed to this process
    pub fn fail(&self, message: impl Into<String>) -> SimError {
        SimError::process(self.name, message)
    }
}
