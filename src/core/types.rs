use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Add;

/// Index of a channel (signal, buffer or FIFO) in the simulation's channel table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

/// Index of a declared port in the port table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub(crate) usize);

/// Process identifier. Ids are handed out in registration order, which is also
/// the tie-break order for processes that become ready in the same delta cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) usize);

impl SignalId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl PortId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl ProcessId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Absolute simulated time in abstract time units
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    /// Raw tick count
    pub fn ticks(self) -> u64 {
        self.0
    }
}

impl Add<u64> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: u64) -> SimTime {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a value transition on a `bool` signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    pub(crate) fn between(old: bool, new: bool) -> Option<Edge> {
        match (old, new) {
            (false, true) => Some(Edge::Rising),
            (true, false) => Some(Edge::Falling),
            _ => None,
        }
    }
}

/// Access direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn can_write(self) -> bool {
        !matches!(self, Direction::In)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
            Direction::InOut => write!(f, "inout"),
        }
    }
}

/// Values that can be carried by a signal. Equality drives change detection.
pub trait SignalValue: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> SignalValue for T {}

/// Typed handle to a signal created during elaboration
pub struct Signal<T> {
    pub(crate) id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

/// Typed port handle. The port is bound to exactly one signal (directly or
/// through a parent port) before the circuit is built.
pub struct Port<T> {
    pub(crate) id: PortId,
    pub(crate) direction: Direction,
    _marker: PhantomData<fn() -> T>,
}

/// Typed handle to a bounded FIFO channel
pub struct Fifo<T> {
    pub(crate) id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Signal<T> {
    pub(crate) fn new(id: SignalId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

impl<T> Port<T> {
    pub(crate) fn new(id: PortId, direction: Direction) -> Self {
        Self {
            id,
            direction,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<T> Fifo<T> {
    pub(crate) fn new(id: SignalId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

// Handles are plain ids; derive would put a `T: Clone` bound on them.
impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Signal<T> {}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Port<T> {}

impl<T> Clone for Fifo<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Fifo<T> {}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.id.0)
    }
}

impl<T> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({}, {})", self.id.0, self.direction)
    }
}

impl<T> fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fifo({})", self.id.0)
    }
}

/// Untyped reference to something that resolves to a channel id: either a
/// channel directly or a port bound to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalRef {
    Channel(SignalId),
    Port(PortId),
}

/// A sensitivity entry: a channel reference plus an optional edge filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub target: SignalRef,
    pub edge: Option<Edge>,
}

impl Trigger {
    /// Trigger on any committed change
    pub fn any(target: impl Into<SignalRef>) -> Self {
        Self {
            target: target.into(),
            edge: None,
        }
    }

    /// Trigger on a false -> true transition
    pub fn posedge(target: impl Into<SignalRef>) -> Self {
        Self {
            target: target.into(),
            edge: Some(Edge::Rising),
        }
    }

    /// Trigger on a true -> false transition
    pub fn negedge(target: impl Into<SignalRef>) -> Self {
        Self {
            target: target.into(),
            edge: Some(Edge::Falling),
        }
    }
}

macro_rules! impl_signal_refs {
    ($handle:ident, $variant:ident) => {
        impl<T> From<$handle<T>> for SignalRef {
            fn from(handle: $handle<T>) -> Self {
                SignalRef::$variant(handle.id)
            }
        }

        impl<T> From<&$handle<T>> for SignalRef {
            fn from(handle: &$handle<T>) -> Self {
                SignalRef::$variant(handle.id)
            }
        }

        impl<T> From<$handle<T>> for Trigger {
            fn from(handle: $handle<T>) -> Self {
                Trigger::any(handle)
            }
        }

        impl<T> From<&$handle<T>> for Trigger {
            fn from(handle: &$handle<T>) -> Self {
                Trigger::any(handle)
            }
        }
    };
}

impl_signal_refs!(Signal, Channel);
impl_signal_refs!(Port, Port);
impl_signal_refs!(Fifo, Channel);

/// Typed access to a signal value, through the signal itself or a bound port
pub trait SignalHandle<T> {
    fn signal_ref(&self) -> SignalRef;
}

impl<T> SignalHandle<T> for Signal<T> {
    fn signal_ref(&self) -> SignalRef {
        SignalRef::Channel(self.id)
    }
}

impl<T> SignalHandle<T> for Port<T> {
    fn signal_ref(&self) -> SignalRef {
        SignalRef::Port(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_between() {
        assert_eq!(Edge::between(false, true), Some(Edge::Rising));
        assert_eq!(Edge::between(true, false), Some(Edge::Falling));
        assert_eq!(Edge::between(true, true), None);
    }

    #[test]
    fn test_trigger_from_handles() {
        let sig: Signal<bool> = Signal::new(SignalId(3));
        let port: Port<u8> = Port::new(PortId(1), Direction::In);

        assert_eq!(Trigger::from(&sig).target, SignalRef::Channel(SignalId(3)));
        assert_eq!(Trigger::posedge(sig).edge, Some(Edge::Rising));
        assert_eq!(Trigger::from(port).target, SignalRef::Port(PortId(1)));
    }

    #[test]
    fn test_direction_write_permission() {
        assert!(!Direction::In.can_write());
        assert!(Direction::Out.can_write());
        assert!(Direction::InOut.can_write());
    }
}
