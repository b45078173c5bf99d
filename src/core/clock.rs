use super::channels::ChannelStore;
use super::errors::SimError;
use super::types::{Signal, SignalId, SignalRef, SimTime, Trigger};
use serde::{Deserialize, Serialize};

/// Timing description of a periodic clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSpec {
    pub period: u64,
    /// Fraction of the period the clock is high
    pub duty: f64,
    /// Time of the first edge
    pub start_time: u64,
    /// Whether the first edge is rising
    pub posedge_first: bool,
}

impl ClockSpec {
    pub fn new(period: u64) -> Self {
        Self {
            period,
            duty: 0.5,
            start_time: 0,
            posedge_first: true,
        }
    }

    pub fn with_duty(mut self, duty: f64) -> Self {
        self.duty = duty;
        self
    }

    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_posedge_first(mut self, posedge_first: bool) -> Self {
        self.posedge_first = posedge_first;
        self
    }

    /// High and low phase lengths. Both must be non-zero.
    pub(crate) fn phases(&self) -> Result<(u64, u64), SimError> {
        if self.period < 2 {
            return Err(SimError::Config(format!(
                "clock period must be at least 2 time units, got {}",
                self.period
            )));
        }
        if !(self.duty > 0.0 && self.duty < 1.0) {
            return Err(SimError::Config(format!(
                "clock duty must lie strictly between 0 and 1, got {}",
                self.duty
            )));
        }

        let high = (self.period as f64 * self.duty).round() as u64;
        if high == 0 || high >= self.period {
            return Err(SimError::Config(format!(
                "clock duty {} leaves an empty phase with period {}",
                self.duty, self.period
            )));
        }
        Ok((high, self.period - high))
    }
}

/// Handle to a clock created during elaboration
#[derive(Debug, Clone)]
pub struct Clock {
    signal: Signal<bool>,
    spec: ClockSpec,
}

impl Clock {
    pub(crate) fn new(signal: Signal<bool>, spec: ClockSpec) -> Self {
        Self { signal, spec }
    }

    /// The driven `bool` signal
    pub fn signal(&self) -> Signal<bool> {
        self.signal
    }

    pub fn spec(&self) -> &ClockSpec {
        &self.spec
    }

    pub fn period(&self) -> u64 {
        self.spec.period
    }

    pub fn posedge(&self) -> Trigger {
        Trigger::posedge(self.signal)
    }

    pub fn negedge(&self) -> Trigger {
        Trigger::negedge(self.signal)
    }
}

impl From<&Clock> for SignalRef {
    fn from(clock: &Clock) -> Self {
        SignalRef::Channel(clock.signal.id)
    }
}

impl From<&Clock> for Trigger {
    fn from(clock: &Clock) -> Self {
        Trigger::any(clock)
    }
}

/// Runtime state of a clock inside the timed-event heap
#[derive(Debug, Clone)]
pub(crate) struct ClockDriver {
    signal: SignalId,
    high: u64,
    low: u64,
    next_level: bool,
    first_edge: SimTime,
}

impl ClockDriver {
    pub fn new(clock: &Clock) -> Result<Self, SimError> {
        let (high, low) = clock.spec.phases()?;
        Ok(Self {
            signal: clock.signal.id,
            high,
            low,
            next_level: clock.spec.posedge_first,
            first_edge: SimTime(clock.spec.start_time),
        })
    }

    pub fn first_edge(&self) -> SimTime {
        self.first_edge
    }

    /// Stage the next level and return the delay until the following edge
    pub fn fire(&mut self, store: &mut ChannelStore) -> Result<u64, SimError> {
        let level = self.next_level;
        store.stage(self.signal, level, None)?;
        self.next_level = !level;
        Ok(if level { self.high } else { self.low })
    }
}
