//! Event scheduler with deterministic ordering.
//!
//! Implements a priority queue that ensures:
//! - Events are processed in time order
//! - Ties are broken by insertion order (sequence number)
//! - Periodic triggers land on exact multiples of their period
//!
//! Triggers are monotonic: an event cannot be registered for a time earlier
//! than the scheduler's horizon (the latest time already processed).

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

/// When an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Once, at an absolute time.
    At(SimTime),
    /// At `offset + k * period` for k = 0, 1, 2, ...
    Every {
        /// Interval between firings.
        period: SimTime,
        /// First firing.
        offset: SimTime,
    },
}

impl Trigger {
    /// Periodic trigger whose first firing is one period after start.
    #[must_use]
    pub const fn every(period: SimTime) -> Self {
        Self::Every {
            period,
            offset: period,
        }
    }

    /// Time of the `occurrence`-th firing.
    #[must_use]
    pub const fn occurrence_time(&self, occurrence: u64) -> SimTime {
        match *self {
            Self::At(time) => time,
            Self::Every { period, offset } => {
                offset.add_nanos(period.as_nanos().saturating_mul(occurrence))
            }
        }
    }

    const fn is_periodic(&self) -> bool {
        matches!(self, Self::Every { .. })
    }
}

/// What an event does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Emit the listed variables to the log (a periodic "read").
    Log {
        /// Variables to report.
        variables: Vec<String>,
    },
    /// Evaluate an expression and write it into a variable.
    Assign {
        /// Target variable.
        variable: String,
        /// Expression evaluated against the live state.
        expression: String,
    },
    /// Sample the recorded variables.
    Record,
    /// Capture a restartable checkpoint.
    Checkpoint,
}

/// A trigger paired with an action, registered against one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    /// When the action fires.
    pub trigger: Trigger,
    /// What it does.
    pub action: EventAction,
}

impl ScheduleEvent {
    /// Create a new schedule event.
    #[must_use]
    pub const fn new(trigger: Trigger, action: EventAction) -> Self {
        Self { trigger, action }
    }
}

/// A pending firing with time and sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Scheduled time.
    pub time: SimTime,
    /// Sequence number for deterministic tie-breaking.
    pub sequence: u64,
    /// Index of the registered event.
    pub event: usize,
    /// How many times this event has fired before.
    pub occurrence: u64,
}

// Custom ordering for BinaryHeap (min-heap by time, then sequence)
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.time.cmp(&other.time) {
            std::cmp::Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}

/// Serializable scheduler contents for checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    events: Vec<ScheduleEvent>,
    pending: Vec<ScheduledEvent>,
    sequence: u64,
    horizon: SimTime,
}

/// Priority-ordered event queue.
///
/// # Example
///
/// ```rust
/// use montesim::engine::scheduler::{EventAction, EventScheduler, ScheduleEvent, Trigger};
/// use montesim::engine::SimTime;
///
/// let mut scheduler = EventScheduler::new();
/// scheduler
///     .register(ScheduleEvent::new(
///         Trigger::every(SimTime::from_secs(55.0)),
///         EventAction::Record,
///     ))
///     .unwrap();
/// assert_eq!(scheduler.next_event_time(), Some(SimTime::from_secs(55.0)));
/// ```
#[derive(Debug, Default)]
pub struct EventScheduler {
    /// Registered events; heap entries refer to these by index.
    events: Vec<ScheduleEvent>,
    /// Min-heap ordered by (time, sequence).
    queue: BinaryHeap<Reverse<ScheduledEvent>>,
    /// Monotonic sequence counter for tie-breaking.
    sequence: u64,
    /// Latest time already processed.
    horizon: SimTime,
}

impl EventScheduler {
    /// Create a new event scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event and schedule its first firing.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if the first firing lies before the
    /// horizon, or if a periodic trigger has a zero period.
    pub fn register(&mut self, event: ScheduleEvent) -> SimResult<usize> {
        if let Trigger::Every { period, .. } = event.trigger {
            if period.as_nanos() == 0 {
                return Err(SimError::config("periodic event with zero period"));
            }
        }
        let first = event.trigger.occurrence_time(0);
        if first < self.horizon {
            return Err(SimError::config(format!(
                "event at {first} precedes current time {}",
                self.horizon
            )));
        }

        let index = self.events.len();
        self.events.push(event);
        self.push(first, index, 0);
        Ok(index)
    }

    fn push(&mut self, time: SimTime, event: usize, occurrence: u64) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.queue.push(Reverse(ScheduledEvent {
            time,
            sequence,
            event,
            occurrence,
        }));
    }

    /// Get the time of the next event, if any.
    #[must_use]
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(e)| e.time)
    }

    /// Pop the next firing at or before `now`, returning its time and the
    /// index of the registered event.
    ///
    /// A periodic event's next occurrence is scheduled before this returns,
    /// so firings at the same time keep their registration order.
    pub fn pop_due(&mut self, now: SimTime) -> Option<(SimTime, usize)> {
        let due = matches!(self.queue.peek(), Some(Reverse(e)) if e.time <= now);
        if !due {
            return None;
        }
        let Reverse(fired) = self.queue.pop()?;
        self.horizon = self.horizon.max(fired.time);

        let trigger = self.events.get(fired.event)?.trigger;
        if trigger.is_periodic() {
            let next = fired.occurrence + 1;
            self.push(trigger.occurrence_time(next), fired.event, next);
        }
        Some((fired.time, fired.event))
    }

    /// Registered event by index.
    #[must_use]
    pub fn event(&self, index: usize) -> Option<&ScheduleEvent> {
        self.events.get(index)
    }

    /// Move the horizon forward without firing anything.
    pub fn advance_horizon(&mut self, now: SimTime) {
        self.horizon = self.horizon.max(now);
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the number of pending firings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Registered events in registration order.
    #[must_use]
    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    /// Capture the scheduler for a checkpoint.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let mut pending: Vec<ScheduledEvent> =
            self.queue.iter().map(|Reverse(e)| e.clone()).collect();
        pending.sort();
        SchedulerSnapshot {
            events: self.events.clone(),
            pending,
            sequence: self.sequence,
            horizon: self.horizon,
        }
    }

    /// Rebuild a scheduler from a checkpoint snapshot.
    #[must_use]
    pub fn restore(snapshot: SchedulerSnapshot) -> Self {
        Self {
            events: snapshot.events,
            queue: snapshot.pending.into_iter().map(Reverse).collect(),
            sequence: snapshot.sequence,
            horizon: snapshot.horizon,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(secs: f64, action: EventAction) -> ScheduleEvent {
        ScheduleEvent::new(Trigger::At(SimTime::from_secs(secs)), action)
    }

    fn drain(scheduler: &mut EventScheduler, until: SimTime) -> Vec<(SimTime, EventAction)> {
        let mut fired = Vec::new();
        while let Some((t, index)) = scheduler.pop_due(until) {
            fired.push((t, scheduler.event(index).unwrap().action.clone()));
        }
        fired
    }

    #[test]
    fn test_scheduler_time_ordering() {
        let mut scheduler = EventScheduler::new();
        scheduler.register(at(3.0, EventAction::Record)).unwrap();
        scheduler.register(at(1.0, EventAction::Checkpoint)).unwrap();
        scheduler.register(at(2.0, EventAction::Record)).unwrap();

        let fired = drain(&mut scheduler, SimTime::from_secs(10.0));
        let times: Vec<f64> = fired.iter().map(|(t, _)| t.as_secs_f64()).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_scheduler_sequence_ordering() {
        let mut scheduler = EventScheduler::new();
        for name in ["a", "b", "c"] {
            scheduler
                .register(at(
                    1.0,
                    EventAction::Log {
                        variables: vec![name.to_string()],
                    },
                ))
                .unwrap();
        }

        let fired = drain(&mut scheduler, SimTime::from_secs(1.0));
        let names: Vec<String> = fired
            .into_iter()
            .filter_map(|(_, a)| match a {
                EventAction::Log { mut variables } => variables.pop(),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pop_due_respects_now() {
        let mut scheduler = EventScheduler::new();
        scheduler.register(at(1.0, EventAction::Record)).unwrap();
        scheduler.register(at(2.0, EventAction::Record)).unwrap();

        assert!(scheduler.pop_due(SimTime::from_secs(0.5)).is_none());
        assert!(scheduler.pop_due(SimTime::from_secs(1.5)).is_some());
        assert!(scheduler.pop_due(SimTime::from_secs(1.5)).is_none());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_periodic_fires_on_exact_multiples() {
        let mut scheduler = EventScheduler::new();
        scheduler
            .register(ScheduleEvent::new(
                Trigger::every(SimTime::from_secs(55.0)),
                EventAction::Record,
            ))
            .unwrap();

        let fired = drain(&mut scheduler, SimTime::from_secs(300.0));
        let times: Vec<u64> = fired.iter().map(|(t, _)| t.as_nanos()).collect();
        assert_eq!(
            times,
            vec![
                55_000_000_000,
                110_000_000_000,
                165_000_000_000,
                220_000_000_000,
                275_000_000_000
            ]
        );
        // Next occurrence stays queued past the horizon.
        assert_eq!(scheduler.next_event_time(), Some(SimTime::from_secs(330.0)));
    }

    #[test]
    fn test_periodic_with_zero_offset_fires_at_start() {
        let mut scheduler = EventScheduler::new();
        scheduler
            .register(ScheduleEvent::new(
                Trigger::Every {
                    period: SimTime::from_secs(0.5),
                    offset: SimTime::ZERO,
                },
                EventAction::Record,
            ))
            .unwrap();
        let fired = drain(&mut scheduler, SimTime::from_secs(1.0));
        assert_eq!(fired.len(), 3);
    }

    #[test]
    fn test_register_rejects_past_trigger() {
        let mut scheduler = EventScheduler::new();
        scheduler.advance_horizon(SimTime::from_secs(5.0));
        assert!(scheduler.register(at(4.0, EventAction::Record)).is_err());
        assert!(scheduler.register(at(5.0, EventAction::Record)).is_ok());
    }

    #[test]
    fn test_register_rejects_zero_period() {
        let mut scheduler = EventScheduler::new();
        let event = ScheduleEvent::new(Trigger::every(SimTime::ZERO), EventAction::Record);
        assert!(scheduler.register(event).is_err());
    }

    #[test]
    fn test_snapshot_restore_preserves_order() {
        let mut scheduler = EventScheduler::new();
        scheduler
            .register(ScheduleEvent::new(
                Trigger::every(SimTime::from_secs(1.0)),
                EventAction::Record,
            ))
            .unwrap();
        scheduler.register(at(2.5, EventAction::Checkpoint)).unwrap();
        let _ = drain(&mut scheduler, SimTime::from_secs(1.0));

        let mut restored = EventScheduler::restore(scheduler.snapshot());
        let a = drain(&mut scheduler, SimTime::from_secs(4.0));
        let b = drain(&mut restored, SimTime::from_secs(4.0));
        assert_eq!(a, b);
        assert_eq!(restored.events().len(), 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Falsification: firings come out in non-decreasing time order.
        #[test]
        fn prop_firings_monotonic(times in prop::collection::vec(0u64..1_000_000, 1..50)) {
            let mut scheduler = EventScheduler::new();
            for &t in &times {
                let event = ScheduleEvent::new(
                    Trigger::At(SimTime::from_nanos(t)),
                    EventAction::Record,
                );
                prop_assert!(scheduler.register(event).is_ok());
            }

            let mut last = SimTime::ZERO;
            let mut count = 0;
            while let Some((t, _)) = scheduler.pop_due(SimTime::from_nanos(u64::MAX)) {
                prop_assert!(t >= last);
                last = t;
                count += 1;
            }
            prop_assert_eq!(count, times.len());
        }
    }
}
