//! # Timer Events
//!
//! The poller and the application glue never sleep themselves; they ask a
//! [`Scheduler`] to fire an [`AppEvent`] later and react when it does.
//!
//! - [`TokioScheduler`] drives a real process: each armed timer is a tokio
//!   task that feeds fired events into a channel read by [`TokioScheduler::next_event`].
//! - [`ManualScheduler`] only records what was asked of it, for tests and for
//!   one-shot reads where the caller ticks the poller itself.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Events the application reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppEvent {
    /// Start a measurement cycle
    Report,
    /// Persist the configuration block
    SaveAttributes,
    /// Advance the poller by one phase
    ReadSensors,
}

impl AppEvent {
    /// Event bit as used by the node's task event mask
    pub fn id(self) -> u16 {
        match self {
            AppEvent::Report => 0x0001,
            AppEvent::SaveAttributes => 0x0002,
            AppEvent::ReadSensors => 0x0004,
        }
    }
}

/// Advisory power-management state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerHint {
    /// A transfer is in flight, do not enter low-power sleep
    Hold,
    /// Sleep is permitted again
    Conserve,
}

/// Timer services used by the poller and the application.
pub trait Scheduler: Send {
    /// Fire `event` every `period`, replacing any timer already armed for it.
    fn schedule_repeating(&mut self, event: AppEvent, period: Duration);

    /// Fire `event` once after `delay`, replacing any timer already armed for it.
    fn schedule_once(&mut self, event: AppEvent, delay: Duration);

    /// Stop the timer for `event` and drop occurrences not yet handled.
    fn cancel(&mut self, event: AppEvent);

    fn power_hint(&mut self, hint: PowerHint);
}

/// Scheduler backed by tokio timers.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<(AppEvent, u64)>,
    rx: mpsc::UnboundedReceiver<(AppEvent, u64)>,
    timers: HashMap<AppEvent, JoinHandle<()>>,
    generations: HashMap<AppEvent, u64>,
    power: PowerHint,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        TokioScheduler {
            tx,
            rx,
            timers: HashMap::new(),
            generations: HashMap::new(),
            power: PowerHint::Conserve,
        }
    }

    /// Wait for the next live event.
    ///
    /// Occurrences fired by a timer that has since been cancelled or replaced
    /// are skipped.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        loop {
            let (event, generation) = self.rx.recv().await?;
            if self.generations.get(&event) == Some(&generation) {
                return Some(event);
            }
            log::trace!("Dropping stale {event:?} (generation {generation})");
        }
    }

    pub fn is_armed(&self, event: AppEvent) -> bool {
        self.timers
            .get(&event)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn power_state(&self) -> PowerHint {
        self.power
    }

    fn stop_timer(&mut self, event: AppEvent) -> u64 {
        if let Some(handle) = self.timers.remove(&event) {
            handle.abort();
        }
        let generation = self.generations.entry(event).or_insert(0);
        *generation += 1;
        *generation
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&mut self, event: AppEvent, period: Duration) {
        let generation = self.stop_timer(event);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send((event, generation)).is_err() {
                    break;
                }
            }
        });
        log::debug!("Armed repeating {event:?} every {period:?}");
        self.timers.insert(event, handle);
    }

    fn schedule_once(&mut self, event: AppEvent, delay: Duration) {
        let generation = self.stop_timer(event);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((event, generation));
        });
        log::debug!("Armed {event:?} in {delay:?}");
        self.timers.insert(event, handle);
    }

    fn cancel(&mut self, event: AppEvent) {
        self.stop_timer(event);
        log::debug!("Cancelled {event:?}");
    }

    fn power_hint(&mut self, hint: PowerHint) {
        if self.power != hint {
            log::trace!("Power hint {hint:?}");
        }
        self.power = hint;
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for handle in self.timers.values() {
            handle.abort();
        }
    }
}

/// Scheduler that records requests instead of acting on them.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    /// Repeating timers currently armed
    pub repeating: HashMap<AppEvent, Duration>,
    /// One-shot timers currently armed
    pub once: HashMap<AppEvent, Duration>,
    /// Every `cancel` call, in order
    pub cancelled: Vec<AppEvent>,
    /// Every power hint, in order
    pub hints: Vec<PowerHint>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, event: AppEvent) -> bool {
        self.repeating.contains_key(&event) || self.once.contains_key(&event)
    }

    pub fn last_hint(&self) -> Option<PowerHint> {
        self.hints.last().copied()
    }

    /// Consume a due one-shot timer, as if it had fired.
    pub fn take_once(&mut self, event: AppEvent) -> Option<Duration> {
        self.once.remove(&event)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&mut self, event: AppEvent, period: Duration) {
        self.once.remove(&event);
        self.repeating.insert(event, period);
    }

    fn schedule_once(&mut self, event: AppEvent, delay: Duration) {
        self.repeating.remove(&event);
        self.once.insert(event, delay);
    }

    fn cancel(&mut self, event: AppEvent) {
        self.repeating.remove(&event);
        self.once.remove(&event);
        self.cancelled.push(event);
    }

    fn power_hint(&mut self, hint: PowerHint) {
        self.hints.push(hint);
    }
}
