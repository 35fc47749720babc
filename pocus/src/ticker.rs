//! One-second pulse source for a running session.
//!
//! At most one pulse task exists at a time. Pulses carry the generation of
//! the task that sent them so the receiver can drop stragglers from a task
//! that has already been cancelled.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub generation: u64,
}

pub struct Ticker {
    tx: mpsc::Sender<Pulse>,
    period: Duration,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(tx: mpsc::Sender<Pulse>) -> Self {
        Self::with_period(tx, TICK_PERIOD)
    }

    pub fn with_period(tx: mpsc::Sender<Pulse>, period: Duration) -> Self {
        Self {
            tx,
            period,
            generation: 0,
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Follows the session's `running` flag. Only an edge starts or stops
    /// the pulse task; an unchanged flag leaves the current task alone.
    pub fn set_active(&mut self, active: bool) {
        match (active, self.is_active()) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            _ => {}
        }
    }

    /// True for pulses sent by the current, still active task.
    pub fn accepts(&self, pulse: &Pulse) -> bool {
        self.is_active() && pulse.generation == self.generation
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let period = self.period;
        let first = Instant::now() + period;

        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(Pulse { generation }).await.is_err() {
                    break;
                }
            }
        }));
        debug!(generation, "Ticker started");
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "Ticker stopped");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
