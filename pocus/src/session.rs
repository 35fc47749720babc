//! Pomodoro session state machine.
//!
//! ```text
//! Work --(complete)--> ShortBreak | LongBreak --(complete)--> Work
//! ```
//!
//! `running` is an overlay on every mode. The session does not keep time
//! itself: whoever owns it calls [`Session::tick`] once per second while it
//! runs.

use crate::alarm::Alarm;
use crate::tasks::{TaskError, TaskStore};
use pocus_ipc::{Mode, SessionStatus, Settings, TaskId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const APP_NAME: &str = "Pocus";

/// What an interval completion did.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub finished: Mode,
    pub next: Mode,
    /// Task whose actual units were incremented.
    pub credited: Option<TaskId>,
    pub auto_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The timer is running; call `confirm_switch` or `cancel_switch`.
    NeedsConfirmation,
}

pub struct Session {
    mode: Mode,
    remaining_seconds: u32,
    running: bool,
    completed_work_count: u32,
    selected_task: Option<TaskId>,
    pending_switch: Option<Mode>,
    settings: watch::Receiver<Settings>,
}

impl Session {
    pub fn new(mut settings: watch::Receiver<Settings>) -> Self {
        let remaining_seconds = minutes_to_seconds(settings.borrow_and_update().work_duration);
        Self {
            mode: Mode::Work,
            remaining_seconds,
            running: false,
            completed_work_count: 0,
            selected_task: None,
            pending_switch: None,
            settings,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn completed_work_count(&self) -> u32 {
        self.completed_work_count
    }

    pub fn pending_switch(&self) -> Option<Mode> {
        self.pending_switch
    }

    pub fn total_seconds(&self) -> u32 {
        minutes_to_seconds(self.settings.borrow().duration_for(self.mode))
    }

    /// 0.0 .. 1.0 through the current interval.
    pub fn progress(&self) -> f64 {
        let total = self.total_seconds();
        if total == 0 {
            return 0.0;
        }
        let elapsed = total.saturating_sub(self.remaining_seconds);
        (elapsed as f64 / total as f64).min(1.0)
    }

    // ── Selection ────────────────────────────────────────────────────

    pub fn selected_task(&self) -> Option<TaskId> {
        self.selected_task
    }

    /// Any id is accepted. One that no longer exists is simply not credited.
    pub fn select_task(&mut self, id: Option<TaskId>) {
        self.selected_task = id;
        debug!(?id, "Selected task");
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Pauses and loads the full duration of `mode`.
    pub fn switch_mode(&mut self, mode: Mode) {
        self.running = false;
        self.pending_switch = None;
        self.mode = mode;
        self.remaining_seconds = self.total_seconds();
        info!(%mode, remaining = self.remaining_seconds, "Switched mode");
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            info!(mode = %self.mode, remaining = self.remaining_seconds, "Timer started");
        }
    }

    pub fn pause(&mut self) {
        if self.running {
            self.running = false;
            info!(mode = %self.mode, remaining = self.remaining_seconds, "Timer paused");
        }
    }

    pub fn toggle(&mut self) {
        if self.running {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Switches right away when paused. While running the request is held
    /// until confirmed.
    pub fn request_switch_mode(&mut self, mode: Mode) -> SwitchOutcome {
        if self.running {
            self.pending_switch = Some(mode);
            SwitchOutcome::NeedsConfirmation
        } else {
            self.switch_mode(mode);
            SwitchOutcome::Switched
        }
    }

    pub fn confirm_switch(&mut self) -> Option<Mode> {
        let mode = self.pending_switch.take()?;
        self.switch_mode(mode);
        Some(mode)
    }

    pub fn cancel_switch(&mut self) -> Option<Mode> {
        self.pending_switch.take()
    }

    /// Picks up a published settings change. The current mode restarts at
    /// its new full duration, paused. Returns whether anything was applied.
    pub fn sync_settings(&mut self) -> bool {
        if !matches!(self.settings.has_changed(), Ok(true)) {
            return false;
        }
        self.settings.borrow_and_update();
        self.switch_mode(self.mode);
        true
    }

    /// One second of countdown. Completes the interval when the countdown
    /// is at zero. Does nothing while paused.
    pub fn tick(&mut self, tasks: &mut TaskStore, alarm: &dyn Alarm) -> Option<Completion> {
        if !self.running {
            return None;
        }
        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
        }
        if self.remaining_seconds > 0 {
            return None;
        }
        Some(self.complete(tasks, alarm))
    }

    fn complete(&mut self, tasks: &mut TaskStore, alarm: &dyn Alarm) -> Completion {
        let settings = self.settings.borrow().clone();
        let finished = self.mode;
        alarm.ring(finished, &settings.alarm_sound, settings.alarm_volume);

        let mut credited = None;
        let (next, auto_start) = match finished {
            Mode::Work => {
                self.completed_work_count += 1;
                credited = self.credit_selected(tasks);
                let long = self.completed_work_count % settings.long_break_interval.max(1) == 0;
                let next = if long { Mode::LongBreak } else { Mode::ShortBreak };
                (next, settings.auto_start_breaks)
            }
            Mode::ShortBreak | Mode::LongBreak => (Mode::Work, settings.auto_start_work),
        };

        info!(
            %finished,
            %next,
            completed_work = self.completed_work_count,
            "Interval complete"
        );
        self.switch_mode(next);
        if auto_start {
            self.start();
        }

        Completion {
            finished,
            next,
            credited,
            auto_started: auto_start,
        }
    }

    fn credit_selected(&self, tasks: &mut TaskStore) -> Option<TaskId> {
        let id = self.selected_task?;
        match tasks.increment_actual(id) {
            Ok(actual) => {
                info!(id, actual, "Credited work interval to task");
                Some(id)
            }
            Err(TaskError::NotFound(_)) => {
                debug!(id, "Selected task is gone, nothing credited");
                None
            }
            Err(e) => {
                warn!(id, "Credited work interval but {}", e);
                Some(id)
            }
        }
    }

    // ── Projections ──────────────────────────────────────────────────

    /// `MM:SS - <mode>` while running, the app name otherwise.
    pub fn title(&self) -> String {
        if self.running {
            format!("{} - {}", format_clock(self.remaining_seconds), self.mode.label())
        } else {
            APP_NAME.to_string()
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            mode: self.mode,
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_seconds(),
            running: self.running,
            completed_work_count: self.completed_work_count,
            selected_task: self.selected_task,
            title: self.title(),
        }
    }
}

fn minutes_to_seconds(minutes: u32) -> u32 {
    minutes.saturating_mul(60)
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::testing::RecordingAlarm;
    use crate::storage::{KvStore, MemoryStore};
    use std::sync::Arc;

    struct Harness {
        settings: watch::Sender<Settings>,
        session: Session,
        tasks: TaskStore,
        alarm: RecordingAlarm,
    }

    fn harness(settings: Settings) -> Harness {
        let (tx, rx) = watch::channel(settings);
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        Harness {
            settings: tx,
            session: Session::new(rx),
            tasks: TaskStore::load(kv),
            alarm: RecordingAlarm::default(),
        }
    }

    fn quick() -> Settings {
        Settings {
            work_duration: 1,
            short_break_duration: 1,
            long_break_duration: 2,
            ..Settings::default()
        }
    }

    impl Harness {
        fn tick(&mut self) -> Option<Completion> {
            self.session.tick(&mut self.tasks, &self.alarm)
        }

        /// Starts the session and ticks until the interval completes.
        fn run_out(&mut self) -> Completion {
            self.session.start();
            for _ in 0..=self.session.remaining_seconds() {
                if let Some(done) = self.tick() {
                    return done;
                }
            }
            panic!("interval never completed");
        }
    }

    #[test]
    fn switch_mode_loads_full_duration_and_pauses() {
        let mut h = harness(Settings::default());
        for (mode, minutes) in [(Mode::Work, 25), (Mode::ShortBreak, 5), (Mode::LongBreak, 15)] {
            h.session.start();
            h.session.switch_mode(mode);
            assert_eq!(h.session.mode(), mode);
            assert_eq!(h.session.remaining_seconds(), minutes * 60);
            assert!(!h.session.is_running());
        }
    }

    #[test]
    fn tick_is_a_no_op_while_paused() {
        let mut h = harness(Settings::default());
        assert_eq!(h.tick(), None);
        assert_eq!(h.session.remaining_seconds(), 1500);

        h.session.start();
        h.tick();
        h.session.pause();
        h.tick();
        assert_eq!(h.session.remaining_seconds(), 1499);
    }

    #[test]
    fn start_and_pause_keep_mode_and_countdown() {
        let mut h = harness(Settings::default());
        h.session.switch_mode(Mode::ShortBreak);
        h.session.toggle();
        assert!(h.session.is_running());
        h.tick();
        h.session.toggle();
        assert!(!h.session.is_running());
        assert_eq!(h.session.mode(), Mode::ShortBreak);
        assert_eq!(h.session.remaining_seconds(), 299);
    }

    #[test]
    fn countdown_decreases_by_one_and_completes_once() {
        let mut h = harness(quick());
        h.session.start();
        let mut completions = 0;
        let mut previous = h.session.remaining_seconds();
        for _ in 0..60 {
            match h.tick() {
                Some(_) => completions += 1,
                None => {
                    assert_eq!(h.session.remaining_seconds(), previous - 1);
                    previous = h.session.remaining_seconds();
                }
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(h.alarm.rings.borrow().len(), 1);
        assert_eq!(h.session.mode(), Mode::ShortBreak);
        assert_eq!(h.session.completed_work_count(), 1);

        // Paused after completion: more ticks change nothing.
        for _ in 0..10 {
            assert_eq!(h.tick(), None);
        }
        assert_eq!(h.session.completed_work_count(), 1);
    }

    #[test]
    fn default_settings_first_pomodoro() {
        let mut h = harness(Settings::default());
        h.session.switch_mode(Mode::Work);
        assert_eq!(h.session.remaining_seconds(), 1500);
        h.session.start();

        let mut completion = None;
        for _ in 0..1500 {
            completion = h.tick();
        }

        let completion = completion.expect("the 1500th tick completes the interval");
        assert_eq!(completion.finished, Mode::Work);
        assert_eq!(completion.next, Mode::ShortBreak);
        assert!(!completion.auto_started);
        assert_eq!(h.session.completed_work_count(), 1);
        assert_eq!(h.session.mode(), Mode::ShortBreak);
        assert_eq!(h.session.remaining_seconds(), 300);
        assert!(!h.session.is_running());
    }

    #[test]
    fn every_fourth_work_interval_earns_a_long_break() {
        let mut h = harness(quick());
        let mut long_breaks = Vec::new();
        for n in 1..=12 {
            let done = h.run_out();
            assert_eq!(done.finished, Mode::Work);
            if done.next == Mode::LongBreak {
                long_breaks.push(n);
            } else {
                assert_eq!(done.next, Mode::ShortBreak);
            }
            let back = h.run_out();
            assert_eq!(back.next, Mode::Work);
        }
        assert_eq!(long_breaks, vec![4, 8, 12]);
    }

    #[test]
    fn completion_credits_only_the_selected_task() {
        let mut h = harness(quick());
        let a = h.tasks.add("A", 2).unwrap();
        let b = h.tasks.add("B", 1).unwrap();
        h.session.select_task(Some(a.id));

        let done = h.run_out();
        assert_eq!(done.credited, Some(a.id));
        assert_eq!(h.tasks.get(a.id).unwrap().actual_units, 1);
        assert_eq!(h.tasks.get(b.id).unwrap().actual_units, 0);

        // Breaks never credit.
        let back = h.run_out();
        assert_eq!(back.credited, None);
        assert_eq!(h.tasks.get(a.id).unwrap().actual_units, 1);
    }

    #[test]
    fn completion_without_selection_touches_no_task() {
        let mut h = harness(quick());
        let a = h.tasks.add("A", 2).unwrap();

        let done = h.run_out();
        assert_eq!(done.credited, None);
        assert_eq!(h.tasks.get(a.id).unwrap().actual_units, 0);
    }

    #[test]
    fn deleting_the_selected_task_mid_interval_is_tolerated() {
        let mut h = harness(quick());
        let a = h.tasks.add("A", 2).unwrap();
        let b = h.tasks.add("B", 2).unwrap();
        h.session.select_task(Some(a.id));
        h.session.start();
        h.tick();
        h.tasks.remove(a.id).unwrap();

        let done = h.run_out();
        assert_eq!(done.credited, None);
        assert_eq!(h.session.selected_task(), Some(a.id));
        assert_eq!(h.tasks.get(b.id).unwrap().actual_units, 0);
        assert_eq!(h.session.completed_work_count(), 1);
    }

    #[test]
    fn auto_start_flags_resume_the_next_interval() {
        let mut h = harness(Settings {
            auto_start_breaks: true,
            ..quick()
        });
        let done = h.run_out();
        assert!(done.auto_started);
        assert!(h.session.is_running());
        assert_eq!(h.session.mode(), Mode::ShortBreak);

        let back = h.run_out();
        assert!(!back.auto_started);
        assert!(!h.session.is_running());
        assert_eq!(h.session.mode(), Mode::Work);
    }

    #[test]
    fn alarm_uses_configured_sound_and_volume() {
        let mut h = harness(Settings {
            alarm_sound: "bell".to_string(),
            alarm_volume: 0.25,
            ..quick()
        });
        h.run_out();
        let rings = h.alarm.rings.borrow();
        assert_eq!(rings.as_slice(), &[(Mode::Work, "bell".to_string(), 0.25)]);
    }

    #[test]
    fn settings_change_resets_countdown_to_new_duration() {
        let mut h = harness(Settings::default());
        h.session.start();
        for _ in 0..1200 {
            h.tick();
        }
        assert_eq!(h.session.remaining_seconds(), 300);

        h.settings.send_replace(Settings {
            work_duration: 20,
            ..Settings::default()
        });
        assert!(h.session.sync_settings());
        assert_eq!(h.session.mode(), Mode::Work);
        assert_eq!(h.session.remaining_seconds(), 1200);
        assert!(!h.session.is_running());

        // Nothing new published.
        assert!(!h.session.sync_settings());
    }

    #[test]
    fn switch_request_while_running_waits_for_confirmation() {
        let mut h = harness(Settings::default());
        h.session.start();
        h.tick();

        assert_eq!(
            h.session.request_switch_mode(Mode::LongBreak),
            SwitchOutcome::NeedsConfirmation
        );
        assert_eq!(h.session.mode(), Mode::Work);
        assert!(h.session.is_running());
        assert_eq!(h.session.remaining_seconds(), 1499);

        assert_eq!(h.session.cancel_switch(), Some(Mode::LongBreak));
        assert_eq!(h.session.confirm_switch(), None);
        assert_eq!(h.session.mode(), Mode::Work);

        h.session.request_switch_mode(Mode::LongBreak);
        assert_eq!(h.session.confirm_switch(), Some(Mode::LongBreak));
        assert_eq!(h.session.mode(), Mode::LongBreak);
        assert_eq!(h.session.remaining_seconds(), 900);
        assert!(!h.session.is_running());
    }

    #[test]
    fn switch_request_while_paused_applies_immediately() {
        let mut h = harness(Settings::default());
        assert_eq!(
            h.session.request_switch_mode(Mode::ShortBreak),
            SwitchOutcome::Switched
        );
        assert_eq!(h.session.mode(), Mode::ShortBreak);
        assert_eq!(h.session.pending_switch(), None);
    }

    #[test]
    fn zero_duration_completes_on_first_tick() {
        let mut h = harness(Settings {
            work_duration: 0,
            ..Settings::default()
        });
        assert_eq!(h.session.remaining_seconds(), 0);
        h.session.start();
        let done = h.tick().expect("completes immediately");
        assert_eq!(done.next, Mode::ShortBreak);
        assert_eq!(h.session.remaining_seconds(), 300);
    }

    #[test]
    fn title_reflects_running_state() {
        let mut h = harness(Settings::default());
        assert_eq!(h.session.title(), APP_NAME);
        h.session.start();
        h.tick();
        assert_eq!(h.session.title(), "24:59 - Pomodoro");
        h.session.switch_mode(Mode::ShortBreak);
        h.session.start();
        assert_eq!(h.session.title(), "05:00 - Short Break");
    }

    #[test]
    fn progress_tracks_elapsed_fraction() {
        let mut h = harness(quick());
        assert_eq!(h.session.progress(), 0.0);
        h.session.start();
        for _ in 0..30 {
            h.tick();
        }
        assert!((h.session.progress() - 0.5).abs() < f64::EPSILON);
    }
}
