use crate::alarm::Alarm;
use crate::config::Config;
use crate::session::{Completion, Session, SwitchOutcome};
use crate::settings::SettingsStore;
use crate::storage::{KvStore, StoreError};
use crate::tasks::{Task, TaskError, TaskStore};
use crate::ticker::{Pulse, Ticker};
use chrono::{DateTime, Local, TimeDelta};
use pocus_ipc::{Command, Mode, Response, Settings, SettingsPatch, TaskId, TaskInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// Application root. Owns the stores, the session and the ticker; every
/// mutation goes through here on the event loop's task.
pub struct App {
    pub settings: SettingsStore,
    pub tasks: TaskStore,
    pub session: Session,
    ticker: Ticker,
    alarm: Box<dyn Alarm>,
    pub config: Config,
    pub mode: AppMode,
    pub input_buffer: String,
    /// Index into `tasks.ordered()`.
    pub cursor: usize,
    pub message: Option<String>,
    pub should_quit: bool,
}

#[derive(Default, Clone, PartialEq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    AddingTask,
    EstimatingTask { title: String },
    EditingTitle(TaskId),
    EditingEstimate { id: TaskId, title: String },
    ConfirmSwitch(Mode),
    Settings(SettingsForm),
    ShowHelp,
}

impl App {
    pub fn new(config: Config, store: Arc<dyn KvStore>, alarm: Box<dyn Alarm>, ticker: Ticker) -> Self {
        let settings = SettingsStore::load(store.clone());
        let tasks = TaskStore::load(store);
        let mut session = Session::new(settings.subscribe());
        session.select_task(tasks.first_incomplete().map(|t| t.id));
        Self {
            settings,
            tasks,
            session,
            ticker,
            alarm,
            config,
            mode: AppMode::Normal,
            input_buffer: String::new(),
            cursor: 0,
            message: None,
            should_quit: false,
        }
    }

    fn sync_ticker(&mut self) {
        self.ticker.set_active(self.session.is_running());
    }

    // ── Timer ────────────────────────────────────────────────────────

    pub fn start_timer(&mut self) {
        self.session.start();
        self.sync_ticker();
    }

    pub fn pause_timer(&mut self) {
        self.session.pause();
        self.sync_ticker();
    }

    pub fn toggle_timer(&mut self) {
        self.session.toggle();
        self.sync_ticker();
    }

    /// Asks for confirmation in the UI when the timer is running.
    pub fn request_mode(&mut self, mode: Mode) {
        if self.session.request_switch_mode(mode) == SwitchOutcome::NeedsConfirmation {
            self.mode = AppMode::ConfirmSwitch(mode);
        }
        self.sync_ticker();
    }

    pub fn confirm_switch(&mut self) {
        self.session.confirm_switch();
        self.mode = AppMode::Normal;
        self.sync_ticker();
    }

    pub fn cancel_switch(&mut self) {
        self.session.cancel_switch();
        self.mode = AppMode::Normal;
    }

    pub fn on_pulse(&mut self, pulse: Pulse) -> Option<Completion> {
        if !self.ticker.accepts(&pulse) {
            debug!(generation = pulse.generation, "Dropping stale pulse");
            return None;
        }
        let completion = self.session.tick(&mut self.tasks, self.alarm.as_ref());
        self.sync_ticker();
        if let Some(done) = &completion {
            if matches!(self.mode, AppMode::ConfirmSwitch(_)) {
                self.mode = AppMode::Normal;
            }
            self.message = Some(format!("{} finished, next up: {}", done.finished, done.next));
        }
        completion
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// The running interval restarts, paused, at its new full duration.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let result = self.settings.update(patch);
        self.session.sync_settings();
        self.sync_ticker();
        result
    }

    pub fn open_settings(&mut self) {
        self.mode = AppMode::Settings(SettingsForm::new(self.settings.get()));
    }

    pub fn save_settings_form(&mut self) {
        if let AppMode::Settings(form) = &self.mode {
            let patch = form.to_patch();
            if let Err(e) = self.update_settings(&patch) {
                self.report(e);
            }
        }
        self.mode = AppMode::Normal;
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// The first task added while nothing is selected becomes the selection.
    pub fn add_task(&mut self, title: &str, estimated_units: u32) -> Result<Task, TaskError> {
        let task = match self.tasks.add(title, estimated_units) {
            Ok(task) => task,
            Err(TaskError::Store(e)) => {
                // Kept in memory even though the write failed.
                self.report(&e);
                self.tasks.all().last().cloned().ok_or(TaskError::Store(e))?
            }
            Err(e) => return Err(e),
        };
        if self.session.selected_task().is_none() {
            self.session.select_task(Some(task.id));
        }
        Ok(task)
    }

    pub fn update_task(
        &mut self,
        id: TaskId,
        title: Option<&str>,
        estimated_units: Option<u32>,
    ) -> Result<Task, TaskError> {
        let current = self.tasks.get(id).ok_or(TaskError::NotFound(id))?;
        let title = title.unwrap_or(current.title.as_str()).to_string();
        let estimated_units = estimated_units.unwrap_or(current.estimated_units);
        self.tasks.update(id, &title, estimated_units)?;
        self.tasks.get(id).cloned().ok_or(TaskError::NotFound(id))
    }

    pub fn toggle_task(&mut self, id: TaskId) -> Result<bool, TaskError> {
        self.tasks.toggle_complete(id)
    }

    /// The selection is left as is, even when it pointed at `id`.
    pub fn remove_task(&mut self, id: TaskId) -> Result<Task, TaskError> {
        let removed = self.tasks.remove(id);
        self.clamp_cursor();
        removed
    }

    pub fn select_task(&mut self, id: Option<TaskId>) {
        self.session.select_task(id);
    }

    pub fn task_infos(&self) -> Vec<TaskInfo> {
        let selected = self.session.selected_task();
        self.tasks
            .ordered()
            .into_iter()
            .map(|t| t.info(Some(t.id) == selected))
            .collect()
    }

    /// When the remaining estimated work would be done, back to back.
    /// `None` when that lies beyond what a date can represent.
    pub fn finish_estimate(&self) -> Option<DateTime<Local>> {
        let minutes = i64::from(self.tasks.remaining_units())
            .checked_mul(i64::from(self.settings.get().work_duration))?;
        Local::now().checked_add_signed(TimeDelta::try_minutes(minutes)?)
    }

    // ── Cursor ───────────────────────────────────────────────────────

    pub fn cursor_task(&self) -> Option<TaskId> {
        self.tasks.ordered().get(self.cursor).map(|t| t.id)
    }

    pub fn move_cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_down(&mut self) {
        if !self.tasks.is_empty() {
            self.cursor = (self.cursor + 1).min(self.tasks.len() - 1);
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.tasks.len().saturating_sub(1));
    }

    pub fn select_cursor_task(&mut self) {
        if let Some(id) = self.cursor_task() {
            self.select_task(Some(id));
        }
    }

    pub fn toggle_cursor_task(&mut self) {
        if let Some(id) = self.cursor_task() {
            if let Err(e) = self.toggle_task(id) {
                self.report(e);
            }
        }
    }

    pub fn delete_cursor_task(&mut self) {
        if let Some(id) = self.cursor_task() {
            if let Err(e) = self.remove_task(id) {
                self.report(e);
            }
        }
    }

    pub fn begin_add_task(&mut self) {
        self.mode = AppMode::AddingTask;
        self.input_buffer.clear();
    }

    pub fn begin_edit_task(&mut self) {
        if let Some(task) = self.cursor_task().and_then(|id| self.tasks.get(id)) {
            self.input_buffer = task.title.clone();
            self.mode = AppMode::EditingTitle(task.id);
        }
    }

    // ── Text input ───────────────────────────────────────────────────

    pub fn handle_char(&mut self, c: char) {
        match self.mode.clone() {
            AppMode::AddingTask => {
                if c == '\n' {
                    if self.input_buffer.trim().is_empty() {
                        self.cancel_input();
                    } else {
                        let title = std::mem::take(&mut self.input_buffer);
                        self.input_buffer.push('1');
                        self.mode = AppMode::EstimatingTask { title };
                    }
                } else {
                    self.input_buffer.push(c);
                }
            }
            AppMode::EstimatingTask { title } => {
                if c == '\n' {
                    let estimate = parse_units(&self.input_buffer).unwrap_or(1);
                    if let Err(e) = self.add_task(&title, estimate) {
                        self.report(e);
                    }
                    self.cancel_input();
                } else if c.is_ascii_digit() {
                    self.input_buffer.push(c);
                }
            }
            AppMode::EditingTitle(id) => {
                if c == '\n' {
                    let title = std::mem::take(&mut self.input_buffer);
                    self.input_buffer = self
                        .tasks
                        .get(id)
                        .map_or(1, |t| t.estimated_units)
                        .to_string();
                    self.mode = AppMode::EditingEstimate { id, title };
                } else {
                    self.input_buffer.push(c);
                }
            }
            AppMode::EditingEstimate { id, title } => {
                if c == '\n' {
                    let estimate = parse_units(&self.input_buffer);
                    if let Err(e) = self.update_task(id, Some(&title), estimate) {
                        self.report(e);
                    }
                    self.cancel_input();
                } else if c.is_ascii_digit() {
                    self.input_buffer.push(c);
                }
            }
            _ => {}
        }
    }

    pub fn handle_backspace(&mut self) {
        if self.is_editing_text() {
            self.input_buffer.pop();
        }
    }

    pub fn cancel_input(&mut self) {
        self.input_buffer.clear();
        self.mode = AppMode::Normal;
    }

    pub fn is_editing_text(&self) -> bool {
        matches!(
            self.mode,
            AppMode::AddingTask
                | AppMode::EstimatingTask { .. }
                | AppMode::EditingTitle(_)
                | AppMode::EditingEstimate { .. }
        )
    }

    fn report(&mut self, error: impl std::fmt::Display) {
        warn!("{}", error);
        self.message = Some(error.to_string());
    }

    // ── IPC ──────────────────────────────────────────────────────────

    pub fn handle_command(&mut self, command: Command) -> Response {
        match command {
            Command::Start => {
                self.start_timer();
                Response::Ok
            }
            Command::Pause => {
                self.pause_timer();
                Response::Ok
            }
            Command::Toggle => {
                self.toggle_timer();
                Response::Ok
            }
            Command::SwitchMode { mode, confirm } => {
                let response = match self.session.request_switch_mode(mode) {
                    SwitchOutcome::Switched => Response::Ok,
                    SwitchOutcome::NeedsConfirmation if confirm => {
                        self.session.confirm_switch();
                        Response::Ok
                    }
                    SwitchOutcome::NeedsConfirmation => {
                        self.session.cancel_switch();
                        Response::ConfirmationRequired { mode }
                    }
                };
                if response == Response::Ok && matches!(self.mode, AppMode::ConfirmSwitch(_)) {
                    self.mode = AppMode::Normal;
                }
                self.sync_ticker();
                response
            }
            Command::Status => Response::Status(self.session.status()),
            Command::AddTask {
                title,
                estimated_units,
            } => match self.add_task(&title, estimated_units) {
                Ok(task) => Response::Task(task.info(self.session.selected_task() == Some(task.id))),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::ListTasks => Response::Tasks(self.task_infos()),
            Command::ToggleTask { id } => match self.toggle_task(id) {
                Ok(_) => Response::Ok,
                Err(e) => Response::Error(e.to_string()),
            },
            Command::UpdateTask {
                id,
                title,
                estimated_units,
            } => match self.update_task(id, title.as_deref(), estimated_units) {
                Ok(task) => Response::Task(task.info(self.session.selected_task() == Some(task.id))),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::RemoveTask { id } => match self.remove_task(id) {
                Ok(_) => Response::Ok,
                Err(e) => Response::Error(e.to_string()),
            },
            Command::SelectTask { id } => {
                self.select_task(id);
                Response::Ok
            }
            Command::GetSettings => Response::Settings(self.settings.get().clone()),
            Command::UpdateSettings(patch) => match self.update_settings(&patch) {
                Ok(settings) => Response::Settings(settings),
                Err(e) => Response::Error(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    WorkDuration,
    ShortBreakDuration,
    LongBreakDuration,
    AutoStartBreaks,
    AutoStartWork,
    LongBreakInterval,
    AlarmVolume,
}

impl SettingsField {
    pub const ALL: [SettingsField; 7] = [
        SettingsField::WorkDuration,
        SettingsField::ShortBreakDuration,
        SettingsField::LongBreakDuration,
        SettingsField::AutoStartBreaks,
        SettingsField::AutoStartWork,
        SettingsField::LongBreakInterval,
        SettingsField::AlarmVolume,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SettingsField::WorkDuration => "Pomodoro (min)",
            SettingsField::ShortBreakDuration => "Short Break (min)",
            SettingsField::LongBreakDuration => "Long Break (min)",
            SettingsField::AutoStartBreaks => "Auto start Breaks",
            SettingsField::AutoStartWork => "Auto start Pomodoros",
            SettingsField::LongBreakInterval => "Long Break interval",
            SettingsField::AlarmVolume => "Alarm volume",
        }
    }
}

/// Draft copy edited in the settings overlay; applied as a whole on save.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsForm {
    pub draft: Settings,
    pub field: usize,
}

impl SettingsForm {
    pub fn new(settings: &Settings) -> Self {
        Self {
            draft: settings.clone(),
            field: 0,
        }
    }

    pub fn current(&self) -> SettingsField {
        SettingsField::ALL[self.field % SettingsField::ALL.len()]
    }

    pub fn next(&mut self) {
        self.field = (self.field + 1) % SettingsField::ALL.len();
    }

    pub fn prev(&mut self) {
        self.field = (self.field + SettingsField::ALL.len() - 1) % SettingsField::ALL.len();
    }

    /// Steps numbers by `delta` (volume by tenths) and flips switches.
    pub fn adjust(&mut self, delta: i32) {
        let field = self.current();
        let d = &mut self.draft;
        match field {
            SettingsField::WorkDuration => d.work_duration = step(d.work_duration, delta),
            SettingsField::ShortBreakDuration => {
                d.short_break_duration = step(d.short_break_duration, delta)
            }
            SettingsField::LongBreakDuration => {
                d.long_break_duration = step(d.long_break_duration, delta)
            }
            SettingsField::LongBreakInterval => {
                d.long_break_interval = step(d.long_break_interval, delta)
            }
            SettingsField::AutoStartBreaks => d.auto_start_breaks = !d.auto_start_breaks,
            SettingsField::AutoStartWork => d.auto_start_work = !d.auto_start_work,
            SettingsField::AlarmVolume => {
                let volume = d.alarm_volume + delta as f32 * 0.1;
                d.alarm_volume = ((volume * 10.0).round() / 10.0).clamp(0.0, 1.0);
            }
        }
    }

    pub fn value_text(&self, field: SettingsField) -> String {
        let d = &self.draft;
        let on_off = |b: bool| if b { "on" } else { "off" }.to_string();
        match field {
            SettingsField::WorkDuration => d.work_duration.to_string(),
            SettingsField::ShortBreakDuration => d.short_break_duration.to_string(),
            SettingsField::LongBreakDuration => d.long_break_duration.to_string(),
            SettingsField::AutoStartBreaks => on_off(d.auto_start_breaks),
            SettingsField::AutoStartWork => on_off(d.auto_start_work),
            SettingsField::LongBreakInterval => d.long_break_interval.to_string(),
            SettingsField::AlarmVolume => format!("{:.0}%", d.alarm_volume * 100.0),
        }
    }

    pub fn to_patch(&self) -> SettingsPatch {
        let d = &self.draft;
        SettingsPatch {
            work_duration: Some(d.work_duration),
            short_break_duration: Some(d.short_break_duration),
            long_break_duration: Some(d.long_break_duration),
            auto_start_breaks: Some(d.auto_start_breaks),
            auto_start_work: Some(d.auto_start_work),
            long_break_interval: Some(d.long_break_interval),
            alarm_sound: Some(d.alarm_sound.clone()),
            alarm_volume: Some(d.alarm_volume),
        }
    }
}

/// Digits typed into an estimate field. Values past `u32::MAX` clamp to it.
fn parse_units(input: &str) -> Option<u32> {
    let digits = input.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(u32::MAX))
}

fn step(value: u32, delta: i32) -> u32 {
    (value as i64 + delta as i64).clamp(1, u32::MAX as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::NoAlarm;
    use crate::storage::{self, MemoryStore, TASKS_KEY};
    use tokio::sync::mpsc;

    fn app_with(store: Arc<dyn KvStore>) -> (App, mpsc::Receiver<Pulse>) {
        let (tx, rx) = mpsc::channel(8);
        let app = App::new(Config::default(), store, Box::new(NoAlarm), Ticker::new(tx));
        (app, rx)
    }

    fn app() -> (App, mpsc::Receiver<Pulse>) {
        app_with(Arc::new(MemoryStore::new()))
    }

    fn current_pulse(app: &App) -> Pulse {
        Pulse {
            generation: app.ticker.generation(),
        }
    }

    #[tokio::test]
    async fn first_added_task_becomes_selected() {
        let (mut app, _rx) = app();
        let a = app.add_task("A", 2).unwrap();
        let b = app.add_task("B", 1).unwrap();
        assert_eq!(app.session.selected_task(), Some(a.id));
        assert_ne!(app.session.selected_task(), Some(b.id));
    }

    #[tokio::test]
    async fn startup_selects_first_incomplete_task() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let json = r#"[
            {"id": 1, "title": "done", "completed": true, "estimatedUnits": 1, "actualUnits": 1},
            {"id": 2, "title": "open", "completed": false, "estimatedUnits": 2, "actualUnits": 0}
        ]"#;
        store.set(TASKS_KEY, json).unwrap();

        let (app, _rx) = app_with(store);
        assert_eq!(app.session.selected_task(), Some(2));
        assert_eq!(app.task_infos()[0].id, 2);
        assert!(app.task_infos()[0].selected);
    }

    #[tokio::test]
    async fn ticker_follows_running_flag() {
        let (mut app, _rx) = app();
        assert!(!app.ticker.is_active());
        app.toggle_timer();
        assert!(app.ticker.is_active());
        let generation = app.ticker.generation();

        app.start_timer();
        assert_eq!(app.ticker.generation(), generation);

        app.pause_timer();
        assert!(!app.ticker.is_active());
    }

    #[tokio::test]
    async fn stale_pulses_are_ignored() {
        let (mut app, _rx) = app();
        app.start_timer();
        let stale = Pulse {
            generation: app.ticker.generation() + 7,
        };
        assert_eq!(app.on_pulse(stale), None);
        assert_eq!(app.session.remaining_seconds(), 1500);

        app.on_pulse(current_pulse(&app));
        assert_eq!(app.session.remaining_seconds(), 1499);
    }

    #[tokio::test]
    async fn full_work_interval_through_pulses_credits_selected_task() {
        let (mut app, _rx) = app();
        app.update_settings(&SettingsPatch {
            work_duration: Some(1),
            ..SettingsPatch::default()
        })
        .unwrap();
        let a = app.add_task("A", 2).unwrap();
        app.start_timer();

        let mut completion = None;
        for _ in 0..60 {
            completion = completion.or(app.on_pulse(current_pulse(&app)));
        }

        let done = completion.expect("work interval completed");
        assert_eq!(done.credited, Some(a.id));
        assert_eq!(app.tasks.get(a.id).unwrap().actual_units, 1);
        assert_eq!(app.session.mode(), Mode::ShortBreak);
        assert!(!app.ticker.is_active());
        assert!(app.message.is_some());
    }

    #[tokio::test]
    async fn settings_update_resets_and_pauses_running_interval() {
        let (mut app, _rx) = app();
        app.start_timer();
        for _ in 0..10 {
            app.on_pulse(current_pulse(&app));
        }

        app.update_settings(&SettingsPatch {
            work_duration: Some(20),
            ..SettingsPatch::default()
        })
        .unwrap();
        assert_eq!(app.session.remaining_seconds(), 1200);
        assert!(!app.session.is_running());
        assert!(!app.ticker.is_active());
    }

    #[tokio::test]
    async fn switch_command_needs_confirmation_while_running() {
        let (mut app, _rx) = app();
        app.start_timer();

        let response = app.handle_command(Command::SwitchMode {
            mode: Mode::LongBreak,
            confirm: false,
        });
        assert_eq!(
            response,
            Response::ConfirmationRequired {
                mode: Mode::LongBreak
            }
        );
        assert_eq!(app.session.mode(), Mode::Work);
        assert!(app.session.is_running());
        assert_eq!(app.session.pending_switch(), None);

        let response = app.handle_command(Command::SwitchMode {
            mode: Mode::LongBreak,
            confirm: true,
        });
        assert_eq!(response, Response::Ok);
        assert_eq!(app.session.mode(), Mode::LongBreak);
        assert!(!app.ticker.is_active());
    }

    #[tokio::test]
    async fn ui_switch_request_opens_confirmation() {
        let (mut app, _rx) = app();
        app.start_timer();
        app.request_mode(Mode::ShortBreak);
        assert_eq!(app.mode, AppMode::ConfirmSwitch(Mode::ShortBreak));

        app.cancel_switch();
        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.session.mode(), Mode::Work);

        app.request_mode(Mode::ShortBreak);
        app.confirm_switch();
        assert_eq!(app.session.mode(), Mode::ShortBreak);
        assert_eq!(app.session.remaining_seconds(), 300);
    }

    #[tokio::test]
    async fn task_commands_report_unknown_ids() {
        let (mut app, _rx) = app();
        assert!(matches!(
            app.handle_command(Command::ToggleTask { id: 42 }),
            Response::Error(_)
        ));
        assert!(matches!(
            app.handle_command(Command::RemoveTask { id: 42 }),
            Response::Error(_)
        ));
        assert_eq!(app.handle_command(Command::SelectTask { id: Some(42) }), Response::Ok);
        assert_eq!(app.session.selected_task(), Some(42));
    }

    #[tokio::test]
    async fn update_task_command_fills_missing_fields() {
        let (mut app, _rx) = app();
        let a = app.add_task("A", 2).unwrap();
        let response = app.handle_command(Command::UpdateTask {
            id: a.id,
            title: None,
            estimated_units: Some(5),
        });
        match response {
            Response::Task(info) => {
                assert_eq!(info.title, "A");
                assert_eq!(info.estimated_units, 5);
                assert!(info.selected);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_flow_through_text_input() {
        let (mut app, _rx) = app();
        app.begin_add_task();
        for c in "Plan sprint\n".chars() {
            app.handle_char(c);
        }
        assert!(matches!(app.mode, AppMode::EstimatingTask { .. }));
        app.handle_backspace();
        for c in "3\n".chars() {
            app.handle_char(c);
        }

        assert_eq!(app.mode, AppMode::Normal);
        let task = &app.tasks.all()[0];
        assert_eq!(task.title, "Plan sprint");
        assert_eq!(task.estimated_units, 3);
    }

    #[tokio::test]
    async fn cursor_follows_partitioned_order() {
        let (mut app, _rx) = app();
        let a = app.add_task("A", 1).unwrap();
        let b = app.add_task("B", 1).unwrap();
        app.toggle_task(a.id).unwrap();

        assert_eq!(app.cursor_task(), Some(b.id));
        app.move_cursor_down();
        assert_eq!(app.cursor_task(), Some(a.id));
        app.move_cursor_down();
        assert_eq!(app.cursor_task(), Some(a.id));

        app.delete_cursor_task();
        assert_eq!(app.cursor_task(), Some(b.id));
    }

    #[tokio::test]
    async fn settings_form_saves_as_one_update() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let (mut app, _rx) = app_with(store.clone());
        app.open_settings();
        if let AppMode::Settings(form) = &mut app.mode {
            form.adjust(-30);
            form.next();
            form.adjust(2);
            form.next();
            form.next();
            form.adjust(1);
        }
        app.save_settings_form();

        let saved: Settings = storage::load_or_default(store.as_ref(), storage::SETTINGS_KEY);
        assert_eq!(saved.work_duration, 1);
        assert_eq!(saved.short_break_duration, 7);
        assert!(saved.auto_start_breaks);
        assert_eq!(app.mode, AppMode::Normal);
    }

    #[test]
    fn volume_steps_in_tenths_within_bounds() {
        let mut form = SettingsForm::new(&Settings::default());
        form.field = 6;
        assert_eq!(form.current(), SettingsField::AlarmVolume);
        for _ in 0..8 {
            form.adjust(1);
        }
        assert_eq!(form.draft.alarm_volume, 1.0);
        assert_eq!(form.value_text(SettingsField::AlarmVolume), "100%");
        form.prev();
        assert_eq!(form.current(), SettingsField::LongBreakInterval);
    }

    #[tokio::test]
    async fn finish_estimate_is_none_past_the_representable_range() {
        let (mut app, _rx) = app();
        assert!(app.finish_estimate().is_some());

        app.handle_command(Command::AddTask {
            title: "huge".to_string(),
            estimated_units: 1_000_000,
        });
        app.handle_command(Command::UpdateSettings(SettingsPatch {
            work_duration: Some(1_000_000),
            ..SettingsPatch::default()
        }));
        assert_eq!(app.finish_estimate(), None);
    }

    #[tokio::test]
    async fn oversized_typed_estimate_clamps_instead_of_resetting() {
        let (mut app, _rx) = app();
        app.begin_add_task();
        for c in "Big\n".chars() {
            app.handle_char(c);
        }
        app.handle_backspace();
        for c in "99999999999\n".chars() {
            app.handle_char(c);
        }
        assert_eq!(app.tasks.all()[0].estimated_units, u32::MAX);

        let id = app.tasks.all()[0].id;
        app.cursor = 0;
        app.begin_edit_task();
        app.handle_char('\n');
        app.input_buffer = "123456789012".to_string();
        app.handle_char('\n');
        assert_eq!(app.tasks.get(id).unwrap().estimated_units, u32::MAX);
    }

    #[test]
    fn parse_units_handles_empty_and_overflow() {
        assert_eq!(parse_units(""), None);
        assert_eq!(parse_units("7"), Some(7));
        assert_eq!(parse_units("4294967296"), Some(u32::MAX));
    }
}
