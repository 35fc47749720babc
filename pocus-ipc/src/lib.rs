//! Inter-process communication between pocus and pocusctl
//!
//! We use Unix domain sockets for local IPC. Each message is a single line
//! of JSON: the client writes a `Command`, the server answers with a
//! `Response`. The data contracts shared by both sides (timer settings,
//! session modes, task snapshots) live here as well.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub type TaskId = u32;

/// Commands that pocusctl can send to pocus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Pause,
    Toggle,
    /// Switching while the timer runs needs `confirm: true`.
    SwitchMode { mode: Mode, confirm: bool },
    Status,
    AddTask { title: String, estimated_units: u32 },
    ListTasks,
    ToggleTask { id: TaskId },
    UpdateTask {
        id: TaskId,
        title: Option<String>,
        estimated_units: Option<u32>,
    },
    RemoveTask { id: TaskId },
    SelectTask { id: Option<TaskId> },
    GetSettings,
    UpdateSettings(SettingsPatch),
}

/// Responses from pocus back to pocusctl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(SessionStatus),
    Task(TaskInfo),
    Tasks(Vec<TaskInfo>),
    Settings(Settings),
    ConfirmationRequired { mode: Mode },
    Error(String),
}

/// The three phases of a pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Work,
    ShortBreak,
    LongBreak,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Work, Mode::ShortBreak, Mode::LongBreak];

    pub fn label(self) -> &'static str {
        match self {
            Mode::Work => "Pomodoro",
            Mode::ShortBreak => "Short Break",
            Mode::LongBreak => "Long Break",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Mode::Work)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode '{0}' (expected work, short or long)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" | "pomodoro" => Ok(Mode::Work),
            "short" | "short-break" | "shortbreak" => Ok(Mode::ShortBreak),
            "long" | "long-break" | "longbreak" => Ok(Mode::LongBreak),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// User preferences. This is also the shape of the persisted `settings` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Minutes.
    pub work_duration: u32,
    pub short_break_duration: u32,
    pub long_break_duration: u32,
    pub auto_start_breaks: bool,
    pub auto_start_work: bool,
    /// Completed work intervals per long break.
    pub long_break_interval: u32,
    pub alarm_sound: String,
    pub alarm_volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            auto_start_breaks: false,
            auto_start_work: false,
            long_break_interval: 4,
            alarm_sound: "alarm-clock-elapsed".to_string(),
            alarm_volume: 0.5,
        }
    }
}

impl Settings {
    /// Configured length of `mode` in minutes.
    pub fn duration_for(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Work => self.work_duration,
            Mode::ShortBreak => self.short_break_duration,
            Mode::LongBreak => self.long_break_duration,
        }
    }
}

/// A partial settings change. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub work_duration: Option<u32>,
    pub short_break_duration: Option<u32>,
    pub long_break_duration: Option<u32>,
    pub auto_start_breaks: Option<bool>,
    pub auto_start_work: Option<bool>,
    pub long_break_interval: Option<u32>,
    pub alarm_sound: Option<String>,
    pub alarm_volume: Option<f32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub mode: Mode,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub running: bool,
    pub completed_work_count: u32,
    pub selected_task: Option<TaskId>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub title: String,
    pub completed: bool,
    pub estimated_units: u32,
    pub actual_units: u32,
    pub selected: bool,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    #[error("Connection refused - is pocus running?")]
    ConnectionRefused,
}

pub const SOCKET_PATH: &str = "/tmp/pocus.sock";
pub const SOCKET_ENV: &str = "POCUS_SOCKET";

/// Socket location, `$POCUS_SOCKET` first.
pub fn socket_path() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SOCKET_PATH))
}

/// Write one message as a JSON line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one JSON line. `Ok(None)` means the peer closed the stream.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, IpcError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}
