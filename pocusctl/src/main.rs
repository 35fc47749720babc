use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pocus_ipc::{
    read_message, socket_path, write_message, Command, IpcError, Mode, Response, Settings,
    SettingsPatch, TaskId, TaskInfo,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "pocusctl")]
#[command(about = "Control a running pocus timer", long_about = None)]
struct Cli {
    /// Socket of the running pocus (defaults to $POCUS_SOCKET or /tmp/pocus.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Start or pause
    Toggle,
    /// Show the current interval
    Status,
    /// Switch to work, short or long
    Mode {
        mode: Mode,
        /// Switch even if the timer is running
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),
    /// Show or change timer settings
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task
    Add {
        title: String,
        /// Estimated pomodoros
        #[arg(short, long, default_value_t = 1)]
        est: u32,
    },
    /// List tasks, unfinished first
    List,
    /// Mark a task done (or not done)
    Done { id: TaskId },
    /// Change a task's title or estimate
    Edit {
        id: TaskId,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        est: Option<u32>,
    },
    /// Delete a task
    Rm { id: TaskId },
    /// Work on a task
    Select {
        #[arg(required_unless_present = "clear")]
        id: Option<TaskId>,
        /// Work on nothing
        #[arg(long, conflicts_with = "id")]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    Set {
        /// Pomodoro length in minutes
        #[arg(long)]
        work: Option<u32>,
        /// Short break length in minutes
        #[arg(long)]
        short: Option<u32>,
        /// Long break length in minutes
        #[arg(long)]
        long: Option<u32>,
        /// Pomodoros per long break
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        auto_breaks: Option<bool>,
        #[arg(long)]
        auto_work: Option<bool>,
        /// 0.0 to 1.0
        #[arg(long)]
        volume: Option<f32>,
        #[arg(long)]
        sound: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Pause => Command::Pause,
        Commands::Toggle => Command::Toggle,
        Commands::Status => Command::Status,
        Commands::Mode { mode, yes } => Command::SwitchMode { mode, confirm: yes },
        Commands::Task(TaskCommands::Add { title, est }) => Command::AddTask {
            title,
            estimated_units: est,
        },
        Commands::Task(TaskCommands::List) => Command::ListTasks,
        Commands::Task(TaskCommands::Done { id }) => Command::ToggleTask { id },
        Commands::Task(TaskCommands::Edit { id, title, est }) => {
            if title.is_none() && est.is_none() {
                bail!("Nothing to change; pass --title and/or --est");
            }
            Command::UpdateTask {
                id,
                title,
                estimated_units: est,
            }
        }
        Commands::Task(TaskCommands::Rm { id }) => Command::RemoveTask { id },
        Commands::Task(TaskCommands::Select { id, clear }) => Command::SelectTask {
            id: if clear { None } else { id },
        },
        Commands::Settings(SettingsCommands::Show) => Command::GetSettings,
        Commands::Settings(SettingsCommands::Set {
            work,
            short,
            long,
            interval,
            auto_breaks,
            auto_work,
            volume,
            sound,
        }) => {
            let patch = SettingsPatch {
                work_duration: work,
                short_break_duration: short,
                long_break_duration: long,
                auto_start_breaks: auto_breaks,
                auto_start_work: auto_work,
                long_break_interval: interval,
                alarm_sound: sound,
                alarm_volume: volume,
            };
            if patch.is_empty() {
                bail!("Nothing to change; see `pocusctl settings set --help`");
            }
            Command::UpdateSettings(patch)
        }
    };

    let socket = cli.socket.unwrap_or_else(socket_path);
    let response = send_command(&socket, &command).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        Response::Ok => println!("OK"),
        Response::Status(status) => {
            let state = if status.running { "running" } else { "paused" };
            println!("{} ({})", status.title, state);
            println!("Mode: {}", status.mode);
            println!("Remaining: {}s of {}s", status.remaining_seconds, status.total_seconds);
            println!("Pomodoros done: {}", status.completed_work_count);
            match status.selected_task {
                Some(id) => println!("Working on: #{}", id),
                None => println!("Working on: nothing"),
            }
        }
        Response::Task(task) => print_task(&task),
        Response::Tasks(tasks) => {
            if tasks.is_empty() {
                println!("No tasks");
            }
            for task in &tasks {
                print_task(task);
            }
        }
        Response::Settings(settings) => print_settings(&settings),
        Response::ConfirmationRequired { mode } => {
            bail!("The timer is running; use `pocusctl mode {} --yes` to switch anyway", mode_arg(mode))
        }
        Response::Error(e) => bail!(e),
    }

    Ok(())
}

fn print_task(task: &TaskInfo) {
    let check = if task.completed { "✓" } else { " " };
    let marker = if task.selected { "*" } else { " " };
    println!(
        "[{}]{} {}: {} ({}/{})",
        check, marker, task.id, task.title, task.actual_units, task.estimated_units
    );
}

fn print_settings(settings: &Settings) {
    println!("Pomodoro:          {} min", settings.work_duration);
    println!("Short break:       {} min", settings.short_break_duration);
    println!("Long break:        {} min", settings.long_break_duration);
    println!("Long break every:  {} pomodoros", settings.long_break_interval);
    println!("Auto start breaks: {}", settings.auto_start_breaks);
    println!("Auto start work:   {}", settings.auto_start_work);
    println!("Alarm:             {} at {:.0}%", settings.alarm_sound, settings.alarm_volume * 100.0);
}

fn mode_arg(mode: Mode) -> &'static str {
    match mode {
        Mode::Work => "work",
        Mode::ShortBreak => "short",
        Mode::LongBreak => "long",
    }
}

async fn send_command(socket: &Path, command: &Command) -> Result<Response> {
    let stream = UnixStream::connect(socket).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => IpcError::ConnectionRefused,
        _ => IpcError::Io(e),
    })?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_message(&mut writer, command).await?;
    match read_message(&mut reader).await? {
        Some(response) => Ok(response),
        None => Err(IpcError::ConnectionClosed.into()),
    }
}
