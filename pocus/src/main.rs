use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod alarm;
mod app;
mod config;
mod ipc;
mod session;
mod settings;
mod storage;
mod tasks;
mod ticker;
mod ui;

use alarm::{Alarm, DesktopAlarm, NoAlarm};
use app::{App, AppMode};
use ipc::server::{self, Request, SocketGuard};
use pocus_ipc::Mode;
use storage::FileStore;
use ticker::{Pulse, Ticker};

#[derive(Parser)]
#[command(name = "pocus", about = "Pomodoro timer with a task list")]
struct Args {
    /// Config file (defaults to pocus.toml in the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding settings, tasks and the log
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// IPC socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// No desktop notification when an interval ends
    #[arg(long)]
    silent: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(args.config.as_deref())?;

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.data_dir.clone())
        .or_else(storage::default_data_dir)
        .context("Could not determine a data directory")?;
    let store = FileStore::new(&data_dir)
        .with_context(|| format!("Failed to open data directory {:?}", data_dir))?;
    init_logging(store.dir())?;

    let socket = args
        .socket
        .clone()
        .or_else(|| config.socket.clone())
        .unwrap_or_else(pocus_ipc::socket_path);
    let listener = server::bind(&socket)?;
    let _guard = SocketGuard(socket);
    let (request_tx, request_rx) = mpsc::channel(32);
    tokio::spawn(server::serve(listener, request_tx));

    let (pulse_tx, pulse_rx) = mpsc::channel(8);
    let alarm: Box<dyn Alarm> = if args.silent {
        Box::new(NoAlarm)
    } else {
        Box::new(DesktopAlarm)
    };
    let app = App::new(config, Arc::new(store), alarm, Ticker::new(pulse_tx));
    info!("pocus started");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, pulse_rx, request_rx, spawn_key_reader()).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("{:?}", err);
        eprintln!("Error: {:?}", err);
    }
    info!("pocus stopped");

    Ok(())
}

/// Logs go to `<data_dir>/pocus.log`; stdout belongs to the TUI.
fn init_logging(dir: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("pocus.log"))
        .context("Failed to open log file")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Crossterm reads block, so keys are polled on their own thread and
/// handed to the event loop. The thread ends once the loop is gone.
fn spawn_key_reader() -> mpsc::Receiver<KeyEvent> {
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || loop {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if tx.blocking_send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read terminal event: {}", e);
                    break;
                }
            },
            Ok(false) if tx.is_closed() => break,
            Ok(false) => {}
            Err(e) => {
                error!("Failed to poll terminal events: {}", e);
                break;
            }
        }
    });
    rx
}

async fn run_app<B: Backend + io::Write>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut pulses: mpsc::Receiver<Pulse>,
    mut requests: mpsc::Receiver<Request>,
    mut keys: mpsc::Receiver<KeyEvent>,
) -> Result<()> {
    let mut title = String::new();

    loop {
        let current = app.session.title();
        if current != title {
            execute!(terminal.backend_mut(), SetTitle(&current))?;
            title = current;
        }
        terminal.draw(|f| ui::draw(f, &app))?;

        tokio::select! {
            biased;
            Some(pulse) = pulses.recv() => {
                app.on_pulse(pulse);
            }
            Some(Request { command, reply }) = requests.recv() => {
                let response = app.handle_command(command);
                let _ = reply.send(response);
            }
            Some(key) = keys.recv() => handle_key(&mut app, key),
            else => break,
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }
    app.message = None;

    match &mut app.mode {
        AppMode::Normal => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char(' ') => app.toggle_timer(),
            KeyCode::Char('1') => app.request_mode(Mode::Work),
            KeyCode::Char('2') => app.request_mode(Mode::ShortBreak),
            KeyCode::Char('3') => app.request_mode(Mode::LongBreak),
            KeyCode::Char('a') => app.begin_add_task(),
            KeyCode::Char('e') => app.begin_edit_task(),
            KeyCode::Char('x') => app.toggle_cursor_task(),
            KeyCode::Char('d') => app.delete_cursor_task(),
            KeyCode::Enter => app.select_cursor_task(),
            KeyCode::Char('s') => app.open_settings(),
            KeyCode::Char('?') => app.mode = AppMode::ShowHelp,
            KeyCode::Up | KeyCode::Char('k') => app.move_cursor_up(),
            KeyCode::Down | KeyCode::Char('j') => app.move_cursor_down(),
            _ => {}
        },
        AppMode::ConfirmSwitch(_) => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.confirm_switch(),
            KeyCode::Char('n') | KeyCode::Esc => app.cancel_switch(),
            _ => {}
        },
        AppMode::Settings(form) => match key.code {
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => form.next(),
            KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => form.prev(),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('+') | KeyCode::Char(' ') => {
                form.adjust(1)
            }
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('-') => form.adjust(-1),
            KeyCode::Enter => app.save_settings_form(),
            KeyCode::Esc | KeyCode::Char('q') => app.mode = AppMode::Normal,
            _ => {}
        },
        AppMode::ShowHelp => match key.code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => app.mode = AppMode::Normal,
            _ => {}
        },
        AppMode::AddingTask
        | AppMode::EstimatingTask { .. }
        | AppMode::EditingTitle(_)
        | AppMode::EditingEstimate { .. } => match key.code {
            KeyCode::Esc => app.cancel_input(),
            KeyCode::Enter => app.handle_char('\n'),
            KeyCode::Backspace => app.handle_backspace(),
            KeyCode::Char(c) => app.handle_char(c),
            _ => {}
        },
    }
}
