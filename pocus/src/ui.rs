use crate::app::{App, AppMode, SettingsField, SettingsForm};
use crate::session::format_clock;
use pocus_ipc::Mode;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph, Tabs},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(2),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_timer(f, chunks[1], app);
    draw_tasks(f, chunks[2], app);
    draw_totals(f, chunks[3], app);
    draw_status_bar(f, chunks[4], app);

    match &app.mode {
        AppMode::AddingTask => draw_input_overlay(f, "New Task", app),
        AppMode::EstimatingTask { .. } => draw_input_overlay(f, "Est Pomodoros", app),
        AppMode::EditingTitle(_) => draw_input_overlay(f, "Edit Task", app),
        AppMode::EditingEstimate { .. } => draw_input_overlay(f, "Est Pomodoros", app),
        AppMode::ConfirmSwitch(mode) => draw_confirm_overlay(f, *mode, app),
        AppMode::Settings(form) => draw_settings_overlay(f, form, app),
        AppMode::ShowHelp => draw_help_overlay(f, app),
        AppMode::Normal => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let text = Line::from(vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(
            "POCUS",
            Style::default()
                .fg(theme.mode_color(app.session.mode()))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(icons.header_right.clone()),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_timer(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let session = &app.session;
    let color = theme.mode_color(session.mode());

    let block = Block::default()
        .title(Span::styled(
            format!(" #{} ", session.completed_work_count() + 1),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner_area);

    let selected = Mode::ALL
        .iter()
        .position(|&m| m == session.mode())
        .unwrap_or(0);
    let tabs = Tabs::new(
        Mode::ALL
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{} {}", i + 1, m.label())),
    )
    .select(selected)
    .style(Style::default().fg(theme.gray))
    .highlight_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
    .divider(icons.separator.clone());
    f.render_widget(tabs, centered_line(rows[0], 48));

    let state_icon = if session.is_running() {
        &icons.play
    } else {
        &icons.pause
    };
    f.render_widget(
        Paragraph::new(format!(
            "{} {}",
            state_icon,
            format_clock(session.remaining_seconds())
        ))
        .style(
            Style::default()
                .fg(theme.foreground)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center),
        rows[2],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(color).bg(theme.black))
            .ratio(session.progress())
            .label(""),
        rows[3],
    );
    let current = session
        .selected_task()
        .and_then(|id| app.tasks.get(id))
        .map_or_else(|| "Time to focus!".to_string(), |t| t.title.clone());
    f.render_widget(
        Paragraph::new(current)
            .style(Style::default().fg(theme.gray))
            .alignment(Alignment::Center),
        rows[4],
    );
}

fn draw_tasks(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let block = Block::default()
        .title(Span::styled(" Tasks ", Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.green));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    if app.tasks.is_empty() {
        f.render_widget(
            Paragraph::new("No tasks. Press 'a' to add one.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center),
            inner_area,
        );
        return;
    }

    let selected = app.session.selected_task();
    let items: Vec<ListItem> = app
        .tasks
        .ordered()
        .into_iter()
        .enumerate()
        .map(|(i, task)| {
            let cursor = if i == app.cursor {
                Span::styled(icons.select.clone(), Style::default().fg(theme.selection))
            } else {
                Span::raw(" ")
            };
            let check = if task.completed {
                &icons.done
            } else {
                &icons.pending
            };
            let marker = if Some(task.id) == selected {
                Span::styled(
                    format!(" {}", icons.selected_task),
                    Style::default().fg(theme.mode_color(app.session.mode())),
                )
            } else {
                Span::raw("  ")
            };
            let title_style = if task.completed {
                Style::default()
                    .fg(theme.gray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else {
                Style::default().fg(theme.foreground)
            };
            ListItem::new(Line::from(vec![
                cursor,
                marker,
                Span::raw(format!(" {} ", check)),
                Span::styled(task.title.clone(), title_style),
                Span::styled(
                    format!("  {}/{}", task.actual_units, task.estimated_units),
                    Style::default().fg(theme.gray),
                ),
            ]))
        })
        .collect();
    f.render_widget(List::new(items), inner_area);
}

fn draw_totals(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (est, act) = app.tasks.totals();
    let finish = app
        .finish_estimate()
        .map_or_else(|| "--:--".to_string(), |t| t.format("%H:%M").to_string());
    let label = Style::default().fg(theme.gray);
    let value = Style::default()
        .fg(theme.foreground)
        .add_modifier(Modifier::BOLD);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Est: ", label),
            Span::styled(est.to_string(), value),
            Span::styled("   Act: ", label),
            Span::styled(act.to_string(), value),
            Span::styled("   Finish: ", label),
            Span::styled(finish, value),
        ]))
        .alignment(Alignment::Center),
        area,
    );
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", theme.green),
        AppMode::AddingTask | AppMode::EstimatingTask { .. } => ("INSERT", theme.yellow),
        AppMode::EditingTitle(_) | AppMode::EditingEstimate { .. } => ("EDIT", theme.yellow),
        AppMode::ConfirmSwitch(_) => ("CONFIRM", theme.magenta),
        AppMode::Settings(_) => ("SETTINGS", theme.magenta),
        AppMode::ShowHelp => ("HELP", theme.magenta),
    };
    let help = match app.mode {
        AppMode::Normal => "space:start/pause │ 1-3:mode │ a:add │ e:edit │ x:done │ d:del │ enter:select │ s:settings │ ?:help │ q:quit",
        AppMode::ConfirmSwitch(_) => "y:switch │ n:keep going",
        AppMode::Settings(_) => "j/k:field │ h/l:change │ enter:save │ esc:cancel",
        AppMode::ShowHelp => "esc:close",
        _ => "enter:confirm │ esc:cancel",
    };
    let bar = Line::from(vec![
        Span::styled(
            format!(" {} ", mode_text),
            Style::default()
                .bg(mode_color)
                .fg(theme.background)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::raw(help),
    ]);
    let message = Line::from(Span::styled(
        app.message.clone().unwrap_or_default(),
        Style::default().fg(theme.yellow),
    ));
    f.render_widget(
        Paragraph::new(vec![bar, message])
            .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, app: &App) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.config.theme.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(app.config.theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(app.config.theme.foreground)),
            Span::styled(
                app.input_buffer.as_str(),
                Style::default().fg(app.config.theme.foreground),
            ),
            Span::styled(
                &app.config.icons.input_cursor,
                Style::default()
                    .fg(app.config.theme.foreground)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

fn draw_confirm_overlay(f: &mut Frame, mode: Mode, app: &App) {
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(vec![
            Line::from("The timer is still running."),
            Line::from(format!("Switch to {} anyway? (y/n)", mode.label())),
        ])
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(" Switch mode ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(app.config.theme.magenta))
                .style(Style::default().bg(app.config.theme.background)),
        ),
        area,
    );
}

fn draw_settings_overlay(f: &mut Frame, form: &SettingsForm, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(50, 50, f.area());
    f.render_widget(Clear, area);
    let items: Vec<ListItem> = SettingsField::ALL
        .iter()
        .map(|&field| {
            let focused = field == form.current();
            let pointer = if focused {
                Span::styled(
                    app.config.icons.select.clone(),
                    Style::default().fg(theme.selection),
                )
            } else {
                Span::raw(" ")
            };
            ListItem::new(Line::from(vec![
                pointer,
                Span::raw(format!(" {:<22}", field.label())),
                Span::styled(
                    form.value_text(field),
                    Style::default()
                        .fg(if focused { theme.selection } else { theme.foreground })
                        .add_modifier(Modifier::BOLD),
                ),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(items).block(
            Block::default()
                .title(" Timer Setting ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(theme.magenta))
                .style(Style::default().bg(theme.background)),
        ),
        area,
    );
}

fn draw_help_overlay(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        (
            "Timer",
            vec![
                ("Space", "Start/pause"),
                ("1 2 3", "Pomodoro / short / long break"),
                ("s", "Settings"),
            ],
        ),
        (
            "Tasks",
            vec![
                ("a", "Add task"),
                ("e", "Edit task"),
                ("x", "Toggle complete"),
                ("d", "Delete task"),
                ("Enter", "Work on this task"),
            ],
        ),
        (
            "General",
            vec![("j/↓ k/↑", "Move"), ("?", "Toggle help"), ("q", "Quit")],
        ),
    ];

    let mut lines = Vec::new();
    for (section, keys) in shortcuts {
        lines.push(Line::from(Span::styled(
            section,
            Style::default()
                .fg(app.config.theme.selection)
                .add_modifier(Modifier::BOLD),
        )));
        for (key, action) in keys {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {:<10}", key),
                    Style::default().fg(app.config.theme.yellow),
                ),
                Span::raw(action),
            ]));
        }
        lines.push(Line::from(""));
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(app.config.theme.magenta))
                .style(Style::default().bg(app.config.theme.background)),
        ),
        area,
    );
}

fn centered_line(area: Rect, width: u16) -> Rect {
    let width = width.min(area.width);
    Rect {
        x: area.x + (area.width - width) / 2,
        width,
        ..area
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::NoAlarm;
    use crate::config::Config;
    use crate::storage::MemoryStore;
    use crate::ticker::Ticker;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn app() -> App {
        let (tx, _rx) = mpsc::channel(1);
        App::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Box::new(NoAlarm),
            Ticker::new(tx),
        )
    }

    #[test]
    fn renders_countdown_tasks_and_totals() {
        let mut app = app();
        app.add_task("Write report", 3).unwrap();
        let screen = render(&app);

        assert!(screen.contains("25:00"));
        assert!(screen.contains("Pomodoro"));
        assert!(screen.contains("Write report"));
        assert!(screen.contains("0/3"));
        assert!(screen.contains("Est: 3"));
    }

    #[test]
    fn unrepresentable_finish_time_renders_placeholder() {
        let mut app = app();
        app.add_task("Marathon", 3_000_000_000).unwrap();
        app.add_task("Ultra", 3_000_000_000).unwrap();
        app.update_settings(&pocus_ipc::SettingsPatch {
            work_duration: Some(u32::MAX),
            ..Default::default()
        })
        .unwrap();
        let screen = render(&app);
        assert!(screen.contains("Finish: --:--"));
    }

    #[test]
    fn renders_confirmation_overlay() {
        let mut app = app();
        app.mode = AppMode::ConfirmSwitch(Mode::LongBreak);
        let screen = render(&app);
        assert!(screen.contains("Switch to Long Break anyway?"));
    }
}
