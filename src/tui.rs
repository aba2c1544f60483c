// tui.rs

use crate::app::{App, InputMode, ListFormStep, Pane, TaskFormStep};
use crate::store::ActiveView;
use chrono::{Duration as Dur, Local, NaiveDate, NaiveDateTime, NaiveTime};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use std::{io, time::Duration};

pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()>
where
    std::io::Error: From<<B as Backend>::Error>,
{
    app.start_background_sync();

    // Redraw on key input and whenever a store commit fires the observer;
    // idle polls cost nothing.
    let mut needs_draw = true;
    loop {
        app.drain_inbound();
        if app.take_dirty() {
            needs_draw = true;
        }
        if needs_draw {
            terminal.draw(|f| ui(f, app))?;
            needs_draw = false;
        }

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                needs_draw = true;

                match app.input_mode {
                    InputMode::Normal => match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Tab => {
                            app.focus = match app.focus {
                                Pane::Lists => Pane::Tasks,
                                Pane::Tasks => Pane::Lists,
                            };
                        }
                        KeyCode::Down | KeyCode::Char('j') => move_selection(app, 1),
                        KeyCode::Up | KeyCode::Char('k') => move_selection(app, -1),
                        KeyCode::Enter => match app.focus {
                            Pane::Lists => app.open_selected_list(),
                            Pane::Tasks => app.begin_task_edit(),
                        },
                        KeyCode::Char('a') => app.begin_task_create(),
                        KeyCode::Char('e') => app.begin_task_edit(),
                        KeyCode::Char('d') => app.toggle_selected(),
                        KeyCode::Char('r') | KeyCode::Char('R')
                            if key.modifiers.contains(KeyModifiers::SHIFT) =>
                        {
                            app.delete_selected_task();
                        }
                        KeyCode::Char('N') => app.begin_list_create(),
                        KeyCode::Char('E') => app.begin_list_edit(),
                        KeyCode::Char('D') if key.modifiers.contains(KeyModifiers::SHIFT) => {
                            app.request_delete_list();
                        }
                        KeyCode::Char('g') => app.refresh_active(),
                        KeyCode::Char('L') => app.start_background_sync(),
                        KeyCode::Esc => {
                            app.store.clear_active();
                            app.focus = Pane::Lists;
                        }
                        _ => {}
                    },
                    InputMode::EditingTask | InputMode::EditingList => match key.code {
                        KeyCode::Enter => {
                            if app.input_mode == InputMode::EditingTask {
                                app.submit_task_step();
                            } else {
                                app.submit_list_step();
                            }
                        }
                        KeyCode::Esc => app.cancel_input(),
                        KeyCode::Backspace => {
                            app.input_buffer.pop();
                        }
                        KeyCode::Char(c) => app.input_buffer.push(c),
                        _ => {}
                    },
                    InputMode::ConfirmDeleteList => match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm_delete_list(),
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            app.cancel_input();
                        }
                        _ => {}
                    },
                }
            }
        }
    }
}

fn move_selection(app: &mut App, delta: i64) {
    let (len, idx) = match app.focus {
        Pane::Lists => (app.store.lists().len(), app.selected_list),
        Pane::Tasks => (app.visible_tasks().len(), app.selected_task),
    };
    if len == 0 {
        return;
    }
    let next = (idx as i64 + delta).clamp(0, len as i64 - 1) as usize;
    match app.focus {
        Pane::Lists => app.selected_list = next,
        Pane::Tasks => app.selected_task = next,
    }
}

fn ui(f: &mut ratatui::Frame<'_>, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
        .split(outer[0]);

    draw_sidebar(f, app, panes[0]);
    draw_detail(f, app, panes[1]);
    draw_status(f, app, outer[1]);
}

fn draw_sidebar(f: &mut ratatui::Frame<'_>, app: &App, area: ratatui::layout::Rect) {
    let focused = app.focus == Pane::Lists;
    let mut items: Vec<ListItem> = Vec::new();
    for (i, list) in app.store.sorted_lists().iter().enumerate() {
        let mut spans = vec![
            Span::styled(
                format!("[{}] ", list.priority),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(list.name.clone()),
        ];
        if let Some(key) = list.key() {
            if let Some(c) = app.store.counters_for(&key) {
                spans.push(Span::styled(
                    format!("  {}✓ {}○", c.done, c.open),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        let mut style = Style::default();
        if i == app.selected_list && focused {
            style = style.add_modifier(Modifier::REVERSED);
        }
        items.push(ListItem::new(Line::from(spans)).style(style));
    }
    if items.is_empty() {
        let hint = match app.store.lists_error() {
            Some(e) => Line::from(Span::styled(e.to_string(), Style::default().fg(Color::Red))),
            None => Line::from("No lists yet. Press N to create one."),
        };
        items.push(ListItem::new(hint));
    }
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    f.render_widget(
        List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Lists"),
        ),
        area,
    );
}

fn draw_detail(f: &mut ratatui::Frame<'_>, app: &App, area: ratatui::layout::Rect) {
    let focused = app.focus == Pane::Tasks;
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let title = match app.store.active() {
        ActiveView::Ready(s) => format!("Tasks — {}", s.list.name),
        _ => "Tasks".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title);

    match app.store.active() {
        ActiveView::None => {
            f.render_widget(
                Paragraph::new("Select a list on the left to see its tasks.")
                    .style(Style::default().fg(Color::DarkGray))
                    .wrap(Wrap { trim: true })
                    .block(block),
                area,
            );
        }
        ActiveView::Loading => {
            f.render_widget(
                Paragraph::new("Loading tasks…")
                    .style(Style::default().fg(Color::DarkGray))
                    .block(block),
                area,
            );
        }
        ActiveView::Failed(e) => {
            f.render_widget(
                Paragraph::new(format!("Could not load this list: {}", e))
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true })
                    .block(block),
                area,
            );
        }
        ActiveView::Ready(_) => {
            let mut items: Vec<ListItem> = Vec::new();
            let mut row = 0usize;
            for bucket in app.store.active_buckets() {
                items.push(ListItem::new(Line::from(Span::styled(
                    bucket.name.clone(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))));
                for task in &bucket.tasks {
                    let marker = if task.done { "[x] " } else { "[ ] " };
                    let mut spans = vec![Span::raw(marker), Span::raw(task.title.clone())];
                    if let Some(due) = &task.due_date {
                        let style = if !task.done && is_overdue(due) {
                            Style::default().fg(Color::Red)
                        } else {
                            Style::default().fg(Color::DarkGray)
                        };
                        spans.push(Span::styled(format!("  due {}", short_date(due)), style));
                    }
                    let mut style = if task.done {
                        Style::default().fg(Color::DarkGray)
                    } else {
                        Style::default()
                    };
                    if row == app.selected_task && focused {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    items.push(ListItem::new(Line::from(spans)).style(style));
                    row += 1;
                }
            }
            if items.is_empty() {
                items.push(ListItem::new("No tasks yet. Press a to add one."));
            }
            f.render_widget(List::new(items).block(block), area);
        }
    }
}

fn draw_status(f: &mut ratatui::Frame<'_>, app: &App, area: ratatui::layout::Rect) {
    let line = match app.input_mode {
        InputMode::Normal => match &app.error_message {
            Some(e) => Line::from(Span::styled(e.clone(), Style::default().fg(Color::Red))),
            None => Line::from(
                "Enter: open/edit  a: add  d: done  e: edit  R: delete  N/E/D: list ops  g: refresh  q: quit",
            ),
        },
        InputMode::EditingTask => prompt_line(task_prompt(app.task_step), &app.input_buffer, &app.error_message),
        InputMode::EditingList => prompt_line(list_prompt(app.list_step), &app.input_buffer, &app.error_message),
        InputMode::ConfirmDeleteList => Line::from(Span::styled(
            "Delete this list and all its tasks? (y/n)",
            Style::default().fg(Color::Red),
        )),
    };
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn task_prompt(step: TaskFormStep) -> &'static str {
    match step {
        TaskFormStep::Title => "Task title",
        TaskFormStep::DueDate => "Due date (empty, today, tomorrow, +Nd, YYYY-MM-DD [HH:MM])",
        TaskFormStep::Priority => "Priority 0-5",
    }
}

fn list_prompt(step: ListFormStep) -> &'static str {
    match step {
        ListFormStep::Name => "List name",
        ListFormStep::Description => "Description",
        ListFormStep::Priority => "Priority 0-5",
    }
}

fn prompt_line<'a>(label: &'a str, buffer: &'a str, error: &'a Option<String>) -> Line<'a> {
    let mut spans = vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Yellow)),
        Span::raw(buffer),
        Span::styled("▏", Style::default().fg(Color::Yellow)),
    ];
    if let Some(e) = error {
        spans.push(Span::styled(
            format!("  {}", e),
            Style::default().fg(Color::Red),
        ));
    }
    Line::from(spans)
}

fn short_date(due: &str) -> &str {
    due.get(..10).unwrap_or(due)
}

fn is_overdue(due: &str) -> bool {
    match NaiveDate::parse_from_str(short_date(due), "%Y-%m-%d") {
        Ok(date) => date < Local::now().date_naive(),
        Err(_) => false,
    }
}

/// Parse the due-date entry field into a normalized date or datetime
/// string. Accepted: `today`, `tomorrow`, `+Nd` / `Nd` day offsets,
/// `YYYY-MM-DD` and `YYYY-MM-DD HH:MM`.
pub fn parse_due_date(input: &str) -> Result<String, String> {
    let input = input.trim().to_lowercase();
    let today = Local::now().date_naive();

    match input.as_str() {
        "today" => return Ok(today.format("%Y-%m-%d").to_string()),
        "tomorrow" => return Ok((today + Dur::days(1)).format("%Y-%m-%d").to_string()),
        _ => {}
    }

    if let Some(rest) = input.strip_prefix('+').or(Some(input.as_str())) {
        if let Some(num) = rest.strip_suffix('d') {
            if let Ok(days) = num.parse::<i64>() {
                return Ok((today + Dur::days(days)).format("%Y-%m-%d").to_string());
            }
        }
    }

    if let Some((date_str, time_str)) = input.split_once(' ') {
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|_| "Invalid date format. Use YYYY-MM-DD".to_string())?;
        let time = NaiveTime::parse_from_str(time_str, "%H:%M")
            .map_err(|_| "Invalid time format. Use HH:MM".to_string())?;
        let dt = NaiveDateTime::new(date, time);
        return Ok(dt.format("%Y-%m-%d %H:%M").to_string());
    }

    if let Ok(date) = NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
        return Ok(date.format("%Y-%m-%d").to_string());
    }

    Err("Invalid date or time format".to_string())
}
