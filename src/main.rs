// main.rs

mod api;
mod app;
mod config;
mod daemon;
mod error;
mod logger;
mod model;
mod store;
mod tui;
mod views;

use crate::app::App;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init(config::log_path());

    let cfg = config::resolve();
    if config::load_from(&config::config_path()).is_none() {
        // first run: persist the resolved config so the user has a file to edit
        let _ = config::save_to(&config::config_path(), &cfg);
    }

    let daemon_cfg = cfg.clone();
    std::thread::spawn(move || {
        if let Err(e) = daemon::start_daemon(daemon_cfg) {
            log::error!("Daemon error: {}", e);
        }
    });

    let mut app = App::new(&cfg)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the TUI event loop (this blocks until exit)
    let res = tui::run_app(&mut terminal, &mut app);

    // Restore terminal state
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Handle errors from the event loop if any
    if let Err(err) = res {
        eprintln!("Application error: {}", err);
    }

    Ok(())
}
