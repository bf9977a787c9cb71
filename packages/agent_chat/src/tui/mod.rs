//! Terminal front end: agent selector, message log and input box.

pub mod app;
mod render;

use anyhow::Result;
use ratatui::{
    DefaultTerminal,
    crossterm::event::{self, Event},
};
use std::time::Duration;
use tracing::info;

pub use app::{App, Focus};

use crate::config::ChatConfig;
use crate::transport::WsConnector;

/// How long to wait for a key before draining network events again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the chat UI until the user quits. Owns the terminal for its lifetime.
pub fn run(config: ChatConfig) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = run_loop(&mut terminal, config);
    ratatui::restore();
    result
}

fn run_loop(terminal: &mut DefaultTerminal, config: ChatConfig) -> Result<()> {
    info!(server = %config.server_url, "starting chat ui");
    let mut app = App::new(config, WsConnector::default());
    app.start();

    while !app.should_quit() {
        app.drain_events();
        terminal.draw(|frame| render::draw(frame, &mut app))?;

        // Poll with a short timeout so network events are picked up between keys
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            app.handle_key(key);
        }
    }

    info!("chat ui exiting");
    Ok(())
}
