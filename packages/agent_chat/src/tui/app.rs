use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::ChatConfig;
use crate::directory::{AgentDirectory, DirectoryClient};
use crate::error::ChatError;
use crate::message_log::MessageLog;
use crate::protocol::Agent;
use crate::session::{Connector, EventReceiver, SessionController};

/// Lines moved per PageUp/PageDown.
const SCROLL_STEP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Selector,
    Input,
}

/// Completions delivered back to the UI loop.
#[derive(Debug)]
pub(crate) enum UiEvent {
    AgentsFetched(Result<Vec<Agent>, ChatError>),
    AgentSelected(String),
}

/// All UI state. Owned by the loop in [`super::run`]; nothing here is shared.
pub struct App<C: Connector> {
    pub(crate) config: ChatConfig,
    client: DirectoryClient,
    pub(crate) directory: AgentDirectory,
    pub(crate) session: SessionController<C>,
    session_rx: EventReceiver,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    pub(crate) focus: Focus,
    pub(crate) selector: ListState,
    should_quit: bool,
}

impl<C: Connector> App<C> {
    pub fn new(config: ChatConfig, connector: C) -> Self {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let select_tx = ui_tx.clone();
        let directory = AgentDirectory::new(move |name| {
            let _ = select_tx.send(UiEvent::AgentSelected(name.to_string()));
        });
        let log = MessageLog::with_capacity_limit(config.max_log_entries);
        let (session, session_rx) =
            SessionController::new(config.server_url.clone(), connector, log);

        Self {
            client: DirectoryClient::new(&config.server_url),
            config,
            directory,
            session,
            session_rx,
            ui_tx,
            ui_rx,
            focus: Focus::Input,
            selector: ListState::default().with_selected(Some(0)),
            should_quit: false,
        }
    }

    /// Kick off the first directory fetch and, if configured, the first session.
    pub fn start(&mut self) {
        self.refresh_agents();
        if self.config.connect_on_start {
            let agent = self.directory.selected().to_string();
            self.open_session(&agent);
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    pub fn session(&self) -> &SessionController<C> {
        &self.session
    }

    /// Start a background fetch unless one is already outstanding.
    pub fn refresh_agents(&mut self) {
        if !self.directory.begin_fetch() {
            return;
        }
        let client = self.client.clone();
        let tx = self.ui_tx.clone();
        tokio::spawn(async move {
            let result = client.list_agents().await;
            let _ = tx.send(UiEvent::AgentsFetched(result));
        });
    }

    /// Apply everything the background tasks delivered since the last frame.
    /// Session events go first: anything already delivered by the current
    /// connection lands in the log before a queued agent switch replaces it.
    pub fn drain_events(&mut self) {
        self.drain_session();
        while let Ok(ev) = self.ui_rx.try_recv() {
            self.apply(ev);
        }
    }

    fn drain_session(&mut self) {
        while let Ok(ev) = self.session_rx.try_recv() {
            self.session.handle_event(ev);
        }
    }

    pub(crate) fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::AgentsFetched(result) => {
                self.directory.finish_fetch(result);
                let highlight = self
                    .selector
                    .selected()
                    .unwrap_or(0)
                    .min(self.directory.agents().len().saturating_sub(1));
                self.selector.select(Some(highlight));
            }
            UiEvent::AgentSelected(name) => {
                self.drain_session();
                self.open_session(&name);
            }
        }
    }

    fn open_session(&mut self, agent: &str) {
        if let Err(e) = self.session.select_agent(agent) {
            error!(agent, error = %e, "cannot open session");
        }
    }

    pub fn quit(&mut self) {
        self.session.close();
        self.should_quit = true;
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return self.quit(),
            KeyCode::Esc => return self.quit(),
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Selector => Focus::Input,
                    Focus::Input => Focus::Selector,
                };
                return;
            }
            KeyCode::PageUp => return self.session.log_mut().scroll_back(SCROLL_STEP),
            KeyCode::PageDown => return self.session.log_mut().scroll_forward(SCROLL_STEP),
            KeyCode::F(5) => return self.refresh_agents(),
            _ => {}
        }

        match self.focus {
            Focus::Selector => self.handle_selector_key(key),
            Focus::Input => self.handle_input_key(key),
        }
    }

    fn handle_selector_key(&mut self, key: KeyEvent) {
        let total = self.directory.agents().len();
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                let i = self.selector.selected().unwrap_or(0);
                self.selector.select(Some((i + 1) % total.max(1)));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let i = self.selector.selected().unwrap_or(0);
                self.selector
                    .select(Some(if i == 0 { total.saturating_sub(1) } else { i - 1 }));
            }
            KeyCode::Enter => {
                let i = self.selector.selected().unwrap_or(0);
                if let Some(agent) = self.directory.agents().get(i).cloned() {
                    self.directory.select(&agent.name);
                    self.focus = Focus::Input;
                }
            }
            KeyCode::Char('r') => self.refresh_agents(),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                self.session.input_mut().push('\n');
            }
            KeyCode::Enter => {
                if !self.session.submit_input() {
                    debug!(state = %self.session.state(), "nothing sent");
                }
            }
            KeyCode::Backspace => {
                self.session.input_mut().pop();
            }
            KeyCode::Char(c) => self.session.input_mut().push(c),
            KeyCode::Up => self.session.log_mut().scroll_back(1),
            KeyCode::Down => self.session.log_mut().scroll_forward(1),
            _ => {}
        }
    }
}
